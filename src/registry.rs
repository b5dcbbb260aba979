use crate::builtin;
use crate::command::{CommandHandler, ShellError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A registered command: its name, help text and handler.
///
/// Entries are immutable once registered.
pub struct CommandEntry {
    name: String,
    help: String,
    handler: Arc<dyn CommandHandler>,
}

impl CommandEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn handler(&self) -> &dyn CommandHandler {
        self.handler.as_ref()
    }
}

/// Name → handler table of one shell instance.
///
/// Reads (dispatch from any number of sessions) share a read lock; registration
/// takes the write lock. Lookups hand out an `Arc` so no lock is held while a
/// handler runs.
#[derive(Default)]
pub struct Registry {
    commands: RwLock<BTreeMap<String, Arc<CommandEntry>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command. Fails without side effects on an empty or
    /// whitespace-containing name, a reserved built-in name, or a duplicate.
    pub fn register(
        &self,
        name: &str,
        help: &str,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<(), ShellError> {
        if name.is_empty() {
            return Err(ShellError::InvalidArgument(
                "command name must not be empty".to_string(),
            ));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(ShellError::InvalidArgument(format!(
                "command name '{name}' contains whitespace"
            )));
        }
        if builtin::is_builtin(name) {
            return Err(ShellError::AlreadyRegistered(name.to_string()));
        }

        let mut commands = self.commands.write();
        if commands.contains_key(name) {
            return Err(ShellError::AlreadyRegistered(name.to_string()));
        }
        commands.insert(
            name.to_string(),
            Arc::new(CommandEntry {
                name: name.to_string(),
                help: help.to_string(),
                handler,
            }),
        );
        debug!(command = name, "registered command");
        Ok(())
    }

    /// Exact, case-sensitive lookup.
    pub fn lookup(&self, name: &str) -> Result<Arc<CommandEntry>, ShellError> {
        self.commands
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ShellError::NotFound(name.to_string()))
    }

    /// `(name, help)` of every registered command, sorted by name.
    pub fn list(&self) -> Vec<(String, String)> {
        self.commands
            .read()
            .values()
            .map(|e| (e.name.clone(), e.help.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }
}
