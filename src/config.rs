use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Channel used by daemon mode when none (or an empty one) is given.
pub const DEFAULT_CHANNEL: &str = "fshell_ctrl";

/// Number of history entries the line editor keeps when `FSHELL_HISTORY` is unset.
pub const DEFAULT_HISTORY_SIZE: usize = 100;

/// How [`crate::Shell::run`] drives the shell.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Read commands from the terminal (the default).
    #[default]
    Interactive,
    /// Serve commands over IPC on the named channel.
    Daemon { channel: String },
}

impl ExecutionMode {
    /// Daemon mode on `channel`, falling back to [`DEFAULT_CHANNEL`] for `None` or `""`.
    pub fn daemon(channel: Option<&str>) -> Self {
        let channel = channel
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CHANNEL);
        ExecutionMode::Daemon {
            channel: channel.to_string(),
        }
    }
}

/// Settings of one shell instance, captured from the process environment.
///
/// Recognised variables:
/// - `FSHELL_PROMPT`: interactive prompt (default `"<app>> "`).
/// - `FSHELL_SOCKET_DIR`: directory holding daemon sockets (default: temp dir).
/// - `FSHELL_HISTORY`: line editor history size (default 100).
///
/// Variables can be overridden per instance with [`ShellConfig::set_var`].
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Application name, for display purposes.
    pub app_name: String,
    /// `FSHELL_*` variables captured at construction plus any overrides.
    pub vars: HashMap<String, String>,
}

impl ShellConfig {
    /// Capture the `FSHELL_*` variables of the current process.
    pub fn new(app_name: impl Into<String>) -> Self {
        let vars = stdenv::vars()
            .filter(|(k, _)| k.starts_with("FSHELL_"))
            .collect();
        Self {
            app_name: app_name.into(),
            vars,
        }
    }

    /// Get a variable, falling back to the live process environment.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Set or override a variable for this instance only.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    pub fn prompt(&self) -> String {
        self.get_var("FSHELL_PROMPT")
            .unwrap_or_else(|| format!("{}> ", self.app_name))
    }

    pub fn socket_dir(&self) -> PathBuf {
        self.get_var("FSHELL_SOCKET_DIR")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(stdenv::temp_dir)
    }

    pub fn history_size(&self) -> usize {
        self.get_var("FSHELL_HISTORY")
            .and_then(|size| size.parse().ok())
            .unwrap_or(DEFAULT_HISTORY_SIZE)
    }

    /// Socket path for a channel name. Names containing `/` are paths already.
    pub fn channel_path(&self, channel: &str) -> PathBuf {
        if channel.contains('/') {
            PathBuf::from(channel)
        } else {
            self.socket_dir().join(format!("{channel}.sock"))
        }
    }
}
