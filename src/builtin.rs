use crate::command::{CommandView, ShellError};
use crate::registry::Registry;
use crate::session::Output;
use regex::RegexBuilder;

/// What the dispatcher should do after a command ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Exit,
}

/// Commands provided by the engine itself.
///
/// Built-ins are consulted before the registry, so registered commands can
/// never shadow them.
pub(crate) trait BuiltinCommand {
    /// Canonical name of the command, e.g. "exit".
    const NAME: &'static str;
    /// One-line description shown by `fhelp`.
    const HELP: &'static str;

    fn execute(
        cmd: &CommandView<'_>,
        registry: &Registry,
        out: &Output<'_>,
    ) -> Result<Flow, ShellError>;
}

/// Quit the shell (or, over IPC, end the connection).
pub(crate) struct Exit;

impl BuiltinCommand for Exit {
    const NAME: &'static str = "exit";
    const HELP: &'static str = "Quit the shell";

    fn execute(
        _cmd: &CommandView<'_>,
        _registry: &Registry,
        _out: &Output<'_>,
    ) -> Result<Flow, ShellError> {
        Ok(Flow::Exit)
    }
}

/// List commands, optionally filtered by a regular expression.
pub(crate) struct Fhelp;

impl BuiltinCommand for Fhelp {
    const NAME: &'static str = "fhelp";
    const HELP: &'static str = "List all commands (filter=<regex>, -i to ignore case)";

    fn execute(
        cmd: &CommandView<'_>,
        registry: &Registry,
        out: &Output<'_>,
    ) -> Result<Flow, ShellError> {
        let filter = cmd
            .get_param("filter")
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(cmd.has_flag("i"))
                    .build()
                    .map_err(|e| {
                        ShellError::InvalidArgument(format!("invalid filter '{pattern}': {e}"))
                    })
            })
            .transpose()?;

        let mut entries: Vec<(String, String)> = builtins()
            .iter()
            .map(|(name, help)| (name.to_string(), help.to_string()))
            .collect();
        entries.extend(registry.list());
        if let Some(re) = &filter {
            entries.retain(|(name, help)| re.is_match(name) || re.is_match(help));
        }

        if entries.is_empty() {
            out.println("No matching commands.");
            return Ok(Flow::Continue);
        }

        let width = entries.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
        let mut listing = String::from("Available commands:\n");
        for (name, help) in &entries {
            if help.is_empty() {
                listing.push_str(&format!("  {name}\n"));
            } else {
                listing.push_str(&format!("  {name:<width$}  {help}\n"));
            }
        }
        out.print(&listing);
        Ok(Flow::Continue)
    }
}

/// `(name, help)` of every built-in.
pub(crate) fn builtins() -> [(&'static str, &'static str); 2] {
    [(Exit::NAME, Exit::HELP), (Fhelp::NAME, Fhelp::HELP)]
}

pub(crate) fn is_builtin(name: &str) -> bool {
    builtins().iter().any(|(builtin, _)| *builtin == name)
}

/// Run `cmd` if it names a built-in; `None` hands it on to the registry.
pub(crate) fn dispatch(
    cmd: &CommandView<'_>,
    registry: &Registry,
    out: &Output<'_>,
) -> Option<Result<Flow, ShellError>> {
    let name = cmd.main_command();
    if name == Exit::NAME {
        Some(Exit::execute(cmd, registry, out))
    } else if name == Fhelp::NAME {
        Some(Fhelp::execute(cmd, registry, out))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandHandler, ResultCode};
    use crate::parser::parse;
    use crate::session::SessionManager;
    use std::sync::Arc;

    fn registry() -> Registry {
        fn ok(_: &CommandView<'_>, _: &Output<'_>) -> ResultCode {
            ResultCode::Ok
        }
        fn noop() -> Arc<dyn CommandHandler> {
            Arc::new(ok)
        }
        let registry = Registry::new();
        registry.register("hello", "Say hello to someone", noop()).unwrap();
        registry.register("stats", "Display application statistics", noop()).unwrap();
        registry.register("quiet", "", noop()).unwrap();
        registry
    }

    fn run(line: &str, registry: &Registry) -> (Option<Result<Flow, ShellError>>, String) {
        let sessions = SessionManager::new(Box::new(std::io::sink()));
        let id = sessions.open_buffered();
        let parsed = parse(line).unwrap();
        let result = dispatch(&parsed.view(), registry, &Output::new(&sessions, Some(id)));
        (result, sessions.take_output(id))
    }

    #[test]
    fn test_exit_requests_exit() {
        let (result, output) = run("exit now", &registry());
        assert_eq!(result.unwrap().unwrap(), Flow::Exit);
        assert_eq!(output, "");
    }

    #[test]
    fn test_fhelp_lists_builtins_and_commands() {
        let (result, output) = run("fhelp", &registry());
        assert_eq!(result.unwrap().unwrap(), Flow::Continue);
        assert_eq!(
            output,
            "Available commands:\n\
             \x20 exit   Quit the shell\n\
             \x20 fhelp  List all commands (filter=<regex>, -i to ignore case)\n\
             \x20 hello  Say hello to someone\n\
             \x20 quiet\n\
             \x20 stats  Display application statistics\n"
        );
    }

    #[test]
    fn test_fhelp_filter() {
        let (_, output) = run("fhelp filter=^h", &registry());
        assert_eq!(output, "Available commands:\n  hello  Say hello to someone\n");

        let (_, output) = run("fhelp filter=STATISTICS -i", &registry());
        assert_eq!(
            output,
            "Available commands:\n  stats  Display application statistics\n"
        );

        let (_, output) = run("fhelp filter=nothing-matches", &registry());
        assert_eq!(output, "No matching commands.\n");
    }

    #[test]
    fn test_fhelp_invalid_filter() {
        let (result, _) = run("fhelp filter=(", &registry());
        let err = result.unwrap().unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidArgument);
    }

    #[test]
    fn test_other_commands_pass_through() {
        let (result, _) = run("hello", &registry());
        assert!(result.is_none());
        assert!(is_builtin("exit"));
        assert!(is_builtin("fhelp"));
        assert!(!is_builtin("Exit"));
    }
}
