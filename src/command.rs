use crate::parser::ParseError;
use crate::session::Output;
use std::fmt;

/// Result codes returned by shell operations and command handlers.
///
/// The discriminants are part of the C ABI: existing values are never
/// reordered, new codes are only ever appended.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// Operation completed successfully.
    Ok = 0,
    /// One or more arguments were missing or invalid.
    InvalidArgument = 1,
    /// The shell is not in a state that allows the operation.
    NotInitialized = 2,
    /// A command with the same name already exists.
    AlreadyRegistered = 3,
    /// Internal error.
    Internal = 4,
    /// Feature not supported by this build.
    Unsupported = 5,
    /// The requested item (usually a command) does not exist.
    NotFound = 6,
    /// Authentication error.
    NotAuthenticated = 7,
    /// Permission error.
    PermissionDenied = 8,
    /// Feature not implemented.
    NotImplemented = 9,
}

impl ResultCode {
    /// Every known code, in ordinal order.
    pub const ALL: [ResultCode; 10] = [
        ResultCode::Ok,
        ResultCode::InvalidArgument,
        ResultCode::NotInitialized,
        ResultCode::AlreadyRegistered,
        ResultCode::Internal,
        ResultCode::Unsupported,
        ResultCode::NotFound,
        ResultCode::NotAuthenticated,
        ResultCode::PermissionDenied,
        ResultCode::NotImplemented,
    ];

    /// Convert a raw ordinal back into a code. Unknown values yield `None`.
    pub fn from_raw(raw: i64) -> Option<Self> {
        usize::try_from(raw)
            .ok()
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    pub fn as_raw(self) -> u32 {
        self as u32
    }

    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }

    /// Stable symbolic name, as used on the IPC wire.
    pub fn name(self) -> &'static str {
        match self {
            ResultCode::Ok => "FN_OK",
            ResultCode::InvalidArgument => "FN_ERR_INVALID_ARGUMENT",
            ResultCode::NotInitialized => "FN_ERR_NOT_INITIALIZED",
            ResultCode::AlreadyRegistered => "FN_ERR_ALREADY_REGISTERED",
            ResultCode::Internal => "FN_ERR_INTERNAL",
            ResultCode::Unsupported => "FN_ERR_UNSUPPORTED",
            ResultCode::NotFound => "FN_ERR_NOT_FOUND",
            ResultCode::NotAuthenticated => "FN_ERR_NOT_AUTHENTICATED",
            ResultCode::PermissionDenied => "FN_ERR_PERMISSION_DENIED",
            ResultCode::NotImplemented => "FN_ERR_NOT_IMPLEMENTED",
        }
    }

    /// Human readable description of the code.
    pub fn description(self) -> &'static str {
        match self {
            ResultCode::Ok => "Operation completed successfully",
            ResultCode::InvalidArgument => "Invalid argument",
            ResultCode::NotInitialized => "Not initialized",
            ResultCode::AlreadyRegistered => "Command already registered",
            ResultCode::Internal => "Internal error",
            ResultCode::Unsupported => "Feature not supported",
            ResultCode::NotFound => "Not found",
            ResultCode::NotAuthenticated => "Not authenticated",
            ResultCode::PermissionDenied => "Permission denied",
            ResultCode::NotImplemented => "Feature not implemented",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Errors produced by the shell engine.
///
/// Every variant maps onto exactly one [`ResultCode`] via [`ShellError::code`].
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("not initialized: {0}")]
    NotInitialized(&'static str),
    #[error("command '{0}' is already registered")]
    AlreadyRegistered(String),
    #[error("unknown command: '{0}'")]
    NotFound(String),
    #[error("command '{command}' failed: {code}")]
    Handler { command: String, code: ResultCode },
    #[error("{0} is not supported by this build")]
    Unsupported(&'static str),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShellError {
    pub fn code(&self) -> ResultCode {
        match self {
            ShellError::InvalidArgument(_) | ShellError::Parse(_) => ResultCode::InvalidArgument,
            ShellError::NotInitialized(_) => ResultCode::NotInitialized,
            ShellError::AlreadyRegistered(_) => ResultCode::AlreadyRegistered,
            ShellError::NotFound(_) => ResultCode::NotFound,
            ShellError::Handler { code, .. } => *code,
            ShellError::Unsupported(_) => ResultCode::Unsupported,
            ShellError::Internal(_) | ShellError::Io(_) | ShellError::Json(_) => {
                ResultCode::Internal
            }
        }
    }
}

/// A `key=value` pair (or a positional argument, keyed `argN`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub key: String,
    pub value: String,
}

/// A boolean flag such as `-formal`, stored without its leading dashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
    pub name: String,
    pub present: bool,
}

/// Owned result of parsing one input line.
///
/// Built by the parser and dropped as soon as the handler that receives its
/// [`CommandView`] returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub main_command: String,
    pub subcommands: Vec<Param>,
    pub flags: Vec<Flag>,
}

impl ParsedCommand {
    /// Read-only view handed to command handlers.
    pub fn view(&self) -> CommandView<'_> {
        CommandView {
            main_command: &self.main_command,
            subcommands: &self.subcommands,
            flags: &self.flags,
        }
    }
}

/// Read-only view of a parsed command, valid for the duration of one handler call.
///
/// Handlers that need to keep any of this data must copy it.
#[derive(Debug, Clone, Copy)]
pub struct CommandView<'a> {
    main_command: &'a str,
    subcommands: &'a [Param],
    flags: &'a [Flag],
}

impl<'a> CommandView<'a> {
    pub fn main_command(&self) -> &'a str {
        self.main_command
    }

    pub fn subcommands(&self) -> &'a [Param] {
        self.subcommands
    }

    pub fn flags(&self) -> &'a [Flag] {
        self.flags
    }

    /// Value of the first subcommand with this key. Duplicate keys are first-wins.
    pub fn get_param(&self, key: &str) -> Option<&'a str> {
        self.subcommands
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.iter().any(|f| f.present && f.name == name)
    }

    /// The `index`-th positional argument (stored under the key `arg<index>`).
    pub fn positional(&self, index: usize) -> Option<&'a str> {
        self.get_param(&positional_key(index))
    }

    /// All positional arguments in order of appearance.
    pub fn positionals(&self) -> Vec<&'a str> {
        (0..)
            .map(|i| self.positional(i))
            .take_while(Option::is_some)
            .flatten()
            .collect()
    }
}

/// Key under which the `index`-th positional token is stored.
pub fn positional_key(index: usize) -> String {
    format!("arg{index}")
}

/// Null-tolerant parameter lookup, mirroring `fn_get_param`.
pub fn get_param<'a>(cmd: Option<&CommandView<'a>>, key: Option<&str>) -> Option<&'a str> {
    cmd.zip(key).and_then(|(cmd, key)| cmd.get_param(key))
}

/// Null-tolerant flag check, mirroring `fn_has_flag`.
pub fn has_flag(cmd: Option<&CommandView<'_>>, name: Option<&str>) -> bool {
    cmd.zip(name).is_some_and(|(cmd, name)| cmd.has_flag(name))
}

/// Anything that can serve a registered command.
///
/// Closures with the matching signature implement this trait; the C ABI layer
/// implements it for foreign function pointers.
pub trait CommandHandler: Send + Sync {
    /// Run the command. Output goes through `out` so it lands in the caller's session.
    fn call(&self, cmd: &CommandView<'_>, out: &Output<'_>) -> ResultCode;
}

impl<F> CommandHandler for F
where
    F: Fn(&CommandView<'_>, &Output<'_>) -> ResultCode + Send + Sync,
{
    fn call(&self, cmd: &CommandView<'_>, out: &Output<'_>) -> ResultCode {
        self(cmd, out)
    }
}

/// A handler paired with an explicit user context value.
pub(crate) struct WithContext<C, F> {
    pub(crate) context: C,
    pub(crate) handler: F,
}

impl<C, F> CommandHandler for WithContext<C, F>
where
    C: Send + Sync,
    F: Fn(&CommandView<'_>, &Output<'_>, &C) -> ResultCode + Send + Sync,
{
    fn call(&self, cmd: &CommandView<'_>, out: &Output<'_>) -> ResultCode {
        (self.handler)(cmd, out, &self.context)
    }
}
