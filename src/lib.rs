//! An embeddable command shell engine.
//!
//! Host applications register named commands with handlers, then hand control
//! to a [`Shell`] that either runs an interactive prompt or serves the same
//! commands to local clients over a Unix domain socket. Input lines look like
//!
//! ```text
//! greet name=Jane -formal "second positional"
//! ```
//!
//! and are parsed into a command name, `key=value` subcommands (positional
//! tokens are stored as `arg0`, `arg1`, ...) and boolean flags. Handler output
//! is attributed to a session, so concurrent callers never see each other's
//! output.
//!
//! The [`ffi`] module exposes the same engine through a stable C ABI.

mod builtin;
pub mod command;
pub mod config;
pub mod ffi;
mod interpreter;
pub mod io_adapters;
pub mod ipc;
mod lexer;
pub mod parser;
pub mod registry;
pub mod session;

pub use command::{CommandHandler, CommandView, Flag, Param, ParsedCommand, ResultCode, ShellError};
pub use config::{ExecutionMode, ShellConfig, DEFAULT_CHANNEL};
pub use interpreter::{EngineState, Shell, StopHandle};
pub use io_adapters::{BufReadLines, EditorReader, Input, LineReader, SharedBuffer, ThreadedReader};
pub use parser::{parse, quote, ParseError};
pub use session::{Output, SessionId};

pub const API_VERSION_MAJOR: u32 = 1;
pub const API_VERSION_MINOR: u32 = 0;
pub const API_VERSION_PATCH: u32 = 0;

/// Packed as `(major << 16) | (minor << 8) | patch`.
pub const API_VERSION: u32 =
    (API_VERSION_MAJOR << 16) | (API_VERSION_MINOR << 8) | API_VERSION_PATCH;

/// Optional features a build may provide. Values are bit positions in
/// [`capabilities`].
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    CommandRegistration = 1 << 0,
    InteractiveShell = 1 << 1,
    PluginApi = 1 << 2,
    SignalSafeStop = 1 << 3,
    DaemonMode = 1 << 4,
}

impl Capability {
    pub fn is_supported(self) -> bool {
        capabilities() & self as u32 != 0
    }
}

/// Bitmask of the [`Capability`] values this build supports.
pub fn capabilities() -> u32 {
    let mut caps = Capability::CommandRegistration as u32
        | Capability::InteractiveShell as u32
        | Capability::SignalSafeStop as u32;
    if cfg!(unix) {
        caps |= Capability::DaemonMode as u32;
    }
    caps
}

pub fn api_version() -> u32 {
    API_VERSION
}
