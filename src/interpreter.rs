use crate::builtin::{self, Flow};
use crate::command::{CommandHandler, CommandView, ResultCode, ShellError, WithContext};
use crate::config::{ExecutionMode, ShellConfig};
use crate::io_adapters::{EditorReader, Input, LineReader, ThreadedReader};
use crate::ipc;
use crate::parser;
use crate::registry::Registry;
use crate::session::{Output, SessionId, SessionManager};
use parking_lot::Mutex;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

/// Lifecycle of a shell instance: `Idle → {Interactive, Daemon} → Stopped`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle = 0,
    Interactive = 1,
    Daemon = 2,
    Stopped = 3,
}

impl EngineState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => EngineState::Idle,
            1 => EngineState::Interactive,
            2 => EngineState::Daemon,
            _ => EngineState::Stopped,
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, EngineState::Interactive | EngineState::Daemon)
    }
}

struct Settings {
    config: ShellConfig,
    header: Option<String>,
    mode: ExecutionMode,
}

/// State shared between the shell handle, stop handles and daemon workers.
pub(crate) struct Core {
    settings: Mutex<Settings>,
    pub(crate) registry: Registry,
    pub(crate) sessions: SessionManager,
    state: AtomicU8,
    stop_requested: AtomicBool,
    /// Thread blocked in `run()`, while it runs.
    loop_thread: Mutex<Option<ThreadId>>,
}

impl Core {
    pub(crate) fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Async-signal-safe: atomic loads and one atomic store, nothing else.
    fn request_stop(&self) -> Result<(), ShellError> {
        if self.state().is_running() {
            self.stop_requested.store(true, Ordering::Release);
            Ok(())
        } else {
            Err(ShellError::NotInitialized("shell is not running"))
        }
    }

    /// Leave `Idle` for the configured mode. Returns the mode and a config snapshot.
    fn begin(&self, interactive_only: bool) -> Result<(ExecutionMode, ShellConfig), ShellError> {
        let settings = self.settings.lock();
        let target = match settings.mode {
            ExecutionMode::Interactive => EngineState::Interactive,
            ExecutionMode::Daemon { .. } if interactive_only => {
                return Err(ShellError::InvalidArgument(
                    "daemon mode is selected; use run() to serve IPC clients".to_string(),
                ));
            }
            ExecutionMode::Daemon { .. } => EngineState::Daemon,
        };
        self.state
            .compare_exchange(
                EngineState::Idle as u8,
                target as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| ShellError::NotInitialized("run() is only valid once, from the idle state"))?;
        *self.loop_thread.lock() = Some(thread::current().id());
        info!(app = %settings.config.app_name, state = ?target, "shell started");
        Ok((settings.mode.clone(), settings.config.clone()))
    }

    fn finish(&self, result: &Result<(), ShellError>) {
        match result {
            Ok(()) => info!("shell stopped"),
            Err(e) => error!(error = %e, "shell stopped with an error"),
        }
        self.loop_thread.lock().take();
        self.state.store(EngineState::Stopped as u8, Ordering::Release);
    }

    fn on_loop_thread(&self) -> bool {
        *self.loop_thread.lock() == Some(thread::current().id())
    }

    /// The dispatch path shared by the REPL, one-shot execution and IPC workers.
    ///
    /// When `session` is given, the calling thread is bound to it for the
    /// duration of the call so thread-based output routing agrees with `Output`.
    pub(crate) fn dispatch(
        &self,
        line: &str,
        session: Option<SessionId>,
    ) -> Result<Flow, ShellError> {
        let _binding = session
            .filter(|&id| self.sessions.current() != Some(id))
            .map(|id| self.sessions.bind_scoped(id));

        let parsed = parser::parse(line)?;
        let cmd = parsed.view();
        let out = Output::new(&self.sessions, session);

        if let Some(result) = builtin::dispatch(&cmd, &self.registry, &out) {
            return result;
        }

        let entry = self.registry.lookup(cmd.main_command())?;
        debug!(command = entry.name(), ?session, "dispatching command");
        match panic::catch_unwind(AssertUnwindSafe(|| entry.handler().call(&cmd, &out))) {
            Ok(ResultCode::Ok) => Ok(Flow::Continue),
            Ok(code) => Err(ShellError::Handler {
                command: entry.name().to_string(),
                code,
            }),
            Err(_) => {
                error!(command = entry.name(), "command handler panicked");
                Err(ShellError::Internal(format!(
                    "handler for '{}' panicked",
                    entry.name()
                )))
            }
        }
    }

    fn run_interactive(
        &self,
        reader: &mut dyn LineReader,
        config: &ShellConfig,
    ) -> Result<(), ShellError> {
        let session = self.sessions.open_console();
        let result = {
            let _bound = self.sessions.bind_scoped(session);
            self.print_header(session, &config.app_name);
            self.repl(reader, &config.prompt(), session)
        };
        self.sessions.close(session);
        result
    }

    fn repl(
        &self,
        reader: &mut dyn LineReader,
        prompt: &str,
        session: SessionId,
    ) -> Result<(), ShellError> {
        info!(session, "interactive loop started");
        while !self.stop_requested() {
            let line = match reader.read_line(prompt)? {
                Input::Line(line) => line,
                Input::Idle => continue,
                Input::Interrupted => {
                    info!("interrupted at the prompt");
                    break;
                }
                Input::Eof => {
                    debug!("end of input");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match self.dispatch(&line, Some(session)) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break,
                Err(err) => self.report(session, &err),
            }
        }
        Ok(())
    }

    fn print_header(&self, session: SessionId, app_name: &str) {
        let header = self
            .settings
            .lock()
            .header
            .clone()
            .unwrap_or_else(|| {
                format!("Welcome to {app_name}!\nType 'fhelp' to list commands, 'exit' to quit.\n")
            });
        if header.is_empty() {
            return;
        }
        let out = Output::new(&self.sessions, Some(session));
        if header.ends_with('\n') {
            out.print(&header);
        } else {
            out.println(&header);
        }
    }

    /// Tell the user about a failed command. Never fatal to the loop.
    fn report(&self, session: SessionId, err: &ShellError) {
        let message = match err {
            ShellError::NotFound(name) => {
                format!("Unknown command: '{name}'. Type 'fhelp' for a list of commands.\n")
            }
            ShellError::Handler { command, code } => {
                debug!(command = %command, code = code.name(), "command failed");
                format!("Command '{command}' failed: {code} ({})\n", code.name())
            }
            ShellError::Parse(e) => format!("Parse error: {e}\n"),
            other => {
                if other.code() == ResultCode::Internal {
                    warn!(error = %other, "command dispatch failed");
                }
                format!("Error: {other}\n")
            }
        };
        self.sessions.write(Some(session), &message);
    }
}

/// An embeddable command shell.
///
/// Register commands, pick an [`ExecutionMode`], then call [`Shell::run`],
/// which blocks until [`Shell::stop`] (or end of input). A shell runs once:
/// after `run` returns it stays `Stopped`.
///
/// ```no_run
/// use fshell::{ResultCode, Shell};
///
/// let shell = Shell::new("HelloWorld").unwrap();
/// shell
///     .register_command("hello", "Say hello", |cmd, out| {
///         let name = cmd.get_param("name").unwrap_or("World");
///         out.println(&format!("Hello, {name}!"));
///         ResultCode::Ok
///     })
///     .unwrap();
/// shell.run().unwrap();
/// ```
pub struct Shell {
    core: Arc<Core>,
}

impl Shell {
    /// Create a shell printing to stdout, configured from the process environment.
    pub fn new(app_name: &str) -> Result<Self, ShellError> {
        Self::with_console(ShellConfig::new(app_name), Box::new(std::io::stdout()))
    }

    /// Create a shell with an explicit configuration and console sink.
    pub fn with_console(
        config: ShellConfig,
        console: Box<dyn Write + Send>,
    ) -> Result<Self, ShellError> {
        if config.app_name.is_empty() {
            return Err(ShellError::InvalidArgument(
                "application name must not be empty".to_string(),
            ));
        }
        info!(app = %config.app_name, "created shell instance");
        Ok(Self {
            core: Arc::new(Core {
                settings: Mutex::new(Settings {
                    config,
                    header: None,
                    mode: ExecutionMode::Interactive,
                }),
                registry: Registry::new(),
                sessions: SessionManager::new(console),
                state: AtomicU8::new(EngineState::Idle as u8),
                stop_requested: AtomicBool::new(false),
                loop_thread: Mutex::new(None),
            }),
        })
    }

    pub fn app_name(&self) -> String {
        self.core.settings.lock().config.app_name.clone()
    }

    pub fn state(&self) -> EngineState {
        self.core.state()
    }

    /// Set the welcome header printed when the interactive loop starts.
    /// An empty header suppresses it.
    pub fn register_header(&self, header: &str) {
        self.core.settings.lock().header = Some(header.to_string());
    }

    /// Choose how `run()` drives the shell. Only valid before `run()`.
    pub fn set_execution_mode(&self, mode: ExecutionMode) -> Result<(), ShellError> {
        let mut settings = self.core.settings.lock();
        if self.core.state() != EngineState::Idle {
            return Err(ShellError::NotInitialized(
                "the execution mode can only be changed before run()",
            ));
        }
        debug!(?mode, "execution mode set");
        settings.mode = mode;
        Ok(())
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.core.settings.lock().mode.clone()
    }

    /// Socket path daemon mode serves on, or `None` in interactive mode.
    pub fn channel_path(&self) -> Option<PathBuf> {
        let settings = self.core.settings.lock();
        match &settings.mode {
            ExecutionMode::Interactive => None,
            ExecutionMode::Daemon { channel } => Some(settings.config.channel_path(channel)),
        }
    }

    /// Register a command handled by a closure.
    pub fn register_command<F>(&self, name: &str, help: &str, handler: F) -> Result<(), ShellError>
    where
        F: Fn(&CommandView<'_>, &Output<'_>) -> ResultCode + Send + Sync + 'static,
    {
        self.register_handler(name, help, Arc::new(handler))
    }

    /// Register a command whose handler receives an explicit context value.
    pub fn register_command_with<C, F>(
        &self,
        name: &str,
        help: &str,
        context: C,
        handler: F,
    ) -> Result<(), ShellError>
    where
        C: Send + Sync + 'static,
        F: Fn(&CommandView<'_>, &Output<'_>, &C) -> ResultCode + Send + Sync + 'static,
    {
        self.register_handler(name, help, Arc::new(WithContext { context, handler }))
    }

    pub fn register_handler(
        &self,
        name: &str,
        help: &str,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<(), ShellError> {
        self.core.registry.register(name, help, handler)
    }

    /// `(name, help)` of every registered command, sorted by name.
    pub fn commands(&self) -> Vec<(String, String)> {
        self.core.registry.list()
    }

    /// Run in the configured mode, blocking until stopped.
    ///
    /// The terminal editor runs on a reader thread, so `stop()` ends the
    /// interactive loop within [`crate::io_adapters::READ_POLL`] even while a
    /// prompt is waiting for input.
    pub fn run(&self) -> Result<(), ShellError> {
        let (mode, config) = self.core.begin(false)?;
        let result = match &mode {
            ExecutionMode::Interactive => {
                let history = config.history_size();
                ThreadedReader::spawn(move || EditorReader::new(history))
                    .and_then(|mut reader| self.core.run_interactive(&mut reader, &config))
            }
            ExecutionMode::Daemon { channel } => {
                ipc::serve(Arc::clone(&self.core), &config.channel_path(channel))
            }
        };
        self.core.finish(&result);
        result
    }

    /// Run the interactive loop on lines from `reader` instead of the terminal.
    pub fn run_with(&self, reader: &mut dyn LineReader) -> Result<(), ShellError> {
        let (_, config) = self.core.begin(true)?;
        let result = self.core.run_interactive(reader, &config);
        self.core.finish(&result);
        result
    }

    /// Ask a running loop to return. Safe to call from a signal handler.
    pub fn stop(&self) -> Result<(), ShellError> {
        self.core.request_stop()
    }

    /// A cloneable handle that can stop this shell from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            core: Arc::clone(&self.core),
        }
    }

    /// Stop a running loop and wait for it to return.
    ///
    /// Called from the loop's own thread (from inside a handler), this only
    /// requests the stop; the loop returns once the handler does.
    pub fn shutdown(&self) {
        if self.core.request_stop().is_ok() {
            info!("waiting for the running loop to return");
        }
        if self.core.on_loop_thread() {
            debug!("shutdown requested from the loop thread");
            return;
        }
        while self.core.state().is_running() {
            thread::sleep(SHUTDOWN_POLL);
        }
    }

    /// Execute one command line on the calling thread.
    ///
    /// Output goes to the session bound to this thread, or the console. `exit`
    /// asks a running loop to stop.
    pub fn execute(&self, line: &str) -> Result<(), ShellError> {
        match self.core.dispatch(line, self.core.sessions.current())? {
            Flow::Continue => Ok(()),
            Flow::Exit => {
                if self.core.request_stop().is_err() {
                    debug!("exit executed while no loop is running");
                }
                Ok(())
            }
        }
    }

    /// Print through the session bound to the calling thread.
    pub fn print(&self, text: &str) {
        self.core.sessions.print(text);
    }

    pub(crate) fn write_console(&self, text: &str) {
        self.core.sessions.write_console(text);
    }

    pub fn current_session_id(&self) -> Option<SessionId> {
        self.core.sessions.current()
    }

    /// Bind the calling thread to a session, creating it on first use.
    pub fn set_thread_session_id(&self, id: SessionId) -> Result<(), ShellError> {
        self.core.sessions.associate(id)
    }

    /// Unbind the calling thread. Returns output the session captured but
    /// nobody collected, if this destroyed the session.
    pub fn clear_thread_session_id(&self) -> Option<String> {
        self.core.sessions.clear()
    }

    /// Drain the output captured by a session.
    pub fn take_output(&self, id: SessionId) -> String {
        self.core.sessions.take_output(id)
    }

    /// Number of live sessions.
    pub fn active_sessions(&self) -> usize {
        self.core.sessions.len()
    }
}

/// Stops a shell from any thread or signal handler.
#[derive(Clone)]
pub struct StopHandle {
    core: Arc<Core>,
}

impl StopHandle {
    pub fn stop(&self) -> Result<(), ShellError> {
        self.core.request_stop()
    }

    pub fn state(&self) -> EngineState {
        self.core.state()
    }
}
