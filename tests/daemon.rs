#![cfg(unix)]

use fshell::ipc::{self, Client, Response, MAX_LINE_LENGTH};
use fshell::{
    BufReadLines, CommandView, EngineState, ExecutionMode, Output, ResultCode, SharedBuffer,
    Shell, ShellConfig, ShellError,
};
use std::collections::HashSet;
use std::io::{BufRead, BufReader, Cursor, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn hello(cmd: &CommandView<'_>, out: &Output<'_>) -> ResultCode {
    match cmd.get_param("name") {
        Some(name) => out.println(&format!("Hello, {name}! Welcome to FShell.")),
        None => out.println("Hello, World! Welcome to FShell."),
    }
    ResultCode::Ok
}

fn build_shell(console: SharedBuffer, socket_dir: &Path) -> Shell {
    let mut config = ShellConfig::new("Daemon");
    config.set_var("FSHELL_SOCKET_DIR", socket_dir.to_string_lossy());
    let shell = Shell::with_console(config, Box::new(console)).unwrap();
    shell.register_header("");
    shell.register_command("hello", "Say hello", hello).unwrap();
    shell
        .register_command("fail", "Always denied", |_, _| ResultCode::PermissionDenied)
        .unwrap();
    shell
        .register_command("whoami", "Print the session id", |_, out| {
            out.println(&format!("session {:?}", out.session_id()));
            ResultCode::Ok
        })
        .unwrap();
    shell
        .register_command("slow", "Sleep for ms=<n> milliseconds", |cmd, out| {
            let ms = cmd.get_param("ms").and_then(|ms| ms.parse().ok()).unwrap_or(50);
            thread::sleep(Duration::from_millis(ms));
            out.print("done");
            ResultCode::Ok
        })
        .unwrap();
    shell
}

fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(10));
    }
}

struct Daemon {
    shell: Arc<Shell>,
    socket: PathBuf,
    runner: Option<JoinHandle<Result<(), ShellError>>>,
    _dir: TempDir,
}

impl Daemon {
    fn start() -> Self {
        Self::start_with(|_| {})
    }

    /// `prepare` runs against the socket path before the daemon binds it.
    fn start_with(prepare: impl FnOnce(&Path)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("test_ctrl.sock");
        prepare(&socket);

        let shell = Arc::new(build_shell(SharedBuffer::new(), dir.path()));
        shell
            .set_execution_mode(ExecutionMode::daemon(Some("test_ctrl")))
            .unwrap();
        let runner = {
            let shell = Arc::clone(&shell);
            thread::spawn(move || shell.run())
        };
        wait_until("daemon socket", || UnixStream::connect(&socket).is_ok());
        assert_eq!(shell.state(), EngineState::Daemon);

        Self {
            shell,
            socket,
            runner: Some(runner),
            _dir: dir,
        }
    }

    fn client(&self) -> Client {
        Client::connect(&self.socket).unwrap()
    }

    fn raw(&self) -> (UnixStream, BufReader<UnixStream>) {
        let stream = UnixStream::connect(&self.socket).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        (stream, reader)
    }

    fn stop(&mut self) -> Result<(), ShellError> {
        self.shell.stop().unwrap();
        self.runner.take().unwrap().join().unwrap()
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        if let Some(runner) = self.runner.take() {
            let _ = self.shell.stop();
            let _ = runner.join();
        }
    }
}

fn read_response(reader: &mut BufReader<UnixStream>) -> Option<Response> {
    let mut line = String::new();
    match reader.read_line(&mut line).unwrap() {
        0 => None,
        _ => Some(serde_json::from_str(&line).unwrap()),
    }
}

#[test]
fn test_daemon_output_matches_interactive() {
    let daemon = Daemon::start();
    let response = ipc::send_command(&daemon.socket, "hello name=World").unwrap();
    assert_eq!(response.result(), ResultCode::Ok);
    assert_eq!(response.status, "FN_OK");
    assert_eq!(response.error, None);

    let dir = tempfile::tempdir().unwrap();
    let console = SharedBuffer::new();
    let interactive = build_shell(console.clone(), dir.path());
    interactive
        .run_with(&mut BufReadLines::new(Cursor::new("hello name=World\n")))
        .unwrap();

    assert_eq!(response.output, "Hello, World! Welcome to FShell.\n");
    assert_eq!(response.output, console.contents());
}

#[test]
fn test_errors_keep_the_connection_open() {
    let daemon = Daemon::start();
    let mut client = daemon.client();

    let unknown = client.send("bogus").unwrap();
    assert_eq!(unknown.result(), ResultCode::NotFound);
    assert_eq!(unknown.error.as_deref(), Some("unknown command: 'bogus'"));

    let denied = client.send("fail").unwrap();
    assert_eq!(denied.result(), ResultCode::PermissionDenied);
    assert_eq!(denied.status, "FN_ERR_PERMISSION_DENIED");

    let malformed = client.send("hello 'unterminated").unwrap();
    assert_eq!(malformed.result(), ResultCode::InvalidArgument);
    assert_eq!(malformed.output, "");

    let ok = client.send("hello name=Again").unwrap();
    assert_eq!(ok.output, "Hello, Again! Welcome to FShell.\n");
}

#[test]
fn test_invalid_utf8_and_blank_lines() {
    let daemon = Daemon::start();
    let (mut stream, mut reader) = daemon.raw();

    stream.write_all(b"hello \xff\xfe\n\n  \nhello\n").unwrap();

    let invalid = read_response(&mut reader).unwrap();
    assert_eq!(invalid.result(), ResultCode::InvalidArgument);
    let ok = read_response(&mut reader).unwrap();
    assert_eq!(ok.result(), ResultCode::Ok);
    assert_eq!(ok.output, "Hello, World! Welcome to FShell.\n");
}

#[test]
fn test_oversized_request_closes_connection() {
    let daemon = Daemon::start();
    let (mut stream, mut reader) = daemon.raw();

    stream.write_all(&vec![b'x'; MAX_LINE_LENGTH + 1]).unwrap();

    let response = read_response(&mut reader).unwrap();
    assert_eq!(response.result(), ResultCode::InvalidArgument);
    assert!(read_response(&mut reader).is_none());

    let ok = daemon.client().send("hello").unwrap();
    assert!(ok.is_ok());
}

#[test]
fn test_exit_ends_only_that_connection() {
    let daemon = Daemon::start();
    let mut leaving = daemon.client();
    let mut staying = daemon.client();

    assert!(leaving.send("exit").unwrap().is_ok());
    assert!(leaving.send("hello").is_err());

    assert!(staying.send("hello").unwrap().is_ok());
    assert_eq!(daemon.shell.state(), EngineState::Daemon);
}

#[test]
fn test_abrupt_disconnect_releases_session() {
    let daemon = Daemon::start();
    {
        let (mut stream, _reader) = daemon.raw();
        stream.write_all(b"slow ms=100\n").unwrap();
    }
    thread::sleep(Duration::from_millis(20));

    let mut client = daemon.client();
    assert!(client.send("hello").unwrap().is_ok());
    drop(client);

    wait_until("sessions to be released", || {
        daemon.shell.active_sessions() == 0
    });
}

#[test]
fn test_concurrent_clients_are_isolated() {
    let daemon = Daemon::start();
    let socket = daemon.socket.clone();

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let socket = socket.clone();
            thread::spawn(move || {
                let mut client = Client::connect(&socket).unwrap();
                let session = client.send("whoami").unwrap().output;
                for _ in 0..20 {
                    let response = client.send(&format!("hello name=T{i}")).unwrap();
                    assert_eq!(
                        response.output,
                        format!("Hello, T{i}! Welcome to FShell.\n")
                    );
                    assert_eq!(client.send("whoami").unwrap().output, session);
                }
                session
            })
        })
        .collect();

    let sessions: HashSet<String> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    assert_eq!(sessions.len(), 8);
}

#[test]
fn test_socket_is_owner_only() {
    let daemon = Daemon::start();
    let mode = std::fs::metadata(&daemon.socket).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

/// Run a second daemon on `dir`'s `test_ctrl` channel; it should refuse to start.
fn run_rival(dir: &Path) -> ShellError {
    let shell = build_shell(SharedBuffer::new(), dir);
    shell
        .set_execution_mode(ExecutionMode::daemon(Some("test_ctrl")))
        .unwrap();
    shell.run().unwrap_err()
}

#[test]
fn test_dead_socket_is_replaced() {
    let daemon = Daemon::start_with(|socket| {
        drop(std::os::unix::net::UnixListener::bind(socket).unwrap());
        assert!(socket.exists());
    });
    assert!(daemon.client().send("hello").unwrap().is_ok());
}

#[test]
fn test_live_socket_is_not_taken_over() {
    let daemon = Daemon::start();
    let dir = daemon.socket.parent().unwrap();

    let err = run_rival(dir);
    assert_eq!(err.code(), ResultCode::Internal);

    assert!(daemon.socket.exists());
    assert!(daemon.client().send("hello").unwrap().is_ok());
}

#[test]
fn test_regular_file_is_not_clobbered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test_ctrl.sock");
    std::fs::write(&path, b"keep me").unwrap();

    let err = run_rival(dir.path());
    assert_eq!(err.code(), ResultCode::Internal);
    assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
}

#[test]
fn test_stop_shuts_down_daemon() {
    let mut daemon = Daemon::start();
    let mut idle = daemon.client();
    assert!(idle.send("hello").unwrap().is_ok());

    let started = Instant::now();
    daemon.stop().unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));

    assert_eq!(daemon.shell.state(), EngineState::Stopped);
    assert!(!daemon.socket.exists());
    assert!(idle.send("hello").is_err());
    assert!(ipc::send_command(&daemon.socket, "hello").is_err());
    assert_eq!(
        daemon.shell.run().unwrap_err().code(),
        ResultCode::NotInitialized
    );
}
