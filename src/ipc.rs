//! Daemon transport: newline-delimited commands over a Unix domain socket.
//!
//! Each request is one line of plain text, the same thing a user would type
//! at the prompt. Each response is one line of JSON:
//!
//! ```text
//! {"code":0,"status":"FN_OK","output":"Hello, World!\n","error":null}
//! ```
//!
//! Every connection gets its own capturing session, so concurrent clients never
//! see each other's output.

use crate::command::{ResultCode, ShellError};
use crate::interpreter::Core;
use crate::parser::ParseError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Maximum accepted request length in bytes (1 MiB). Longer requests get an
/// error response and the connection is closed.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// One reply from the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Raw [`ResultCode`] ordinal.
    pub code: u32,
    /// Symbolic name of `code`, e.g. `FN_OK`.
    pub status: String,
    /// Everything the command printed.
    pub output: String,
    pub error: Option<String>,
}

impl Response {
    fn ok(output: String) -> Self {
        Self {
            code: ResultCode::Ok.as_raw(),
            status: ResultCode::Ok.name().to_string(),
            output,
            error: None,
        }
    }

    fn failure(err: &ShellError, output: String) -> Self {
        let code = err.code();
        Self {
            code: code.as_raw(),
            status: code.name().to_string(),
            output,
            error: Some(err.to_string()),
        }
    }

    /// The result code, with unknown ordinals read as `Internal`.
    pub fn result(&self) -> ResultCode {
        ResultCode::from_raw(i64::from(self.code)).unwrap_or(ResultCode::Internal)
    }

    pub fn is_ok(&self) -> bool {
        self.result().is_ok()
    }
}

#[cfg(unix)]
pub(crate) fn serve(core: Arc<Core>, socket_path: &Path) -> Result<(), ShellError> {
    unix::serve(core, socket_path)
}

#[cfg(not(unix))]
pub(crate) fn serve(_core: Arc<Core>, _socket_path: &Path) -> Result<(), ShellError> {
    Err(ShellError::Unsupported("daemon mode"))
}

/// Connect to a daemon, send one command line and wait for its response.
#[cfg(unix)]
pub fn send_command(socket_path: &Path, line: &str) -> Result<Response, ShellError> {
    Client::connect(socket_path)?.send(line)
}

#[cfg(not(unix))]
pub fn send_command(_socket_path: &Path, _line: &str) -> Result<Response, ShellError> {
    Err(ShellError::Unsupported("daemon mode"))
}

#[cfg(unix)]
pub use unix::Client;

fn check_request(line: &str) -> Result<(), ShellError> {
    if line.trim().is_empty() {
        return Err(ParseError::Empty.into());
    }
    if line.contains('\n') {
        return Err(ShellError::InvalidArgument(
            "a request must be a single line".to_string(),
        ));
    }
    if line.len() > MAX_LINE_LENGTH {
        return Err(ShellError::InvalidArgument(format!(
            "request exceeds {MAX_LINE_LENGTH} bytes"
        )));
    }
    Ok(())
}

#[cfg(unix)]
mod unix {
    use super::{check_request, Response, MAX_LINE_LENGTH};
    use crate::builtin::Flow;
    use crate::command::ShellError;
    use crate::interpreter::Core;
    use crate::session::SessionId;
    use std::io::{self, BufRead, Write};
    use std::os::unix::fs::{FileTypeExt, PermissionsExt};
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
    use tokio::net::{UnixListener, UnixStream};
    use tokio::sync::watch;
    use tracing::{debug, info, warn};

    /// How often the stop flag is polled.
    const STOP_POLL: Duration = Duration::from_millis(50);
    /// Grace period for in-flight handlers once the server stops.
    const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

    pub(super) fn serve(core: Arc<Core>, socket_path: &Path) -> Result<(), ShellError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("fshell-ipc")
            .build()?;
        let result = runtime.block_on(listen(core, socket_path));
        runtime.shutdown_timeout(DRAIN_TIMEOUT);
        result
    }

    async fn listen(core: Arc<Core>, socket_path: &Path) -> Result<(), ShellError> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        remove_stale_socket(socket_path).await?;

        let listener = UnixListener::bind(socket_path)?;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        info!(path = %socket_path.display(), "IPC server listening");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(watch_stop_flag(Arc::clone(&core), shutdown_tx));

        let mut shutdown = shutdown_rx.clone();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let core = Arc::clone(&core);
                        let shutdown = shutdown_rx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(core, stream, shutdown).await {
                                debug!(error = %e, "connection ended with an error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
                _ = stopped(&mut shutdown) => break,
            }
        }

        if let Err(e) = std::fs::remove_file(socket_path) {
            warn!(path = %socket_path.display(), error = %e, "failed to remove socket");
        }
        info!("IPC server stopped");
        Ok(())
    }

    /// Clear the way for `bind`. Only a socket nobody is listening on is
    /// removed; a live socket or any other file is left alone and reported.
    async fn remove_stale_socket(socket_path: &Path) -> Result<(), ShellError> {
        let meta = match std::fs::symlink_metadata(socket_path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if !meta.file_type().is_socket() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists and is not a socket", socket_path.display()),
            )
            .into());
        }
        if UnixStream::connect(socket_path).await.is_ok() {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("another daemon is serving {}", socket_path.display()),
            )
            .into());
        }
        std::fs::remove_file(socket_path)?;
        debug!(path = %socket_path.display(), "removed stale socket");
        Ok(())
    }

    async fn watch_stop_flag(core: Arc<Core>, shutdown: watch::Sender<bool>) {
        let mut ticker = tokio::time::interval(STOP_POLL);
        loop {
            ticker.tick().await;
            if core.stop_requested() {
                info!("stop requested, shutting down IPC server");
                let _ = shutdown.send(true);
                return;
            }
        }
    }

    async fn stopped(shutdown: &mut watch::Receiver<bool>) {
        let _ = shutdown.wait_for(|&stop| stop).await;
    }

    /// Capturing session owned by one connection; closed however the
    /// connection ends.
    struct SessionLease {
        core: Arc<Core>,
        id: SessionId,
    }

    impl SessionLease {
        fn open(core: Arc<Core>) -> Self {
            let id = core.sessions.open_buffered();
            Self { core, id }
        }
    }

    impl Drop for SessionLease {
        fn drop(&mut self) {
            if let Some(rest) = self.core.sessions.close(self.id) {
                debug!(session = self.id, bytes = rest.len(), "discarded uncollected output");
            }
        }
    }

    #[derive(Debug, PartialEq, Eq)]
    pub(super) enum Segment {
        Line(Vec<u8>),
        TooLong,
    }

    /// Read up to the next `\n`, never buffering more than [`MAX_LINE_LENGTH`].
    /// A final unterminated line is returned as is; `None` means end of stream.
    pub(super) async fn next_segment<R>(reader: &mut R) -> io::Result<Option<Segment>>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut line = Vec::new();
        loop {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Ok((!line.is_empty()).then_some(Segment::Line(line)));
            }
            let newline = available.iter().position(|&b| b == b'\n');
            let chunk = &available[..newline.unwrap_or(available.len())];
            if line.len() + chunk.len() > MAX_LINE_LENGTH {
                return Ok(Some(Segment::TooLong));
            }
            line.extend_from_slice(chunk);
            let consumed = newline.map_or(available.len(), |i| i + 1);
            reader.consume(consumed);
            if newline.is_some() {
                return Ok(Some(Segment::Line(line)));
            }
        }
    }

    async fn handle_connection(
        core: Arc<Core>,
        stream: UnixStream,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ShellError> {
        let lease = SessionLease::open(Arc::clone(&core));
        let session = lease.id;
        debug!(session, "client connected");

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        loop {
            let segment = tokio::select! {
                segment = next_segment(&mut reader) => segment?,
                _ = stopped(&mut shutdown) => {
                    debug!(session, "closing connection for shutdown");
                    break;
                }
            };
            let bytes = match segment {
                None => break,
                Some(Segment::Line(bytes)) => bytes,
                Some(Segment::TooLong) => {
                    let err = ShellError::InvalidArgument(format!(
                        "request exceeds {MAX_LINE_LENGTH} bytes"
                    ));
                    warn!(session, "oversized request, closing connection");
                    write_response(&mut writer, &Response::failure(&err, String::new())).await?;
                    break;
                }
            };
            let Ok(line) = String::from_utf8(bytes) else {
                let err = ShellError::InvalidArgument("request is not valid UTF-8".to_string());
                write_response(&mut writer, &Response::failure(&err, String::new())).await?;
                continue;
            };
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let (result, output) = dispatch(Arc::clone(&core), line.to_string(), session).await;
            let response = match &result {
                Ok(_) => Response::ok(output),
                Err(e) => Response::failure(e, output),
            };
            write_response(&mut writer, &response).await?;
            if matches!(result, Ok(Flow::Exit)) {
                debug!(session, "client sent exit");
                break;
            }
        }

        debug!(session, "client disconnected");
        Ok(())
    }

    /// Run one command on the blocking pool and collect what it printed.
    async fn dispatch(
        core: Arc<Core>,
        line: String,
        session: SessionId,
    ) -> (Result<Flow, ShellError>, String) {
        tokio::task::spawn_blocking(move || {
            let result = core.dispatch(&line, Some(session));
            (result, core.sessions.take_output(session))
        })
        .await
        .unwrap_or_else(|e| {
            (
                Err(ShellError::Internal(format!("dispatch task failed: {e}"))),
                String::new(),
            )
        })
    }

    async fn write_response<W>(writer: &mut W, response: &Response) -> Result<(), ShellError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut json = serde_json::to_string(response)?;
        json.push('\n');
        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Blocking client for a running daemon. One connection, many requests.
    pub struct Client {
        reader: io::BufReader<std::os::unix::net::UnixStream>,
        writer: std::os::unix::net::UnixStream,
    }

    impl Client {
        pub fn connect(socket_path: &Path) -> Result<Self, ShellError> {
            let stream = std::os::unix::net::UnixStream::connect(socket_path)?;
            let writer = stream.try_clone()?;
            Ok(Self {
                reader: io::BufReader::new(stream),
                writer,
            })
        }

        /// Send one command line and wait for its response.
        pub fn send(&mut self, line: &str) -> Result<Response, ShellError> {
            check_request(line)?;
            self.writer.write_all(line.as_bytes())?;
            self.writer.write_all(b"\n")?;
            self.writer.flush()?;
            self.receive()
        }

        fn receive(&mut self) -> Result<Response, ShellError> {
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "daemon closed the connection",
                )
                .into());
            }
            Ok(serde_json::from_str(&line)?)
        }
    }
}
