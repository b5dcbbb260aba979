use crate::command::ShellError;
use parking_lot::Mutex;
use rustyline::config::Config;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{BufRead, Result as IoResult, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// How long [`ThreadedReader`] waits for input before reporting [`Input::Idle`].
pub const READ_POLL: Duration = Duration::from_millis(50);

/// One attempt at reading input for the interactive loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A complete line, without its trailing newline.
    Line(String),
    /// Nothing was read yet; the loop gets a chance to observe `stop()`.
    Idle,
    /// The user pressed Ctrl+C at the prompt.
    Interrupted,
    /// No more input.
    Eof,
}

/// Source of command lines for the interactive loop.
///
/// Line editing is not part of the engine: anything that can produce lines
/// can drive the shell.
pub trait LineReader {
    fn read_line(&mut self, prompt: &str) -> Result<Input, ShellError>;
}

/// Terminal line editor backed by rustyline, with in-memory history.
pub struct EditorReader {
    editor: DefaultEditor,
}

impl EditorReader {
    pub fn new(history_size: usize) -> Result<Self, ShellError> {
        let config = Config::builder()
            .max_history_size(history_size)
            .map_err(readline_error)?
            .auto_add_history(true)
            .build();
        let editor = DefaultEditor::with_config(config).map_err(readline_error)?;
        Ok(Self { editor })
    }
}

impl LineReader for EditorReader {
    fn read_line(&mut self, prompt: &str) -> Result<Input, ShellError> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(Input::Line(line)),
            Err(ReadlineError::Interrupted) => Ok(Input::Interrupted),
            Err(ReadlineError::Eof) => Ok(Input::Eof),
            Err(err) => Err(readline_error(err)),
        }
    }
}

/// Runs a blocking [`LineReader`] on its own thread.
///
/// `read_line` waits at most [`READ_POLL`] and reports [`Input::Idle`] when
/// nothing arrived, so the interactive loop observes `stop()` even while the
/// terminal is blocked in a read. The next line is requested only after the
/// previous one was handed out, which keeps the prompt behind the output of
/// the last command.
///
/// If the loop returns while a read is pending, the reader thread exits after
/// that read completes.
pub struct ThreadedReader {
    requests: Sender<String>,
    inputs: Receiver<Result<Input, ShellError>>,
    pending: bool,
}

impl ThreadedReader {
    /// Build the inner reader on a new thread with `make_reader` and drive it there.
    pub fn spawn<R, F>(make_reader: F) -> Result<Self, ShellError>
    where
        R: LineReader,
        F: FnOnce() -> Result<R, ShellError> + Send + 'static,
    {
        let (requests, request_rx) = mpsc::channel::<String>();
        let (input_tx, inputs) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);

        thread::Builder::new()
            .name("fshell-reader".to_string())
            .spawn(move || {
                let mut reader = match make_reader() {
                    Ok(reader) => {
                        let _ = ready_tx.send(Ok(()));
                        reader
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                for prompt in request_rx {
                    let input = reader.read_line(&prompt);
                    let last = !matches!(input, Ok(Input::Line(_) | Input::Idle));
                    if input_tx.send(input).is_err() || last {
                        break;
                    }
                }
                debug!("reader thread finished");
            })?;

        ready_rx
            .recv()
            .map_err(|_| ShellError::Internal("reader thread exited during setup".to_string()))??;
        Ok(Self {
            requests,
            inputs,
            pending: false,
        })
    }
}

impl LineReader for ThreadedReader {
    fn read_line(&mut self, prompt: &str) -> Result<Input, ShellError> {
        if !self.pending {
            if self.requests.send(prompt.to_string()).is_err() {
                return Ok(Input::Eof);
            }
            self.pending = true;
        }
        match self.inputs.recv_timeout(READ_POLL) {
            Ok(input) => {
                self.pending = false;
                input
            }
            Err(RecvTimeoutError::Timeout) => Ok(Input::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(Input::Eof),
        }
    }
}

fn readline_error(err: ReadlineError) -> ShellError {
    match err {
        ReadlineError::Io(e) => ShellError::Io(e),
        other => ShellError::Internal(format!("line editor failed: {other}")),
    }
}

/// Reads lines from any buffered reader, e.g. a script or an in-memory buffer.
///
/// The prompt is not echoed.
pub struct BufReadLines<R> {
    reader: R,
}

impl<R: BufRead> BufReadLines<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> LineReader for BufReadLines<R> {
    fn read_line(&mut self, _prompt: &str) -> Result<Input, ShellError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(Input::Eof);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Input::Line(line))
    }
}

/// Memory-backed writer whose contents stay readable through any clone.
///
/// Useful as a console sink when the embedding application wants to capture
/// what the shell prints.
#[derive(Clone, Default)]
pub struct SharedBuffer {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded as UTF-8.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }

    /// Take everything written so far, leaving the buffer empty.
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.buf.lock());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf.lock().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_buf_read_lines_strips_line_endings() {
        let mut reader = BufReadLines::new(Cursor::new("hello\r\n\nlast"));
        assert_eq!(reader.read_line("> ").unwrap(), Input::Line("hello".into()));
        assert_eq!(reader.read_line("> ").unwrap(), Input::Line(String::new()));
        assert_eq!(reader.read_line("> ").unwrap(), Input::Line("last".into()));
        assert_eq!(reader.read_line("> ").unwrap(), Input::Eof);
    }

    /// Blocks like a terminal nobody types into until the sender is dropped.
    struct Blocking(Receiver<String>);

    impl LineReader for Blocking {
        fn read_line(&mut self, _prompt: &str) -> Result<Input, ShellError> {
            Ok(self.0.recv().map_or(Input::Eof, Input::Line))
        }
    }

    #[test]
    fn test_threaded_reader_reports_idle_while_blocked() {
        let (lines, rx) = mpsc::channel();
        let mut reader = ThreadedReader::spawn(move || Ok(Blocking(rx))).unwrap();

        assert_eq!(reader.read_line("> ").unwrap(), Input::Idle);
        assert_eq!(reader.read_line("> ").unwrap(), Input::Idle);

        lines.send("hello".to_string()).unwrap();
        let mut input = reader.read_line("> ").unwrap();
        while input == Input::Idle {
            input = reader.read_line("> ").unwrap();
        }
        assert_eq!(input, Input::Line("hello".into()));

        drop(lines);
        let mut input = reader.read_line("> ").unwrap();
        while input == Input::Idle {
            input = reader.read_line("> ").unwrap();
        }
        assert_eq!(input, Input::Eof);
        assert_eq!(reader.read_line("> ").unwrap(), Input::Eof);
    }

    #[test]
    fn test_threaded_reader_requests_one_line_at_a_time() {
        let mut reader =
            ThreadedReader::spawn(|| Ok(BufReadLines::new(Cursor::new("one\ntwo\n")))).unwrap();
        let mut seen = Vec::new();
        loop {
            match reader.read_line("> ").unwrap() {
                Input::Idle => continue,
                Input::Line(line) => seen.push(line),
                other => {
                    assert_eq!(other, Input::Eof);
                    break;
                }
            }
        }
        assert_eq!(seen, ["one", "two"]);
    }

    #[test]
    fn test_threaded_reader_setup_error() {
        let err = ThreadedReader::spawn(|| {
            Err::<BufReadLines<Cursor<&str>>, _>(ShellError::Unsupported("terminal"))
        })
        .err()
        .unwrap();
        assert_eq!(err.code(), crate::command::ResultCode::Unsupported);
    }

    #[test]
    fn test_shared_buffer_clones_see_writes() {
        let buffer = SharedBuffer::new();
        let mut writer = buffer.clone();
        write!(writer, "one {}", 1).unwrap();
        assert_eq!(buffer.contents(), "one 1");
        assert_eq!(buffer.take(), "one 1");
        assert_eq!(buffer.contents(), "");
    }
}
