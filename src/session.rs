//! Session table and output routing.
//!
//! A session is the unit of output attribution: one per interactive run, one
//! per IPC connection, or one per explicit association made by an embedder.
//! Handler output is appended to the sink of the session it was dispatched
//! for; output with no session goes to the instance-wide console.
//!
//! Sessions are reference counted by their holders. Opening a session and
//! binding a thread to it each add a holder; closing and unbinding each drop
//! one. The session is destroyed when the last holder lets go, and any output
//! nobody collected is handed back to whoever released it.

use crate::command::ShellError;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

pub type SessionId = i32;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Session bound to the current thread, keyed by session manager instance.
    static THREAD_SESSIONS: RefCell<HashMap<u64, SessionId>> = RefCell::new(HashMap::new());
}

fn bound_session(instance: u64) -> Option<SessionId> {
    THREAD_SESSIONS.with(|bindings| bindings.borrow().get(&instance).copied())
}

/// Replace the current thread's binding, returning the previous one.
fn set_bound_session(instance: u64, session: Option<SessionId>) -> Option<SessionId> {
    THREAD_SESSIONS.with(|bindings| {
        let mut bindings = bindings.borrow_mut();
        match session {
            Some(id) => bindings.insert(instance, id),
            None => bindings.remove(&instance),
        }
    })
}

enum Sink {
    /// Writes straight through to the console.
    Console,
    /// Append-only capture, drained by whoever owns the session.
    Buffer(String),
}

struct Session {
    sink: Sink,
    holders: usize,
}

#[derive(Default)]
struct SessionTable {
    sessions: HashMap<SessionId, Session>,
    next_id: SessionId,
}

impl SessionTable {
    fn allocate(&mut self) -> SessionId {
        loop {
            self.next_id = if self.next_id == SessionId::MAX {
                1
            } else {
                self.next_id + 1
            };
            if !self.sessions.contains_key(&self.next_id) {
                return self.next_id;
            }
        }
    }
}

/// Maps calling contexts to sessions and routes output to their sinks.
pub struct SessionManager {
    instance: u64,
    table: Mutex<SessionTable>,
    console: Mutex<Box<dyn Write + Send>>,
}

impl SessionManager {
    pub fn new(console: Box<dyn Write + Send>) -> Self {
        Self {
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            table: Mutex::new(SessionTable::default()),
            console: Mutex::new(console),
        }
    }

    /// Open a session whose output goes straight to the console.
    pub fn open_console(&self) -> SessionId {
        self.open(Sink::Console)
    }

    /// Open a session that captures its output.
    pub fn open_buffered(&self) -> SessionId {
        self.open(Sink::Buffer(String::new()))
    }

    fn open(&self, sink: Sink) -> SessionId {
        let mut table = self.table.lock();
        let id = table.allocate();
        table.sessions.insert(id, Session { sink, holders: 1 });
        debug!(session = id, "opened session");
        id
    }

    /// Drop the holder taken by `open_*`. Returns output nobody collected.
    pub fn close(&self, id: SessionId) -> Option<String> {
        self.release(id)
    }

    /// Bind the current thread to `id`, creating a capturing session on first use.
    ///
    /// A previous binding of this thread is released first.
    pub fn associate(&self, id: SessionId) -> Result<(), ShellError> {
        if id < 0 {
            return Err(ShellError::InvalidArgument(format!(
                "session id must not be negative, got {id}"
            )));
        }
        if self.current() == Some(id) {
            return Ok(());
        }
        self.hold(id);
        if let Some(previous) = set_bound_session(self.instance, Some(id)) {
            if let Some(rest) = self.release(previous) {
                self.write_console(&rest);
            }
        }
        Ok(())
    }

    /// Remove the current thread's binding. Returns output nobody collected if
    /// this released the last holder of the session.
    pub fn clear(&self) -> Option<String> {
        let previous = set_bound_session(self.instance, None)?;
        self.release(previous)
    }

    /// Session bound to the current thread, if any.
    pub fn current(&self) -> Option<SessionId> {
        bound_session(self.instance)
    }

    /// Bind the current thread to `id` until the returned guard is dropped,
    /// then restore whatever binding the thread had before.
    ///
    /// Code running inside the scope may rebind or clear the thread. The guard
    /// releases whichever binding is installed when it drops.
    pub fn bind_scoped(&self, id: SessionId) -> ScopedBinding<'_> {
        self.hold(id);
        let previous = set_bound_session(self.instance, Some(id));
        ScopedBinding {
            manager: self,
            previous,
        }
    }

    /// Route `text` through the session bound to the current thread.
    pub fn print(&self, text: &str) {
        self.write(self.current(), text)
    }

    /// Route `text` to an explicit session, or the console for `None`.
    pub fn write(&self, session: Option<SessionId>, text: &str) {
        if let Some(id) = session {
            let mut table = self.table.lock();
            match table.sessions.get_mut(&id) {
                Some(Session {
                    sink: Sink::Buffer(buf),
                    ..
                }) => {
                    buf.push_str(text);
                    return;
                }
                Some(_) => {}
                None => warn!(session = id, "output for unknown session sent to console"),
            }
        }
        self.write_console(text);
    }

    pub fn write_console(&self, text: &str) {
        let mut console = self.console.lock();
        if let Err(e) = console
            .write_all(text.as_bytes())
            .and_then(|_| console.flush())
        {
            warn!(error = %e, "failed to write to console");
        }
    }

    /// Drain the captured output of a session.
    pub fn take_output(&self, id: SessionId) -> String {
        match self.table.lock().sessions.get_mut(&id) {
            Some(Session {
                sink: Sink::Buffer(buf),
                ..
            }) => std::mem::take(buf),
            _ => String::new(),
        }
    }

    pub fn is_open(&self, id: SessionId) -> bool {
        self.table.lock().sessions.contains_key(&id)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.table.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn hold(&self, id: SessionId) {
        let mut table = self.table.lock();
        table
            .sessions
            .entry(id)
            .or_insert_with(|| {
                debug!(session = id, "created session on first association");
                Session {
                    sink: Sink::Buffer(String::new()),
                    holders: 0,
                }
            })
            .holders += 1;
    }

    fn release(&self, id: SessionId) -> Option<String> {
        let mut table = self.table.lock();
        let session = table.sessions.get_mut(&id)?;
        session.holders = session.holders.saturating_sub(1);
        if session.holders > 0 {
            return None;
        }
        let session = table.sessions.remove(&id)?;
        debug!(session = id, "closed session");
        match session.sink {
            Sink::Buffer(buf) if !buf.is_empty() => Some(buf),
            _ => None,
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        let _ = THREAD_SESSIONS.try_with(|bindings| bindings.borrow_mut().remove(&self.instance));
    }
}

/// Guard returned by [`SessionManager::bind_scoped`].
///
/// Every thread binding owns one holder of its session, so on drop the guard
/// releases the binding it finds, not necessarily the one it installed.
pub struct ScopedBinding<'a> {
    manager: &'a SessionManager,
    previous: Option<SessionId>,
}

impl Drop for ScopedBinding<'_> {
    fn drop(&mut self) {
        let Some(installed) = set_bound_session(self.manager.instance, self.previous) else {
            return;
        };
        if let Some(rest) = self.manager.release(installed) {
            self.manager.write_console(&rest);
        }
    }
}

/// Output handle passed to command handlers.
///
/// Carries the session explicitly, so handlers never depend on which thread
/// they run on.
pub struct Output<'a> {
    sessions: &'a SessionManager,
    session: Option<SessionId>,
}

impl<'a> Output<'a> {
    pub(crate) fn new(sessions: &'a SessionManager, session: Option<SessionId>) -> Self {
        Self { sessions, session }
    }

    pub fn print(&self, text: &str) {
        self.sessions.write(self.session, text);
    }

    pub fn println(&self, text: &str) {
        self.sessions.write(self.session, &format!("{text}\n"));
    }

    /// The session this output is attributed to; `None` means the console.
    pub fn session_id(&self) -> Option<SessionId> {
        self.session
    }
}
