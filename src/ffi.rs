//! C ABI for embedding the shell from C or C++.
//!
//! Mirrors `fn_api.h`: an opaque `FnAPI` handle, `fn_*` functions returning
//! `FnResult` codes, and handlers receiving a borrowed `FnCommandData`.
//! Every entry point tolerates null pointers and never lets a panic unwind
//! into foreign code.

use crate::command::{CommandHandler, CommandView, ResultCode};
use crate::config::ExecutionMode;
use crate::interpreter::Shell;
use crate::session::Output;
use crate::{capabilities, API_VERSION};
use std::ffi::{c_char, c_int, c_void, CStr, CString, NulError};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::slice;
use std::sync::Arc;
use tracing::{error, warn};

pub const FN_MODE_INTERACTIVE: c_int = 0;
pub const FN_MODE_DAEMON: c_int = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FnKeyValue {
    pub key: *const c_char,
    pub value: *const c_char,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FnFlag {
    pub name: *const c_char,
    pub value: u8,
}

/// Parsed command as seen by a foreign handler. Valid only during the call.
#[repr(C)]
#[derive(Debug)]
pub struct FnCommandData {
    pub main_command: *const c_char,
    pub subcommands: *const FnKeyValue,
    pub subcommand_count: usize,
    pub flags: *const FnFlag,
    pub flag_count: usize,
}

pub type FnCommandHandler =
    Option<unsafe extern "C" fn(cmd: *const FnCommandData, user_data: *mut c_void) -> c_int>;

/// Opaque handle handed to C callers.
pub struct FnAPI {
    shell: Arc<Shell>,
}

/// Run `f`, turning a panic into `fallback`.
fn guard<T>(fallback: T, f: impl FnOnce() -> T) -> T {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        error!("panic caught at the C ABI boundary");
        fallback
    })
}

/// Borrow a C string as UTF-8. Null or invalid UTF-8 yields `None`.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
unsafe fn c_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: non-null and NUL-terminated per the caller's contract.
    unsafe { CStr::from_ptr(ptr) }.to_str().ok()
}

/// # Safety
/// `ptr` must be null or come from `fn_create` and not yet be destroyed.
unsafe fn api_ref<'a>(ptr: *mut FnAPI) -> Option<&'a FnAPI> {
    // SAFETY: see above.
    unsafe { ptr.as_ref() }
}

/// # Safety
/// `ptr` must be null or point to `len` initialised values outliving `'a`.
unsafe fn raw_slice<'a, T>(ptr: *const T, len: usize) -> &'a [T] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        // SAFETY: see above.
        unsafe { slice::from_raw_parts(ptr, len) }
    }
}

/// Owned C copies of a [`CommandView`], kept alive for one handler call.
struct ForeignCommand {
    _main_command: CString,
    _strings: Vec<CString>,
    _subcommands: Vec<FnKeyValue>,
    _flags: Vec<FnFlag>,
    data: FnCommandData,
}

impl ForeignCommand {
    fn new(cmd: &CommandView<'_>) -> Result<Self, NulError> {
        let main_command = CString::new(cmd.main_command())?;
        let mut strings = Vec::new();

        let mut subcommands = Vec::with_capacity(cmd.subcommands().len());
        for param in cmd.subcommands() {
            let key = CString::new(param.key.as_str())?;
            let value = CString::new(param.value.as_str())?;
            subcommands.push(FnKeyValue {
                key: key.as_ptr(),
                value: value.as_ptr(),
            });
            strings.push(key);
            strings.push(value);
        }

        let mut flags = Vec::with_capacity(cmd.flags().len());
        for flag in cmd.flags() {
            let name = CString::new(flag.name.as_str())?;
            flags.push(FnFlag {
                name: name.as_ptr(),
                value: u8::from(flag.present),
            });
            strings.push(name);
        }

        let data = FnCommandData {
            main_command: main_command.as_ptr(),
            subcommands: if subcommands.is_empty() {
                ptr::null()
            } else {
                subcommands.as_ptr()
            },
            subcommand_count: subcommands.len(),
            flags: if flags.is_empty() {
                ptr::null()
            } else {
                flags.as_ptr()
            },
            flag_count: flags.len(),
        };
        Ok(Self {
            _main_command: main_command,
            _strings: strings,
            _subcommands: subcommands,
            _flags: flags,
            data,
        })
    }
}

struct ForeignHandler {
    handler: unsafe extern "C" fn(*const FnCommandData, *mut c_void) -> c_int,
    user_data: *mut c_void,
}

// SAFETY: `fn_cmd_register` requires the handler and its user data to be
// callable from any thread; the engine never dereferences `user_data` itself.
unsafe impl Send for ForeignHandler {}
unsafe impl Sync for ForeignHandler {}

impl CommandHandler for ForeignHandler {
    fn call(&self, cmd: &CommandView<'_>, _out: &Output<'_>) -> ResultCode {
        let command = match ForeignCommand::new(cmd) {
            Ok(command) => command,
            Err(e) => {
                warn!(command = cmd.main_command(), error = %e, "command contains a NUL byte");
                return ResultCode::InvalidArgument;
            }
        };
        // SAFETY: `command.data` and everything it points to live until the end
        // of this function; the handler contract covers `user_data`.
        let raw = unsafe { (self.handler)(&command.data, self.user_data) };
        ResultCode::from_raw(i64::from(raw)).unwrap_or_else(|| {
            warn!(command = cmd.main_command(), raw, "handler returned an unknown result code");
            ResultCode::Internal
        })
    }
}

fn code_of(result: Result<(), crate::ShellError>) -> ResultCode {
    match result {
        Ok(()) => ResultCode::Ok,
        Err(e) => e.code(),
    }
}

/// Packed API version, `(major << 16) | (minor << 8) | patch`.
#[unsafe(no_mangle)]
pub extern "C" fn fn_api_version(_api: *mut FnAPI) -> u32 {
    API_VERSION
}

#[unsafe(no_mangle)]
pub extern "C" fn fn_api_capabilities() -> u32 {
    capabilities()
}

/// Create a shell instance. Returns null for a null, empty or non-UTF-8 name.
///
/// # Safety
/// `app_name` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fn_create(app_name: *const c_char) -> *mut FnAPI {
    guard(ptr::null_mut(), || {
        // SAFETY: forwarded caller contract.
        let Some(name) = (unsafe { c_str(app_name) }) else {
            return ptr::null_mut();
        };
        match Shell::new(name) {
            Ok(shell) => Box::into_raw(Box::new(FnAPI {
                shell: Arc::new(shell),
            })),
            Err(e) => {
                warn!(error = %e, "fn_create failed");
                ptr::null_mut()
            }
        }
    })
}

/// Destroy an instance, stopping a running loop and waiting for it to return.
///
/// # Safety
/// `api` must be null or come from `fn_create`, and must not be used afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fn_destroy(api: *mut FnAPI) {
    if api.is_null() {
        return;
    }
    // SAFETY: ownership returns to Rust exactly once per the caller's contract.
    let api = unsafe { Box::from_raw(api) };
    guard((), || api.shell.shutdown());
}

/// # Safety
/// Pointers must be null or valid; `api` must come from `fn_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fn_register_header(api: *mut FnAPI, header: *const c_char) -> ResultCode {
    guard(ResultCode::Internal, || {
        // SAFETY: forwarded caller contract.
        let (Some(api), Some(header)) = (unsafe { api_ref(api) }, unsafe { c_str(header) }) else {
            return ResultCode::InvalidArgument;
        };
        api.shell.register_header(header);
        ResultCode::Ok
    })
}

/// Select interactive (`0`) or daemon (`1`) mode. `pipe_name` may be null.
///
/// # Safety
/// Pointers must be null or valid; `api` must come from `fn_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fn_set_execution_mode(
    api: *mut FnAPI,
    mode: c_int,
    pipe_name: *const c_char,
) -> ResultCode {
    guard(ResultCode::Internal, || {
        // SAFETY: forwarded caller contract.
        let Some(api) = (unsafe { api_ref(api) }) else {
            return ResultCode::InvalidArgument;
        };
        let mode = match mode {
            FN_MODE_INTERACTIVE => ExecutionMode::Interactive,
            // SAFETY: forwarded caller contract.
            FN_MODE_DAEMON => ExecutionMode::daemon(unsafe { c_str(pipe_name) }),
            _ => return ResultCode::InvalidArgument,
        };
        code_of(api.shell.set_execution_mode(mode))
    })
}

/// Register a foreign command handler. `help_text` may be null.
///
/// # Safety
/// Pointers must be null or valid; `api` must come from `fn_create`. The
/// handler may be called from any thread with `user_data`, for as long as the
/// instance lives.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fn_cmd_register(
    api: *mut FnAPI,
    command_name: *const c_char,
    handler: FnCommandHandler,
    user_data: *mut c_void,
    help_text: *const c_char,
) -> ResultCode {
    guard(ResultCode::Internal, || {
        // SAFETY: forwarded caller contract.
        let (Some(api), Some(name), Some(handler)) =
            (unsafe { api_ref(api) }, unsafe { c_str(command_name) }, handler)
        else {
            return ResultCode::InvalidArgument;
        };
        // SAFETY: forwarded caller contract.
        let help = unsafe { c_str(help_text) }.unwrap_or_default();
        code_of(api.shell.register_handler(
            name,
            help,
            Arc::new(ForeignHandler { handler, user_data }),
        ))
    })
}

/// Run the shell in the configured mode. Blocks until stopped.
///
/// # Safety
/// `api` must be null or come from `fn_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fn_run(api: *mut FnAPI) -> ResultCode {
    // SAFETY: forwarded caller contract.
    let Some(shell) = (unsafe { api_ref(api) }).map(|api| Arc::clone(&api.shell)) else {
        return ResultCode::InvalidArgument;
    };
    guard(ResultCode::Internal, || code_of(shell.run()))
}

/// Ask a running loop to stop. Async-signal-safe.
///
/// # Safety
/// `api` must be null or come from `fn_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fn_stop(api: *mut FnAPI) -> ResultCode {
    // SAFETY: forwarded caller contract.
    match unsafe { api_ref(api) } {
        Some(api) => code_of(api.shell.stop()),
        None => ResultCode::InvalidArgument,
    }
}

/// Execute one command line on the calling thread.
///
/// # Safety
/// Pointers must be null or valid; `api` must come from `fn_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fn_cmd_execute(api: *mut FnAPI, cmd: *const c_char) -> ResultCode {
    guard(ResultCode::Internal, || {
        // SAFETY: forwarded caller contract.
        let (Some(api), Some(line)) = (unsafe { api_ref(api) }, unsafe { c_str(cmd) }) else {
            return ResultCode::InvalidArgument;
        };
        code_of(api.shell.execute(line))
    })
}

/// Print through the calling thread's session. Null arguments are ignored.
///
/// # Safety
/// Pointers must be null or valid; `api` must come from `fn_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fn_print(api: *mut FnAPI, text: *const c_char) {
    guard((), || {
        // SAFETY: forwarded caller contract.
        let Some(api) = (unsafe { api_ref(api) }) else {
            return;
        };
        if text.is_null() {
            return;
        }
        // SAFETY: non-null and NUL-terminated per the caller's contract.
        let text = unsafe { CStr::from_ptr(text) }.to_string_lossy();
        api.shell.print(&text);
    })
}

/// Session bound to the calling thread, or `-1`.
///
/// # Safety
/// `api` must be null or come from `fn_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fn_get_current_session_id(api: *mut FnAPI) -> c_int {
    // SAFETY: forwarded caller contract.
    unsafe { api_ref(api) }
        .and_then(|api| api.shell.current_session_id())
        .unwrap_or(-1)
}

/// # Safety
/// `api` must be null or come from `fn_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fn_set_thread_session_id(api: *mut FnAPI, session_id: c_int) {
    guard((), || {
        // SAFETY: forwarded caller contract.
        if let Some(api) = unsafe { api_ref(api) } {
            if let Err(e) = api.shell.set_thread_session_id(session_id) {
                warn!(session_id, error = %e, "fn_set_thread_session_id ignored");
            }
        }
    })
}

/// Unbind the calling thread. Output the session captured but nobody
/// collected is written to the console.
///
/// # Safety
/// `api` must be null or come from `fn_create`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fn_clear_thread_session_id(api: *mut FnAPI) {
    guard((), || {
        // SAFETY: forwarded caller contract.
        if let Some(api) = unsafe { api_ref(api) } {
            if let Some(rest) = api.shell.clear_thread_session_id() {
                api.shell.write_console(&rest);
            }
        }
    })
}

/// First value stored under `key`, or null.
///
/// # Safety
/// Pointers must be null or valid; `cmd` must be the data passed to a handler
/// that is still running.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fn_get_param(cmd: *const FnCommandData, key: *const c_char) -> *const c_char {
    guard(ptr::null(), || {
        // SAFETY: forwarded caller contract.
        let Some(cmd) = (unsafe { cmd.as_ref() }) else {
            return ptr::null();
        };
        if key.is_null() {
            return ptr::null();
        }
        // SAFETY: forwarded caller contract.
        let key = unsafe { CStr::from_ptr(key) };
        // SAFETY: the engine built these arrays with matching counts.
        let params = unsafe { raw_slice(cmd.subcommands, cmd.subcommand_count) };
        params
            .iter()
            // SAFETY: keys built by the engine are valid C strings.
            .find(|kv| !kv.key.is_null() && unsafe { CStr::from_ptr(kv.key) } == key)
            .map_or(ptr::null(), |kv| kv.value)
    })
}

/// `1` when the flag is present, else `0`.
///
/// # Safety
/// Pointers must be null or valid; `cmd` must be the data passed to a handler
/// that is still running.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fn_has_flag(cmd: *const FnCommandData, flag: *const c_char) -> u8 {
    guard(0, || {
        // SAFETY: forwarded caller contract.
        let Some(cmd) = (unsafe { cmd.as_ref() }) else {
            return 0;
        };
        if flag.is_null() {
            return 0;
        }
        // SAFETY: forwarded caller contract.
        let name = unsafe { CStr::from_ptr(flag) };
        // SAFETY: the engine built these arrays with matching counts.
        let flags = unsafe { raw_slice(cmd.flags, cmd.flag_count) };
        let present = flags.iter().any(|f| {
            // SAFETY: names built by the engine are valid C strings.
            f.value != 0 && !f.name.is_null() && unsafe { CStr::from_ptr(f.name) } == name
        });
        u8::from(present)
    })
}

fn result_name(result: c_int) -> &'static CStr {
    match ResultCode::from_raw(i64::from(result)) {
        Some(ResultCode::Ok) => c"FN_OK",
        Some(ResultCode::InvalidArgument) => c"FN_ERR_INVALID_ARGUMENT",
        Some(ResultCode::NotInitialized) => c"FN_ERR_NOT_INITIALIZED",
        Some(ResultCode::AlreadyRegistered) => c"FN_ERR_ALREADY_REGISTERED",
        Some(ResultCode::Internal) => c"FN_ERR_INTERNAL",
        Some(ResultCode::Unsupported) => c"FN_ERR_UNSUPPORTED",
        Some(ResultCode::NotFound) => c"FN_ERR_NOT_FOUND",
        Some(ResultCode::NotAuthenticated) => c"FN_ERR_NOT_AUTHENTICATED",
        Some(ResultCode::PermissionDenied) => c"FN_ERR_PERMISSION_DENIED",
        Some(ResultCode::NotImplemented) => c"FN_ERR_NOT_IMPLEMENTED",
        None => c"FN_ERR_UNKNOWN",
    }
}

/// Store the static symbolic name of `result` in `*out_string`.
///
/// # Safety
/// `out_string` must be null or valid for a pointer write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn fn_result_string(result: c_int, out_string: *mut *const c_char) {
    if out_string.is_null() {
        return;
    }
    // SAFETY: non-null and writable per the caller's contract.
    unsafe { out_string.write(result_name(result).as_ptr()) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ShellError;
    use crate::config::ShellConfig;
    use crate::interpreter::EngineState;
    use crate::io_adapters::{BufReadLines, Input, LineReader, SharedBuffer};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    fn api() -> (*mut FnAPI, SharedBuffer) {
        let console = SharedBuffer::new();
        let shell = Shell::with_console(ShellConfig::new("Ffi"), Box::new(console.clone())).unwrap();
        let api = Box::into_raw(Box::new(FnAPI {
            shell: Arc::new(shell),
        }));
        (api, console)
    }

    fn shell<'a>(api: *mut FnAPI) -> &'a Shell {
        unsafe { &(*api).shell }
    }

    unsafe extern "C" fn greet(cmd: *const FnCommandData, user_data: *mut c_void) -> c_int {
        let api = user_data.cast::<FnAPI>();
        unsafe {
            let name = fn_get_param(cmd, c"name".as_ptr());
            let name = if name.is_null() {
                "Friend".to_string()
            } else {
                CStr::from_ptr(name).to_string_lossy().into_owned()
            };
            let text = if fn_has_flag(cmd, c"formal".as_ptr()) == 1 {
                format!("Good day, {name}.\n")
            } else {
                format!("Hi {name}.\n")
            };
            let text = CString::new(text).unwrap();
            fn_print(api, text.as_ptr());
        }
        ResultCode::Ok as c_int
    }

    unsafe extern "C" fn count(_cmd: *const FnCommandData, user_data: *mut c_void) -> c_int {
        let calls = unsafe { &*user_data.cast::<AtomicUsize>() };
        calls.fetch_add(1, Ordering::SeqCst);
        42
    }

    unsafe extern "C" fn destroy(_cmd: *const FnCommandData, user_data: *mut c_void) -> c_int {
        unsafe { fn_destroy(user_data.cast()) };
        ResultCode::Ok as c_int
    }

    /// Never produces a line, like a prompt nobody answers.
    struct Quiet;

    impl LineReader for Quiet {
        fn read_line(&mut self, _prompt: &str) -> Result<Input, ShellError> {
            thread::sleep(Duration::from_millis(10));
            Ok(Input::Idle)
        }
    }

    #[test]
    fn test_destroy_stops_and_waits_for_running_loop() {
        let (api, _) = api();
        let shell = Arc::clone(unsafe { &(*api).shell });
        let runner = {
            let shell = Arc::clone(&shell);
            thread::spawn(move || shell.run_with(&mut Quiet))
        };
        let deadline = Instant::now() + Duration::from_secs(5);
        while !shell.state().is_running() {
            assert!(Instant::now() < deadline, "loop never started");
            thread::sleep(Duration::from_millis(5));
        }

        unsafe { fn_destroy(api) };
        assert_eq!(shell.state(), EngineState::Stopped);
        runner.join().unwrap().unwrap();
    }

    #[test]
    fn test_destroy_from_handler_does_not_deadlock() {
        let (api, console) = api();
        let shell = Arc::clone(unsafe { &(*api).shell });
        unsafe {
            assert_eq!(
                fn_cmd_register(api, c"destroy".as_ptr(), Some(destroy), api.cast(), ptr::null()),
                ResultCode::Ok
            );
            assert_eq!(
                fn_cmd_register(api, c"greet".as_ptr(), Some(greet), api.cast(), ptr::null()),
                ResultCode::Ok
            );
        }
        shell.register_header("");

        shell
            .run_with(&mut BufReadLines::new(Cursor::new("destroy\ngreet\n")))
            .unwrap();
        assert_eq!(shell.state(), EngineState::Stopped);
        assert_eq!(console.contents(), "");
    }

    #[test]
    fn test_null_arguments_are_rejected() {
        unsafe {
            assert!(fn_create(ptr::null()).is_null());
            assert!(fn_create(c"".as_ptr()).is_null());
            fn_destroy(ptr::null_mut());

            let null = ptr::null_mut();
            assert_eq!(fn_register_header(null, c"x".as_ptr()), ResultCode::InvalidArgument);
            assert_eq!(fn_run(null), ResultCode::InvalidArgument);
            assert_eq!(fn_stop(null), ResultCode::InvalidArgument);
            assert_eq!(fn_cmd_execute(null, c"x".as_ptr()), ResultCode::InvalidArgument);
            assert_eq!(fn_get_current_session_id(null), -1);
            fn_print(null, c"ignored".as_ptr());
            fn_set_thread_session_id(null, 1);
            fn_clear_thread_session_id(null);
            assert!(fn_get_param(ptr::null(), c"name".as_ptr()).is_null());
            assert_eq!(fn_has_flag(ptr::null(), c"formal".as_ptr()), 0);
            fn_result_string(0, ptr::null_mut());

            let (api, _) = api();
            assert_eq!(
                fn_cmd_register(api, c"x".as_ptr(), None, ptr::null_mut(), ptr::null()),
                ResultCode::InvalidArgument
            );
            assert_eq!(
                fn_cmd_register(api, ptr::null(), Some(greet), ptr::null_mut(), ptr::null()),
                ResultCode::InvalidArgument
            );
            assert_eq!(fn_cmd_execute(api, ptr::null()), ResultCode::InvalidArgument);
            assert_eq!(
                fn_set_execution_mode(api, 7, ptr::null()),
                ResultCode::InvalidArgument
            );
            fn_destroy(api);
        }
    }

    #[test]
    fn test_foreign_handler_round_trip() {
        let (api, console) = api();
        unsafe {
            assert_eq!(
                fn_cmd_register(api, c"greet".as_ptr(), Some(greet), api.cast(), c"Greet someone".as_ptr()),
                ResultCode::Ok
            );
            assert_eq!(
                fn_cmd_register(api, c"greet".as_ptr(), Some(greet), api.cast(), ptr::null()),
                ResultCode::AlreadyRegistered
            );
            assert_eq!(fn_cmd_execute(api, c"greet".as_ptr()), ResultCode::Ok);
            assert_eq!(console.take(), "Hi Friend.\n");

            fn_set_thread_session_id(api, 5);
            assert_eq!(fn_get_current_session_id(api), 5);
            assert_eq!(
                fn_cmd_execute(api, c"greet name=Jane -formal".as_ptr()),
                ResultCode::Ok
            );
            assert_eq!(shell(api).take_output(5), "Good day, Jane.\n");
            assert_eq!(console.contents(), "");

            fn_print(api, c"left behind\n".as_ptr());
            fn_clear_thread_session_id(api);
            assert_eq!(fn_get_current_session_id(api), -1);
            assert_eq!(console.contents(), "left behind\n");

            assert_eq!(fn_cmd_execute(api, c"missing".as_ptr()), ResultCode::NotFound);
            fn_destroy(api);
        }
    }

    #[test]
    fn test_unknown_handler_codes_become_internal() {
        let (api, _) = api();
        let calls = AtomicUsize::new(0);
        unsafe {
            let user_data = (&calls as *const AtomicUsize).cast_mut().cast();
            assert_eq!(
                fn_cmd_register(api, c"count".as_ptr(), Some(count), user_data, ptr::null()),
                ResultCode::Ok
            );
            assert_eq!(fn_cmd_execute(api, c"count".as_ptr()), ResultCode::Internal);
            fn_destroy(api);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lifecycle_codes() {
        let (api, _) = api();
        unsafe {
            assert_eq!(fn_stop(api), ResultCode::NotInitialized);
            assert_eq!(
                fn_set_execution_mode(api, FN_MODE_DAEMON, ptr::null()),
                ResultCode::Ok
            );
            assert_eq!(
                shell(api).execution_mode(),
                ExecutionMode::daemon(Some("fshell_ctrl"))
            );
            assert_eq!(fn_register_header(api, c"".as_ptr()), ResultCode::Ok);
            assert_eq!(fn_api_version(api), 0x0001_0000);
            fn_destroy(api);
        }
    }

    #[test]
    fn test_result_strings() {
        let mut name: *const c_char = ptr::null();
        unsafe {
            fn_result_string(ResultCode::Ok as c_int, &mut name);
            assert_eq!(CStr::from_ptr(name), c"FN_OK");
            fn_result_string(ResultCode::PermissionDenied as c_int, &mut name);
            assert_eq!(CStr::from_ptr(name), c"FN_ERR_PERMISSION_DENIED");
            fn_result_string(-3, &mut name);
            assert_eq!(CStr::from_ptr(name), c"FN_ERR_UNKNOWN");
        }
        for code in ResultCode::ALL {
            assert_eq!(
                result_name(code as c_int).to_str().unwrap(),
                code.name()
            );
        }
    }
}
