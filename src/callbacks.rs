//! The cgo traceback protocol: the functions a Go program registers with
//! `runtime.SetCgoTraceback`.
//!
//! Argument layouts follow `runtime/cgo`'s `cgoContextArg`,
//! `cgoTracebackArg` and `cgoSymbolizerArg`.

use crate::context_pool::{self, Handle};
use crate::symbolizer::{self, FunctionName};
use crate::walker::{walk_from_ucontext, walk_here};
use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::slice;

/// Frames between the host's signal handler and the traceback callback.
const SIGNAL_TRAMPOLINE_FRAMES: usize = 2;
/// The context callback itself and `_cgo_wait_runtime_init_done`.
const CONTEXT_GLUE_FRAMES: usize = 2;

const UNKNOWN: *const c_char = b"?\0".as_ptr() as *const c_char;

#[repr(C)]
#[derive(Debug, Default)]
pub struct ContextArg {
    pub context: usize,
}

#[repr(C)]
#[derive(Debug)]
pub struct TracebackArg {
    pub context: usize,
    pub sig_context: usize,
    pub buf: *mut usize,
    pub max: usize,
}

#[repr(C)]
#[derive(Debug)]
pub struct SymbolizerArg {
    pub pc: usize,
    pub file: *const c_char,
    pub lineno: usize,
    pub func: *const c_char,
    pub entry: usize,
    pub more: usize,
    pub data: usize,
}

impl Default for SymbolizerArg {
    fn default() -> Self {
        Self {
            pc: 0,
            file: std::ptr::null(),
            lineno: 0,
            func: std::ptr::null(),
            entry: 0,
            more: 0,
            data: 0,
        }
    }
}

/// Takes a snapshot when `context` is zero, releases it otherwise.
///
/// # Safety
///
/// `arg` must be null or valid for reads and writes.
#[no_mangle]
#[inline(never)]
pub unsafe extern "C" fn cgotraceback_context(arg: *mut ContextArg) {
    let arg = match arg.as_mut() {
        Some(arg) => arg,
        None => return,
    };
    match Handle::from_raw(arg.context) {
        Some(handle) => context_pool::release(handle),
        None => {
            crate::init();
            arg.context = context_pool::acquire(CONTEXT_GLUE_FRAMES)
                .map(Handle::into_raw)
                .unwrap_or(0);
        }
    }
}

/// Fills `buf` with a call stack: a replayed snapshot, a walk from
/// `sig_context`, or a walk from the caller. Zero-terminated unless full.
///
/// # Safety
///
/// `arg` must be null or valid, with `buf` valid for `max` writes.
/// `sig_context` must be zero or a signal handler's `ucontext_t`.
#[no_mangle]
#[inline(never)]
pub unsafe extern "C" fn cgotraceback_traceback(arg: *mut TracebackArg) {
    let arg = match arg.as_mut() {
        Some(arg) if !arg.buf.is_null() && arg.max > 0 => arg,
        _ => return,
    };
    let buf = slice::from_raw_parts_mut(arg.buf, arg.max);
    let len = if !context_pool::is_enabled() {
        0
    } else if let Some(handle) = Handle::from_raw(arg.context) {
        context_pool::replay(handle, buf)
    } else if arg.sig_context != 0 {
        walk_from_ucontext(arg.sig_context as *mut libc::c_void, buf)
    } else {
        walk_here(buf, SIGNAL_TRAMPOLINE_FRAMES).max(0) as usize
    };
    if len < buf.len() {
        buf[len] = 0;
    }
}

/// Describes `pc`. A call with `pc == 0` frees what the previous call left in
/// `data`.
///
/// # Safety
///
/// `arg` must be null or valid; `data` must be what the previous call left.
#[no_mangle]
pub unsafe extern "C" fn cgotraceback_symbolizer(arg: *mut SymbolizerArg) {
    let arg = match arg.as_mut() {
        Some(arg) => arg,
        None => return,
    };
    if arg.data != 0 {
        symbolizer::release(arg.data as *mut c_char);
        arg.data = 0;
    }
    if arg.pc == 0 {
        return;
    }

    let result = symbolizer::resolve(arg.pc);
    arg.more = 0;
    arg.lineno = result.line;
    arg.file = result.file.or(result.module).map(CStr::as_ptr).unwrap_or(UNKNOWN);
    arg.entry = result.entry;
    match result.function {
        Some(FunctionName::Owned(name)) => {
            let raw = name.into_raw();
            arg.func = raw;
            arg.data = raw as usize;
        }
        Some(FunctionName::Borrowed(name)) => arg.func = name.as_ptr(),
        None => {
            arg.func = UNKNOWN;
            arg.file = UNKNOWN;
            arg.entry = 0;
        }
    }
}

/// Runs [init](crate::init) when the library is loaded, before the host's
/// `main`. It must share an object with the exported callbacks, or the
/// linker drops it from static builds.
#[cfg(all(target_os = "linux", not(test)))]
#[link_section = ".init_array"]
#[used]
static LOAD_INIT: extern "C" fn() = {
    extern "C" fn load_init() {
        crate::init();
    }
    load_init
};

#[cfg(all(target_os = "macos", not(test)))]
#[link_section = "__DATA,__mod_init_func"]
#[used]
static LOAD_INIT: extern "C" fn() = {
    extern "C" fn load_init() {
        crate::init();
    }
    load_init
};

/// Builds the module registry and installs the fault handler. The library
/// already does this when it is loaded; later calls do nothing.
#[no_mangle]
pub extern "C" fn cgotraceback_init() {
    crate::init();
}

#[no_mangle]
pub extern "C" fn cgotraceback_set_enabled(enabled: c_int) {
    context_pool::set_enabled(enabled != 0);
}
