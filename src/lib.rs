//! This crate walks native call stacks for a Go program's cgo traceback
//! hooks, and is safe to use from a signal handler. (The main scenario is
//! CPU profiling of programs that spend their time in C, C++ or Rust.)
//!
//! Register the callbacks from Go:
//! ```text
//! /*
//! #cgo LDFLAGS: -lcgotraceback
//! #include "cgotraceback.h"
//! */
//! import "C"
//!
//! runtime.SetCgoTraceback(0,
//!     unsafe.Pointer(C.cgotraceback_traceback),
//!     unsafe.Pointer(C.cgotraceback_context),
//!     unsafe.Pointer(C.cgotraceback_symbolizer))
//! ```
//!
//! Or walk from Rust:
//! ```
//! cgotraceback::init();
//!
//! let mut pcs = [0; 64];
//! let n = cgotraceback::trace(&mut pcs);
//! for pc in &pcs[..n] {
//!     let symbol = cgotraceback::symbolizer::resolve(*pc);
//!     println!("{:#x}: {:?}", pc, symbol.function);
//! }
//! ```
//!
//! Unwinding uses the `.eh_frame` tables of every loaded object, parsed once
//! by [init], which runs when the library is loaded. Where no table applies
//! the stack is assumed to be linked through frame pointers, and every memory
//! read goes through a guarded load that turns invalid addresses into zeroes.

pub mod callbacks;
pub mod code_cache;
pub mod config;
pub mod context_pool;
pub mod cursor;
pub mod dwarf;
mod dyld;
pub mod registers;
pub mod safe_access;
pub mod symbolizer;
mod utils;
pub mod walker;

pub use config::{Config, WalkLimits};
pub use cursor::UnwindCursor;
pub use registers::{unwind_init_context, StackContext, StackFrame};
pub use utils::AddressRange;
pub use walker::{walk_from_ucontext, walk_here, StackWalker};

use std::sync::Once;

/// A result type that wraps [Error].
pub type Result<T> = std::result::Result<T, Error>;

/// Error definition.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Dwarf(#[from] dwarf::DwarfError),

    #[error("invalid ucontext")]
    InvalidUcontext,

    #[error("failed to install the fault handler: errno {0}")]
    InstallHandler(i32),

    #[error("symbolizer unavailable: {0}")]
    SymbolizerUnavailable(String),
}

static INIT: Once = Once::new();

/// [init_with] the configuration from the environment.
pub fn init() {
    if INIT.is_completed() {
        return;
    }
    init_with(Config::from_env());
}

/// Applies `config`, installs the fault handler, registers the loaded
/// modules and selects the symbolizer. Only the first call has any effect;
/// failures are logged and leave the affected part degraded.
pub fn init_with(config: Config) {
    INIT.call_once(|| {
        config::set_limits(config.limits);
        context_pool::set_enabled(config.enabled);
        // Logged by the handler; loads then just read as zero.
        let _ = safe_access::install_fault_handler();
        code_cache::initialize();
        symbolizer::backend();
    });
}

/// Fills `buf` with the return addresses of the current call stack, starting
/// in the caller of `trace`. Returns the number stored.
#[inline(never)]
pub fn trace(buf: &mut [usize]) -> usize {
    walk_here(buf, 1).max(0) as usize
}

/// Like [trace], from the context a signal handler was given. The first
/// entry is the interrupted pc.
///
/// # Safety
///
/// `ucontext` must be null or point to the `ucontext_t` passed to a signal
/// handler.
pub unsafe fn trace_from_ucontext(ucontext: *mut libc::c_void, buf: &mut [usize]) -> Result<usize> {
    if ucontext.is_null() {
        return Err(Error::InvalidUcontext);
    }
    Ok(walk_from_ucontext(ucontext, buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init();
        init_with(Config {
            enabled: false,
            ..Config::default()
        });
        assert!(context_pool::is_enabled());
        assert!(safe_access::is_installed());
        assert!(code_cache::get().is_some());
    }

    #[test]
    fn test_trace_from_null_ucontext() {
        let mut buf = [0; 4];
        assert!(matches!(
            unsafe { trace_from_ucontext(std::ptr::null_mut(), &mut buf) },
            Err(Error::InvalidUcontext)
        ));
    }
}
