#[cfg(target_arch = "x86_64")]
mod x64;
#[cfg(target_arch = "x86_64")]
pub use x64::*;

#[cfg(target_arch = "x86")]
mod x86;
#[cfg(target_arch = "x86")]
pub use x86::*;

#[cfg(target_arch = "arm")]
mod arm;
#[cfg(target_arch = "arm")]
pub use arm::*;

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
pub use aarch64::*;

/// Size in bytes of a machine word, used for stack slots and alignment checks.
pub const WORD_SIZE: usize = std::mem::size_of::<usize>();

/// The `(pc, sp, fp)` triple the unwinder moves from frame to frame.
///
/// `StackContext` can be captured from the current execution point with
/// [unwind_init_context]:
/// ```
/// use cgotraceback::{unwind_init_context, StackContext};
///
/// let mut ctx = StackContext::default();
/// unsafe { unwind_init_context(&mut ctx) };
/// assert_ne!(ctx.pc, 0);
/// ```
///
/// or taken from the `ucontext` a signal handler receives, through
/// [StackFrame::context].
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct StackContext {
    pub pc: usize,
    pub sp: usize,
    pub fp: usize,
}

impl StackContext {
    #[inline]
    pub fn new(pc: usize, sp: usize, fp: usize) -> Self {
        Self { pc, sp, fp }
    }
}

extern "C" {
    /// Captures the context of the calling function into `ctx`.
    ///
    /// `pc` is the return address of this call, `sp` is the caller's stack
    /// pointer once the call has returned, and `fp` is the caller's frame
    /// pointer register. The implementation lives in `src/arch/*.S`.
    pub fn unwind_init_context(ctx: *mut StackContext);
}

impl StackFrame {
    /// The `(pc, sp, fp)` triple of the interrupted code.
    #[inline]
    pub fn context(&self) -> StackContext {
        StackContext::new(self.pc(), self.sp(), self.fp())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_unwind_init_context() {
        let mut ctx = StackContext::default();
        unsafe {
            unwind_init_context(&mut ctx as _);
        };
        assert!(ctx.pc > 0);
        assert!(ctx.sp > 0);
        assert_eq!(ctx.sp % WORD_SIZE, 0);

        // The captured sp belongs to this function, so a local lives above it.
        let local = 0usize;
        assert!(&local as *const usize as usize >= ctx.sp);
    }

    static SIGNAL_PC: AtomicUsize = AtomicUsize::new(0);
    static SIGNAL_SP: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn record_frame(_: libc::c_int, _: *mut libc::siginfo_t, ucontext: *mut libc::c_void) {
        if let Some(frame) = unsafe { StackFrame::from_ucontext(ucontext) } {
            SIGNAL_PC.store(frame.pc(), Ordering::SeqCst);
            SIGNAL_SP.store(frame.sp(), Ordering::SeqCst);
        }
    }

    #[test]
    fn test_stack_frame_from_ucontext() {
        assert!(unsafe { StackFrame::from_ucontext(std::ptr::null_mut()) }.is_none());

        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = record_frame as usize;
            action.sa_flags = libc::SA_SIGINFO;
            assert_eq!(libc::sigaction(libc::SIGUSR2, &action, std::ptr::null_mut()), 0);
            assert_eq!(libc::raise(libc::SIGUSR2), 0);
        }
        assert!(SIGNAL_PC.load(Ordering::SeqCst) > 0);
        let sp = SIGNAL_SP.load(Ordering::SeqCst);
        let local = 0usize;
        assert!(sp > 0);
        assert!(sp <= &local as *const usize as usize);
    }
}
