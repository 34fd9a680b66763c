use cgotraceback::callbacks::*;
use cgotraceback::StackFrame;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, SIGUSR2};
use std::ffi::CStr;
use std::sync::atomic::{AtomicUsize, Ordering};

const MAX: usize = 32;

fn traceback(context: usize, sig_context: usize, buf: &mut [usize]) {
    let mut arg = TracebackArg {
        context,
        sig_context,
        buf: buf.as_mut_ptr(),
        max: buf.len(),
    };
    unsafe { cgotraceback_traceback(&mut arg) };
}

#[inline(never)]
fn take_context() -> usize {
    let mut arg = ContextArg::default();
    unsafe { cgotraceback_context(&mut arg) };
    arg.context
}

#[test]
fn test_context_replay() {
    cgotraceback_init();
    let context = take_context();
    assert_ne!(context, 0);

    let mut first = [usize::MAX; MAX];
    traceback(context, 0, &mut first);
    let len = first.iter().position(|pc| *pc == 0).unwrap_or(MAX);

    // A fresh walk in between does not disturb the snapshot.
    let mut fresh = [usize::MAX; MAX];
    traceback(0, 0, &mut fresh);
    let mut second = [usize::MAX; MAX];
    traceback(context, 0, &mut second);
    assert_eq!(first[..len], second[..len]);

    let mut arg = ContextArg { context };
    unsafe { cgotraceback_context(&mut arg) };
}

#[test]
fn test_traceback_terminates_buffer() {
    cgotraceback_init();
    let mut buf = [usize::MAX; MAX];
    traceback(0, 0, &mut buf);
    assert!(buf.contains(&0));
    let len = buf.iter().position(|pc| *pc == 0).unwrap();
    assert!(buf[..len].iter().all(|pc| *pc > 0x1000));

    // A full buffer is left unterminated.
    let mut buf = [usize::MAX; 1];
    traceback(0, 0, &mut buf);
    assert_ne!(buf[0], usize::MAX);

    // Null and empty arguments are ignored.
    unsafe { cgotraceback_traceback(std::ptr::null_mut()) };
    traceback(0, 0, &mut []);
}

static INTERRUPTED_PC: AtomicUsize = AtomicUsize::new(0);
static FIRST_PC: AtomicUsize = AtomicUsize::new(0);
static SIGNAL_FRAMES: AtomicUsize = AtomicUsize::new(0);

extern "C" fn on_sigusr2(_: libc::c_int, _: *mut libc::siginfo_t, ucontext: *mut libc::c_void) {
    let pc = unsafe { StackFrame::from_ucontext(ucontext) }.map(|f| f.pc()).unwrap_or(0);
    let mut buf = [usize::MAX; MAX];
    traceback(0, ucontext as usize, &mut buf);
    INTERRUPTED_PC.store(pc, Ordering::SeqCst);
    FIRST_PC.store(buf[0], Ordering::SeqCst);
    let len = buf.iter().position(|pc| *pc == 0).unwrap_or(MAX);
    SIGNAL_FRAMES.store(len, Ordering::SeqCst);
}

#[test]
fn test_traceback_from_signal_context() {
    cgotraceback_init();
    let h = SigHandler::SigAction(on_sigusr2);
    let a = SigAction::new(h, SaFlags::SA_SIGINFO, SigSet::empty());
    unsafe { sigaction(SIGUSR2, &a).unwrap() };
    assert_eq!(unsafe { libc::raise(libc::SIGUSR2) }, 0);

    let pc = INTERRUPTED_PC.load(Ordering::SeqCst);
    assert_ne!(pc, 0);
    assert_eq!(FIRST_PC.load(Ordering::SeqCst), pc);
    assert!(SIGNAL_FRAMES.load(Ordering::SeqCst) >= 2);
}

#[test]
fn test_symbolizer() {
    cgotraceback_init();
    let mut arg = SymbolizerArg::default();
    arg.pc = libc::getpid as usize;
    unsafe { cgotraceback_symbolizer(&mut arg) };
    let func = unsafe { CStr::from_ptr(arg.func) }.to_str().unwrap();
    assert!(func.contains("getpid"));
    assert!(!arg.file.is_null());
    assert_eq!(arg.more, 0);

    arg.pc = 0x10;
    unsafe { cgotraceback_symbolizer(&mut arg) };
    assert_eq!(unsafe { CStr::from_ptr(arg.func) }.to_str().unwrap(), "?");
    assert_eq!(unsafe { CStr::from_ptr(arg.file) }.to_str().unwrap(), "?");
    assert_eq!(arg.entry, 0);

    arg.pc = 0;
    unsafe { cgotraceback_symbolizer(&mut arg) };
    assert_eq!(arg.data, 0);
}
