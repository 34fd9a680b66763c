use cgotraceback::callbacks::{cgotraceback_symbolizer, cgotraceback_traceback, SymbolizerArg, TracebackArg};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, SIGPROF};
use std::ffi::CStr;

const MAX_STACK_DEPTH: usize = 64;

fn main() {
    cgotraceback::init();
    let h = SigHandler::SigAction(perf_signal_handler);
    let a = SigAction::new(h, SaFlags::SA_SIGINFO, SigSet::empty());
    unsafe {
        sigaction(SIGPROF, &a).unwrap();
        libc::kill(libc::getpid(), libc::SIGPROF);
    }
    loop {}
}

extern "C" fn perf_signal_handler(_: libc::c_int, _: *mut libc::siginfo_t, ucontext: *mut libc::c_void) {
    // What the Go runtime does on SIGPROF while a thread runs C code.
    let mut pcs = [0usize; MAX_STACK_DEPTH];
    let mut arg = TracebackArg {
        context: 0,
        sig_context: ucontext as usize,
        buf: pcs.as_mut_ptr(),
        max: MAX_STACK_DEPTH,
    };
    unsafe { cgotraceback_traceback(&mut arg) };

    // Printing does not belong in a signal handler; this is a demo.
    let mut sym = SymbolizerArg::default();
    for pc in pcs.iter().take_while(|pc| **pc != 0) {
        sym.pc = *pc;
        unsafe {
            cgotraceback_symbolizer(&mut sym);
            let func = CStr::from_ptr(sym.func).to_string_lossy();
            let file = CStr::from_ptr(sym.file).to_string_lossy();
            println!("{:#x}: {} ({}:{})", pc, func, file, sym.lineno);
        }
    }
    sym.pc = 0;
    unsafe { cgotraceback_symbolizer(&mut sym) };
    std::process::exit(0);
}
