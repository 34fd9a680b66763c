use crate::registers::StackFrame;
use crate::safe_access::{fault_instruction_len, load_entry, FAULT_WINDOW};
use crate::{Error, Result};
use std::mem::{self, MaybeUninit};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Once;

static mut PREV_SIGSEGV: MaybeUninit<libc::sigaction> = MaybeUninit::uninit();
#[cfg(target_os = "macos")]
static mut PREV_SIGBUS: MaybeUninit<libc::sigaction> = MaybeUninit::uninit();

static INSTALL: Once = Once::new();
static INSTALLED: AtomicBool = AtomicBool::new(false);
static INSTALL_ERRNO: AtomicI32 = AtomicI32::new(0);

/// Installs the process-wide fault handler that makes [safe_load] tolerant
/// of invalid addresses. Only the first call does any work.
///
/// The previously installed handlers are kept and every fault that did not
/// come from the guarded load is passed on to them.
///
/// [safe_load]: crate::safe_access::safe_load
pub fn install_fault_handler() -> Result<()> {
    INSTALL.call_once(|| match unsafe { register_all() } {
        Ok(()) => INSTALLED.store(true, Ordering::Release),
        Err(errno) => {
            INSTALL_ERRNO.store(errno, Ordering::Relaxed);
            log::warn!("failed to install fault handler: errno {}", errno);
        }
    });
    if is_installed() {
        Ok(())
    } else {
        Err(Error::InstallHandler(INSTALL_ERRNO.load(Ordering::Relaxed)))
    }
}

/// Whether guarded loads are currently protected.
#[inline]
pub fn is_installed() -> bool {
    INSTALLED.load(Ordering::Acquire)
}

unsafe fn register_all() -> std::result::Result<(), i32> {
    register(ptr::addr_of_mut!(PREV_SIGSEGV), libc::SIGSEGV)?;
    // Darwin reports some bad accesses as SIGBUS.
    #[cfg(target_os = "macos")]
    register(ptr::addr_of_mut!(PREV_SIGBUS), libc::SIGBUS)?;
    Ok(())
}

unsafe fn register(slot: *mut MaybeUninit<libc::sigaction>, signal: libc::c_int) -> std::result::Result<(), i32> {
    let mut action: libc::sigaction = mem::zeroed();
    // SA_ONSTACK: hosts that run handlers on an alternate signal stack
    // refuse to coexist with handlers that do not.
    action.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK;
    action.sa_sigaction = fault_handler as usize;
    libc::sigemptyset(&mut action.sa_mask);
    if libc::sigaction(signal, &action, (*slot).as_mut_ptr()) != 0 {
        return Err(std::io::Error::last_os_error().raw_os_error().unwrap_or(0));
    }
    Ok(())
}

unsafe extern "C" fn fault_handler(signum: libc::c_int, siginfo: *mut libc::siginfo_t, ucontext: *mut libc::c_void) {
    if let Some(mut frame) = StackFrame::from_ucontext(ucontext) {
        let pc = frame.pc();
        if pc.wrapping_sub(load_entry()) < FAULT_WINDOW {
            let len = fault_instruction_len(pc);
            if len > 0 {
                frame.set_pc(pc + len);
                frame.set_retval(0);
                return;
            }
        }
    }
    chain(signum, siginfo, ucontext);
}

unsafe fn chain(signum: libc::c_int, siginfo: *mut libc::siginfo_t, ucontext: *mut libc::c_void) {
    let previous = match signum {
        libc::SIGSEGV => ptr::addr_of!(PREV_SIGSEGV),
        #[cfg(target_os = "macos")]
        libc::SIGBUS => ptr::addr_of!(PREV_SIGBUS),
        _ => return,
    };
    let previous = &*(*previous).as_ptr();
    if previous.sa_sigaction == libc::SIG_DFL || previous.sa_sigaction == libc::SIG_IGN {
        // Nobody else wants this fault: terminate the default way once the
        // handler returns.
        let mut default: libc::sigaction = mem::zeroed();
        default.sa_sigaction = libc::SIG_DFL;
        libc::sigaction(signum, &default, ptr::null_mut());
        libc::raise(signum);
    } else if previous.sa_flags & libc::SA_SIGINFO != 0 {
        mem::transmute::<usize, extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void)>(
            previous.sa_sigaction,
        )(signum, siginfo, ucontext)
    } else {
        mem::transmute::<usize, extern "C" fn(libc::c_int)>(previous.sa_sigaction)(signum)
    }
}
