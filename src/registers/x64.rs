// DWARF register numbers.
pub const DW_REG_FP: u8 = 6;
pub const DW_REG_SP: u8 = 7;
pub const DW_REG_PC: u8 = 16;

/// Frame of a function that has not pushed anything: only the return address.
pub const EMPTY_FRAME_SIZE: i32 = 8;

/// Frame of a function with the standard `push rbp; mov rbp, rsp` prologue.
pub const LINKED_FRAME_SIZE: i32 = 16;

/// Return addresses carry no tag bits on x86-64.
#[inline]
pub fn strip_pointer(address: usize) -> usize {
    address
}

/// `StackFrame` is a view of the machine context the kernel hands to a
/// signal handler.
///
/// ```ignore
/// extern "C" fn signal_handler(_: libc::c_int, _: *mut libc::siginfo_t, ucontext: *mut libc::c_void) {
///     let frame = unsafe { StackFrame::from_ucontext(ucontext) }.unwrap();
///     assert_ne!(frame.pc(), 0);
/// }
/// ```
///
/// Setters write straight through to the context, so changes take effect
/// when the handler returns.
pub struct StackFrame {
    ucontext: *mut libc::ucontext_t,
}

#[cfg(target_os = "linux")]
impl StackFrame {
    /// # Safety
    ///
    /// `ucontext` must be null or point to a live `ucontext_t`.
    pub unsafe fn from_ucontext(ucontext: *mut libc::c_void) -> Option<Self> {
        let ucontext = ucontext as *mut libc::ucontext_t;
        if ucontext.is_null() {
            return None;
        }
        Some(Self { ucontext })
    }

    #[inline]
    fn reg(&self, n: libc::c_int) -> usize {
        unsafe { (*self.ucontext).uc_mcontext.gregs[n as usize] as usize }
    }

    #[inline]
    fn set_reg(&mut self, n: libc::c_int, value: usize) {
        unsafe { (*self.ucontext).uc_mcontext.gregs[n as usize] = value as libc::greg_t }
    }

    #[inline]
    pub fn pc(&self) -> usize {
        self.reg(libc::REG_RIP)
    }

    #[inline]
    pub fn set_pc(&mut self, pc: usize) {
        self.set_reg(libc::REG_RIP, pc)
    }

    #[inline]
    pub fn sp(&self) -> usize {
        self.reg(libc::REG_RSP)
    }

    #[inline]
    pub fn fp(&self) -> usize {
        self.reg(libc::REG_RBP)
    }

    #[inline]
    pub fn retval(&self) -> usize {
        self.reg(libc::REG_RAX)
    }

    #[inline]
    pub fn set_retval(&mut self, value: usize) {
        self.set_reg(libc::REG_RAX, value)
    }

    #[inline]
    pub fn arg0(&self) -> usize {
        self.reg(libc::REG_RDI)
    }

    #[inline]
    pub fn arg1(&self) -> usize {
        self.reg(libc::REG_RSI)
    }

    #[inline]
    pub fn arg2(&self) -> usize {
        self.reg(libc::REG_RDX)
    }

    #[inline]
    pub fn arg3(&self) -> usize {
        self.reg(libc::REG_RCX)
    }
}

#[cfg(target_os = "macos")]
impl StackFrame {
    /// # Safety
    ///
    /// `ucontext` must be null or point to a live `ucontext_t`.
    pub unsafe fn from_ucontext(ucontext: *mut libc::c_void) -> Option<Self> {
        let ucontext = ucontext as *mut libc::ucontext_t;
        if ucontext.is_null() || (*ucontext).uc_mcontext.is_null() {
            return None;
        }
        Some(Self { ucontext })
    }

    #[inline]
    fn state(&self) -> &libc::__darwin_x86_thread_state64 {
        unsafe { &(*(*self.ucontext).uc_mcontext).__ss }
    }

    #[inline]
    fn state_mut(&mut self) -> &mut libc::__darwin_x86_thread_state64 {
        unsafe { &mut (*(*self.ucontext).uc_mcontext).__ss }
    }

    #[inline]
    pub fn pc(&self) -> usize {
        self.state().__rip as usize
    }

    #[inline]
    pub fn set_pc(&mut self, pc: usize) {
        self.state_mut().__rip = pc as u64;
    }

    #[inline]
    pub fn sp(&self) -> usize {
        self.state().__rsp as usize
    }

    #[inline]
    pub fn fp(&self) -> usize {
        self.state().__rbp as usize
    }

    #[inline]
    pub fn retval(&self) -> usize {
        self.state().__rax as usize
    }

    #[inline]
    pub fn set_retval(&mut self, value: usize) {
        self.state_mut().__rax = value as u64;
    }

    #[inline]
    pub fn arg0(&self) -> usize {
        self.state().__rdi as usize
    }

    #[inline]
    pub fn arg1(&self) -> usize {
        self.state().__rsi as usize
    }

    #[inline]
    pub fn arg2(&self) -> usize {
        self.state().__rdx as usize
    }

    #[inline]
    pub fn arg3(&self) -> usize {
        self.state().__rcx as usize
    }
}
