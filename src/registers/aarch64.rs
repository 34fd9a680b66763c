// DWARF register numbers. x30 (lr) doubles as the return-address column.
pub const DW_REG_FP: u8 = 29;
pub const DW_REG_SP: u8 = 31;
pub const DW_REG_PC: u8 = 30;

pub const EMPTY_FRAME_SIZE: i32 = 0;

/// `stp x29, x30, [sp, #-16]!` leaves fp and lr just below the CFA.
pub const LINKED_FRAME_SIZE: i32 = 16;

const PAC_MASK: usize = 0x0000_7fff_ffff_ffff;

/// Removes pointer-authentication bits from a saved return address.
#[inline]
pub fn strip_pointer(address: usize) -> usize {
    address & PAC_MASK
}

/// `StackFrame` is a view of the machine context the kernel hands to a
/// signal handler. Setters write straight through to the context.
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
    fn mcontext(&self) -> &libc::mcontext_t {
        unsafe { &(*self.ucontext).uc_mcontext }
    }

    #[inline]
    fn mcontext_mut(&mut self) -> &mut libc::mcontext_t {
        unsafe { &mut (*self.ucontext).uc_mcontext }
    }

    #[inline]
    pub fn pc(&self) -> usize {
        self.mcontext().pc as usize
    }

    #[inline]
    pub fn set_pc(&mut self, pc: usize) {
        self.mcontext_mut().pc = pc as u64;
    }

    #[inline]
    pub fn sp(&self) -> usize {
        self.mcontext().sp as usize
    }

    #[inline]
    pub fn fp(&self) -> usize {
        self.mcontext().regs[29] as usize
    }

    #[inline]
    pub fn retval(&self) -> usize {
        self.mcontext().regs[0] as usize
    }

    #[inline]
    pub fn set_retval(&mut self, value: usize) {
        self.mcontext_mut().regs[0] = value as u64;
    }

    #[inline]
    pub fn arg0(&self) -> usize {
        self.mcontext().regs[0] as usize
    }

    #[inline]
    pub fn arg1(&self) -> usize {
        self.mcontext().regs[1] as usize
    }

    #[inline]
    pub fn arg2(&self) -> usize {
        self.mcontext().regs[2] as usize
    }

    #[inline]
    pub fn arg3(&self) -> usize {
        self.mcontext().regs[3] as usize
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
    fn state(&self) -> &libc::__darwin_arm_thread_state64 {
        unsafe { &(*(*self.ucontext).uc_mcontext).__ss }
    }

    #[inline]
    fn state_mut(&mut self) -> &mut libc::__darwin_arm_thread_state64 {
        unsafe { &mut (*(*self.ucontext).uc_mcontext).__ss }
    }

    #[inline]
    pub fn pc(&self) -> usize {
        self.state().__pc as usize
    }

    #[inline]
    pub fn set_pc(&mut self, pc: usize) {
        self.state_mut().__pc = pc as u64;
    }

    #[inline]
    pub fn sp(&self) -> usize {
        self.state().__sp as usize
    }

    #[inline]
    pub fn fp(&self) -> usize {
        self.state().__fp as usize
    }

    #[inline]
    pub fn retval(&self) -> usize {
        self.state().__x[0] as usize
    }

    #[inline]
    pub fn set_retval(&mut self, value: usize) {
        self.state_mut().__x[0] = value as u64;
    }

    #[inline]
    pub fn arg0(&self) -> usize {
        self.state().__x[0] as usize
    }

    #[inline]
    pub fn arg1(&self) -> usize {
        self.state().__x[1] as usize
    }

    #[inline]
    pub fn arg2(&self) -> usize {
        self.state().__x[2] as usize
    }

    #[inline]
    pub fn arg3(&self) -> usize {
        self.state().__x[3] as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_pointer() {
        assert_eq!(strip_pointer(0x0000_ffff_1234_5678), 0x0000_7fff_1234_5678);
        assert_eq!(strip_pointer(0x7a00_0000_0040_1000), 0x0000_0000_0040_1000);
    }
}
