// DWARF register numbers.
pub const DW_REG_FP: u8 = 11;
pub const DW_REG_SP: u8 = 13;
pub const DW_REG_PC: u8 = 14;

pub const EMPTY_FRAME_SIZE: i32 = 0;
pub const LINKED_FRAME_SIZE: i32 = 8;

#[inline]
pub fn strip_pointer(address: usize) -> usize {
    address
}

/// `StackFrame` is a view of the machine context the kernel hands to a
/// signal handler. Setters write straight through to the context.
pub struct StackFrame {
    ucontext: *mut libc::ucontext_t,
}

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
        self.mcontext().arm_pc as usize
    }

    #[inline]
    pub fn set_pc(&mut self, pc: usize) {
        self.mcontext_mut().arm_pc = pc as libc::c_ulong;
    }

    #[inline]
    pub fn sp(&self) -> usize {
        self.mcontext().arm_sp as usize
    }

    #[inline]
    pub fn fp(&self) -> usize {
        self.mcontext().arm_fp as usize
    }

    #[inline]
    pub fn retval(&self) -> usize {
        self.mcontext().arm_r0 as usize
    }

    #[inline]
    pub fn set_retval(&mut self, value: usize) {
        self.mcontext_mut().arm_r0 = value as libc::c_ulong;
    }

    #[inline]
    pub fn arg0(&self) -> usize {
        self.mcontext().arm_r0 as usize
    }

    #[inline]
    pub fn arg1(&self) -> usize {
        self.mcontext().arm_r1 as usize
    }

    #[inline]
    pub fn arg2(&self) -> usize {
        self.mcontext().arm_r2 as usize
    }

    #[inline]
    pub fn arg3(&self) -> usize {
        self.mcontext().arm_r3 as usize
    }
}
