use crate::registers::WORD_SIZE;
use crate::safe_access::safe_load;

// DWARF register numbers.
pub const DW_REG_FP: u8 = 5;
pub const DW_REG_SP: u8 = 4;
pub const DW_REG_PC: u8 = 8;

pub const EMPTY_FRAME_SIZE: i32 = 4;
pub const LINKED_FRAME_SIZE: i32 = 8;

#[inline]
pub fn strip_pointer(address: usize) -> usize {
    address
}

/// `StackFrame` is a view of the machine context the kernel hands to a
/// signal handler. Setters write straight through to the context.
///
/// cdecl passes arguments on the stack, so `arg0..arg3` go through the
/// guarded load.
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
    fn reg(&self, n: libc::c_int) -> usize {
        unsafe { (*self.ucontext).uc_mcontext.gregs[n as usize] as usize }
    }

    #[inline]
    fn set_reg(&mut self, n: libc::c_int, value: usize) {
        unsafe { (*self.ucontext).uc_mcontext.gregs[n as usize] = value as libc::greg_t }
    }

    #[inline]
    fn stack_at(&self, slot: usize) -> usize {
        safe_load(self.sp().wrapping_add(slot * WORD_SIZE))
    }

    #[inline]
    pub fn pc(&self) -> usize {
        self.reg(libc::REG_EIP)
    }

    #[inline]
    pub fn set_pc(&mut self, pc: usize) {
        self.set_reg(libc::REG_EIP, pc)
    }

    #[inline]
    pub fn sp(&self) -> usize {
        self.reg(libc::REG_ESP)
    }

    #[inline]
    pub fn fp(&self) -> usize {
        self.reg(libc::REG_EBP)
    }

    #[inline]
    pub fn retval(&self) -> usize {
        self.reg(libc::REG_EAX)
    }

    #[inline]
    pub fn set_retval(&mut self, value: usize) {
        self.set_reg(libc::REG_EAX, value)
    }

    // Slot 0 holds the return address.
    #[inline]
    pub fn arg0(&self) -> usize {
        self.stack_at(1)
    }

    #[inline]
    pub fn arg1(&self) -> usize {
        self.stack_at(2)
    }

    #[inline]
    pub fn arg2(&self) -> usize {
        self.stack_at(3)
    }

    #[inline]
    pub fn arg3(&self) -> usize {
        self.stack_at(4)
    }
}
