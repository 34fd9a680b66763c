//! Guarded memory reads.
//!
//! Every load the unwinder issues through [safe_load] may target memory that
//! is unmapped: saved frame pointers and return addresses are only as good as
//! the code that wrote them. The load itself is a single instruction in
//! `src/arch/*.S`; once [install_fault_handler] has run, a fault on that
//! instruction is resumed with a result of zero instead of killing the process.

mod handler;

pub use handler::{install_fault_handler, is_installed};

extern "C" {
    fn cgotraceback_safe_load(address: *const usize) -> usize;
}

/// Faults within this many bytes of the guarded load's entry point are
/// attributed to it. The entry is 16-byte aligned.
pub(crate) const FAULT_WINDOW: usize = 16;

#[inline]
pub(crate) fn load_entry() -> usize {
    cgotraceback_safe_load as usize
}

/// Reads one word from `address`, yielding zero if the address is not
/// readable.
///
/// Before the fault handler is installed no read is attempted and zero is
/// returned for every address.
#[inline]
pub fn safe_load(address: usize) -> usize {
    if !is_installed() {
        return 0;
    }
    unsafe { cgotraceback_safe_load(address as *const usize) }
}

/// Length of the guarded load instruction at `pc`, or zero if `pc` holds
/// anything else.
///
/// # Safety
///
/// `pc` must point to mapped code.
#[cfg(target_arch = "x86_64")]
pub(crate) unsafe fn fault_instruction_len(pc: usize) -> usize {
    // mov rax, [rdi]: 48 8b 07
    if (pc as *const u16).read_unaligned() == 0x8b48 {
        3
    } else {
        0
    }
}

#[cfg(target_arch = "x86")]
pub(crate) unsafe fn fault_instruction_len(pc: usize) -> usize {
    // mov eax, [eax]: 8b 00
    if *(pc as *const u8) == 0x8b {
        2
    } else {
        0
    }
}

#[cfg(target_arch = "arm")]
pub(crate) unsafe fn fault_instruction_len(pc: usize) -> usize {
    // ldr rX, [rY, #imm]
    if *(pc as *const u32) & 0x0e50_f000 == 0x0410_0000 {
        4
    } else {
        0
    }
}

#[cfg(target_arch = "aarch64")]
pub(crate) unsafe fn fault_instruction_len(pc: usize) -> usize {
    // ldr x0, [xN, #imm]
    if *(pc as *const u32) & 0xffc0_001f == 0xf940_0000 {
        4
    } else {
        0
    }
}

/// Word-sized reads of another stack's memory.
///
/// The unwinder is written against this trait so the walking logic can be
/// exercised on synthetic stacks.
pub trait Memory {
    fn load(&self, address: usize) -> usize;
}

/// Reads the live address space through [safe_load].
#[derive(Debug, Default, Copy, Clone)]
pub struct GuardedMemory;

impl Memory for GuardedMemory {
    #[inline]
    fn load(&self, address: usize) -> usize {
        safe_load(address)
    }
}
