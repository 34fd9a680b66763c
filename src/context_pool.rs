//! Per-thread snapshots of the native stack taken at a boundary crossing.
//!
//! The host asks for a snapshot when native code calls back into it, then
//! later asks for a traceback with the snapshot's handle; that traceback is a
//! plain copy of what was captured here.

use std::cell::Cell;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};

/// Addresses kept per snapshot.
pub const STACK_MAX: usize = 32;
/// Snapshots a thread may hold at once.
pub const POOL_CAPACITY: usize = 256;

static ENABLED: AtomicBool = AtomicBool::new(true);

struct Slot {
    stack: Cell<[usize; STACK_MAX]>,
    len: Cell<usize>,
    in_use: Cell<bool>,
}

const EMPTY_SLOT: Slot = Slot {
    stack: Cell::new([0; STACK_MAX]),
    len: Cell::new(0),
    in_use: Cell::new(false),
};

thread_local! {
    // `const` initialization: no lazy setup (and no allocation) on first use,
    // which may happen inside a signal handler.
    static POOL: [Slot; POOL_CAPACITY] = const { [EMPTY_SLOT; POOL_CAPACITY] };
}

/// Identifies a snapshot of the calling thread. Never zero.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Handle(NonZeroUsize);

impl Handle {
    #[inline]
    pub fn from_raw(raw: usize) -> Option<Handle> {
        NonZeroUsize::new(raw).map(Handle)
    }

    #[inline]
    pub fn into_raw(self) -> usize {
        self.0.get()
    }

    #[inline]
    fn index(self) -> usize {
        self.0.get() - 1
    }
}

/// Enables or disables snapshots and replays process-wide.
pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

#[inline]
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Captures the calling thread's stack into a free slot.
///
/// The capture starts at the caller of `acquire`, with `skip` more frames
/// hidden. Returns `None` when disabled or when every slot of this thread is
/// in use.
#[inline(never)]
pub fn acquire(skip: usize) -> Option<Handle> {
    if !is_enabled() {
        return None;
    }
    let mut stack = [0; STACK_MAX];
    let len = capture(&mut stack, skip + 1);
    POOL.try_with(|pool| {
        let index = pool.iter().position(|slot| !slot.in_use.get())?;
        let slot = &pool[index];
        slot.in_use.set(true);
        slot.stack.set(stack);
        slot.len.set(len);
        Handle::from_raw(index + 1)
    })
    .ok()
    .flatten()
}

/// Frees the slot of `handle`. Must be called on the thread that acquired it.
pub fn release(handle: Handle) {
    let _ = POOL.try_with(|pool| {
        if let Some(slot) = pool.get(handle.index()) {
            slot.len.set(0);
            slot.in_use.set(false);
        }
    });
}

/// Copies up to `buf.len()` addresses captured for `handle` into `buf` and
/// returns how many were copied.
pub fn replay(handle: Handle, buf: &mut [usize]) -> usize {
    if !is_enabled() {
        return 0;
    }
    POOL.try_with(|pool| match pool.get(handle.index()) {
        Some(slot) if slot.in_use.get() => {
            let stack = slot.stack.get();
            let len = slot.len.get().min(buf.len());
            buf[..len].copy_from_slice(&stack[..len]);
            len
        }
        _ => 0,
    })
    .unwrap_or(0)
}

/// Return addresses starting at the caller of `capture`, `skip` frames
/// hidden.
#[cfg(not(feature = "fast-backtrace"))]
#[inline(never)]
fn capture(buf: &mut [usize], skip: usize) -> usize {
    crate::walker::walk_here(buf, skip + 1).max(0) as usize
}

#[cfg(feature = "fast-backtrace")]
#[inline(never)]
fn capture(buf: &mut [usize], skip: usize) -> usize {
    use crate::registers::{unwind_init_context, StackContext};

    let mut ctx = StackContext::default();
    unsafe { unwind_init_context(&mut ctx) };

    // Frames of the unwinder itself lie below our own stack pointer; our own
    // frame is the first one above it.
    let mut own_frame = true;
    let mut skip = skip;
    let mut len = 0;
    unsafe {
        backtrace::trace_unsynchronized(|frame| {
            if (frame.sp() as usize) <= ctx.sp {
                return true;
            }
            if own_frame {
                own_frame = false;
                return true;
            }
            if skip > 0 {
                skip -= 1;
                return true;
            }
            buf[len] = frame.ip() as usize;
            len += 1;
            len < buf.len()
        });
    }
    len
}
