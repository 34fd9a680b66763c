//! Bounded stack walks on top of [UnwindCursor].

use crate::code_cache::{self, CodeCache};
use crate::config::{self, WalkLimits};
use crate::cursor::UnwindCursor;
use crate::registers::{unwind_init_context, StackContext, StackFrame};
use crate::safe_access::{GuardedMemory, Memory};

pub struct StackWalker<'a, M: ?Sized> {
    cache: Option<&'a CodeCache>,
    limits: &'a WalkLimits,
    memory: &'a M,
}

impl StackWalker<'static, GuardedMemory> {
    /// A walker over the live process: the registered modules (if
    /// initialized), the active limits and guarded loads.
    #[inline]
    pub fn current() -> Self {
        StackWalker::new(code_cache::get(), config::limits(), &GuardedMemory)
    }
}

impl<'a, M: Memory + ?Sized> StackWalker<'a, M> {
    pub fn new(cache: Option<&'a CodeCache>, limits: &'a WalkLimits, memory: &'a M) -> Self {
        Self { cache, limits, memory }
    }

    /// Return addresses of the callers of `ctx`, innermost first.
    ///
    /// The first `skip` frames are stepped over without being yielded; at
    /// most `max_depth` are yielded.
    pub fn frames(&self, ctx: StackContext, max_depth: usize, skip: usize) -> Frames<'a, M> {
        Frames {
            cursor: UnwindCursor::new(ctx, self.cache, self.limits, self.memory),
            depth: -(skip as isize),
            max_depth: max_depth as isize,
        }
    }

    /// Fills `buf` with return addresses and returns the depth including the
    /// skip debt: the number stored, or a non-positive value if the walk
    /// ended within the skipped frames.
    pub fn walk(&self, ctx: StackContext, buf: &mut [usize], skip: usize) -> isize {
        let mut frames = self.frames(ctx, buf.len(), skip);
        for (slot, pc) in buf.iter_mut().zip(frames.by_ref()) {
            *slot = pc;
        }
        frames.depth()
    }
}

/// A lazy walk; see [StackWalker::frames].
pub struct Frames<'a, M: ?Sized> {
    cursor: UnwindCursor<'a, M>,
    depth: isize,
    max_depth: isize,
}

impl<'a, M: Memory + ?Sized> Frames<'a, M> {
    /// The frame reached by the last step.
    #[inline]
    pub fn context(&self) -> StackContext {
        self.cursor.context()
    }

    /// Steps taken minus the skip.
    #[inline]
    pub fn depth(&self) -> isize {
        self.depth
    }
}

impl<'a, M: Memory + ?Sized> Iterator for Frames<'a, M> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.depth < self.max_depth {
            if !self.cursor.step() {
                self.max_depth = self.depth;
                return None;
            }
            self.depth += 1;
            if self.depth > 0 {
                return Some(self.cursor.context().pc);
            }
        }
        None
    }
}

/// Walks the stack of the calling function. The first entry (after `skip`)
/// is the return address into the caller of `walk_here`.
#[inline(never)]
pub fn walk_here(buf: &mut [usize], skip: usize) -> isize {
    let mut ctx = StackContext::default();
    unsafe { unwind_init_context(&mut ctx) };
    StackWalker::current().walk(ctx, buf, skip)
}

/// Walks the stack interrupted by a signal. The first entry is the
/// interrupted pc itself, followed by the return addresses.
///
/// # Safety
///
/// `ucontext` must be null or point to the `ucontext_t` passed to a signal
/// handler.
pub unsafe fn walk_from_ucontext(ucontext: *mut libc::c_void, buf: &mut [usize]) -> usize {
    let frame = match StackFrame::from_ucontext(ucontext) {
        Some(frame) => frame,
        None => return 0,
    };
    if buf.is_empty() {
        return 0;
    }
    let ctx = frame.context();
    buf[0] = ctx.pc;
    let depth = StackWalker::current().walk(ctx, &mut buf[1..], 0);
    1 + depth.max(0) as usize
}
