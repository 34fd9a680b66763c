use crate::code_cache::CodeCache;
use crate::config::WalkLimits;
use crate::dwarf::{CfaBase, FpRule, UnwindRule};
use crate::registers::{strip_pointer, StackContext, WORD_SIZE};
use crate::safe_access::Memory;

/// Restores the caller's `(pc, sp, fp)` in `ctx` by applying `rule`.
///
/// `bottom` is the highest sp the walk may reach. Returns false, leaving
/// `ctx` in an unspecified state, when the caller cannot be recovered.
pub fn step<M: Memory + ?Sized>(
    ctx: &mut StackContext,
    rule: &UnwindRule,
    limits: &WalkLimits,
    bottom: usize,
    memory: &M,
) -> bool {
    let offset = rule.cfa_offset as isize as usize;
    let cfa = match rule.cfa_base {
        CfaBase::Sp => ctx.sp.wrapping_add(offset),
        CfaBase::Fp => ctx.fp.wrapping_add(offset),
        CfaBase::Plt => {
            if ctx.pc & 15 >= limits.plt_parity_threshold {
                ctx.sp.wrapping_add(offset.wrapping_mul(2))
            } else {
                ctx.sp.wrapping_add(offset)
            }
        }
        CfaBase::Unsupported => return false,
    };

    // Stacks grow down: the caller's frame lies above, and not too far.
    if cfa < ctx.sp
        || cfa >= ctx.sp.saturating_add(limits.max_frame_size)
        || cfa >= bottom
        || cfa % WORD_SIZE != 0
    {
        return false;
    }

    match rule.fp {
        FpRule::PcRelative(delta) => ctx.pc = ctx.pc.wrapping_add(delta as isize as usize),
        fp => {
            if let FpRule::Saved(off) = fp {
                if (off.unsigned_abs() as usize) < limits.max_frame_size {
                    ctx.fp = memory.load(cfa.wrapping_add(off as isize as usize));
                }
            }
            ctx.pc = strip_pointer(memory.load(cfa.wrapping_sub(WORD_SIZE)));
        }
    }
    ctx.sp = cfa;

    ctx.pc >= limits.min_valid_pc && ctx.pc <= usize::MAX - limits.min_valid_pc
}

/// `UnwindCursor` walks a stack one frame at a time, looking the rule for
/// each pc up in the [CodeCache].
///
/// Without a cache, or for a pc outside every module, the frame-pointer rule
/// is used.
pub struct UnwindCursor<'a, M: ?Sized> {
    cache: Option<&'a CodeCache>,
    limits: &'a WalkLimits,
    memory: &'a M,
    ctx: StackContext,
    bottom: usize,
    first_step: bool,
}

impl<'a, M: Memory + ?Sized> UnwindCursor<'a, M> {
    pub fn new(ctx: StackContext, cache: Option<&'a CodeCache>, limits: &'a WalkLimits, memory: &'a M) -> Self {
        Self {
            cache,
            limits,
            memory,
            ctx,
            bottom: ctx.sp.saturating_add(limits.max_walk_size),
            first_step: true,
        }
    }

    /// The frame the cursor is at.
    #[inline]
    pub fn context(&self) -> StackContext {
        self.ctx
    }

    /// Attempts to move to the caller of the current frame.
    pub fn step(&mut self) -> bool {
        let mut pc = self.ctx.pc;
        if self.first_step {
            self.first_step = false;
        } else {
            // From the second frame on the pc is a return address, which may
            // already belong to the next function or rule. Look up the call
            // instruction instead.
            pc = pc.wrapping_sub(1);
        }
        let rule = self
            .cache
            .and_then(|cache| cache.lookup(pc))
            .map(|module| module.find_rule(pc))
            .unwrap_or(UnwindRule::DEFAULT);
        step(&mut self.ctx, &rule, self.limits, self.bottom, self.memory)
    }
}
