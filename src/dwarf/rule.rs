use crate::registers::{EMPTY_FRAME_SIZE, LINKED_FRAME_SIZE};

/// The register the CFA is computed from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CfaBase {
    Sp,
    Fp,
    /// PLT stubs: `sp + offset`, doubled when `pc & 15` reaches the parity
    /// threshold (the stub has pushed a second word by then).
    Plt,
    /// Anything else, e.g. a general DWARF expression. Ends the walk.
    Unsupported,
}

/// How the caller's frame pointer is recovered.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FpRule {
    /// Saved at `CFA + offset`.
    Saved(i32),
    /// No memory access: the caller's pc is `pc + delta`.
    PcRelative(i32),
    Unchanged,
}

/// Unwind rule for the instructions from `loc` up to the next rule.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UnwindRule {
    /// Offset of the first covered instruction from the image base.
    pub loc: u32,
    pub cfa_base: CfaBase,
    pub cfa_offset: i32,
    pub fp: FpRule,
}

impl UnwindRule {
    /// Used wherever no table entry applies: assume a standard frame-pointer
    /// prologue.
    pub const DEFAULT: UnwindRule = UnwindRule {
        loc: 0,
        cfa_base: CfaBase::Fp,
        cfa_offset: LINKED_FRAME_SIZE,
        fp: FpRule::Saved(-LINKED_FRAME_SIZE),
    };

    /// Function entry, before anything has been pushed.
    pub const EMPTY: UnwindRule = UnwindRule {
        loc: 0,
        cfa_base: CfaBase::Sp,
        cfa_offset: EMPTY_FRAME_SIZE,
        fp: FpRule::Unchanged,
    };

    #[inline]
    pub fn at(self, loc: u32) -> Self {
        Self { loc, ..self }
    }

    /// Whether both rules unwind the same way, wherever they start.
    #[inline]
    pub fn same_unwind(&self, other: &UnwindRule) -> bool {
        self.cfa_base == other.cfa_base && self.cfa_offset == other.cfa_offset && self.fp == other.fp
    }
}

/// Finds the rule covering `target` in a table sorted by `loc`.
///
/// Returns [UnwindRule::DEFAULT] when `target` precedes the first entry.
pub fn find_rule(table: &[UnwindRule], target: u32) -> UnwindRule {
    let idx = table.partition_point(|r| r.loc <= target);
    if idx == 0 {
        UnwindRule::DEFAULT.at(target)
    } else {
        table[idx - 1]
    }
}
