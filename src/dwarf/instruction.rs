use crate::dwarf::*;
use crate::registers::{DW_REG_FP, DW_REG_PC, DW_REG_SP, WORD_SIZE};
use smallvec::SmallVec;

/// Length of the `DW_CFA_def_cfa_expression` that GCC and LLVM emit for
/// lazy-binding PLT stubs.
const PLT_EXPRESSION_LEN: usize = 11;

/// The part of a CFI row the unwinder cares about.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Row {
    cfa_base: CfaBase,
    cfa_offset: i32,
    fp: FpRule,
}

impl Row {
    fn initial() -> Self {
        let empty = UnwindRule::EMPTY;
        Self {
            cfa_base: empty.cfa_base,
            cfa_offset: empty.cfa_offset,
            fp: empty.fp,
        }
    }

    fn rule(&self, loc: u32) -> UnwindRule {
        UnwindRule {
            loc,
            cfa_base: self.cfa_base,
            cfa_offset: self.cfa_offset,
            fp: self.fp,
        }
    }
}

fn cfa_base(register: u64) -> CfaBase {
    match register {
        r if r == DW_REG_SP as u64 => CfaBase::Sp,
        r if r == DW_REG_FP as u64 => CfaBase::Fp,
        _ => CfaBase::Unsupported,
    }
}

/// Collects the unwind rules of every FDE of a module into one table sorted
/// by location.
pub struct TableBuilder {
    image_base: usize,
    rules: Vec<UnwindRule>,
}

impl TableBuilder {
    pub fn new(image_base: usize) -> Self {
        Self {
            image_base,
            rules: Vec::new(),
        }
    }

    /// "Run" the instructions of `fde` and append the resulting rules.
    ///
    /// On error nothing of this FDE is kept.
    pub fn add_fde(&mut self, fde: &FrameDescriptionEntry<'_>, cie: &CommonInformationEntry<'_>) -> Result<(), DwarfError> {
        if fde.pc_start < self.image_base {
            return Err(DwarfError::FDEBeforeImageBase(fde.pc_start));
        }
        let start = (fde.pc_start - self.image_base) as u32;
        let end = start.wrapping_add(fde.pc_end.wrapping_sub(fde.pc_start) as u32);

        let len = self.rules.len();
        let last = self.rules.last().copied();
        let result = self.run_fde(fde, cie, start).map(|_| {
            self.add_record(UnwindRule::DEFAULT.at(end));
        });
        if result.is_err() {
            self.rules.truncate(len);
            if let (Some(last), Some(slot)) = (last, self.rules.last_mut()) {
                *slot = last;
            }
        }
        result
    }

    pub fn finish(mut self) -> Vec<UnwindRule> {
        // The header's search table is sorted already; this keeps a
        // hand-built or unusual table searchable too.
        self.rules.sort_by_key(|r| r.loc);
        self.rules
    }

    fn run_fde(&mut self, fde: &FrameDescriptionEntry<'_>, cie: &CommonInformationEntry<'_>, start: u32) -> Result<(), DwarfError> {
        // The CIE's initial instructions set up the row every FDE starts from.
        let mut initial = Row::initial();
        let mut loc = start;
        self.execute(cie.instructions, cie, &mut loc, &mut initial, None)?;

        let mut row = initial;
        let mut loc = start;
        self.execute(fde.instructions, cie, &mut loc, &mut row, Some(&initial))?;
        self.add_record(row.rule(loc));
        Ok(())
    }

    /// Appends a rule, replacing a previous rule at the same location and
    /// dropping one that changes nothing.
    fn add_record(&mut self, rule: UnwindRule) {
        if let Some(prev) = self.rules.last_mut() {
            if prev.loc == rule.loc {
                *prev = rule;
                return;
            }
            if prev.same_unwind(&rule) {
                return;
            }
        }
        self.rules.push(rule);
    }

    fn advance(&mut self, row: &Row, loc: &mut u32, delta: u32, emit: bool) {
        if emit {
            self.add_record(row.rule(*loc));
        }
        *loc = loc.wrapping_add(delta);
    }

    /// `initial` is `None` while running CIE instructions; no records are
    /// emitted then.
    fn execute(
        &mut self,
        insns: Section<'_>,
        cie: &CommonInformationEntry<'_>,
        loc: &mut u32,
        row: &mut Row,
        initial: Option<&Row>,
    ) -> Result<(), DwarfError> {
        let code_align = cie.code_align_factor;
        let data_align = cie.data_align_factor as i64;
        let mut remembered: SmallVec<[Row; 8]> = SmallVec::new();
        let emit = initial.is_some();
        let mut r = insns.reader();

        while !r.is_empty() {
            let op = r.u8()?;
            match op & 0xc0 {
                DW_CFA_ADVANCE_LOC => {
                    self.advance(row, loc, ((op & 0x3f) as u32).wrapping_mul(code_align), emit);
                    continue;
                }
                DW_CFA_OFFSET => {
                    let offset = factored(unsigned(r.uleb128()?)?, data_align)?;
                    set_offset(row, (op & 0x3f) as u64, offset);
                    continue;
                }
                DW_CFA_RESTORE => {
                    restore(row, (op & 0x3f) as u64, initial);
                    continue;
                }
                _ => {}
            }
            match op {
                DW_CFA_NOP => {}
                DW_CFA_SET_LOC => {
                    let target = r.pointer(cie.pointer_encoding, 0)?.wrapping_sub(self.image_base) as u32;
                    let delta = target.wrapping_sub(*loc);
                    self.advance(row, loc, delta, emit);
                }
                DW_CFA_ADVANCE_LOC1 => {
                    let delta = r.u8()? as u32;
                    self.advance(row, loc, delta.wrapping_mul(code_align), emit);
                }
                DW_CFA_ADVANCE_LOC2 => {
                    let delta = r.u16()? as u32;
                    self.advance(row, loc, delta.wrapping_mul(code_align), emit);
                }
                DW_CFA_ADVANCE_LOC4 => {
                    let delta = r.u32()?;
                    self.advance(row, loc, delta.wrapping_mul(code_align), emit);
                }
                DW_CFA_OFFSET_EXTENDED => {
                    let reg = r.uleb128()?;
                    let offset = factored(unsigned(r.uleb128()?)?, data_align)?;
                    set_offset(row, reg, offset);
                }
                DW_CFA_OFFSET_EXTENDED_SF => {
                    let reg = r.uleb128()?;
                    let offset = factored(r.sleb128()?, data_align)?;
                    set_offset(row, reg, offset);
                }
                DW_CFA_GNU_NEGATIVE_OFFSET_EXTENDED => {
                    let reg = r.uleb128()?;
                    let offset = factored(unsigned(r.uleb128()?)?, data_align)?
                        .checked_neg()
                        .ok_or(DwarfError::Overflow)?;
                    set_offset(row, reg, offset);
                }
                DW_CFA_RESTORE_EXTENDED => {
                    let reg = r.uleb128()?;
                    restore(row, reg, initial);
                }
                DW_CFA_UNDEFINED | DW_CFA_SAME_VALUE => {
                    let reg = r.uleb128()?;
                    if reg == DW_REG_FP as u64 {
                        row.fp = FpRule::Unchanged;
                    }
                }
                DW_CFA_REGISTER => {
                    let reg = r.uleb128()?;
                    r.uleb128()?;
                    if reg == DW_REG_FP as u64 {
                        row.fp = FpRule::Unchanged;
                    }
                }
                DW_CFA_VAL_OFFSET | DW_CFA_VAL_OFFSET_SF => {
                    r.uleb128()?;
                    r.uleb128()?;
                }
                DW_CFA_REMEMBER_STATE => remembered.push(*row),
                DW_CFA_RESTORE_STATE => *row = remembered.pop().ok_or(DwarfError::NoRememberState)?,
                DW_CFA_DEF_CFA => {
                    row.cfa_base = cfa_base(r.uleb128()?);
                    row.cfa_offset = factored(unsigned(r.uleb128()?)?, 1)?;
                }
                DW_CFA_DEF_CFA_SF => {
                    row.cfa_base = cfa_base(r.uleb128()?);
                    row.cfa_offset = factored(r.sleb128()?, data_align)?;
                }
                DW_CFA_DEF_CFA_REGISTER => row.cfa_base = cfa_base(r.uleb128()?),
                DW_CFA_DEF_CFA_OFFSET => row.cfa_offset = factored(unsigned(r.uleb128()?)?, 1)?,
                DW_CFA_DEF_CFA_OFFSET_SF => row.cfa_offset = factored(r.sleb128()?, data_align)?,
                DW_CFA_DEF_CFA_EXPRESSION => {
                    let len = r.uleb128()? as usize;
                    r.skip(len)?;
                    if len == PLT_EXPRESSION_LEN {
                        row.cfa_base = CfaBase::Plt;
                        row.cfa_offset = WORD_SIZE as i32;
                    } else {
                        row.cfa_base = CfaBase::Unsupported;
                    }
                }
                DW_CFA_EXPRESSION => {
                    let reg = r.uleb128()?;
                    let len = r.uleb128()? as usize;
                    r.skip(len)?;
                    if reg == DW_REG_FP as u64 {
                        row.fp = FpRule::Unchanged;
                    }
                }
                DW_CFA_VAL_EXPRESSION => {
                    let reg = r.uleb128()?;
                    let len = r.uleb128()? as usize;
                    let mut expr = r.split(len)?;
                    if reg == DW_REG_PC as u64 {
                        if let Some(delta) = pc_offset_expression(&mut expr)? {
                            row.fp = FpRule::PcRelative(delta);
                        }
                    }
                }
                DW_CFA_GNU_ARGS_SIZE => {
                    r.uleb128()?;
                }
                DW_CFA_GNU_WINDOW_SAVE => {}
                _ => return Err(DwarfError::InvalidOpcode(op)),
            }
        }
        Ok(())
    }
}

fn unsigned(value: u64) -> Result<i64, DwarfError> {
    i64::try_from(value).map_err(|_| DwarfError::Overflow)
}

/// `value * factor`, which must fit a rule offset.
fn factored(value: i64, factor: i64) -> Result<i32, DwarfError> {
    value
        .checked_mul(factor)
        .and_then(|v| i32::try_from(v).ok())
        .ok_or(DwarfError::Overflow)
}

fn set_offset(row: &mut Row, reg: u64, offset: i32) {
    // The return address is always taken from CFA - word.
    if reg == DW_REG_FP as u64 {
        row.fp = FpRule::Saved(offset);
    }
}

fn restore(row: &mut Row, reg: u64, initial: Option<&Row>) {
    if reg == DW_REG_FP as u64 {
        row.fp = initial.map(|r| r.fp).unwrap_or(FpRule::Unchanged);
    }
}

/// Recognises `pc + constant` expressions: a `DW_OP_breg<pc>` followed by
/// constant arithmetic. Anything else yields `None`.
fn pc_offset_expression(r: &mut Reader<'_>) -> Result<Option<i32>, DwarfError> {
    if r.u8()? != DW_OP_BREG0 + DW_REG_PC {
        return Ok(None);
    }
    let mut offset = r.sleb128()?;
    let mut operand: Option<i64> = None;
    while !r.is_empty() {
        match r.u8()? {
            DW_OP_CONST1U => operand = Some(r.u8()? as i64),
            DW_OP_CONST1S => operand = Some(r.i8()? as i64),
            DW_OP_CONST2U => operand = Some(r.u16()? as i64),
            DW_OP_CONST2S => operand = Some(r.i16()? as i64),
            DW_OP_CONST4U => operand = Some(r.u32()? as i64),
            DW_OP_CONST4S => operand = Some(r.i32()? as i64),
            DW_OP_PLUS_UCONST => {
                offset = offset.checked_add(unsigned(r.uleb128()?)?).ok_or(DwarfError::Overflow)?;
            }
            DW_OP_PLUS => match operand.take() {
                Some(value) => offset = offset.checked_add(value).ok_or(DwarfError::Overflow)?,
                None => return Ok(None),
            },
            _ => return Ok(None),
        }
    }
    i32::try_from(offset).map(Some).map_err(|_| DwarfError::Overflow)
}
