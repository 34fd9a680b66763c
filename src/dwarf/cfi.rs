use crate::dwarf::*;

#[derive(Debug, Copy, Clone)]
pub struct CommonInformationEntry<'a> {
    pub cie_start: usize,
    pub instructions: Section<'a>,
    pub pointer_encoding: u8,
    pub lsda_encoding: u8,
    pub code_align_factor: u32,
    pub data_align_factor: i32,
    pub return_address_register: u8,
    pub is_signal_frame: bool,
    pub fdes_have_augmentation_data: bool,
    pub addresses_signed_with_b_key: bool,
}

/// Splits off the body of a length-prefixed CFI record.
fn record<'a>(r: &mut Reader<'a>) -> Result<Option<Reader<'a>>, DwarfError> {
    let mut length = r.u32()? as u64;
    if length == 0xffffffff {
        // 0xffffffff means length is really next 8 bytes.
        length = r.u64()?;
    }
    if length == 0 {
        return Ok(None);
    }
    Ok(Some(r.split(length as usize)?))
}

impl<'a> CommonInformationEntry<'a> {
    /// Parse the CIE at `start` in `eh_frame`.
    pub fn decode(eh_frame: Section<'a>, start: usize) -> Result<Self, DwarfError> {
        let mut outer = eh_frame.reader_at(start)?;
        let mut r = record(&mut outer)?.ok_or(DwarfError::CIEZeroLength)?;

        // CIE ID is always 0.
        if r.u32()? != 0 {
            return Err(DwarfError::CIEIdIsNotZero);
        }

        // Version is always 1 or 3.
        let version = r.u8()?;
        if version != 1 && version != 3 {
            return Err(DwarfError::CIEInvalidVersion(version));
        }

        let mut augmentation = r;
        while r.u8()? != 0 {}

        let code_align_factor = r.uleb128()? as u32;
        let data_align_factor = r.sleb128()? as i32;
        let return_address_register = if version == 1 {
            r.u8()?
        } else {
            r.uleb128()? as u8
        };

        let mut cie = CommonInformationEntry {
            cie_start: start,
            instructions: r.rest(),
            pointer_encoding: DW_EH_PE_ABSPTR,
            lsda_encoding: DW_EH_PE_OMIT,
            code_align_factor,
            data_align_factor,
            return_address_register,
            is_signal_frame: false,
            fdes_have_augmentation_data: false,
            addresses_signed_with_b_key: false,
        };

        // Parse augmentation data based on augmentation string.
        if augmentation.u8()? == b'z' {
            cie.fdes_have_augmentation_data = true;
            let len = r.uleb128()? as usize;
            let mut data = r.split(len)?;
            loop {
                match augmentation.u8()? {
                    0 => break,
                    b'P' => {
                        let enc = data.u8()?;
                        data.pointer(enc, 0)?;
                    }
                    b'L' => cie.lsda_encoding = data.u8()?,
                    b'R' => cie.pointer_encoding = data.u8()?,
                    b'S' => cie.is_signal_frame = true,
                    b'B' => cie.addresses_signed_with_b_key = true,
                    _ => {}
                }
            }
        }

        cie.instructions = r.rest();
        Ok(cie)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct FrameDescriptionEntry<'a> {
    pub fde_start: usize,
    pub instructions: Section<'a>,
    pub pc_start: usize,
    pub pc_end: usize,
}

impl<'a> FrameDescriptionEntry<'a> {
    /// Parse the FDE at `start` in `eh_frame` together with its CIE.
    pub fn decode(eh_frame: Section<'a>, start: usize) -> Result<(Self, CommonInformationEntry<'a>), DwarfError> {
        let mut outer = eh_frame.reader_at(start)?;
        let mut r = record(&mut outer)?.ok_or(DwarfError::FDEZeroLength)?;

        // The CIE pointer is relative to its own field.
        let cie_ptr_field = r.address();
        let cie_ptr = r.u32()? as usize;
        if cie_ptr == 0 {
            return Err(DwarfError::FDEIsReallyCIE);
        }
        let cie = CommonInformationEntry::decode(eh_frame, cie_ptr_field.wrapping_sub(cie_ptr))?;

        // Parse pc begin and range.
        let pc_start = r.pointer(cie.pointer_encoding, 0)?;
        let pc_range = r.pointer(cie.pointer_encoding & 0x0f, 0)?;

        // The LSDA lives in the augmentation data; unwinding does not need it.
        if cie.fdes_have_augmentation_data {
            let len = r.uleb128()? as usize;
            r.skip(len)?;
        }

        let fde = FrameDescriptionEntry {
            fde_start: start,
            instructions: r.rest(),
            pc_start,
            pc_end: pc_start.wrapping_add(pc_range),
        };
        Ok((fde, cie))
    }

    /// Determine whether the target address is in the current FDE.
    #[inline]
    pub fn contains(&self, target: usize) -> bool {
        self.pc_start <= target && target < self.pc_end
    }
}
