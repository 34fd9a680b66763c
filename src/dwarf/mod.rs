//! Decoding of `.eh_frame_hdr` / `.eh_frame` into compact unwind tables.
//!
//! Only the part of the call frame information needed to find the caller is
//! kept: how to compute the CFA and where the caller's frame pointer lives.
//! Everything is parsed once, up front, so that lookups during a walk are a
//! plain binary search.

use byteorder::{ByteOrder, NativeEndian};

pub use cfi::{CommonInformationEntry, FrameDescriptionEntry};
pub use header::EhFrameHeader;
pub use instruction::TableBuilder;
pub use rule::{find_rule, CfaBase, FpRule, UnwindRule};

mod cfi;
mod encoding;
mod header;
mod instruction;
mod rule;

// Pointer encodings.
pub const DW_EH_PE_PTR: u8 = 0x00;
pub const DW_EH_PE_ULEB128: u8 = 0x01;
pub const DW_EH_PE_UDATA2: u8 = 0x02;
pub const DW_EH_PE_UDATA4: u8 = 0x03;
pub const DW_EH_PE_UDATA8: u8 = 0x04;
pub const DW_EH_PE_SLEB128: u8 = 0x09;
pub const DW_EH_PE_SDATA2: u8 = 0x0a;
pub const DW_EH_PE_SDATA4: u8 = 0x0b;
pub const DW_EH_PE_SDATA8: u8 = 0x0c;
pub const DW_EH_PE_ABSPTR: u8 = 0x00;
pub const DW_EH_PE_PCREL: u8 = 0x10;
pub const DW_EH_PE_TEXTREL: u8 = 0x20;
pub const DW_EH_PE_DATAREL: u8 = 0x30;
pub const DW_EH_PE_FUNCREL: u8 = 0x40;
pub const DW_EH_PE_ALIGNED: u8 = 0x50;
pub const DW_EH_PE_INDIRECT: u8 = 0x80;
pub const DW_EH_PE_OMIT: u8 = 0xff;

// Call frame instructions.
pub const DW_CFA_NOP: u8 = 0x00;
pub const DW_CFA_SET_LOC: u8 = 0x01;
pub const DW_CFA_ADVANCE_LOC1: u8 = 0x02;
pub const DW_CFA_ADVANCE_LOC2: u8 = 0x03;
pub const DW_CFA_ADVANCE_LOC4: u8 = 0x04;
pub const DW_CFA_OFFSET_EXTENDED: u8 = 0x05;
pub const DW_CFA_RESTORE_EXTENDED: u8 = 0x06;
pub const DW_CFA_UNDEFINED: u8 = 0x07;
pub const DW_CFA_SAME_VALUE: u8 = 0x08;
pub const DW_CFA_REGISTER: u8 = 0x09;
pub const DW_CFA_REMEMBER_STATE: u8 = 0x0a;
pub const DW_CFA_RESTORE_STATE: u8 = 0x0b;
pub const DW_CFA_DEF_CFA: u8 = 0x0c;
pub const DW_CFA_DEF_CFA_REGISTER: u8 = 0x0d;
pub const DW_CFA_DEF_CFA_OFFSET: u8 = 0x0e;
pub const DW_CFA_DEF_CFA_EXPRESSION: u8 = 0x0f;
pub const DW_CFA_EXPRESSION: u8 = 0x10;
pub const DW_CFA_OFFSET_EXTENDED_SF: u8 = 0x11;
pub const DW_CFA_DEF_CFA_SF: u8 = 0x12;
pub const DW_CFA_DEF_CFA_OFFSET_SF: u8 = 0x13;
pub const DW_CFA_VAL_OFFSET: u8 = 0x14;
pub const DW_CFA_VAL_OFFSET_SF: u8 = 0x15;
pub const DW_CFA_VAL_EXPRESSION: u8 = 0x16;
pub const DW_CFA_GNU_WINDOW_SAVE: u8 = 0x2d;
pub const DW_CFA_GNU_ARGS_SIZE: u8 = 0x2e;
pub const DW_CFA_GNU_NEGATIVE_OFFSET_EXTENDED: u8 = 0x2f;
// High two bits carry the opcode, low six bits the operand.
pub const DW_CFA_ADVANCE_LOC: u8 = 0x40;
pub const DW_CFA_OFFSET: u8 = 0x80;
pub const DW_CFA_RESTORE: u8 = 0xc0;

// Expression operations understood in `DW_CFA_val_expression`.
pub const DW_OP_CONST1U: u8 = 0x08;
pub const DW_OP_CONST1S: u8 = 0x09;
pub const DW_OP_CONST2U: u8 = 0x0a;
pub const DW_OP_CONST2S: u8 = 0x0b;
pub const DW_OP_CONST4U: u8 = 0x0c;
pub const DW_OP_CONST4S: u8 = 0x0d;
pub const DW_OP_PLUS: u8 = 0x22;
pub const DW_OP_PLUS_UCONST: u8 = 0x23;
pub const DW_OP_BREG0: u8 = 0x70;

#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum DwarfError {
    #[error("invalid .eh_frame_hdr version: {0}")]
    HeaderInvalidVersion(u8),

    #[error("unexpected end of data at {0:#x}")]
    UnexpectedEof(usize),

    #[error("address {0:#x} is outside the section")]
    OutOfSection(usize),

    #[error("truncated uleb128 expression at {0:#x}")]
    TruncatedUleb128Expression(usize),

    #[error("malformed uleb128 expression at {0:#x}")]
    MalformedUleb128Expression(usize),

    #[error("truncated sleb128 expression at {0:#x}")]
    TruncatedSleb128Expression(usize),

    #[error("invalid pointer encoding offset: {0:#x}")]
    InvalidPointerEncodingOffset(u8),

    #[error("invalid pointer encoding value: {0:#x}")]
    InvalidPointerEncodingValue(u8),

    #[error("datarel encoding without a base")]
    InvalidDataRelBase,

    #[error("cie zero length")]
    CIEZeroLength,

    #[error("cie id is not zero")]
    CIEIdIsNotZero,

    #[error("invalid cie version: {0}")]
    CIEInvalidVersion(u8),

    #[error("zero fde length")]
    FDEZeroLength,

    #[error("fde is really cie")]
    FDEIsReallyCIE,

    #[error("fde range {0:#x} lies before the image base")]
    FDEBeforeImageBase(usize),

    #[error("invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    #[error("no remember state")]
    NoRememberState,

    #[error("factored offset out of range")]
    Overflow,
}

/// A byte range of the address space together with its virtual address.
///
/// Encoded pointers are relative to the address they are stored at, so the
/// address travels with the bytes.
#[derive(Debug, Copy, Clone)]
pub struct Section<'a> {
    pub address: usize,
    pub data: &'a [u8],
}

impl<'a> Section<'a> {
    #[inline]
    pub fn new(address: usize, data: &'a [u8]) -> Self {
        Self { address, data }
    }

    /// # Safety
    ///
    /// `[address, address + len)` must stay mapped and readable for the rest
    /// of the process.
    pub unsafe fn from_raw(address: usize, len: usize) -> Section<'static> {
        Section {
            address,
            data: std::slice::from_raw_parts(address as *const u8, len),
        }
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.address + self.data.len()
    }

    #[inline]
    pub fn contains(&self, address: usize) -> bool {
        self.address <= address && address < self.end()
    }

    /// A reader over the whole section.
    #[inline]
    pub fn reader(&self) -> Reader<'a> {
        Reader {
            section: *self,
            offset: 0,
        }
    }

    /// A reader positioned at `address`, which must lie inside the section.
    pub fn reader_at(&self, address: usize) -> Result<Reader<'a>, DwarfError> {
        if !self.contains(address) {
            return Err(DwarfError::OutOfSection(address));
        }
        Ok(Reader {
            section: *self,
            offset: address - self.address,
        })
    }
}

/// Sequential, bounds-checked access to a [Section].
#[derive(Debug, Copy, Clone)]
pub struct Reader<'a> {
    section: Section<'a>,
    offset: usize,
}

impl<'a> Reader<'a> {
    /// Virtual address of the next byte.
    #[inline]
    pub fn address(&self) -> usize {
        self.section.address + self.offset
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.section.data.len() - self.offset
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], DwarfError> {
        if len > self.remaining() {
            return Err(DwarfError::UnexpectedEof(self.address()));
        }
        let data = self.section.data;
        let bytes = &data[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    #[inline]
    pub fn skip(&mut self, len: usize) -> Result<(), DwarfError> {
        self.bytes(len).map(|_| ())
    }

    /// Splits off the next `len` bytes as a reader of their own.
    pub fn split(&mut self, len: usize) -> Result<Reader<'a>, DwarfError> {
        let address = self.address();
        let data = self.bytes(len)?;
        Ok(Section::new(address, data).reader())
    }

    /// The unread bytes as a section.
    #[inline]
    pub fn rest(&self) -> Section<'a> {
        Section::new(self.address(), &self.section.data[self.offset..])
    }

    #[inline]
    pub fn u8(&mut self) -> Result<u8, DwarfError> {
        Ok(self.bytes(1)?[0])
    }

    #[inline]
    pub fn i8(&mut self) -> Result<i8, DwarfError> {
        Ok(self.u8()? as i8)
    }

    #[inline]
    pub fn u16(&mut self) -> Result<u16, DwarfError> {
        Ok(NativeEndian::read_u16(self.bytes(2)?))
    }

    #[inline]
    pub fn i16(&mut self) -> Result<i16, DwarfError> {
        Ok(NativeEndian::read_i16(self.bytes(2)?))
    }

    #[inline]
    pub fn u32(&mut self) -> Result<u32, DwarfError> {
        Ok(NativeEndian::read_u32(self.bytes(4)?))
    }

    #[inline]
    pub fn i32(&mut self) -> Result<i32, DwarfError> {
        Ok(NativeEndian::read_i32(self.bytes(4)?))
    }

    #[inline]
    pub fn u64(&mut self) -> Result<u64, DwarfError> {
        Ok(NativeEndian::read_u64(self.bytes(8)?))
    }

    #[inline]
    pub fn i64(&mut self) -> Result<i64, DwarfError> {
        Ok(NativeEndian::read_i64(self.bytes(8)?))
    }

    /// A native machine word.
    #[inline]
    pub fn word(&mut self) -> Result<usize, DwarfError> {
        if cfg!(target_pointer_width = "64") {
            Ok(self.u64()? as usize)
        } else {
            Ok(self.u32()? as usize)
        }
    }
}

/// Parses the unwind information of one module.
///
/// `header` is the module's `.eh_frame_hdr`, `eh_frame` covers at least its
/// `.eh_frame`. Rule locations are made relative to `image_base`. FDEs that
/// fail to decode are skipped; only a broken header fails the whole table.
pub fn build_unwind_table(
    header: Section<'_>,
    eh_frame: Section<'_>,
    image_base: usize,
) -> Result<Vec<UnwindRule>, DwarfError> {
    let hdr = EhFrameHeader::decode(header)?;
    let mut builder = TableBuilder::new(image_base);
    for entry in hdr.entries(header) {
        let (_, fde_address) = entry?;
        let decoded = FrameDescriptionEntry::decode(eh_frame, fde_address)
            .and_then(|(fde, cie)| builder.add_fde(&fde, &cie));
        if let Err(err) = decoded {
            log::debug!("skipping fde at {:#x}: {}", fde_address, err);
        }
    }
    Ok(builder.finish())
}
