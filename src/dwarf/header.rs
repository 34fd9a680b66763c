use crate::dwarf::*;

/// Information encoded in the .eh_frame_hdr section.
#[derive(Debug)]
pub struct EhFrameHeader {
    /// Address of `.eh_frame`.
    pub eh_frame: usize,
    pub fde_count: usize,
    /// Address of the binary search table: `[initial_location, fde_address]`
    /// pairs sorted by location.
    pub table: usize,
    pub table_enc: u8,
}

impl EhFrameHeader {
    pub fn decode(section: Section<'_>) -> Result<Self, DwarfError> {
        let start = section.address;
        let mut r = section.reader();
        let version = r.u8()?;
        if version != 1 {
            return Err(DwarfError::HeaderInvalidVersion(version));
        }
        let eh_frame_ptr_enc = r.u8()?;
        let fde_count_enc = r.u8()?;
        let table_enc = r.u8()?;
        let eh_frame = r.pointer(eh_frame_ptr_enc, start)?;
        let mut fde_count = if fde_count_enc != DW_EH_PE_OMIT {
            r.pointer(fde_count_enc, start)?
        } else {
            0
        };
        if table_enc == DW_EH_PE_OMIT {
            fde_count = 0;
        }
        Ok(Self {
            eh_frame,
            fde_count,
            table: r.address(),
            table_enc,
        })
    }

    /// Iterates the search table of `section`, the section this header was
    /// decoded from.
    pub fn entries<'a>(&self, section: Section<'a>) -> HeaderEntries<'a> {
        HeaderEntries {
            reader: section.reader_at(self.table).ok(),
            datarel_base: section.address,
            enc: self.table_enc,
            remaining: self.fde_count,
        }
    }
}

/// `(initial_location, fde_address)` pairs of the search table. Stops after
/// the first decoding error.
pub struct HeaderEntries<'a> {
    reader: Option<Reader<'a>>,
    datarel_base: usize,
    enc: u8,
    remaining: usize,
}

impl<'a> Iterator for HeaderEntries<'a> {
    type Item = Result<(usize, usize), DwarfError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let r = self.reader.as_mut()?;
        let entry = r
            .pointer(self.enc, self.datarel_base)
            .and_then(|loc| Ok((loc, r.pointer(self.enc, self.datarel_base)?)));
        if entry.is_err() {
            self.remaining = 0;
        }
        Some(entry)
    }
}
