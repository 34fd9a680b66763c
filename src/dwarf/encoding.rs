use crate::dwarf::*;

impl<'a> Reader<'a> {
    /// Read a ULEB128 into a 64-bit word.
    pub fn uleb128(&mut self) -> Result<u64, DwarfError> {
        let start = self.address();
        let mut res = 0u64;
        let mut bit = 0u64;
        loop {
            if self.is_empty() {
                return Err(DwarfError::TruncatedUleb128Expression(start));
            }
            let byte = self.u8()?;
            let b = (byte & 0b1111111) as u64;
            if bit >= 64 || b << bit >> bit != b {
                return Err(DwarfError::MalformedUleb128Expression(start));
            }
            res |= b << bit;
            bit += 7;
            if byte < 0b10000000 {
                break;
            }
        }
        Ok(res)
    }

    /// Read a SLEB128 into a 64-bit word.
    pub fn sleb128(&mut self) -> Result<i64, DwarfError> {
        let start = self.address();
        let mut res = 0i64;
        let mut bit = 0u64;
        let mut byte;
        loop {
            if self.is_empty() {
                return Err(DwarfError::TruncatedSleb128Expression(start));
            }
            byte = self.u8()?;
            if bit < 64 {
                res |= (((byte & 0b1111111) as u64) << bit) as i64;
            }
            bit += 7;
            if (byte & 0b10000000) == 0 {
                break;
            }
        }
        // sign extend negative numbers
        if (byte & 0x40) != 0 && bit < 64 {
            res |= (u64::MAX << bit) as i64;
        }
        Ok(res)
    }

    /// Decode a pointer stored with encoding `enc`.
    ///
    /// `DW_EH_PE_indirect` is not followed: the address of the
    /// pointer-sized slot is returned. Only personality routines are stored
    /// that way and their value is never needed here.
    pub fn pointer(&mut self, enc: u8, datarel_base: usize) -> Result<usize, DwarfError> {
        // Calculate relative offset.
        let offset = match enc & 0b1110000 {
            DW_EH_PE_ABSPTR => 0,
            DW_EH_PE_PCREL => self.address(),
            DW_EH_PE_DATAREL => {
                if datarel_base == 0 {
                    return Err(DwarfError::InvalidDataRelBase);
                }
                datarel_base
            }
            v => return Err(DwarfError::InvalidPointerEncodingOffset(v)),
        };

        // Get value. Signed forms rely on two's complement wrapping.
        let value = match enc & 0b1111 {
            DW_EH_PE_PTR => self.word()?,
            DW_EH_PE_ULEB128 => self.uleb128()? as usize,
            DW_EH_PE_UDATA2 => self.u16()? as usize,
            DW_EH_PE_UDATA4 => self.u32()? as usize,
            DW_EH_PE_UDATA8 => self.u64()? as usize,
            DW_EH_PE_SLEB128 => self.sleb128()? as usize,
            DW_EH_PE_SDATA2 => self.i16()? as isize as usize,
            DW_EH_PE_SDATA4 => self.i32()? as isize as usize,
            DW_EH_PE_SDATA8 => self.i64()? as usize,
            v => return Err(DwarfError::InvalidPointerEncodingValue(v)),
        };
        Ok(offset.wrapping_add(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: usize = 0x40_0000;

    fn uleb(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        let len = leb128::write::unsigned(&mut buf, value).unwrap();
        assert_eq!(len, buf.len());
        buf
    }

    fn sleb(value: i64) -> Vec<u8> {
        let mut buf = Vec::new();
        let len = leb128::write::signed(&mut buf, value).unwrap();
        assert_eq!(len, buf.len());
        buf
    }

    #[test]
    fn test_decode_uleb128() {
        for value in [0, 0x7f, 0x80, 0x12345678, u64::MAX] {
            let buf = uleb(value);
            let mut r = Section::new(BASE, &buf).reader();
            assert_eq!(r.uleb128().unwrap(), value);
            assert_eq!(r.address() - BASE, buf.len());
        }
    }

    #[test]
    fn test_decode_uleb128_truncated() {
        // The continuation bit promises another byte that never comes.
        let buf = [0x80u8, 0x80];
        let mut r = Section::new(BASE, &buf).reader();
        assert_eq!(r.uleb128(), Err(DwarfError::TruncatedUleb128Expression(BASE)));

        let buf = [0xffu8; 11];
        let mut r = Section::new(BASE, &buf).reader();
        assert_eq!(r.uleb128(), Err(DwarfError::MalformedUleb128Expression(BASE)));
    }

    #[test]
    fn test_decode_sleb128() {
        for value in [0, -1, 63, -64, 0x12345678, -0x12345678, i64::MAX, i64::MIN] {
            let buf = sleb(value);
            let mut r = Section::new(BASE, &buf).reader();
            assert_eq!(r.sleb128().unwrap(), value);
            assert_eq!(r.address() - BASE, buf.len());
        }
    }

    #[test]
    fn test_decode_pointer() {
        let buf = usize::MAX.to_ne_bytes();
        let mut r = Section::new(BASE, &buf).reader();
        assert_eq!(r.pointer(DW_EH_PE_ABSPTR | DW_EH_PE_PTR, 0).unwrap(), usize::MAX);
        assert!(r.is_empty());

        let buf = u16::MAX.to_ne_bytes();
        let mut r = Section::new(BASE, &buf).reader();
        assert_eq!(r.pointer(DW_EH_PE_ABSPTR | DW_EH_PE_UDATA2, 0).unwrap(), u16::MAX as usize);

        let buf = u32::MAX.to_ne_bytes();
        let mut r = Section::new(BASE, &buf).reader();
        assert_eq!(r.pointer(DW_EH_PE_ABSPTR | DW_EH_PE_UDATA4, 0).unwrap(), u32::MAX as usize);

        let buf = (-2i16).to_ne_bytes();
        let mut r = Section::new(BASE, &buf).reader();
        assert_eq!(r.pointer(DW_EH_PE_PCREL | DW_EH_PE_SDATA2, 0).unwrap(), BASE - 2);

        let buf = 0x123i32.to_ne_bytes();
        let mut r = Section::new(BASE, &buf).reader();
        assert_eq!(r.pointer(DW_EH_PE_PCREL | DW_EH_PE_SDATA4, 0).unwrap(), BASE + 0x123);

        let buf = 0x123i64.to_ne_bytes();
        let mut r = Section::new(BASE, &buf).reader();
        assert_eq!(r.pointer(DW_EH_PE_DATAREL | DW_EH_PE_SDATA8, 0x456).unwrap(), 0x123 + 0x456);

        let buf = uleb(0x1000);
        let mut r = Section::new(BASE, &buf).reader();
        assert_eq!(r.pointer(DW_EH_PE_ULEB128, 0).unwrap(), 0x1000);

        let buf = sleb(-0x10);
        let mut r = Section::new(BASE, &buf).reader();
        assert_eq!(r.pointer(DW_EH_PE_PCREL | DW_EH_PE_SLEB128, 0).unwrap(), BASE - 0x10);
    }

    #[test]
    fn test_decode_pointer_negative_datarel() {
        let buf = (-1i32).to_ne_bytes();
        let mut r = Section::new(BASE, &buf).reader();
        assert_eq!(r.pointer(DW_EH_PE_DATAREL | DW_EH_PE_SDATA4, 0x456).unwrap(), 0x455);
        assert_eq!(r.address(), BASE + 4);
    }

    #[test]
    fn test_decode_pointer_errors() {
        let buf = [0u8; 8];
        let mut r = Section::new(BASE, &buf).reader();
        assert_eq!(
            r.pointer(DW_EH_PE_DATAREL | DW_EH_PE_UDATA4, 0),
            Err(DwarfError::InvalidDataRelBase)
        );
        assert_eq!(
            r.pointer(DW_EH_PE_TEXTREL | DW_EH_PE_UDATA4, 0),
            Err(DwarfError::InvalidPointerEncodingOffset(DW_EH_PE_TEXTREL))
        );
        assert_eq!(r.pointer(0x05, 0), Err(DwarfError::InvalidPointerEncodingValue(0x05)));

        let buf = [0u8; 2];
        let mut r = Section::new(BASE, &buf).reader();
        assert_eq!(r.pointer(DW_EH_PE_UDATA4, 0), Err(DwarfError::UnexpectedEof(BASE)));
    }
}
