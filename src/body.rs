//! Method body headers (ECMA-335 §II.25.4): tiny vs. fat, with the
//! fat-with-exception-handler-sections footprint the trim engine needs in
//! order to zero (or skip) a body without touching its neighbour.

use crate::error::{Error, Result};
use crate::reader::Reader;

const CORILMETHOD_INIT_LOCALS: u16 = 0x10;
const CORILMETHOD_MORE_SECTS: u16 = 0x08;
const CORILMETHOD_SECT_FAT_FORMAT: u8 = 0x40;
const CORILMETHOD_SECT_MORE_SECTS: u8 = 0x80;

/// A parsed method body header plus its total on-disk footprint.
#[derive(Debug, Clone, Copy)]
pub struct MethodBody {
    /// File offset of the first header byte.
    pub header_offset: usize,
    /// 1 for tiny, 12 for fat.
    pub header_size: usize,
    /// File offset of the first IL byte.
    pub code_offset: usize,
    /// Size of the IL stream in bytes.
    pub code_size: usize,
    /// Declared evaluation stack depth (fat only; tiny bodies imply 8).
    pub max_stack: u16,
    /// StandAloneSig token for the local variable signature, 0 if none.
    pub local_var_sig_tok: u32,
    /// `CorILMethod_InitLocals` — locals are zero-initialized.
    pub init_locals: bool,
    /// Total footprint in bytes: header + code + any aligned EH sections.
    /// This is the range the engine zeros or counts for this body.
    pub total_size: usize,
}

impl MethodBody {
    /// Parse the method body starting at `file_offset` in `image`.
    pub fn parse(image: &[u8], file_offset: usize) -> Result<Self> {
        let first = *image
            .get(file_offset)
            .ok_or(Error::MalformedMethodBody(file_offset))?;

        match first & 0x3 {
            0x2 => Self::parse_tiny(image, file_offset, first),
            0x3 => Self::parse_fat(image, file_offset),
            _ => Err(Error::MalformedMethodBody(file_offset)),
        }
    }

    fn parse_tiny(image: &[u8], file_offset: usize, first: u8) -> Result<Self> {
        let code_size = (first >> 2) as usize;
        let header_size = 1;
        let code_offset = file_offset + header_size;
        if code_offset + code_size > image.len() {
            return Err(Error::MalformedMethodBody(file_offset));
        }
        Ok(Self {
            header_offset: file_offset,
            header_size,
            code_offset,
            code_size,
            max_stack: 8,
            local_var_sig_tok: 0,
            init_locals: false,
            total_size: header_size + code_size,
        })
    }

    fn parse_fat(image: &[u8], file_offset: usize) -> Result<Self> {
        let header_size = 12;
        let header_bytes = image
            .get(file_offset..file_offset + header_size)
            .ok_or(Error::MalformedMethodBody(file_offset))?;
        let mut reader = Reader::new(header_bytes);
        let first_word = reader.read_u16()?;
        let flags = first_word & 0x0FFF;
        let header_words = (first_word >> 12) & 0xF;
        if header_words != 3 {
            return Err(Error::MalformedMethodBody(file_offset));
        }
        let max_stack = reader.read_u16()?;
        let code_size = reader.read_u32()? as usize;
        let local_var_sig_tok = reader.read_u32()?;

        let code_offset = file_offset + header_size;
        if code_offset + code_size > image.len() {
            return Err(Error::MalformedMethodBody(file_offset));
        }

        let mut total_size = header_size + code_size;
        if flags & CORILMETHOD_MORE_SECTS != 0 {
            total_size = Self::scan_sections(image, file_offset, total_size)?;
        }

        Ok(Self {
            header_offset: file_offset,
            header_size,
            code_offset,
            code_size,
            max_stack,
            local_var_sig_tok,
            init_locals: flags & CORILMETHOD_INIT_LOCALS != 0,
            total_size,
        })
    }

    /// Walks the chain of 4-byte-aligned data sections following the code,
    /// returning the footprint length (from `file_offset`) once the chain
    /// ends. `DataSize` in each section header already includes that
    /// section's own header, so it is the whole advance for this section.
    fn scan_sections(image: &[u8], file_offset: usize, mut total_size: usize) -> Result<usize> {
        loop {
            let cursor = file_offset + total_size;
            let aligned = (cursor + 3) & !3;
            let kind = *image
                .get(aligned)
                .ok_or(Error::MalformedMethodBody(file_offset))?;
            let is_fat = kind & CORILMETHOD_SECT_FAT_FORMAT != 0;
            let has_more = kind & CORILMETHOD_SECT_MORE_SECTS != 0;

            let data_size = if is_fat {
                let word = image
                    .get(aligned..aligned + 4)
                    .ok_or(Error::MalformedMethodBody(file_offset))?;
                (u32::from(word[1]) | (u32::from(word[2]) << 8) | (u32::from(word[3]) << 16))
                    as usize
            } else {
                let byte = *image
                    .get(aligned + 1)
                    .ok_or(Error::MalformedMethodBody(file_offset))?;
                byte as usize
            };
            if data_size == 0 {
                return Err(Error::MalformedMethodBody(file_offset));
            }

            total_size = (aligned + data_size) - file_offset;
            if !has_more {
                return Ok(total_size);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_body_footprint() {
        // 0x02 | (3 << 2) = 0x0E -> 3-byte code.
        let image = [0x0E, 0x01, 0x02, 0x03];
        let body = MethodBody::parse(&image, 0).unwrap();
        assert_eq!(body.header_size, 1);
        assert_eq!(body.code_size, 3);
        assert_eq!(body.total_size, 4);
        assert!(!body.init_locals);
    }

    #[test]
    fn fat_body_without_sections() {
        let mut image = vec![0u8; 16];
        // Flags = FatFormat(0x3) | InitLocals(0x10) = 0x13, header size 3 dwords -> top nibble 3.
        let first_word: u16 = 0x13 | (3 << 12);
        image[0..2].copy_from_slice(&first_word.to_le_bytes());
        image[2..4].copy_from_slice(&8u16.to_le_bytes()); // max_stack
        image[4..8].copy_from_slice(&4u32.to_le_bytes()); // code_size
        image[8..12].copy_from_slice(&0u32.to_le_bytes()); // local_var_sig_tok
        image[12..16].copy_from_slice(&[0xAA; 4]);

        let body = MethodBody::parse(&image, 0).unwrap();
        assert_eq!(body.header_size, 12);
        assert_eq!(body.code_size, 4);
        assert_eq!(body.total_size, 16);
        assert!(body.init_locals);
    }

    #[test]
    fn fat_body_with_small_eh_section() {
        let mut image = vec![0u8; 12 + 4 + 12];
        let first_word: u16 = 0x0B | (3 << 12); // FatFormat | MoreSects
        image[0..2].copy_from_slice(&first_word.to_le_bytes());
        image[2..4].copy_from_slice(&8u16.to_le_bytes());
        image[4..8].copy_from_slice(&0u32.to_le_bytes()); // empty code
        image[8..12].copy_from_slice(&0u32.to_le_bytes());
        // Small EH section header right after the (4-byte aligned) code.
        image[12] = 0x01; // CorILMethod_Sect_EHTable, not fat, no more sections
        image[13] = 16; // DataSize including the 4-byte header

        let body = MethodBody::parse(&image, 0).unwrap();
        assert_eq!(body.total_size, 12 + 16);
    }
}
