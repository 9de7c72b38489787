//! PE/COFF + CLI header parsing (ECMA-335 §II.25).
//!
//! The trim engine operates on a raw PE image, not a bare metadata blob: it
//! needs the section table to resolve RVAs (method body offsets come from
//! the CLI header and table rows as RVAs) and the CLI header to find the
//! metadata root itself. This module covers exactly that slice of the PE
//! format and nothing else; it has no interest in relocations, imports, or
//! any of the rest of the Windows loader's concerns.
//!
//! Images are assumed PE32 (not PE32+): managed-only assemblies are the
//! overwhelmingly common case and always build PE32, so the optional header
//! is read as the fixed 224-byte PE32 layout.

use crate::error::{Error, Result};
use crate::reader::Reader;

const DOS_SIGNATURE: u16 = 0x5A4D; // "MZ"
const PE_SIGNATURE: u32 = 0x0000_4550; // "PE\0\0"
const PE32_MAGIC: u16 = 0x10B;
const CLI_HEADER_DIRECTORY: usize = 14;
const NUM_DATA_DIRECTORIES: usize = 16;

/// A `(rva, size)` data directory entry (ECMA-335 §II.25.2.3.3).
#[derive(Debug, Clone, Copy, Default)]
pub struct DataDirectory {
    pub rva: u32,
    pub size: u32,
}

impl DataDirectory {
    fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            rva: reader.read_u32()?,
            size: reader.read_u32()?,
        })
    }

    #[must_use]
    pub fn is_present(&self) -> bool {
        self.rva != 0 && self.size != 0
    }
}

/// One PE section header (ECMA-335 §II.25.3).
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
}

impl Section {
    fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let name_bytes = reader.read_bytes(8)?;
        let nul = name_bytes.iter().position(|&b| b == 0).unwrap_or(8);
        let name = String::from_utf8_lossy(&name_bytes[..nul]).into_owned();
        let virtual_size = reader.read_u32()?;
        let virtual_address = reader.read_u32()?;
        let size_of_raw_data = reader.read_u32()?;
        let pointer_to_raw_data = reader.read_u32()?;
        // PointerToRelocations, PointerToLinenumbers, NumberOfRelocations,
        // NumberOfLinenumbers, Characteristics: unused by the trim engine.
        reader.read_bytes(16)?;
        Ok(Self {
            name,
            virtual_size,
            virtual_address,
            size_of_raw_data,
            pointer_to_raw_data,
        })
    }

    fn contains_rva(&self, rva: u32) -> bool {
        rva >= self.virtual_address && rva < self.virtual_address + self.virtual_size
    }
}

/// The CLI header (ECMA-335 §II.25.3.3), the runtime-specific entry in the
/// PE data directory that every other CLI structure hangs off of.
#[derive(Debug, Clone)]
pub struct CliHeader {
    pub major_runtime_version: u16,
    pub minor_runtime_version: u16,
    pub metadata: DataDirectory,
    pub flags: u32,
    pub entry_point_token: u32,
    pub resources: DataDirectory,
    pub strong_name_signature: DataDirectory,
}

impl CliHeader {
    pub const SIZE: usize = 72;

    pub const COMIMAGE_FLAGS_ILONLY: u32 = 0x0000_0001;
    pub const COMIMAGE_FLAGS_STRONGNAMESIGNED: u32 = 0x0000_0008;

    fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let _cb = reader.read_u32()?;
        let major_runtime_version = reader.read_u16()?;
        let minor_runtime_version = reader.read_u16()?;
        let metadata = DataDirectory::parse(reader)?;
        let flags = reader.read_u32()?;
        let entry_point_token = reader.read_u32()?;
        let resources = DataDirectory::parse(reader)?;
        let strong_name_signature = DataDirectory::parse(reader)?;
        // CodeManagerTable, VTableFixups, ExportAddressTableJumps,
        // ManagedNativeHeader: always zero per the spec, unused here.
        reader.read_bytes(32)?;
        Ok(Self {
            major_runtime_version,
            minor_runtime_version,
            metadata,
            flags,
            entry_point_token,
            resources,
            strong_name_signature,
        })
    }

    #[must_use]
    pub fn is_ilonly(&self) -> bool {
        self.flags & Self::COMIMAGE_FLAGS_ILONLY != 0
    }
}

/// A parsed PE image: section table, CLI header, and the metadata root's
/// absolute file offset. Stream header offsets recorded inside the metadata
/// root (see [`crate::stream::StreamHeader`]) are relative to this offset.
#[derive(Debug, Clone)]
pub struct PeImage {
    pub sections: Vec<Section>,
    pub cli_header: CliHeader,
    pub cli_header_offset: usize,
    /// Absolute file offset of the metadata root (the `BSJB` signature).
    pub metadata_offset: usize,
    pub metadata_size: usize,
}

impl PeImage {
    /// Parse the PE/COFF headers and the CLI header out of a whole-file
    /// image buffer, locating the metadata root along the way.
    pub fn parse(image: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(image);

        let dos_signature = reader.read_u16()?;
        if dos_signature != DOS_SIGNATURE {
            return Err(Error::MalformedImage("missing MZ signature".to_string()));
        }
        reader.seek(0x3C)?;
        let pe_header_offset = reader.read_u32()? as usize;

        reader.seek(pe_header_offset)?;
        let pe_signature = reader.read_u32()?;
        if pe_signature != PE_SIGNATURE {
            return Err(Error::MalformedImage("missing PE\\0\\0 signature".to_string()));
        }

        // COFF file header.
        let _machine = reader.read_u16()?;
        let number_of_sections = reader.read_u16()? as usize;
        let _time_date_stamp = reader.read_u32()?;
        let _pointer_to_symbol_table = reader.read_u32()?;
        let _number_of_symbols = reader.read_u32()?;
        let optional_header_size = reader.read_u16()? as usize;
        let _characteristics = reader.read_u16()?;

        let optional_header_start = reader.position();
        let magic_bytes = image
            .get(optional_header_start..optional_header_start + 2)
            .ok_or_else(|| Error::MalformedImage("truncated optional header".to_string()))?;
        let magic = u16::from_le_bytes([magic_bytes[0], magic_bytes[1]]);
        if magic != PE32_MAGIC {
            return Err(Error::MalformedImage(format!(
                "unsupported optional header magic 0x{magic:04X}, only PE32 is supported"
            )));
        }

        // PE32 optional header: 28-byte standard fields + 68-byte
        // NT-specific fields + 16 8-byte data directories = 224 bytes.
        reader.read_bytes(28)?;
        reader.read_bytes(68)?;

        let mut directories = Vec::with_capacity(NUM_DATA_DIRECTORIES);
        for _ in 0..NUM_DATA_DIRECTORIES {
            directories.push(DataDirectory::parse(&mut reader)?);
        }
        if reader.position() != optional_header_start + optional_header_size
            && optional_header_size != 0
        {
            // Some linkers pad the optional header; trust the declared size
            // over our own running total when they disagree.
            reader.seek(optional_header_start + optional_header_size)?;
        }

        let mut sections = Vec::with_capacity(number_of_sections);
        for _ in 0..number_of_sections {
            sections.push(Section::parse(&mut reader)?);
        }

        let cli_directory = directories
            .get(CLI_HEADER_DIRECTORY)
            .copied()
            .unwrap_or_default();
        if !cli_directory.is_present() {
            return Err(Error::MalformedImage(
                "image has no CLI header data directory".to_string(),
            ));
        }

        let cli_header_offset = rva_to_file_offset(&sections, cli_directory.rva)?;
        if cli_header_offset + CliHeader::SIZE > image.len() {
            return Err(Error::MalformedImage(
                "CLI header runs past end of image".to_string(),
            ));
        }
        let mut cli_reader = Reader::new(&image[cli_header_offset..cli_header_offset + CliHeader::SIZE]);
        let cli_header = CliHeader::parse(&mut cli_reader)?;

        if !cli_header.metadata.is_present() {
            return Err(Error::MalformedImage(
                "CLI header has no metadata directory".to_string(),
            ));
        }
        let metadata_offset = rva_to_file_offset(&sections, cli_header.metadata.rva)?;
        let metadata_size = cli_header.metadata.size as usize;
        if metadata_offset + metadata_size > image.len() {
            return Err(Error::MalformedImage(
                "metadata root runs past end of image".to_string(),
            ));
        }

        Ok(Self {
            sections,
            cli_header,
            cli_header_offset,
            metadata_offset,
            metadata_size,
        })
    }

    /// Resolve an RVA to an absolute file offset using this image's section
    /// table.
    pub fn rva_to_file_offset(&self, rva: u32) -> Result<usize> {
        rva_to_file_offset(&self.sections, rva)
    }

    /// The metadata root, as a slice of the original image. Every offset
    /// recorded in the metadata root's stream headers is relative to the
    /// start of this slice.
    #[must_use]
    pub fn metadata_slice<'a>(&self, image: &'a [u8]) -> &'a [u8] {
        &image[self.metadata_offset..self.metadata_offset + self.metadata_size]
    }
}

/// Resolve an RVA against a section table. Unlike a naive loader, this
/// returns a recoverable error on an RVA outside every section rather than
/// panicking: a malformed image must abort the trim cleanly, not crash the
/// process that's trimming it.
fn rva_to_file_offset(sections: &[Section], rva: u32) -> Result<usize> {
    for section in sections {
        if section.contains_rva(rva) {
            let delta = rva - section.virtual_address;
            return Ok(section.pointer_to_raw_data as usize + delta as usize);
        }
    }
    Err(Error::MalformedImage(format!(
        "RVA 0x{rva:08X} is not contained in any section"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(name: &str, vaddr: u32, vsize: u32, raw_ptr: u32) -> Section {
        Section {
            name: name.to_string(),
            virtual_size: vsize,
            virtual_address: vaddr,
            size_of_raw_data: vsize,
            pointer_to_raw_data: raw_ptr,
        }
    }

    #[test]
    fn rva_resolves_within_its_section() {
        let sections = vec![section(".text", 0x2000, 0x1000, 0x200)];
        let offset = rva_to_file_offset(&sections, 0x2010).unwrap();
        assert_eq!(offset, 0x210);
    }

    #[test]
    fn rva_outside_every_section_is_a_recoverable_error() {
        let sections = vec![section(".text", 0x2000, 0x1000, 0x200)];
        let err = rva_to_file_offset(&sections, 0x5000).unwrap_err();
        assert!(matches!(err, Error::MalformedImage(_)));
    }

    #[test]
    fn data_directory_presence() {
        assert!(!DataDirectory { rva: 0, size: 0 }.is_present());
        assert!(DataDirectory { rva: 0x2000, size: 8 }.is_present());
    }
}
