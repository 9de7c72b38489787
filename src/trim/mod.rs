//! The trim engine: S0/S1 reachability trimming, the string heap trimmer,
//! and the optional deep reference closure, plus the driver that strings
//! them together in the fixed order the design requires.

pub mod closure;
pub mod driver;
pub mod s0;
pub mod s1;
pub mod strings_trim;

pub use driver::{trim_class_level, trim_method_level};

use std::ops::Range;

use crate::error::{Error, Result};
use crate::metadata::Metadata;
use crate::reader::Reader;
use crate::stream::StreamHeader;
use crate::tables::{TableContext, TableGeometry, TableId};

/// Where the parsed metadata's tables and heaps live within the whole image
/// buffer. Built once per run; every walker resolves table rows and heap
/// entries to absolute file offsets through this.
pub(crate) struct Layout {
    pub ctx: TableContext,
    geometry: TableGeometry,
    tables_base: usize,
    strings_base: usize,
    blobs_base: usize,
    us_base: usize,
}

impl Layout {
    pub fn build(metadata: &Metadata, metadata_offset: usize) -> Result<Self> {
        let ctx = metadata.tables_header.context();
        let geometry = TableGeometry::build(&metadata.tables_header, &ctx);
        let tables_stream = metadata
            .root
            .tables_stream()
            .ok_or_else(|| Error::StreamNotFound(StreamHeader::TABLES.to_string()))?;

        let stream_base = |name: &str| -> usize {
            metadata
                .root
                .find_stream(name)
                .map(|s| metadata_offset + s.offset as usize)
                .unwrap_or(0)
        };

        Ok(Self {
            ctx,
            geometry,
            tables_base: metadata_offset + tables_stream.offset as usize,
            strings_base: stream_base(StreamHeader::STRINGS),
            blobs_base: stream_base(StreamHeader::BLOB),
            us_base: stream_base(StreamHeader::USER_STRINGS),
        })
    }

    /// Absolute file offset of row `row` (1-based) of `table`.
    pub fn row_offset(&self, table: TableId, row: u32) -> usize {
        self.tables_base + self.geometry.row_offset(&self.ctx, table, row)
    }

    pub fn string_offset(&self, local_offset: u32) -> usize {
        self.strings_base + local_offset as usize
    }

    pub fn blob_offset(&self, local_offset: u32) -> usize {
        self.blobs_base + local_offset as usize
    }

    pub fn us_offset(&self, local_offset: u32) -> usize {
        self.us_base + local_offset as usize
    }
}

/// The `[payload_start, payload_start + payload_len)` range of a
/// length-prefixed heap entry (`#Blob` or `#US`), given the heap's raw bytes
/// and the entry's local offset. Both heaps share the same
/// compressed-length-prefix encoding, so one parse serves either.
pub(crate) fn length_prefixed_payload(heap_data: &[u8], local_offset: u32) -> Result<Range<usize>> {
    let local_offset = local_offset as usize;
    let slice = heap_data
        .get(local_offset..)
        .ok_or(Error::InvalidBlob(local_offset))?;
    let mut reader = Reader::new(slice);
    let len = reader.read_compressed_uint()? as usize;
    let header_size = reader.position();
    let start = local_offset + header_size;
    let end = start + len;
    if end > heap_data.len() {
        return Err(Error::InvalidBlob(local_offset));
    }
    Ok(start..end)
}

/// 0-based row range `[start, end)` into `rows`, given the 1-based starting
/// index recorded on this type/method and the next type/method's starting
/// index (or one-past-the-end for the last entry). Every contiguous-sublist
/// convention in the tables (TypeDef.FieldList/MethodList, MethodDef.ParamList)
/// resolves the same way.
pub(crate) fn sublist_range(start_1based: u32, end_1based: u32, len: usize) -> Range<usize> {
    let start = (start_1based as usize).saturating_sub(1).min(len);
    let end = (end_1based as usize).saturating_sub(1).min(len);
    if end < start { start..start } else { start..end }
}

pub(crate) fn method_range(metadata: &Metadata, type_idx: usize) -> Range<usize> {
    let start = metadata.type_defs[type_idx].method_list;
    let end = metadata
        .type_defs
        .get(type_idx + 1)
        .map(|t| t.method_list)
        .unwrap_or(metadata.method_defs.len() as u32 + 1);
    sublist_range(start, end, metadata.method_defs.len())
}

pub(crate) fn field_range(metadata: &Metadata, type_idx: usize) -> Range<usize> {
    let start = metadata.type_defs[type_idx].field_list;
    let end = metadata
        .type_defs
        .get(type_idx + 1)
        .map(|t| t.field_list)
        .unwrap_or(metadata.fields.len() as u32 + 1);
    sublist_range(start, end, metadata.fields.len())
}

pub(crate) fn param_range(metadata: &Metadata, method_idx: usize) -> Range<usize> {
    let start = metadata.method_defs[method_idx].param_list;
    let end = metadata
        .method_defs
        .get(method_idx + 1)
        .map(|m| m.param_list)
        .unwrap_or(metadata.params.len() as u32 + 1);
    sublist_range(start, end, metadata.params.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sublist_range_handles_empty_sublist() {
        assert_eq!(sublist_range(3, 3, 10), 2..2);
    }

    #[test]
    fn sublist_range_handles_normal_span() {
        assert_eq!(sublist_range(1, 4, 10), 0..3);
    }
}
