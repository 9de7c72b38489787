//! S0: class-granularity trim. Every TypeDef row not in the invoked-type set
//! is zeroed in full — its methods, fields, and the TypeDef row itself.
//! Properties and events are deliberately left untouched (see the crate's
//! design notes): the source this engine is modeled on computes their row
//! ranges incorrectly, and the string trimmer's always-preserve treatment of
//! their name offsets is the only protection they get.

use crate::body::MethodBody;
use crate::editor::ByteEditor;
use crate::invoked::InvokedTypes;
use crate::metadata::Metadata;
use crate::pe::PeImage;
use crate::tables::TableId;
use crate::trim::{field_range, length_prefixed_payload, method_range, Layout};

/// Run S0 over every TypeDef row, zeroing unreachable types. Row 0 (the
/// pseudo-type `<Module>`) is never iterated: it is always implicitly
/// preserved by the invoked-type set (see the Invoked-Type Resolver).
pub fn run(pe: &PeImage, metadata: &Metadata, layout: &Layout, editor: &mut ByteEditor, invoked_types: &InvokedTypes) {
    for type_idx in 1..metadata.type_defs.len() {
        if invoked_types.contains(&type_idx) {
            continue;
        }
        zero_type(pe, metadata, layout, editor, type_idx);
    }
}

/// Zero everything owned by `type_idx`: its methods, fields, then its own
/// TypeDef row payload, in that fixed order.
pub(crate) fn zero_type(
    pe: &PeImage,
    metadata: &Metadata,
    layout: &Layout,
    editor: &mut ByteEditor,
    type_idx: usize,
) {
    for method_idx in method_range(metadata, type_idx) {
        zero_method(pe, metadata, layout, editor, method_idx);
    }
    for field_idx in field_range(metadata, type_idx) {
        zero_field(metadata, layout, editor, field_idx);
    }
    zero_type_def_row(metadata, layout, editor, type_idx);
}

/// Zero one method: its body (if it has one), its signature blob payload,
/// and the MethodDef row payload excluding the trailing ParamList index
/// (which stays intact so later row traversal by geometry remains correct).
/// Param rows are left to the caller — S0 never needs them, S1's per-method
/// sub-walk does.
pub(crate) fn zero_method(
    pe: &PeImage,
    metadata: &Metadata,
    layout: &Layout,
    editor: &mut ByteEditor,
    method_idx: usize,
) {
    let row = &metadata.method_defs[method_idx];

    if row.rva != 0 {
        match pe.rva_to_file_offset(row.rva) {
            Ok(file_offset) => match MethodBody::parse(editor.image(), file_offset) {
                Ok(body) => editor.zero_method_body(body.header_offset, body.total_size),
                Err(err) => log::warn!("s0: malformed method body for method row {method_idx}: {err}"),
            },
            Err(err) => log::warn!("s0: unresolvable RVA for method row {method_idx}: {err}"),
        }
    }

    zero_blob_payload(metadata, layout, editor, row.signature);

    let row_size = layout.ctx.row_size(TableId::MethodDef);
    let zero_len = row_size - layout.ctx.table_index_size(TableId::Param);
    let offset = layout.row_offset(TableId::MethodDef, (method_idx + 1) as u32);
    editor.zero(offset, zero_len);
}

/// Zero one field: its signature blob payload, then the Field row in full
/// (it carries no trailing sublist index to preserve).
pub(crate) fn zero_field(metadata: &Metadata, layout: &Layout, editor: &mut ByteEditor, field_idx: usize) {
    let row = &metadata.fields[field_idx];
    zero_blob_payload(metadata, layout, editor, row.signature);

    let offset = layout.row_offset(TableId::Field, (field_idx + 1) as u32);
    editor.zero(offset, layout.ctx.row_size(TableId::Field));
}

/// Zero one Param row in full.
pub(crate) fn zero_param(layout: &Layout, editor: &mut ByteEditor, param_idx: usize) {
    let offset = layout.row_offset(TableId::Param, (param_idx + 1) as u32);
    editor.zero(offset, layout.ctx.row_size(TableId::Param));
}

/// Zero a TypeDef row's payload: Flags + TypeName + TypeNamespace + Extends,
/// excluding the trailing FieldList/MethodList sublist indices.
pub(crate) fn zero_type_def_row(metadata: &Metadata, layout: &Layout, editor: &mut ByteEditor, type_idx: usize) {
    let _ = metadata;
    let row_size = layout.ctx.row_size(TableId::TypeDef);
    let zero_len = row_size
        - layout.ctx.table_index_size(TableId::Field)
        - layout.ctx.table_index_size(TableId::MethodDef);
    let offset = layout.row_offset(TableId::TypeDef, (type_idx + 1) as u32);
    editor.zero(offset, zero_len);
}

pub(crate) fn zero_blob_payload(metadata: &Metadata, layout: &Layout, editor: &mut ByteEditor, blob_index: u32) {
    if blob_index == 0 {
        return;
    }
    match length_prefixed_payload(metadata.blobs.data(), blob_index) {
        Ok(range) => {
            let offset = layout.blob_offset(range.start as u32);
            editor.zero(offset, range.len());
        }
        Err(err) => log::warn!("s0: malformed signature blob at offset {blob_index}: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::EditMode;
    use crate::tables::{CodedIndex, CodedIndexKind, FieldRow, MethodDefRow, TablesHeader, TypeDefRow};

    fn context() -> (TablesHeader, crate::tables::TableContext) {
        let mut row_counts = [0u32; 64];
        row_counts[TableId::TypeDef as usize] = 2;
        row_counts[TableId::MethodDef as usize] = 1;
        row_counts[TableId::Field as usize] = 1;
        row_counts[TableId::Param as usize] = 1;
        let mut valid = 0u64;
        for t in [TableId::TypeDef, TableId::MethodDef, TableId::Field, TableId::Param] {
            valid |= 1u64 << (t as u8);
        }
        let header = TablesHeader {
            reserved: 0,
            major_version: 2,
            minor_version: 0,
            heap_sizes: 0,
            reserved2: 1,
            valid,
            sorted: 0,
            row_counts,
        };
        let ctx = header.context();
        (header, ctx)
    }

    #[test]
    fn type_def_row_zero_len_excludes_sublist_indices() {
        let (_, ctx) = context();
        let row_size = ctx.row_size(TableId::TypeDef);
        let zero_len =
            row_size - ctx.table_index_size(TableId::Field) - ctx.table_index_size(TableId::MethodDef);
        // Flags(4) + TypeName(2) + TypeNamespace(2) + Extends(2) = 10, with
        // narrow indices throughout this fixture.
        assert_eq!(zero_len, 10);
    }

    #[test]
    fn method_def_row_zero_len_excludes_param_list() {
        let (_, ctx) = context();
        let row_size = ctx.row_size(TableId::MethodDef);
        let zero_len = row_size - ctx.table_index_size(TableId::Param);
        // RVA(4) + ImplFlags(2) + Flags(2) + Name(2) + Signature(2) = 12.
        assert_eq!(zero_len, 12);
    }

    #[test]
    fn blob_payload_range_excludes_length_prefix() {
        let mut blobs = crate::heaps::BlobHeap::new();
        let sig_offset = blobs.add(&[0x06, 0x08]); // FIELD cc, I4
        let range = crate::trim::length_prefixed_payload(blobs.data(), sig_offset).unwrap();
        assert_eq!(range.len(), 2);
    }

    #[allow(dead_code)]
    fn unused(_: CodedIndex, _: CodedIndexKind, _: TypeDefRow, _: MethodDefRow, _: FieldRow) {}
}
