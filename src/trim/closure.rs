//! Reference Closure (deep trim, `--deep`). Runs after S0/S1 and the string
//! heap trimmer. S0/S1 only decide at TypeDef/MethodDef/Field granularity;
//! this pass follows every surviving row out to the auxiliary tables
//! (TypeRef, MemberRef, TypeSpec, MethodSpec, Constant, CustomAttribute,
//! StandAloneSig, InterfaceImpl) and the `#Blob`/`#US` heaps, and zeroes
//! whatever none of them reach.
//!
//! "Still alive after S0/S1" is read straight off the mutated image rather
//! than threaded through as a parameter: a row S0/S1 zeroed is, by
//! construction, now all zero bytes, and a live row never is (every row
//! schema in these tables has at least one non-nullable field). That keeps
//! this pass decoupled from whether the caller ran class- or
//! method-granularity trimming.

use std::collections::HashSet;
use std::ops::Range;

use crate::body::MethodBody;
use crate::editor::ByteEditor;
use crate::error::{Error, Result};
use crate::il::{self, TokenKind};
use crate::invoked::InvokedTypes;
use crate::metadata::Metadata;
use crate::pe::PeImage;
use crate::reader::Reader;
use crate::signature::{MethodSig, TypeSig};
use crate::tables::{CodedIndex, CodedIndexKind, TableId};
use crate::trim::{field_range, length_prefixed_payload, method_range, param_range, Layout};

const MAX_ITERATIONS: usize = 100;

/// A metadata token: the table it names a row in, plus that row's 1-based
/// index.
type Token = (TableId, u32);

/// The auxiliary tables this pass zeroes unreached rows in. TypeDef,
/// MethodDef, Field and Param are S0/S1's business, not this pass's.
const SWEPT_TABLES: [TableId; 8] = [
    TableId::TypeRef,
    TableId::MemberRef,
    TableId::Constant,
    TableId::CustomAttribute,
    TableId::StandAloneSig,
    TableId::TypeSpec,
    TableId::MethodSpec,
    TableId::InterfaceImpl,
];

pub fn run(pe: &PeImage, metadata: &Metadata, layout: &Layout, editor: &mut ByteEditor, invoked_types: &InvokedTypes) {
    let mut tokens: HashSet<Token> = HashSet::new();
    let mut blobs: HashSet<u32> = HashSet::new();
    let mut user_strings: HashSet<u32> = HashSet::new();

    seed(pe, metadata, layout, editor, invoked_types, &mut tokens, &mut blobs, &mut user_strings);

    for _ in 0..MAX_ITERATIONS {
        let before = tokens.len() + blobs.len();
        expand_member_refs(metadata, &mut tokens, &mut blobs);
        expand_type_specs(metadata, &mut tokens, &mut blobs);
        expand_method_specs(metadata, &mut tokens, &mut blobs);
        if tokens.len() + blobs.len() == before {
            break;
        }
    }

    sweep_custom_attributes(metadata, &mut tokens, &mut blobs);

    zero_unused_rows(metadata, layout, editor, &tokens);
    zero_unused_blobs(metadata, layout, editor, &blobs);
    zero_unused_user_strings(metadata, layout, editor, &user_strings);
}

fn row_is_live(image: &[u8], offset: usize, len: usize) -> bool {
    image
        .get(offset..offset + len)
        .map(|bytes| bytes.iter().any(|&b| b != 0))
        .unwrap_or(false)
}

fn add_coded(kind: CodedIndexKind, raw: u32, tokens: &mut HashSet<Token>) {
    let idx = CodedIndex::decode(kind, raw);
    if let Some(table) = idx.table {
        if idx.row > 0 {
            tokens.insert((table, idx.row));
        }
    }
}

fn add_raw_token(token: u32, tokens: &mut HashSet<Token>) {
    let table_id = (token >> 24) as u8;
    let row = token & 0x00FF_FFFF;
    if row == 0 {
        return;
    }
    if let Ok(table) = TableId::from_u8(table_id) {
        tokens.insert((table, row));
    }
}

fn collect_type_tokens(ty: &TypeSig, tokens: &mut HashSet<Token>) {
    match ty {
        TypeSig::Class(raw) | TypeSig::ValueType(raw) => add_coded(CodedIndexKind::TypeDefOrRef, *raw, tokens),
        TypeSig::GenericInst { type_ref, type_args, .. } => {
            add_coded(CodedIndexKind::TypeDefOrRef, *type_ref, tokens);
            for arg in type_args {
                collect_type_tokens(arg, tokens);
            }
        }
        TypeSig::SzArray(inner)
        | TypeSig::Ptr(inner)
        | TypeSig::ByRef(inner)
        | TypeSig::Pinned(inner)
        | TypeSig::Modified { inner, .. } => collect_type_tokens(inner, tokens),
        TypeSig::Array { element_type, .. } => collect_type_tokens(element_type, tokens),
        TypeSig::Primitive(_) | TypeSig::Var(_) | TypeSig::MVar(_) | TypeSig::FnPtr(_) => {}
    }
}

#[allow(clippy::too_many_arguments)]
fn seed(
    pe: &PeImage,
    metadata: &Metadata,
    layout: &Layout,
    editor: &ByteEditor,
    invoked_types: &InvokedTypes,
    tokens: &mut HashSet<Token>,
    blobs: &mut HashSet<u32>,
    user_strings: &mut HashSet<u32>,
) {
    for &type_idx in invoked_types {
        let Some(row) = metadata.type_defs.get(type_idx) else {
            continue;
        };
        tokens.insert((TableId::TypeDef, (type_idx + 1) as u32));
        add_coded(CodedIndexKind::TypeDefOrRef, row.extends.encode(CodedIndexKind::TypeDefOrRef), tokens);
    }

    for (idx, iface) in metadata.interface_impls.iter().enumerate() {
        if iface.class == 0 || !invoked_types.contains(&(iface.class as usize - 1)) {
            continue;
        }
        tokens.insert((TableId::InterfaceImpl, (idx + 1) as u32));
        add_coded(
            CodedIndexKind::TypeDefOrRef,
            iface.interface.encode(CodedIndexKind::TypeDefOrRef),
            tokens,
        );
    }

    for property_idx in 0..metadata.properties.len() {
        tokens.insert((TableId::Property, (property_idx + 1) as u32));
    }
    for event_idx in 0..metadata.events.len() {
        tokens.insert((TableId::Event, (event_idx + 1) as u32));
    }

    for &type_idx in invoked_types {
        for method_idx in method_range(metadata, type_idx) {
            let offset = layout.row_offset(TableId::MethodDef, (method_idx + 1) as u32);
            let row_size = layout.ctx.row_size(TableId::MethodDef);
            if !row_is_live(editor.image(), offset, row_size) {
                continue;
            }
            tokens.insert((TableId::MethodDef, (method_idx + 1) as u32));
            seed_method(pe, metadata, editor, method_idx, tokens, blobs, user_strings);

            for param_idx in param_range(metadata, method_idx) {
                let p_offset = layout.row_offset(TableId::Param, (param_idx + 1) as u32);
                let p_size = layout.ctx.row_size(TableId::Param);
                if row_is_live(editor.image(), p_offset, p_size) {
                    tokens.insert((TableId::Param, (param_idx + 1) as u32));
                }
            }
        }
        for field_idx in field_range(metadata, type_idx) {
            let offset = layout.row_offset(TableId::Field, (field_idx + 1) as u32);
            let row_size = layout.ctx.row_size(TableId::Field);
            if !row_is_live(editor.image(), offset, row_size) {
                continue;
            }
            tokens.insert((TableId::Field, (field_idx + 1) as u32));
            let sig = metadata.fields[field_idx].signature;
            if sig != 0 {
                blobs.insert(sig);
            }
        }
    }

    for (idx, constant) in metadata.constants.iter().enumerate() {
        let parent = constant.parent;
        let preserved = match parent.table {
            Some(TableId::Field) => parent.row > 0 && tokens.contains(&(TableId::Field, parent.row)),
            Some(TableId::Param) => parent.row > 0 && tokens.contains(&(TableId::Param, parent.row)),
            Some(TableId::Property) => true,
            _ => false,
        };
        if preserved {
            tokens.insert((TableId::Constant, (idx + 1) as u32));
            if constant.value != 0 {
                blobs.insert(constant.value);
            }
        }
    }
}

fn seed_method(
    pe: &PeImage,
    metadata: &Metadata,
    editor: &ByteEditor,
    method_idx: usize,
    tokens: &mut HashSet<Token>,
    blobs: &mut HashSet<u32>,
    user_strings: &mut HashSet<u32>,
) {
    let row = &metadata.method_defs[method_idx];
    if row.signature != 0 {
        blobs.insert(row.signature);
    }
    if row.rva == 0 {
        return;
    }
    let Ok(file_offset) = pe.rva_to_file_offset(row.rva) else {
        return;
    };
    let body = match MethodBody::parse(editor.image(), file_offset) {
        Ok(body) => body,
        Err(err) => {
            log::warn!("closure: malformed method body for method row {method_idx}: {err}");
            return;
        }
    };

    if body.local_var_sig_tok != 0 {
        add_raw_token(body.local_var_sig_tok, tokens);
        keep_stand_alone_sig_blob(metadata, body.local_var_sig_tok, blobs);
    }

    let Some(code) = editor.image().get(body.code_offset..body.code_offset + body.code_size) else {
        return;
    };
    let Ok(token_refs) = il::scan_tokens(code) else {
        return;
    };
    for token_ref in token_refs {
        match token_ref.kind {
            TokenKind::UserString => {
                user_strings.insert(token_ref.token & 0x00FF_FFFF);
            }
            TokenKind::Method
            | TokenKind::Field
            | TokenKind::Type
            | TokenKind::Any
            | TokenKind::Signature => {
                add_raw_token(token_ref.token, tokens);
                keep_stand_alone_sig_blob(metadata, token_ref.token, blobs);
            }
        }
    }
}

fn keep_stand_alone_sig_blob(metadata: &Metadata, token: u32, blobs: &mut HashSet<u32>) {
    if (token >> 24) as u8 != TableId::StandAloneSig as u8 {
        return;
    }
    let idx = (token & 0x00FF_FFFF) as usize;
    if let Some(sig_row) = idx.checked_sub(1).and_then(|i| metadata.stand_alone_sigs.get(i)) {
        if sig_row.signature != 0 {
            blobs.insert(sig_row.signature);
        }
    }
}

fn expand_member_refs(metadata: &Metadata, tokens: &mut HashSet<Token>, blobs: &mut HashSet<u32>) {
    let snapshot: Vec<u32> = tokens
        .iter()
        .filter(|(table, _)| *table == TableId::MemberRef)
        .map(|(_, row)| *row)
        .collect();
    for row_num in snapshot {
        let Some(row) = metadata.member_refs.get(row_num as usize - 1) else {
            continue;
        };
        add_coded(CodedIndexKind::MemberRefParent, row.class.encode(CodedIndexKind::MemberRefParent), tokens);
        if row.signature == 0 {
            continue;
        }
        if blobs.insert(row.signature) {
            parse_member_ref_signature(metadata, row.signature, tokens);
        }
    }
}

fn parse_member_ref_signature(metadata: &Metadata, blob_index: u32, tokens: &mut HashSet<Token>) {
    let Ok(data) = metadata.blobs.get(blob_index) else {
        return;
    };
    if let Ok(sig) = MethodSig::parse_blob(data) {
        collect_type_tokens(&sig.return_type, tokens);
        for param in &sig.params {
            collect_type_tokens(param, tokens);
        }
        return;
    }
    if let Ok(field_sig) = crate::signature::FieldSig::parse_blob(data) {
        collect_type_tokens(&field_sig.field_type, tokens);
    }
}

fn expand_type_specs(metadata: &Metadata, tokens: &mut HashSet<Token>, blobs: &mut HashSet<u32>) {
    let snapshot: Vec<u32> = tokens
        .iter()
        .filter(|(table, _)| *table == TableId::TypeSpec)
        .map(|(_, row)| *row)
        .collect();
    for row_num in snapshot {
        let Some(row) = metadata.type_specs.get(row_num as usize - 1) else {
            continue;
        };
        if row.signature == 0 || !blobs.insert(row.signature) {
            continue;
        }
        let Ok(data) = metadata.blobs.get(row.signature) else {
            continue;
        };
        let mut reader = Reader::new(data);
        if let Ok(ty) = TypeSig::parse(&mut reader) {
            collect_type_tokens(&ty, tokens);
        }
    }
}

fn expand_method_specs(metadata: &Metadata, tokens: &mut HashSet<Token>, blobs: &mut HashSet<u32>) {
    let snapshot: Vec<u32> = tokens
        .iter()
        .filter(|(table, _)| *table == TableId::MethodSpec)
        .map(|(_, row)| *row)
        .collect();
    for row_num in snapshot {
        let Some(row) = metadata.method_specs.get(row_num as usize - 1) else {
            continue;
        };
        add_coded(CodedIndexKind::MethodDefOrRef, row.method.encode(CodedIndexKind::MethodDefOrRef), tokens);
        if row.instantiation == 0 || !blobs.insert(row.instantiation) {
            continue;
        }
        let Ok(data) = metadata.blobs.get(row.instantiation) else {
            continue;
        };
        if let Ok(type_args) = parse_instantiation(data) {
            for ty in &type_args {
                collect_type_tokens(ty, tokens);
            }
        }
    }
}

/// A MethodSpec instantiation blob (ECMA-335 §II.23.2.15): `GENERICINST`
/// tag, compressed arg count, then that many types.
fn parse_instantiation(data: &[u8]) -> Result<Vec<TypeSig>> {
    const GENERICINST: u8 = 0x0A;
    let mut reader = Reader::new(data);
    let tag = reader.read_u8()?;
    if tag != GENERICINST {
        return Err(Error::MalformedImage(format!("unexpected MethodSpec blob tag 0x{tag:02X}")));
    }
    let count = reader.read_compressed_uint()?;
    let mut types = Vec::with_capacity(count as usize);
    for _ in 0..count {
        types.push(TypeSig::parse(&mut reader)?);
    }
    Ok(types)
}

fn sweep_custom_attributes(metadata: &Metadata, tokens: &mut HashSet<Token>, blobs: &mut HashSet<u32>) {
    let mut newly_kept = Vec::new();
    for (idx, row) in metadata.custom_attributes.iter().enumerate() {
        let parent = row.parent;
        let Some(table) = parent.table else { continue };
        if parent.row == 0 || !tokens.contains(&(table, parent.row)) {
            continue;
        }
        newly_kept.push((idx, row.attr_type.clone(), row.value));
    }
    for (idx, attr_type, value) in newly_kept {
        tokens.insert((TableId::CustomAttribute, (idx + 1) as u32));
        add_coded(CodedIndexKind::CustomAttributeType, attr_type.encode(CodedIndexKind::CustomAttributeType), tokens);
        if value != 0 {
            blobs.insert(value);
        }
    }
}

fn zero_unused_rows(metadata: &Metadata, layout: &Layout, editor: &mut ByteEditor, tokens: &HashSet<Token>) {
    for &table in &SWEPT_TABLES {
        let count = table_row_count(metadata, table);
        for row in 1..=count as u32 {
            if tokens.contains(&(table, row)) {
                continue;
            }
            let offset = layout.row_offset(table, row);
            editor.zero(offset, layout.ctx.row_size(table));
        }
    }
}

fn table_row_count(metadata: &Metadata, table: TableId) -> usize {
    match table {
        TableId::TypeRef => metadata.type_refs.len(),
        TableId::MemberRef => metadata.member_refs.len(),
        TableId::Constant => metadata.constants.len(),
        TableId::CustomAttribute => metadata.custom_attributes.len(),
        TableId::StandAloneSig => metadata.stand_alone_sigs.len(),
        TableId::TypeSpec => metadata.type_specs.len(),
        TableId::MethodSpec => metadata.method_specs.len(),
        TableId::InterfaceImpl => metadata.interface_impls.len(),
        _ => 0,
    }
}

fn zero_unused_blobs(metadata: &Metadata, layout: &Layout, editor: &mut ByteEditor, blobs: &HashSet<u32>) {
    let entries: Vec<(u32, usize)> = metadata.blobs.iter().map(|(offset, data)| (offset, data.len())).collect();
    for (offset, _) in entries {
        if offset == 0 || blobs.contains(&offset) {
            continue;
        }
        match length_prefixed_payload(metadata.blobs.data(), offset) {
            Ok(range) => {
                let file_offset = layout.blob_offset(range.start as u32);
                editor.zero(file_offset, range.len());
            }
            Err(err) => log::warn!("closure: malformed blob entry at offset {offset}: {err}"),
        }
    }
}

fn zero_unused_user_strings(metadata: &Metadata, layout: &Layout, editor: &mut ByteEditor, kept: &HashSet<u32>) {
    let entries: Vec<u32> = metadata.user_strings.iter().map(|(offset, _)| offset).collect();
    for offset in entries {
        if offset == 0 || kept.contains(&offset) {
            continue;
        }
        match user_string_payload(metadata.user_strings.data(), offset) {
            Ok(range) => {
                let file_offset = layout.us_offset(range.start as u32);
                editor.zero(file_offset, range.len());
            }
            Err(err) => log::warn!("closure: malformed #US entry at offset {offset}: {err}"),
        }
    }
}

/// Like [`length_prefixed_payload`] but for `#US`, whose length prefix
/// counts a trailing flag byte that isn't part of the character data and
/// must survive (it's read directly by [`crate::heaps::UserStringsHeap::get`]).
fn user_string_payload(heap_data: &[u8], local_offset: u32) -> Result<Range<usize>> {
    let local_offset = local_offset as usize;
    let slice = heap_data.get(local_offset..).ok_or(Error::InvalidBlob(local_offset))?;
    let mut reader = Reader::new(slice);
    let blob_len = reader.read_compressed_uint()? as usize;
    let header_size = reader.position();
    let str_len = blob_len.saturating_sub(1);
    let start = local_offset + header_size;
    let end = start + str_len;
    if end > heap_data.len() {
        return Err(Error::InvalidBlob(local_offset));
    }
    Ok(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_raw_token_splits_table_and_row() {
        let mut tokens = HashSet::new();
        add_raw_token(0x0A00_0005, &mut tokens);
        assert!(tokens.contains(&(TableId::MemberRef, 5)));
    }

    #[test]
    fn add_raw_token_ignores_null_row() {
        let mut tokens = HashSet::new();
        add_raw_token(0x0A00_0000, &mut tokens);
        assert!(tokens.is_empty());
    }

    #[test]
    fn parse_instantiation_reads_generic_args() {
        // GENERICINST, 1 arg, I4
        let data = [0x0A, 0x01, 0x08];
        let types = parse_instantiation(&data).unwrap();
        assert_eq!(types.len(), 1);
    }

    #[test]
    fn user_string_payload_excludes_flag_byte() {
        let mut heap = crate::heaps::UserStringsHeap::new();
        let offset = heap.add("Hi");
        let range = user_string_payload(heap.data(), offset).unwrap();
        assert_eq!(range.len(), 4);
    }
}
