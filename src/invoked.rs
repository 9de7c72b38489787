//! Invoked-type resolution: maps a caller-supplied set of fully-qualified
//! method names onto the set of TypeDef rows the trim engine must preserve.

use std::collections::{HashMap, HashSet};

use crate::metadata::Metadata;
use crate::signature::{MethodSig, TypeSig};
use crate::tables::{CodedIndex, CodedIndexKind, TableId};

const PRIVATE_IMPL_PREFIX: &str = "<PrivateImplementationDetails>";
const STATIC_ARRAY_INIT_PREFIX: &str = "__StaticArrayInitTypeSize=";

/// 0-based TypeDef row indices the trim engine must not zero.
pub type InvokedTypes = HashSet<usize>;

/// Resolve `invoked_methods` (names of the form `Namespace.Type.Method`,
/// constructors spelled either `Type..ctor` or `Type._ctor`) to the set of
/// TypeDef rows they, and the signatures of the methods they name, reach.
pub fn resolve_invoked_types(metadata: &Metadata, invoked_methods: &HashSet<String>) -> InvokedTypes {
    let type_names = metadata.types();
    let mut name_to_row: HashMap<String, usize> = HashMap::with_capacity(type_names.len());
    for (i, info) in type_names.iter().enumerate() {
        name_to_row.insert(full_type_name(info).to_lowercase(), i);
    }

    let mut invoked_type_names: HashSet<String> = HashSet::new();
    let mut invoked_full_methods: HashSet<String> = HashSet::new();
    for raw in invoked_methods {
        let (type_part, method_part) = split_method_name(raw);
        let type_canon = canonicalize_type_part(&type_part).to_lowercase();
        let method_canon = method_part.to_lowercase();
        invoked_full_methods.insert(format!("{type_canon}.{method_canon}"));
        invoked_type_names.insert(type_canon);
    }

    let mut rows: InvokedTypes = HashSet::new();
    if !metadata.type_defs.is_empty() {
        rows.insert(0);
    }

    for (i, info) in type_names.iter().enumerate() {
        if invoked_type_names.contains(&full_type_name(info).to_lowercase()) {
            rows.insert(i);
        }
        if info.name.starts_with(PRIVATE_IMPL_PREFIX) || info.name.starts_with(STATIC_ARRAY_INIT_PREFIX) {
            rows.insert(i);
        }
    }
    include_private_impl_nested_children(metadata, &mut rows);

    let method_owner = method_owner_rows(metadata);
    let mut method_lookup: HashMap<String, usize> = HashMap::new();
    for (j, row) in metadata.method_defs.iter().enumerate() {
        let Some(owner) = method_owner.get(j).copied().flatten() else {
            continue;
        };
        let method_name = metadata.strings.get(row.name).unwrap_or("");
        let owner_name = full_type_name(&type_names[owner]).to_lowercase();
        let key = format!("{owner_name}.{}", canonicalize_method_part(method_name).to_lowercase());
        method_lookup.insert(key, j);
    }

    for full in &invoked_full_methods {
        let Some(&method_row) = method_lookup.get(full) else {
            continue;
        };
        let row = &metadata.method_defs[method_row];
        if row.signature == 0 {
            continue;
        }
        let Ok(blob) = metadata.blobs.get(row.signature) else {
            continue;
        };
        match MethodSig::parse_blob(blob) {
            Ok(sig) => {
                collect_type_refs(&sig.return_type, metadata, &name_to_row, &mut rows);
                for param in &sig.params {
                    collect_type_refs(param, metadata, &name_to_row, &mut rows);
                }
            }
            Err(err) => {
                log::warn!("invoked-type resolver: malformed signature for method row {method_row}: {err}");
            }
        }
    }

    rows
}

/// `Namespace.Name`, omitting the dot when the namespace is empty.
fn full_type_name(info: &crate::metadata::TypeInfo) -> String {
    match &info.namespace {
        Some(ns) if !ns.is_empty() => format!("{ns}.{}", info.name),
        _ => info.name.clone(),
    }
}

/// Split a fully-qualified method name into its owning-type and
/// member-name parts. Constructor spellings are normalised to the literal
/// metadata name (`.ctor`/`.cctor`) regardless of which separator the
/// caller used, since `name.rfind('.')` alone would otherwise split inside
/// the leading dot of `.ctor` itself.
fn split_method_name(name: &str) -> (String, String) {
    for suffix in ["..ctor", "._ctor"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            return (stripped.to_string(), ".ctor".to_string());
        }
    }
    for suffix in ["..cctor", "._cctor"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            return (stripped.to_string(), ".cctor".to_string());
        }
    }
    match name.rfind('.') {
        Some(idx) => (name[..idx].to_string(), name[idx + 1..].to_string()),
        None => (String::new(), name.to_string()),
    }
}

fn canonicalize_method_part(method: &str) -> String {
    match method {
        "_ctor" => ".ctor".to_string(),
        "_cctor" => ".cctor".to_string(),
        other => other.to_string(),
    }
}

/// Converts a trailing `<T, U, ...>` argument list to `Name`N`.
fn canonicalize_type_part(type_part: &str) -> String {
    if let Some(lt) = type_part.rfind('<') {
        if type_part.ends_with('>') {
            let before = &type_part[..lt];
            let inner = &type_part[lt + 1..type_part.len() - 1];
            let arity = if inner.is_empty() { 0 } else { inner.split(',').count() };
            return format!("{before}`{arity}");
        }
    }
    type_part.to_string()
}

/// Maps each MethodDef row (0-based) to its owning TypeDef row (0-based),
/// derived from the contiguous `MethodList` spans every TypeDef row carries.
fn method_owner_rows(metadata: &Metadata) -> Vec<Option<usize>> {
    let mut owner = vec![None; metadata.method_defs.len()];
    let type_count = metadata.type_defs.len();
    for i in 0..type_count {
        let start = metadata.type_defs[i].method_list as usize;
        let end = if i + 1 < type_count {
            metadata.type_defs[i + 1].method_list as usize
        } else {
            metadata.method_defs.len() + 1
        };
        for row in start..end {
            if row >= 1 {
                if let Some(slot) = owner.get_mut(row - 1) {
                    *slot = Some(i);
                }
            }
        }
    }
    owner
}

fn include_private_impl_nested_children(metadata: &Metadata, rows: &mut InvokedTypes) {
    loop {
        let mut added = false;
        for nested in &metadata.nested_classes {
            if nested.enclosing_class == 0 || nested.nested_class == 0 {
                continue;
            }
            let enclosing = nested.enclosing_class as usize - 1;
            let child = nested.nested_class as usize - 1;
            if rows.contains(&enclosing) && rows.insert(child) {
                added = true;
            }
        }
        if !added {
            break;
        }
    }
}

/// Recursively collects the TypeDef rows a parsed type tree references,
/// per §4.8: every `VALUETYPE`/`CLASS`/`GENERICINST` token, array element
/// types, and pointer/by-ref/pinned targets.
fn collect_type_refs(
    ty: &TypeSig,
    metadata: &Metadata,
    name_to_row: &HashMap<String, usize>,
    rows: &mut InvokedTypes,
) {
    match ty {
        TypeSig::Class(raw) | TypeSig::ValueType(raw) => {
            add_type_def_or_ref(*raw, metadata, name_to_row, rows);
        }
        TypeSig::GenericInst { type_ref, type_args, .. } => {
            add_type_def_or_ref(*type_ref, metadata, name_to_row, rows);
            for arg in type_args {
                collect_type_refs(arg, metadata, name_to_row, rows);
            }
        }
        TypeSig::SzArray(inner)
        | TypeSig::Ptr(inner)
        | TypeSig::ByRef(inner)
        | TypeSig::Pinned(inner)
        | TypeSig::Modified { inner, .. } => collect_type_refs(inner, metadata, name_to_row, rows),
        TypeSig::Array { element_type, .. } => {
            collect_type_refs(element_type, metadata, name_to_row, rows);
        }
        TypeSig::Primitive(_) | TypeSig::Var(_) | TypeSig::MVar(_) | TypeSig::FnPtr(_) => {}
    }
}

fn add_type_def_or_ref(
    raw: u32,
    metadata: &Metadata,
    name_to_row: &HashMap<String, usize>,
    rows: &mut InvokedTypes,
) {
    let idx = CodedIndex::decode(CodedIndexKind::TypeDefOrRef, raw);
    let Some(table) = idx.table else { return };
    if idx.row == 0 {
        return;
    }
    match table {
        TableId::TypeDef => {
            rows.insert(idx.row as usize - 1);
        }
        TableId::TypeRef => {
            // A TypeRef resolves by name; if it happens to name a type
            // defined in this same module (self-referencing TypeRef,
            // occasionally emitted by obfuscators/compilers) the matching
            // TypeDef row joins the set too.
            let Some(typeref) = metadata.type_refs.get(idx.row as usize - 1) else {
                return;
            };
            let name = metadata.strings.get(typeref.type_name).unwrap_or("");
            let namespace = if typeref.type_namespace != 0 {
                metadata.strings.get(typeref.type_namespace).ok()
            } else {
                None
            };
            let full = match namespace {
                Some(ns) if !ns.is_empty() => format!("{ns}.{name}"),
                _ => name.to_string(),
            };
            if let Some(&row) = name_to_row.get(&full.to_lowercase()) {
                rows.insert(row);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_method_name_handles_plain_member() {
        assert_eq!(
            split_method_name("MyApp.Program.Main"),
            ("MyApp.Program".to_string(), "Main".to_string())
        );
    }

    #[test]
    fn split_method_name_canonicalizes_constructor_spellings() {
        assert_eq!(
            split_method_name("MyApp.Widget..ctor"),
            ("MyApp.Widget".to_string(), ".ctor".to_string())
        );
        assert_eq!(
            split_method_name("MyApp.Widget._ctor"),
            ("MyApp.Widget".to_string(), ".ctor".to_string())
        );
        assert_eq!(
            split_method_name("MyApp.Widget._cctor"),
            ("MyApp.Widget".to_string(), ".cctor".to_string())
        );
    }

    #[test]
    fn canonicalize_type_part_converts_generic_arity() {
        assert_eq!(canonicalize_type_part("List<T>"), "List`1");
        assert_eq!(canonicalize_type_part("Dict<K,V>"), "Dict`2");
        assert_eq!(canonicalize_type_part("Plain"), "Plain");
    }
}
