//! S1: method-granularity trim. Phase 1 is S0 verbatim — it decides which
//! *types* survive. Phase 2 walks the methods of every surviving type and
//! zeroes the ones the invoked-method set doesn't name, one method at a
//! time, leaving the type's other methods and its fields untouched.

use std::collections::HashSet;

use crate::editor::ByteEditor;
use crate::invoked::InvokedTypes;
use crate::metadata::Metadata;
use crate::pe::PeImage;
use crate::trim::s0::{self, zero_method, zero_param};
use crate::trim::{method_range, param_range, Layout};

/// Run S0 (phase 1), then walk the methods of every type S0 preserved,
/// zeroing those whose fully-qualified name isn't in `invoked_methods`.
pub fn run(
    pe: &PeImage,
    metadata: &Metadata,
    layout: &Layout,
    editor: &mut ByteEditor,
    invoked_types: &InvokedTypes,
    invoked_methods: &HashSet<String>,
) {
    s0::run(pe, metadata, layout, editor, invoked_types);

    let canon_invoked = canonicalize_all(invoked_methods);

    for type_idx in 0..metadata.type_defs.len() {
        if type_idx != 0 && !invoked_types.contains(&type_idx) {
            continue; // already fully zeroed by S0
        }
        let type_name = full_type_name(metadata, type_idx).to_lowercase();
        for method_idx in method_range(metadata, type_idx) {
            let method_row = &metadata.method_defs[method_idx];
            let method_name = metadata.strings.get(method_row.name).unwrap_or("");
            let qualified = format!("{type_name}.{}", canonicalize_ctor(method_name).to_lowercase());
            if canon_invoked.contains(&qualified) {
                continue;
            }
            zero_method(pe, metadata, layout, editor, method_idx);
            for param_idx in param_range(metadata, method_idx) {
                zero_param(layout, editor, param_idx);
            }
        }
    }
}

fn full_type_name(metadata: &Metadata, type_idx: usize) -> String {
    let row = &metadata.type_defs[type_idx];
    let name = metadata.strings.get(row.type_name).unwrap_or("");
    if row.type_namespace != 0 {
        let ns = metadata.strings.get(row.type_namespace).unwrap_or("");
        if !ns.is_empty() {
            return format!("{ns}.{name}");
        }
    }
    name.to_string()
}

fn canonicalize_ctor(name: &str) -> String {
    match name {
        ".ctor" | "_ctor" => ".ctor".to_string(),
        ".cctor" | "_cctor" => ".cctor".to_string(),
        other => other.to_string(),
    }
}

/// Normalise caller-supplied invoked method names the same way the type
/// resolver does, so a method matches regardless of which constructor
/// spelling or separator the statistics source used.
fn canonicalize_all(invoked_methods: &HashSet<String>) -> HashSet<String> {
    invoked_methods
        .iter()
        .map(|name| {
            for suffix in ["..ctor", "._ctor"] {
                if let Some(stripped) = name.strip_suffix(suffix) {
                    return format!("{}.{}", stripped.to_lowercase(), ".ctor");
                }
            }
            for suffix in ["..cctor", "._cctor"] {
                if let Some(stripped) = name.strip_suffix(suffix) {
                    return format!("{}.{}", stripped.to_lowercase(), ".cctor");
                }
            }
            name.to_lowercase()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_all_normalises_both_ctor_spellings() {
        let input: HashSet<String> = ["MyApp.Widget..ctor".to_string(), "MyApp.Widget._ctor".to_string()]
            .into_iter()
            .collect();
        let out = canonicalize_all(&input);
        assert_eq!(out.len(), 1);
        assert!(out.contains("myapp.widget..ctor"));
    }

    #[test]
    fn canonicalize_ctor_maps_underscore_spelling() {
        assert_eq!(canonicalize_ctor("_ctor"), ".ctor");
        assert_eq!(canonicalize_ctor("_cctor"), ".cctor");
        assert_eq!(canonicalize_ctor("Main"), "Main");
    }
}
