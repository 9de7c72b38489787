//! String Heap Trimmer (§4.11). Runs after S0/S1 and depends on their
//! preservation decisions: a string survives if anything still-preserved in
//! the tables references it, regardless of whether the row that names it
//! was itself zeroed in a prior pass.

use std::collections::HashSet;

use crate::editor::ByteEditor;
use crate::invoked::InvokedTypes;
use crate::metadata::Metadata;
use crate::trim::{field_range, method_range, Layout};

/// Zero every `#Strings` entry not referenced by a preserved row.
/// `invoked_types` is the set S0/S1 preserved; every method and field of a
/// preserved type is itself preserved (S1 may still have zeroed individual
/// methods, but their Name index bytes are untouched by S1's own zeroing,
/// so walking the full method/field list here is correct for both S0 and
/// S1 images — a trimmer re-deriving "preserved" from S1's finer-grained
/// decisions would need the caller-supplied method names, not just types).
pub fn run(metadata: &Metadata, layout: &Layout, editor: &mut ByteEditor, invoked_types: &InvokedTypes) {
    let mut kept: HashSet<u32> = HashSet::new();
    kept.insert(0); // the canonical empty string

    for &type_idx in invoked_types {
        let Some(row) = metadata.type_defs.get(type_idx) else {
            continue;
        };
        kept.insert(row.type_name);
        kept.insert(row.type_namespace);

        for method_idx in method_range(metadata, type_idx) {
            kept.insert(metadata.method_defs[method_idx].name);
            for param_idx in crate::trim::param_range(metadata, method_idx) {
                kept.insert(metadata.params[param_idx].name);
            }
        }
        for field_idx in field_range(metadata, type_idx) {
            kept.insert(metadata.fields[field_idx].name);
        }
    }

    // Always-preserved auxiliary tables.
    for row in &metadata.type_refs {
        kept.insert(row.type_name);
        kept.insert(row.type_namespace);
    }
    for row in &metadata.member_refs {
        kept.insert(row.name);
    }
    for row in &metadata.modules {
        kept.insert(row.name);
    }
    for row in &metadata.assemblies {
        kept.insert(row.name);
        kept.insert(row.culture);
    }
    for row in &metadata.assembly_refs {
        kept.insert(row.name);
        kept.insert(row.culture);
    }
    for row in &metadata.module_refs {
        kept.insert(row.name);
    }
    for row in &metadata.files {
        kept.insert(row.name);
    }
    for map in &metadata.property_maps {
        if !invoked_types.contains(&(map.parent as usize)) {
            continue;
        }
        let start = map.property_list as usize;
        let end = metadata
            .property_maps
            .iter()
            .find(|m| m.parent > map.parent)
            .map(|m| m.property_list as usize)
            .unwrap_or(metadata.properties.len() + 1);
        for idx in start.saturating_sub(1)..end.saturating_sub(1).min(metadata.properties.len()) {
            kept.insert(metadata.properties[idx].name);
        }
    }
    for map in &metadata.event_maps {
        if !invoked_types.contains(&(map.parent as usize)) {
            continue;
        }
        let start = map.event_list as usize;
        let end = metadata
            .event_maps
            .iter()
            .find(|m| m.parent > map.parent)
            .map(|m| m.event_list as usize)
            .unwrap_or(metadata.events.len() + 1);
        for idx in start.saturating_sub(1)..end.saturating_sub(1).min(metadata.events.len()) {
            kept.insert(metadata.events[idx].name);
        }
    }

    for (offset, s) in metadata.strings.iter() {
        if kept.contains(&offset) {
            continue;
        }
        editor.zero(layout.string_offset(offset), s.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::EditMode;
    use crate::heaps::StringsHeap;

    #[test]
    fn unreferenced_string_is_zeroed() {
        let mut heap = StringsHeap::new();
        let kept_off = heap.add("Kept");
        let dropped_off = heap.add("Dropped");

        let mut kept: HashSet<u32> = HashSet::new();
        kept.insert(0);
        kept.insert(kept_off);

        let mut image = vec![0xFFu8; 64];
        image[..heap.data().len()].copy_from_slice(heap.data());
        let mut editor = ByteEditor::new(&mut image, EditMode::Zero);

        for (offset, s) in heap.iter() {
            if kept.contains(&offset) {
                continue;
            }
            editor.zero(offset, s.len());
        }

        assert_eq!(&image[dropped_off as usize..dropped_off as usize + 7], b"\0\0\0\0\0\0\0");
        assert_eq!(&image[kept_off as usize..kept_off as usize + 4], b"Kept");
    }
}
