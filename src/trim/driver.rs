//! The trim engine's two public entry points. Both follow the same fixed
//! step order (§4.13): parse, derive the invoked-type set, run the chosen
//! granularity pass, trim the string heap, optionally run the reference
//! closure. Nothing past step 1 can fail the whole run — a recoverable
//! error along the way is logged and that one entity is left untouched,
//! never the whole buffer.

use std::collections::HashSet;

use crate::editor::{ByteEditor, EditMode};
use crate::error::Result;
use crate::invoked::resolve_invoked_types;
use crate::metadata::Metadata;
use crate::pe::PeImage;
use crate::trim::{closure, s0, s1, strings_trim, Layout};

/// Class-granularity trim: every TypeDef not reachable from `invoked_methods`
/// is zeroed whole. Returns the mutated image; the input is never modified.
pub fn trim_class_level(image: &[u8], invoked_methods: &HashSet<String>, deep: bool) -> Result<Vec<u8>> {
    run(image, invoked_methods, deep, Granularity::Class)
}

/// Method-granularity trim: types reachable from `invoked_methods` survive
/// in full, but only their named methods keep their bodies.
pub fn trim_method_level(image: &[u8], invoked_methods: &HashSet<String>, deep: bool) -> Result<Vec<u8>> {
    run(image, invoked_methods, deep, Granularity::Method)
}

enum Granularity {
    Class,
    Method,
}

fn run(image: &[u8], invoked_methods: &HashSet<String>, deep: bool, granularity: Granularity) -> Result<Vec<u8>> {
    let mut output = image.to_vec();

    let pe = PeImage::parse(image)?;
    let metadata = Metadata::parse(pe.metadata_slice(image))?;
    let layout = Layout::build(&metadata, pe.metadata_offset)?;
    let invoked_types = resolve_invoked_types(&metadata, invoked_methods);

    let mut editor = ByteEditor::new(&mut output, EditMode::Zero);
    match granularity {
        Granularity::Class => s0::run(&pe, &metadata, &layout, &mut editor, &invoked_types),
        Granularity::Method => s1::run(&pe, &metadata, &layout, &mut editor, &invoked_types, invoked_methods),
    }
    strings_trim::run(&metadata, &layout, &mut editor, &invoked_types);
    if deep {
        closure::run(&pe, &metadata, &layout, &mut editor, &invoked_types);
    }

    let stats = editor.stats();
    log::info!(
        "trim complete: {} bytes zeroed ({} in method bodies)",
        stats.bytes_zeroed,
        stats.method_body_bytes_zeroed,
    );

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_image_is_rejected_before_any_mutation() {
        let image = vec![0u8; 16];
        let methods = HashSet::new();
        assert!(trim_class_level(&image, &methods, false).is_err());
        assert!(trim_method_level(&image, &methods, false).is_err());
    }
}
