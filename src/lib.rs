//! # clrtrim
//!
//! An ECMA-335 CLI/.NET metadata reachability trimmer.
//!
//! This crate loads a managed PE image, computes which types and methods are
//! reachable given a caller-supplied set of invoked method names, and zeroes
//! the byte ranges of everything else in place. The image's section layout,
//! stream offsets, table row counts and index values never change; only the
//! payload bytes of unreachable entities are cleared.
//!
//! The metadata reader/writer layer (heaps, tables, signatures) is reused
//! from the library this crate grew out of and is PE-agnostic by design:
//! [`pe`] supplies the section map and CLI header that locate the metadata
//! root within a raw image, and [`trim`] is the engine that walks the parsed
//! tables and clears unreachable payload.
//!
//! ## Example
//!
//! ```ignore
//! use clrtrim::trim::trim_class_level;
//!
//! let invoked = ["MyApp.Program.Main".to_string()].into_iter().collect();
//! let trimmed = trim_class_level(&image_bytes, &invoked, false)?;
//! ```

pub mod body;
pub mod crypto;
pub mod editor;
pub mod error;
pub mod heaps;
pub mod il;
pub mod invoked;
pub mod metadata;
pub mod pe;
pub mod reader;
pub mod root;
pub mod signature;
pub mod stats;
pub mod stream;
pub mod tables;
pub mod trim;
pub mod writer;

// Re-export main types
pub use error::{Error, Result};
pub use metadata::{AssemblyInfo, AssemblyRefInfo, Metadata, MethodInfo, TypeInfo};
pub use root::MetadataRoot;
pub use stream::StreamHeader;

// Re-export heaps
pub use heaps::{BlobHeap, GuidHeap, StringsHeap, UserStringsHeap};

// Re-export tables
pub use tables::{CodedIndex, CodedIndexKind, TableGeometry, TableId, TablesHeader};

// Re-export table rows
pub use tables::{
    AssemblyOsRow, AssemblyProcessorRow, AssemblyRefOsRow, AssemblyRefProcessorRow,
    AssemblyRefRow, AssemblyRow, ClassLayoutRow, ConstantRow, CustomAttributeRow, DeclSecurityRow,
    EncLogRow, EncMapRow, EventMapRow, EventPtrRow, EventRow, ExportedTypeRow, FieldLayoutRow,
    FieldMarshalRow, FieldPtrRow, FieldRow, FieldRvaRow, FileRow, GenericParamConstraintRow,
    GenericParamRow, ImplMapRow, InterfaceImplRow, ManifestResourceRow, MemberRefRow,
    MethodDefRow, MethodImplRow, MethodPtrRow, MethodSemanticsRow, MethodSpecRow, ModuleRefRow,
    ModuleRow, NestedClassRow, ParamPtrRow, ParamRow, PropertyMapRow, PropertyPtrRow,
    PropertyRow, StandAloneSigRow, TypeDefRow, TypeRefRow, TypeSpecRow,
};
