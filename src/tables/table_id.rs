//! Metadata table identifiers (ECMA-335 §II.22).

use crate::error::{Error, Result};

/// Identifies one of the forty-five metadata tables by its numeric id.
///
/// Values match the table index used as the bit position in the tables
/// header's `valid`/`sorted` bitmasks and as the high byte of a metadata
/// token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TableId {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    FieldPtr = 0x03,
    Field = 0x04,
    MethodPtr = 0x05,
    MethodDef = 0x06,
    ParamPtr = 0x07,
    Param = 0x08,
    InterfaceImpl = 0x09,
    MemberRef = 0x0A,
    Constant = 0x0B,
    CustomAttribute = 0x0C,
    FieldMarshal = 0x0D,
    DeclSecurity = 0x0E,
    ClassLayout = 0x0F,
    FieldLayout = 0x10,
    StandAloneSig = 0x11,
    EventMap = 0x12,
    EventPtr = 0x13,
    Event = 0x14,
    PropertyMap = 0x15,
    PropertyPtr = 0x16,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    ModuleRef = 0x1A,
    TypeSpec = 0x1B,
    ImplMap = 0x1C,
    FieldRva = 0x1D,
    EncLog = 0x1E,
    EncMap = 0x1F,
    Assembly = 0x20,
    AssemblyProcessor = 0x21,
    AssemblyOs = 0x22,
    AssemblyRef = 0x23,
    AssemblyRefProcessor = 0x24,
    AssemblyRefOs = 0x25,
    File = 0x26,
    ExportedType = 0x27,
    ManifestResource = 0x28,
    NestedClass = 0x29,
    GenericParam = 0x2A,
    MethodSpec = 0x2B,
    GenericParamConstraint = 0x2C,
}

impl TableId {
    /// All forty-five table ids, in ascending order.
    pub const ALL: [TableId; 45] = [
        Self::Module,
        Self::TypeRef,
        Self::TypeDef,
        Self::FieldPtr,
        Self::Field,
        Self::MethodPtr,
        Self::MethodDef,
        Self::ParamPtr,
        Self::Param,
        Self::InterfaceImpl,
        Self::MemberRef,
        Self::Constant,
        Self::CustomAttribute,
        Self::FieldMarshal,
        Self::DeclSecurity,
        Self::ClassLayout,
        Self::FieldLayout,
        Self::StandAloneSig,
        Self::EventMap,
        Self::EventPtr,
        Self::Event,
        Self::PropertyMap,
        Self::PropertyPtr,
        Self::Property,
        Self::MethodSemantics,
        Self::MethodImpl,
        Self::ModuleRef,
        Self::TypeSpec,
        Self::ImplMap,
        Self::FieldRva,
        Self::EncLog,
        Self::EncMap,
        Self::Assembly,
        Self::AssemblyProcessor,
        Self::AssemblyOs,
        Self::AssemblyRef,
        Self::AssemblyRefProcessor,
        Self::AssemblyRefOs,
        Self::File,
        Self::ExportedType,
        Self::ManifestResource,
        Self::NestedClass,
        Self::GenericParam,
        Self::MethodSpec,
        Self::GenericParamConstraint,
    ];

    /// Build a table id from its raw numeric value.
    pub fn from_u8(value: u8) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| *t as u8 == value)
            .ok_or(Error::InvalidTableId(value))
    }
}
