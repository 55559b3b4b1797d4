//! Tag classes and grammar node kinds.

use std::fmt;

/// Universal tag numbers used by the engine.
pub mod tags {
    pub const END_OF_CONTENTS: u64 = 0;
    pub const BOOLEAN: u64 = 1;
    pub const INTEGER: u64 = 2;
    pub const BIT_STRING: u64 = 3;
    pub const OCTET_STRING: u64 = 4;
    pub const NULL: u64 = 5;
    pub const OID: u64 = 6;
    pub const UTF8_STRING: u64 = 12;
    pub const SEQUENCE: u64 = 16;
    pub const SET: u64 = 17;
    pub const PRINTABLE_STRING: u64 = 19;
    pub const IA5_STRING: u64 = 22;
    pub const UTC_TIME: u64 = 23;
    pub const GENERALIZED_TIME: u64 = 24;
}

/// ASN.1 tag class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TagClass {
    #[default]
    Universal,
    Application,
    ContextSpecific,
    Private,
}

impl TagClass {
    /// Class from the two high bits of an identifier octet.
    pub fn from_identifier(octet: u8) -> Self {
        match octet >> 6 {
            0 => TagClass::Universal,
            1 => TagClass::Application,
            2 => TagClass::ContextSpecific,
            _ => TagClass::Private,
        }
    }

    /// The class bits as they appear in an identifier octet.
    pub fn bits(self) -> u8 {
        match self {
            TagClass::Universal => 0x00,
            TagClass::Application => 0x40,
            TagClass::ContextSpecific => 0x80,
            TagClass::Private => 0xC0,
        }
    }

    /// One-letter abbreviation used in node dumps.
    pub fn letter(self) -> char {
        match self {
            TagClass::Universal => 'U',
            TagClass::Application => 'A',
            TagClass::ContextSpecific => 'C',
            TagClass::Private => 'P',
        }
    }
}

impl fmt::Display for TagClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TagClass::Universal => "UNIVERSAL",
            TagClass::Application => "APPLICATION",
            TagClass::ContextSpecific => "CONTEXT",
            TagClass::Private => "PRIVATE",
        })
    }
}

/// Kind of a grammar element.
///
/// The universal kinds map one-to-one onto universal tag numbers; the
/// remaining kinds are structural (`SequenceOf`, `Choice`, ...) or
/// annotations without a wire representation (`Tag`, `Default`, `Size`,
/// `Identifier`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    // Universal types
    Boolean,
    Integer,
    BitString,
    OctetString,
    Null,
    ObjectId,
    ObjectDescriptor,
    External,
    Real,
    Enumerated,
    EmbeddedPdv,
    Utf8String,
    RelativeOid,
    Sequence,
    Set,
    NumericString,
    PrintableString,
    TeletexString,
    VideotexString,
    Ia5String,
    UtcTime,
    GeneralizedTime,
    GraphicString,
    VisibleString,
    GeneralString,
    UniversalString,
    CharacterString,
    BmpString,

    // Structural kinds
    SequenceOf,
    SetOf,
    Choice,
    Any,

    // Annotations
    Tag,
    Default,
    Size,
    Identifier,
}

impl NodeType {
    /// The kind for a universal tag number, if the engine knows it.
    pub fn from_universal(tag: u64) -> Option<Self> {
        Some(match tag {
            1 => NodeType::Boolean,
            2 => NodeType::Integer,
            3 => NodeType::BitString,
            4 => NodeType::OctetString,
            5 => NodeType::Null,
            6 => NodeType::ObjectId,
            7 => NodeType::ObjectDescriptor,
            8 => NodeType::External,
            9 => NodeType::Real,
            10 => NodeType::Enumerated,
            11 => NodeType::EmbeddedPdv,
            12 => NodeType::Utf8String,
            13 => NodeType::RelativeOid,
            16 => NodeType::Sequence,
            17 => NodeType::Set,
            18 => NodeType::NumericString,
            19 => NodeType::PrintableString,
            20 => NodeType::TeletexString,
            21 => NodeType::VideotexString,
            22 => NodeType::Ia5String,
            23 => NodeType::UtcTime,
            24 => NodeType::GeneralizedTime,
            25 => NodeType::GraphicString,
            26 => NodeType::VisibleString,
            27 => NodeType::GeneralString,
            28 => NodeType::UniversalString,
            29 => NodeType::CharacterString,
            30 => NodeType::BmpString,
            _ => return None,
        })
    }

    /// Universal tag number of this kind, `None` for structural kinds
    /// that have no tag of their own.
    pub fn universal_tag(self) -> Option<u64> {
        Some(match self {
            NodeType::Boolean => 1,
            NodeType::Integer => 2,
            NodeType::BitString => 3,
            NodeType::OctetString => 4,
            NodeType::Null => 5,
            NodeType::ObjectId => 6,
            NodeType::ObjectDescriptor => 7,
            NodeType::External => 8,
            NodeType::Real => 9,
            NodeType::Enumerated => 10,
            NodeType::EmbeddedPdv => 11,
            NodeType::Utf8String => 12,
            NodeType::RelativeOid => 13,
            NodeType::Sequence | NodeType::SequenceOf => 16,
            NodeType::Set | NodeType::SetOf => 17,
            NodeType::NumericString => 18,
            NodeType::PrintableString => 19,
            NodeType::TeletexString => 20,
            NodeType::VideotexString => 21,
            NodeType::Ia5String => 22,
            NodeType::UtcTime => 23,
            NodeType::GeneralizedTime => 24,
            NodeType::GraphicString => 25,
            NodeType::VisibleString => 26,
            NodeType::GeneralString => 27,
            NodeType::UniversalString => 28,
            NodeType::CharacterString => 29,
            NodeType::BmpString => 30,
            _ => return None,
        })
    }

    /// Whether values of this kind are encoded with primitive TLVs.
    pub fn is_primitive(self) -> bool {
        !matches!(
            self,
            NodeType::External
                | NodeType::EmbeddedPdv
                | NodeType::Sequence
                | NodeType::Set
                | NodeType::SequenceOf
                | NodeType::SetOf
                | NodeType::Choice
                | NodeType::Any
                | NodeType::Tag
                | NodeType::Default
                | NodeType::Size
                | NodeType::Identifier
        )
    }

    /// Whether the universal tag number denotes a primitive kind.
    pub fn is_primitive_tag(tag: u64) -> bool {
        NodeType::from_universal(tag).is_some_and(NodeType::is_primitive)
    }

    /// SEQUENCE OF or SET OF.
    pub fn is_repeated(self) -> bool {
        matches!(self, NodeType::SequenceOf | NodeType::SetOf)
    }

    /// ASN.1 keyword for this kind.
    pub fn name(self) -> &'static str {
        match self {
            NodeType::Boolean => "BOOLEAN",
            NodeType::Integer => "INTEGER",
            NodeType::BitString => "BIT STRING",
            NodeType::OctetString => "OCTET STRING",
            NodeType::Null => "NULL",
            NodeType::ObjectId => "OBJECT IDENTIFIER",
            NodeType::ObjectDescriptor => "ObjectDescriptor",
            NodeType::External => "EXTERNAL",
            NodeType::Real => "REAL",
            NodeType::Enumerated => "ENUMERATED",
            NodeType::EmbeddedPdv => "EMBEDDED PDV",
            NodeType::Utf8String => "UTF8String",
            NodeType::RelativeOid => "RELATIVE-OID",
            NodeType::Sequence => "SEQUENCE",
            NodeType::Set => "SET",
            NodeType::NumericString => "NumericString",
            NodeType::PrintableString => "PrintableString",
            NodeType::TeletexString => "TeletexString",
            NodeType::VideotexString => "VideotexString",
            NodeType::Ia5String => "IA5String",
            NodeType::UtcTime => "UTCTime",
            NodeType::GeneralizedTime => "GeneralizedTime",
            NodeType::GraphicString => "GraphicString",
            NodeType::VisibleString => "VisibleString",
            NodeType::GeneralString => "GeneralString",
            NodeType::UniversalString => "UniversalString",
            NodeType::CharacterString => "CHARACTER STRING",
            NodeType::BmpString => "BMPString",
            NodeType::SequenceOf => "SEQUENCE OF",
            NodeType::SetOf => "SET OF",
            NodeType::Choice => "CHOICE",
            NodeType::Any => "ANY",
            NodeType::Tag => "TAG",
            NodeType::Default => "DEFAULT",
            NodeType::Size => "SIZE",
            NodeType::Identifier => "IDENTIFIER",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_universal_mapping() {
        for tag in 1..=30u64 {
            if let Some(ty) = NodeType::from_universal(tag) {
                assert_eq!(ty.universal_tag(), Some(tag));
            }
        }
        assert_eq!(NodeType::from_universal(14), None);
        assert_eq!(NodeType::from_universal(31), None);
        assert_eq!(NodeType::SequenceOf.universal_tag(), Some(tags::SEQUENCE));
        assert_eq!(NodeType::Choice.universal_tag(), None);
    }

    #[test]
    fn test_primitive_kinds() {
        assert!(NodeType::Integer.is_primitive());
        assert!(NodeType::BmpString.is_primitive());
        assert!(!NodeType::Sequence.is_primitive());
        assert!(!NodeType::External.is_primitive());
        assert!(NodeType::is_primitive_tag(tags::OID));
        assert!(!NodeType::is_primitive_tag(tags::SET));
        assert!(!NodeType::is_primitive_tag(15));
    }

    #[test]
    fn test_tag_class_bits() {
        for class in [
            TagClass::Universal,
            TagClass::Application,
            TagClass::ContextSpecific,
            TagClass::Private,
        ] {
            assert_eq!(TagClass::from_identifier(class.bits() | 0x25), class);
        }
        assert_eq!(TagClass::ContextSpecific.to_string(), "CONTEXT");
    }
}
