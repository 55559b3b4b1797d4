//! Built-in grammar for the X.509 certificate structures of RFC 5280,
//! plus the CMS `ContentInfo` wrapper.

use std::sync::OnceLock;

use asnwalk_types::BerError;

use crate::schema::{Module, TypeDef};

/// Name of the built-in module.
pub const MODULE_NAME: &str = "PKIX1";

/// Common attribute type OIDs, as DER content octets.
pub mod oids {
    pub const COMMON_NAME: &[u8] = &[0x55, 0x04, 0x03];
    pub const COUNTRY_NAME: &[u8] = &[0x55, 0x04, 0x06];
    pub const ORGANIZATION_NAME: &[u8] = &[0x55, 0x04, 0x0A];
    pub const BASIC_CONSTRAINTS: &[u8] = &[0x55, 0x1D, 0x13];
    pub const KEY_USAGE: &[u8] = &[0x55, 0x1D, 0x0F];
}

static MODULE: OnceLock<Module> = OnceLock::new();

/// The PKIX module, built on first use.
pub fn module() -> Result<&'static Module, BerError> {
    if let Some(module) = MODULE.get() {
        return Ok(module);
    }
    let built = build()?;
    Ok(MODULE.get_or_init(|| built))
}

fn algorithm_identifier() -> TypeDef {
    TypeDef::sequence([
        TypeDef::object_identifier().named("algorithm"),
        TypeDef::any().named("parameters").optional(),
    ])
}

fn build() -> Result<Module, BerError> {
    Module::builder(MODULE_NAME)
        .define(
            "Certificate",
            TypeDef::sequence([
                TypeDef::reference("TBSCertificate").named("tbsCertificate"),
                TypeDef::reference("AlgorithmIdentifier").named("signatureAlgorithm"),
                TypeDef::bit_string().named("signature"),
            ]),
        )
        .define(
            "TBSCertificate",
            TypeDef::sequence([
                TypeDef::reference("Version")
                    .named("version")
                    .explicit(0)
                    .default("v1"),
                TypeDef::reference("CertificateSerialNumber").named("serialNumber"),
                TypeDef::reference("AlgorithmIdentifier").named("signature"),
                TypeDef::reference("Name").named("issuer"),
                TypeDef::reference("Validity").named("validity"),
                TypeDef::reference("Name").named("subject"),
                TypeDef::reference("SubjectPublicKeyInfo").named("subjectPublicKeyInfo"),
                TypeDef::reference("UniqueIdentifier")
                    .named("issuerUniqueID")
                    .implicit(1)
                    .optional(),
                TypeDef::reference("UniqueIdentifier")
                    .named("subjectUniqueID")
                    .implicit(2)
                    .optional(),
                TypeDef::reference("Extensions")
                    .named("extensions")
                    .explicit(3)
                    .optional(),
            ]),
        )
        .define("Version", TypeDef::integer())
        .define("CertificateSerialNumber", TypeDef::integer())
        .define("AlgorithmIdentifier", algorithm_identifier())
        .define(
            "Name",
            TypeDef::choice([TypeDef::reference("RDNSequence").named("rdnSequence")]),
        )
        .define(
            "RDNSequence",
            TypeDef::sequence_of(TypeDef::reference("RelativeDistinguishedName")),
        )
        .define(
            "RelativeDistinguishedName",
            TypeDef::set_of(TypeDef::reference("AttributeTypeAndValue")).size("1..MAX"),
        )
        .define(
            "AttributeTypeAndValue",
            TypeDef::sequence([
                TypeDef::object_identifier().named("type"),
                TypeDef::any().named("value"),
            ]),
        )
        .define(
            "Validity",
            TypeDef::sequence([
                TypeDef::reference("Time").named("notBefore"),
                TypeDef::reference("Time").named("notAfter"),
            ]),
        )
        .define(
            "Time",
            TypeDef::choice([
                TypeDef::utc_time().named("utcTime"),
                TypeDef::generalized_time().named("generalTime"),
            ]),
        )
        .define(
            "SubjectPublicKeyInfo",
            TypeDef::sequence([
                TypeDef::reference("AlgorithmIdentifier").named("algorithm"),
                TypeDef::bit_string().named("subjectPublicKey"),
            ]),
        )
        .define("UniqueIdentifier", TypeDef::bit_string())
        .define(
            "Extensions",
            TypeDef::sequence_of(TypeDef::reference("Extension")).size("1..MAX"),
        )
        .define(
            "Extension",
            TypeDef::sequence([
                TypeDef::object_identifier().named("extnID"),
                TypeDef::boolean().named("critical").default("FALSE"),
                TypeDef::octet_string().named("extnValue"),
            ]),
        )
        .define(
            "ContentInfo",
            TypeDef::sequence([
                TypeDef::object_identifier().named("contentType"),
                TypeDef::any().named("content").explicit(0).optional(),
            ]),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{decode_slice, DecoderConfig, NodeType};

    fn bytes(s: &str) -> Vec<u8> {
        hex::decode(s.replace(' ', "")).unwrap()
    }

    #[test]
    fn test_module_builds_once() {
        let a = module().unwrap();
        let b = module().unwrap();
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.name(), MODULE_NAME);
        let names: Vec<&str> = a.assignments().collect();
        for expected in ["Certificate", "TBSCertificate", "Extension", "ContentInfo"] {
            assert!(names.contains(&expected), "{expected} missing");
        }
    }

    #[test]
    fn test_schema_paths() {
        let m = module().unwrap();
        let version = m.find("TBSCertificate.version").unwrap();
        assert_eq!(version.node_type(), NodeType::Tag);
        assert!(version.flags().has_default);
        assert_eq!(
            m.find("PKIX1.Certificate.tbsCertificate.validity.notBefore.utcTime")
                .unwrap()
                .node_type(),
            NodeType::UtcTime
        );
        let tree = m.expand("Certificate").unwrap();
        assert!(tree
            .find("Certificate.tbsCertificate.subjectPublicKeyInfo.algorithm.parameters")
            .is_some());
    }

    #[test]
    fn test_decode_name() {
        let data = bytes(
            "301a 310b 3009 0603550406 13025553 310b 3009 0603550403 0c024341",
        );
        let d = decode_slice(module().unwrap(), "Name", DecoderConfig::default(), &data).unwrap();
        assert_eq!(d.image, data);
        let root = d.tree.root();
        let cn = d.find_type_value(root, 0, oids::COMMON_NAME).unwrap();
        assert_eq!(d.content(cn).unwrap(), b"CA");
        assert_eq!(d.tree.node(cn).node_type(), NodeType::Utf8String);
        let c = d.find_type_value(root, 0, oids::COUNTRY_NAME).unwrap();
        assert_eq!(d.content(c).unwrap(), b"US");
        assert_eq!(d.tree.node(c).node_type(), NodeType::PrintableString);
        assert!(d.find_type_value(root, 1, oids::COMMON_NAME).is_none());
    }

    #[test]
    fn test_decode_extension_default() {
        let plain = bytes("300b 0603551d0f 0404030205a0");
        let d = decode_slice(module().unwrap(), "Extension", DecoderConfig::default(), &plain)
            .unwrap();
        assert!(d.tree.node(d.find("Extension.critical").unwrap()).is_defaulted());
        assert_eq!(
            d.content(d.find("Extension.extnValue").unwrap()).unwrap(),
            &bytes("030205a0")[..]
        );

        let critical = bytes("300e 0603551d0f 0101ff 0404030205a0");
        let d = decode_slice(module().unwrap(), "Extension", DecoderConfig::default(), &critical)
            .unwrap();
        let flag = d.find("Extension.critical").unwrap();
        assert!(!d.tree.node(flag).is_defaulted());
        assert_eq!(d.content(flag).unwrap(), &[0xff]);
    }

    #[test]
    fn test_decode_spki_with_domain_parameters() {
        let data = bytes("3017 3011 0607 2a8648ce380401 3006 020101 020102 030200ff");
        let d = decode_slice(
            module().unwrap(),
            "SubjectPublicKeyInfo",
            DecoderConfig::default(),
            &data,
        )
        .unwrap();
        assert_eq!(
            d.raw_at("SubjectPublicKeyInfo.algorithm.parameters").unwrap(),
            &bytes("3006 020101 020102")[..]
        );
        assert_eq!(
            d.raw_at("SubjectPublicKeyInfo.subjectPublicKey").unwrap(),
            &bytes("030200ff")[..]
        );
    }

    #[test]
    fn test_decode_content_info() {
        let data = bytes("3011 06092a864886f70d010701 a004 04026869");
        let d = decode_slice(module().unwrap(), "ContentInfo", DecoderConfig::default(), &data)
            .unwrap();
        let content = d.find("ContentInfo.content").unwrap();
        assert_eq!(d.raw(content).unwrap(), &bytes("a004 04026869")[..]);
        let inner = d.tree.first_child(content).unwrap();
        assert_eq!(d.tree.node(inner).node_type(), NodeType::OctetString);
        assert_eq!(d.content(inner).unwrap(), b"hi");
    }
}
