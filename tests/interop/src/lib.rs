//! Integration tests for asnwalk.
//! Real certificates, streaming sources, concurrency and encoder round trips.

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::thread;

    use asnwalk_ber::pkix::{self, oids};
    use asnwalk_ber::{
        decode_slice, encode_tree, BerDecoder, BerError, DecoderConfig, NodeType, Reader, TypeDef,
        ValueTree,
    };

    const ROOT_CA_PEM: &str = include_str!("../../vectors/certs/root_ca.pem");
    const INTERMEDIATE_CA_PEM: &str = include_str!("../../vectors/certs/intermediate_ca.pem");
    const END_ENTITY_PEM: &str = include_str!("../../vectors/certs/end_entity.pem");

    fn der(pem_text: &str) -> Vec<u8> {
        let block = pem::parse(pem_text).unwrap();
        assert_eq!(block.tag(), "CERTIFICATE");
        block.contents().to_vec()
    }

    /// Hands out one byte per read call.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match (self.0.split_first(), buf.first_mut()) {
                (Some((&byte, rest)), Some(slot)) => {
                    *slot = byte;
                    self.0 = rest;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }

    // -------------------------------------------------------
    // 1. Root CA field extraction
    // -------------------------------------------------------
    #[test]
    fn test_decode_root_ca() {
        let data = der(ROOT_CA_PEM);
        let d = decode_slice(pkix::module().unwrap(), "Certificate", DecoderConfig::default(), &data)
            .unwrap();
        assert_eq!(d.image, data);
        assert_eq!(d.raw_at("Certificate").unwrap().len(), 979);

        let version = d.find("Certificate.tbsCertificate.version").unwrap();
        assert!(!d.tree.node(version).is_defaulted());
        assert_eq!(d.raw(version).unwrap(), &hex::decode("a003020102").unwrap()[..]);

        let serial = d.find("Certificate.tbsCertificate.serialNumber").unwrap();
        assert_eq!(
            hex::encode(d.content(serial).unwrap()),
            "3277d66625e1b996c268590e2d1890484238eab9"
        );

        assert_eq!(
            d.raw_at("Certificate.tbsCertificate.subject"),
            d.raw_at("Certificate.tbsCertificate.subject.rdnSequence")
        );

        let issuer = d.find("Certificate.tbsCertificate.issuer").unwrap();
        let cn = d.find_type_value(issuer, 0, oids::COMMON_NAME).unwrap();
        assert_eq!(d.content(cn).unwrap(), b"certificate.testca.com");
        assert_eq!(d.tree.node(cn).node_type(), NodeType::Utf8String);

        let not_before = d
            .find("Certificate.tbsCertificate.validity.notBefore.utcTime")
            .unwrap();
        assert_eq!(d.content(not_before).unwrap(), b"240425130100Z");
        assert!(d
            .raw_at("Certificate.tbsCertificate.validity.notAfter.generalTime")
            .is_none());

        let spki = d
            .raw_at("Certificate.tbsCertificate.subjectPublicKeyInfo")
            .unwrap();
        assert_eq!(spki.len(), 294);
        assert!(d.raw_at("Certificate.tbsCertificate.issuerUniqueID").is_none());

        let signature = d.find("Certificate.signature").unwrap();
        assert_eq!(d.content(signature).unwrap().len(), 257);
    }

    #[test]
    fn test_extension_flags() {
        let data = der(ROOT_CA_PEM);
        let d = decode_slice(pkix::module().unwrap(), "Certificate", DecoderConfig::default(), &data)
            .unwrap();
        let extensions = d.find("Certificate.tbsCertificate.extensions").unwrap();

        let critical = d
            .find_type_value(extensions, 0, oids::BASIC_CONSTRAINTS)
            .unwrap();
        assert_eq!(d.tree.node(critical).name(), Some("critical"));
        assert_eq!(d.content(critical).unwrap(), &[0xff]);

        let critical = d.find_type_value(extensions, 0, oids::KEY_USAGE).unwrap();
        assert!(d.tree.node(critical).is_defaulted());
        assert!(d.raw(critical).is_none());
        let value = d.tree.next_sibling(critical).unwrap();
        assert_eq!(d.content(value).unwrap(), &[0x03, 0x02, 0x01, 0x06]);
    }

    // -------------------------------------------------------
    // 2. Streaming sources
    // -------------------------------------------------------
    #[test]
    fn test_certificate_stream() {
        let chain: Vec<Vec<u8>> = [ROOT_CA_PEM, INTERMEDIATE_CA_PEM, END_ENTITY_PEM]
            .into_iter()
            .map(der)
            .collect();
        let stream = chain.concat();

        let module = pkix::module().unwrap();
        let mut decoder = BerDecoder::new(module, Reader::new(Trickle(&stream)));
        for expected in &chain {
            let d = decoder.decode("Certificate").unwrap();
            assert_eq!(&d.image, expected);
        }
        assert!(matches!(decoder.decode("Certificate"), Err(BerError::Eof)));
    }

    #[test]
    fn test_truncated_certificate() {
        let data = der(END_ENTITY_PEM);
        let module = pkix::module().unwrap();
        for cut in [1, 4, 100, data.len() - 1] {
            let err = decode_slice(module, "Certificate", DecoderConfig::default(), &data[..cut])
                .unwrap_err();
            assert!(matches!(err, BerError::PrematureEof), "cut at {cut}: {err}");
        }
    }

    #[test]
    fn test_dump_matches_every_tlv() {
        let data = der(INTERMEDIATE_CA_PEM);
        let module = pkix::module().unwrap();
        let mut out = Vec::new();
        BerDecoder::new(module, Reader::from_slice(&data))
            .dump(Some("Certificate"), &mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.lines().next().unwrap().contains("Certificate SEQUENCE"));
        assert!(!text.contains("[No matching node]"));
        assert!(text.contains("(2.5.4.3)"));

        let mut plain = Vec::new();
        BerDecoder::from_slice(&data).dump(None, &mut plain).unwrap();
        let plain = String::from_utf8(plain).unwrap();
        assert_eq!(plain.lines().count(), text.lines().count());
    }

    // -------------------------------------------------------
    // 3. Concurrent decodes of one module
    // -------------------------------------------------------
    #[test]
    fn test_concurrent_decodes() {
        let module = pkix::module().unwrap();
        let inputs: Vec<Vec<u8>> = [ROOT_CA_PEM, INTERMEDIATE_CA_PEM, END_ENTITY_PEM]
            .into_iter()
            .map(der)
            .collect();

        thread::scope(|s| {
            let handles: Vec<_> = inputs
                .iter()
                .cycle()
                .take(12)
                .map(|data| {
                    s.spawn(move || {
                        let d = decode_slice(module, "Certificate", DecoderConfig::default(), data)
                            .unwrap();
                        assert_eq!(&d.image, data);
                        d.raw_at("Certificate.tbsCertificate.subject").map(<[u8]>::to_vec)
                    })
                })
                .collect();
            for handle in handles {
                assert!(handle.join().unwrap().is_some());
            }
        });
    }

    // -------------------------------------------------------
    // 4. Encoder round trips
    // -------------------------------------------------------

    /// Copy every matched primitive value into the tree's content slots.
    fn load_contents(tree: &mut ValueTree, image: &[u8]) {
        let ids: Vec<_> = tree.iter().collect();
        for id in ids {
            if !tree.node(id).node_type().is_primitive() {
                continue;
            }
            if let Some(content) = tree.content(image, id).map(<[u8]>::to_vec) {
                tree.set_content(id, &content);
            }
        }
    }

    #[test]
    fn test_reencode_decoded_certificates() {
        let module = pkix::module().unwrap();
        for pem_text in [ROOT_CA_PEM, INTERMEDIATE_CA_PEM, END_ENTITY_PEM] {
            let data = der(pem_text);
            let mut d = decode_slice(module, "Certificate", DecoderConfig::default(), &data).unwrap();
            load_contents(&mut d.tree, &data);
            let encoded = encode_tree(&mut d.tree).unwrap();
            assert_eq!(encoded, data);
            assert_eq!(
                d.tree.raw(&encoded, d.find("Certificate.tbsCertificate").unwrap()),
                decode_slice(module, "Certificate", DecoderConfig::default(), &data)
                    .unwrap()
                    .raw_at("Certificate.tbsCertificate")
            );
        }
    }

    #[test]
    fn test_encode_then_decode_custom_module() {
        let module = asnwalk_ber::Module::builder("Inventory")
            .implicit_tags()
            .define(
                "Item",
                TypeDef::sequence([
                    TypeDef::ia5_string().named("name"),
                    TypeDef::integer().named("count").tagged(
                        asnwalk_ber::TagClass::ContextSpecific,
                        0,
                        asnwalk_ber::TagMode::Module,
                    ),
                    TypeDef::set_of(TypeDef::utf8_string()).named("labels").optional(),
                ]),
            )
            .build()
            .unwrap();

        let mut tree = module.expand("Item").unwrap();
        tree.set_content(tree.find("Item.name").unwrap(), b"bolt");
        let count = tree.find("Item.count").unwrap();
        let inner = tree.first_child(count).unwrap();
        tree.set_content(inner, &[0x2a]);
        let labels = tree.find("Item.labels").unwrap();
        let first = tree.first_child(labels).unwrap();
        tree.set_content(first, b"m8");
        let second = tree.insert_copy(first);
        tree.set_content(second, b"steel");

        let encoded = encode_tree(&mut tree).unwrap();
        assert_eq!(
            hex::encode(&encoded),
            "3016160462 6f6c74 80012a 310b 0c026d38 0c05737465656c".replace(' ', "")
        );

        let d = decode_slice(&module, "Item", DecoderConfig::default(), &encoded).unwrap();
        assert_eq!(d.content(d.find("Item.count").unwrap()).unwrap(), &[0x2a]);
        let labels = d.find("Item.labels").unwrap();
        let values: Vec<&[u8]> = d
            .tree
            .children(labels)
            .filter_map(|c| d.content(c))
            .collect();
        assert_eq!(values, vec![&b"m8"[..], &b"steel"[..]]);
    }
}
