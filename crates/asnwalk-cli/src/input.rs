//! Input loading: DER as-is, PEM blocks concatenated into one DER stream.

use std::fs;
use std::io::{self, Read};

const PEM_MARKER: &[u8] = b"-----BEGIN ";

pub fn load(file: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let data = if file == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        buf
    } else {
        fs::read(file)?
    };
    decode_pem_or_der(data)
}

fn decode_pem_or_der(data: Vec<u8>) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    if !data[start..].starts_with(PEM_MARKER) {
        return Ok(data);
    }
    let blocks = pem::parse_many(&data)?;
    if blocks.is_empty() {
        return Err("no PEM blocks found".into());
    }
    tracing::debug!(blocks = blocks.len(), "decoded PEM input");
    Ok(blocks.into_iter().flat_map(pem::Pem::into_contents).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_der_passthrough() {
        let der = hex::decode("3003020101").unwrap();
        assert_eq!(decode_pem_or_der(der.clone()).unwrap(), der);
    }

    #[test]
    fn test_pem_blocks_concatenated() {
        let text = "\n-----BEGIN DATA-----\nMAMCAQE=\n-----END DATA-----\n\
                    -----BEGIN DATA-----\nBQA=\n-----END DATA-----\n";
        let der = decode_pem_or_der(text.as_bytes().to_vec()).unwrap();
        assert_eq!(hex::encode(der), "30030201010500");
    }

    #[test]
    fn test_broken_pem_rejected() {
        let text = "-----BEGIN DATA-----\n!!!!\n-----END DATA-----\n";
        assert!(decode_pem_or_der(text.as_bytes().to_vec()).is_err());
    }
}
