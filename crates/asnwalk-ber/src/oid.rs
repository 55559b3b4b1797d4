//! Object identifiers in dotted and DER content form.

use std::fmt;
use std::str::FromStr;

use asnwalk_types::BerError;

/// An OID as a sequence of arc values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Oid {
    arcs: Vec<u64>,
}

impl Oid {
    /// Create an OID from arc values. At least two arcs are required and
    /// the first two must fit the X.690 packing rules.
    pub fn new(arcs: &[u64]) -> Result<Self, BerError> {
        match arcs {
            [first, second, ..] if *first <= 2 && (*first == 2 || *second < 40) => Ok(Self {
                arcs: arcs.to_vec(),
            }),
            _ => Err(BerError::InvalidOid),
        }
    }

    pub fn arcs(&self) -> &[u64] {
        &self.arcs
    }

    /// DER content octets (no tag or length).
    pub fn to_der_value(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_arc(&mut buf, self.arcs[0] * 40 + self.arcs[1]);
        for &arc in &self.arcs[2..] {
            encode_arc(&mut buf, arc);
        }
        buf
    }

    /// Parse DER content octets.
    pub fn from_der_value(data: &[u8]) -> Result<Self, BerError> {
        if data.is_empty() {
            return Err(BerError::InvalidOid);
        }
        let (first, mut pos) = decode_arc(data)?;
        let mut arcs = match first {
            0..=39 => vec![0, first],
            40..=79 => vec![1, first - 40],
            _ => vec![2, first - 80],
        };
        while pos < data.len() {
            let (arc, consumed) = decode_arc(&data[pos..])?;
            arcs.push(arc);
            pos += consumed;
        }
        Ok(Self { arcs })
    }

    /// Dotted-decimal form, e.g. `2.5.4.3`.
    pub fn to_dot_string(&self) -> String {
        self.arcs
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dot_string())
    }
}

impl FromStr for Oid {
    type Err = BerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let arcs = s
            .split('.')
            .map(|part| part.parse::<u64>().map_err(|_| BerError::InvalidOid))
            .collect::<Result<Vec<_>, _>>()?;
        Oid::new(&arcs)
    }
}

fn encode_arc(buf: &mut Vec<u8>, value: u64) {
    let mut groups = [0u8; 10];
    let mut n = 0;
    let mut v = value;
    loop {
        groups[n] = (v & 0x7F) as u8;
        n += 1;
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        buf.push(if i > 0 { groups[i] | 0x80 } else { groups[i] });
    }
}

fn decode_arc(data: &[u8]) -> Result<(u64, usize), BerError> {
    let mut value: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if i == 0 && byte == 0x80 {
            // Non-minimal encoding.
            return Err(BerError::InvalidOid);
        }
        if value > u64::MAX >> 7 {
            return Err(BerError::InvalidOid);
        }
        value = (value << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(BerError::InvalidOid)
}
