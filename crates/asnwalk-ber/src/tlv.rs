//! Tag-length header codec.
//!
//! Reads and writes exactly one identifier+length header. Reading accepts
//! BER (long-form tag numbers, indefinite lengths); writing supports only
//! single-octet tag numbers.

use std::fmt;
use std::io::Write;

use asnwalk_types::{tags, BerError, NodeType, TagClass};

use crate::reader::ByteSource;

/// Upper bound on the size of one tag+length header.
pub const MAX_HEADER_LEN: usize = 10;

/// One decoded tag+length header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagInfo {
    pub class: TagClass,
    pub is_constructed: bool,
    /// Tag number. Long-form numbers that overflow are truncated.
    pub tag: u64,
    /// Declared value length; 0 when `ndef` is set.
    pub length: usize,
    /// Indefinite length form.
    pub ndef: bool,
    /// Number of header bytes.
    pub nhdr: usize,
    /// Set when the header used a construct DER forbids.
    pub non_der: bool,
    buf: [u8; MAX_HEADER_LEN],
}

impl TagInfo {
    fn empty() -> Self {
        Self {
            class: TagClass::Universal,
            is_constructed: false,
            tag: 0,
            length: 0,
            ndef: false,
            nhdr: 0,
            non_der: false,
            buf: [0; MAX_HEADER_LEN],
        }
    }

    fn push(&mut self, byte: u8) -> Result<(), BerError> {
        if self.nhdr >= MAX_HEADER_LEN {
            return Err(BerError::MalformedHeader("tag+length header too large"));
        }
        self.buf[self.nhdr] = byte;
        self.nhdr += 1;
        Ok(())
    }

    /// The raw header bytes as read.
    pub fn header(&self) -> &[u8] {
        &self.buf[..self.nhdr]
    }

    /// The universal end-of-contents marker.
    pub fn is_end_tag(&self) -> bool {
        self.class == TagClass::Universal && self.tag == tags::END_OF_CONTENTS
    }
}

impl fmt::Display for TagInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.class, NodeType::from_universal(self.tag)) {
            (TagClass::Universal, Some(ty)) => write!(f, "{ty}")?,
            (TagClass::Universal, None) if self.tag == tags::END_OF_CONTENTS => {
                f.write_str("EOC")?
            }
            (class, _) => write!(f, "[{class} {}]", self.tag)?,
        }
        write!(
            f,
            " {} hdr={} len=",
            if self.is_constructed { 'c' } else { 'p' },
            self.nhdr
        )?;
        if self.ndef {
            f.write_str("ndef")
        } else {
            write!(f, "{}", self.length)
        }
    }
}

fn decode_header<F>(first: u8, mut next: F) -> Result<TagInfo, BerError>
where
    F: FnMut() -> Result<Option<u8>, BerError>,
{
    let mut ti = TagInfo::empty();
    ti.push(first)?;
    ti.class = TagClass::from_identifier(first);
    ti.is_constructed = first & 0x20 != 0;

    let low = first & 0x1F;
    if low < 0x1F {
        ti.tag = u64::from(low);
    } else {
        // Base-128 continuation; high bits fall off on overflow.
        let mut tag: u64 = 0;
        loop {
            let byte = next()?.ok_or(BerError::PrematureEof)?;
            ti.push(byte)?;
            tag = (tag << 7) | u64::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                break;
            }
        }
        ti.tag = tag;
    }

    let first_len = next()?.ok_or(BerError::PrematureEof)?;
    ti.push(first_len)?;
    if first_len & 0x80 == 0 {
        ti.length = usize::from(first_len);
    } else if first_len == 0x80 {
        ti.ndef = true;
        ti.non_der = true;
    } else if first_len == 0xFF {
        return Err(BerError::ForbiddenLength);
    } else {
        let count = usize::from(first_len & 0x7F);
        if count > std::mem::size_of::<usize>() {
            return Err(BerError::LengthTooLarge(count));
        }
        let mut length: usize = 0;
        for _ in 0..count {
            let byte = next()?.ok_or(BerError::PrematureEof)?;
            ti.push(byte)?;
            length = (length << 8) | usize::from(byte);
        }
        ti.length = length;
    }

    // Some certificates in the wild carry a length on the end tag.
    if ti.is_end_tag() {
        ti.length = 0;
    }
    Ok(ti)
}

/// Read one header from `source`.
///
/// Fails with [`BerError::Eof`] when the source is exhausted before the
/// first byte and with [`BerError::PrematureEof`] when it ends inside the
/// header.
pub fn read_tl<S: ByteSource + ?Sized>(source: &mut S) -> Result<TagInfo, BerError> {
    let first = source.read_byte()?.ok_or(BerError::Eof)?;
    decode_header(first, || source.read_byte())
}

/// Parse one header from the front of `input`, returning it and the rest
/// of the slice.
pub fn parse_tl(input: &[u8]) -> Result<(TagInfo, &[u8]), BerError> {
    let (&first, mut rest) = input.split_first().ok_or(BerError::PrematureEof)?;
    let ti = decode_header(first, || {
        Ok(rest.split_first().map(|(&byte, tail)| {
            rest = tail;
            byte
        }))
    })?;
    Ok((ti, &input[ti.nhdr..]))
}

fn zero_length_octet(tag: u64, class: TagClass) -> bool {
    class == TagClass::Universal && (tag == tags::END_OF_CONTENTS || tag == tags::NULL)
}

fn length_octet_count(length: usize) -> usize {
    if length < 0x80 {
        1
    } else {
        let bytes = (usize::BITS - length.leading_zeros()).div_ceil(8) as usize;
        1 + bytes
    }
}

/// Number of bytes [`encode_tl`] produces for the given header.
///
/// Tag numbers that would need the long form are counted as one octet.
pub fn count_tl(tag: u64, class: TagClass, _constructed: bool, length: usize) -> usize {
    if zero_length_octet(tag, class) || length == 0 {
        2
    } else {
        1 + length_octet_count(length)
    }
}

/// Encode a header into `buf`, returning the number of bytes written.
///
/// A `length` of 0 produces the indefinite-length marker, except for the
/// universal end tag and NULL which always get a zero length octet.
pub fn encode_tl(
    buf: &mut [u8],
    tag: u64,
    class: TagClass,
    constructed: bool,
    length: usize,
) -> Result<usize, BerError> {
    if tag >= 0x1F {
        return Err(BerError::NotImplemented(tag));
    }
    let need = count_tl(tag, class, constructed, length);
    if buf.len() < need {
        return Err(BerError::BufferTooSmall {
            need,
            got: buf.len(),
        });
    }

    let constructed_bit = if constructed { 0x20 } else { 0x00 };
    buf[0] = class.bits() | constructed_bit | tag as u8;
    if zero_length_octet(tag, class) {
        buf[1] = 0x00;
    } else if length == 0 {
        buf[1] = 0x80;
    } else if length < 0x80 {
        buf[1] = length as u8;
    } else {
        let count = need - 2;
        buf[1] = 0x80 | count as u8;
        let be = length.to_be_bytes();
        buf[2..need].copy_from_slice(&be[be.len() - count..]);
    }
    Ok(need)
}

/// Write a header to `sink`, returning the number of bytes written.
pub fn write_tl<W: Write + ?Sized>(
    sink: &mut W,
    tag: u64,
    class: TagClass,
    constructed: bool,
    length: usize,
) -> Result<usize, BerError> {
    let mut buf = [0u8; MAX_HEADER_LEN];
    let n = encode_tl(&mut buf, tag, class, constructed, length)?;
    sink.write_all(&buf[..n])?;
    Ok(n)
}
