//! Pull-based byte sources with push-back.

use std::io::{self, Read};

use asnwalk_types::BerError;

/// A byte stream the decoder pulls from.
///
/// `unread` pushes bytes back so that the next `read` returns them first;
/// `tell` counts consumed bytes net of pushed-back ones.
pub trait ByteSource {
    /// Read up to `buf.len()` bytes. `Ok(0)` means end of input.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BerError>;

    /// Push bytes back in front of the stream.
    fn unread(&mut self, bytes: &[u8]) -> Result<(), BerError>;

    /// Number of bytes consumed so far.
    fn tell(&self) -> u64;

    /// Read a single byte, `None` at end of input.
    fn read_byte(&mut self) -> Result<Option<u8>, BerError> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Read exactly `len` bytes and append them to `out`.
    ///
    /// The buffer grows with the data actually delivered, so a bogus
    /// length field cannot force a huge allocation.
    fn read_into(&mut self, out: &mut Vec<u8>, len: usize) -> Result<(), BerError> {
        let mut chunk = [0u8; 4096];
        let mut left = len;
        while left > 0 {
            let want = left.min(chunk.len());
            let n = self.read(&mut chunk[..want])?;
            if n == 0 {
                return Err(BerError::PrematureEof);
            }
            out.extend_from_slice(&chunk[..n]);
            left -= n;
        }
        Ok(())
    }

    /// Discard exactly `len` bytes.
    fn skip(&mut self, len: usize) -> Result<(), BerError> {
        let mut chunk = [0u8; 4096];
        let mut left = len;
        while left > 0 {
            let want = left.min(chunk.len());
            let n = self.read(&mut chunk[..want])?;
            if n == 0 {
                return Err(BerError::PrematureEof);
            }
            left -= n;
        }
        Ok(())
    }
}

/// A [`ByteSource`] over anything implementing [`io::Read`]: files,
/// sockets, or in-memory slices.
#[derive(Debug)]
pub struct Reader<R> {
    inner: R,
    pushback: Vec<u8>,
    nread: u64,
}

impl<R: Read> Reader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pushback: Vec::new(),
            nread: 0,
        }
    }

    /// Consume the reader, returning the inner stream. Pushed-back bytes
    /// are lost.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<'a> Reader<&'a [u8]> {
    /// Reader over an in-memory buffer.
    pub fn from_slice(data: &'a [u8]) -> Self {
        Reader::new(data)
    }
}

impl<R: Read> ByteSource for Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, BerError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if !self.pushback.is_empty() {
            // Pushed-back bytes are stored in reverse so the next byte sits at the end.
            let n = buf.len().min(self.pushback.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.pushback.pop().unwrap_or_default();
            }
            self.nread += n as u64;
            return Ok(n);
        }
        loop {
            match self.inner.read(buf) {
                Ok(n) => {
                    self.nread += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn unread(&mut self, bytes: &[u8]) -> Result<(), BerError> {
        if bytes.len() as u64 > self.nread {
            return Err(BerError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "unread beyond start of stream",
            )));
        }
        self.pushback.extend(bytes.iter().rev());
        self.nread -= bytes.len() as u64;
        Ok(())
    }

    fn tell(&self) -> u64 {
        self.nread
    }
}
