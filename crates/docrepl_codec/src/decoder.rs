//! Fixed-width binary readers.

use crate::error::{CodecError, CodecResult};
use bytes::Bytes;
use std::io::Read;

/// Maximum length accepted for a single length-prefixed field.
/// This prevents allocation-based DoS from untrusted input.
pub const MAX_FIELD_LENGTH: u64 = 256 * 1024 * 1024;

/// A source of bytes for the decoders.
///
/// Implemented for in-memory slices ([`SliceReader`]) and for any
/// [`std::io::Read`] stream ([`IoReader`]); the typed helpers read
/// little-endian integers on top of [`ByteSource::read_into`].
pub trait ByteSource {
    /// Fills `buf` completely or fails.
    fn read_into(&mut self, buf: &mut [u8]) -> CodecResult<()>;

    /// Reads one byte.
    fn read_u8(&mut self) -> CodecResult<u8> {
        let mut buf = [0u8; 1];
        self.read_into(&mut buf)?;
        Ok(buf[0])
    }

    /// Reads a little-endian `i16`.
    fn read_i16(&mut self) -> CodecResult<i16> {
        let mut buf = [0u8; 2];
        self.read_into(&mut buf)?;
        Ok(i16::from_le_bytes(buf))
    }

    /// Reads a little-endian `i32`.
    fn read_i32(&mut self) -> CodecResult<i32> {
        let mut buf = [0u8; 4];
        self.read_into(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    /// Reads a little-endian `u64`.
    fn read_u64(&mut self) -> CodecResult<u64> {
        let mut buf = [0u8; 8];
        self.read_into(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a fixed-size array.
    fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_into(&mut buf)?;
        Ok(buf)
    }

    /// Reads `len` bytes into a new buffer.
    fn read_bytes(&mut self, len: usize) -> CodecResult<Bytes> {
        if len as u64 > MAX_FIELD_LENGTH {
            return Err(CodecError::LengthLimit {
                length: len as u64,
                limit: MAX_FIELD_LENGTH,
            });
        }
        let mut buf = vec![0u8; len];
        self.read_into(&mut buf)?;
        Ok(Bytes::from(buf))
    }

    /// Reads a non-negative `i32` length prefix.
    fn read_length(&mut self) -> CodecResult<usize> {
        let len = self.read_i32()?;
        usize::try_from(len)
            .map_err(|_| CodecError::invalid_structure(format!("negative length {len}")))
    }
}

/// Reads from an in-memory byte slice.
#[derive(Debug, Clone)]
pub struct SliceReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    /// Creates a reader over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl ByteSource for SliceReader<'_> {
    #[inline]
    fn read_into(&mut self, buf: &mut [u8]) -> CodecResult<()> {
        let end = self
            .pos
            .checked_add(buf.len())
            .ok_or(CodecError::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        buf.copy_from_slice(&self.data[self.pos..end]);
        self.pos = end;
        Ok(())
    }
}

/// Reads from any [`std::io::Read`] stream.
#[derive(Debug)]
pub struct IoReader<R> {
    inner: R,
}

impl<R: Read> IoReader<R> {
    /// Wraps a stream.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> ByteSource for IoReader<R> {
    fn read_into(&mut self, buf: &mut [u8]) -> CodecResult<()> {
        self.inner.read_exact(buf)?;
        Ok(())
    }
}
