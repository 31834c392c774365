//! Fixed-capacity scratch buffer encoder.

use crate::error::{CodecError, CodecResult};
use std::io::Write;

/// Smallest scratch buffer the encoder will allocate.
pub const MIN_SCRATCH_CAPACITY: usize = 64;

/// A reusable, fixed-capacity byte buffer.
///
/// The buffer is allocated once and never grows. Writers borrow it for the
/// duration of one message and drain it into a sink whenever it fills up, so
/// the memory used per connection is bounded by the capacity chosen here.
#[derive(Debug)]
pub struct ScratchBuffer {
    buf: Box<[u8]>,
}

impl ScratchBuffer {
    /// Allocates a scratch buffer of `capacity` bytes.
    ///
    /// Capacities below [`MIN_SCRATCH_CAPACITY`] are rounded up.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity.max(MIN_SCRATCH_CAPACITY)].into_boxed_slice(),
        }
    }

    /// Returns the fixed capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Starts writing into `sink` through this buffer.
    pub fn writer<W: Write>(&mut self, sink: W) -> ScratchWriter<'_, W> {
        ScratchWriter {
            buf: &mut self.buf,
            pos: 0,
            sink,
            flushed: 0,
        }
    }
}

/// Bounds-checked cursor over a [`ScratchBuffer`] that drains into a sink.
///
/// Fixed-width values must be preceded by [`ScratchWriter::reserve`] so that
/// related fields land contiguously; bulk data goes through
/// [`ScratchWriter::stream`], which flushes and resumes mid-copy when the
/// buffer fills. Anything still buffered when the writer is dropped without
/// [`ScratchWriter::finish`] is discarded.
///
/// All integers are written little-endian.
pub struct ScratchWriter<'a, W: Write> {
    buf: &'a mut [u8],
    pos: usize,
    sink: W,
    flushed: u64,
}

impl<'a, W: Write> ScratchWriter<'a, W> {
    /// Returns the capacity of the underlying buffer.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Returns the number of free bytes left before the buffer must be flushed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Returns the number of bytes buffered but not yet handed to the sink.
    pub fn pending(&self) -> usize {
        self.pos
    }

    /// Returns the total number of bytes accepted so far (flushed + pending).
    pub fn bytes_written(&self) -> u64 {
        self.flushed + self.pos as u64
    }

    /// Makes sure `len` bytes can be written contiguously.
    ///
    /// Flushes the buffered bytes first if the free space is too small.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::CapacityExceeded`] if `len` is larger than the
    /// whole buffer, or an I/O error if the flush fails.
    pub fn reserve(&mut self, len: usize) -> CodecResult<()> {
        if len > self.buf.len() {
            return Err(CodecError::CapacityExceeded {
                required: len,
                capacity: self.buf.len(),
            });
        }
        if len > self.remaining() {
            self.flush_buffer()?;
        }
        Ok(())
    }

    /// Writes a single byte into reserved space.
    pub fn put_u8(&mut self, value: u8) -> CodecResult<()> {
        self.put_slice(&[value])
    }

    /// Writes an `i16` into reserved space.
    pub fn put_i16(&mut self, value: i16) -> CodecResult<()> {
        self.put_slice(&value.to_le_bytes())
    }

    /// Writes an `i32` into reserved space.
    pub fn put_i32(&mut self, value: i32) -> CodecResult<()> {
        self.put_slice(&value.to_le_bytes())
    }

    /// Writes a `u64` into reserved space.
    pub fn put_u64(&mut self, value: u64) -> CodecResult<()> {
        self.put_slice(&value.to_le_bytes())
    }

    /// Copies `bytes` into reserved space.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Overflow`] if the bytes do not fit the remaining
    /// space; callers are expected to [`reserve`](Self::reserve) first.
    pub fn put_slice(&mut self, bytes: &[u8]) -> CodecResult<()> {
        let remaining = self.remaining();
        if bytes.len() > remaining {
            return Err(CodecError::Overflow {
                required: bytes.len(),
                remaining,
            });
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    /// Copies `data` through the buffer in buffer-sized chunks.
    ///
    /// Whenever the buffer is full it is flushed to the sink and the copy
    /// resumes where it stopped. The buffer never grows.
    pub fn stream(&mut self, data: &[u8]) -> CodecResult<()> {
        let mut read_pos = 0;
        while read_pos < data.len() {
            let chunk = (data.len() - read_pos).min(self.remaining());
            if chunk == 0 {
                self.flush_buffer()?;
                continue;
            }
            self.buf[self.pos..self.pos + chunk].copy_from_slice(&data[read_pos..read_pos + chunk]);
            self.pos += chunk;
            read_pos += chunk;
        }
        Ok(())
    }

    /// Hands the buffered bytes to the sink without flushing the sink itself.
    pub fn flush_buffer(&mut self) -> CodecResult<()> {
        if self.pos == 0 {
            return Ok(());
        }
        self.sink.write_all(&self.buf[..self.pos])?;
        self.flushed += self.pos as u64;
        self.pos = 0;
        Ok(())
    }

    /// Drains the buffer and flushes the sink.
    ///
    /// Returns the total number of bytes written through this writer.
    pub fn finish(&mut self) -> CodecResult<u64> {
        self.flush_buffer()?;
        self.sink.flush()?;
        Ok(self.flushed)
    }

    /// Returns a mutable reference to the sink.
    pub fn sink_mut(&mut self) -> &mut W {
        &mut self.sink
    }
}
