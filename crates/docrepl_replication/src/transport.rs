//! Connection abstraction for replication sessions.

use crate::cancel::CancellationSignal;
use docrepl_codec::CodecResult;
use docrepl_protocol::ReplicationReply;
use std::collections::VecDeque;
use std::io::{self, Read, Write};

/// A duplex byte stream to one destination.
///
/// Batches are written and flushed through [`Write`]; replies are read back
/// through [`Read`]. Any `Read + Write + Send` type qualifies, so a
/// `TcpStream`, a TLS stream or an in-memory mock can be used directly.
pub trait ReplicationTransport: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> ReplicationTransport for T {}

/// Write adapter that refuses writes once the round is cancelled.
pub(crate) struct CancelAwareSink<'a, W: Write + ?Sized> {
    inner: &'a mut W,
    cancel: &'a CancellationSignal,
}

impl<'a, W: Write + ?Sized> CancelAwareSink<'a, W> {
    pub(crate) fn new(inner: &'a mut W, cancel: &'a CancellationSignal) -> Self {
        Self { inner, cancel }
    }

    fn check(&self) -> io::Result<()> {
        if self.cancel.is_cancelled() {
            // Not `Interrupted`: `write_all` would retry that kind forever.
            return Err(io::Error::other("replication round cancelled"));
        }
        Ok(())
    }
}

impl<W: Write + ?Sized> Write for CancelAwareSink<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check()?;
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check()?;
        self.inner.flush()
    }
}

/// Read adapter that stops waiting for a reply once the round is cancelled.
///
/// A blocking read cannot be interrupted from another thread, so the signal
/// is only observed between reads. Transports that may wait on a silent peer
/// should set a read timeout (for example [`std::net::TcpStream::set_read_timeout`]);
/// each timeout then becomes a point where cancellation is noticed, and
/// without cancellation the read is simply retried.
pub(crate) struct CancelAwareSource<'a, R: Read + ?Sized> {
    inner: &'a mut R,
    cancel: &'a CancellationSignal,
}

impl<'a, R: Read + ?Sized> CancelAwareSource<'a, R> {
    pub(crate) fn new(inner: &'a mut R, cancel: &'a CancellationSignal) -> Self {
        Self { inner, cancel }
    }
}

impl<R: Read + ?Sized> Read for CancelAwareSource<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(io::Error::other("replication round cancelled"));
            }
            match self.inner.read(buf) {
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) => {}
                result => return result,
            }
        }
    }
}

/// A scripted transport for testing.
///
/// Records everything written, serves queued reply bytes on read and can be
/// told to fail writes or flushes.
#[derive(Debug, Default)]
pub struct MockTransport {
    written: Vec<u8>,
    inbound: VecDeque<u8>,
    write_calls: usize,
    flushes: usize,
    fail_writes_after: Option<usize>,
    fail_flush: bool,
}

impl MockTransport {
    /// Creates a transport with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues raw bytes to be returned by reads.
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes);
    }

    /// Queues an encoded reply.
    pub fn push_reply(&mut self, reply: &ReplicationReply) -> CodecResult<()> {
        let bytes = reply.encode()?;
        self.push_inbound(&bytes);
        Ok(())
    }

    /// Fails every write once `bytes` have been accepted.
    pub fn fail_writes_after(&mut self, bytes: usize) {
        self.fail_writes_after = Some(bytes);
    }

    /// Makes flushes fail.
    pub fn fail_flush(&mut self, fail: bool) {
        self.fail_flush = fail;
    }

    /// Bytes written so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Takes the bytes written so far.
    pub fn take_written(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.written)
    }

    /// Number of `write` calls that reached the transport.
    pub fn write_calls(&self) -> usize {
        self.write_calls
    }

    /// Number of successful flushes.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Reply bytes not consumed yet.
    pub fn pending_inbound(&self) -> usize {
        self.inbound.len()
    }
}

impl Write for MockTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_calls += 1;
        let accepted = match self.fail_writes_after {
            Some(limit) if self.written.len() >= limit => {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection reset by peer"));
            }
            Some(limit) => buf.len().min(limit - self.written.len()),
            None => buf.len(),
        };
        self.written.extend_from_slice(&buf[..accepted]);
        Ok(accepted)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.fail_flush {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "flush timed out"));
        }
        self.flushes += 1;
        Ok(())
    }
}

impl Read for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}
