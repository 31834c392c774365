//! In-process transport wired to a [`ReferenceReceiver`].

use crate::receiver::ReferenceReceiver;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;

/// A duplex stream whose far end is a [`ReferenceReceiver`].
///
/// Writes are buffered. The first read after a write decodes every complete
/// message written so far, hands each one to the receiver and queues the
/// encoded replies. Reading with nothing written and nothing queued returns
/// end of stream, like a peer that hung up.
///
/// The receiver is shared so it stays reachable after the transport has been
/// moved into a session or worker.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    receiver: Arc<Mutex<ReferenceReceiver>>,
    outbound: Vec<u8>,
    inbound: VecDeque<u8>,
}

impl LoopbackTransport {
    /// Creates a transport to a fresh receiver.
    pub fn new() -> Self {
        Self::with_receiver(ReferenceReceiver::new())
    }

    /// Creates a transport to `receiver`.
    pub fn with_receiver(receiver: ReferenceReceiver) -> Self {
        Self {
            receiver: Arc::new(Mutex::new(receiver)),
            outbound: Vec::new(),
            inbound: VecDeque::new(),
        }
    }

    /// Shared handle to the receiver.
    pub fn receiver(&self) -> Arc<Mutex<ReferenceReceiver>> {
        Arc::clone(&self.receiver)
    }

    /// Bytes written but not yet delivered.
    pub fn undelivered(&self) -> usize {
        self.outbound.len()
    }

    fn deliver(&mut self) -> io::Result<()> {
        let mut receiver = self.receiver.lock();
        let mut offset = 0;
        while offset < self.outbound.len() {
            let (reply, consumed) = receiver
                .receive_bytes(&self.outbound[offset..])
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
            offset += consumed;
            let bytes = reply
                .encode()
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;
            self.inbound.extend(bytes);
        }
        self.outbound.clear();
        Ok(())
    }
}

impl Write for LoopbackTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outbound.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for LoopbackTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.inbound.is_empty() && !self.outbound.is_empty() {
            self.deliver()?;
        }
        let n = buf.len().min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}
