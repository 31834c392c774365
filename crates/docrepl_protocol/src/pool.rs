//! Pool of reusable payload buffers.

use bytes::BytesMut;
use parking_lot::Mutex;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Buffers larger than this are freed instead of being kept for reuse.
pub const DEFAULT_MAX_POOLED_CAPACITY: usize = 1024 * 1024;

struct PoolInner {
    free: Mutex<Vec<BytesMut>>,
    max_retained: usize,
    max_buffer_capacity: usize,
    outstanding: AtomicUsize,
}

impl PoolInner {
    fn release(&self, mut buf: BytesMut) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        if buf.capacity() > self.max_buffer_capacity {
            return;
        }
        buf.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_retained {
            free.push(buf);
        }
    }
}

/// A shared pool of document payload buffers.
///
/// A replication round copies every document it is going to ship into a
/// buffer taken from the pool. The buffer goes back to the pool as soon as
/// its [`PooledPayload`] is dropped, which happens right after the item has
/// been written to the wire, or when the round unwinds on an error.
///
/// Cloning the pool is cheap; clones share the same buffers.
#[derive(Clone)]
pub struct PayloadPool {
    inner: Arc<PoolInner>,
}

impl PayloadPool {
    /// Creates a pool that keeps at most `max_retained` idle buffers.
    pub fn new(max_retained: usize) -> Self {
        Self::with_limits(max_retained, DEFAULT_MAX_POOLED_CAPACITY)
    }

    /// Creates a pool with an explicit limit on the size of retained buffers.
    pub fn with_limits(max_retained: usize, max_buffer_capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::new()),
                max_retained,
                max_buffer_capacity,
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    /// Takes an empty buffer with at least `capacity` bytes of room.
    pub fn acquire(&self, capacity: usize) -> PooledPayload {
        let mut buf = self.inner.free.lock().pop().unwrap_or_default();
        buf.reserve(capacity);
        self.inner.outstanding.fetch_add(1, Ordering::AcqRel);
        PooledPayload {
            buf,
            pool: Arc::clone(&self.inner),
        }
    }

    /// Takes a buffer and fills it with a copy of `data`.
    pub fn copy_from(&self, data: &[u8]) -> PooledPayload {
        let mut payload = self.acquire(data.len());
        payload.buf.extend_from_slice(data);
        payload
    }

    /// Number of buffers currently handed out.
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Number of idle buffers kept for reuse.
    pub fn retained(&self) -> usize {
        self.inner.free.lock().len()
    }
}

impl Default for PayloadPool {
    fn default() -> Self {
        Self::new(64)
    }
}

impl fmt::Debug for PayloadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadPool")
            .field("outstanding", &self.outstanding())
            .field("retained", &self.retained())
            .finish()
    }
}

/// A payload buffer borrowed from a [`PayloadPool`].
///
/// Returned to the pool on drop.
pub struct PooledPayload {
    buf: BytesMut,
    pool: Arc<PoolInner>,
}

impl PooledPayload {
    /// Length of the payload.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Deref for PooledPayload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl AsRef<[u8]> for PooledPayload {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl PartialEq for PooledPayload {
    fn eq(&self, other: &Self) -> bool {
        self.buf == other.buf
    }
}

impl Eq for PooledPayload {}

impl fmt::Debug for PooledPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledPayload")
            .field("len", &self.buf.len())
            .finish()
    }
}

impl Drop for PooledPayload {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.release(buf);
    }
}
