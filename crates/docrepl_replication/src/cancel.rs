//! Cooperative cancellation of replication rounds.

use crate::error::{ReplicationError, ReplicationResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared flag that aborts a running round.
///
/// The round checks the flag between scanned items, between encoded items
/// and on every transport write. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancellationSignal {
    /// Creates a signal that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Clears a previous cancellation.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with [`ReplicationError::Cancelled`] if cancellation was requested.
    pub fn check(&self) -> ReplicationResult<()> {
        if self.is_cancelled() {
            Err(ReplicationError::Cancelled)
        } else {
            Ok(())
        }
    }
}
