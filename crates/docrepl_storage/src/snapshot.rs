//! Point-in-time read access to the write history.

use crate::error::StorageResult;
use docrepl_protocol::{DocumentRecord, TombstoneRecord};

/// Boxed ascending scan over document records.
pub type DocumentScan<'a> = Box<dyn Iterator<Item = DocumentRecord> + 'a>;

/// Boxed ascending scan over tombstone records.
pub type TombstoneScan<'a> = Box<dyn Iterator<Item = TombstoneRecord> + 'a>;

/// A consistent, read-only view of the store.
///
/// # Invariants
///
/// - Both scans are strictly ascending by etag
/// - Writes committed after the snapshot was opened are never visible
/// - Documents and tombstones never share an etag
pub trait ReadSnapshot {
    /// Live documents with an etag greater than `etag`.
    fn documents_after(&self, etag: u64) -> DocumentScan<'_>;

    /// Tombstones with an etag greater than `etag`, after skipping `skip`
    /// and yielding at most `take`.
    fn tombstones_after(&self, etag: u64, skip: usize, take: usize) -> TombstoneScan<'_>;

    /// Highest etag visible in this snapshot.
    fn last_etag(&self) -> u64;
}

/// Something that can open read snapshots.
///
/// Implementations must be `Send + Sync` so one store can serve the workers
/// of every destination.
pub trait SnapshotSource: Send + Sync {
    /// Snapshot type handed out by this source.
    type Snapshot: ReadSnapshot + Send;

    /// Opens a snapshot of the current state.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot provide a consistent view.
    fn open_snapshot(&self) -> StorageResult<Self::Snapshot>;
}

impl<S: SnapshotSource + ?Sized> SnapshotSource for std::sync::Arc<S> {
    type Snapshot = S::Snapshot;

    fn open_snapshot(&self) -> StorageResult<Self::Snapshot> {
        (**self).open_snapshot()
    }
}
