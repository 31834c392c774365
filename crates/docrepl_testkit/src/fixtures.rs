//! Fixed change histories and store helpers.
//!
//! [`MemoryChangeStore`] assigns etags and transaction markers itself. The
//! fixtures here let a test pin both, which is what most batching scenarios
//! need ("documents at etags 10..=12, all in transaction 5").

use bytes::Bytes;
use docrepl_protocol::{
    ChangeFeed, ChangeItem, ChangeVector, ChangeVectorEntry, Document, DocumentRecord, NodeId,
    Tombstone, TombstoneRecord,
};
use docrepl_storage::{
    DocumentScan, MemoryChangeStore, ReadSnapshot, SnapshotSource, StorageResult, TombstoneScan,
    WriteBatch,
};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A deterministic node id whose bytes are all `n`.
pub fn node(n: u8) -> NodeId {
    NodeId::from_bytes([n; 16])
}

/// Builds a change vector from `(node, counter)` pairs.
pub fn cv(entries: &[(NodeId, u64)]) -> ChangeVector {
    ChangeVector::from_entries(
        entries
            .iter()
            .map(|&(node, counter)| ChangeVectorEntry::new(node, counter)),
    )
}

/// Builds a document record.
pub fn document(
    etag: u64,
    key: &str,
    transaction_marker: i16,
    data: impl Into<Bytes>,
    change_vector: ChangeVector,
) -> DocumentRecord {
    Document {
        etag,
        change_vector,
        transaction_marker,
        key: Bytes::copy_from_slice(key.as_bytes()),
        data: data.into(),
    }
}

/// Builds a tombstone record.
pub fn tombstone(
    etag: u64,
    key: &str,
    transaction_marker: i16,
    collection: &str,
    change_vector: ChangeVector,
) -> TombstoneRecord {
    Tombstone {
        etag,
        change_vector,
        transaction_marker,
        key: Bytes::copy_from_slice(key.as_bytes()),
        collection: Bytes::copy_from_slice(collection.as_bytes()),
    }
}

/// A fixed write history with caller-chosen etags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeHistory {
    /// Documents keyed by etag.
    pub documents: BTreeMap<u64, DocumentRecord>,
    /// Tombstones keyed by etag.
    pub tombstones: BTreeMap<u64, TombstoneRecord>,
}

impl ChangeHistory {
    /// Creates an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document, replacing any record with the same etag.
    pub fn push_document(&mut self, doc: DocumentRecord) {
        self.tombstones.remove(&doc.etag);
        self.documents.insert(doc.etag, doc);
    }

    /// Adds a tombstone, replacing any record with the same etag.
    pub fn push_tombstone(&mut self, tomb: TombstoneRecord) {
        self.documents.remove(&tomb.etag);
        self.tombstones.insert(tomb.etag, tomb);
    }

    /// Every record in etag order.
    pub fn items(&self) -> Vec<ChangeItem> {
        ChangeFeed::new(
            self.documents.values().cloned(),
            self.tombstones.values().cloned(),
        )
        .collect()
    }

    /// Records with an etag greater than `etag`, in etag order.
    pub fn items_after(&self, etag: u64) -> Vec<ChangeItem> {
        self.items()
            .into_iter()
            .filter(|item| item.etag() > etag)
            .collect()
    }

    /// Highest etag in the history, or 0 when empty.
    pub fn last_etag(&self) -> u64 {
        let doc = self.documents.keys().next_back().copied().unwrap_or(0);
        let tomb = self.tombstones.keys().next_back().copied().unwrap_or(0);
        doc.max(tomb)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.documents.len() + self.tombstones.len()
    }

    /// Returns true if the history has no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A [`SnapshotSource`] serving a fixed [`ChangeHistory`].
///
/// Counts open snapshots so tests can check when a round releases its view.
#[derive(Debug, Default)]
pub struct FixtureSource {
    history: Arc<ChangeHistory>,
    open_snapshots: Arc<AtomicUsize>,
    snapshots_opened: AtomicUsize,
}

impl FixtureSource {
    /// Creates a source with no records.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source serving `history`.
    pub fn from_history(history: ChangeHistory) -> Self {
        Self {
            history: Arc::new(history),
            ..Self::default()
        }
    }

    /// Adds a document.
    pub fn with_document(mut self, doc: DocumentRecord) -> Self {
        Arc::make_mut(&mut self.history).push_document(doc);
        self
    }

    /// Adds a tombstone.
    pub fn with_tombstone(mut self, tomb: TombstoneRecord) -> Self {
        Arc::make_mut(&mut self.history).push_tombstone(tomb);
        self
    }

    /// The history being served.
    pub fn history(&self) -> &ChangeHistory {
        &self.history
    }

    /// Number of snapshots currently open.
    pub fn open_snapshots(&self) -> usize {
        self.open_snapshots.load(Ordering::Acquire)
    }

    /// Number of snapshots opened so far.
    pub fn snapshots_opened(&self) -> usize {
        self.snapshots_opened.load(Ordering::Acquire)
    }
}

impl SnapshotSource for FixtureSource {
    type Snapshot = FixtureSnapshot;

    fn open_snapshot(&self) -> StorageResult<FixtureSnapshot> {
        self.open_snapshots.fetch_add(1, Ordering::AcqRel);
        self.snapshots_opened.fetch_add(1, Ordering::AcqRel);
        Ok(FixtureSnapshot {
            history: Arc::clone(&self.history),
            open_snapshots: Arc::clone(&self.open_snapshots),
        })
    }
}

/// Snapshot handed out by [`FixtureSource`].
#[derive(Debug)]
pub struct FixtureSnapshot {
    history: Arc<ChangeHistory>,
    open_snapshots: Arc<AtomicUsize>,
}

impl ReadSnapshot for FixtureSnapshot {
    fn documents_after(&self, etag: u64) -> DocumentScan<'_> {
        Box::new(
            self.history
                .documents
                .range((Bound::Excluded(etag), Bound::Unbounded))
                .map(|(_, doc)| doc.clone()),
        )
    }

    fn tombstones_after(&self, etag: u64, skip: usize, take: usize) -> TombstoneScan<'_> {
        Box::new(
            self.history
                .tombstones
                .range((Bound::Excluded(etag), Bound::Unbounded))
                .skip(skip)
                .take(take)
                .map(|(_, tomb)| tomb.clone()),
        )
    }

    fn last_etag(&self) -> u64 {
        self.history.last_etag()
    }
}

impl Drop for FixtureSnapshot {
    fn drop(&mut self) {
        self.open_snapshots.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Commits `transactions` batches of `writes_per_transaction` documents.
///
/// Keys are `docs/{tx}-{n}` and every payload is `payload_len` bytes.
/// Returns the last etag written.
pub fn seed_transactions(
    store: &MemoryChangeStore,
    transactions: usize,
    writes_per_transaction: usize,
    payload_len: usize,
) -> u64 {
    let payload = Bytes::from(vec![b'x'; payload_len]);
    let mut last = store.last_etag();
    for tx in 0..transactions {
        let mut batch = WriteBatch::new();
        for n in 0..writes_per_transaction {
            batch.put(format!("docs/{tx}-{n}"), payload.clone());
        }
        last = store.commit(batch);
    }
    last
}
