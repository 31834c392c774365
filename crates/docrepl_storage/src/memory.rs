//! In-memory change store for tests and embedders.

use crate::error::StorageResult;
use crate::snapshot::{DocumentScan, ReadSnapshot, SnapshotSource, TombstoneScan};
use bytes::Bytes;
use docrepl_protocol::{ChangeVector, Document, DocumentRecord, NodeId, Tombstone, TombstoneRecord};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum KeyLocation {
    Document(u64),
    Tombstone(u64),
}

#[derive(Debug, Clone)]
struct StoreState {
    documents: BTreeMap<u64, DocumentRecord>,
    tombstones: BTreeMap<u64, TombstoneRecord>,
    keys: HashMap<Bytes, KeyLocation>,
    last_etag: u64,
    next_marker: i16,
    change_vector: ChangeVector,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            documents: BTreeMap::new(),
            tombstones: BTreeMap::new(),
            keys: HashMap::new(),
            last_etag: 0,
            next_marker: 1,
            change_vector: ChangeVector::new(),
        }
    }
}

impl StoreState {
    /// Removes the current version of `key` and returns its change vector.
    fn take_key(&mut self, key: &Bytes) -> Option<ChangeVector> {
        match self.keys.remove(key)? {
            KeyLocation::Document(etag) => self.documents.remove(&etag).map(|d| d.change_vector),
            KeyLocation::Tombstone(etag) => {
                self.tombstones.remove(&etag).map(|t| t.change_vector)
            }
        }
    }

    fn apply(&mut self, op: WriteOp, marker: i16, node: NodeId) -> u64 {
        self.last_etag += 1;
        let etag = self.last_etag;

        let (key, replicated) = match &op {
            WriteOp::Put { key, change_vector, .. } | WriteOp::Delete { key, change_vector, .. } => {
                (key.clone(), change_vector.clone())
            }
        };
        let previous = self.take_key(&key);
        let change_vector = replicated.unwrap_or_else(|| {
            let mut cv = previous.unwrap_or_default();
            cv.observe(node, etag);
            cv
        });
        self.change_vector.merge(&change_vector);

        match op {
            WriteOp::Put { data, .. } => {
                self.keys.insert(key.clone(), KeyLocation::Document(etag));
                self.documents.insert(
                    etag,
                    Document {
                        etag,
                        change_vector,
                        transaction_marker: marker,
                        key,
                        data,
                    },
                );
            }
            WriteOp::Delete { collection, .. } => {
                self.keys.insert(key.clone(), KeyLocation::Tombstone(etag));
                self.tombstones.insert(
                    etag,
                    Tombstone {
                        etag,
                        change_vector,
                        transaction_marker: marker,
                        key,
                        collection,
                    },
                );
            }
        }
        etag
    }
}

#[derive(Debug, Clone)]
enum WriteOp {
    Put {
        key: Bytes,
        data: Bytes,
        change_vector: Option<ChangeVector>,
    },
    Delete {
        key: Bytes,
        collection: Bytes,
        change_vector: Option<ChangeVector>,
    },
}

/// Writes committed together under one transaction marker.
///
/// # Example
///
/// ```rust
/// use docrepl_storage::{MemoryChangeStore, WriteBatch};
///
/// let store = MemoryChangeStore::new();
/// let mut batch = WriteBatch::new();
/// batch.put("users/1", "{}").delete("users/2", "Users");
/// assert_eq!(store.commit(batch), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a document written on this node.
    pub fn put(&mut self, key: impl Into<Bytes>, data: impl Into<Bytes>) -> &mut Self {
        self.ops.push(WriteOp::Put {
            key: key.into(),
            data: data.into(),
            change_vector: None,
        });
        self
    }

    /// Deletes a document on this node, leaving a tombstone.
    pub fn delete(&mut self, key: impl Into<Bytes>, collection: impl Into<Bytes>) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            key: key.into(),
            collection: collection.into(),
            change_vector: None,
        });
        self
    }

    /// Stores a document received from another node with its own change vector.
    pub fn put_replicated(
        &mut self,
        key: impl Into<Bytes>,
        data: impl Into<Bytes>,
        change_vector: ChangeVector,
    ) -> &mut Self {
        self.ops.push(WriteOp::Put {
            key: key.into(),
            data: data.into(),
            change_vector: Some(change_vector),
        });
        self
    }

    /// Records a deletion received from another node.
    pub fn delete_replicated(
        &mut self,
        key: impl Into<Bytes>,
        collection: impl Into<Bytes>,
        change_vector: ChangeVector,
    ) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            key: key.into(),
            collection: collection.into(),
            change_vector: Some(change_vector),
        });
        self
    }

    /// Number of writes in the batch.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if the batch has no writes.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// An in-memory, copy-on-write change store.
///
/// Every write takes the next etag from one counter shared by documents and
/// tombstones. A document keeps only its latest version: overwriting or
/// deleting a key removes the previous record from the scans. Writes
/// committed together share a transaction marker; consecutive commits get
/// different markers.
///
/// Snapshots hold an `Arc` of the state they were opened on. Writers clone
/// the state when a snapshot still references it, so open snapshots never
/// observe later writes.
///
/// # Thread Safety
///
/// The store is `Send + Sync` and can be shared across workers.
#[derive(Debug)]
pub struct MemoryChangeStore {
    node: NodeId,
    state: RwLock<Arc<StoreState>>,
    open_snapshots: Arc<AtomicUsize>,
}

impl MemoryChangeStore {
    /// Creates an empty store owned by a random node.
    #[must_use]
    pub fn new() -> Self {
        Self::with_node(NodeId::new())
    }

    /// Creates an empty store owned by `node`.
    #[must_use]
    pub fn with_node(node: NodeId) -> Self {
        Self {
            node,
            state: RwLock::new(Arc::new(StoreState::default())),
            open_snapshots: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Node that local writes are attributed to.
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// Commits a batch atomically and returns the etag of its last write.
    ///
    /// An empty batch commits nothing and returns the current last etag.
    pub fn commit(&self, batch: WriteBatch) -> u64 {
        let mut guard = self.state.write();
        if batch.is_empty() {
            return guard.last_etag;
        }
        let state = Arc::make_mut(&mut *guard);
        let marker = state.next_marker;
        state.next_marker = state.next_marker.wrapping_add(1);
        let mut last = state.last_etag;
        for op in batch.ops {
            last = state.apply(op, marker, self.node);
        }
        last
    }

    /// Stores one document in its own transaction.
    pub fn put(&self, key: impl Into<Bytes>, data: impl Into<Bytes>) -> u64 {
        let mut batch = WriteBatch::new();
        batch.put(key, data);
        self.commit(batch)
    }

    /// Deletes one document in its own transaction.
    pub fn delete(&self, key: impl Into<Bytes>, collection: impl Into<Bytes>) -> u64 {
        let mut batch = WriteBatch::new();
        batch.delete(key, collection);
        self.commit(batch)
    }

    /// Stores one replicated document in its own transaction.
    pub fn put_replicated(
        &self,
        key: impl Into<Bytes>,
        data: impl Into<Bytes>,
        change_vector: ChangeVector,
    ) -> u64 {
        let mut batch = WriteBatch::new();
        batch.put_replicated(key, data, change_vector);
        self.commit(batch)
    }

    /// Highest etag committed so far.
    pub fn last_etag(&self) -> u64 {
        self.state.read().last_etag
    }

    /// Merge of the change vectors of every write seen by this store.
    pub fn change_vector(&self) -> ChangeVector {
        self.state.read().change_vector.clone()
    }

    /// Number of live documents.
    pub fn document_count(&self) -> usize {
        self.state.read().documents.len()
    }

    /// Number of tombstones.
    pub fn tombstone_count(&self) -> usize {
        self.state.read().tombstones.len()
    }

    /// Number of snapshots currently open.
    pub fn open_snapshots(&self) -> usize {
        self.open_snapshots.load(Ordering::Acquire)
    }
}

impl Default for MemoryChangeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotSource for MemoryChangeStore {
    type Snapshot = MemorySnapshot;

    fn open_snapshot(&self) -> StorageResult<MemorySnapshot> {
        let state = Arc::clone(&*self.state.read());
        self.open_snapshots.fetch_add(1, Ordering::AcqRel);
        Ok(MemorySnapshot {
            state,
            open_snapshots: Arc::clone(&self.open_snapshots),
        })
    }
}

/// A snapshot of a [`MemoryChangeStore`].
///
/// Counted as open until dropped.
#[derive(Debug)]
pub struct MemorySnapshot {
    state: Arc<StoreState>,
    open_snapshots: Arc<AtomicUsize>,
}

impl ReadSnapshot for MemorySnapshot {
    fn documents_after(&self, etag: u64) -> DocumentScan<'_> {
        Box::new(
            self.state
                .documents
                .range((Bound::Excluded(etag), Bound::Unbounded))
                .map(|(_, doc)| doc.clone()),
        )
    }

    fn tombstones_after(&self, etag: u64, skip: usize, take: usize) -> TombstoneScan<'_> {
        Box::new(
            self.state
                .tombstones
                .range((Bound::Excluded(etag), Bound::Unbounded))
                .skip(skip)
                .take(take)
                .map(|(_, tomb)| tomb.clone()),
        )
    }

    fn last_etag(&self) -> u64 {
        self.state.last_etag
    }
}

impl Drop for MemorySnapshot {
    fn drop(&mut self) {
        self.open_snapshots.fetch_sub(1, Ordering::AcqRel);
    }
}
