//! Replicated write records.

use crate::change_vector::ChangeVector;
use bytes::Bytes;

/// A stored document version as scanned from storage.
///
/// `P` is the payload type: storage hands out shared [`Bytes`], while a
/// replication round moves payloads into pool-owned buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document<P = Bytes> {
    /// Position of this write in the global write order.
    pub etag: u64,
    /// Causal history of this version.
    pub change_vector: ChangeVector,
    /// Groups writes committed by the same transaction.
    pub transaction_marker: i16,
    /// Document key.
    pub key: Bytes,
    /// Document body.
    pub data: P,
}

/// A deletion marker as scanned from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tombstone {
    /// Position of this write in the global write order.
    pub etag: u64,
    /// Causal history of the deletion.
    pub change_vector: ChangeVector,
    /// Groups writes committed by the same transaction.
    pub transaction_marker: i16,
    /// Key of the deleted document.
    pub key: Bytes,
    /// Collection the deleted document belonged to.
    pub collection: Bytes,
}

/// A document as returned by storage scans.
pub type DocumentRecord = Document<Bytes>;

/// A tombstone as returned by storage scans.
pub type TombstoneRecord = Tombstone;

/// One write to replicate: either a document version or a deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeItem<P = Bytes> {
    /// A put.
    Document(Document<P>),
    /// A delete.
    Tombstone(Tombstone),
}

impl<P> ChangeItem<P> {
    /// Position of this write in the global write order.
    pub fn etag(&self) -> u64 {
        match self {
            ChangeItem::Document(doc) => doc.etag,
            ChangeItem::Tombstone(tomb) => tomb.etag,
        }
    }

    /// Causal history of this write.
    pub fn change_vector(&self) -> &ChangeVector {
        match self {
            ChangeItem::Document(doc) => &doc.change_vector,
            ChangeItem::Tombstone(tomb) => &tomb.change_vector,
        }
    }

    /// Transaction marker of this write.
    pub fn transaction_marker(&self) -> i16 {
        match self {
            ChangeItem::Document(doc) => doc.transaction_marker,
            ChangeItem::Tombstone(tomb) => tomb.transaction_marker,
        }
    }

    /// Key of the written or deleted document.
    pub fn key(&self) -> &Bytes {
        match self {
            ChangeItem::Document(doc) => &doc.key,
            ChangeItem::Tombstone(tomb) => &tomb.key,
        }
    }

    /// Returns true for deletions.
    pub fn is_tombstone(&self) -> bool {
        matches!(self, ChangeItem::Tombstone(_))
    }

    /// Converts the document payload, leaving tombstones untouched.
    pub fn map_payload<Q>(self, f: impl FnOnce(P) -> Q) -> ChangeItem<Q> {
        match self {
            ChangeItem::Document(doc) => ChangeItem::Document(Document {
                etag: doc.etag,
                change_vector: doc.change_vector,
                transaction_marker: doc.transaction_marker,
                key: doc.key,
                data: f(doc.data),
            }),
            ChangeItem::Tombstone(tomb) => ChangeItem::Tombstone(tomb),
        }
    }
}

impl<P: AsRef<[u8]>> ChangeItem<P> {
    /// Size of the document payload (0 for tombstones).
    pub fn payload_len(&self) -> usize {
        match self {
            ChangeItem::Document(doc) => doc.data.as_ref().len(),
            ChangeItem::Tombstone(_) => 0,
        }
    }
}

impl<P> From<Document<P>> for ChangeItem<P> {
    fn from(doc: Document<P>) -> Self {
        ChangeItem::Document(doc)
    }
}

impl<P> From<Tombstone> for ChangeItem<P> {
    fn from(tomb: Tombstone) -> Self {
        ChangeItem::Tombstone(tomb)
    }
}
