//! Merged change feed over documents and tombstones.
//!
//! Storage keeps documents and tombstones in two separate etag-ordered
//! indexes. Replication needs a single stream in global etag order, so the
//! feed below merges the two scans lazily, holding at most one pending record
//! per source.

use crate::item::{ChangeItem, DocumentRecord, TombstoneRecord};
use std::iter::FusedIterator;

/// Which sources still have a pending record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// Both sources are drained.
    Exhausted,
    /// Only documents remain.
    DocumentsOnly,
    /// Only tombstones remain.
    TombstonesOnly,
    /// Both sources have a pending record.
    Both,
}

/// A lazy, single-pass merge of a document scan and a tombstone scan.
///
/// Both inputs must be strictly ascending by etag. Etags come from one
/// counter shared by every kind of write, so the two inputs never carry the
/// same etag and the output is strictly ascending as well.
///
/// # Example
///
/// ```rust,ignore
/// let feed = ChangeFeed::new(
///     snapshot.documents_after(last_sent_etag),
///     snapshot.tombstones_after(last_sent_etag, 0, usize::MAX),
/// );
/// for item in feed {
///     // items arrive in global etag order
/// }
/// ```
pub struct ChangeFeed<D, T>
where
    D: Iterator<Item = DocumentRecord>,
    T: Iterator<Item = TombstoneRecord>,
{
    documents: D,
    tombstones: T,
    next_document: Option<DocumentRecord>,
    next_tombstone: Option<TombstoneRecord>,
    last_etag: Option<u64>,
}

impl<D, T> ChangeFeed<D, T>
where
    D: Iterator<Item = DocumentRecord>,
    T: Iterator<Item = TombstoneRecord>,
{
    /// Creates a feed and primes one record from each source.
    pub fn new(
        documents: impl IntoIterator<IntoIter = D>,
        tombstones: impl IntoIterator<IntoIter = T>,
    ) -> Self {
        let mut documents = documents.into_iter();
        let mut tombstones = tombstones.into_iter();
        let next_document = documents.next();
        let next_tombstone = tombstones.next();
        Self {
            documents,
            tombstones,
            next_document,
            next_tombstone,
            last_etag: None,
        }
    }

    /// Returns which sources still have pending records.
    pub fn state(&self) -> FeedState {
        match (&self.next_document, &self.next_tombstone) {
            (None, None) => FeedState::Exhausted,
            (Some(_), None) => FeedState::DocumentsOnly,
            (None, Some(_)) => FeedState::TombstonesOnly,
            (Some(_), Some(_)) => FeedState::Both,
        }
    }

    /// Etag of the record that would be returned next, if any.
    pub fn peek_etag(&self) -> Option<u64> {
        match (&self.next_document, &self.next_tombstone) {
            (None, None) => None,
            (Some(doc), None) => Some(doc.etag),
            (None, Some(tomb)) => Some(tomb.etag),
            (Some(doc), Some(tomb)) => Some(doc.etag.min(tomb.etag)),
        }
    }

    fn take_document(&mut self) -> Option<ChangeItem> {
        let doc = self.next_document.take()?;
        self.next_document = self.documents.next();
        Some(ChangeItem::Document(doc))
    }

    fn take_tombstone(&mut self) -> Option<ChangeItem> {
        let tomb = self.next_tombstone.take()?;
        self.next_tombstone = self.tombstones.next();
        Some(ChangeItem::Tombstone(tomb))
    }
}

impl<D, T> Iterator for ChangeFeed<D, T>
where
    D: Iterator<Item = DocumentRecord>,
    T: Iterator<Item = TombstoneRecord>,
{
    type Item = ChangeItem;

    fn next(&mut self) -> Option<Self::Item> {
        let item = match self.state() {
            FeedState::Exhausted => return None,
            FeedState::DocumentsOnly => self.take_document(),
            FeedState::TombstonesOnly => self.take_tombstone(),
            FeedState::Both => {
                let doc_etag = self.next_document.as_ref().map_or(u64::MAX, |d| d.etag);
                let tomb_etag = self.next_tombstone.as_ref().map_or(u64::MAX, |t| t.etag);
                if doc_etag < tomb_etag {
                    self.take_document()
                } else {
                    self.take_tombstone()
                }
            }
        }?;

        debug_assert!(
            self.last_etag.map_or(true, |last| item.etag() > last),
            "change feed went backwards: {:?} after {:?}",
            item.etag(),
            self.last_etag
        );
        self.last_etag = Some(item.etag());
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let pending = usize::from(self.next_document.is_some())
            + usize::from(self.next_tombstone.is_some());
        let (doc_lo, doc_hi) = self.documents.size_hint();
        let (tomb_lo, tomb_hi) = self.tombstones.size_hint();
        let upper = doc_hi
            .zip(tomb_hi)
            .and_then(|(a, b)| a.checked_add(b))
            .and_then(|n| n.checked_add(pending));
        (
            doc_lo.saturating_add(tomb_lo).saturating_add(pending),
            upper,
        )
    }
}

impl<D, T> FusedIterator for ChangeFeed<D, T>
where
    D: Iterator<Item = DocumentRecord>,
    T: Iterator<Item = TombstoneRecord>,
{
}
