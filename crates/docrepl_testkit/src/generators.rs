//! Property-based test generators using proptest.
//!
//! Provides strategies for generating change data that keeps the
//! invariants storage guarantees: unique ascending etags shared by
//! documents and tombstones, and contiguous transactions.

use crate::fixtures::{node, ChangeHistory};
use bytes::Bytes;
use docrepl_protocol::{ChangeVector, ChangeVectorEntry, Document, NodeId, Tombstone};
use proptest::prelude::*;

/// Number of distinct nodes used by [`change_vector_strategy`].
pub const GENERATED_NODES: u8 = 4;

/// Strategy for arbitrary node ids.
pub fn node_id_strategy() -> impl Strategy<Value = NodeId> {
    prop::array::uniform16(any::<u8>()).prop_map(NodeId::from_bytes)
}

/// Strategy for non-empty change vectors over a small set of nodes.
///
/// Drawing from a few nodes makes dominance between generated vectors
/// common enough to exercise the knowledge filter.
pub fn change_vector_strategy() -> impl Strategy<Value = ChangeVector> {
    prop::collection::vec((1..=GENERATED_NODES, 1u64..1_000), 1..4).prop_map(|pairs| {
        let mut cv = ChangeVector::new();
        for (n, counter) in pairs {
            cv.observe(node(n), counter);
        }
        cv
    })
}

/// Strategy for change vectors with arbitrary node ids, as seen on the wire.
pub fn wire_change_vector_strategy() -> impl Strategy<Value = ChangeVector> {
    prop::collection::vec((node_id_strategy(), any::<u64>()), 0..6).prop_map(|pairs| {
        ChangeVector::from_entries(
            pairs
                .into_iter()
                .map(|(node, counter)| ChangeVectorEntry::new(node, counter)),
        )
    })
}

/// Strategy for document keys, including local-only and replicated system keys.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        6 => prop::string::string_regex("(users|orders)/[a-z0-9]{1,8}").expect("Invalid regex"),
        1 => prop::string::string_regex("(system|SYSTEM|System)/[a-z]{1,6}").expect("Invalid regex"),
        1 => prop::string::string_regex("system/hilo/[a-z]{1,6}").expect("Invalid regex"),
    ]
}

/// Strategy for document payloads.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// One generated write before etags are assigned.
#[derive(Debug, Clone)]
pub struct GeneratedWrite {
    /// Document key.
    pub key: String,
    /// Payload, or `None` for a deletion.
    pub data: Option<Vec<u8>>,
    /// Change vector of the write.
    pub change_vector: ChangeVector,
}

/// Strategy for a single write.
pub fn write_strategy() -> impl Strategy<Value = GeneratedWrite> {
    (
        key_strategy(),
        prop::option::weighted(0.8, payload_strategy()),
        change_vector_strategy(),
    )
        .prop_map(|(key, data, change_vector)| GeneratedWrite {
            key,
            data,
            change_vector,
        })
}

/// Strategy for a write history of up to `max_transactions` transactions.
///
/// Each transaction holds one to `max_writes_per_transaction` writes with
/// consecutive etags and one shared marker; consecutive transactions get
/// different markers. Gaps between transactions leave unused etags, as
/// overwritten documents do in a real store.
pub fn history_strategy(
    max_transactions: usize,
    max_writes_per_transaction: usize,
) -> impl Strategy<Value = ChangeHistory> {
    let max_writes = max_writes_per_transaction.max(1);
    prop::collection::vec(
        (
            prop::collection::vec(write_strategy(), 1..=max_writes),
            0u64..3,
        ),
        0..=max_transactions,
    )
    .prop_map(|transactions| {
        let mut history = ChangeHistory::new();
        let mut etag = 0u64;
        for (index, (writes, gap)) in transactions.into_iter().enumerate() {
            etag += gap;
            let marker = (index % i16::MAX as usize) as i16 + 1;
            for write in writes {
                etag += 1;
                let key = Bytes::from(write.key.into_bytes());
                match write.data {
                    Some(data) => history.push_document(Document {
                        etag,
                        change_vector: write.change_vector,
                        transaction_marker: marker,
                        key,
                        data: Bytes::from(data),
                    }),
                    None => history.push_tombstone(Tombstone {
                        etag,
                        change_vector: write.change_vector,
                        transaction_marker: marker,
                        key,
                        collection: Bytes::from_static(b"Docs"),
                    }),
                }
            }
        }
        history
    })
}
