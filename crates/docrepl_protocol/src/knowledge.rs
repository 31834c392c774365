//! What the source knows about a destination.

use crate::change_vector::ChangeVector;
use serde::{Deserialize, Serialize};

/// Replication progress towards one destination.
///
/// Updated only after the destination acknowledged a message, so it never
/// claims more than the destination has actually recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationKnowledge {
    /// Last etag the destination acknowledged.
    pub last_sent_etag: u64,
    /// The destination's change vector as of its last reply.
    pub destination_change_vector: ChangeVector,
    /// Last index/transformer definition etag sent to the destination.
    #[serde(default)]
    pub last_index_or_transformer_etag: u64,
    /// Unix time in milliseconds of the last acknowledged batch with items.
    #[serde(default)]
    pub last_document_sent_at: Option<u64>,
}

impl DestinationKnowledge {
    /// Knowledge about a destination that has received nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Knowledge starting at the given position.
    pub fn at(last_sent_etag: u64, destination_change_vector: ChangeVector) -> Self {
        Self {
            last_sent_etag,
            destination_change_vector,
            ..Self::default()
        }
    }

    /// Returns true if the destination has already seen this change vector.
    pub fn has_seen(&self, change_vector: &ChangeVector) -> bool {
        !change_vector.is_newer_than(&self.destination_change_vector)
    }
}
