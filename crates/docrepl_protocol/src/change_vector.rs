//! Change vectors: per-node causality tokens.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a node (database instance) that originates writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Size of a node id on the wire.
    pub const SIZE: usize = 16;

    /// Generates a random node id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a node id from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for NodeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// One `(node, counter)` pair of a change vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeVectorEntry {
    /// Originating node.
    pub node: NodeId,
    /// Highest write counter observed from that node.
    pub counter: u64,
}

impl ChangeVectorEntry {
    /// Size of one entry on the wire (node id + counter).
    pub const WIRE_SIZE: usize = NodeId::SIZE + 8;

    /// Creates an entry.
    pub fn new(node: NodeId, counter: u64) -> Self {
        Self { node, counter }
    }
}

/// Causal history of a record: one counter per node that has written it.
///
/// Entries keep the order they were inserted in; each node appears at most
/// once. A node missing from the vector is treated as counter 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeVector {
    entries: Vec<ChangeVectorEntry>,
}

impl ChangeVector {
    /// Creates an empty change vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a change vector from entries.
    ///
    /// Repeated nodes are collapsed, keeping the highest counter.
    pub fn from_entries(entries: impl IntoIterator<Item = ChangeVectorEntry>) -> Self {
        let mut vector = Self::new();
        for entry in entries {
            vector.observe(entry.node, entry.counter);
        }
        vector
    }

    /// Returns the entries in insertion order.
    pub fn entries(&self) -> &[ChangeVectorEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no node has been observed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the counter recorded for `node` (0 when absent).
    pub fn get(&self, node: &NodeId) -> u64 {
        self.entries
            .iter()
            .find(|e| &e.node == node)
            .map_or(0, |e| e.counter)
    }

    /// Raises the counter for `node` to at least `counter`.
    pub fn observe(&mut self, node: NodeId, counter: u64) {
        match self.entries.iter_mut().find(|e| e.node == node) {
            Some(entry) => entry.counter = entry.counter.max(counter),
            None => self.entries.push(ChangeVectorEntry::new(node, counter)),
        }
    }

    /// Pointwise maximum with `other`.
    pub fn merge(&mut self, other: &ChangeVector) {
        for entry in &other.entries {
            self.observe(entry.node, entry.counter);
        }
    }

    /// Returns a merged copy.
    #[must_use]
    pub fn merged(&self, other: &ChangeVector) -> ChangeVector {
        let mut merged = self.clone();
        merged.merge(other);
        merged
    }

    /// Returns true if this vector has seen everything `other` has seen.
    ///
    /// Equal vectors dominate each other. An empty `other` is dominated by
    /// every vector.
    pub fn dominates(&self, other: &ChangeVector) -> bool {
        other.entries.iter().all(|e| self.get(&e.node) >= e.counter)
    }

    /// Returns true if this vector contains a counter newer than `other`.
    pub fn is_newer_than(&self, other: &ChangeVector) -> bool {
        !other.dominates(self)
    }

    /// Wire size of the entries (excluding the count prefix).
    pub fn wire_size(&self) -> usize {
        self.entries.len() * ChangeVectorEntry::WIRE_SIZE
    }
}

impl FromIterator<ChangeVectorEntry> for ChangeVector {
    fn from_iter<I: IntoIterator<Item = ChangeVectorEntry>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}

impl fmt::Display for ChangeVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}:{}", entry.node, entry.counter)?;
        }
        f.write_str("]")
    }
}
