//! # DocRepl Storage
//!
//! Storage collaborators of the replication engine.
//!
//! The replication core never talks to a storage engine directly. It opens a
//! [`ReadSnapshot`] through a [`SnapshotSource`], scans documents and
//! tombstones after a given etag, and persists what it learned about each
//! destination through a [`KnowledgeStore`].
//!
//! ## Available Implementations
//!
//! - [`MemoryChangeStore`] - copy-on-write change store for tests and embedders
//! - [`MemoryKnowledgeStore`] - non-durable knowledge store
//! - [`FileKnowledgeStore`] - JSON file with write-then-rename saves
//!
//! ## Example
//!
//! ```rust
//! use docrepl_storage::{MemoryChangeStore, ReadSnapshot, SnapshotSource};
//!
//! let store = MemoryChangeStore::new();
//! store.put("users/1", "{}");
//! store.delete("users/2", "Users");
//!
//! let snapshot = store.open_snapshot().unwrap();
//! assert_eq!(snapshot.documents_after(0).count(), 1);
//! assert_eq!(snapshot.tombstones_after(0, 0, usize::MAX).count(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod knowledge;
mod memory;
mod snapshot;

pub use error::{StorageError, StorageResult};
pub use knowledge::{FileKnowledgeStore, KnowledgeStore, MemoryKnowledgeStore};
pub use memory::{MemoryChangeStore, MemorySnapshot, WriteBatch};
pub use snapshot::{DocumentScan, ReadSnapshot, SnapshotSource, TombstoneScan};
