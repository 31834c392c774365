//! # DocRepl Protocol
//!
//! Replication data model and wire messages for DocRepl.
//!
//! This crate provides:
//! - [`ChangeVector`] causality tokens and [`DestinationKnowledge`]
//! - [`ChangeItem`] records and the merged [`ChangeFeed`]
//! - [`KeyFilter`] for local-only system records
//! - [`PayloadPool`] for reusable document buffers
//! - Wire messages: [`MessageHeader`], [`write_item`], [`ReplicationReply`]
//!
//! This is a pure protocol crate with no I/O of its own; encoding goes
//! through the `docrepl_codec` scratch writer into any sink.
//!
//! ## Usage
//!
//! ```
//! use bytes::Bytes;
//! use docrepl_codec::ScratchBuffer;
//! use docrepl_protocol::{
//!     decode_message, write_item, ChangeFeed, ChangeVector, Document, MessageHeader,
//!     ReplicationMessage, TombstoneRecord,
//! };
//!
//! let docs = vec![Document {
//!     etag: 1,
//!     change_vector: ChangeVector::new(),
//!     transaction_marker: 1,
//!     key: Bytes::from_static(b"users/1"),
//!     data: Bytes::from_static(b"{}"),
//! }];
//! let items: Vec<_> = ChangeFeed::new(docs, Vec::<TombstoneRecord>::new()).collect();
//!
//! let mut scratch = ScratchBuffer::new(1024);
//! let mut out = Vec::new();
//! let mut writer = scratch.writer(&mut out);
//! MessageHeader::documents(1, 0, items.len()).unwrap().write(&mut writer).unwrap();
//! for item in &items {
//!     write_item(&mut writer, item).unwrap();
//! }
//! writer.finish().unwrap();
//!
//! let (message, _) = decode_message(&out).unwrap();
//! assert!(matches!(message, ReplicationMessage::Documents { ref items, .. } if items.len() == 1));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod change_vector;
mod item;
mod key_filter;
mod knowledge;
mod messages;
mod pool;

pub use change_feed::{ChangeFeed, FeedState};
pub use change_vector::{ChangeVector, ChangeVectorEntry, NodeId};
pub use item::{ChangeItem, Document, DocumentRecord, Tombstone, TombstoneRecord};
pub use key_filter::{KeyFilter, REPLICATED_SYSTEM_PREFIXES, SYSTEM_KEY_PREFIXES};
pub use knowledge::DestinationKnowledge;
pub use messages::{
    decode_message, item_fixed_size, write_item, MessageHeader, MessageKind, ReplicationMessage,
    ReplicationReply, ReplyStatus, WireBody, WireItem, TOMBSTONE_PAYLOAD_SIZE,
};
pub use pool::{PayloadPool, PooledPayload, DEFAULT_MAX_POOLED_CAPACITY};
