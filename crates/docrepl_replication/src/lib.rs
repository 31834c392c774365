//! # DocRepl Replication
//!
//! Outgoing document replication for DocRepl.
//!
//! This crate provides:
//! - [`BatchAssembler`]: picks the changes a round ships (caps, transaction
//!   boundaries, system key and change vector filters)
//! - [`OutgoingReplicationSession`]: the round state machine
//!   (idle → round active → succeeded / failed)
//! - [`ReplicationWorker`]: a tokio task that runs rounds for one destination
//! - [`ReplicationTransport`]: any duplex byte stream to the destination
//!
//! ## Round
//!
//! 1. Open a snapshot and merge documents and tombstones after the last
//!    acknowledged etag
//! 2. Assemble a batch, stopping at a transaction boundary once a cap is hit
//! 3. Send the batch (or a heartbeat if every item was withheld)
//! 4. Close the snapshot, wait for the destination's reply
//! 5. Persist the new destination knowledge, then update it in memory
//!
//! ## Key Invariants
//!
//! - Items are shipped in strictly ascending etag order
//! - A transaction is never split across batches
//! - Knowledge only changes after a fully acknowledged round
//! - Payload buffers and snapshots are released on every exit path
//! - Failed rounds are never retried internally

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod assembler;
mod cancel;
mod config;
mod error;
mod session;
mod transport;
mod worker;

pub use assembler::{BatchAssembler, RoundPlan};
pub use cancel::CancellationSignal;
pub use config::{
    Destination, ReplicationConfig, DEFAULT_IDLE_INTERVAL, DEFAULT_MAX_BATCH_BYTES,
    DEFAULT_MAX_ITEMS_PER_BATCH, DEFAULT_POOL_MAX_RETAINED, DEFAULT_SCRATCH_BUFFER_SIZE,
};
pub use error::{ReplicationError, ReplicationResult};
pub use session::{OutgoingReplicationSession, RoundOutcome, SessionState, SessionStats};
pub use transport::{MockTransport, ReplicationTransport};
pub use worker::{ReplicationWorker, WorkerHandle};
