//! Outgoing replication session state machine.

use crate::assembler::{BatchAssembler, RoundPlan};
use crate::cancel::CancellationSignal;
use crate::config::{Destination, ReplicationConfig};
use crate::error::{ReplicationError, ReplicationResult};
use crate::transport::{CancelAwareSink, CancelAwareSource, ReplicationTransport};
use docrepl_codec::{CodecError, IoReader, ScratchBuffer};
use docrepl_protocol::{
    write_item, ChangeFeed, ChangeItem, DestinationKnowledge, MessageHeader, PayloadPool,
    PooledPayload, ReplicationReply, ReplyStatus,
};
use docrepl_storage::{KnowledgeStore, ReadSnapshot, SnapshotSource};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// The current state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No round has run yet.
    Idle,
    /// A round is in progress.
    RoundActive,
    /// The last round completed.
    Succeeded,
    /// The last round failed.
    Failed,
}

impl SessionState {
    /// Returns true while a round is running.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::RoundActive)
    }

    /// Returns true if a new round may start.
    pub fn can_start_round(&self) -> bool {
        !self.is_active()
    }
}

/// What a completed round did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Nothing new since the last acknowledged etag.
    NoModification,
    /// Only withheld items were found; the destination was told the new etag.
    Heartbeat {
        /// Etag acknowledged by the destination.
        last_etag: u64,
        /// Items withheld in this round.
        filtered: usize,
    },
    /// A batch was shipped and acknowledged.
    Sent {
        /// Items shipped.
        items: usize,
        /// Items withheld in this round.
        filtered: usize,
        /// Etag acknowledged by the destination.
        last_etag: u64,
        /// Document payload bytes shipped.
        payload_bytes: usize,
    },
}

impl RoundOutcome {
    /// Returns true if the round moved the destination forward.
    pub fn made_progress(&self) -> bool {
        !matches!(self, RoundOutcome::NoModification)
    }
}

/// Statistics about a session.
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Rounds that completed, including rounds with nothing to send.
    pub rounds_succeeded: u64,
    /// Rounds that failed.
    pub rounds_failed: u64,
    /// Items shipped and acknowledged.
    pub items_sent: u64,
    /// Items withheld by the filters in successful rounds.
    pub items_filtered: u64,
    /// Heartbeats acknowledged.
    pub heartbeats_sent: u64,
    /// Document payload bytes shipped and acknowledged.
    pub payload_bytes_sent: u64,
    /// Duration of the last round.
    pub last_round_duration: Option<Duration>,
    /// Unix time in milliseconds of the last acknowledged batch.
    pub last_document_sent_at: Option<u64>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Replicates the local change history to one destination.
///
/// A round opens a snapshot, assembles a [`RoundPlan`], ships it as a batch
/// (or a heartbeat when every item was withheld), closes the snapshot, waits
/// for the destination's reply and only then records the new position in the
/// knowledge store and in memory. Any failure leaves the knowledge exactly
/// as it was before the round.
///
/// Failed rounds are not retried; the caller decides whether and when to run
/// the next one.
pub struct OutgoingReplicationSession<S: SnapshotSource, K: KnowledgeStore> {
    destination: Destination,
    config: ReplicationConfig,
    source: S,
    knowledge_store: K,
    knowledge: DestinationKnowledge,
    assembler: BatchAssembler,
    scratch: ScratchBuffer,
    state: SessionState,
    stats: SessionStats,
    pending_document_time: Option<u64>,
    pending_index_etag: Option<u64>,
}

impl<S: SnapshotSource, K: KnowledgeStore> OutgoingReplicationSession<S, K> {
    /// Creates a session, resuming from the knowledge saved for `destination`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the knowledge
    /// store cannot be read.
    pub fn new(
        destination: Destination,
        config: ReplicationConfig,
        source: S,
        knowledge_store: K,
    ) -> ReplicationResult<Self> {
        config.validate()?;
        let knowledge = knowledge_store
            .load(&destination.id())?
            .unwrap_or_default();
        let pool = PayloadPool::new(config.pool_max_retained);
        let assembler = BatchAssembler::new(&config, pool);
        let scratch = ScratchBuffer::new(config.scratch_buffer_size);

        debug!(
            destination = %destination,
            last_sent_etag = knowledge.last_sent_etag,
            "replication session created"
        );

        Ok(Self {
            destination,
            config,
            source,
            knowledge_store,
            knowledge,
            assembler,
            scratch,
            state: SessionState::Idle,
            stats: SessionStats::default(),
            pending_document_time: None,
            pending_index_etag: None,
        })
    }

    /// Destination of this session.
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Configuration of this session.
    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Statistics so far.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// What the session knows about the destination.
    pub fn knowledge(&self) -> &DestinationKnowledge {
        &self.knowledge
    }

    /// Pool holding the payloads of the current round.
    pub fn pool(&self) -> &PayloadPool {
        self.assembler.pool()
    }

    /// Snapshot source the session reads from.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Queues the index/transformer etag to echo in subsequent headers.
    ///
    /// The knowledge keeps its old value until a round carrying the new one
    /// is acknowledged.
    pub fn set_last_index_or_transformer_etag(&mut self, etag: u64) {
        self.pending_index_etag = Some(etag);
    }

    fn index_etag(&self) -> u64 {
        self.pending_index_etag
            .unwrap_or(self.knowledge.last_index_or_transformer_etag)
    }

    /// Assembles the next round from `snapshot` without sending anything.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::Cancelled`] if `cancel` fires during the scan.
    pub fn try_build_round<R>(
        &self,
        snapshot: &R,
        cancel: &CancellationSignal,
    ) -> ReplicationResult<RoundPlan>
    where
        R: ReadSnapshot + ?Sized,
    {
        let last_sent_etag = self.knowledge.last_sent_etag;
        let feed = ChangeFeed::new(
            snapshot.documents_after(last_sent_etag),
            snapshot.tombstones_after(last_sent_etag, 0, usize::MAX),
        );
        self.assembler
            .build_round_cancellable(feed, last_sent_etag, &self.knowledge, cancel)
    }

    /// Runs one replication round over `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::InvalidStateTransition`] if a round is
    /// already active, or the error that ended the round. In every error
    /// case the destination knowledge is unchanged.
    pub fn run_round<T>(
        &mut self,
        transport: &mut T,
        cancel: &CancellationSignal,
    ) -> ReplicationResult<RoundOutcome>
    where
        T: ReplicationTransport + ?Sized,
    {
        if !self.state.can_start_round() {
            return Err(ReplicationError::InvalidStateTransition {
                from: format!("{:?}", self.state),
                to: "RoundActive".into(),
            });
        }

        let start = Instant::now();
        self.state = SessionState::RoundActive;
        self.pending_document_time = None;

        let result = self.execute_round(transport, cancel);
        let duration = start.elapsed();
        self.stats.last_round_duration = Some(duration);

        match &result {
            Ok(outcome) => {
                self.state = SessionState::Succeeded;
                self.record_success(outcome, duration);
            }
            Err(err) => {
                self.state = SessionState::Failed;
                self.stats.rounds_failed += 1;
                self.stats.last_error = Some(err.to_string());
                warn!(
                    destination = %self.destination,
                    last_sent_etag = self.knowledge.last_sent_etag,
                    retryable = err.is_retryable(),
                    error = %err,
                    "replication round failed"
                );
            }
        }
        result
    }

    fn execute_round<T>(
        &mut self,
        transport: &mut T,
        cancel: &CancellationSignal,
    ) -> ReplicationResult<RoundOutcome>
    where
        T: ReplicationTransport + ?Sized,
    {
        let snapshot = self.source.open_snapshot()?;
        let plan = self.try_build_round(&snapshot, cancel)?;

        if !plan.has_progress {
            return Ok(RoundOutcome::NoModification);
        }

        let sent_etag = plan.new_last_etag;
        let filtered = plan.filtered;
        let outcome = if plan.items.is_empty() {
            drop(snapshot);
            self.send_heartbeat(transport, sent_etag, cancel)?;
            RoundOutcome::Heartbeat {
                last_etag: sent_etag,
                filtered,
            }
        } else {
            let items = plan.items.len();
            let payload_bytes = plan.payload_bytes;
            self.send_batch(transport, plan, cancel)?;
            drop(snapshot);
            self.pending_document_time = Some(unix_millis());
            RoundOutcome::Sent {
                items,
                filtered,
                last_etag: sent_etag,
                payload_bytes,
            }
        };

        cancel.check()?;
        let reply = read_reply(transport, cancel)?;
        self.apply_ack(&reply, sent_etag)?;
        Ok(outcome)
    }

    fn send_batch<T>(
        &mut self,
        transport: &mut T,
        plan: RoundPlan,
        cancel: &CancellationSignal,
    ) -> ReplicationResult<()>
    where
        T: ReplicationTransport + ?Sized,
    {
        let header = MessageHeader::documents(
            plan.new_last_etag,
            self.index_etag(),
            plan.items.len(),
        )?;

        let mut sink = CancelAwareSink::new(transport, cancel);
        let mut writer = self.scratch.writer(&mut sink);
        header
            .write(&mut writer)
            .map_err(|e| write_error(e, cancel))?;

        // Each payload goes back to the pool as soon as its item is written.
        for item in plan.items {
            cancel.check()?;
            write_item(&mut writer, &item).map_err(|e| item_error(e, &item, cancel))?;
        }

        writer.finish().map_err(|e| write_error(e, cancel))?;
        Ok(())
    }

    fn send_heartbeat<T>(
        &mut self,
        transport: &mut T,
        last_etag: u64,
        cancel: &CancellationSignal,
    ) -> ReplicationResult<()>
    where
        T: ReplicationTransport + ?Sized,
    {
        let header =
            MessageHeader::heartbeat(last_etag, self.index_etag());
        let mut sink = CancelAwareSink::new(transport, cancel);
        let mut writer = self.scratch.writer(&mut sink);
        header
            .write(&mut writer)
            .map_err(|e| write_error(e, cancel))?;
        writer.finish().map_err(|e| write_error(e, cancel))?;
        Ok(())
    }

    /// Records a reply to the message that carried `sent_etag`.
    ///
    /// Only accepted while a round is active. The new knowledge is persisted first
    /// and only then replaces the in-memory copy, so a failed save leaves
    /// both unchanged.
    ///
    /// # Errors
    ///
    /// - [`ReplicationError::InvalidStateTransition`] outside a round
    /// - [`ReplicationError::DestinationRejected`] / [`ReplicationError::ConflictReported`]
    ///   for non-`Ok` replies
    /// - [`ReplicationError::Protocol`] if the reply acknowledges a
    ///   different etag, or `sent_etag` is behind the last acknowledged one
    /// - [`ReplicationError::Storage`] if the knowledge cannot be saved
    pub fn apply_ack(&mut self, reply: &ReplicationReply, sent_etag: u64) -> ReplicationResult<()> {
        if !self.state.is_active() {
            return Err(ReplicationError::InvalidStateTransition {
                from: format!("{:?}", self.state),
                to: "Succeeded".into(),
            });
        }

        match reply.status {
            ReplyStatus::Ok => {}
            ReplyStatus::Error => {
                return Err(ReplicationError::DestinationRejected(
                    reply.message.clone().unwrap_or_else(|| "no reason given".into()),
                ));
            }
            ReplyStatus::Conflict => {
                return Err(ReplicationError::ConflictReported(
                    reply.message.clone().unwrap_or_else(|| "no details given".into()),
                ));
            }
        }

        if reply.last_etag_accepted != sent_etag {
            return Err(ReplicationError::protocol(format!(
                "destination acknowledged etag {} but {} was sent",
                reply.last_etag_accepted, sent_etag
            )));
        }
        if sent_etag < self.knowledge.last_sent_etag {
            return Err(ReplicationError::protocol(format!(
                "acknowledged etag {} is behind last sent etag {}",
                sent_etag, self.knowledge.last_sent_etag
            )));
        }

        let mut updated = self.knowledge.clone();
        updated.last_sent_etag = sent_etag;
        updated.destination_change_vector = reply.change_vector.clone();
        updated.last_index_or_transformer_etag = self.index_etag();
        if let Some(at) = self.pending_document_time {
            updated.last_document_sent_at = Some(at);
        }

        self.knowledge_store.save(&self.destination.id(), &updated)?;
        self.knowledge = updated;
        self.pending_document_time = None;
        self.pending_index_etag = None;
        Ok(())
    }

    fn record_success(&mut self, outcome: &RoundOutcome, duration: Duration) {
        self.stats.rounds_succeeded += 1;
        self.stats.last_error = None;
        match *outcome {
            RoundOutcome::NoModification => {}
            RoundOutcome::Heartbeat {
                last_etag,
                filtered,
            } => {
                self.stats.heartbeats_sent += 1;
                self.stats.items_filtered += filtered as u64;
                debug!(
                    destination = %self.destination,
                    last_etag,
                    filtered,
                    "heartbeat acknowledged"
                );
            }
            RoundOutcome::Sent {
                items,
                filtered,
                last_etag,
                payload_bytes,
            } => {
                self.stats.items_sent += items as u64;
                self.stats.items_filtered += filtered as u64;
                self.stats.payload_bytes_sent += payload_bytes as u64;
                self.stats.last_document_sent_at = self.knowledge.last_document_sent_at;
                info!(
                    destination = %self.destination,
                    items,
                    filtered,
                    last_etag,
                    payload_bytes,
                    duration_ms = duration.as_millis() as u64,
                    "replication batch acknowledged"
                );
            }
        }
    }
}

impl<S: SnapshotSource, K: KnowledgeStore> std::fmt::Debug for OutgoingReplicationSession<S, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutgoingReplicationSession")
            .field("destination", &self.destination)
            .field("state", &self.state)
            .field("knowledge", &self.knowledge)
            .finish()
    }
}

fn read_reply<T: ReplicationTransport + ?Sized>(
    transport: &mut T,
    cancel: &CancellationSignal,
) -> ReplicationResult<ReplicationReply> {
    let mut source = CancelAwareSource::new(transport, cancel);
    let mut reader = IoReader::new(&mut source);
    ReplicationReply::read(&mut reader).map_err(|err| match err {
        CodecError::InvalidStructure { .. } | CodecError::LengthLimit { .. } => {
            ReplicationError::protocol(format!("malformed reply: {err}"))
        }
        other => write_error(other, cancel),
    })
}

fn write_error(err: CodecError, cancel: &CancellationSignal) -> ReplicationError {
    if err.is_io() && cancel.is_cancelled() {
        ReplicationError::Cancelled
    } else {
        err.into()
    }
}

fn item_error(
    err: CodecError,
    item: &ChangeItem<PooledPayload>,
    cancel: &CancellationSignal,
) -> ReplicationError {
    match err {
        CodecError::CapacityExceeded { required, capacity } => ReplicationError::ItemTooLarge {
            key: String::from_utf8_lossy(item.key()).into_owned(),
            required,
            capacity,
        },
        other => write_error(other, cancel),
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use docrepl_protocol::{decode_message, ChangeVector, ReplicationMessage};
    use docrepl_storage::{MemoryChangeStore, MemoryKnowledgeStore};
    use std::io::{self, Read, Write};
    use std::sync::Arc;

    fn session(
        store: &Arc<MemoryChangeStore>,
        knowledge: &Arc<MemoryKnowledgeStore>,
    ) -> OutgoingReplicationSession<Arc<MemoryChangeStore>, Arc<MemoryKnowledgeStore>> {
        OutgoingReplicationSession::new(
            Destination::new("db", "node-b"),
            ReplicationConfig::new(),
            Arc::clone(store),
            Arc::clone(knowledge),
        )
        .unwrap()
    }

    #[test]
    fn nothing_to_send() {
        let store = Arc::new(MemoryChangeStore::new());
        let knowledge = Arc::new(MemoryKnowledgeStore::new());
        let mut session = session(&store, &knowledge);
        let mut transport = MockTransport::new();

        let outcome = session
            .run_round(&mut transport, &CancellationSignal::new())
            .unwrap();
        assert_eq!(outcome, RoundOutcome::NoModification);
        assert!(transport.written().is_empty());
        assert_eq!(session.state(), SessionState::Succeeded);
        assert_eq!(store.open_snapshots(), 0);
    }

    #[test]
    fn batch_is_sent_and_acknowledged() {
        let store = Arc::new(MemoryChangeStore::new());
        let knowledge = Arc::new(MemoryKnowledgeStore::new());
        store.put("users/1", "{}");
        store.put("users/2", "{}");
        let mut session = session(&store, &knowledge);

        let mut transport = MockTransport::new();
        transport
            .push_reply(&ReplicationReply::ok(2, store.change_vector()))
            .unwrap();
        let outcome = session
            .run_round(&mut transport, &CancellationSignal::new())
            .unwrap();

        assert!(matches!(outcome, RoundOutcome::Sent { items: 2, last_etag: 2, .. }));
        assert_eq!(session.knowledge().last_sent_etag, 2);
        assert_eq!(session.knowledge().destination_change_vector, store.change_vector());
        assert!(session.knowledge().last_document_sent_at.is_some());
        assert_eq!(knowledge.load("db@node-b").unwrap().unwrap().last_sent_etag, 2);
        assert_eq!(session.pool().outstanding(), 0);

        let (message, _) = decode_message(transport.written()).unwrap();
        match message {
            ReplicationMessage::Documents { header, items } => {
                assert_eq!(header.last_etag, 2);
                assert_eq!(items.len(), 2);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn rejected_reply_keeps_knowledge() {
        let store = Arc::new(MemoryChangeStore::new());
        let knowledge = Arc::new(MemoryKnowledgeStore::new());
        store.put("users/1", "{}");
        let mut session = session(&store, &knowledge);

        let mut transport = MockTransport::new();
        transport
            .push_reply(&ReplicationReply::error(0, "disk full"))
            .unwrap();
        let err = session
            .run_round(&mut transport, &CancellationSignal::new())
            .unwrap_err();

        assert!(matches!(err, ReplicationError::DestinationRejected(ref m) if m == "disk full"));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.knowledge().last_sent_etag, 0);
        assert!(knowledge.is_empty());
        assert_eq!(session.stats().rounds_failed, 1);
    }

    #[test]
    fn mismatched_ack_is_a_protocol_error() {
        let store = Arc::new(MemoryChangeStore::new());
        let knowledge = Arc::new(MemoryKnowledgeStore::new());
        store.put("users/1", "{}");
        let mut session = session(&store, &knowledge);

        let mut transport = MockTransport::new();
        transport
            .push_reply(&ReplicationReply::ok(7, ChangeVector::new()))
            .unwrap();
        let err = session
            .run_round(&mut transport, &CancellationSignal::new())
            .unwrap_err();
        assert!(matches!(err, ReplicationError::Protocol(_)));
        assert_eq!(session.knowledge().last_sent_etag, 0);
    }

    #[test]
    fn malformed_reply_is_a_protocol_error() {
        let store = Arc::new(MemoryChangeStore::new());
        let knowledge = Arc::new(MemoryKnowledgeStore::new());
        store.put("users/1", "{}");
        let mut session = session(&store, &knowledge);

        let mut transport = MockTransport::new();
        transport.push_inbound(&[9; 32]);
        let err = session
            .run_round(&mut transport, &CancellationSignal::new())
            .unwrap_err();
        assert!(matches!(err, ReplicationError::Protocol(_)));
    }

    #[test]
    fn missing_reply_is_retryable_transport_error() {
        let store = Arc::new(MemoryChangeStore::new());
        let knowledge = Arc::new(MemoryKnowledgeStore::new());
        store.put("users/1", "{}");
        let mut session = session(&store, &knowledge);

        let mut transport = MockTransport::new();
        let err = session
            .run_round(&mut transport, &CancellationSignal::new())
            .unwrap_err();
        assert!(matches!(err, ReplicationError::Transport { .. }));
        assert!(err.is_retryable());
        assert_eq!(session.pool().outstanding(), 0);
        assert_eq!(store.open_snapshots(), 0);
    }

    #[test]
    fn failed_save_keeps_memory_knowledge() {
        let store = Arc::new(MemoryChangeStore::new());
        let knowledge = Arc::new(MemoryKnowledgeStore::new());
        store.put("users/1", "{}");
        let mut session = session(&store, &knowledge);
        knowledge.set_fail_saves(true);

        let mut transport = MockTransport::new();
        transport
            .push_reply(&ReplicationReply::ok(1, store.change_vector()))
            .unwrap();
        let err = session
            .run_round(&mut transport, &CancellationSignal::new())
            .unwrap_err();
        assert!(matches!(err, ReplicationError::Storage(_)));
        assert_eq!(session.knowledge().last_sent_etag, 0);
        assert!(session.knowledge().destination_change_vector.is_empty());
    }

    #[test]
    fn active_round_blocks_new_round() {
        let store = Arc::new(MemoryChangeStore::new());
        let knowledge = Arc::new(MemoryKnowledgeStore::new());
        let mut session = session(&store, &knowledge);
        session.state = SessionState::RoundActive;

        let err = session
            .run_round(&mut MockTransport::new(), &CancellationSignal::new())
            .unwrap_err();
        assert!(matches!(err, ReplicationError::InvalidStateTransition { .. }));
    }

    #[test]
    fn knowledge_is_resumed_from_store() {
        let store = Arc::new(MemoryChangeStore::new());
        let knowledge = Arc::new(MemoryKnowledgeStore::new());
        knowledge
            .save("db@node-b", &DestinationKnowledge::at(5, ChangeVector::new()))
            .unwrap();
        let session = session(&store, &knowledge);
        assert_eq!(session.knowledge().last_sent_etag, 5);
    }

    #[test]
    fn header_echoes_index_etag() {
        let store = Arc::new(MemoryChangeStore::new());
        let knowledge = Arc::new(MemoryKnowledgeStore::new());
        store.put("users/1", "{}");
        let mut session = session(&store, &knowledge);
        session.set_last_index_or_transformer_etag(33);

        let mut transport = MockTransport::new();
        transport
            .push_reply(&ReplicationReply::ok(1, store.change_vector()))
            .unwrap();
        session
            .run_round(&mut transport, &CancellationSignal::new())
            .unwrap();

        let (message, _) = decode_message(transport.written()).unwrap();
        assert_eq!(message.header().last_index_or_transformer_etag, 33);
        assert_eq!(
            knowledge.load("db@node-b").unwrap().unwrap().last_index_or_transformer_etag,
            33
        );
    }

    #[test]
    fn ack_outside_a_round_is_refused() {
        let store = Arc::new(MemoryChangeStore::new());
        let knowledge = Arc::new(MemoryKnowledgeStore::new());
        for i in 0..10 {
            store.put(format!("users/{i}"), "{}");
        }
        let mut session = session(&store, &knowledge);

        let mut transport = MockTransport::new();
        transport
            .push_reply(&ReplicationReply::ok(10, store.change_vector()))
            .unwrap();
        session
            .run_round(&mut transport, &CancellationSignal::new())
            .unwrap();
        assert_eq!(session.knowledge().last_sent_etag, 10);

        let err = session
            .apply_ack(&ReplicationReply::ok(3, ChangeVector::new()), 3)
            .unwrap_err();
        assert!(matches!(err, ReplicationError::InvalidStateTransition { .. }));
        assert_eq!(session.state(), SessionState::Succeeded);
        assert_eq!(session.knowledge().last_sent_etag, 10);
        assert_eq!(knowledge.load("db@node-b").unwrap().unwrap().last_sent_etag, 10);
    }

    #[test]
    fn ack_never_moves_the_etag_backwards() {
        let store = Arc::new(MemoryChangeStore::new());
        let knowledge = Arc::new(MemoryKnowledgeStore::new());
        knowledge
            .save("db@node-b", &DestinationKnowledge::at(10, ChangeVector::new()))
            .unwrap();
        let mut session = session(&store, &knowledge);
        session.state = SessionState::RoundActive;

        let err = session
            .apply_ack(&ReplicationReply::ok(3, ChangeVector::new()), 3)
            .unwrap_err();
        assert!(matches!(err, ReplicationError::Protocol(_)));
        assert_eq!(session.knowledge().last_sent_etag, 10);
        assert_eq!(knowledge.load("db@node-b").unwrap().unwrap().last_sent_etag, 10);
    }

    #[test]
    fn index_etag_is_kept_until_acknowledged() {
        let store = Arc::new(MemoryChangeStore::new());
        let knowledge = Arc::new(MemoryKnowledgeStore::new());
        store.put("users/1", "{}");
        let mut session = session(&store, &knowledge);
        session.set_last_index_or_transformer_etag(33);
        assert_eq!(session.knowledge().last_index_or_transformer_etag, 0);

        let mut transport = MockTransport::new();
        transport
            .push_reply(&ReplicationReply::error(0, "busy"))
            .unwrap();
        session
            .run_round(&mut transport, &CancellationSignal::new())
            .unwrap_err();
        assert_eq!(session.knowledge().last_index_or_transformer_etag, 0);
        let (message, _) = decode_message(transport.written()).unwrap();
        assert_eq!(message.header().last_index_or_transformer_etag, 33);

        let mut transport = MockTransport::new();
        transport
            .push_reply(&ReplicationReply::ok(1, store.change_vector()))
            .unwrap();
        session
            .run_round(&mut transport, &CancellationSignal::new())
            .unwrap();
        assert_eq!(session.knowledge().last_index_or_transformer_etag, 33);
    }

    #[test]
    fn cancel_while_waiting_for_reply() {
        let store = Arc::new(MemoryChangeStore::new());
        let knowledge = Arc::new(MemoryKnowledgeStore::new());
        store.put("users/1", "{}");
        let mut session = session(&store, &knowledge);
        let cancel = CancellationSignal::new();

        let mut transport = SilentPeer {
            inner: MockTransport::new(),
            cancel: cancel.clone(),
            timeouts: 0,
        };
        let err = session.run_round(&mut transport, &cancel).unwrap_err();
        assert!(matches!(err, ReplicationError::Cancelled));
        assert_eq!(transport.timeouts, 3);
        assert_eq!(session.knowledge().last_sent_etag, 0);
        assert_eq!(store.open_snapshots(), 0);
    }

    /// Accepts writes but never replies; its reads time out and the third
    /// timeout cancels the round.
    struct SilentPeer {
        inner: MockTransport,
        cancel: CancellationSignal,
        timeouts: usize,
    }

    impl Write for SilentPeer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl Read for SilentPeer {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            self.timeouts += 1;
            if self.timeouts == 3 {
                self.cancel.cancel();
            }
            Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"))
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = OutgoingReplicationSession::new(
            Destination::new("db", "node-b"),
            ReplicationConfig::new().with_max_items_per_batch(0),
            MemoryChangeStore::new(),
            MemoryKnowledgeStore::new(),
        );
        assert!(matches!(result, Err(ReplicationError::InvalidConfig(_))));
    }
}
