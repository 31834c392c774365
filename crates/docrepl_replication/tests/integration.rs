//! End-to-end tests: sessions replicating to a reference destination.

use bytes::Bytes;
use docrepl_codec::ScratchBuffer;
use docrepl_protocol::{
    decode_message, item_fixed_size, write_item, ChangeVector, DestinationKnowledge, MessageHeader,
    ReplicationMessage, WireItem,
};
use docrepl_replication::{
    CancellationSignal, Destination, MockTransport, OutgoingReplicationSession,
    ReplicationConfig, ReplicationError, RoundOutcome, SessionState,
};
use docrepl_storage::{FileKnowledgeStore, KnowledgeStore, MemoryKnowledgeStore};
use docrepl_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const MIB: usize = 1024 * 1024;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("docrepl_replication=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn destination() -> Destination {
    Destination::new("orders", "tcp://node-b:9090")
}

type FixtureSession = OutgoingReplicationSession<Arc<FixtureSource>, Arc<MemoryKnowledgeStore>>;

fn session_with(
    source: &Arc<FixtureSource>,
    knowledge: &Arc<MemoryKnowledgeStore>,
    config: ReplicationConfig,
) -> FixtureSession {
    OutgoingReplicationSession::new(
        destination(),
        config,
        Arc::clone(source),
        Arc::clone(knowledge),
    )
    .unwrap()
}

fn saved(knowledge: &MemoryKnowledgeStore) -> Option<DestinationKnowledge> {
    knowledge.load(&destination().id()).unwrap()
}

/// Documents at etags 10..=12, all committed by transaction 5.
fn transaction_five() -> FixtureSource {
    FixtureSource::new()
        .with_document(document(10, "users/1", 5, "{\"n\":1}", cv(&[(node(1), 10)])))
        .with_document(document(11, "users/2", 5, "{\"n\":2}", cv(&[(node(1), 11)])))
        .with_document(document(12, "users/3", 5, "{\"n\":3}", cv(&[(node(1), 12)])))
}

#[test]
fn one_transaction_ships_in_one_round() {
    init_tracing();
    let source = Arc::new(transaction_five());
    let knowledge = Arc::new(MemoryKnowledgeStore::new());
    let mut session = session_with(&source, &knowledge, ReplicationConfig::new());
    let mut transport = LoopbackTransport::new();
    let cancel = CancellationSignal::new();

    let outcome = session.run_round(&mut transport, &cancel).unwrap();
    assert_eq!(
        outcome,
        RoundOutcome::Sent {
            items: 3,
            filtered: 0,
            last_etag: 12,
            payload_bytes: 21,
        }
    );
    assert_eq!(session.state(), SessionState::Succeeded);
    assert_eq!(session.knowledge().last_sent_etag, 12);
    assert!(session.knowledge().last_document_sent_at.is_some());

    let receiver = transport.receiver();
    let receiver = receiver.lock();
    assert_eq!(receiver.received_keys(), vec!["users/1", "users/2", "users/3"]);
    assert_eq!(receiver.last_etag_accepted(), 12);
    assert_eq!(receiver.store().document_count(), 3);
    assert_eq!(
        session.knowledge().destination_change_vector,
        receiver.store().change_vector()
    );
    drop(receiver);

    assert_eq!(saved(&knowledge).unwrap(), *session.knowledge());
    assert_eq!(
        session.run_round(&mut transport, &cancel).unwrap(),
        RoundOutcome::NoModification
    );
}

#[test]
fn item_cap_closes_batch_at_transaction_boundary() {
    let source = Arc::new(
        transaction_five().with_document(document(13, "users/4", 6, "{}", cv(&[(node(1), 13)]))),
    );
    let knowledge = Arc::new(MemoryKnowledgeStore::new());
    let config = ReplicationConfig::new().with_max_items_per_batch(2);
    let mut session = session_with(&source, &knowledge, config);
    let mut transport = LoopbackTransport::new();
    let cancel = CancellationSignal::new();

    let first = session.run_round(&mut transport, &cancel).unwrap();
    assert!(matches!(first, RoundOutcome::Sent { items: 3, last_etag: 12, .. }));

    let second = session.run_round(&mut transport, &cancel).unwrap();
    assert!(matches!(second, RoundOutcome::Sent { items: 1, last_etag: 13, .. }));

    let receiver = transport.receiver();
    let receiver = receiver.lock();
    let sizes: Vec<usize> = receiver
        .messages()
        .iter()
        .map(|m| m.header().item_count as usize)
        .collect();
    assert_eq!(sizes, vec![3, 1]);
}

#[test]
fn only_system_keys_send_a_heartbeat() {
    init_tracing();
    let source = Arc::new(
        FixtureSource::new()
            .with_document(document(48, "system/config", 1, "{}", cv(&[(node(1), 48)])))
            .with_document(document(49, "System/Settings", 2, "{}", cv(&[(node(1), 49)])))
            .with_tombstone(tombstone(50, "system/old", 3, "@system", cv(&[(node(1), 50)]))),
    );
    let knowledge = Arc::new(MemoryKnowledgeStore::new());
    let mut session = session_with(&source, &knowledge, ReplicationConfig::new());
    let mut transport = LoopbackTransport::new();
    let cancel = CancellationSignal::new();

    let outcome = session.run_round(&mut transport, &cancel).unwrap();
    assert_eq!(
        outcome,
        RoundOutcome::Heartbeat {
            last_etag: 50,
            filtered: 3,
        }
    );
    assert_eq!(session.knowledge().last_sent_etag, 50);
    assert_eq!(session.knowledge().last_document_sent_at, None);
    assert_eq!(session.stats().heartbeats_sent, 1);
    assert_eq!(session.stats().items_filtered, 3);

    let receiver = transport.receiver();
    assert_eq!(receiver.lock().heartbeats(), 1);
    assert_eq!(receiver.lock().last_etag_accepted(), 50);
    assert!(receiver.lock().received_items().is_empty());

    assert_eq!(
        session.run_round(&mut transport, &cancel).unwrap(),
        RoundOutcome::NoModification
    );
}

#[test]
fn hilo_keys_are_replicated() {
    let source = Arc::new(
        FixtureSource::new()
            .with_document(document(1, "system/hilo/users", 1, "{}", cv(&[(node(1), 1)])))
            .with_document(document(2, "system/other", 2, "{}", cv(&[(node(1), 2)]))),
    );
    let knowledge = Arc::new(MemoryKnowledgeStore::new());
    let mut session = session_with(&source, &knowledge, ReplicationConfig::new());
    let mut transport = LoopbackTransport::new();

    let outcome = session
        .run_round(&mut transport, &CancellationSignal::new())
        .unwrap();
    assert!(matches!(outcome, RoundOutcome::Sent { items: 1, filtered: 1, last_etag: 2, .. }));
    assert_eq!(
        transport.receiver().lock().received_keys(),
        vec!["system/hilo/users"]
    );
}

#[test]
fn configured_prefix_tables_replace_the_defaults() {
    let source = Arc::new(
        FixtureSource::new()
            .with_document(document(
                1,
                "Raven/replication/destinations",
                1,
                "{}",
                cv(&[(node(1), 1)]),
            ))
            .with_document(document(2, "raven/hilo/orders", 2, "{}", cv(&[(node(1), 2)])))
            .with_document(document(3, "system/config", 3, "{}", cv(&[(node(1), 3)]))),
    );
    let knowledge = Arc::new(MemoryKnowledgeStore::new());
    let config = ReplicationConfig::new().with_key_prefixes(["Raven/"], ["Raven/hilo/"]);
    let mut session = session_with(&source, &knowledge, config);
    let mut transport = LoopbackTransport::new();

    let outcome = session
        .run_round(&mut transport, &CancellationSignal::new())
        .unwrap();
    assert!(matches!(outcome, RoundOutcome::Sent { items: 2, filtered: 1, last_etag: 3, .. }));
    assert_eq!(
        transport.receiver().lock().received_keys(),
        vec!["raven/hilo/orders", "system/config"]
    );
}

/// Four 5 MiB documents committed together, then a small one.
fn oversized_transaction() -> FixtureSource {
    let payload = Bytes::from(vec![b'z'; 5 * MIB]);
    let mut source = FixtureSource::new();
    for etag in 1..=4u64 {
        source = source.with_document(document(
            etag,
            &format!("blobs/{etag}"),
            1,
            payload.clone(),
            cv(&[(node(1), etag)]),
        ));
    }
    source.with_document(document(5, "blobs/small", 2, "tiny", cv(&[(node(1), 5)])))
}

#[test]
fn oversized_transaction_ships_whole_and_advances_only_after_ack() {
    let source = Arc::new(oversized_transaction());
    let knowledge = Arc::new(MemoryKnowledgeStore::new());
    let config = ReplicationConfig::new().with_max_batch_bytes(16 * MIB);
    let mut session = session_with(&source, &knowledge, config);
    let cancel = CancellationSignal::new();

    let mut receiver = ReferenceReceiver::new();
    receiver.set_mode(ReplyMode::Reject("out of disk".into()));
    let mut rejecting = LoopbackTransport::with_receiver(receiver);

    let err = session.run_round(&mut rejecting, &cancel).unwrap_err();
    assert!(matches!(err, ReplicationError::DestinationRejected(ref msg) if msg == "out of disk"));
    assert!(err.is_retryable());
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(session.knowledge().last_sent_etag, 0);
    assert!(saved(&knowledge).is_none());
    assert_eq!(session.pool().outstanding(), 0);

    let mut transport = LoopbackTransport::new();
    let outcome = session.run_round(&mut transport, &cancel).unwrap();
    assert_eq!(
        outcome,
        RoundOutcome::Sent {
            items: 4,
            filtered: 0,
            last_etag: 4,
            payload_bytes: 20 * MIB,
        }
    );
    assert_eq!(session.knowledge().last_sent_etag, 4);
    assert_eq!(saved(&knowledge).unwrap().last_sent_etag, 4);

    let outcome = session.run_round(&mut transport, &cancel).unwrap();
    assert!(matches!(outcome, RoundOutcome::Sent { items: 1, last_etag: 5, .. }));
}

#[test]
fn dominated_items_are_skipped_but_passed() {
    let source = Arc::new(
        FixtureSource::new()
            .with_document(document(1, "users/1", 1, "{}", cv(&[(node(1), 50)])))
            .with_document(document(2, "users/2", 2, "{}", cv(&[(node(2), 5)]))),
    );
    let knowledge = Arc::new(MemoryKnowledgeStore::new());
    knowledge
        .save(
            &destination().id(),
            &DestinationKnowledge::at(0, cv(&[(node(1), 100)])),
        )
        .unwrap();
    let mut session = session_with(&source, &knowledge, ReplicationConfig::new());
    let mut transport = LoopbackTransport::new();

    let outcome = session
        .run_round(&mut transport, &CancellationSignal::new())
        .unwrap();
    assert!(matches!(outcome, RoundOutcome::Sent { items: 1, filtered: 1, last_etag: 2, .. }));
    assert_eq!(transport.receiver().lock().received_keys(), vec!["users/2"]);
}

#[test]
fn fully_dominated_round_is_a_heartbeat() {
    let source = Arc::new(
        FixtureSource::new()
            .with_document(document(7, "users/1", 1, "{}", cv(&[(node(1), 3)]))),
    );
    let knowledge = Arc::new(MemoryKnowledgeStore::new());
    knowledge
        .save(
            &destination().id(),
            &DestinationKnowledge::at(5, cv(&[(node(1), 3), (node(2), 9)])),
        )
        .unwrap();
    let mut session = session_with(&source, &knowledge, ReplicationConfig::new());
    let mut transport = LoopbackTransport::new();

    let outcome = session
        .run_round(&mut transport, &CancellationSignal::new())
        .unwrap();
    assert_eq!(
        outcome,
        RoundOutcome::Heartbeat {
            last_etag: 7,
            filtered: 1,
        }
    );
    assert_eq!(session.knowledge().last_sent_etag, 7);
}

/// Records how many snapshots were open each time the session read a reply.
struct SnapshotProbe {
    inner: LoopbackTransport,
    source: Arc<FixtureSource>,
    open_at_read: Vec<usize>,
}

impl Write for SnapshotProbe {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Read for SnapshotProbe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.open_at_read.push(self.source.open_snapshots());
        self.inner.read(buf)
    }
}

#[test]
fn snapshot_is_released_before_waiting_for_the_reply() {
    let source = Arc::new(transaction_five());
    let knowledge = Arc::new(MemoryKnowledgeStore::new());
    let mut session = session_with(&source, &knowledge, ReplicationConfig::new());
    let mut probe = SnapshotProbe {
        inner: LoopbackTransport::new(),
        source: Arc::clone(&source),
        open_at_read: Vec::new(),
    };

    session
        .run_round(&mut probe, &CancellationSignal::new())
        .unwrap();
    assert!(!probe.open_at_read.is_empty());
    assert!(probe.open_at_read.iter().all(|&open| open == 0));
    assert_eq!(source.open_snapshots(), 0);
    assert_eq!(source.snapshots_opened(), 1);
}

#[test]
fn failed_write_returns_every_payload_to_the_pool() {
    let source = Arc::new(oversized_transaction());
    let knowledge = Arc::new(MemoryKnowledgeStore::new());
    let mut session = session_with(&source, &knowledge, ReplicationConfig::new());
    let mut transport = MockTransport::new();
    transport.fail_writes_after(MIB);

    let err = session
        .run_round(&mut transport, &CancellationSignal::new())
        .unwrap_err();
    assert!(matches!(err, ReplicationError::Transport { retryable: true, .. }));
    assert_eq!(session.pool().outstanding(), 0);
    assert_eq!(session.knowledge().last_sent_etag, 0);
    assert!(saved(&knowledge).is_none());
    assert_eq!(session.stats().rounds_failed, 1);
    assert!(session.stats().last_error.is_some());
}

#[test]
fn connection_closed_before_reply() {
    let source = Arc::new(transaction_five());
    let knowledge = Arc::new(MemoryKnowledgeStore::new());
    let mut session = session_with(&source, &knowledge, ReplicationConfig::new());
    let mut transport = MockTransport::new();

    let err = session
        .run_round(&mut transport, &CancellationSignal::new())
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(session.knowledge().last_sent_etag, 0);
    assert_eq!(source.open_snapshots(), 0);
}

/// Cancels the round once `after` bytes have been written.
struct CancellingTransport {
    inner: LoopbackTransport,
    cancel: CancellationSignal,
    after: usize,
    written: usize,
}

impl Write for CancellingTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n;
        if self.written >= self.after {
            self.cancel.cancel();
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Read for CancellingTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

#[test]
fn cancellation_mid_write_leaves_knowledge_unchanged() {
    let source = Arc::new(oversized_transaction());
    let knowledge = Arc::new(MemoryKnowledgeStore::new());
    let mut session = session_with(&source, &knowledge, ReplicationConfig::new());
    let cancel = CancellationSignal::new();
    let mut transport = CancellingTransport {
        inner: LoopbackTransport::new(),
        cancel: cancel.clone(),
        after: 2 * MIB,
        written: 0,
    };

    let err = session.run_round(&mut transport, &cancel).unwrap_err();
    assert!(matches!(err, ReplicationError::Cancelled));
    assert!(transport.written < 20 * MIB);
    assert_eq!(session.knowledge().last_sent_etag, 0);
    assert!(saved(&knowledge).is_none());
    assert_eq!(session.pool().outstanding(), 0);
    assert!(transport.inner.receiver().lock().messages().is_empty());

    cancel.reset();
    let mut transport = LoopbackTransport::new();
    let outcome = session.run_round(&mut transport, &cancel).unwrap();
    assert!(matches!(outcome, RoundOutcome::Sent { items: 4, last_etag: 4, .. }));
}

#[test]
fn oversized_key_is_reported() {
    let long_key = format!("users/{}", "k".repeat(100));
    let source = Arc::new(
        FixtureSource::new()
            .with_document(document(1, "users/1", 1, "{}", cv(&[(node(1), 1)])))
            .with_document(document(2, &long_key, 2, "{}", cv(&[(node(1), 2)]))),
    );
    let knowledge = Arc::new(MemoryKnowledgeStore::new());
    let config = ReplicationConfig::new().with_scratch_buffer_size(64);
    let mut session = session_with(&source, &knowledge, config);
    let mut transport = MockTransport::new();

    let err = session
        .run_round(&mut transport, &CancellationSignal::new())
        .unwrap_err();
    match err {
        ReplicationError::ItemTooLarge {
            key,
            required,
            capacity,
        } => {
            assert_eq!(key, long_key);
            assert!(required > capacity);
            assert_eq!(capacity, 64);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!ReplicationError::ItemTooLarge {
        key: String::new(),
        required: 0,
        capacity: 0
    }
    .is_retryable());
    assert_eq!(session.pool().outstanding(), 0);
    assert_eq!(session.knowledge().last_sent_etag, 0);
}

#[test]
fn conflict_and_wrong_ack_fail_the_round() {
    let source = Arc::new(transaction_five());
    let knowledge = Arc::new(MemoryKnowledgeStore::new());
    let mut session = session_with(&source, &knowledge, ReplicationConfig::new());
    let cancel = CancellationSignal::new();

    let mut receiver = ReferenceReceiver::new();
    receiver.set_mode(ReplyMode::Conflict("users/2 diverged".into()));
    let mut transport = LoopbackTransport::with_receiver(receiver);
    let err = session.run_round(&mut transport, &cancel).unwrap_err();
    assert!(matches!(err, ReplicationError::ConflictReported(ref msg) if msg.contains("users/2")));

    let mut receiver = ReferenceReceiver::new();
    receiver.set_mode(ReplyMode::WrongEtag(11));
    let mut transport = LoopbackTransport::with_receiver(receiver);
    let err = session.run_round(&mut transport, &cancel).unwrap_err();
    assert!(matches!(err, ReplicationError::Protocol(_)));

    assert_eq!(session.knowledge().last_sent_etag, 0);
    assert!(saved(&knowledge).is_none());
    assert_eq!(session.stats().rounds_failed, 2);
}

#[test]
fn file_knowledge_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(transaction_five());

    {
        let store = FileKnowledgeStore::open(dir.path()).unwrap();
        let mut session = OutgoingReplicationSession::new(
            destination(),
            ReplicationConfig::new(),
            Arc::clone(&source),
            store,
        )
        .unwrap();
        session.set_last_index_or_transformer_etag(77);
        session
            .run_round(&mut LoopbackTransport::new(), &CancellationSignal::new())
            .unwrap();
    }

    let store = FileKnowledgeStore::open(dir.path()).unwrap();
    let mut session = OutgoingReplicationSession::new(
        destination(),
        ReplicationConfig::new(),
        Arc::clone(&source),
        store,
    )
    .unwrap();
    assert_eq!(session.knowledge().last_sent_etag, 12);
    assert_eq!(session.knowledge().last_index_or_transformer_etag, 77);
    assert_eq!(
        session
            .run_round(&mut LoopbackTransport::new(), &CancellationSignal::new())
            .unwrap(),
        RoundOutcome::NoModification
    );
}

#[test]
fn header_carries_the_batch_etag() {
    let source = Arc::new(transaction_five());
    let knowledge = Arc::new(MemoryKnowledgeStore::new());
    let mut session = session_with(&source, &knowledge, ReplicationConfig::new());
    let mut transport = LoopbackTransport::new();
    session
        .run_round(&mut transport, &CancellationSignal::new())
        .unwrap();

    let receiver = transport.receiver();
    let receiver = receiver.lock();
    match &receiver.messages()[0] {
        ReplicationMessage::Documents { header, items } => {
            assert_eq!(header.last_etag, 12);
            assert_eq!(header.item_count, 3);
            assert!(items.iter().all(|item| item.transaction_marker == 5));
        }
        other => panic!("expected a batch, got {other:?}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn encoded_items_decode_to_the_same_items(
        history in history_strategy(10, 4),
        scratch_size in 64usize..512,
    ) {
        let items = history.items();
        let mut scratch = ScratchBuffer::new(scratch_size);
        let mut out = Vec::new();
        let mut writer = scratch.writer(&mut out);
        MessageHeader::documents(history.last_etag(), 0, items.len())
            .unwrap()
            .write(&mut writer)
            .unwrap();
        let mut expected = Vec::new();
        for item in &items {
            // Fixed parts larger than the scratch buffer cannot be encoded.
            if item_fixed_size(item) > scratch_size {
                continue;
            }
            write_item(&mut writer, item).unwrap();
            expected.push(WireItem::from(item));
        }
        writer.finish().unwrap();

        // Rewrite the count now that oversized items were skipped.
        out[17..21].copy_from_slice(&(expected.len() as i32).to_le_bytes());

        let (message, consumed) = decode_message(&out).unwrap();
        prop_assert_eq!(consumed, out.len());
        match message {
            ReplicationMessage::Documents { items, .. } => prop_assert_eq!(items, expected),
            ReplicationMessage::Heartbeat(_) => prop_assert!(false, "expected a batch"),
        }
    }

    #[test]
    fn rounds_ship_every_item_once_in_order(
        history in history_strategy(15, 4),
        max_items in 1usize..6,
        max_bytes in 64usize..2048,
    ) {
        let all = history.items();
        let last_etag = history.last_etag();
        let source = Arc::new(FixtureSource::from_history(history));
        let knowledge = Arc::new(MemoryKnowledgeStore::new());
        let config = ReplicationConfig::new()
            .with_max_items_per_batch(max_items)
            .with_max_batch_bytes(max_bytes);
        let mut session = session_with(&source, &knowledge, config);
        let mut transport = LoopbackTransport::new();
        let cancel = CancellationSignal::new();

        let mut finished = false;
        for _ in 0..=all.len() + 1 {
            if session.run_round(&mut transport, &cancel).unwrap() == RoundOutcome::NoModification {
                finished = true;
                break;
            }
        }
        prop_assert!(finished);
        prop_assert_eq!(session.knowledge().last_sent_etag, last_etag);

        let stats = session.stats();
        prop_assert_eq!((stats.items_sent + stats.items_filtered) as usize, all.len());

        let receiver = transport.receiver();
        let receiver = receiver.lock();

        // Received items are a subsequence of the history: in order, no repeats.
        let expected: Vec<WireItem> = all.iter().map(WireItem::from).collect();
        let mut cursor = 0;
        for item in receiver.received_items() {
            let offset = expected[cursor..].iter().position(|e| e == item);
            prop_assert!(offset.is_some(), "item shipped out of order or twice");
            cursor += offset.unwrap_or(0) + 1;
        }
        prop_assert_eq!(receiver.received_items().len() as u64, stats.items_sent);

        // A transaction never spans two batches.
        let mut seen = BTreeSet::new();
        for message in receiver.messages() {
            if let ReplicationMessage::Documents { items, .. } = message {
                let markers: BTreeSet<i16> = items.iter().map(|i| i.transaction_marker).collect();
                prop_assert!(seen.is_disjoint(&markers));
                seen.extend(markers);
            }
        }
        prop_assert_eq!(source.open_snapshots(), 0);
        prop_assert_eq!(session.pool().outstanding(), 0);
    }
}

#[test]
fn empty_change_vector_counts_as_seen() {
    let source = Arc::new(
        FixtureSource::new().with_document(document(3, "users/1", 1, "{}", ChangeVector::new())),
    );
    let knowledge = Arc::new(MemoryKnowledgeStore::new());
    let mut session = session_with(&source, &knowledge, ReplicationConfig::new());
    let outcome = session
        .run_round(&mut LoopbackTransport::new(), &CancellationSignal::new())
        .unwrap();
    assert_eq!(
        outcome,
        RoundOutcome::Heartbeat {
            last_etag: 3,
            filtered: 1,
        }
    );
}
