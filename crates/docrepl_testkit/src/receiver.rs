//! Reference destination for end-to-end tests.

use docrepl_codec::CodecResult;
use docrepl_protocol::{decode_message, ReplicationMessage, ReplicationReply, WireBody, WireItem};
use docrepl_storage::{MemoryChangeStore, WriteBatch};

/// How the receiver answers the next messages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReplyMode {
    /// Apply the message and acknowledge it.
    #[default]
    Accept,
    /// Reject without applying.
    Reject(String),
    /// Report a conflict without applying.
    Conflict(String),
    /// Apply the message but acknowledge a different etag.
    WrongEtag(u64),
}

/// A destination that applies received batches to its own store.
///
/// Every batch is committed as one transaction with the change vectors it
/// arrived with. Replies carry the merged change vector of the store, which
/// is what a real destination reports back.
#[derive(Debug)]
pub struct ReferenceReceiver {
    store: MemoryChangeStore,
    mode: ReplyMode,
    last_etag_accepted: u64,
    messages: Vec<ReplicationMessage>,
}

impl ReferenceReceiver {
    /// Creates a receiver with an empty store.
    pub fn new() -> Self {
        Self::with_store(MemoryChangeStore::new())
    }

    /// Creates a receiver applying to `store`.
    pub fn with_store(store: MemoryChangeStore) -> Self {
        Self {
            store,
            mode: ReplyMode::Accept,
            last_etag_accepted: 0,
            messages: Vec::new(),
        }
    }

    /// Changes how later messages are answered.
    pub fn set_mode(&mut self, mode: ReplyMode) {
        self.mode = mode;
    }

    /// The destination store.
    pub fn store(&self) -> &MemoryChangeStore {
        &self.store
    }

    /// Every message received so far, in order.
    pub fn messages(&self) -> &[ReplicationMessage] {
        &self.messages
    }

    /// Every item received so far, across all batches.
    pub fn received_items(&self) -> Vec<&WireItem> {
        self.messages
            .iter()
            .filter_map(|message| match message {
                ReplicationMessage::Documents { items, .. } => Some(items),
                ReplicationMessage::Heartbeat(_) => None,
            })
            .flatten()
            .collect()
    }

    /// Keys of every received item, lossily decoded.
    pub fn received_keys(&self) -> Vec<String> {
        self.received_items()
            .into_iter()
            .map(|item| String::from_utf8_lossy(&item.key).into_owned())
            .collect()
    }

    /// Number of heartbeats received.
    pub fn heartbeats(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| matches!(m, ReplicationMessage::Heartbeat(_)))
            .count()
    }

    /// Last etag acknowledged with an `Ok` status.
    pub fn last_etag_accepted(&self) -> u64 {
        self.last_etag_accepted
    }

    /// Handles one decoded message and returns the reply to send.
    pub fn receive(&mut self, message: ReplicationMessage) -> ReplicationReply {
        let last_etag = message.header().last_etag;
        let reply = match &self.mode {
            ReplyMode::Reject(reason) => {
                ReplicationReply::error(self.last_etag_accepted, reason.clone())
            }
            ReplyMode::Conflict(reason) => ReplicationReply::conflict(
                self.last_etag_accepted,
                self.store.change_vector(),
                reason.clone(),
            ),
            ReplyMode::Accept | ReplyMode::WrongEtag(_) => {
                if let ReplicationMessage::Documents { items, .. } = &message {
                    self.apply(items);
                }
                let acked = match self.mode {
                    ReplyMode::WrongEtag(etag) => etag,
                    _ => last_etag,
                };
                self.last_etag_accepted = acked;
                ReplicationReply::ok(acked, self.store.change_vector())
            }
        };
        self.messages.push(message);
        reply
    }

    /// Decodes one message from the front of `bytes` and handles it.
    ///
    /// Returns the reply and the number of bytes consumed.
    pub fn receive_bytes(&mut self, bytes: &[u8]) -> CodecResult<(ReplicationReply, usize)> {
        let (message, consumed) = decode_message(bytes)?;
        Ok((self.receive(message), consumed))
    }

    fn apply(&self, items: &[WireItem]) {
        let mut batch = WriteBatch::new();
        for item in items {
            match &item.body {
                WireBody::Document(data) => {
                    batch.put_replicated(
                        item.key.clone(),
                        data.clone(),
                        item.change_vector.clone(),
                    );
                }
                WireBody::Tombstone { collection } => {
                    batch.delete_replicated(
                        item.key.clone(),
                        collection.clone(),
                        item.change_vector.clone(),
                    );
                }
            }
        }
        self.store.commit(batch);
    }
}

impl Default for ReferenceReceiver {
    fn default() -> Self {
        Self::new()
    }
}
