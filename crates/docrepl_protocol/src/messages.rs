//! Replication wire messages.
//!
//! A batch is a [`MessageHeader`] followed by `item_count` items. A heartbeat
//! is a header alone. The destination answers every message with a
//! [`ReplicationReply`]. All integers are little-endian:
//!
//! ```text
//! header:  [kind:u8][last_etag:u64][last_index_or_transformer_etag:u64][item_count:i32]
//! item:    [cv_count:i32][(node:16)(counter:u64)]*[transaction_marker:i16]
//!          [key_size:i32][key][payload_size:i32]
//!            document:  payload_size >= 0, payload bytes follow
//!            tombstone: payload_size == -1, then [collection_size:i32][collection]
//! reply:   [status:u8][last_etag_accepted:u64][cv_count:i32][entries]
//!          [message_size:i32][message]          (message_size == -1: no message)
//! ```

use crate::change_vector::{ChangeVector, ChangeVectorEntry, NodeId};
use crate::item::ChangeItem;
use bytes::Bytes;
use docrepl_codec::{
    ByteSource, CodecError, CodecResult, ScratchBuffer, ScratchWriter, SliceReader,
    MAX_FIELD_LENGTH,
};
use std::io::Write;

/// Payload size written in place of a document length for tombstones.
pub const TOMBSTONE_PAYLOAD_SIZE: i32 = -1;

/// Message size written when a reply carries no message.
const NO_MESSAGE: i32 = -1;

/// Kind of a replication message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// A batch of documents and tombstones.
    Documents,
    /// Progress notification without items.
    Heartbeat,
}

impl MessageKind {
    /// Returns the wire code.
    pub fn code(self) -> u8 {
        match self {
            MessageKind::Documents => 1,
            MessageKind::Heartbeat => 2,
        }
    }

    /// Parses a wire code.
    pub fn from_code(code: u8) -> CodecResult<Self> {
        match code {
            1 => Ok(MessageKind::Documents),
            2 => Ok(MessageKind::Heartbeat),
            other => Err(CodecError::invalid_structure(format!(
                "unknown message kind {other}"
            ))),
        }
    }
}

/// Header that opens every replication message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Message kind.
    pub kind: MessageKind,
    /// Etag of the last write the source considered for this message.
    pub last_etag: u64,
    /// Last index/transformer definition etag sent to this destination.
    pub last_index_or_transformer_etag: u64,
    /// Number of items following the header.
    pub item_count: i32,
}

impl MessageHeader {
    /// Size of the header on the wire.
    pub const WIRE_SIZE: usize = 1 + 8 + 8 + 4;

    /// Header for a batch of `item_count` items.
    pub fn documents(
        last_etag: u64,
        last_index_or_transformer_etag: u64,
        item_count: usize,
    ) -> CodecResult<Self> {
        Ok(Self {
            kind: MessageKind::Documents,
            last_etag,
            last_index_or_transformer_etag,
            item_count: wire_len(item_count)?,
        })
    }

    /// Header of a heartbeat.
    pub fn heartbeat(last_etag: u64, last_index_or_transformer_etag: u64) -> Self {
        Self {
            kind: MessageKind::Heartbeat,
            last_etag,
            last_index_or_transformer_etag,
            item_count: 0,
        }
    }

    /// Writes the header.
    pub fn write<W: Write>(&self, writer: &mut ScratchWriter<'_, W>) -> CodecResult<()> {
        writer.reserve(Self::WIRE_SIZE)?;
        writer.put_u8(self.kind.code())?;
        writer.put_u64(self.last_etag)?;
        writer.put_u64(self.last_index_or_transformer_etag)?;
        writer.put_i32(self.item_count)
    }

    /// Reads a header.
    pub fn read<S: ByteSource>(source: &mut S) -> CodecResult<Self> {
        let kind = MessageKind::from_code(source.read_u8()?)?;
        let last_etag = source.read_u64()?;
        let last_index_or_transformer_etag = source.read_u64()?;
        let item_count = source.read_i32()?;
        if item_count < 0 {
            return Err(CodecError::invalid_structure(format!(
                "negative item count {item_count}"
            )));
        }
        if kind == MessageKind::Heartbeat && item_count != 0 {
            return Err(CodecError::invalid_structure("heartbeat carries items"));
        }
        Ok(Self {
            kind,
            last_etag,
            last_index_or_transformer_etag,
            item_count,
        })
    }
}

/// Bytes an item needs contiguously in the scratch buffer.
///
/// Covers everything except the document body, which is streamed.
pub fn item_fixed_size<P>(item: &ChangeItem<P>) -> usize {
    let common = 4 + item.change_vector().wire_size() + 2 + 4 + item.key().len() + 4;
    match item {
        ChangeItem::Document(_) => common,
        ChangeItem::Tombstone(tomb) => common + 4 + tomb.collection.len(),
    }
}

/// Writes one item.
///
/// # Errors
///
/// Returns [`CodecError::CapacityExceeded`] before writing anything if the
/// fixed part of the item does not fit the scratch buffer.
pub fn write_item<W, P>(writer: &mut ScratchWriter<'_, W>, item: &ChangeItem<P>) -> CodecResult<()>
where
    W: Write,
    P: AsRef<[u8]>,
{
    writer.reserve(item_fixed_size(item))?;

    let change_vector = item.change_vector();
    writer.put_i32(wire_len(change_vector.len())?)?;
    put_entries(writer, change_vector)?;
    writer.put_i16(item.transaction_marker())?;
    writer.put_i32(wire_len(item.key().len())?)?;
    writer.put_slice(item.key())?;

    match item {
        ChangeItem::Document(doc) => {
            let data = doc.data.as_ref();
            writer.put_i32(wire_len(data.len())?)?;
            writer.stream(data)
        }
        ChangeItem::Tombstone(tomb) => {
            writer.put_i32(TOMBSTONE_PAYLOAD_SIZE)?;
            writer.put_i32(wire_len(tomb.collection.len())?)?;
            writer.put_slice(&tomb.collection)
        }
    }
}

fn put_entries<W: Write>(
    writer: &mut ScratchWriter<'_, W>,
    change_vector: &ChangeVector,
) -> CodecResult<()> {
    for entry in change_vector.entries() {
        writer.put_slice(entry.node.as_bytes())?;
        writer.put_u64(entry.counter)?;
    }
    Ok(())
}

fn read_change_vector<S: ByteSource>(source: &mut S) -> CodecResult<ChangeVector> {
    let count = source.read_length()?;
    let size = count as u64 * ChangeVectorEntry::WIRE_SIZE as u64;
    if size > MAX_FIELD_LENGTH {
        return Err(CodecError::LengthLimit {
            length: size,
            limit: MAX_FIELD_LENGTH,
        });
    }
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let node = NodeId::from_bytes(source.read_array::<16>()?);
        let counter = source.read_u64()?;
        entries.push(ChangeVectorEntry::new(node, counter));
    }
    Ok(ChangeVector::from_entries(entries))
}

fn wire_len(len: usize) -> CodecResult<i32> {
    i32::try_from(len).map_err(|_| CodecError::LengthLimit {
        length: len as u64,
        limit: i32::MAX as u64,
    })
}

/// Body of a decoded item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireBody {
    /// Document payload.
    Document(Bytes),
    /// Deletion in the given collection.
    Tombstone {
        /// Collection of the deleted document.
        collection: Bytes,
    },
}

/// An item as it appears on the wire.
///
/// Etags are not transmitted per item; the header's `last_etag` covers the
/// whole batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireItem {
    /// Change vector of the write.
    pub change_vector: ChangeVector,
    /// Transaction marker of the write.
    pub transaction_marker: i16,
    /// Document key.
    pub key: Bytes,
    /// Payload or tombstone collection.
    pub body: WireBody,
}

impl WireItem {
    /// Reads one item.
    pub fn read<S: ByteSource>(source: &mut S) -> CodecResult<Self> {
        let change_vector = read_change_vector(source)?;
        let transaction_marker = source.read_i16()?;
        let key_len = source.read_length()?;
        let key = source.read_bytes(key_len)?;
        let payload_size = source.read_i32()?;
        let body = match payload_size {
            TOMBSTONE_PAYLOAD_SIZE => {
                let len = source.read_length()?;
                WireBody::Tombstone {
                    collection: source.read_bytes(len)?,
                }
            }
            size if size >= 0 => WireBody::Document(source.read_bytes(size as usize)?),
            size => {
                return Err(CodecError::invalid_structure(format!(
                    "invalid payload size {size}"
                )))
            }
        };
        Ok(Self {
            change_vector,
            transaction_marker,
            key,
            body,
        })
    }

    /// Returns true for tombstones.
    pub fn is_tombstone(&self) -> bool {
        matches!(self.body, WireBody::Tombstone { .. })
    }
}

impl<P: AsRef<[u8]>> From<&ChangeItem<P>> for WireItem {
    fn from(item: &ChangeItem<P>) -> Self {
        let body = match item {
            ChangeItem::Document(doc) => {
                WireBody::Document(Bytes::copy_from_slice(doc.data.as_ref()))
            }
            ChangeItem::Tombstone(tomb) => WireBody::Tombstone {
                collection: tomb.collection.clone(),
            },
        };
        Self {
            change_vector: item.change_vector().clone(),
            transaction_marker: item.transaction_marker(),
            key: item.key().clone(),
            body,
        }
    }
}

/// A decoded replication message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationMessage {
    /// A batch with its items.
    Documents {
        /// Batch header.
        header: MessageHeader,
        /// Items in wire order.
        items: Vec<WireItem>,
    },
    /// A heartbeat.
    Heartbeat(MessageHeader),
}

impl ReplicationMessage {
    /// Returns the header.
    pub fn header(&self) -> &MessageHeader {
        match self {
            ReplicationMessage::Documents { header, .. } => header,
            ReplicationMessage::Heartbeat(header) => header,
        }
    }

    /// Reads a complete message.
    pub fn read<S: ByteSource>(source: &mut S) -> CodecResult<Self> {
        let header = MessageHeader::read(source)?;
        match header.kind {
            MessageKind::Heartbeat => Ok(ReplicationMessage::Heartbeat(header)),
            MessageKind::Documents => {
                let count = header.item_count as usize;
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    items.push(WireItem::read(source)?);
                }
                Ok(ReplicationMessage::Documents { header, items })
            }
        }
    }
}

/// Decodes one message from the start of `bytes`.
///
/// Returns the message and the number of bytes it occupied.
pub fn decode_message(bytes: &[u8]) -> CodecResult<(ReplicationMessage, usize)> {
    let mut reader = SliceReader::new(bytes);
    let message = ReplicationMessage::read(&mut reader)?;
    Ok((message, reader.position()))
}

/// Outcome reported by the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    /// The message was applied.
    Ok,
    /// The destination rejected the message.
    Error,
    /// The destination detected a conflict it could not resolve.
    Conflict,
}

impl ReplyStatus {
    /// Returns the wire code.
    pub fn code(self) -> u8 {
        match self {
            ReplyStatus::Ok => 0,
            ReplyStatus::Error => 1,
            ReplyStatus::Conflict => 2,
        }
    }

    /// Parses a wire code.
    pub fn from_code(code: u8) -> CodecResult<Self> {
        match code {
            0 => Ok(ReplyStatus::Ok),
            1 => Ok(ReplyStatus::Error),
            2 => Ok(ReplyStatus::Conflict),
            other => Err(CodecError::invalid_structure(format!(
                "unknown reply status {other}"
            ))),
        }
    }
}

/// Acknowledgement sent by the destination after each message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationReply {
    /// Outcome.
    pub status: ReplyStatus,
    /// Last etag the destination has recorded from this source.
    pub last_etag_accepted: u64,
    /// The destination's current change vector.
    pub change_vector: ChangeVector,
    /// Error or conflict description.
    pub message: Option<String>,
}

impl ReplicationReply {
    /// A successful reply.
    pub fn ok(last_etag_accepted: u64, change_vector: ChangeVector) -> Self {
        Self {
            status: ReplyStatus::Ok,
            last_etag_accepted,
            change_vector,
            message: None,
        }
    }

    /// A rejection.
    pub fn error(last_etag_accepted: u64, message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            last_etag_accepted,
            change_vector: ChangeVector::new(),
            message: Some(message.into()),
        }
    }

    /// A conflict report.
    pub fn conflict(
        last_etag_accepted: u64,
        change_vector: ChangeVector,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status: ReplyStatus::Conflict,
            last_etag_accepted,
            change_vector,
            message: Some(message.into()),
        }
    }

    /// Writes the reply.
    pub fn write<W: Write>(&self, writer: &mut ScratchWriter<'_, W>) -> CodecResult<()> {
        writer.reserve(1 + 8 + 4)?;
        writer.put_u8(self.status.code())?;
        writer.put_u64(self.last_etag_accepted)?;
        writer.put_i32(wire_len(self.change_vector.len())?)?;
        for entry in self.change_vector.entries() {
            writer.reserve(ChangeVectorEntry::WIRE_SIZE)?;
            writer.put_slice(entry.node.as_bytes())?;
            writer.put_u64(entry.counter)?;
        }
        writer.reserve(4)?;
        match &self.message {
            Some(message) => {
                writer.put_i32(wire_len(message.len())?)?;
                writer.stream(message.as_bytes())
            }
            None => writer.put_i32(NO_MESSAGE),
        }
    }

    /// Encodes the reply into a new buffer.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let mut scratch = ScratchBuffer::new(256);
        let mut out = Vec::new();
        let mut writer = scratch.writer(&mut out);
        self.write(&mut writer)?;
        writer.finish()?;
        Ok(out)
    }

    /// Reads a reply.
    pub fn read<S: ByteSource>(source: &mut S) -> CodecResult<Self> {
        let status = ReplyStatus::from_code(source.read_u8()?)?;
        let last_etag_accepted = source.read_u64()?;
        let change_vector = read_change_vector(source)?;
        let message = match source.read_i32()? {
            NO_MESSAGE => None,
            len if len >= 0 => {
                let bytes = source.read_bytes(len as usize)?;
                Some(
                    String::from_utf8(bytes.to_vec())
                        .map_err(|_| CodecError::invalid_structure("reply message is not UTF-8"))?,
                )
            }
            len => {
                return Err(CodecError::invalid_structure(format!(
                    "invalid message size {len}"
                )))
            }
        };
        Ok(Self {
            status,
            last_etag_accepted,
            change_vector,
            message,
        })
    }

    /// Decodes a reply from a byte slice.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        Self::read(&mut SliceReader::new(bytes))
    }
}
