//! Error types for replication rounds.

use docrepl_codec::CodecError;
use docrepl_storage::StorageError;
use std::io;
use thiserror::Error;

/// Result type for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Errors that end a replication round.
///
/// None of them leave partial progress behind: destination knowledge is only
/// updated after a round fully succeeded.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Writing to, flushing or reading from the connection failed.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the round can be retried.
        retryable: bool,
    },

    /// An item's fixed part does not fit the scratch buffer.
    #[error("item {key} needs {required} contiguous bytes, scratch buffer holds {capacity}")]
    ItemTooLarge {
        /// Key of the offending item.
        key: String,
        /// Bytes the fixed part needs.
        required: usize,
        /// Scratch buffer capacity.
        capacity: usize,
    },

    /// The destination sent a malformed or mismatched reply.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The round was cancelled.
    #[error("replication round cancelled")]
    Cancelled,

    /// The destination refused the message.
    #[error("destination rejected the batch: {0}")]
    DestinationRejected(String),

    /// The destination reported a conflict.
    #[error("destination reported a conflict: {0}")]
    ConflictReported(String),

    /// Snapshot or knowledge store failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Encoding failure not caused by the connection.
    #[error("codec error: {0}")]
    Codec(CodecError),

    /// A round was started while another one was active.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Configuration values are out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The blocking task running a round panicked or was aborted.
    #[error("replication worker failed: {0}")]
    Worker(String),
}

impl ReplicationError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns true if running the round again may succeed.
    ///
    /// The replication core never retries; this only informs the caller's
    /// retry policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReplicationError::Transport { retryable, .. } => *retryable,
            ReplicationError::DestinationRejected(_) => true,
            ReplicationError::Storage(StorageError::Io(_)) => true,
            _ => false,
        }
    }
}

fn is_transient(kind: io::ErrorKind) -> bool {
    !matches!(
        kind,
        io::ErrorKind::InvalidInput
            | io::ErrorKind::InvalidData
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::Unsupported
    )
}

impl From<CodecError> for ReplicationError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io { kind, message } => Self::Transport {
                message,
                retryable: is_transient(kind),
            },
            CodecError::UnexpectedEof => Self::transport_retryable("connection closed"),
            other => Self::Codec(other),
        }
    }
}
