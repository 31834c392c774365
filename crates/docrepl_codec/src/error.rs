//! Error types for the codec crate.

use std::io;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A contiguous write does not fit the scratch buffer even when empty.
    #[error("{required} bytes do not fit a scratch buffer of {capacity} bytes")]
    CapacityExceeded {
        /// Bytes the write needs contiguously.
        required: usize,
        /// Total capacity of the scratch buffer.
        capacity: usize,
    },

    /// A fixed write was attempted without reserving space first.
    #[error("scratch buffer overflow: {required} bytes requested, {remaining} remaining")]
    Overflow {
        /// Bytes requested.
        required: usize,
        /// Bytes still free in the buffer.
        remaining: usize,
    },

    /// Unexpected end of input.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A length prefix exceeds what the decoder accepts.
    #[error("length {length} exceeds limit {limit}")]
    LengthLimit {
        /// Declared length.
        length: u64,
        /// Maximum accepted length.
        limit: u64,
    },

    /// Invalid frame structure.
    #[error("invalid structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// The underlying sink or source failed.
    #[error("I/O error ({kind:?}): {message}")]
    Io {
        /// Kind of the I/O error.
        kind: io::ErrorKind,
        /// Rendered I/O error.
        message: String,
    },
}

impl CodecError {
    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Returns true if this error came from the sink or source rather than the data.
    pub fn is_io(&self) -> bool {
        matches!(self, CodecError::Io { .. })
    }
}

impl From<io::Error> for CodecError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            return CodecError::UnexpectedEof;
        }
        CodecError::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_eof_maps_to_unexpected_eof() {
        let err: CodecError = io::Error::new(io::ErrorKind::UnexpectedEof, "short").into();
        assert_eq!(err, CodecError::UnexpectedEof);
        assert!(!err.is_io());
    }

    #[test]
    fn io_errors_keep_kind() {
        let err: CodecError = io::Error::new(io::ErrorKind::ConnectionReset, "reset").into();
        assert!(err.is_io());
        assert!(matches!(
            err,
            CodecError::Io {
                kind: io::ErrorKind::ConnectionReset,
                ..
            }
        ));
    }
}
