//! Error types for the codec crate.

use std::io;
use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while decoding log records.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The input ended in the middle of a record.
    ///
    /// This is the signature of a crash during an append and is recoverable
    /// by truncating the log to the last complete record.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// A record does not follow the wire format.
    #[error("invalid record: {message}")]
    Invalid {
        /// Description of the format violation.
        message: String,
    },

    /// The underlying reader failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CodecError {
    /// Create an invalid record error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Returns true if the input ended mid-record.
    #[must_use]
    pub fn is_unexpected_eof(&self) -> bool {
        matches!(self, Self::UnexpectedEof)
    }
}
