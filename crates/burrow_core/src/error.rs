//! Error types for BurrowDB core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in BurrowDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] burrow_storage::StorageError),

    /// Log codec error.
    #[error("codec error: {0}")]
    Codec(#[from] burrow_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The key or index does not exist, or the key has expired.
    #[error("not found")]
    NotFound,

    /// The transaction was already committed or rolled back.
    #[error("transaction closed")]
    TxClosed,

    /// A mutation was attempted in a read-only transaction.
    #[error("transaction is not writable")]
    TxNotWritable,

    /// A mutation was attempted while a scan of the same transaction is
    /// running.
    #[error("transaction is currently iterating")]
    TxIterating,

    /// The database has been closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// An index with the same name already exists.
    #[error("index already exists")]
    IndexExists,

    /// The operation is not allowed.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of what was rejected.
        message: String,
    },

    /// An unrecognized sync policy was supplied.
    #[error("invalid sync policy: {value}")]
    InvalidSyncPolicy {
        /// The rejected value.
        value: String,
    },

    /// A shrink is already running.
    #[error("shrink is in process")]
    ShrinkInProcess,

    /// `load` was called on a disk-backed database.
    #[error("persistence is active")]
    PersistenceActive,

    /// The log contains a malformed record.
    #[error("invalid database log: {message}")]
    Invalid {
        /// Description of the corruption.
        message: String,
    },

    /// A managed transaction callback aborted.
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },

    /// The on-disk log may no longer match memory.
    ///
    /// The database closes itself when this is returned; the host is
    /// expected to stop the process.
    #[error("fatal storage failure: {message}")]
    Fatal {
        /// What failed.
        message: String,
    },
}

impl CoreError {
    /// Create an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Create an invalid log error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create an aborted error, for returning from `update`/`view` callbacks.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Create a fatal error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Returns true for [`CoreError::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Returns true for [`CoreError::Fatal`].
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    /// Converts a decode failure into the engine taxonomy.
    pub(crate) fn from_codec(err: burrow_codec::CodecError) -> Self {
        match err {
            burrow_codec::CodecError::Invalid { message } => Self::Invalid { message },
            other => Self::Codec(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(CoreError::NotFound.to_string(), "not found");
        assert_eq!(
            CoreError::invalid_operation("dropping primary").to_string(),
            "invalid operation: dropping primary"
        );
        assert!(CoreError::fatal("rename").is_fatal());
    }

    #[test]
    fn codec_invalid_maps_to_invalid() {
        let err = CoreError::from_codec(burrow_codec::CodecError::invalid("bad"));
        assert!(matches!(err, CoreError::Invalid { .. }));

        let err = CoreError::from_codec(burrow_codec::CodecError::UnexpectedEof);
        assert!(matches!(err, CoreError::Codec(_)));
    }
}
