//! Log writer with partial-write undo.

use crate::error::{CoreError, CoreResult};
use burrow_storage::StorageBackend;
use std::fmt;
use std::path::Path;
use tracing::error;

/// The open append-only log of a database.
pub(crate) struct AppendLog {
    backend: Box<dyn StorageBackend>,
}

impl AppendLog {
    pub(crate) fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub(crate) fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    /// Path of the log file, if the backend is file-backed.
    pub(crate) fn path(&self) -> Option<&Path> {
        self.backend.path()
    }

    pub(crate) fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.size()?)
    }

    /// Appends one commit worth of commands.
    ///
    /// A failed write is undone by truncating back to the previous size so
    /// the log never ends in a partial commit.
    ///
    /// # Errors
    ///
    /// Returns the write error after a successful undo, or
    /// [`CoreError::Fatal`] if the undo itself failed.
    pub(crate) fn write_batch(&mut self, batch: &[u8]) -> CoreResult<()> {
        let before = self.backend.size()?;
        let written = self
            .backend
            .append(batch)
            .and_then(|_| self.backend.flush());
        let Err(err) = written else {
            return Ok(());
        };

        error!(error = %err, size = before, "failed to append commit to database log");
        if let Err(undo) = self.backend.truncate(before) {
            error!(error = %undo, "failed to truncate partial commit from database log");
            return Err(CoreError::fatal(format!(
                "log may hold a partial commit: write failed ({err}) and truncate failed ({undo})"
            )));
        }
        Err(err.into())
    }

    pub(crate) fn sync(&mut self) -> CoreResult<()> {
        Ok(self.backend.sync()?)
    }

    pub(crate) fn truncate(&mut self, size: u64) -> CoreResult<()> {
        Ok(self.backend.truncate(size)?)
    }
}

impl fmt::Debug for AppendLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppendLog")
            .field("path", &self.path())
            .field("size", &self.backend.size().ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_storage::{InMemoryBackend, StorageResult};

    /// Backend whose appends land halfway and then fail.
    struct TornBackend {
        inner: InMemoryBackend,
        fail_truncate: bool,
    }

    impl StorageBackend for TornBackend {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.inner.read_at(offset, len)
        }

        fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
            self.inner.append(&data[..data.len() / 2])?;
            Err(std::io::Error::other("disk full").into())
        }

        fn flush(&mut self) -> StorageResult<()> {
            Ok(())
        }

        fn size(&self) -> StorageResult<u64> {
            self.inner.size()
        }

        fn sync(&mut self) -> StorageResult<()> {
            Ok(())
        }

        fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
            if self.fail_truncate {
                return Err(std::io::Error::other("read-only filesystem").into());
            }
            self.inner.truncate(new_size)
        }
    }

    #[test]
    fn write_batch_appends() {
        let mut log = AppendLog::new(Box::new(InMemoryBackend::new()));
        log.write_batch(b"*1\r\n$7\r\nflushdb\r\n").unwrap();
        assert_eq!(log.size().unwrap(), 17);
        assert!(log.path().is_none());
    }

    #[test]
    fn failed_write_is_truncated() {
        let inner = InMemoryBackend::with_data(b"prefix".to_vec());
        let mut log = AppendLog::new(Box::new(TornBackend {
            inner: inner.clone(),
            fail_truncate: false,
        }));

        let err = log.write_batch(b"0123456789").unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
        assert_eq!(inner.data(), b"prefix");
    }

    #[test]
    fn failed_truncate_is_fatal() {
        let mut log = AppendLog::new(Box::new(TornBackend {
            inner: InMemoryBackend::new(),
            fail_truncate: true,
        }));
        assert!(log.write_batch(b"0123456789").unwrap_err().is_fatal());
    }
}
