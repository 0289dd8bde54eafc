//! Shared in-memory log.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// A log held in a byte buffer.
///
/// Clones share one buffer: hand a clone to a database and keep another to
/// inspect the records it appends, or seed one with [`with_data`] to replay
/// a prepared (possibly torn) log. Sync is a no-op and there is no path, so
/// a database on this backend is never auto-shrunk.
///
/// [`with_data`]: InMemoryBackend::with_data
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    buf: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log that already holds `bytes`.
    #[must_use]
    pub fn with_data(bytes: Vec<u8>) -> Self {
        Self {
            buf: Arc::new(RwLock::new(bytes)),
        }
    }

    /// Snapshot of the log contents.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.buf.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let buf = self.buf.read();
        let size = buf.len() as u64;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        match start.checked_add(len) {
            Some(end) if end <= buf.len() => Ok(buf[start..end].to_vec()),
            _ => Err(StorageError::ReadPastEnd { offset, len, size }),
        }
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut buf = self.buf.write();
        let at = buf.len() as u64;
        buf.extend_from_slice(bytes);
        Ok(at)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.buf.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut buf = self.buf.write();
        let size = buf.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        buf.truncate(new_size as usize);
        Ok(())
    }
}
