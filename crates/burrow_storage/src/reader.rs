//! Sequential reader over a storage backend.

use crate::backend::StorageBackend;
use std::io::{self, Read};

/// An [`io::Read`] cursor over a range of a [`StorageBackend`].
///
/// The reader snapshots the backend size at construction and stops there,
/// so bytes appended concurrently are not observed.
pub struct BackendReader<'a> {
    backend: &'a dyn StorageBackend,
    offset: u64,
    end: u64,
}

impl<'a> BackendReader<'a> {
    /// Creates a reader over `[offset, backend.size())`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be determined.
    pub fn new(backend: &'a dyn StorageBackend, offset: u64) -> io::Result<Self> {
        let end = backend.size().map_err(io::Error::other)?;
        Ok(Self {
            backend,
            offset: offset.min(end),
            end,
        })
    }

    /// Returns the offset of the next byte to be read.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.offset
    }
}

impl Read for BackendReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.end - self.offset;
        let len = (buf.len() as u64).min(remaining) as usize;
        if len == 0 {
            return Ok(0);
        }

        let data = self
            .backend
            .read_at(self.offset, len)
            .map_err(io::Error::other)?;
        buf[..len].copy_from_slice(&data);
        self.offset += len as u64;
        Ok(len)
    }
}
