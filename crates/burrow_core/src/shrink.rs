//! Log compaction.
//!
//! Shrink rewrites the log as one `SET` per live item while writers keep
//! committing:
//!
//! 1. Under the lock, note the current end of the log.
//! 2. Copy the items into `<log>.tmp` in chunks, taking a shared lock per
//!    chunk so writers are never blocked for long.
//! 3. Under the exclusive lock, append everything committed since step 1
//!    to the temporary file and rename it over the log.

use crate::aof::{encode_item, AppendLog};
use crate::error::{CoreError, CoreResult};
use crate::shared::Shared;
use burrow_codec::CommandEncoder;
use burrow_storage::{FileBackend, StorageBackend};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;
use tracing::{error, info, warn};

/// Most items written per chunk.
const CHUNK_ITEMS: usize = 1000;

/// Most encoded bytes buffered per chunk.
const CHUNK_BYTES: usize = 64 * 1024 * 1024;

/// Read size when copying the log tail.
const TAIL_COPY_BYTES: u64 = 1024 * 1024;

/// Clears the shrinking flag when dropped.
struct ShrinkingFlag<'a>(&'a AtomicBool);

impl Drop for ShrinkingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Path of the temporary file a shrink of `path` writes to.
pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

impl Shared {
    /// Compacts the log.
    ///
    /// Does nothing for databases without persistence.
    pub(crate) fn shrink(&self) -> CoreResult<()> {
        let (path, end) = {
            let state = self.state.read();
            if state.closed {
                return Err(CoreError::DatabaseClosed);
            }
            let Some(log) = state.log.as_ref() else {
                return Ok(());
            };
            let Some(path) = log.path() else {
                return Err(CoreError::invalid_operation(
                    "shrink requires a file-backed log",
                ));
            };
            let end = log.size()?;
            if self
                .shrinking
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return Err(CoreError::ShrinkInProcess);
            }
            (path.to_path_buf(), end)
        };
        let _flag = ShrinkingFlag(&self.shrinking);

        let tmp = tmp_path(&path);
        let result = self.rewrite(&path, &tmp, end);
        if let Err(err) = fs::remove_file(&tmp) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %tmp.display(), error = %err, "failed to remove shrink file");
            }
        }
        result
    }

    fn rewrite(&self, path: &Path, tmp: &Path, end: u64) -> CoreResult<()> {
        info!(path = %path.display(), size = end, "shrinking database log");
        let mut out = FileBackend::create(tmp)?;
        let mut encoder = CommandEncoder::new();
        let mut pivot: Option<Vec<u8>> = None;

        loop {
            {
                let state = self.state.read();
                if state.closed {
                    return Err(CoreError::DatabaseClosed);
                }
                let start = pivot.take();
                let lower = start.as_deref().map_or(Bound::Unbounded, Bound::Included);
                let now = SystemTime::now();
                let mut written = 0;
                for item in state.keyspace.keys.range(lower, Bound::Unbounded) {
                    if written >= CHUNK_ITEMS || encoder.len() >= CHUNK_BYTES {
                        pivot = Some(item.key.clone());
                        break;
                    }
                    encode_item(&mut encoder, item, now);
                    written += 1;
                }
            }

            if !encoder.is_empty() {
                out.append(encoder.as_bytes())?;
                encoder.clear();
            }
            if pivot.is_none() {
                break;
            }
        }

        let mut state = self.state.write();
        if state.closed {
            return Err(CoreError::DatabaseClosed);
        }
        let state = &mut *state;
        let Some(log) = state.log.as_mut() else {
            return Err(CoreError::DatabaseClosed);
        };

        let size = log.size()?;
        let mut offset = end;
        while offset < size {
            let len = (size - offset).min(TAIL_COPY_BYTES);
            let chunk = log.backend().read_at(offset, len as usize)?;
            out.append(&chunk)?;
            offset += len;
        }
        out.flush()?;
        out.sync()?;
        drop(out);

        // The old handle holds the file lock, so it goes first.
        if let Some(mut old) = state.log.take() {
            if let Err(err) = old.sync() {
                warn!(error = %err, "failed to sync database log before swap");
            }
        }
        if let Err(err) = fs::rename(tmp, path) {
            state.closed = true;
            error!(error = %err, "failed to replace database log with shrunk copy");
            return Err(CoreError::fatal(format!("rename of shrunk log failed: {err}")));
        }
        let backend = match FileBackend::open(path) {
            Ok(backend) => backend,
            Err(err) => {
                state.closed = true;
                error!(error = %err, "failed to reopen shrunk database log");
                return Err(CoreError::fatal(format!("reopen of shrunk log failed: {err}")));
            }
        };

        let shrunk = backend.size()?;
        state.log = Some(AppendLog::new(Box::new(backend)));
        state.last_aof_size = shrunk;
        info!(before = size, after = shrunk, "database log shrunk");
        Ok(())
    }
}
