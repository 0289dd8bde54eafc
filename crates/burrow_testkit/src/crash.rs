//! Crash recovery testing for BurrowDB.
//!
//! This module provides utilities for testing crash recovery behavior.
//! It simulates failures at various points of a commit and verifies that
//! the log and the in-memory state stay consistent.
//!
//! ## Test Strategy
//!
//! 1. **Crash after commit** - Committed data survives a reopen
//! 2. **Torn tail** - A record cut short at the end of the log is dropped
//! 3. **Failed append** - A partial write is truncated away and the commit
//!    is rolled back
//! 4. **Failed truncate** - The database closes itself with a fatal error
//!
//! ## Usage
//!
//! ```rust,ignore
//! use burrow_testkit::crash::CrashRecoveryHarness;
//!
//! let mut harness = CrashRecoveryHarness::with_temp_dir()?;
//! for result in harness.run_all() {
//!     assert!(result.passed, "{result:?}");
//! }
//! ```

use crate::fixtures::LOG_FILE;
use burrow_core::{Config, CoreError, Database, SetOptions};
use burrow_storage::{FileBackend, StorageBackend, StorageError, StorageResult};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::TempDir;

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Expected keys after recovery.
    pub expected_keys: usize,
    /// Actual keys after recovery.
    pub actual_keys: usize,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(description: &str, keys: usize) -> Self {
        Self {
            passed: true,
            description: description.to_string(),
            expected_keys: keys,
            actual_keys: keys,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(description: &str, expected: usize, actual: usize, error: &str) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_keys: expected,
            actual_keys: actual,
            error: Some(error.to_string()),
        }
    }
}

/// Failure switches shared between a test and its [`CrashableBackend`].
#[derive(Debug)]
pub struct CrashControl {
    remaining: AtomicU64,
    crashed: AtomicBool,
    fail_truncate: AtomicBool,
    fail_sync: AtomicBool,
    syncs: AtomicUsize,
}

impl Default for CrashControl {
    fn default() -> Self {
        Self {
            remaining: AtomicU64::new(u64::MAX),
            crashed: AtomicBool::new(false),
            fail_truncate: AtomicBool::new(false),
            fail_sync: AtomicBool::new(false),
            syncs: AtomicUsize::new(0),
        }
    }
}

impl CrashControl {
    /// Lets `bytes` more bytes through, then fails the append that crosses
    /// the limit after writing its first part.
    pub fn crash_after(&self, bytes: u64) {
        self.remaining.store(bytes, Ordering::SeqCst);
    }

    /// Sets whether truncate should fail.
    pub fn set_fail_truncate(&self, fail: bool) {
        self.fail_truncate.store(fail, Ordering::SeqCst);
    }

    /// Sets whether sync should fail.
    pub fn set_fail_sync(&self, fail: bool) {
        self.fail_sync.store(fail, Ordering::SeqCst);
    }

    /// Resets every switch.
    pub fn reset(&self) {
        self.remaining.store(u64::MAX, Ordering::SeqCst);
        self.crashed.store(false, Ordering::SeqCst);
        self.fail_truncate.store(false, Ordering::SeqCst);
        self.fail_sync.store(false, Ordering::SeqCst);
    }

    /// Returns whether an append has failed.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Number of successful syncs.
    pub fn sync_count(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }
}

fn simulated(message: &str) -> StorageError {
    StorageError::Io(io::Error::new(io::ErrorKind::Other, message.to_string()))
}

/// A storage backend wrapper that can simulate crashes.
pub struct CrashableBackend {
    inner: Box<dyn StorageBackend>,
    control: Arc<CrashControl>,
}

impl CrashableBackend {
    /// Creates a new crashable backend wrapping an inner backend.
    pub fn new(inner: Box<dyn StorageBackend>) -> Self {
        Self {
            inner,
            control: Arc::new(CrashControl::default()),
        }
    }

    /// Returns the switches controlling this backend.
    pub fn control(&self) -> Arc<CrashControl> {
        Arc::clone(&self.control)
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let remaining = self.control.remaining.load(Ordering::SeqCst);
        let len = bytes.len() as u64;
        if len <= remaining {
            if remaining != u64::MAX {
                self.control.remaining.store(remaining - len, Ordering::SeqCst);
            }
            return self.inner.append(bytes);
        }

        self.control.crashed.store(true, Ordering::SeqCst);
        self.control.remaining.store(0, Ordering::SeqCst);
        if remaining > 0 {
            let _ = self.inner.append(&bytes[..remaining as usize]);
        }
        Err(simulated("simulated crash during partial write"))
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.control.fail_sync.load(Ordering::SeqCst) {
            return Err(simulated("simulated failure during sync"));
        }
        self.inner.sync()?;
        self.control.syncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if self.control.fail_truncate.load(Ordering::SeqCst) {
            return Err(simulated("simulated failure during truncate"));
        }
        self.inner.truncate(new_size)
    }

    fn path(&self) -> Option<&Path> {
        self.inner.path()
    }

    fn modified(&self) -> StorageResult<Option<SystemTime>> {
        self.inner.modified()
    }
}

/// Cuts `bytes` bytes off the end of the file at `path`, as a crash in
/// the middle of a write would.
pub fn tear_tail(path: &Path, bytes: u64) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path)?;
    let len = file.metadata()?.len();
    file.set_len(len.saturating_sub(bytes))?;
    file.sync_all()
}

/// Test harness for crash recovery scenarios.
pub struct CrashRecoveryHarness {
    dir: TempDir,
    /// Results of crash recovery tests.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a new harness with a temporary directory.
    pub fn with_temp_dir() -> io::Result<Self> {
        Ok(Self {
            dir: TempDir::new()?,
            results: Vec::new(),
        })
    }

    /// Path of the log under test.
    pub fn log_path(&self) -> PathBuf {
        self.dir.path().join(LOG_FILE)
    }

    fn open_fresh(&self) -> Result<(Database, Arc<CrashControl>), CoreError> {
        let path = self.log_path();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let backend = CrashableBackend::new(Box::new(FileBackend::open(&path)?));
        let control = backend.control();
        let db = Database::open_with_backend(Box::new(backend), Config::default())?;
        Ok((db, control))
    }

    fn reopen(&self) -> Result<Database, CoreError> {
        Database::open(self.log_path())
    }

    fn put(db: &Database, key: &str) -> Result<(), CoreError> {
        db.update(|tx| {
            tx.set(key.as_bytes(), b"value", SetOptions::new())?;
            Ok(())
        })
    }

    fn count(db: &Database) -> Result<usize, CoreError> {
        db.view(|tx| tx.len())
    }

    fn record(&mut self, description: &str, expected: usize, outcome: Result<usize, CoreError>) -> CrashRecoveryResult {
        let result = match outcome {
            Ok(actual) if actual == expected => CrashRecoveryResult::pass(description, actual),
            Ok(actual) => CrashRecoveryResult::fail(description, expected, actual, "key count mismatch"),
            Err(err) => CrashRecoveryResult::fail(description, expected, 0, &err.to_string()),
        };
        self.results.push(result.clone());
        result
    }

    /// Tests that committed data survives a reopen.
    pub fn test_committed_data_survives(&mut self) -> CrashRecoveryResult {
        let outcome = (|| {
            let (db, _) = self.open_fresh()?;
            for i in 0..10 {
                Self::put(&db, &format!("key:{i}"))?;
            }
            drop(db);
            Self::count(&self.reopen()?)
        })();
        self.record("committed data survives reopen", 10, outcome)
    }

    /// Tests that a record cut short at the end of the log is dropped and
    /// the log is truncated to the last whole record.
    pub fn test_torn_tail_is_dropped(&mut self) -> CrashRecoveryResult {
        let outcome = (|| {
            let (db, _) = self.open_fresh()?;
            for i in 0..5 {
                Self::put(&db, &format!("key:{i}"))?;
            }
            drop(db);
            tear_tail(&self.log_path(), 3)?;

            let db = self.reopen()?;
            Self::put(&db, "after")?;
            drop(db);
            Self::count(&self.reopen()?)
        })();
        self.record("torn tail is dropped on open", 5, outcome)
    }

    /// Tests that a failed append rolls the commit back and leaves no
    /// partial record in the log.
    pub fn test_failed_append_rolls_back(&mut self) -> CrashRecoveryResult {
        let outcome = (|| {
            let (db, control) = self.open_fresh()?;
            Self::put(&db, "before")?;
            control.crash_after(4);
            if Self::put(&db, "lost").is_ok() {
                return Err(CoreError::invalid_operation("commit should have failed"));
            }
            control.reset();
            Self::put(&db, "after")?;
            let live = Self::count(&db)?;
            drop(db);
            let reopened = Self::count(&self.reopen()?)?;
            if live != reopened {
                return Err(CoreError::invalid_operation("memory and log disagree"));
            }
            Ok(reopened)
        })();
        self.record("failed append rolls back", 2, outcome)
    }

    /// Tests that a failed truncate after a failed append closes the
    /// database with a fatal error.
    pub fn test_failed_truncate_is_fatal(&mut self) -> CrashRecoveryResult {
        let outcome = (|| {
            let (db, control) = self.open_fresh()?;
            Self::put(&db, "before")?;
            control.crash_after(4);
            control.set_fail_truncate(true);
            match Self::put(&db, "lost") {
                Err(err) if err.is_fatal() => {}
                Err(err) => return Err(err),
                Ok(()) => return Err(CoreError::invalid_operation("commit should have failed")),
            }
            if db.is_open() {
                return Err(CoreError::invalid_operation("database should be closed"));
            }
            drop(db);
            Self::count(&self.reopen()?)
        })();
        self.record("failed truncate is fatal", 1, outcome)
    }

    /// Runs every scenario.
    pub fn run_all(&mut self) -> Vec<CrashRecoveryResult> {
        vec![
            self.test_committed_data_survives(),
            self.test_torn_tail_is_dropped(),
            self.test_failed_append_rolls_back(),
            self.test_failed_truncate_is_fatal(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_storage::InMemoryBackend;

    #[test]
    fn test_crash_after_writes_partial() {
        let memory = InMemoryBackend::new();
        let mut backend = CrashableBackend::new(Box::new(memory.clone()));
        let control = backend.control();

        backend.append(b"abc").unwrap();
        control.crash_after(2);
        assert!(backend.append(b"defg").is_err());
        assert!(control.has_crashed());
        assert_eq!(memory.data(), b"abcde");

        control.reset();
        backend.append(b"h").unwrap();
        assert_eq!(memory.data(), b"abcdeh");
    }

    #[test]
    fn test_failure_switches() {
        let mut backend = CrashableBackend::new(Box::new(InMemoryBackend::new()));
        let control = backend.control();
        backend.append(b"abc").unwrap();

        control.set_fail_truncate(true);
        assert!(backend.truncate(1).is_err());
        control.set_fail_sync(true);
        assert!(backend.sync().is_err());
        assert_eq!(control.sync_count(), 0);

        control.reset();
        backend.sync().unwrap();
        backend.truncate(1).unwrap();
        assert_eq!(backend.size().unwrap(), 1);
        assert_eq!(control.sync_count(), 1);
    }

    #[test]
    fn test_crash_recovery_harness() {
        let mut harness = CrashRecoveryHarness::with_temp_dir().unwrap();
        for result in harness.run_all() {
            assert!(result.passed, "{result:?}");
        }
        assert_eq!(harness.results.len(), 4);
    }
}
