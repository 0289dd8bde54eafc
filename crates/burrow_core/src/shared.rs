//! State shared by database handles, transactions and the background
//! thread.

use crate::aof::AppendLog;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::keyspace::Keyspace;
use crate::transaction::{StateGuard, Tx};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use tracing::warn;

/// Everything guarded by the database lock.
#[derive(Debug)]
pub(crate) struct DbState {
    pub(crate) keyspace: Keyspace,
    /// `None` for databases without persistence, and after close.
    pub(crate) log: Option<AppendLog>,
    pub(crate) config: Config,
    pub(crate) closed: bool,
    /// Number of commits written to the log.
    pub(crate) flushes: u64,
    /// Log size after the last load or shrink.
    pub(crate) last_aof_size: u64,
}

impl DbState {
    pub(crate) fn new(keyspace: Keyspace, log: Option<AppendLog>, last_aof_size: u64, config: Config) -> Self {
        Self {
            keyspace,
            log,
            config,
            closed: false,
            flushes: 0,
            last_aof_size,
        }
    }
}

/// The lock-protected state plus the coordination primitives around it.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) state: RwLock<DbState>,
    /// Set while a shrink runs; shrink holds the lock only briefly.
    pub(crate) shrinking: AtomicBool,
    shutdown: Mutex<bool>,
    wake: Condvar,
}

impl Shared {
    pub(crate) fn new(state: DbState) -> Self {
        Self {
            state: RwLock::new(state),
            shrinking: AtomicBool::new(false),
            shutdown: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    /// Starts a transaction, blocking until the lock is available.
    pub(crate) fn begin(&self, writable: bool) -> CoreResult<Tx<'_>> {
        let guard = if writable {
            StateGuard::Write(self.state.write())
        } else {
            StateGuard::Read(self.state.read())
        };
        let tx = Tx::new(guard);
        if tx.state()?.closed {
            return Err(CoreError::DatabaseClosed);
        }
        Ok(tx)
    }

    /// Runs `f` in a writable transaction, committing on `Ok` and rolling
    /// back on `Err`.
    pub(crate) fn update<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Tx<'_>) -> CoreResult<T>,
    {
        let mut tx = self.begin(true)?;
        tx.set_managed(true);
        let result = f(&mut tx);
        tx.set_managed(false);
        match result {
            Ok(value) => {
                tx.commit_inner()?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx.rollback_inner();
                Err(err)
            }
        }
    }

    /// Runs `f` in a read-only transaction.
    pub(crate) fn view<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Tx<'_>) -> CoreResult<T>,
    {
        let mut tx = self.begin(false)?;
        tx.set_managed(true);
        let result = f(&tx);
        tx.set_managed(false);
        let _ = tx.rollback_inner();
        result
    }

    /// Sleeps for up to `period`, returning true once shutdown is
    /// requested.
    pub(crate) fn wait_tick(&self, period: Duration) -> bool {
        let mut stop = self.shutdown.lock();
        if !*stop {
            self.wake.wait_for(&mut stop, period);
        }
        *stop
    }

    /// Requests shutdown and wakes the background thread. Returns false if
    /// shutdown was already requested.
    pub(crate) fn request_shutdown(&self) -> bool {
        let mut stop = self.shutdown.lock();
        if *stop {
            return false;
        }
        *stop = true;
        self.wake.notify_all();
        true
    }

    /// Marks the state closed, syncs and releases the log, and frees the
    /// keyspace.
    pub(crate) fn close_state(&self) {
        let mut state = self.state.write();
        state.closed = true;
        if let Some(mut log) = state.log.take() {
            if let Err(err) = log.sync() {
                warn!(error = %err, "failed to sync database log on close");
            }
        }
        state.keyspace = Keyspace::new();
    }
}
