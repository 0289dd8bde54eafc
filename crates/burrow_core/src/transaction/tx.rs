//! Transaction handle.

use crate::aof::encode_item;
use crate::config::SyncPolicy;
use crate::error::{CoreError, CoreResult};
use crate::index::{compose_less, Index, LessFn, RectFn};
use crate::keyspace::Keyspace;
use crate::shared::DbState;
use crate::transaction::state::WriteContext;
use crate::types::{IndexOptions, Item, SetOptions};
use burrow_codec::CommandEncoder;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use std::cell::Cell;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::error;

/// The database lock held for the whole life of a transaction.
pub(crate) enum StateGuard<'db> {
    /// Shared lock of a read-only transaction.
    Read(RwLockReadGuard<'db, DbState>),
    /// Exclusive lock of the writable transaction.
    Write(RwLockWriteGuard<'db, DbState>),
}

/// A transaction over a [`Database`](crate::Database).
///
/// A transaction holds the database lock from begin until commit or
/// rollback: shared for read-only transactions, exclusive for the single
/// writable one. Writes apply to memory immediately and are appended to
/// the log in one write on commit.
///
/// Dropping an open transaction rolls it back.
///
/// # Example
///
/// ```rust,ignore
/// let mut tx = db.begin(true)?;
/// tx.set(b"user:1", b"alice", SetOptions::new())?;
/// tx.commit()?;
/// ```
pub struct Tx<'db> {
    guard: Option<StateGuard<'db>>,
    writable: bool,
    managed: bool,
    wc: Option<WriteContext>,
}

impl<'db> Tx<'db> {
    pub(crate) fn new(guard: StateGuard<'db>) -> Self {
        let writable = matches!(guard, StateGuard::Write(_));
        Self {
            guard: Some(guard),
            writable,
            managed: false,
            wc: writable.then(WriteContext::new),
        }
    }

    pub(crate) fn set_managed(&mut self, managed: bool) {
        self.managed = managed;
    }

    /// Returns true for a writable transaction.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Returns true until the transaction is committed or rolled back.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.guard.is_some()
    }

    pub(crate) fn state(&self) -> CoreResult<&DbState> {
        match &self.guard {
            Some(StateGuard::Read(guard)) => Ok(&**guard),
            Some(StateGuard::Write(guard)) => Ok(&**guard),
            None => Err(CoreError::TxClosed),
        }
    }

    pub(crate) fn keyspace(&self) -> CoreResult<&Keyspace> {
        Ok(&self.state()?.keyspace)
    }

    /// Scan counter of a writable transaction.
    pub(crate) fn iterating(&self) -> Option<&Cell<usize>> {
        self.wc.as_ref().map(WriteContext::iterating)
    }

    /// Checks that a mutation is allowed and splits out what it needs.
    fn writer(&mut self) -> CoreResult<(&mut Keyspace, &mut WriteContext)> {
        let Self { guard, wc, .. } = self;
        let state: &mut DbState = match guard {
            None => return Err(CoreError::TxClosed),
            Some(StateGuard::Read(_)) => return Err(CoreError::TxNotWritable),
            Some(StateGuard::Write(guard)) => &mut **guard,
        };
        let wc = wc.as_mut().ok_or(CoreError::TxNotWritable)?;
        if wc.is_iterating() {
            return Err(CoreError::TxIterating);
        }
        Ok((&mut state.keyspace, wc))
    }

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key is absent or expired.
    pub fn get(&self, key: &[u8]) -> CoreResult<Vec<u8>> {
        match self.keyspace()?.get(key) {
            Some(item) if !item.is_expired() => Ok(item.value.clone()),
            _ => Err(CoreError::NotFound),
        }
    }

    /// Returns the value stored under `key`, even if it has expired but
    /// has not been swept yet.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key is absent.
    pub fn get_ignore_expired(&self, key: &[u8]) -> CoreResult<Vec<u8>> {
        self.keyspace()?
            .get(key)
            .map(|item| item.value.clone())
            .ok_or(CoreError::NotFound)
    }

    /// Stores `value` under `key`.
    ///
    /// Returns the previous value if one was replaced. A previous item that
    /// had already expired does not count as replaced.
    ///
    /// # Errors
    ///
    /// Returns `TxClosed`, `TxNotWritable` or `TxIterating` if the
    /// transaction cannot mutate.
    pub fn set(
        &mut self,
        key: &[u8],
        value: &[u8],
        options: SetOptions,
    ) -> CoreResult<Option<Vec<u8>>> {
        let (keyspace, wc) = self.writer()?;
        let now = SystemTime::now();
        let mut item = Item::new(key, value);
        if let Some(at) = options.ttl.and_then(|ttl| now.checked_add(ttl)) {
            item = item.with_expiry(at);
        }
        let item = Arc::new(item);

        let prev = keyspace.insert(Arc::clone(&item));
        let replaced = prev
            .as_ref()
            .filter(|prev| !prev.is_expired_at(now))
            .map(|prev| prev.value.clone());
        wc.record_item(key, prev);
        wc.stage_set(item);
        Ok(replaced)
    }

    /// Removes `key` and returns its value.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key is absent or had expired; an expired
    /// item is removed all the same.
    pub fn delete(&mut self, key: &[u8]) -> CoreResult<Vec<u8>> {
        let (keyspace, wc) = self.writer()?;
        let prev = keyspace.delete(key).ok_or(CoreError::NotFound)?;
        let expired = prev.is_expired();
        let value = prev.value.clone();
        wc.record_item(key, Some(prev));
        wc.stage_delete(key);
        if expired {
            return Err(CoreError::NotFound);
        }
        Ok(value)
    }

    /// Removes every item, keeping index definitions.
    ///
    /// The commit writes a single `FLUSHDB` followed by any writes made
    /// afterwards in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `TxClosed`, `TxNotWritable` or `TxIterating` if the
    /// transaction cannot mutate.
    pub fn delete_all(&mut self) -> CoreResult<()> {
        let (keyspace, wc) = self.writer()?;
        let fresh = keyspace.clear_copy();
        wc.stage_flush(std::mem::replace(keyspace, fresh));
        Ok(())
    }

    /// Returns the remaining lifetime of `key`, or `None` if it never
    /// expires.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key is absent or expired.
    pub fn ttl(&self, key: &[u8]) -> CoreResult<Option<Duration>> {
        let item = self.keyspace()?.get(key).ok_or(CoreError::NotFound)?;
        match item.expires {
            None => Ok(None),
            Some(at) => at
                .duration_since(SystemTime::now())
                .ok()
                .filter(|left| !left.is_zero())
                .map(Some)
                .ok_or(CoreError::NotFound),
        }
    }

    /// Number of stored items, including expired items not yet swept.
    ///
    /// # Errors
    ///
    /// Returns `TxClosed` after commit or rollback.
    pub fn len(&self) -> CoreResult<usize> {
        Ok(self.keyspace()?.keys.len())
    }

    /// Returns true if no items are stored.
    ///
    /// # Errors
    ///
    /// Returns `TxClosed` after commit or rollback.
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.keyspace()?.keys.is_empty())
    }

    /// Creates an ordered index over the keys matching `pattern`.
    ///
    /// Several `less` functions are applied in turn, each breaking the ties
    /// of the previous ones. With none, the index keeps no ordered backing.
    ///
    /// # Errors
    ///
    /// Returns `IndexExists` if `name` is empty or taken.
    pub fn create_index(&mut self, name: &str, pattern: &str, less: &[LessFn]) -> CoreResult<()> {
        self.create_index_options(name, pattern, IndexOptions::default(), less)
    }

    /// Creates an ordered index with explicit options.
    ///
    /// # Errors
    ///
    /// Returns `IndexExists` if `name` is empty or taken.
    pub fn create_index_options(
        &mut self,
        name: &str,
        pattern: &str,
        options: IndexOptions,
        less: &[LessFn],
    ) -> CoreResult<()> {
        self.create_index_inner(Index::new(name, pattern, compose_less(less), None, options))
    }

    /// Creates a spatial index over the keys matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns `IndexExists` if `name` is empty or taken.
    pub fn create_spatial_index(&mut self, name: &str, pattern: &str, rect: RectFn) -> CoreResult<()> {
        self.create_spatial_index_options(name, pattern, IndexOptions::default(), rect)
    }

    /// Creates a spatial index with explicit options.
    ///
    /// # Errors
    ///
    /// Returns `IndexExists` if `name` is empty or taken.
    pub fn create_spatial_index_options(
        &mut self,
        name: &str,
        pattern: &str,
        options: IndexOptions,
        rect: RectFn,
    ) -> CoreResult<()> {
        self.create_index_inner(Index::new(name, pattern, None, Some(rect), options))
    }

    fn create_index_inner(&mut self, index: Index) -> CoreResult<()> {
        let (keyspace, wc) = self.writer()?;
        let name = index.name().to_string();
        keyspace.create_index(index)?;
        wc.record_created_index(&name);
        Ok(())
    }

    /// Removes the index called `name`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for the empty name and `NotFound` if no
    /// such index exists.
    pub fn drop_index(&mut self, name: &str) -> CoreResult<()> {
        let (keyspace, wc) = self.writer()?;
        let index = keyspace.drop_index(name)?;
        wc.record_dropped_index(&index);
        Ok(())
    }

    /// Names of all indexes, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns `TxClosed` after commit or rollback.
    pub fn indexes(&self) -> CoreResult<Vec<String>> {
        Ok(self.keyspace()?.indexes.names())
    }

    /// Returns the composed ordering of index `name`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the index does not exist or is not ordered.
    pub fn get_less(&self, name: &str) -> CoreResult<LessFn> {
        self.keyspace()?
            .indexes
            .get(name)
            .and_then(Index::less)
            .cloned()
            .ok_or(CoreError::NotFound)
    }

    /// Returns the rect function of index `name`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the index does not exist or is not spatial.
    pub fn get_rect(&self, name: &str) -> CoreResult<RectFn> {
        self.keyspace()?
            .indexes
            .get(name)
            .and_then(Index::rect)
            .cloned()
            .ok_or(CoreError::NotFound)
    }

    /// Writes the pending changes to the log and releases the lock.
    ///
    /// If the log write fails, every change of the transaction is rolled
    /// back in memory and the error is returned.
    ///
    /// # Errors
    ///
    /// Returns `TxClosed` if already finished, `TxNotWritable` for a
    /// read-only transaction (which stays open), or the log write error.
    ///
    /// # Panics
    ///
    /// Panics if called on a transaction passed to
    /// [`Database::update`](crate::Database::update) or
    /// [`Database::view`](crate::Database::view).
    pub fn commit(&mut self) -> CoreResult<()> {
        assert!(!self.managed, "commit is not allowed in a managed transaction");
        self.commit_inner()
    }

    /// Undoes every change and releases the lock.
    ///
    /// # Errors
    ///
    /// Returns `TxClosed` if already finished.
    ///
    /// # Panics
    ///
    /// Panics if called on a managed transaction.
    pub fn rollback(&mut self) -> CoreResult<()> {
        assert!(!self.managed, "rollback is not allowed in a managed transaction");
        self.rollback_inner()
    }

    pub(crate) fn commit_inner(&mut self) -> CoreResult<()> {
        if self.guard.is_none() {
            return Err(CoreError::TxClosed);
        }
        if !self.writable {
            return Err(CoreError::TxNotWritable);
        }
        let result = self.persist();
        if result.is_err() {
            self.undo();
        }
        self.finish();
        result
    }

    pub(crate) fn rollback_inner(&mut self) -> CoreResult<()> {
        if self.guard.is_none() {
            return Err(CoreError::TxClosed);
        }
        self.undo();
        self.finish();
        Ok(())
    }

    fn persist(&mut self) -> CoreResult<()> {
        let Self { guard, wc, .. } = self;
        let (Some(StateGuard::Write(state)), Some(wc)) = (guard.as_mut(), wc.as_ref()) else {
            return Ok(());
        };
        let state = &mut **state;
        if wc.is_clean() {
            return Ok(());
        }
        let Some(log) = state.log.as_mut() else {
            return Ok(());
        };

        let now = SystemTime::now();
        let mut encoder = CommandEncoder::new();
        if wc.flushed() {
            encoder.flushdb();
        }
        for (key, item) in wc.commit_items() {
            match item {
                Some(item) => encode_item(&mut encoder, item, now),
                None => encoder.del(key),
            }
        }

        if let Err(err) = log.write_batch(encoder.as_bytes()) {
            if err.is_fatal() {
                state.closed = true;
            }
            return Err(err);
        }
        if state.config.sync_policy == SyncPolicy::Always {
            if let Err(err) = log.sync() {
                error!(error = %err, "failed to sync database log after commit");
            }
        }
        state.flushes += 1;
        Ok(())
    }

    fn undo(&mut self) {
        let Self { guard, wc, .. } = self;
        let (Some(StateGuard::Write(state)), Some(wc)) = (guard.as_mut(), wc.take()) else {
            return;
        };
        wc.rollback(&mut state.keyspace);
    }

    fn finish(&mut self) {
        self.wc = None;
        self.guard = None;
    }
}

impl Drop for Tx<'_> {
    fn drop(&mut self) {
        if self.guard.is_some() {
            self.undo();
            self.finish();
        }
    }
}

impl fmt::Debug for Tx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tx")
            .field("writable", &self.writable)
            .field("open", &self.guard.is_some())
            .field("managed", &self.managed)
            .finish()
    }
}
