//! Database facade.

use crate::aof::{encode_item, load_log, replay, AppendLog};
use crate::background;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::index::{LessFn, RectFn};
use crate::keyspace::Keyspace;
use crate::shared::{DbState, Shared};
use crate::transaction::Tx;
use crate::types::IndexOptions;
use burrow_codec::{CommandEncoder, CommandReader};
use burrow_storage::{FileBackend, StorageBackend};
use parking_lot::Mutex;
use std::fmt;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::SystemTime;
use tracing::{info, warn};

/// Path that opens a database without persistence.
pub const MEMORY_PATH: &str = ":memory:";

/// Bytes buffered by [`Database::save`] between writes.
const SAVE_FLUSH_BYTES: usize = 4 * 1024 * 1024;

/// The main database handle.
///
/// `Database` is the entry point of BurrowDB. It provides:
/// - Managed transactions through [`update`](Self::update) and
///   [`view`](Self::view), and manual ones through [`begin`](Self::begin)
/// - Index management shortcuts
/// - Snapshot export and import through [`save`](Self::save) and
///   [`load`](Self::load)
/// - Log compaction through [`shrink`](Self::shrink)
///
/// A background thread sweeps expired items, syncs the log and shrinks it
/// once it has grown enough. Dropping the handle closes the database.
///
/// # Opening a Database
///
/// ```rust,ignore
/// use burrow_core::{Database, SetOptions};
///
/// let db = Database::open("data.db")?;
/// db.update(|tx| {
///     tx.set(b"user:1", b"alice", SetOptions::new())?;
///     Ok(())
/// })?;
/// let name = db.view(|tx| tx.get(b"user:1"))?;
/// ```
///
/// # In-Memory Databases
///
/// ```rust,ignore
/// let db = Database::open_in_memory()?;
/// ```
pub struct Database {
    shared: Arc<Shared>,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl Database {
    /// Opens the database stored at `path`, creating it if missing.
    ///
    /// The path `":memory:"` opens a database without persistence.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another handle holds the log file lock
    /// - The log contains a malformed record (`Invalid`)
    /// - I/O errors occur
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens the database at `path` with a custom configuration.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub fn open_with_config(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        let path = path.as_ref();
        if path == Path::new(MEMORY_PATH) {
            return Self::start(Keyspace::new(), None, 0, config);
        }
        let backend = FileBackend::open(path)?;
        Self::open_with_backend(Box::new(backend), config)
    }

    /// Opens a database without persistence.
    ///
    /// # Errors
    ///
    /// Returns an error if the background thread cannot be started.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::start(Keyspace::new(), None, 0, Config::default())
    }

    /// Opens a database persisted to `backend`.
    ///
    /// The log is replayed into memory first; a record cut short at the
    /// end is truncated away.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if the log is corrupt, or a storage error.
    pub fn open_with_backend(backend: Box<dyn StorageBackend>, config: Config) -> CoreResult<Self> {
        let mut log = AppendLog::new(backend);
        let mut keyspace = Keyspace::new();
        let size = load_log(&mut log, &mut keyspace)?;
        info!(
            path = ?log.path(),
            size,
            keys = keyspace.keys.len(),
            "opened database"
        );
        Self::start(keyspace, Some(log), size, config)
    }

    fn start(
        keyspace: Keyspace,
        log: Option<AppendLog>,
        size: u64,
        config: Config,
    ) -> CoreResult<Self> {
        let shared = Arc::new(Shared::new(DbState::new(keyspace, log, size, config)));
        let handle = background::spawn(Arc::clone(&shared))?;
        Ok(Self {
            shared,
            background: Mutex::new(Some(handle)),
        })
    }

    /// Returns true until the database is closed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.shared.state.read().closed
    }

    /// Path of the log file, if the database is file-backed.
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        let state = self.shared.state.read();
        state
            .log
            .as_ref()
            .and_then(|log| log.path().map(Path::to_path_buf))
    }

    /// Returns true if the database writes a log.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.shared.state.read().log.is_some()
    }

    /// Closes the database: stops the background thread, syncs the log
    /// and releases its file lock.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` if the database was already closed.
    pub fn close(&self) -> CoreResult<()> {
        if !self.shared.request_shutdown() {
            return Err(CoreError::DatabaseClosed);
        }
        self.shared.close_state();
        if let Some(handle) = self.background.lock().take() {
            // A handle dropped by an expiration callback cannot join itself.
            if handle.thread().id() == std::thread::current().id() {
                return Ok(());
            }
            if handle.join().is_err() {
                warn!("background thread panicked");
            }
        }
        info!("closed database");
        Ok(())
    }

    /// Starts a transaction.
    ///
    /// A writable transaction waits for every other transaction to finish;
    /// a read-only one waits only for the writer.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` if the database is closed.
    pub fn begin(&self, writable: bool) -> CoreResult<Tx<'_>> {
        self.shared.begin(writable)
    }

    /// Runs `f` in a writable transaction.
    ///
    /// The transaction commits if `f` returns `Ok` and rolls back if it
    /// returns `Err`, whose error is passed through unchanged.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, from starting the transaction, or from
    /// the commit.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// db.update(|tx| {
    ///     tx.set(b"counter", b"1", SetOptions::new())?;
    ///     Ok(())
    /// })?;
    /// ```
    pub fn update<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Tx<'_>) -> CoreResult<T>,
    {
        self.shared.update(f)
    }

    /// Runs `f` in a read-only transaction.
    ///
    /// # Errors
    ///
    /// Returns the error from `f` or `DatabaseClosed`.
    pub fn view<T, F>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&Tx<'_>) -> CoreResult<T>,
    {
        self.shared.view(f)
    }

    /// Writes every item to `writer` as log commands.
    ///
    /// Items keep their remaining TTL; items already expired but not yet
    /// swept are written with a TTL of zero.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` or the writer's I/O error.
    pub fn save<W: io::Write>(&self, mut writer: W) -> CoreResult<()> {
        let state = self.shared.state.read();
        if state.closed {
            return Err(CoreError::DatabaseClosed);
        }

        let now = SystemTime::now();
        let mut encoder = CommandEncoder::new();
        for item in state.keyspace.keys.iter() {
            encode_item(&mut encoder, item, now);
            if encoder.len() > SAVE_FLUSH_BYTES {
                writer.write_all(encoder.as_bytes())?;
                encoder.clear();
            }
        }
        if !encoder.is_empty() {
            writer.write_all(encoder.as_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Reads log commands from `reader` into a database without
    /// persistence.
    ///
    /// TTLs are taken as relative to now.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceActive` for a database with a log, `Invalid`
    /// for malformed input, and a codec `UnexpectedEof` error if the input
    /// ends mid-record. Commands before the failure stay applied.
    pub fn load<R: io::Read>(&self, reader: R) -> CoreResult<()> {
        let mut state = self.shared.state.write();
        if state.closed {
            return Err(CoreError::DatabaseClosed);
        }
        if state.log.is_some() {
            return Err(CoreError::PersistenceActive);
        }
        let mut commands = CommandReader::new(BufReader::new(reader));
        replay(&mut commands, &mut state.keyspace, SystemTime::now())
            .map_err(CoreError::from_codec)?;
        Ok(())
    }

    /// Compacts the log to one command per live item.
    ///
    /// Writers keep running during most of the rewrite. Does nothing for
    /// databases without persistence.
    ///
    /// # Errors
    ///
    /// - `ShrinkInProcess` if another shrink is running
    /// - `InvalidOperation` if the log is not file-backed
    /// - `Fatal` if the rewritten log could not be swapped in; the database
    ///   is closed in that case
    pub fn shrink(&self) -> CoreResult<()> {
        self.shared.shrink()
    }

    /// Creates an ordered index. See [`Tx::create_index`].
    ///
    /// # Errors
    ///
    /// Returns `IndexExists` if `name` is empty or taken.
    pub fn create_index(&self, name: &str, pattern: &str, less: &[LessFn]) -> CoreResult<()> {
        self.update(|tx| tx.create_index(name, pattern, less))
    }

    /// Creates an ordered index with explicit options.
    ///
    /// # Errors
    ///
    /// Returns `IndexExists` if `name` is empty or taken.
    pub fn create_index_options(
        &self,
        name: &str,
        pattern: &str,
        options: IndexOptions,
        less: &[LessFn],
    ) -> CoreResult<()> {
        self.update(|tx| tx.create_index_options(name, pattern, options, less))
    }

    /// Creates a spatial index. See [`Tx::create_spatial_index`].
    ///
    /// # Errors
    ///
    /// Returns `IndexExists` if `name` is empty or taken.
    pub fn create_spatial_index(&self, name: &str, pattern: &str, rect: RectFn) -> CoreResult<()> {
        self.update(|tx| tx.create_spatial_index(name, pattern, rect))
    }

    /// Creates a spatial index with explicit options.
    ///
    /// # Errors
    ///
    /// Returns `IndexExists` if `name` is empty or taken.
    pub fn create_spatial_index_options(
        &self,
        name: &str,
        pattern: &str,
        options: IndexOptions,
        rect: RectFn,
    ) -> CoreResult<()> {
        self.update(|tx| tx.create_spatial_index_options(name, pattern, options, rect))
    }

    /// Creates an ordered index, replacing any index of the same name.
    ///
    /// # Errors
    ///
    /// Returns `IndexExists` for the empty name.
    pub fn replace_index(&self, name: &str, pattern: &str, less: &[LessFn]) -> CoreResult<()> {
        self.update(|tx| match tx.create_index(name, pattern, less) {
            Err(CoreError::IndexExists) if !name.is_empty() => {
                tx.drop_index(name)?;
                tx.create_index(name, pattern, less)
            }
            other => other,
        })
    }

    /// Creates a spatial index, replacing any index of the same name.
    ///
    /// # Errors
    ///
    /// Returns `IndexExists` for the empty name.
    pub fn replace_spatial_index(&self, name: &str, pattern: &str, rect: RectFn) -> CoreResult<()> {
        self.update(
            |tx| match tx.create_spatial_index(name, pattern, Arc::clone(&rect)) {
                Err(CoreError::IndexExists) if !name.is_empty() => {
                    tx.drop_index(name)?;
                    tx.create_spatial_index(name, pattern, rect)
                }
                other => other,
            },
        )
    }

    /// Removes an index.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for the empty name and `NotFound` if no
    /// such index exists.
    pub fn drop_index(&self, name: &str) -> CoreResult<()> {
        self.update(|tx| tx.drop_index(name))
    }

    /// Names of all indexes, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` if the database is closed.
    pub fn indexes(&self) -> CoreResult<Vec<String>> {
        self.view(|tx| tx.indexes())
    }

    /// Returns a copy of the current configuration.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` if the database is closed.
    pub fn read_config(&self) -> CoreResult<Config> {
        let state = self.shared.state.read();
        if state.closed {
            return Err(CoreError::DatabaseClosed);
        }
        Ok(state.config.clone())
    }

    /// Replaces the configuration.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseClosed` if the database is closed.
    pub fn set_config(&self, config: Config) -> CoreResult<()> {
        let mut state = self.shared.state.write();
        if state.closed {
            return Err(CoreError::DatabaseClosed);
        }
        state.config = config;
        Ok(())
    }

    /// Runs one background tick on the calling thread.
    #[cfg(test)]
    pub(crate) fn tick(&self) -> CoreResult<()> {
        let mut synced = 0;
        background::tick(&self.shared, &mut synced)
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Database");
        match self.shared.state.try_read() {
            Some(state) => out
                .field("path", &state.log.as_ref().and_then(AppendLog::path))
                .field("persistent", &state.log.is_some())
                .field("keys", &state.keyspace.keys.len())
                .field("closed", &state.closed),
            None => out.field("state", &"<locked>"),
        };
        out.finish()
    }
}
