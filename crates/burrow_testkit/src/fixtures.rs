//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use burrow_core::{Config, Database, SetOptions};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Name of the log file inside a fixture's temporary directory.
pub const LOG_FILE: &str = "data.db";

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self {
            db: Database::open_in_memory().expect("Failed to open in-memory database"),
            temp_dir: None,
        }
    }

    /// Creates a new file-backed test database in a temporary directory.
    pub fn file() -> Self {
        Self::file_with_config(Config::default())
    }

    /// Creates a new file-backed test database with a custom configuration.
    pub fn file_with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join(LOG_FILE);
        let db = Database::open_with_config(&path, config).expect("Failed to open file database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the log path if file-backed, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join(LOG_FILE))
    }

    /// Closes the database and opens the same log again.
    ///
    /// # Panics
    ///
    /// Panics for in-memory databases.
    pub fn reopen(self) -> Self {
        let path = self.path().expect("Only file databases can be reopened");
        let Self { db, temp_dir } = self;
        let config = db.read_config().unwrap_or_default();
        db.close().expect("Failed to close database");
        drop(db);
        Self {
            db: Database::open_with_config(&path, config).expect("Failed to reopen database"),
            temp_dir,
        }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```rust,ignore
/// use burrow_testkit::with_temp_db;
///
/// #[test]
/// fn my_test() {
///     with_temp_db(|db| {
///         db.update(|tx| tx.set(b"k", b"v", SetOptions::new()))?;
///     });
/// }
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a temporary file-backed database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, &path)
}

/// Reads every live key/value pair in key order.
pub fn snapshot(db: &Database) -> Vec<(Vec<u8>, Vec<u8>)> {
    db.view(|tx| {
        let mut out = Vec::new();
        tx.ascend("", |k, v| {
            out.push((k.to_vec(), v.to_vec()));
            true
        })?;
        Ok(out)
    })
    .expect("Failed to read snapshot")
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a database holding `key:{i}` = `value:{i}` for `0..count`.
    pub fn populated_database(count: usize) -> TestDatabase {
        let test_db = TestDatabase::memory();
        populate(&test_db, count);
        test_db
    }

    /// Writes `key:{i}` = `value:{i}` for `0..count`, one commit per item.
    pub fn populate(db: &Database, count: usize) {
        for i in 0..count {
            db.update(|tx| {
                tx.set(
                    format!("key:{i}").as_bytes(),
                    format!("value:{i}").as_bytes(),
                    SetOptions::new(),
                )?;
                Ok(())
            })
            .expect("Failed to set item");
        }
    }

    /// Creates a database with `user:{i}:age` keys and an `age` index.
    pub fn user_ages(ages: &[i64]) -> TestDatabase {
        let test_db = TestDatabase::memory();
        test_db
            .create_index("age", "user:*:age", &[burrow_core::collate::index_int()])
            .expect("Failed to create index");
        test_db
            .update(|tx| {
                for (i, age) in ages.iter().enumerate() {
                    tx.set(
                        format!("user:{i}:age").as_bytes(),
                        age.to_string().as_bytes(),
                        SetOptions::new(),
                    )?;
                }
                Ok(())
            })
            .expect("Failed to set ages");
        test_db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_database() {
        let test_db = TestDatabase::memory();
        assert!(test_db.path().is_none());
        assert!(!test_db.is_persistent());
    }

    #[test]
    fn test_with_temp_db() {
        with_temp_db(|db| {
            db.update(|tx| tx.set(b"k", b"v", SetOptions::new())).unwrap();
            assert_eq!(snapshot(db), [(b"k".to_vec(), b"v".to_vec())]);
        });
    }

    #[test]
    fn test_file_database_reopens() {
        let test_db = TestDatabase::file();
        scenarios::populate(&test_db, 3);
        let test_db = test_db.reopen();
        assert_eq!(snapshot(&test_db).len(), 3);
    }

    #[test]
    fn test_populated_scenario() {
        let test_db = scenarios::populated_database(10);
        assert_eq!(test_db.view(|tx| tx.len()).unwrap(), 10);
    }

    #[test]
    fn test_user_ages_scenario() {
        let test_db = scenarios::user_ages(&[30, 20]);
        let mut keys = Vec::new();
        test_db
            .view(|tx| {
                tx.ascend("age", |k, _| {
                    keys.push(k.to_vec());
                    true
                })
            })
            .unwrap();
        assert_eq!(keys, [b"user:1:age".to_vec(), b"user:0:age".to_vec()]);
    }
}
