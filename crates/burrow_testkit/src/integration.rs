//! Cross-crate integration test helpers.
//!
//! Provides a harness that mirrors every committed batch into a
//! [`Model`] and checks the database against it, in memory and across
//! reopens.

use crate::fixtures::{snapshot, TestDatabase};
use crate::generators::{apply_ops, Model, Op};
use burrow_core::CoreResult;

/// A test harness for integration testing.
pub struct IntegrationHarness {
    /// The database under test.
    pub db: TestDatabase,
    model: Model,
}

impl IntegrationHarness {
    /// Creates a new integration harness with an in-memory database.
    pub fn memory() -> Self {
        Self {
            db: TestDatabase::memory(),
            model: Model::default(),
        }
    }

    /// Creates a new integration harness with a file-backed database.
    pub fn file() -> Self {
        Self {
            db: TestDatabase::file(),
            model: Model::default(),
        }
    }

    /// Commits `ops` as one transaction and mirrors them into the model.
    pub fn commit(&mut self, ops: &[Op]) -> CoreResult<()> {
        self.db.update(|tx| apply_ops(tx, ops))?;
        self.model.apply(ops);
        Ok(())
    }

    /// Runs `ops` in a transaction that is rolled back.
    pub fn discard(&mut self, ops: &[Op]) -> CoreResult<()> {
        let mut tx = self.db.begin(true)?;
        apply_ops(&mut tx, ops)?;
        tx.rollback()
    }

    /// Closes and reopens the database.
    pub fn reopen(self) -> Self {
        Self {
            db: self.db.reopen(),
            model: self.model,
        }
    }

    /// Asserts that the database holds exactly the model's contents.
    pub fn verify(&self) {
        assert_eq!(snapshot(&self.db), self.model.pairs(), "database diverged from model");
    }

    /// Returns the reference model.
    pub fn model(&self) -> &Model {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crash::CrashableBackend;
    use crate::generators::batches_strategy;
    use crate::stress::{expected_final_values, stress_writes_with_shrink, StressConfig};
    use burrow_codec::{decode_all, Command};
    use burrow_core::collate::{desc, index_int, index_json, index_rect, index_string, point, rect};
    use burrow_core::{Config, CoreError, Database, IndexOptions, SetOptions, SyncPolicy};
    use burrow_storage::{InMemoryBackend, StorageError};
    use proptest::prelude::*;
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    fn set(key: &str, value: &str) -> Op {
        Op::Set {
            key: key.as_bytes().to_vec(),
            value: value.as_bytes().to_vec(),
        }
    }

    fn ascend_keys(db: &Database, index: &str) -> Vec<String> {
        db.view(|tx| {
            let mut out = Vec::new();
            tx.ascend(index, |k, _| {
                out.push(String::from_utf8_lossy(k).into_owned());
                true
            })?;
            Ok(out)
        })
        .unwrap()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    #[test]
    fn test_persistence_round_trip() {
        let mut harness = IntegrationHarness::file();
        harness.commit(&[set("a", "1"), set("b", "2"), set("c", "3")]).unwrap();
        harness.commit(&[Op::Delete { key: b"b".to_vec() }, set("a", "10")]).unwrap();
        harness.discard(&[set("lost", "x"), Op::DeleteAll]).unwrap();
        harness.verify();

        let mut harness = harness.reopen();
        harness.verify();
        harness.commit(&[Op::DeleteAll, set("z", "26")]).unwrap();

        let harness = harness.reopen();
        harness.verify();
        assert_eq!(harness.model().items.len(), 1);
    }

    #[test]
    fn test_log_records_commits() {
        let backend = InMemoryBackend::new();
        let db = Database::open_with_backend(Box::new(backend.clone()), Config::default()).unwrap();
        db.update(|tx| tx.set(b"a", b"1", SetOptions::new())).unwrap();
        db.update(|tx| tx.set(b"b", b"2", SetOptions::ttl(Duration::from_secs(100))))
            .unwrap();
        db.update(|tx| tx.delete(b"a")).unwrap();
        db.update(|tx| {
            tx.delete_all()?;
            tx.set(b"c", b"3", SetOptions::new())
        })
        .unwrap();

        let commands = decode_all(&backend.data()).unwrap();
        assert_eq!(commands.len(), 5);
        assert_eq!(
            commands[0],
            Command::Set {
                key: b"a".to_vec(),
                value: b"1".to_vec(),
                ttl: None
            }
        );
        match &commands[1] {
            Command::Set { key, ttl: Some(ttl), .. } => {
                assert_eq!(key, b"b");
                assert!((99..=100).contains(ttl));
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(commands[2], Command::Del { key: b"a".to_vec() });
        assert_eq!(commands[3], Command::FlushDb);
        assert_eq!(commands[4].key(), Some(&b"c"[..]));
    }

    #[test]
    fn test_rolled_back_transaction_writes_nothing() {
        let backend = InMemoryBackend::new();
        let db = Database::open_with_backend(Box::new(backend.clone()), Config::default()).unwrap();
        let mut tx = db.begin(true).unwrap();
        tx.set(b"a", b"1", SetOptions::new()).unwrap();
        tx.rollback().unwrap();
        assert!(backend.data().is_empty());
        assert!(db.view(|tx| tx.is_empty()).unwrap());
    }

    #[test]
    fn test_corrupt_log_fails_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.db");
        std::fs::write(&path, b"*2\r\n$3\r\nget\r\n$1\r\na\r\n").unwrap();
        assert!(matches!(Database::open(&path), Err(CoreError::Invalid { .. })));
    }

    #[test]
    fn test_second_handle_is_locked_out() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.db");
        let db = Database::open(&path).unwrap();
        assert!(matches!(
            Database::open(&path),
            Err(CoreError::Storage(StorageError::Locked { .. }))
        ));
        db.close().unwrap();
        Database::open(&path).unwrap();
    }

    #[test]
    fn test_save_then_load_into_memory() {
        let mut harness = IntegrationHarness::file();
        harness.commit(&[set("a", "1"), set("b", "2")]).unwrap();
        let mut snapshot_bytes = Vec::new();
        harness.db.save(&mut snapshot_bytes).unwrap();

        let copy = Database::open_in_memory().unwrap();
        copy.load(snapshot_bytes.as_slice()).unwrap();
        assert_eq!(snapshot(&copy), harness.model().pairs());

        let torn = &snapshot_bytes[..snapshot_bytes.len() - 2];
        let partial = Database::open_in_memory().unwrap();
        let err = partial.load(torn).unwrap_err();
        assert!(matches!(err, CoreError::Codec(ref e) if e.is_unexpected_eof()));
        assert_eq!(snapshot(&partial).len(), 1);
    }

    // ------------------------------------------------------------------
    // Sync policies
    // ------------------------------------------------------------------

    #[test]
    fn test_sync_always_syncs_each_commit() {
        let backend = CrashableBackend::new(Box::new(InMemoryBackend::new()));
        let control = backend.control();
        let config = Config::new().sync_policy(SyncPolicy::Always);
        let db = Database::open_with_backend(Box::new(backend), config).unwrap();
        for i in 0..3 {
            db.update(|tx| tx.set(format!("k{i}").as_bytes(), b"v", SetOptions::new()))
                .unwrap();
        }
        assert_eq!(control.sync_count(), 3);
    }

    #[test]
    fn test_sync_every_second_runs_in_background() {
        let backend = CrashableBackend::new(Box::new(InMemoryBackend::new()));
        let control = backend.control();
        let db = Database::open_with_backend(Box::new(backend), Config::default()).unwrap();
        db.update(|tx| tx.set(b"k", b"v", SetOptions::new())).unwrap();
        assert_eq!(control.sync_count(), 0);

        thread::sleep(Duration::from_millis(2500));
        assert!(control.sync_count() >= 1);
    }

    #[test]
    fn test_sync_failure_after_commit_keeps_data() {
        let backend = CrashableBackend::new(Box::new(InMemoryBackend::new()));
        let control = backend.control();
        let config = Config::new().sync_policy(SyncPolicy::Always);
        let db = Database::open_with_backend(Box::new(backend), config).unwrap();
        control.set_fail_sync(true);
        db.update(|tx| tx.set(b"k", b"v", SetOptions::new())).unwrap();
        assert_eq!(db.view(|tx| tx.get(b"k")).unwrap(), b"v");
    }

    // ------------------------------------------------------------------
    // Expiration
    // ------------------------------------------------------------------

    #[test]
    fn test_background_sweeps_expired_items() {
        let backend = InMemoryBackend::new();
        let db = Database::open_with_backend(Box::new(backend.clone()), Config::default()).unwrap();
        db.update(|tx| {
            tx.set(b"temp", b"v", SetOptions::ttl(Duration::from_millis(100)))?;
            tx.set(b"keep", b"v", SetOptions::new())
        })
        .unwrap();

        thread::sleep(Duration::from_millis(2500));
        assert!(db.view(|tx| tx.get_ignore_expired(b"temp")).unwrap_err().is_not_found());
        let commands = decode_all(&backend.data()).unwrap();
        assert_eq!(commands.last(), Some(&Command::Del { key: b"temp".to_vec() }));
    }

    #[test]
    fn test_on_expired_receives_keys() {
        let (sender, receiver) = mpsc::channel();
        let config = Config::new().on_expired(move |keys| {
            let _ = sender.send(keys);
        });
        let db = Database::open_with_config(burrow_core::MEMORY_PATH, config).unwrap();
        db.update(|tx| tx.set(b"temp", b"v", SetOptions::ttl(Duration::from_millis(50))))
            .unwrap();

        let keys = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(keys, [b"temp".to_vec()]);
        // The callback owns deletion, so the item is still stored.
        assert_eq!(db.view(|tx| tx.get_ignore_expired(b"temp")).unwrap(), b"v");
        assert!(db.view(|tx| tx.get(b"temp")).unwrap_err().is_not_found());
    }

    // ------------------------------------------------------------------
    // Indexes
    // ------------------------------------------------------------------

    #[test]
    fn test_json_index_with_tie_breaker() {
        let db = Database::open_in_memory().unwrap();
        db.create_index("by_age_name", "user:*", &[index_json("age"), index_json("name")])
            .unwrap();
        db.update(|tx| {
            for (key, doc) in [
                ("user:1", serde_json::json!({"name": "carol", "age": 30})),
                ("user:2", serde_json::json!({"name": "Alice", "age": 30})),
                ("user:3", serde_json::json!({"name": "bob", "age": 25})),
            ] {
                tx.set(key.as_bytes(), doc.to_string().as_bytes(), SetOptions::new())?;
            }
            tx.set(b"other", b"{}", SetOptions::new())
        })
        .unwrap();

        assert_eq!(ascend_keys(&db, "by_age_name"), ["user:3", "user:2", "user:1"]);
    }

    #[test]
    fn test_descending_and_case_insensitive_indexes() {
        let db = Database::open_in_memory().unwrap();
        db.create_index("score", "*", &[desc(index_int())]).unwrap();
        db.create_index_options(
            "users",
            "User:*",
            IndexOptions::new().case_insensitive_key_matching(true),
            &[index_string()],
        )
        .unwrap();
        db.update(|tx| {
            tx.set(b"user:1", b"10", SetOptions::new())?;
            tx.set(b"USER:2", b"30", SetOptions::new())?;
            tx.set(b"misc", b"20", SetOptions::new())
        })
        .unwrap();

        assert_eq!(ascend_keys(&db, "score"), ["USER:2", "misc", "user:1"]);
        assert_eq!(ascend_keys(&db, "users"), ["user:1", "USER:2"]);
    }

    #[test]
    fn test_index_created_over_existing_items() {
        let db = Database::open_in_memory().unwrap();
        db.update(|tx| {
            tx.set(b"n:1", b"3", SetOptions::new())?;
            tx.set(b"n:2", b"1", SetOptions::new())
        })
        .unwrap();
        db.create_index("n", "n:*", &[index_int()]).unwrap();
        assert_eq!(ascend_keys(&db, "n"), ["n:2", "n:1"]);

        db.update(|tx| tx.set(b"n:2", b"9", SetOptions::new())).unwrap();
        assert_eq!(ascend_keys(&db, "n"), ["n:1", "n:2"]);
    }

    #[test]
    fn test_rollback_restores_index_contents() {
        let db = Database::open_in_memory().unwrap();
        db.create_index("n", "*", &[index_int()]).unwrap();
        db.update(|tx| tx.set(b"a", b"1", SetOptions::new())).unwrap();

        let _ = db.update(|tx| -> CoreResult<()> {
            tx.set(b"a", b"5", SetOptions::new())?;
            tx.set(b"b", b"2", SetOptions::new())?;
            tx.delete_all()?;
            tx.drop_index("n")?;
            Err(CoreError::aborted("undo"))
        });

        assert_eq!(db.indexes().unwrap(), ["n"]);
        assert_eq!(ascend_keys(&db, "n"), ["a"]);
        let less = db.view(|tx| tx.get_less("n")).unwrap();
        assert!(less(b"1", b"2"));
    }

    #[test]
    fn test_spatial_index_queries() {
        let db = Database::open_in_memory().unwrap();
        db.create_spatial_index("places", "place:*", index_rect()).unwrap();
        db.update(|tx| {
            tx.set(b"place:home", point(&[0.0, 0.0]).as_bytes(), SetOptions::new())?;
            tx.set(b"place:park", rect(&[2.0, 2.0], &[4.0, 4.0]).as_bytes(), SetOptions::new())?;
            tx.set(b"place:far", point(&[100.0, 100.0]).as_bytes(), SetOptions::new())
        })
        .unwrap();

        let hits = db
            .view(|tx| {
                let mut out = Vec::new();
                tx.intersects("places", b"[-1 -1],[3 3]", |k, _| {
                    out.push(k.to_vec());
                    true
                })?;
                Ok(out)
            })
            .unwrap();
        assert_eq!(hits, [b"place:home".to_vec(), b"place:park".to_vec()]);

        let nearest = db
            .view(|tx| {
                let mut out = Vec::new();
                tx.nearby("places", b"[5 5]", |k, _, _| {
                    out.push(k.to_vec());
                    out.len() < 2
                })?;
                Ok(out)
            })
            .unwrap();
        assert_eq!(nearest, [b"place:park".to_vec(), b"place:home".to_vec()]);
    }

    // ------------------------------------------------------------------
    // Shrink
    // ------------------------------------------------------------------

    #[test]
    fn test_shrink_with_concurrent_writers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.db");
        let db = Arc::new(Database::open(&path).unwrap());
        let config = StressConfig {
            operations: 300,
            threads: 3,
            value_size: 32,
            key_count: 20,
        };

        let result = stress_writes_with_shrink(Arc::clone(&db), &config);
        assert_eq!(result.failed_ops, 0);
        let expected = expected_final_values(&config);
        assert_eq!(snapshot(&db), expected);

        db.shrink().unwrap();
        db.close().unwrap();
        drop(db);

        let db = Database::open(&path).unwrap();
        assert_eq!(snapshot(&db), expected);
    }

    #[test]
    fn test_background_auto_shrink() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.db");
        let config = Config::new()
            .auto_shrink_min_size(0)
            .auto_shrink_percentage(0);
        let db = Database::open_with_config(&path, config).unwrap();
        for i in 0..100 {
            db.update(|tx| tx.set(b"k", i.to_string().as_bytes(), SetOptions::new()))
                .unwrap();
        }
        let grown = std::fs::metadata(&path).unwrap().len();

        thread::sleep(Duration::from_millis(2500));
        let shrunk = std::fs::metadata(&path).unwrap().len();
        assert!(shrunk < grown / 10, "{shrunk} >= {grown} / 10");
        assert_eq!(db.view(|tx| tx.get(b"k")).unwrap(), b"99");
    }

    #[test]
    fn test_shrink_spanning_many_chunks() {
        let mut harness = IntegrationHarness::file();
        let first: Vec<Op> = (0..2500)
            .map(|i| set(&format!("key:{i:05}"), &format!("v{i}")))
            .collect();
        harness.commit(&first).unwrap();
        let rewrites: Vec<Op> = (0..1200)
            .map(|i| set(&format!("key:{i:05}"), &format!("w{i}")))
            .collect();
        harness.commit(&rewrites).unwrap();

        let path = harness.db.path().unwrap();
        let before = std::fs::metadata(&path).unwrap().len();
        harness.db.shrink().unwrap();
        let after = std::fs::metadata(&path).unwrap().len();
        assert!(after < before, "{after} >= {before}");
        harness.verify();

        let harness = harness.reopen();
        harness.verify();
        assert_eq!(harness.model().items.len(), 2500);
    }

    #[test]
    fn test_shrink_in_memory_is_a_no_op() {
        let db = Database::open_in_memory().unwrap();
        db.update(|tx| tx.set(b"k", b"v", SetOptions::new())).unwrap();
        db.shrink().unwrap();
        assert_eq!(db.view(|tx| tx.len()).unwrap(), 1);
    }

    // ------------------------------------------------------------------
    // Model checks
    // ------------------------------------------------------------------

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_memory_matches_model(batches in batches_strategy()) {
            let mut harness = IntegrationHarness::memory();
            for ops in &batches {
                harness.commit(ops).unwrap();
            }
            harness.verify();
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn test_reopen_matches_model(batches in batches_strategy()) {
            let mut harness = IntegrationHarness::file();
            for ops in &batches {
                harness.commit(ops).unwrap();
            }
            let harness = harness.reopen();
            harness.verify();
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn test_rollback_restores_committed_state(
            committed in batches_strategy(),
            discarded in batches_strategy(),
        ) {
            let mut harness = IntegrationHarness::file();
            harness.db.create_index("by_value", "*", &[index_string()]).unwrap();
            for (ops, lost) in committed.iter().zip(discarded.iter().cycle()) {
                harness.commit(ops).unwrap();
                harness.discard(lost).unwrap();
                harness.verify();
            }
            let indexed = ascend_keys(&harness.db, "by_value");
            prop_assert_eq!(indexed.len(), harness.model().items.len());

            let harness = harness.reopen();
            harness.verify();
        }
    }
}
