//! Write-context of a writable transaction.

use crate::index::Index;
use crate::keyspace::Keyspace;
use crate::types::Item;
use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Pre-images for rollback and pending records for commit.
///
/// Rollback entries record the state before the *first* touch of a key or
/// index in the transaction. Once `delete_all` has run, the snapshot it
/// took already restores everything older, so no further entries are
/// recorded.
#[derive(Debug, Default)]
pub(crate) struct WriteContext {
    /// Key -> item before the transaction (`None` if absent).
    rollback_items: HashMap<Vec<u8>, Option<Arc<Item>>>,
    /// Index name -> empty copy of the index before the transaction
    /// (`None` if it did not exist).
    rollback_indexes: HashMap<String, Option<Index>>,
    /// Key -> item to write (`None` for a delete), in key order.
    commit_items: BTreeMap<Vec<u8>, Option<Arc<Item>>>,
    /// Keyspace as it was before the first `delete_all`.
    flush_snapshot: Option<Keyspace>,
    /// Number of scans currently running.
    iterating: Cell<usize>,
}

impl WriteContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_iterating(&self) -> bool {
        self.iterating.get() > 0
    }

    pub(crate) fn iterating(&self) -> &Cell<usize> {
        &self.iterating
    }

    /// Records the item a key held before its first write.
    pub(crate) fn record_item(&mut self, key: &[u8], prev: Option<Arc<Item>>) {
        if self.flush_snapshot.is_none() && !self.rollback_items.contains_key(key) {
            self.rollback_items.insert(key.to_vec(), prev);
        }
    }

    /// Records that `name` did not exist before the transaction, unless it
    /// was already recorded.
    pub(crate) fn record_created_index(&mut self, name: &str) {
        if self.flush_snapshot.is_none() {
            self.rollback_indexes.entry(name.to_string()).or_insert(None);
        }
    }

    /// Records the definition of a dropped index.
    pub(crate) fn record_dropped_index(&mut self, index: &Index) {
        if self.flush_snapshot.is_none() {
            self.rollback_indexes
                .entry(index.name().to_string())
                .or_insert_with(|| Some(index.clear_copy()));
        }
    }

    pub(crate) fn stage_set(&mut self, item: Arc<Item>) {
        self.commit_items.insert(item.key.clone(), Some(item));
    }

    pub(crate) fn stage_delete(&mut self, key: &[u8]) {
        self.commit_items.insert(key.to_vec(), None);
    }

    /// Keeps the first pre-flush keyspace and forgets pending writes.
    pub(crate) fn stage_flush(&mut self, previous: Keyspace) {
        if self.flush_snapshot.is_none() {
            self.flush_snapshot = Some(previous);
        }
        self.commit_items.clear();
    }

    pub(crate) fn flushed(&self) -> bool {
        self.flush_snapshot.is_some()
    }

    /// Pending writes in key order.
    pub(crate) fn commit_items(&self) -> impl Iterator<Item = (&[u8], Option<&Arc<Item>>)> {
        self.commit_items
            .iter()
            .map(|(key, item)| (key.as_slice(), item.as_ref()))
    }

    /// Returns true if a commit has nothing to write.
    pub(crate) fn is_clean(&self) -> bool {
        self.commit_items.is_empty() && self.flush_snapshot.is_none()
    }

    /// Restores `keyspace` to its state before the transaction.
    pub(crate) fn rollback(self, keyspace: &mut Keyspace) {
        if let Some(snapshot) = self.flush_snapshot {
            *keyspace = snapshot;
        }
        for (key, prev) in self.rollback_items {
            keyspace.delete(&key);
            if let Some(item) = prev {
                keyspace.insert(item);
            }
        }
        for (name, prev) in self.rollback_indexes {
            let _ = keyspace.drop_index(&name);
            if let Some(index) = prev {
                keyspace.restore_index(index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::collate::index_string;
    use crate::types::IndexOptions;

    fn item(key: &str, value: &str) -> Arc<Item> {
        Arc::new(Item::new(key, value))
    }

    #[test]
    fn first_pre_image_wins() {
        let mut ks = Keyspace::new();
        ks.insert(item("a", "orig"));
        let mut wc = WriteContext::new();

        let prev = ks.insert(item("a", "one"));
        wc.record_item(b"a", prev);
        let prev = ks.insert(item("a", "two"));
        wc.record_item(b"a", prev);
        let prev = ks.insert(item("b", "new"));
        wc.record_item(b"b", prev);

        wc.rollback(&mut ks);
        assert_eq!(ks.get(b"a").unwrap().value, b"orig");
        assert!(ks.get(b"b").is_none());
    }

    #[test]
    fn flush_snapshot_restores_everything() {
        let mut ks = Keyspace::new();
        ks.insert(item("a", "1"));
        ks.insert(item("b", "2"));
        let mut wc = WriteContext::new();

        let prev = ks.insert(item("a", "changed"));
        wc.record_item(b"a", prev);
        wc.stage_set(item("a", "changed"));

        let fresh = ks.clear_copy();
        wc.stage_flush(std::mem::replace(&mut ks, fresh));
        assert!(wc.flushed());
        assert_eq!(wc.commit_items().count(), 0);

        let prev = ks.insert(item("c", "3"));
        wc.record_item(b"c", prev);
        wc.stage_set(item("c", "3"));
        assert!(!wc.is_clean());

        wc.rollback(&mut ks);
        assert_eq!(ks.keys.len(), 2);
        assert_eq!(ks.get(b"a").unwrap().value, b"1");
        assert!(ks.get(b"c").is_none());
    }

    #[test]
    fn index_rollback() {
        let mut ks = Keyspace::new();
        ks.insert(item("a", "1"));
        ks.create_index(Index::new("old", "*", Some(index_string()), None, IndexOptions::new()))
            .unwrap();
        let mut wc = WriteContext::new();

        let dropped = ks.drop_index("old").unwrap();
        wc.record_dropped_index(&dropped);
        ks.create_index(Index::new("new", "*", Some(index_string()), None, IndexOptions::new()))
            .unwrap();
        wc.record_created_index("new");

        wc.rollback(&mut ks);
        assert_eq!(ks.indexes.names(), ["old"]);
        assert_eq!(ks.indexes.get("old").unwrap().btree().unwrap().len(), 1);
    }

    #[test]
    fn index_recreated_after_flush_rolls_back() {
        let mut ks = Keyspace::new();
        ks.insert(item("a", "1"));
        ks.create_index(Index::new("idx", "*", Some(index_string()), None, IndexOptions::new()))
            .unwrap();
        let mut wc = WriteContext::new();

        let fresh = ks.clear_copy();
        wc.stage_flush(std::mem::replace(&mut ks, fresh));
        let dropped = ks.drop_index("idx").unwrap();
        wc.record_dropped_index(&dropped);
        ks.create_index(Index::new("idx", "z*", Some(index_string()), None, IndexOptions::new()))
            .unwrap();
        wc.record_created_index("idx");

        wc.rollback(&mut ks);
        let idx = ks.indexes.get("idx").unwrap();
        assert_eq!(idx.pattern(), b"*");
        assert_eq!(idx.btree().unwrap().len(), 1);
    }

    #[test]
    fn commit_items_are_key_ordered() {
        let mut wc = WriteContext::new();
        assert!(wc.is_clean());
        wc.stage_set(item("b", "2"));
        wc.stage_delete(b"a");
        wc.stage_set(item("c", "3"));
        let keys: Vec<_> = wc.commit_items().map(|(k, i)| (k.to_vec(), i.is_some())).collect();
        assert_eq!(
            keys,
            [(b"a".to_vec(), false), (b"b".to_vec(), true), (b"c".to_vec(), true)]
        );
    }
}
