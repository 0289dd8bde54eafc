//! The live data of a database: items, expirations and indexes.

use crate::error::CoreResult;
use crate::index::{Index, IndexManager};
use crate::store::{ExpirationIndex, ItemStore};
use crate::types::Item;
use std::sync::Arc;

/// Items with the structures derived from them.
///
/// Every mutation goes through [`Keyspace::insert`] or
/// [`Keyspace::delete`] so the expiration index and the secondary indexes
/// always mirror the item store.
#[derive(Debug, Default)]
pub(crate) struct Keyspace {
    pub(crate) keys: ItemStore,
    pub(crate) exps: ExpirationIndex,
    pub(crate) indexes: IndexManager,
}

impl Keyspace {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<&Arc<Item>> {
        self.keys.get(key)
    }

    /// Stores `item`, returning the item it replaced.
    pub(crate) fn insert(&mut self, item: Arc<Item>) -> Option<Arc<Item>> {
        let prev = self.keys.set(Arc::clone(&item));
        if let Some(prev) = &prev {
            self.exps.remove(prev);
            self.indexes.remove_item(prev);
        }
        self.exps.insert(&item);
        self.indexes.insert_item(&item);
        prev
    }

    /// Removes the item stored under `key`.
    pub(crate) fn delete(&mut self, key: &[u8]) -> Option<Arc<Item>> {
        let prev = self.keys.delete(key)?;
        self.exps.remove(&prev);
        self.indexes.remove_item(&prev);
        Some(prev)
    }

    pub(crate) fn create_index(&mut self, index: Index) -> CoreResult<()> {
        self.indexes.create(index, &self.keys)
    }

    pub(crate) fn drop_index(&mut self, name: &str) -> CoreResult<Index> {
        self.indexes.drop_index(name)
    }

    /// Rebuilds `index` from the current items and registers it.
    pub(crate) fn restore_index(&mut self, mut index: Index) {
        index.rebuild(&self.keys);
        self.indexes.restore(index);
    }

    /// An empty keyspace keeping the index definitions.
    pub(crate) fn clear_copy(&self) -> Self {
        Self {
            keys: ItemStore::new(),
            exps: ExpirationIndex::new(),
            indexes: self.indexes.clear_copy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::collate::index_string;
    use crate::types::IndexOptions;
    use std::ops::Bound;
    use std::time::{Duration, SystemTime};

    fn by_value(ks: &Keyspace) -> Vec<Vec<u8>> {
        ks.indexes
            .get("v")
            .unwrap()
            .btree()
            .unwrap()
            .range(Bound::Unbounded, Bound::Unbounded)
            .map(|i| i.key.clone())
            .collect()
    }

    #[test]
    fn insert_mirrors_into_every_structure() {
        let mut ks = Keyspace::new();
        ks.create_index(Index::new("v", "*", Some(index_string()), None, IndexOptions::new()))
            .unwrap();

        let soon = SystemTime::now() + Duration::from_secs(60);
        ks.insert(Arc::new(Item::new("a", "2").with_expiry(soon)));
        ks.insert(Arc::new(Item::new("b", "1")));
        assert_eq!(ks.exps.len(), 1);
        assert_eq!(by_value(&ks), [b"b".to_vec(), b"a".to_vec()]);

        // Overwrite drops the old expiry and old index position.
        let prev = ks.insert(Arc::new(Item::new("a", "0"))).unwrap();
        assert_eq!(prev.value, b"2");
        assert!(ks.exps.is_empty());
        assert_eq!(by_value(&ks), [b"a".to_vec(), b"b".to_vec()]);

        ks.delete(b"a").unwrap();
        assert_eq!(by_value(&ks), [b"b".to_vec()]);
        assert!(ks.delete(b"a").is_none());
    }

    #[test]
    fn clear_copy_is_empty_with_indexes() {
        let mut ks = Keyspace::new();
        ks.insert(Arc::new(Item::new("a", "1")));
        ks.create_index(Index::new("v", "*", Some(index_string()), None, IndexOptions::new()))
            .unwrap();

        let copy = ks.clear_copy();
        assert!(copy.keys.is_empty());
        assert_eq!(copy.indexes.names(), ["v"]);
        assert!(by_value(&copy).is_empty());
    }

    #[test]
    fn restore_index_rebuilds() {
        let mut ks = Keyspace::new();
        ks.insert(Arc::new(Item::new("a", "1")));
        ks.create_index(Index::new("v", "*", Some(index_string()), None, IndexOptions::new()))
            .unwrap();
        let dropped = ks.drop_index("v").unwrap();
        ks.insert(Arc::new(Item::new("b", "0")));

        ks.restore_index(dropped.clear_copy());
        assert_eq!(by_value(&ks), [b"b".to_vec(), b"a".to_vec()]);
    }
}
