//! Primary item store and expiration index.

use crate::types::Item;
use std::collections::btree_map;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;
use std::time::SystemTime;

/// Items ordered by raw key bytes.
///
/// Items are shared by `Arc` with the secondary indexes that project them.
#[derive(Debug, Default, Clone)]
pub struct ItemStore {
    items: BTreeMap<Vec<u8>, Arc<Item>>,
}

impl ItemStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the item stored under `key`.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&Arc<Item>> {
        self.items.get(key)
    }

    /// Inserts `item`, returning the item it replaced.
    pub fn set(&mut self, item: Arc<Item>) -> Option<Arc<Item>> {
        self.items.insert(item.key.clone(), item)
    }

    /// Removes and returns the item stored under `key`.
    pub fn delete(&mut self, key: &[u8]) -> Option<Arc<Item>> {
        self.items.remove(key)
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the store holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates all items in key order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Arc<Item>> {
        self.items.values()
    }

    /// Iterates items whose keys fall within the bounds, in key order.
    ///
    /// Empty or inverted bounds yield nothing.
    pub fn range<'a>(
        &'a self,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
    ) -> Range<'a> {
        if is_empty_range(lower, upper) {
            return Range { inner: None };
        }
        Range {
            inner: Some(self.items.range::<[u8], _>((lower, upper))),
        }
    }
}

/// Iterator returned by [`ItemStore::range`].
pub struct Range<'a> {
    inner: Option<btree_map::Range<'a, Vec<u8>, Arc<Item>>>,
}

impl<'a> Iterator for Range<'a> {
    type Item = &'a Arc<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.as_mut()?.next().map(|(_, item)| item)
    }
}

impl DoubleEndedIterator for Range<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.as_mut()?.next_back().map(|(_, item)| item)
    }
}

/// Returns true if no value can satisfy both bounds.
///
/// `BTreeMap::range` panics on such bounds, so callers check first.
pub(crate) fn is_empty_range<T: Ord + ?Sized>(lower: Bound<&T>, upper: Bound<&T>) -> bool {
    match (lower, upper) {
        (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
        (Bound::Included(lo), Bound::Excluded(hi))
        | (Bound::Excluded(lo), Bound::Included(hi))
        | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo >= hi,
        _ => false,
    }
}

/// Position of an item in the expiration order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ExpiryEntry {
    at: SystemTime,
    key: Vec<u8>,
}

/// Keys with a TTL, ordered by expiration instant and then by key.
///
/// Items without a TTL never enter the index, which is equivalent to
/// sorting them after every entry.
#[derive(Debug, Default, Clone)]
pub struct ExpirationIndex {
    entries: BTreeSet<ExpiryEntry>,
}

impl ExpirationIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `item` if it has an expiry.
    pub fn insert(&mut self, item: &Item) {
        if let Some(at) = item.expires {
            self.entries.insert(ExpiryEntry {
                at,
                key: item.key.clone(),
            });
        }
    }

    /// Stops tracking `item`.
    pub fn remove(&mut self, item: &Item) {
        if let Some(at) = item.expires {
            self.entries.remove(&ExpiryEntry {
                at,
                key: item.key.clone(),
            });
        }
    }

    /// Keys whose expiry is at or before `now`, earliest first.
    #[must_use]
    pub fn expired_at(&self, now: SystemTime) -> Vec<Vec<u8>> {
        self.entries
            .iter()
            .take_while(|entry| entry.at <= now)
            .map(|entry| entry.key.clone())
            .collect()
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no key has a TTL.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn item(key: &str) -> Arc<Item> {
        Arc::new(Item::new(key, format!("v-{key}")))
    }

    #[test]
    fn set_returns_previous() {
        let mut store = ItemStore::new();
        assert!(store.set(item("a")).is_none());
        let prev = store.set(Arc::new(Item::new("a", "new"))).unwrap();
        assert_eq!(prev.value, b"v-a");
        assert_eq!(store.get(b"a").unwrap().value, b"new");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_absent_is_none() {
        let mut store = ItemStore::new();
        assert!(store.delete(b"missing").is_none());
        store.set(item("x"));
        assert_eq!(store.delete(b"x").unwrap().key, b"x");
        assert!(store.is_empty());
    }

    #[test]
    fn range_orders_by_raw_bytes() {
        let mut store = ItemStore::new();
        for key in ["b", "a", "B", "ab"] {
            store.set(item(key));
        }

        let keys: Vec<_> = store.iter().map(|i| i.key.clone()).collect();
        assert_eq!(keys, [b"B".to_vec(), b"a".to_vec(), b"ab".to_vec(), b"b".to_vec()]);

        let keys: Vec<_> = store
            .range(Bound::Included(&b"a"[..]), Bound::Excluded(&b"b"[..]))
            .map(|i| i.key.clone())
            .collect();
        assert_eq!(keys, [b"a".to_vec(), b"ab".to_vec()]);

        let keys: Vec<_> = store
            .range(Bound::Unbounded, Bound::Included(&b"ab"[..]))
            .rev()
            .map(|i| i.key.clone())
            .collect();
        assert_eq!(keys, [b"ab".to_vec(), b"a".to_vec(), b"B".to_vec()]);
    }

    #[test]
    fn inverted_range_is_empty() {
        let mut store = ItemStore::new();
        store.set(item("a"));
        store.set(item("z"));
        assert_eq!(
            store
                .range(Bound::Included(&b"z"[..]), Bound::Excluded(&b"a"[..]))
                .count(),
            0
        );
        assert_eq!(
            store
                .range(Bound::Excluded(&b"a"[..]), Bound::Excluded(&b"a"[..]))
                .count(),
            0
        );
    }

    #[test]
    fn expiration_orders_by_time_then_key() {
        let now = SystemTime::now();
        let mut exps = ExpirationIndex::new();
        exps.insert(&Item::new("late", "v").with_expiry(now + Duration::from_secs(10)));
        exps.insert(&Item::new("b", "v").with_expiry(now));
        exps.insert(&Item::new("a", "v").with_expiry(now));
        exps.insert(&Item::new("forever", "v"));

        assert_eq!(exps.len(), 3);
        assert_eq!(exps.expired_at(now), [b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(exps.expired_at(now + Duration::from_secs(60)).len(), 3);
    }

    #[test]
    fn expiration_remove_uses_item_expiry() {
        let now = SystemTime::now();
        let expiring = Item::new("k", "v").with_expiry(now);
        let mut exps = ExpirationIndex::new();
        exps.insert(&expiring);
        exps.remove(&Item::new("k", "v"));
        assert_eq!(exps.len(), 1);
        exps.remove(&expiring);
        assert!(exps.is_empty());
    }
}
