//! Named secondary indexes and their maintenance.
//!
//! The [`IndexManager`] owns every index of a database. Each item written
//! to the primary store is offered to every index; an index keeps it only
//! if the key matches the index pattern.

use crate::error::{CoreError, CoreResult};
use crate::index::{BTreeBacking, LessFn, RTreeBacking, RectFn};
use crate::pattern;
use crate::store::ItemStore;
use crate::types::{IndexOptions, Item};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A named projection of the items whose keys match a glob pattern.
///
/// An index holds an ordered backing when created with `less`
/// functions, a spatial backing when created with a rect function, or
/// both.
pub struct Index {
    name: String,
    pattern: Vec<u8>,
    options: IndexOptions,
    btree: Option<BTreeBacking>,
    rtree: Option<RTreeBacking>,
}

impl Index {
    /// Creates an empty index.
    ///
    /// Case-insensitive indexes store their pattern lowercased.
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        less: Option<LessFn>,
        rect: Option<RectFn>,
        options: IndexOptions,
    ) -> Self {
        let pattern = if options.case_insensitive_key_matching {
            pattern.to_ascii_lowercase()
        } else {
            pattern.to_string()
        };
        Self {
            name: name.into(),
            pattern: pattern.into_bytes(),
            options,
            btree: less.map(BTreeBacking::new),
            rtree: rect.map(RTreeBacking::new),
        }
    }

    /// Index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key pattern, lowercased for case-insensitive indexes.
    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    /// Creation options.
    pub fn options(&self) -> IndexOptions {
        self.options
    }

    /// The composed ordering function, if the index is ordered.
    pub fn less(&self) -> Option<&LessFn> {
        self.btree.as_ref().map(BTreeBacking::less)
    }

    /// The rect function, if the index is spatial.
    pub fn rect(&self) -> Option<&RectFn> {
        self.rtree.as_ref().map(RTreeBacking::rect)
    }

    /// The ordered backing.
    pub fn btree(&self) -> Option<&BTreeBacking> {
        self.btree.as_ref()
    }

    /// The spatial backing.
    pub fn rtree(&self) -> Option<&RTreeBacking> {
        self.rtree.as_ref()
    }

    /// Returns true if items stored under `key` belong to this index.
    pub fn matches(&self, key: &[u8]) -> bool {
        if self.pattern == b"*" {
            return true;
        }
        if self.options.case_insensitive_key_matching {
            pattern::matches_case_insensitive(key, &self.pattern)
        } else {
            pattern::matches(key, &self.pattern)
        }
    }

    /// Adds `item` to every backing if its key matches.
    pub fn insert(&mut self, item: &Arc<Item>) {
        if !self.matches(&item.key) {
            return;
        }
        if let Some(btree) = &mut self.btree {
            btree.insert(item);
        }
        if let Some(rtree) = &mut self.rtree {
            rtree.insert(item);
        }
    }

    /// Removes `item` from every backing.
    pub fn remove(&mut self, item: &Arc<Item>) {
        if !self.matches(&item.key) {
            return;
        }
        if let Some(btree) = &mut self.btree {
            btree.remove(item);
        }
        if let Some(rtree) = &mut self.rtree {
            rtree.remove(item);
        }
    }

    /// Returns an empty index with the same name, pattern and functions.
    pub fn clear_copy(&self) -> Self {
        Self {
            name: self.name.clone(),
            pattern: self.pattern.clone(),
            options: self.options,
            btree: self.less().map(|less| BTreeBacking::new(Arc::clone(less))),
            rtree: self.rect().map(|rect| RTreeBacking::new(Arc::clone(rect))),
        }
    }

    /// Discards the backings and re-derives them from `items`.
    pub fn rebuild(&mut self, items: &ItemStore) {
        *self = self.clear_copy();
        for item in items.iter() {
            self.insert(item);
        }
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.name)
            .field("pattern", &String::from_utf8_lossy(&self.pattern))
            .field("options", &self.options)
            .field("btree", &self.btree)
            .field("rtree", &self.rtree)
            .finish()
    }
}

/// All secondary indexes of a database, by name.
#[derive(Debug, Default)]
pub struct IndexManager {
    indexes: HashMap<String, Index>,
}

impl IndexManager {
    /// Creates a manager without indexes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds `index` from `items` and registers it.
    ///
    /// # Errors
    ///
    /// Returns `IndexExists` if the name is empty (reserved for the
    /// primary keys) or already taken.
    pub fn create(&mut self, mut index: Index, items: &ItemStore) -> CoreResult<()> {
        if index.name.is_empty() || self.indexes.contains_key(&index.name) {
            return Err(CoreError::IndexExists);
        }
        index.rebuild(items);
        self.indexes.insert(index.name.clone(), index);
        Ok(())
    }

    /// Registers an index that is already built, replacing any index of
    /// the same name.
    pub fn restore(&mut self, index: Index) {
        self.indexes.insert(index.name.clone(), index);
    }

    /// Removes and returns the index called `name`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` for the empty name and `NotFound` if no
    /// such index exists.
    pub fn drop_index(&mut self, name: &str) -> CoreResult<Index> {
        if name.is_empty() {
            return Err(CoreError::invalid_operation(
                "cannot drop the primary key index",
            ));
        }
        self.indexes.remove(name).ok_or(CoreError::NotFound)
    }

    /// Returns the index called `name`.
    pub fn get(&self, name: &str) -> Option<&Index> {
        self.indexes.get(name)
    }

    /// Index names in ascending order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indexes.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Number of indexes.
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    /// Returns true if there are no indexes.
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Offers `item` to every index.
    pub fn insert_item(&mut self, item: &Arc<Item>) {
        for index in self.indexes.values_mut() {
            index.insert(item);
        }
    }

    /// Withdraws `item` from every index.
    pub fn remove_item(&mut self, item: &Arc<Item>) {
        for index in self.indexes.values_mut() {
            index.remove(item);
        }
    }

    /// Returns a manager with empty copies of every index.
    pub fn clear_copy(&self) -> Self {
        Self {
            indexes: self
                .indexes
                .iter()
                .map(|(name, index)| (name.clone(), index.clear_copy()))
                .collect(),
        }
    }
}
