//! Ordered backing for secondary indexes.

use crate::index::LessFn;
use crate::store::is_empty_range;
use crate::types::Item;
use std::cmp::Ordering;
use std::collections::btree_set;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

/// Where an entry sits relative to stored items with an equal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Marker {
    /// Boundary sorting before every stored item with an equal value.
    Before,
    /// A stored item.
    Stored,
    /// Boundary sorting after every stored item with an equal value.
    After,
}

/// An item positioned by the index's `less` function.
///
/// Entries order by `less` on values, then by key. Boundary entries are
/// keyless probes used only to position range scans.
struct IndexEntry {
    item: Arc<Item>,
    marker: Marker,
    less: LessFn,
}

impl IndexEntry {
    fn stored(item: Arc<Item>, less: &LessFn) -> Self {
        Self {
            item,
            marker: Marker::Stored,
            less: Arc::clone(less),
        }
    }

    fn boundary(value: &[u8], marker: Marker, less: &LessFn) -> Self {
        Self {
            item: Arc::new(Item::new(Vec::new(), value)),
            marker,
            less: Arc::clone(less),
        }
    }
}

impl Ord for IndexEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        if (self.less)(&self.item.value, &other.item.value) {
            return Ordering::Less;
        }
        if (self.less)(&other.item.value, &self.item.value) {
            return Ordering::Greater;
        }
        match (self.marker, other.marker) {
            (Marker::Stored, Marker::Stored) => self.item.key.cmp(&other.item.key),
            (a, b) => a.cmp(&b),
        }
    }
}

impl PartialOrd for IndexEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for IndexEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexEntry {}

/// Items of one index ordered by a caller-supplied `less` function.
///
/// Ties on value fall back to raw key order, so the order is total.
pub struct BTreeBacking {
    less: LessFn,
    entries: BTreeSet<IndexEntry>,
}

impl BTreeBacking {
    /// Creates an empty backing ordered by `less`.
    pub fn new(less: LessFn) -> Self {
        Self {
            less,
            entries: BTreeSet::new(),
        }
    }

    /// Returns the ordering function.
    pub fn less(&self) -> &LessFn {
        &self.less
    }

    /// Adds `item`.
    pub fn insert(&mut self, item: &Arc<Item>) {
        self.entries
            .insert(IndexEntry::stored(Arc::clone(item), &self.less));
    }

    /// Removes `item`, located by its value and key.
    pub fn remove(&mut self, item: &Arc<Item>) {
        self.entries
            .remove(&IndexEntry::stored(Arc::clone(item), &self.less));
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the backing is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries whose values fall within the bounds.
    ///
    /// Bounds compare values only: every item whose value ties with an
    /// inclusive bound is yielded and every item whose value ties with an
    /// exclusive bound is skipped.
    pub fn range(&self, lower: Bound<&[u8]>, upper: Bound<&[u8]>) -> BTreeRange<'_> {
        let lower = match lower {
            Bound::Included(v) => Some(IndexEntry::boundary(v, Marker::Before, &self.less)),
            Bound::Excluded(v) => Some(IndexEntry::boundary(v, Marker::After, &self.less)),
            Bound::Unbounded => None,
        };
        let upper = match upper {
            Bound::Included(v) => Some(IndexEntry::boundary(v, Marker::After, &self.less)),
            Bound::Excluded(v) => Some(IndexEntry::boundary(v, Marker::Before, &self.less)),
            Bound::Unbounded => None,
        };

        // Boundaries never equal a stored entry, so exclusive bounds suffice.
        let lower = lower.as_ref().map_or(Bound::Unbounded, Bound::Excluded);
        let upper = upper.as_ref().map_or(Bound::Unbounded, Bound::Excluded);
        if is_empty_range(lower, upper) {
            return BTreeRange { inner: None };
        }
        BTreeRange {
            inner: Some(self.entries.range::<IndexEntry, _>((lower, upper))),
        }
    }
}

impl fmt::Debug for BTreeBacking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BTreeBacking")
            .field("len", &self.entries.len())
            .finish()
    }
}

/// Iterator returned by [`BTreeBacking::range`].
pub struct BTreeRange<'a> {
    inner: Option<btree_set::Range<'a, IndexEntry>>,
}

impl<'a> Iterator for BTreeRange<'a> {
    type Item = &'a Arc<Item>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.as_mut()?.next().map(|entry| &entry.item)
    }
}

impl DoubleEndedIterator for BTreeRange<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.as_mut()?.next_back().map(|entry| &entry.item)
    }
}
