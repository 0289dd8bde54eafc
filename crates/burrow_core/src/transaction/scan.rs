//! Ordered, pattern and spatial scans.
//!
//! Every scan takes an index name; the empty name scans the primary keys
//! in byte order. Callbacks receive `(key, value)` and return `false` to
//! stop. Scans visit every stored item, including expired items that have
//! not been swept yet.

use crate::error::{CoreError, CoreResult};
use crate::pattern;
use crate::transaction::Tx;
use crate::types::Item;
use std::cell::Cell;
use std::ops::Bound;
use std::sync::Arc;

/// Marks a writable transaction as iterating until dropped.
struct IterationGuard<'a>(Option<&'a Cell<usize>>);

impl<'a> IterationGuard<'a> {
    fn enter(counter: Option<&'a Cell<usize>>) -> Self {
        if let Some(counter) = counter {
            counter.set(counter.get() + 1);
        }
        Self(counter)
    }
}

impl Drop for IterationGuard<'_> {
    fn drop(&mut self) {
        if let Some(counter) = self.0 {
            counter.set(counter.get() - 1);
        }
    }
}

fn visit<'a, I, F>(items: I, descending: bool, mut f: F)
where
    I: DoubleEndedIterator<Item = &'a Arc<Item>>,
    F: FnMut(&[u8], &[u8]) -> bool,
{
    if descending {
        for item in items.rev() {
            if !f(&item.key, &item.value) {
                break;
            }
        }
    } else {
        for item in items {
            if !f(&item.key, &item.value) {
                break;
            }
        }
    }
}

impl Tx<'_> {
    /// Runs `f` over the items of `index` within the bounds.
    ///
    /// For the primary keys the bounds compare keys; for a secondary index
    /// they compare values with the index ordering.
    fn scan<F>(
        &self,
        index: &str,
        lower: Bound<&[u8]>,
        upper: Bound<&[u8]>,
        descending: bool,
        f: F,
    ) -> CoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let keyspace = self.keyspace()?;
        let _iterating = IterationGuard::enter(self.iterating());
        if index.is_empty() {
            visit(keyspace.keys.range(lower, upper), descending, f);
            return Ok(());
        }

        let index = keyspace.indexes.get(index).ok_or(CoreError::NotFound)?;
        if let Some(btree) = index.btree() {
            visit(btree.range(lower, upper), descending, f);
        }
        Ok(())
    }

    /// Visits every item of `index` in ascending order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the index does not exist.
    pub fn ascend<F>(&self, index: &str, f: F) -> CoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.scan(index, Bound::Unbounded, Bound::Unbounded, false, f)
    }

    /// Visits items at or after `pivot` in ascending order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the index does not exist.
    pub fn ascend_greater_or_equal<F>(&self, index: &str, pivot: &[u8], f: F) -> CoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.scan(index, Bound::Included(pivot), Bound::Unbounded, false, f)
    }

    /// Visits items before `pivot` in ascending order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the index does not exist.
    pub fn ascend_less_than<F>(&self, index: &str, pivot: &[u8], f: F) -> CoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.scan(index, Bound::Unbounded, Bound::Excluded(pivot), false, f)
    }

    /// Visits items in `[greater_or_equal, less_than)` in ascending order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the index does not exist.
    pub fn ascend_range<F>(
        &self,
        index: &str,
        greater_or_equal: &[u8],
        less_than: &[u8],
        f: F,
    ) -> CoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.scan(
            index,
            Bound::Included(greater_or_equal),
            Bound::Excluded(less_than),
            false,
            f,
        )
    }

    /// Visits every item of `index` in descending order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the index does not exist.
    pub fn descend<F>(&self, index: &str, f: F) -> CoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.scan(index, Bound::Unbounded, Bound::Unbounded, true, f)
    }

    /// Visits items after `pivot` in descending order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the index does not exist.
    pub fn descend_greater_than<F>(&self, index: &str, pivot: &[u8], f: F) -> CoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.scan(index, Bound::Excluded(pivot), Bound::Unbounded, true, f)
    }

    /// Visits items at or before `pivot` in descending order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the index does not exist.
    pub fn descend_less_or_equal<F>(&self, index: &str, pivot: &[u8], f: F) -> CoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.scan(index, Bound::Unbounded, Bound::Included(pivot), true, f)
    }

    /// Visits items in `(greater_than, less_or_equal]` in descending order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the index does not exist.
    pub fn descend_range<F>(
        &self,
        index: &str,
        less_or_equal: &[u8],
        greater_than: &[u8],
        f: F,
    ) -> CoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.scan(
            index,
            Bound::Excluded(greater_than),
            Bound::Included(less_or_equal),
            true,
            f,
        )
    }

    /// Visits items equal to `pivot` in ascending order.
    ///
    /// Equality is key equality for the primary keys and "neither sorts
    /// before the other" for a secondary index.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the index does not exist or is not ordered.
    pub fn ascend_equal<F>(&self, index: &str, pivot: &[u8], mut f: F) -> CoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        if index.is_empty() {
            return self.ascend_greater_or_equal(index, pivot, |k, v| k == pivot && f(k, v));
        }
        let less = self.get_less(index)?;
        self.ascend_greater_or_equal(index, pivot, |k, v| !less(pivot, v) && f(k, v))
    }

    /// Visits items equal to `pivot` in descending order.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the index does not exist or is not ordered.
    pub fn descend_equal<F>(&self, index: &str, pivot: &[u8], mut f: F) -> CoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        if index.is_empty() {
            return self.descend_less_or_equal(index, pivot, |k, v| k == pivot && f(k, v));
        }
        let less = self.get_less(index)?;
        self.descend_less_or_equal(index, pivot, |k, v| !less(v, pivot) && f(k, v))
    }

    /// Visits keys matching the glob `pattern` in ascending order.
    ///
    /// An empty pattern matches nothing.
    ///
    /// # Errors
    ///
    /// Returns `TxClosed` after commit or rollback.
    pub fn ascend_keys<F>(&self, pattern: &[u8], f: F) -> CoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.scan_keys(pattern, false, f)
    }

    /// Visits keys matching the glob `pattern` in descending order.
    ///
    /// # Errors
    ///
    /// Returns `TxClosed` after commit or rollback.
    pub fn descend_keys<F>(&self, pattern: &[u8], f: F) -> CoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        self.scan_keys(pattern, true, f)
    }

    fn scan_keys<F>(&self, glob: &[u8], descending: bool, mut f: F) -> CoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let keyspace = self.keyspace()?;
        if glob.is_empty() {
            return Ok(());
        }
        if glob == b"*" {
            return self.scan("", Bound::Unbounded, Bound::Unbounded, descending, f);
        }

        let (min, max) = pattern::bounds(glob);
        let _iterating = IterationGuard::enter(self.iterating());
        let lower = if min.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(min.as_slice())
        };
        let upper = max.as_deref().map_or(Bound::Unbounded, Bound::Included);
        visit(keyspace.keys.range(lower, upper), descending, |k, v| {
            !pattern::matches(k, glob) || f(k, v)
        });
        Ok(())
    }

    /// Visits items of spatial index `index` whose boxes intersect the box
    /// of `bounds`, in key order.
    ///
    /// `bounds` is interpreted by the index's rect function.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the index does not exist.
    pub fn intersects<F>(&self, index: &str, bounds: &[u8], mut f: F) -> CoreResult<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let keyspace = self.keyspace()?;
        let Some(rtree) = keyspace
            .indexes
            .get(index)
            .ok_or(CoreError::NotFound)?
            .rtree()
        else {
            return Ok(());
        };

        let _iterating = IterationGuard::enter(self.iterating());
        for item in rtree.intersects(bounds) {
            if !f(&item.key, &item.value) {
                break;
            }
        }
        Ok(())
    }

    /// Visits every item of spatial index `index`, nearest to the box of
    /// `bounds` first. The callback also receives the box distance.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the index does not exist.
    pub fn nearby<F>(&self, index: &str, bounds: &[u8], mut f: F) -> CoreResult<()>
    where
        F: FnMut(&[u8], &[u8], f64) -> bool,
    {
        let keyspace = self.keyspace()?;
        let Some(rtree) = keyspace
            .indexes
            .get(index)
            .ok_or(CoreError::NotFound)?
            .rtree()
        else {
            return Ok(());
        };

        let _iterating = IterationGuard::enter(self.iterating());
        for (item, dist) in rtree.nearby(bounds) {
            if !f(&item.key, &item.value, dist) {
                break;
            }
        }
        Ok(())
    }
}
