//! Secondary indexes.
//!
//! An index projects the items whose keys match a glob pattern into an
//! alternative order. Ordered indexes sort by one or more `less`
//! functions over values; spatial indexes place values by the bounding
//! box returned from a rect function.
//!
//! # Index Kinds
//!
//! - [`BTreeBacking`]: value order, ties broken by key
//! - [`RTreeBacking`]: bounding boxes for intersection and nearest-first
//!   scans
//!
//! Indexes live only in memory. They are rebuilt from the items on
//! creation and are never written to the log.

mod btree;
pub mod collate;
mod engine;
mod rtree;

pub use btree::BTreeBacking;
pub use engine::{Index, IndexManager};
pub use rtree::{RTreeBacking, DIMENSIONS};

use std::sync::Arc;

/// Strict ordering over two values: returns true if `a` sorts before `b`.
pub type LessFn = Arc<dyn Fn(&[u8], &[u8]) -> bool + Send + Sync>;

/// Maps a value to the `(min, max)` corners of its bounding box.
///
/// An empty `min` leaves the item out of the spatial backing. An empty
/// `max` makes the box a point at `min`.
pub type RectFn = Arc<dyn Fn(&[u8]) -> (Vec<f64>, Vec<f64>) + Send + Sync>;

/// Composes several `less` functions lexicographically.
///
/// Each function except the last breaks ties of the previous ones. The
/// last function decides without an equality check. Returns `None` for an
/// empty slice.
#[must_use]
pub fn compose_less(less: &[LessFn]) -> Option<LessFn> {
    match less.split_last() {
        None => None,
        Some((last, [])) => Some(Arc::clone(last)),
        Some((last, rest)) => {
            let last = Arc::clone(last);
            let rest: Vec<LessFn> = rest.to_vec();
            Some(Arc::new(move |a: &[u8], b: &[u8]| {
                for less in &rest {
                    if less(a, b) {
                        return true;
                    }
                    if less(b, a) {
                        return false;
                    }
                }
                last(a, b)
            }))
        }
    }
}
