//! Spatial backing for secondary indexes.

use crate::index::RectFn;
use crate::types::Item;
use rstar::{ParentNode, RTree, RTreeNode, RTreeObject, AABB};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Number of dimensions stored in the R-tree.
///
/// Shorter coordinate vectors are zero-padded; extra coordinates are ignored.
pub const DIMENSIONS: usize = 4;

type Envelope = AABB<[f64; DIMENSIONS]>;

/// An item placed in the R-tree by its bounding box.
struct SpatialEntry {
    item: Arc<Item>,
    envelope: Envelope,
}

impl RTreeObject for SpatialEntry {
    type Envelope = Envelope;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PartialEq for SpatialEntry {
    fn eq(&self, other: &Self) -> bool {
        self.item.key == other.item.key
    }
}

/// Items of one index placed by a caller-supplied rect function.
pub struct RTreeBacking {
    rect: RectFn,
    tree: RTree<SpatialEntry>,
    envelopes: HashMap<Vec<u8>, Envelope>,
}

impl RTreeBacking {
    /// Creates an empty backing placing items with `rect`.
    pub fn new(rect: RectFn) -> Self {
        Self {
            rect,
            tree: RTree::new(),
            envelopes: HashMap::new(),
        }
    }

    /// Returns the rect function.
    pub fn rect(&self) -> &RectFn {
        &self.rect
    }

    /// Adds `item` if its value yields a usable bounding box.
    pub fn insert(&mut self, item: &Arc<Item>) {
        let (min, max) = (self.rect)(&item.value);
        let Some(envelope) = envelope(&min, &max) else {
            return;
        };
        self.envelopes.insert(item.key.clone(), envelope);
        self.tree.insert(SpatialEntry {
            item: Arc::clone(item),
            envelope,
        });
    }

    /// Removes the entry stored for `item`'s key.
    pub fn remove(&mut self, item: &Arc<Item>) {
        if let Some(envelope) = self.envelopes.remove(&item.key) {
            self.tree.remove(&SpatialEntry {
                item: Arc::clone(item),
                envelope,
            });
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Returns true if the backing is empty.
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Items whose boxes intersect the box of `bounds`, in key order.
    pub fn intersects(&self, bounds: &[u8]) -> Vec<Arc<Item>> {
        let (min, max) = (self.rect)(bounds);
        let Some(query) = envelope(&min, &max) else {
            return Vec::new();
        };
        let mut hits: Vec<_> = self
            .tree
            .locate_in_envelope_intersecting(&query)
            .map(|entry| Arc::clone(&entry.item))
            .collect();
        hits.sort_by(|a, b| a.key.cmp(&b.key));
        hits
    }

    /// Every item with its box distance to the box of `bounds`, nearest
    /// first and then in key order.
    ///
    /// Items are produced lazily by a best-first walk of the tree.
    pub fn nearby(&self, bounds: &[u8]) -> Nearby<'_> {
        let (min, max) = (self.rect)(bounds);
        let mut nearby = Nearby {
            query: envelope(&min, &max),
            heap: BinaryHeap::new(),
        };
        if nearby.query.is_some() {
            for child in self.tree.root().children() {
                nearby.push(child);
            }
        }
        nearby
    }
}

#[derive(Clone, Copy)]
enum Candidate<'a> {
    Node(&'a ParentNode<SpatialEntry>),
    Entry(&'a SpatialEntry),
}

/// Heap slot ordered so the nearest candidate pops first. At equal
/// distance nodes pop before entries and entries pop in key order.
struct Queued<'a> {
    distance: f64,
    candidate: Candidate<'a>,
}

impl Queued<'_> {
    fn rank(&self) -> (u8, &[u8]) {
        match self.candidate {
            Candidate::Node(_) => (0, b"".as_slice()),
            Candidate::Entry(entry) => (1, entry.item.key.as_slice()),
        }
    }
}

impl Ord for Queued<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .total_cmp(&self.distance)
            .then_with(|| other.rank().cmp(&self.rank()))
    }
}

impl PartialOrd for Queued<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Queued<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued<'_> {}

/// Iterator returned by [`RTreeBacking::nearby`].
pub struct Nearby<'a> {
    query: Option<Envelope>,
    heap: BinaryHeap<Queued<'a>>,
}

impl<'a> Nearby<'a> {
    fn push(&mut self, node: &'a RTreeNode<SpatialEntry>) {
        let Some(query) = self.query.as_ref() else {
            return;
        };
        let queued = match node {
            RTreeNode::Leaf(entry) => Queued {
                distance: box_distance(&entry.envelope, query),
                candidate: Candidate::Entry(entry),
            },
            RTreeNode::Parent(parent) => Queued {
                distance: box_distance(&parent.envelope(), query),
                candidate: Candidate::Node(parent),
            },
        };
        self.heap.push(queued);
    }
}

impl<'a> Iterator for Nearby<'a> {
    type Item = (&'a Arc<Item>, f64);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(Queued { distance, candidate }) = self.heap.pop() {
            match candidate {
                Candidate::Entry(entry) => return Some((&entry.item, distance)),
                Candidate::Node(parent) => {
                    for child in parent.children() {
                        self.push(child);
                    }
                }
            }
        }
        None
    }
}

impl fmt::Debug for RTreeBacking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RTreeBacking")
            .field("len", &self.tree.size())
            .finish()
    }
}

/// Builds a box from coordinate vectors.
///
/// An empty `min` means "not spatial". An empty `max` makes a point. NaN
/// coordinates are rejected.
fn envelope(min: &[f64], max: &[f64]) -> Option<Envelope> {
    if min.is_empty() {
        return None;
    }
    let max = if max.is_empty() { min } else { max };
    let lower = pad(min)?;
    let upper = pad(max)?;
    Some(AABB::from_corners(lower, upper))
}

fn pad(coords: &[f64]) -> Option<[f64; DIMENSIONS]> {
    let mut point = [0.0; DIMENSIONS];
    for (slot, &c) in point.iter_mut().zip(coords) {
        if c.is_nan() {
            return None;
        }
        *slot = c;
    }
    Some(point)
}

/// Euclidean distance between two boxes; zero when they touch or overlap.
fn box_distance(a: &Envelope, b: &Envelope) -> f64 {
    let (al, au) = (a.lower(), a.upper());
    let (bl, bu) = (b.lower(), b.upper());
    (0..DIMENSIONS)
        .map(|i| {
            let gap = (bl[i] - au[i]).max(al[i] - bu[i]).max(0.0);
            gap * gap
        })
        .sum::<f64>()
        .sqrt()
}
