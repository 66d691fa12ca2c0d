//! Point-Region quadtree.
//!
//! Space is decomposed ahead of the data: the root spans a square of side
//! 2^k centered at the origin and every split halves the side, so the same
//! point set always produces the same tree regardless of insertion order.
//! Leaves hold up to `bucket` points; an overflowing leaf splits into four
//! quadrants and a draining branch collapses back into a leaf.

mod node;

use crate::pqueue::BoundedPriorityQueue;
use crate::Point;
use node::Node;

#[derive(Debug, Clone)]
pub struct Quadtree {
    // absent root means an empty tree
    root: Option<Box<Node>>,
    extent: u32,
    bucket: usize,
    count: usize,
}

impl Quadtree {
    /// A tree spanning a square of side `2^extent` centered at the origin,
    /// whose leaves hold at most `bucket` points.
    ///
    /// Panics if `bucket` is zero.
    pub fn new(extent: u32, bucket: usize) -> Self {
        assert!(bucket >= 1, "bucketing parameter must be at least 1");
        Self {
            root: None,
            extent,
            bucket,
            count: 0,
        }
    }

    /// Exponent of the root quadrant's side length.
    pub fn extent(&self) -> u32 {
        self.extent
    }

    /// Maximum number of points a leaf holds before it splits.
    pub fn bucket_size(&self) -> usize {
        self.bucket
    }

    /// Number of points currently stored.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Height of the tree: -1 when empty, 0 for a single leaf.
    pub fn height(&self) -> i32 {
        self.root.as_ref().map_or(-1, |root| root.height())
    }

    /// Return whether `p` is within the bounds of the root quadrant.
    pub fn intersects(&self, p: &Point) -> bool {
        let half = f64::from(self.extent).exp2() / 2.0;
        let x = f64::from(p[0]);
        let y = f64::from(p[1]);
        -half <= x && x < half && -half <= y && y < half
    }

    /// Return [min, max] corners of the bounds of this tree.
    pub fn bounds(&self) -> (Point, Point) {
        let half = if self.extent >= 1 {
            1 << (self.extent - 1)
        } else {
            0
        };
        (Point::new(-half, -half), Point::new(half, half))
    }

    /// Insert `p`. Points outside the root quadrant are rejected and handed
    /// back; inserting a point that is already stored is a no-op.
    pub fn insert(&mut self, p: Point) -> Result<(), Point> {
        if !self.intersects(&p) {
            return Err(p);
        }

        match self.root.take() {
            None => {
                // first point: the root quadrant's centroid is the origin
                self.root = Some(Box::new(Node::leaf(Point::new(0, 0), self.extent, p)));
                self.count += 1;
            }
            Some(root) => {
                if root.search(&p) {
                    self.root = Some(root);
                } else {
                    self.root = Some(Box::new((*root).insert(p, self.bucket)));
                    self.count += 1;
                }
            }
        }
        Ok(())
    }

    /// Insert every point of `it`. Panics on out-of-bounds points.
    pub fn extend<It>(&mut self, it: It)
    where
        It: IntoIterator<Item = Point>,
    {
        for p in it {
            self.insert(p).unwrap();
        }
    }

    /// Remove `p`. Deleting a point that is not stored is a no-op.
    pub fn delete(&mut self, p: &Point) {
        if let Some(root) = self.root.take() {
            if root.search(p) {
                self.root = (*root).delete(p, self.bucket).map(Box::new);
                self.count -= 1;
            } else {
                self.root = Some(root);
            }
        }
    }

    pub fn search(&self, p: &Point) -> bool {
        self.root.as_ref().map_or(false, |root| root.search(p))
    }

    pub fn clear(&mut self) {
        self.root = None;
        self.count = 0;
    }

    /// Every stored point within `radius` of `p` (inclusive boundary), in
    /// discovery order.
    pub fn range(&self, p: &Point, radius: f64) -> Vec<Point> {
        let mut out = Vec::new();
        if let Some(root) = &self.root {
            root.range(p, radius, &mut out);
        }
        out
    }

    /// The closest stored point to `p`, never `p` itself. `None` when no
    /// other point is stored.
    pub fn nearest_neighbor(&self, p: &Point) -> Option<Point> {
        let root = self.root.as_ref()?;
        root.nearest_neighbor(p, None).map(|(q, _)| q)
    }

    /// The up to `k` closest stored points to `p`, excluding `p` itself,
    /// as a queue that drains in ascending distance order. Holds fewer than
    /// `k` elements when the tree has fewer eligible points.
    ///
    /// Panics if `k` is zero.
    pub fn k_nearest_neighbors(&self, k: usize, p: &Point) -> BoundedPriorityQueue<Point> {
        assert!(k >= 1, "k must be a positive number of neighbors");
        let mut queue = BoundedPriorityQueue::new(k);
        if let Some(root) = &self.root {
            root.k_nearest_neighbors(p, &mut queue);
        }
        queue
    }

    /// Human-readable outline of the node structure, one line per node,
    /// indented by depth. `*` marks an empty slot.
    pub fn describe(&self) -> Vec<String> {
        let mut out = Vec::new();
        match &self.root {
            Some(root) => root.describe_into(0, &mut out),
            None => out.push("*".to_string()),
        }
        out
    }
}

#[cfg(test)]
impl Quadtree {
    pub(crate) fn assert_invariants(&self) {
        if let Some(root) = &self.root {
            root.assert_invariants(self.bucket);
        }
    }
}
