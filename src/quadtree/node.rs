use arrayvec::ArrayVec;

use crate::pqueue::BoundedPriorityQueue;
use crate::Point;

/// Fixed priority order of the child slots in a branch.
const QUADRANTS: [Quadrant; 4] = [Quadrant::Nw, Quadrant::Ne, Quadrant::Sw, Quadrant::Se];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quadrant {
    Nw = 0,
    Ne = 1,
    Sw = 2,
    Se = 3,
}

impl Quadrant {
    /// Quadrant of `p` relative to `centroid`. Coordinates equal to the
    /// centroid belong to the >= side on both axes.
    fn of(centroid: &Point, p: &Point) -> Self {
        match (p[0] >= centroid[0], p[1] >= centroid[1]) {
            (true, true) => Quadrant::Ne,
            (true, false) => Quadrant::Se,
            (false, true) => Quadrant::Nw,
            (false, false) => Quadrant::Sw,
        }
    }

    fn signs(self) -> [i32; 2] {
        match self {
            Quadrant::Nw => [-1, 1],
            Quadrant::Ne => [1, 1],
            Quadrant::Sw => [-1, -1],
            Quadrant::Se => [1, -1],
        }
    }
}

/// A subtree. An empty subtree is the absence of a `Node`: both the root slot
/// and branch child slots are `Option<Box<Node>>`, so nothing is allocated
/// for empty regions.
///
/// `insert` and `delete` consume the node and return the replacement subtree
/// root; the caller stores whatever comes back. Splits and collapses are
/// therefore atomic from the parent's point of view and no child ever needs
/// a back-reference.
#[derive(Debug, Clone)]
pub(super) enum Node {
    Leaf(Leaf),
    Branch(Branch),
}

#[derive(Debug, Clone)]
pub(super) struct Leaf {
    centroid: Point,
    // side length of the spanned quadrant is 2^extent
    extent: u32,
    points: Vec<Point>,
}

#[derive(Debug, Clone)]
pub(super) struct Branch {
    centroid: Point,
    extent: u32,
    // slot order: NW, NE, SW, SE
    children: [Option<Box<Node>>; 4],
}

impl Node {
    /// A fresh leaf holding only `p`.
    pub(super) fn leaf(centroid: Point, extent: u32, p: Point) -> Self {
        Node::Leaf(Leaf {
            centroid,
            extent,
            points: vec![p],
        })
    }

    fn centroid(&self) -> &Point {
        match self {
            Node::Leaf(leaf) => &leaf.centroid,
            Node::Branch(branch) => &branch.centroid,
        }
    }

    fn extent(&self) -> u32 {
        match self {
            Node::Leaf(leaf) => leaf.extent,
            Node::Branch(branch) => branch.extent,
        }
    }

    pub(super) fn insert(self, p: Point, bucket: usize) -> Node {
        match self {
            Node::Leaf(leaf) => leaf.insert(p, bucket),
            Node::Branch(branch) => Node::Branch(branch.insert(p, bucket)),
        }
    }

    /// Remove `p`, returning the replacement subtree or `None` if the whole
    /// subtree vanished with it.
    pub(super) fn delete(self, p: &Point, bucket: usize) -> Option<Node> {
        match self {
            Node::Leaf(leaf) => leaf.delete(p),
            Node::Branch(branch) => Some(branch.delete(p, bucket)),
        }
    }

    pub(super) fn search(&self, p: &Point) -> bool {
        match self {
            Node::Leaf(leaf) => leaf.points.contains(p),
            Node::Branch(branch) => branch.search(p),
        }
    }

    pub(super) fn height(&self) -> i32 {
        match self {
            Node::Leaf(_) => 0,
            Node::Branch(branch) => branch.height(),
        }
    }

    pub(super) fn count(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.points.len(),
            Node::Branch(branch) => branch.count(),
        }
    }

    pub(super) fn range(&self, anchor: &Point, radius: f64, out: &mut Vec<Point>) {
        match self {
            Node::Leaf(leaf) => leaf.range(anchor, radius, out),
            Node::Branch(branch) => branch.range(anchor, radius, out),
        }
    }

    pub(super) fn nearest_neighbor(
        &self,
        anchor: &Point,
        best: Option<(Point, f64)>,
    ) -> Option<(Point, f64)> {
        match self {
            Node::Leaf(leaf) => leaf.nearest_neighbor(anchor, best),
            Node::Branch(branch) => branch.nearest_neighbor(anchor, best),
        }
    }

    pub(super) fn k_nearest_neighbors(
        &self,
        anchor: &Point,
        queue: &mut BoundedPriorityQueue<Point>,
    ) {
        match self {
            Node::Leaf(leaf) => leaf.k_nearest_neighbors(anchor, queue),
            Node::Branch(branch) => branch.k_nearest_neighbors(anchor, queue),
        }
    }

    /// Whether the square spanned by this node intersects the circle of
    /// `radius` around `anchor`. Used to skip subtrees during range search.
    ///
    /// The half-extent never shrinks below one unit: at extent 0 the stored
    /// centroid is the parent's (the child offset truncates to zero there),
    /// so the covered cell can sit anywhere in the surrounding unit box.
    fn intersects_circle(&self, anchor: &Point, radius: f64) -> bool {
        let half = (f64::from(self.extent()).exp2() / 2.0).max(1.0);
        let centroid = self.centroid();
        let ax = f64::from(anchor[0]);
        let ay = f64::from(anchor[1]);
        let dx = ax.max(f64::from(centroid[0]) - half).min(f64::from(centroid[0]) + half) - ax;
        let dy = ay.max(f64::from(centroid[1]) - half).min(f64::from(centroid[1]) + half) - ay;
        (dx * dx + dy * dy).sqrt() <= radius
    }

    /// One line per node, indented by depth; `*` marks an empty child slot.
    pub(super) fn describe_into(&self, depth: usize, out: &mut Vec<String>) {
        let pad = " ".repeat(depth);
        match self {
            Node::Leaf(leaf) => {
                let mut line = format!("{}C:({},{})", pad, leaf.centroid[0], leaf.centroid[1]);
                for p in &leaf.points {
                    line.push_str(&format!(" , P:({},{})", p[0], p[1]));
                }
                out.push(line);
            }
            Node::Branch(branch) => {
                out.push(format!("{}C:({},{})", pad, branch.centroid[0], branch.centroid[1]));
                for slot in branch.children.iter() {
                    match slot {
                        Some(child) => child.describe_into(depth + 1, out),
                        None => out.push(format!("{}*", " ".repeat(depth + 1))),
                    }
                }
            }
        }
    }
}

impl Leaf {
    fn insert(mut self, p: Point, bucket: usize) -> Node {
        if self.points.contains(&p) {
            return Node::Leaf(self);
        }
        if self.points.len() < bucket {
            self.points.push(p);
            return Node::Leaf(self);
        }

        // Bucket overflow: subdivide and re-route every held point. Splitting
        // may cascade if the points still share a child quadrant.
        assert!(
            self.extent >= 1,
            "can not split a quadrant of side 1; the bucketing parameter is \
             too small for this point density"
        );
        let mut branch = Node::Branch(Branch::new(self.centroid, self.extent));
        for q in self.points {
            branch = branch.insert(q, bucket);
        }
        branch.insert(p, bucket)
    }

    fn delete(mut self, p: &Point) -> Option<Node> {
        match self.points.iter().position(|q| q == p) {
            Some(at) => {
                self.points.swap_remove(at);
                if self.points.is_empty() {
                    None
                } else {
                    Some(Node::Leaf(self))
                }
            }
            None => Some(Node::Leaf(self)),
        }
    }

    fn range(&self, anchor: &Point, radius: f64, out: &mut Vec<Point>) {
        for p in &self.points {
            if p.dist(anchor) <= radius {
                out.push(*p);
            }
        }
    }

    fn nearest_neighbor(
        &self,
        anchor: &Point,
        mut best: Option<(Point, f64)>,
    ) -> Option<(Point, f64)> {
        for p in &self.points {
            // the anchor itself is never its own neighbor
            if p == anchor {
                continue;
            }
            let d = p.dist(anchor);
            match best {
                Some((_, best_dist)) if d >= best_dist => {}
                _ => best = Some((*p, d)),
            }
        }
        best
    }

    fn k_nearest_neighbors(&self, anchor: &Point, queue: &mut BoundedPriorityQueue<Point>) {
        for p in &self.points {
            if p != anchor {
                // the queue's eviction policy decides retention
                queue.enqueue(*p, p.dist(anchor));
            }
        }
    }
}

impl Branch {
    fn new(centroid: Point, extent: u32) -> Self {
        debug_assert!(extent >= 1);
        Self {
            centroid,
            extent,
            children: [None, None, None, None],
        }
    }

    /// Centroid of the child spanning `quadrant`: offset by 2^(extent-2) per
    /// axis. The offset truncates to zero at extent 1, where the children
    /// share this node's centroid.
    fn child_centroid(&self, quadrant: Quadrant) -> Point {
        let offset = if self.extent >= 2 {
            1 << (self.extent - 2)
        } else {
            0
        };
        let [sx, sy] = quadrant.signs();
        Point::new(
            self.centroid[0] + sx * offset,
            self.centroid[1] + sy * offset,
        )
    }

    fn insert(mut self, p: Point, bucket: usize) -> Self {
        let quadrant = Quadrant::of(&self.centroid, &p);
        let child_centroid = self.child_centroid(quadrant);
        let child_extent = self.extent - 1;
        let slot = &mut self.children[quadrant as usize];
        *slot = Some(match slot.take() {
            Some(child) => Box::new(child.insert(p, bucket)),
            None => Box::new(Node::leaf(
                child_centroid,
                child_extent,
                p,
            )),
        });
        self
    }

    fn delete(mut self, p: &Point, bucket: usize) -> Node {
        if !self.search(p) {
            return Node::Branch(self);
        }

        let quadrant = Quadrant::of(&self.centroid, p);
        let slot = &mut self.children[quadrant as usize];
        if let Some(child) = slot.take() {
            *slot = child.delete(p, bucket).map(Box::new);
        }

        self.try_collapse(bucket)
    }

    /// Fold back into a single leaf once no child is a branch and the
    /// surviving points fit one bucket.
    fn try_collapse(mut self, bucket: usize) -> Node {
        let any_branch = self
            .children
            .iter()
            .flatten()
            .any(|child| matches!(**child, Node::Branch(_)));
        if any_branch || self.count() > bucket {
            return Node::Branch(self);
        }

        let mut points = Vec::new();
        for slot in self.children.iter_mut() {
            if let Some(child) = slot.take() {
                if let Node::Leaf(mut leaf) = *child {
                    points.append(&mut leaf.points);
                }
            }
        }
        // a branch holds more than `bucket` >= 1 points before any delete,
        // so a collapse always gathers at least one
        debug_assert!(!points.is_empty());
        Node::Leaf(Leaf {
            centroid: self.centroid,
            extent: self.extent,
            points,
        })
    }

    fn search(&self, p: &Point) -> bool {
        self.children.iter().flatten().any(|child| child.search(p))
    }

    fn height(&self) -> i32 {
        let tallest = self
            .children
            .iter()
            .map(|slot| slot.as_ref().map_or(-1, |child| child.height()))
            .max()
            .unwrap_or(-1);
        1 + tallest
    }

    fn count(&self) -> usize {
        self.children
            .iter()
            .flatten()
            .map(|child| child.count())
            .sum()
    }

    /// Child slots with the nearest present centroid first, then the rest in
    /// the fixed NW, NE, SW, SE order. The order only affects which results
    /// are discovered first, never which are discovered.
    fn visit_order(&self, anchor: &Point) -> ArrayVec<[Quadrant; 4]> {
        let mut nearest: Option<(f64, Quadrant)> = None;
        for &quadrant in QUADRANTS.iter() {
            if let Some(child) = &self.children[quadrant as usize] {
                let d = child.centroid().dist(anchor);
                match nearest {
                    Some((best, _)) if d >= best => {}
                    _ => nearest = Some((d, quadrant)),
                }
            }
        }

        let mut order = ArrayVec::new();
        if let Some((_, first)) = nearest {
            order.push(first);
        }
        for &quadrant in QUADRANTS.iter() {
            if nearest.map(|(_, q)| q) != Some(quadrant) {
                order.push(quadrant);
            }
        }
        order
    }

    fn range(&self, anchor: &Point, radius: f64, out: &mut Vec<Point>) {
        for quadrant in self.visit_order(anchor) {
            if let Some(child) = &self.children[quadrant as usize] {
                if child.intersects_circle(anchor, radius) {
                    child.range(anchor, radius, out);
                }
            }
        }
    }

    // Neighbor searches recurse into every present child; quadrants that can
    // not hold a closer point are visited anyway.
    // TODO: skip children whose quadrant lies entirely beyond the current
    // best distance, the way `range` prunes.

    fn nearest_neighbor(
        &self,
        anchor: &Point,
        mut best: Option<(Point, f64)>,
    ) -> Option<(Point, f64)> {
        for quadrant in self.visit_order(anchor) {
            if let Some(child) = &self.children[quadrant as usize] {
                best = child.nearest_neighbor(anchor, best);
            }
        }
        best
    }

    fn k_nearest_neighbors(&self, anchor: &Point, queue: &mut BoundedPriorityQueue<Point>) {
        for quadrant in self.visit_order(anchor) {
            if let Some(child) = &self.children[quadrant as usize] {
                child.k_nearest_neighbors(anchor, queue);
            }
        }
    }
}

#[cfg(test)]
impl Node {
    /// Walk the subtree checking the structural invariants: every leaf holds
    /// 1..=bucket points, and every branch either has a branch child or
    /// spans more points than fit in one bucket.
    pub(super) fn assert_invariants(&self, bucket: usize) {
        match self {
            Node::Leaf(leaf) => {
                assert!(!leaf.points.is_empty(), "leaf with no points");
                assert!(
                    leaf.points.len() <= bucket,
                    "leaf holds {} points, bucket is {}",
                    leaf.points.len(),
                    bucket
                );
            }
            Node::Branch(branch) => {
                let any_branch = branch
                    .children
                    .iter()
                    .flatten()
                    .any(|child| matches!(**child, Node::Branch(_)));
                if !any_branch {
                    assert!(
                        branch.count() > bucket,
                        "branch with only leaf children holds {} points, \
                         should have collapsed at {}",
                        branch.count(),
                        bucket
                    );
                }
                for child in branch.children.iter().flatten() {
                    child.assert_invariants(bucket);
                }
            }
        }
    }
}
