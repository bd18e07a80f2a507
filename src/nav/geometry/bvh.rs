use bevy::math::DVec2;
use smallvec::SmallVec;

use super::primitives::{Bounds2, Segment2};

const LEAF_SIZE: usize = 4;

#[derive(Clone, Debug)]
enum BvhNode {
    Leaf { bounds: Bounds2, start: usize, len: usize },
    Branch { bounds: Bounds2, left: usize, right: usize },
}

impl BvhNode {
    fn bounds(&self) -> &Bounds2 {
        match self {
            BvhNode::Leaf { bounds, .. } | BvhNode::Branch { bounds, .. } => bounds,
        }
    }
}

/// Static bounding-volume hierarchy over 2D boxes.
///
/// Built once by median split on the longest axis and never mutated; a
/// terrain change builds a new tree.
///
/// # Example
/// ```ignore
/// let bvh = Bvh::build(vec![(Bounds2::from_rect(0.0, 0.0, 1.0, 1.0), 7usize)]);
/// assert_eq!(bvh.query_point(DVec2::splat(0.5)), vec![&7]);
/// ```
#[derive(Clone, Debug)]
pub struct Bvh<T> {
    nodes: Vec<BvhNode>,
    items: Vec<(Bounds2, T)>,
}

impl<T> Default for Bvh<T> {
    fn default() -> Self {
        Self { nodes: Vec::new(), items: Vec::new() }
    }
}

impl<T> Bvh<T> {
    pub fn build(mut items: Vec<(Bounds2, T)>) -> Self {
        let mut nodes = Vec::new();
        if !items.is_empty() {
            let len = items.len();
            Self::build_range(&mut nodes, &mut items, 0, len);
        }
        Self { nodes, items }
    }

    fn build_range(nodes: &mut Vec<BvhNode>, items: &mut [(Bounds2, T)], start: usize, len: usize) -> usize {
        let slice = &mut items[start..start + len];
        let bounds = slice.iter().fold(Bounds2::EMPTY, |acc, (b, _)| acc.union(b));

        let index = nodes.len();
        if len <= LEAF_SIZE {
            nodes.push(BvhNode::Leaf { bounds, start, len });
            return index;
        }

        let size = bounds.size();
        let by_x = size.x >= size.y;
        slice.sort_by(|(a, _), (b, _)| {
            let (ca, cb) = (a.center(), b.center());
            if by_x { ca.x.total_cmp(&cb.x) } else { ca.y.total_cmp(&cb.y) }
        });

        // Reserve the slot so children land after their parent.
        nodes.push(BvhNode::Leaf { bounds, start, len: 0 });
        let half = len / 2;
        let left = Self::build_range(nodes, items, start, half);
        let right = Self::build_range(nodes, items, start + half, len - half);
        nodes[index] = BvhNode::Branch { bounds, left, right };
        index
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn bounds(&self) -> Bounds2 {
        self.nodes.first().map_or(Bounds2::EMPTY, |n| *n.bounds())
    }

    /// Every stored item with its box, in tree order.
    pub fn items(&self) -> impl Iterator<Item = &(Bounds2, T)> {
        self.items.iter()
    }

    /// Node boxes with their depth, for debug drawing.
    pub fn node_bounds(&self) -> Vec<(usize, Bounds2)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: SmallVec<[(usize, usize); 32]> = SmallVec::new();
        if !self.nodes.is_empty() {
            stack.push((0, 0));
        }
        while let Some((node, depth)) = stack.pop() {
            out.push((depth, *self.nodes[node].bounds()));
            if let BvhNode::Branch { left, right, .. } = &self.nodes[node] {
                stack.push((*right, depth + 1));
                stack.push((*left, depth + 1));
            }
        }
        out
    }

    /// Visit every item whose box passes `overlaps`, pruning subtrees whose
    /// box fails it.
    fn visit<'a>(&'a self, overlaps: impl Fn(&Bounds2) -> bool, mut f: impl FnMut(&'a Bounds2, &'a T)) {
        let mut stack: SmallVec<[usize; 32]> = SmallVec::new();
        if !self.nodes.is_empty() {
            stack.push(0);
        }
        while let Some(node) = stack.pop() {
            match &self.nodes[node] {
                BvhNode::Leaf { bounds, start, len } => {
                    if !overlaps(bounds) {
                        continue;
                    }
                    for (item_bounds, item) in &self.items[*start..*start + *len] {
                        if overlaps(item_bounds) {
                            f(item_bounds, item);
                        }
                    }
                }
                BvhNode::Branch { bounds, left, right } => {
                    if overlaps(bounds) {
                        stack.push(*right);
                        stack.push(*left);
                    }
                }
            }
        }
    }

    pub fn visit_point(&self, p: DVec2, mut f: impl FnMut(&T)) {
        self.visit(|b| b.contains(p), |_, item| f(item));
    }

    pub fn visit_bounds(&self, query: &Bounds2, mut f: impl FnMut(&T)) {
        self.visit(|b| b.intersects(query), |_, item| f(item));
    }

    /// Items whose boxes overlap the segment's box.
    pub fn visit_segment(&self, segment: &Segment2, f: impl FnMut(&T)) {
        self.visit_bounds(&segment.bounds(), f);
    }

    pub fn query_point(&self, p: DVec2) -> Vec<&T> {
        let mut out = Vec::new();
        self.visit(|b| b.contains(p), |_, item| out.push(item));
        out
    }

    pub fn query_bounds(&self, query: &Bounds2) -> Vec<&T> {
        let mut out = Vec::new();
        self.visit(|b| b.intersects(query), |_, item| out.push(item));
        out
    }
}
