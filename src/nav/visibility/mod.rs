use bevy::math::DVec2;
use bevy::prelude::*;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::nav::geometry::{cross, Bounds2, Bvh, Segment2, GEOMETRY_EPSILON};
use crate::nav::triangulation::TriangulationIsland;

// ============================================================================
// Path links
// ============================================================================

/// Where a cached route goes first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prior {
    /// Through this waypoint.
    Waypoint(usize),
    /// Straight line, nothing in between.
    Direct,
    /// No route was found. Carries infinite cost.
    Error,
}

/// One cached route: the first hop and the total length.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathLink {
    pub prior: Prior,
    pub total_cost: f64,
}

impl PathLink {
    pub const ERROR: Self = Self { prior: Prior::Error, total_cost: f64::INFINITY };

    pub fn direct(cost: f64) -> Self {
        Self { prior: Prior::Direct, total_cost: cost }
    }

    pub fn via(waypoint: usize, cost: f64) -> Self {
        Self { prior: Prior::Waypoint(waypoint), total_cost: cost }
    }

    pub fn is_error(&self) -> bool {
        self.prior == Prior::Error
    }
}

// ============================================================================
// Waypoint table
// ============================================================================

/// All-pairs shortest paths between waypoints, stored lower-triangular.
///
/// `rows[a][b]` with `a > b` holds the route from `b` to `a`; its prior is the
/// waypoint visited just before `a`, or `Direct` when `b` sees `a`.
#[derive(Clone, Debug, Default)]
pub struct WaypointTable {
    rows: Vec<Vec<PathLink>>,
}

impl WaypointTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Route between `a` and `b`, looked up as `[larger][smaller]`.
    pub fn link(&self, a: usize, b: usize) -> PathLink {
        match a.cmp(&b) {
            Ordering::Equal => PathLink::direct(0.0),
            Ordering::Greater => self.rows[a][b],
            Ordering::Less => self.rows[b][a],
        }
    }

    pub fn cost(&self, a: usize, b: usize) -> f64 {
        self.link(a, b).total_cost
    }

    /// Dijkstra from every waypoint over the visibility graph. `visible[i]`
    /// lists `(j, distance)` for every waypoint `j` that `i` sees.
    fn build(visible: &[Vec<(usize, f64)>]) -> Self {
        let n = visible.len();
        let mut rows: Vec<Vec<PathLink>> = (0..n).map(|a| vec![PathLink::ERROR; a]).collect();

        let mut dist = vec![f64::INFINITY; n];
        let mut pred: Vec<Option<usize>> = vec![None; n];
        for source in 0..n {
            dist.iter_mut().for_each(|d| *d = f64::INFINITY);
            pred.iter_mut().for_each(|p| *p = None);
            dist[source] = 0.0;

            let mut heap = BinaryHeap::new();
            heap.push(QueueEntry { cost: 0.0, node: source });
            while let Some(QueueEntry { cost, node }) = heap.pop() {
                if cost > dist[node] {
                    continue;
                }
                for &(next, step) in &visible[node] {
                    let candidate = cost + step;
                    if candidate < dist[next] {
                        dist[next] = candidate;
                        pred[next] = Some(node);
                        heap.push(QueueEntry { cost: candidate, node: next });
                    }
                }
            }

            for target in (source + 1)..n {
                rows[target][source] = match pred[target] {
                    None => PathLink::ERROR,
                    Some(p) if p == source => PathLink::direct(dist[target]),
                    Some(p) => PathLink::via(p, dist[target]),
                };
            }
        }
        Self { rows }
    }
}

#[derive(Clone, Copy, Debug)]
struct QueueEntry {
    cost: f64,
    node: usize,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost.total_cmp(&other.cost) == Ordering::Equal && self.node == other.node
    }
}

impl Eq for QueueEntry {}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on cost, ties resolved toward lower indices.
        other.cost.total_cmp(&self.cost).then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ============================================================================
// Land polygon
// ============================================================================

/// Visibility data for one island: its walls, its reflex corners
/// (waypoints), and shortest routes between every pair of waypoints.
#[derive(Debug)]
pub struct LandPolygon {
    island: Arc<TriangulationIsland>,
    barriers: Vec<Segment2>,
    barrier_index: Bvh<usize>,
    waypoints: Vec<DVec2>,
    waypoint_visibility: Vec<Vec<(usize, f64)>>,
    table: WaypointTable,
}

impl LandPolygon {
    pub fn from_island(island: Arc<TriangulationIsland>) -> Self {
        let barriers: Vec<Segment2> = island.boundary_edges().map(|(_, edge)| edge).collect();
        let barrier_index = Bvh::build(barriers.iter().enumerate().map(|(i, b)| (b.bounds(), i)).collect());
        let waypoints = find_reflex_vertices(&barriers);

        let mut polygon = Self {
            island,
            barriers,
            barrier_index,
            waypoints,
            waypoint_visibility: Vec::new(),
            table: WaypointTable::default(),
        };

        let n = polygon.waypoints.len();
        let mut visible = vec![Vec::new(); n];
        for a in 0..n {
            for b in (a + 1)..n {
                let (pa, pb) = (polygon.waypoints[a], polygon.waypoints[b]);
                if polygon.is_visible(pa, pb) {
                    let d = pa.distance(pb);
                    visible[a].push((b, d));
                    visible[b].push((a, d));
                }
            }
        }
        polygon.table = WaypointTable::build(&visible);
        polygon.waypoint_visibility = visible;
        debug!(
            "[VISIBILITY] Land polygon built: {} barriers, {} waypoints",
            polygon.barriers.len(),
            n
        );
        polygon
    }

    pub fn island(&self) -> &Arc<TriangulationIsland> {
        &self.island
    }

    pub fn bounds(&self) -> Bounds2 {
        self.island.bounds()
    }

    pub fn barriers(&self) -> &[Segment2] {
        &self.barriers
    }

    pub fn waypoints(&self) -> &[DVec2] {
        &self.waypoints
    }

    pub fn waypoint_table(&self) -> &WaypointTable {
        &self.table
    }

    /// Waypoints each waypoint sees directly, with distances.
    pub fn waypoint_visibility(&self, waypoint: usize) -> &[(usize, f64)] {
        &self.waypoint_visibility[waypoint]
    }

    pub fn contains(&self, p: DVec2) -> bool {
        self.island.contains(p)
    }

    /// Nearest point on land to `p` (`p` itself when already on land).
    pub fn nearest_land_point(&self, p: DVec2, inset: f64) -> DVec2 {
        self.island.nearest_land_point(p, inset).0
    }

    /// Indices of barriers whose boxes overlap `bounds`.
    pub fn barriers_in(&self, bounds: &Bounds2) -> Vec<usize> {
        self.barrier_index.query_bounds(bounds).into_iter().copied().collect()
    }

    /// Line of sight between two land points, tested against every barrier.
    pub fn is_visible(&self, a: DVec2, b: DVec2) -> bool {
        let segment = Segment2::new(a, b);
        let mut candidates: SmallVec<[usize; 32]> = SmallVec::new();
        self.barrier_index.visit_segment(&segment, |&i| candidates.push(i));
        self.is_clear_of(&segment, candidates.iter().map(|&i| &self.barriers[i]))
    }

    /// Line of sight against a pre-filtered set of barriers.
    ///
    /// A proper crossing blocks the segment, unless one of the segment's own
    /// endpoints lies on that barrier: points sampled on a wall or a seam sit
    /// a rounding error to either side of it. Barrier endpoints that merely
    /// touch the segment split it into pieces, and each piece's midpoint must
    /// be on land, which catches segments slipping through a hole
    /// corner-to-corner.
    pub fn is_clear_of<'a>(&self, segment: &Segment2, barriers: impl IntoIterator<Item = &'a Segment2>) -> bool {
        if segment.length() < GEOMETRY_EPSILON {
            return true;
        }
        let mut barriers = barriers.into_iter().peekable();
        if barriers.peek().is_none() {
            return true;
        }
        let mut cuts: SmallVec<[f64; 8]> = SmallVec::new();
        for barrier in barriers {
            if segment.crosses_properly(barrier) && !starts_or_ends_on(segment, barrier) {
                return false;
            }
            push_cuts(segment, barrier, &mut cuts);
        }
        sort_cuts(&mut cuts);
        cuts.windows(2).all(|w| self.contains(segment.point_at((w[0] + w[1]) * 0.5)))
    }

    /// Parameter intervals of `segment` that lie on land, merged where they
    /// touch. Used to clip portal segments before sampling crossings.
    pub fn land_intervals(&self, segment: &Segment2) -> Vec<(f64, f64)> {
        if segment.length() < GEOMETRY_EPSILON {
            return if self.contains(segment.a) { vec![(0.0, 1.0)] } else { Vec::new() };
        }
        let mut cuts: SmallVec<[f64; 8]> = SmallVec::new();
        self.barrier_index.visit_segment(segment, |&i| push_cuts(segment, &self.barriers[i], &mut cuts));
        sort_cuts(&mut cuts);

        let mut intervals: Vec<(f64, f64)> = Vec::new();
        for w in cuts.windows(2) {
            if !self.contains(segment.point_at((w[0] + w[1]) * 0.5)) {
                continue;
            }
            match intervals.last_mut() {
                Some(last) if (last.1 - w[0]).abs() < 1e-9 => last.1 = w[1],
                _ => intervals.push((w[0], w[1])),
            }
        }
        intervals
    }

    /// Waypoints visible from `p`, with their distances.
    pub fn visible_waypoints(&self, p: DVec2) -> Vec<(usize, f64)> {
        self.visible_waypoints_among(p, 0..self.waypoints.len())
    }

    pub fn visible_waypoints_among(&self, p: DVec2, candidates: impl IntoIterator<Item = usize>) -> Vec<(usize, f64)> {
        candidates
            .into_iter()
            .filter(|&w| self.is_visible(p, self.waypoints[w]))
            .map(|w| (w, p.distance(self.waypoints[w])))
            .collect()
    }

    /// Waypoints that may see some part of `segment`. A waypoint is left out
    /// only when one barrier cuts across its whole view of the segment, so
    /// every waypoint seeing a point sampled on `segment` is in the list.
    pub fn segment_seeing_waypoints(&self, segment: &Segment2) -> Vec<usize> {
        let sampled = [segment.a, segment.midpoint(), segment.b];
        (0..self.waypoints.len())
            .filter(|&w| {
                let apex = self.waypoints[w];
                sampled.iter().any(|&p| self.is_visible(p, apex)) || !self.is_cut_off(apex, segment)
            })
            .collect()
    }

    /// Whether a single barrier crosses both sides of the triangle spanned
    /// by `apex` and `segment`, hiding all of `segment` from `apex`.
    fn is_cut_off(&self, apex: DVec2, segment: &Segment2) -> bool {
        let (left, right) = (Segment2::new(apex, segment.a), Segment2::new(apex, segment.b));
        let fan = Bounds2::from_points([apex, segment.a, segment.b]);
        self.barriers_in(&fan).into_iter().any(|i| {
            let barrier = &self.barriers[i];
            left.crosses_properly(barrier)
                && right.crosses_properly(barrier)
                && !starts_or_ends_on(&left, barrier)
                && !starts_or_ends_on(&right, barrier)
        })
    }

    /// Waypoint sequence from `from` to `to`, both inclusive.
    pub fn waypoint_path(&self, from: usize, to: usize) -> Vec<usize> {
        if from == to {
            return vec![from];
        }
        // Walk the larger end toward the smaller one; priors always point
        // back toward the column waypoint of a row.
        let mut head = vec![from];
        let mut tail = vec![to];
        let (mut a, mut b) = (from, to);
        let limit = self.waypoints.len() + 1;
        for _ in 0..limit {
            if a == b {
                break;
            }
            if a > b {
                match self.table.link(a, b).prior {
                    Prior::Waypoint(p) => {
                        a = p;
                        head.push(p);
                    }
                    Prior::Direct => break,
                    Prior::Error => {
                        warn!("[VISIBILITY] No waypoint route between {} and {}", from, to);
                        break;
                    }
                }
            } else {
                match self.table.link(b, a).prior {
                    Prior::Waypoint(p) => {
                        b = p;
                        tail.push(p);
                    }
                    Prior::Direct => break,
                    Prior::Error => {
                        warn!("[VISIBILITY] No waypoint route between {} and {}", from, to);
                        break;
                    }
                }
            }
        }
        if a == b {
            head.pop();
        }
        head.extend(tail.into_iter().rev());
        head
    }
}

/// Where `barrier` touches `segment`, as parameters along `segment`.
fn push_cuts(segment: &Segment2, barrier: &Segment2, cuts: &mut SmallVec<[f64; 8]>) {
    for endpoint in [barrier.a, barrier.b] {
        if on_segment(segment, endpoint) {
            cuts.push(segment.parameter_of(endpoint).clamp(0.0, 1.0));
        }
    }
    if let Some(t) = segment.intersection_parameter(barrier) {
        cuts.push(t);
    }
}

fn sort_cuts(cuts: &mut SmallVec<[f64; 8]>) {
    cuts.push(0.0);
    cuts.push(1.0);
    cuts.sort_by(f64::total_cmp);
    cuts.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
}

/// Distance within which a segment endpoint counts as lying on a barrier.
const ENDPOINT_ON_BARRIER_EPSILON: f64 = 1e-7;

fn starts_or_ends_on(segment: &Segment2, barrier: &Segment2) -> bool {
    [segment.a, segment.b]
        .into_iter()
        .any(|p| barrier.nearest_point(p).distance(p) <= ENDPOINT_ON_BARRIER_EPSILON)
}

fn on_segment(segment: &Segment2, p: DVec2) -> bool {
    let ab = segment.b - segment.a;
    let ap = p - segment.a;
    let scale = ab.length().max(1.0);
    cross(ab, ap).abs() <= 1e-9 * scale * scale && {
        let t = segment.parameter_of(p);
        (-1e-12..=1.0 + 1e-12).contains(&t)
    }
}

/// Boundary vertices where land turns right (a hole corner poking into
/// land) or where several boundary loops meet.
fn find_reflex_vertices(barriers: &[Segment2]) -> Vec<DVec2> {
    #[derive(Default)]
    struct Incidence {
        incoming: SmallVec<[DVec2; 2]>,
        outgoing: SmallVec<[DVec2; 2]>,
    }

    let key = |p: DVec2| (p.x.to_bits(), p.y.to_bits());
    let mut vertices: FxHashMap<(u64, u64), (DVec2, Incidence)> = FxHashMap::default();
    let mut order = Vec::new();
    for barrier in barriers {
        let dir = barrier.b - barrier.a;
        for (p, outgoing) in [(barrier.a, true), (barrier.b, false)] {
            let entry = vertices.entry(key(p)).or_insert_with(|| {
                order.push(key(p));
                (p, Incidence::default())
            });
            if outgoing {
                entry.1.outgoing.push(dir);
            } else {
                entry.1.incoming.push(dir);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|k| vertices.get(&k))
        .filter(|(_, inc)| {
            if inc.incoming.len() != 1 || inc.outgoing.len() != 1 {
                return true;
            }
            let (a, b) = (inc.incoming[0], inc.outgoing[0]);
            cross(a, b) < -GEOMETRY_EPSILON * a.length() * b.length()
        })
        .map(|(p, _)| *p)
        .collect()
}
