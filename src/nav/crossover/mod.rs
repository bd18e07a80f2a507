use bevy::math::DVec2;
use bevy::prelude::*;
use fixedbitset::FixedBitSet;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::nav::geometry::{convex_hull4, segment_intersects_convex_polygon_interior, Bounds2, Segment2};
use crate::nav::visibility::{LandPolygon, PathLink, Prior};

static ADD_MANY_CALLS: AtomicU64 = AtomicU64::new(0);
static POINTS_ADDED: AtomicU64 = AtomicU64::new(0);
static LINKS_PROCESSED: AtomicU64 = AtomicU64::new(0);
static BARRIERS_CONSIDERED: AtomicU64 = AtomicU64::new(0);

/// Log the process-wide crossover counters.
pub fn dump_performance_counters() {
    info!(
        "[CROSSOVER] add_many calls: {}, points added: {}, links processed: {}, barriers considered: {}",
        ADD_MANY_CALLS.load(Ordering::Relaxed),
        POINTS_ADDED.load(Ordering::Relaxed),
        LINKS_PROCESSED.load(Ordering::Relaxed),
        BARRIERS_CONSIDERED.load(Ordering::Relaxed),
    );
}

fn point_key(p: DVec2) -> (u64, u64) {
    (p.x.to_bits(), p.y.to_bits())
}

/// Optimal links from a point that is not itself a crossover point, such as
/// a pathfinding source or destination.
#[derive(Clone, Debug)]
pub struct TerminalLinks {
    pub point: DVec2,
    pub visible_waypoints: Vec<(usize, f64)>,
    /// Best route to each waypoint; the prior is the first waypoint hop.
    pub to_waypoints: Vec<PathLink>,
    /// Best route to each crossover point; the prior is the first waypoint
    /// hop, or `Direct`.
    pub to_crossovers: Vec<PathLink>,
}

/// Crossover points of one land polygon and the optimal links between
/// every pair of them and from each of them to every waypoint.
///
/// Points are added in batches, one batch per portal segment. Each new point
/// links to the existing ones, and the existing ones get the mirrored link
/// appended so lookups stay O(1) in both directions.
#[derive(Debug)]
pub struct CrossoverPointManager {
    polygon: Arc<LandPolygon>,
    points: Vec<DVec2>,
    lookup: FxHashMap<(u64, u64), usize>,
    segments: Vec<(Segment2, Vec<usize>)>,
    visible_waypoints: Vec<Vec<(usize, f64)>>,
    to_waypoints: Vec<Vec<PathLink>>,
    to_crossovers: Vec<Vec<PathLink>>,
}

impl CrossoverPointManager {
    pub fn new(polygon: Arc<LandPolygon>) -> Self {
        Self {
            polygon,
            points: Vec::new(),
            lookup: FxHashMap::default(),
            segments: Vec::new(),
            visible_waypoints: Vec::new(),
            to_waypoints: Vec::new(),
            to_crossovers: Vec::new(),
        }
    }

    pub fn polygon(&self) -> &Arc<LandPolygon> {
        &self.polygon
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[DVec2] {
        &self.points
    }

    pub fn point(&self, index: usize) -> DVec2 {
        self.points[index]
    }

    /// Crossover indices registered along `segment`.
    pub fn indices_on_segment(&self, segment: &Segment2) -> &[usize] {
        self.segments.iter().find(|(s, _)| s == segment).map_or(&[][..], |(_, indices)| indices.as_slice())
    }

    pub fn link_to_waypoint(&self, crossover: usize, waypoint: usize) -> PathLink {
        self.to_waypoints[crossover][waypoint]
    }

    pub fn link_between(&self, from: usize, to: usize) -> PathLink {
        self.to_crossovers[from][to]
    }

    /// Add points sampled on `segment`, returning their indices in input
    /// order. A point already present keeps its index.
    pub fn add_many(&mut self, segment: Segment2, points: &[DVec2]) -> Vec<usize> {
        ADD_MANY_CALLS.fetch_add(1, Ordering::Relaxed);

        let candidates = self.polygon.segment_seeing_waypoints(&segment);

        let barrier_sets: Vec<(Vec<usize>, Vec<usize>)> = self
            .segments
            .iter()
            .map(|(existing, indices)| (indices.clone(), self.barriers_between(existing, &segment)))
            .collect();
        let own_barriers = self.barriers_between(&segment, &segment);

        let indices: Vec<usize> =
            points.iter().map(|&p| self.add_one(p, &candidates, &barrier_sets, &own_barriers)).collect();

        match self.segments.iter_mut().find(|(s, _)| *s == segment) {
            Some((_, existing)) => {
                for &i in &indices {
                    if !existing.contains(&i) {
                        existing.push(i);
                    }
                }
            }
            None => {
                let mut unique = indices.clone();
                unique.dedup();
                self.segments.push((segment, unique));
            }
        }
        indices
    }

    /// Barriers that could block a straight link between a point on `a` and
    /// a point on `b`: those reaching into the convex hull of both segments.
    fn barriers_between(&self, a: &Segment2, b: &Segment2) -> Vec<usize> {
        let hull = convex_hull4(a.a, a.b, b.a, b.b);
        let hull_bounds = Bounds2::from_points(hull.iter().copied());
        let barriers: Vec<usize> = self
            .polygon
            .barriers_in(&hull_bounds)
            .into_iter()
            .filter(|&i| segment_intersects_convex_polygon_interior(&self.polygon.barriers()[i], &hull))
            .collect();
        BARRIERS_CONSIDERED.fetch_add(barriers.len() as u64, Ordering::Relaxed);
        barriers
    }

    fn add_one(
        &mut self,
        p: DVec2,
        candidates: &[usize],
        barrier_sets: &[(Vec<usize>, Vec<usize>)],
        own_barriers: &[usize],
    ) -> usize {
        if let Some(&existing) = self.lookup.get(&point_key(p)) {
            return existing;
        }
        POINTS_ADDED.fetch_add(1, Ordering::Relaxed);

        let cpi = self.points.len();
        self.points.push(p);
        self.lookup.insert(point_key(p), cpi);

        let mut visible = self.polygon.visible_waypoints_among(p, candidates.iter().copied());
        if visible.is_empty() {
            visible = self.polygon.visible_waypoints(p);
        }
        let waypoint_links = self.optimal_waypoint_links(&visible);
        self.to_waypoints.push(waypoint_links);
        self.visible_waypoints.push(visible);

        let mut links = vec![PathLink::ERROR; cpi + 1];
        links[cpi] = PathLink::direct(0.0);
        let mut linked = FixedBitSet::with_capacity(cpi);
        for (others, barriers) in barrier_sets {
            for &other in others {
                if other < cpi && !linked.contains(other) {
                    linked.insert(other);
                    links[other] = self.link_new_to_existing(cpi, other, barriers);
                }
            }
        }
        // Anything left was added by this batch, on the same segment.
        for other in 0..cpi {
            if !linked.contains(other) {
                links[other] = self.link_new_to_existing(cpi, other, own_barriers);
            }
        }

        for other in 0..cpi {
            let reverse = match links[other].prior {
                Prior::Direct => links[other],
                Prior::Error => PathLink::ERROR,
                Prior::Waypoint(w) => PathLink { prior: self.to_waypoints[other][w].prior, total_cost: links[other].total_cost },
            };
            self.to_crossovers[other].push(reverse);
        }
        self.to_crossovers.push(links);
        cpi
    }

    /// Best route from a point seeing `visible` to every waypoint, each
    /// tagged with the first waypoint hop.
    fn optimal_waypoint_links(&self, visible: &[(usize, f64)]) -> Vec<PathLink> {
        let table = self.polygon.waypoint_table();
        (0..self.polygon.waypoints().len())
            .map(|target| {
                let mut best = PathLink::ERROR;
                for &(v, d) in visible {
                    let cost = d + table.cost(v, target);
                    if cost < best.total_cost {
                        best = PathLink::via(v, cost);
                    }
                }
                best
            })
            .collect()
    }

    fn link_new_to_existing(&self, cpi: usize, other: usize, barriers: &[usize]) -> PathLink {
        LINKS_PROCESSED.fetch_add(1, Ordering::Relaxed);
        let (p, q) = (self.points[cpi], self.points[other]);
        let segment = Segment2::new(p, q);
        let all = self.polygon.barriers();
        if self.polygon.is_clear_of(&segment, barriers.iter().map(|&b| &all[b])) {
            return PathLink::direct(p.distance(q));
        }
        let mut best = PathLink::ERROR;
        for &(v, d) in &self.visible_waypoints[cpi] {
            let cost = d + self.to_waypoints[other][v].total_cost;
            if cost < best.total_cost {
                best = PathLink::via(v, cost);
            }
        }
        best
    }

    /// Links from an arbitrary land point to every waypoint and crossover.
    pub fn find_optimal_links(&self, p: DVec2) -> TerminalLinks {
        let visible = self.polygon.visible_waypoints(p);
        let to_waypoints = self.optimal_waypoint_links(&visible);
        let to_crossovers = self
            .points
            .iter()
            .enumerate()
            .map(|(c, &q)| {
                if self.polygon.is_visible(p, q) {
                    return PathLink::direct(p.distance(q));
                }
                let mut best = PathLink::ERROR;
                for &(v, d) in &visible {
                    let cost = d + self.to_waypoints[c][v].total_cost;
                    if cost < best.total_cost {
                        best = PathLink::via(v, cost);
                    }
                }
                best
            })
            .collect();
        TerminalLinks { point: p, visible_waypoints: visible, to_waypoints, to_crossovers }
    }

    fn waypoint_points(&self, from: usize, to: usize) -> impl Iterator<Item = DVec2> + '_ {
        let waypoints = self.polygon.waypoints();
        self.polygon.waypoint_path(from, to).into_iter().map(move |w| waypoints[w])
    }

    /// Polyline from crossover `from` to crossover `to`, endpoints included.
    pub fn crossover_route(&self, from: usize, to: usize) -> Vec<DVec2> {
        let (start, end) = (self.points[from], self.points[to]);
        match self.to_crossovers[from][to].prior {
            Prior::Direct => vec![start, end],
            Prior::Waypoint(first) => {
                let last = match self.to_crossovers[to][from].prior {
                    Prior::Waypoint(w) => w,
                    _ => first,
                };
                std::iter::once(start).chain(self.waypoint_points(first, last)).chain(std::iter::once(end)).collect()
            }
            Prior::Error => {
                warn!("[CROSSOVER] Expanding unreachable crossover link {} -> {}", from, to);
                vec![start, end]
            }
        }
    }

    /// Polyline from a terminal point to crossover `to`, endpoints included.
    pub fn terminal_to_crossover_route(&self, terminal: &TerminalLinks, to: usize) -> Vec<DVec2> {
        let end = self.points[to];
        match terminal.to_crossovers[to].prior {
            Prior::Waypoint(first) => {
                let last = match self.to_waypoints[to][first].prior {
                    Prior::Waypoint(w) => w,
                    _ => first,
                };
                std::iter::once(terminal.point)
                    .chain(self.waypoint_points(first, last))
                    .chain(std::iter::once(end))
                    .collect()
            }
            _ => vec![terminal.point, end],
        }
    }

    /// Cost and polyline between two terminal points on this polygon.
    pub fn terminal_route(&self, from: &TerminalLinks, to: &TerminalLinks) -> Option<(f64, Vec<DVec2>)> {
        if self.polygon.is_visible(from.point, to.point) {
            return Some((from.point.distance(to.point), vec![from.point, to.point]));
        }
        let mut best: Option<(f64, usize)> = None;
        for &(v, d) in &to.visible_waypoints {
            let cost = from.to_waypoints[v].total_cost + d;
            if cost.is_finite() && best.map_or(true, |(c, _)| cost < c) {
                best = Some((cost, v));
            }
        }
        let (cost, last) = best?;
        let first = match from.to_waypoints[last].prior {
            Prior::Waypoint(w) => w,
            _ => last,
        };
        let route = std::iter::once(from.point)
            .chain(self.waypoint_points(first, last))
            .chain(std::iter::once(to.point))
            .collect();
        Some((cost, route))
    }
}
