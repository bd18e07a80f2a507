use bevy::math::DVec2;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::nav::config::NavConfig;
use crate::nav::crossover::{CrossoverPointManager, TerminalLinks};
use crate::nav::geometry::to_unit;
use crate::nav::triangulation::TriangulationIsland;
use crate::nav::visibility::LandPolygon;

/// Fallback push direction for agents standing on the exact same spot.
const COINCIDENT_PUSH: DVec2 = DVec2::new(2.0, 1.0);

/// Weight of the visibility field relative to the triangle hint.
const FIELD_WEIGHT: f64 = 1.0;

/// Steering constants, copied out of [`NavConfig`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SteeringParams {
    pub separation_k: f64,
    pub grouping_tolerance: f64,
    pub cohesion_scale: f64,
    pub seek_weight: f64,
    pub triangle_hint_weight: f64,
}

impl From<&NavConfig> for SteeringParams {
    fn from(config: &NavConfig) -> Self {
        Self {
            separation_k: config.separation_k,
            grouping_tolerance: config.grouping_tolerance,
            cohesion_scale: config.cohesion_scale,
            seek_weight: config.seek_weight,
            triangle_hint_weight: config.triangle_hint_weight,
        }
    }
}

// ============================================================================
// Pairwise forces
// ============================================================================

/// What the force pass needs to know about one agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SteeringAgent {
    pub position: DVec2,
    pub radius: f64,
    pub swarm: Option<bevy::prelude::Entity>,
}

/// Force on `a` from `b` as `(direction * weight, weight)`; `b` receives the
/// mirrored force. `None` when the pair does not interact.
pub fn pairwise_force(a: &SteeringAgent, b: &SteeringAgent, params: &SteeringParams) -> Option<(DVec2, f64)> {
    let spread = a.radius + b.radius;
    if spread <= 0.0 {
        return None;
    }
    let a_to_b = b.position - a.position;
    let distance = a_to_b.length();

    if distance < spread {
        let away = if distance > 0.0 { -a_to_b / distance } else { to_unit(COINCIDENT_PUSH) };
        let overlap = params.separation_k * (spread - distance);
        let weight = overlap * overlap / (spread * spread);
        return Some((away * weight, weight));
    }

    if a.swarm.is_some() && a.swarm == b.swarm {
        let spacing = distance - spread;
        let max_spacing = params.grouping_tolerance * spread;
        if spacing <= max_spacing && max_spacing > 0.0 {
            let weight = params.cohesion_scale * (spacing - max_spacing).powi(4) / max_spacing.powi(4);
            return Some((a_to_b / distance * weight, weight));
        }
    }
    None
}

/// Weighted average of the accumulated forces and the seek direction,
/// scaled to `speed`.
pub fn finalize_velocity(weighted_sum: DVec2, sum_weights: f64, seek: DVec2, params: &SteeringParams, speed: f64) -> DVec2 {
    let sum = weighted_sum + seek * params.seek_weight;
    let weights = sum_weights + params.seek_weight;
    if weights <= 0.0 {
        return DVec2::ZERO;
    }
    sum / weights * speed
}

// ============================================================================
// Swarm fields
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
struct HintEntry {
    cost: f64,
    triangle: usize,
}

impl Eq for HintEntry {}

impl Ord for HintEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.cost.total_cmp(&self.cost).then_with(|| other.triangle.cmp(&self.triangle))
    }
}

impl PartialOrd for HintEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// For every triangle, the neighbor one step closer to `target` over
/// centroid distances. The target itself and unreachable triangles get
/// `None`.
pub fn triangle_hints(island: &TriangulationIsland, target: usize) -> Vec<Option<usize>> {
    let triangles = island.triangles();
    let mut hints = vec![None; triangles.len()];
    let mut costs = vec![f64::INFINITY; triangles.len()];
    let Some(cost) = costs.get_mut(target) else {
        return hints;
    };
    *cost = 0.0;

    let mut heap = BinaryHeap::new();
    heap.push(HintEntry { cost: 0.0, triangle: target });
    while let Some(HintEntry { cost, triangle }) = heap.pop() {
        if cost > costs[triangle] {
            continue;
        }
        let from = &triangles[triangle];
        for next in from.neighbors.iter().flatten().copied() {
            let candidate = cost + from.centroid.truncate().distance(triangles[next].centroid.truncate());
            if candidate < costs[next] {
                costs[next] = candidate;
                hints[next] = Some(triangle);
                heap.push(HintEntry { cost: candidate, triangle: next });
            }
        }
    }
    hints
}

/// Seek directions toward one destination over one island, shared by every
/// swarm agent of the same radius heading there.
pub struct SwarmField {
    island: Arc<TriangulationIsland>,
    crossovers: CrossoverPointManager,
    target: TerminalLinks,
    target_triangle: Option<usize>,
    hints: Vec<Option<usize>>,
    seek: FxHashMap<usize, DVec2>,
}

impl SwarmField {
    /// Destinations off this island are replaced by the nearest point on it.
    pub fn new(island: Arc<TriangulationIsland>, destination: DVec2, inset: f64) -> Self {
        let target_point = if island.contains(destination) {
            destination
        } else {
            island.nearest_land_point(destination, inset).0
        };
        let target_triangle = island.try_locate(target_point);
        let hints = target_triangle.map_or_else(Vec::new, |t| triangle_hints(&island, t));
        let crossovers = CrossoverPointManager::new(Arc::new(LandPolygon::from_island(island.clone())));
        let target = crossovers.find_optimal_links(target_point);
        Self { island, crossovers, target, target_triangle, hints, seek: FxHashMap::default() }
    }

    pub fn target(&self) -> DVec2 {
        self.target.point
    }

    pub fn hint(&self, triangle: usize) -> Option<usize> {
        self.hints.get(triangle).copied().flatten()
    }

    /// Unit direction of the first leg of the shortest route from the
    /// triangle's centroid to the target.
    pub fn seek_direction(&mut self, triangle: usize) -> DVec2 {
        if let Some(&direction) = self.seek.get(&triangle) {
            return direction;
        }
        let centroid = self.island.triangle(triangle).centroid.truncate();
        let from = self.crossovers.find_optimal_links(centroid);
        let direction = self
            .crossovers
            .terminal_route(&from, &self.target)
            .and_then(|(_, route)| route.get(1).map(|&next| to_unit(next - centroid)))
            .unwrap_or(DVec2::ZERO);
        self.seek.insert(triangle, direction);
        direction
    }

    /// From the triangle's centroid toward the centroid of its hinted
    /// neighbor. Zero in the target triangle.
    pub fn hint_direction(&self, triangle: usize) -> DVec2 {
        self.hint(triangle).map_or(DVec2::ZERO, |next| {
            to_unit(self.island.triangle(next).centroid.truncate() - self.island.triangle(triangle).centroid.truncate())
        })
    }

    /// Blend of the field and the hint for an agent at `position`. Zero once
    /// the agent is within `arrival` of the target.
    pub fn steer(&mut self, triangle: usize, position: DVec2, arrival: f64, params: &SteeringParams) -> DVec2 {
        if position.distance(self.target.point) <= arrival {
            return DVec2::ZERO;
        }
        let field = if Some(triangle) == self.target_triangle {
            to_unit(self.target.point - position)
        } else {
            self.seek_direction(triangle)
        };
        to_unit(field * FIELD_WEIGHT + self.hint_direction(triangle) * params.triangle_hint_weight)
    }

    pub fn cached_directions(&self) -> usize {
        self.seek.len()
    }
}
