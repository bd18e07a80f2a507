use bevy::math::{DVec2, DVec3};
use bevy::prelude::*;

use crate::nav::geometry::{cross, to_unit, GEOMETRY_EPSILON};
use crate::nav::triangulation::TriangulationIsland;

/// Wall slides allowed inside one edge follow.
const MAX_FOLLOW_ITERATIONS: usize = 2;

/// Push-inward recoveries tolerated per walk before giving up.
const MAX_PUSH_INWARD: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeFollow {
    Allowed,
    Forbidden,
}

/// Result of one walk step within a single triangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WalkStep {
    /// Distance exhausted inside `triangle`.
    Completion { position: DVec3, triangle: usize, consumed: f64 },
    /// Crossed into a neighbor; keep walking from there.
    Progress { position: DVec3, triangle: usize, consumed: f64 },
    /// The start was not strictly inside the triangle and was moved toward
    /// its centroid instead.
    PushInward { position: DVec3, triangle: usize },
    /// Hit a wall while edge following was forbidden.
    CanEdgeFollow { position: DVec3, triangle: usize, consumed: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WalkOutcome {
    pub position: DVec3,
    pub triangle: usize,
    pub distance_consumed: f64,
}

/// Moves points across one island, triangle by triangle, sliding along
/// walls it cannot cross.
pub struct TriangleWalker<'a> {
    island: &'a TriangulationIsland,
    edge_buffer: f64,
    max_steps: usize,
}

impl<'a> TriangleWalker<'a> {
    pub fn new(island: &'a TriangulationIsland, edge_buffer: f64, max_steps: usize) -> Self {
        Self { island, edge_buffer, max_steps: max_steps.max(1) }
    }

    /// Walk `distance` along `direction` starting in `triangle`.
    pub fn walk(&self, position: DVec3, direction: DVec2, distance: f64, triangle: usize) -> WalkOutcome {
        let direction = to_unit(direction);
        let mut outcome = WalkOutcome { position, triangle, distance_consumed: 0.0 };
        if direction == DVec2::ZERO || distance <= GEOMETRY_EPSILON {
            return outcome;
        }

        let mut remaining = distance;
        let mut pushes = 0;
        for _ in 0..self.max_steps {
            if remaining <= GEOMETRY_EPSILON {
                return outcome;
            }
            match self.step(outcome.position, direction, remaining, outcome.triangle, EdgeFollow::Allowed) {
                WalkStep::Completion { position, triangle, consumed } => {
                    outcome.position = position;
                    outcome.triangle = triangle;
                    outcome.distance_consumed += consumed;
                    return outcome;
                }
                WalkStep::Progress { position, triangle, consumed } => {
                    outcome.position = position;
                    outcome.triangle = triangle;
                    outcome.distance_consumed += consumed;
                    remaining -= consumed;
                }
                WalkStep::PushInward { position, triangle } => {
                    outcome.position = position;
                    outcome.triangle = triangle;
                    pushes += 1;
                    if pushes > MAX_PUSH_INWARD {
                        warn!("[MOVEMENT] Push inward did not resolve at {:?}", position);
                        return outcome;
                    }
                }
                WalkStep::CanEdgeFollow { position, triangle, consumed } => {
                    error!("[MOVEMENT] Edge follow requested outside an edge follow at {:?}", position);
                    outcome.position = position;
                    outcome.triangle = triangle;
                    outcome.distance_consumed += consumed;
                    return outcome;
                }
            }
        }
        warn!("[MOVEMENT] Triangle walk hit the step limit with {} left", remaining);
        outcome
    }

    /// One step inside `triangle`.
    pub fn step(&self, position: DVec3, direction: DVec2, distance: f64, triangle: usize, follow: EdgeFollow) -> WalkStep {
        let t = self.island.triangle(triangle);
        let origin = position.truncate();
        let points = t.points_2d();

        let exit = (0..3).find_map(|i| {
            let (e0, e1) = (points[i], points[(i + 1) % 3]);
            let va = e0 - origin;
            let vb = e1 - origin;
            if cross(va, direction) < 0.0 || cross(direction, vb) < 0.0 {
                return None;
            }
            let outward = to_unit(DVec2::new(e1.y - e0.y, e0.x - e1.x));
            let speed = direction.dot(outward);
            (speed > GEOMETRY_EPSILON).then(|| (i, e0, e1, outward, speed))
        });

        let Some((i, e0, e1, outward, speed)) = exit else {
            let inward = to_unit(t.centroid.truncate() - origin);
            return WalkStep::PushInward { position: t.lift(origin + inward * self.edge_buffer), triangle };
        };

        let height = (e0 - origin).dot(outward).max(0.0);
        let to_edge = height / speed;
        if distance < to_edge {
            return WalkStep::Completion { position: t.lift(origin + direction * distance), triangle, consumed: distance };
        }

        let hit = origin + direction * to_edge;
        let opposite = (i + 2) % 3;
        match t.neighbors[opposite] {
            Some(next) => {
                let past = hit + outward * self.edge_buffer;
                let landed = match self.island.triangle(next).nearness(past) {
                    Ok(()) => next,
                    Err(_) => self.island.try_locate(past).unwrap_or(next),
                };
                WalkStep::Progress {
                    position: self.island.triangle(landed).lift(past),
                    triangle: landed,
                    consumed: to_edge,
                }
            }
            None => {
                let near_wall = hit - outward * self.edge_buffer;
                match follow {
                    EdgeFollow::Forbidden => {
                        WalkStep::CanEdgeFollow { position: t.lift(near_wall), triangle, consumed: to_edge }
                    }
                    EdgeFollow::Allowed => {
                        self.follow_wall(t.lift(near_wall), triangle, direction, e1 - e0, distance, to_edge)
                    }
                }
            }
        }
    }

    /// Slide along a wall with the share of the remaining motion that runs
    /// parallel to it. Nested edge follows are not allowed; hitting a second
    /// wall ends the slide there.
    fn follow_wall(
        &self,
        start: DVec3,
        triangle: usize,
        direction: DVec2,
        wall: DVec2,
        distance: f64,
        consumed: f64,
    ) -> WalkStep {
        let along = to_unit(wall);
        let cos = direction.dot(along);
        let slide_direction = if cos > 0.0 { along } else { -along };
        let cos = cos.abs();

        let mut position = start;
        let mut triangle = triangle;
        let mut slide_left = (distance - consumed) * cos;
        if cos <= GEOMETRY_EPSILON || slide_left <= GEOMETRY_EPSILON {
            return WalkStep::Completion { position, triangle, consumed: distance };
        }

        let mut slid = 0.0;
        for _ in 0..MAX_FOLLOW_ITERATIONS {
            match self.step(position, slide_direction, slide_left, triangle, EdgeFollow::Forbidden) {
                WalkStep::Completion { position, triangle, .. } | WalkStep::CanEdgeFollow { position, triangle, .. } => {
                    return WalkStep::Completion { position, triangle, consumed: distance };
                }
                WalkStep::Progress { position: p, triangle: t, consumed: c } => {
                    position = p;
                    triangle = t;
                    slide_left -= c;
                    slid += c;
                }
                WalkStep::PushInward { position: p, triangle: t } => {
                    position = p;
                    triangle = t;
                }
            }
        }
        // Left the wall's triangle; resume the original heading from here.
        WalkStep::Progress { position, triangle, consumed: (consumed + slid / cos).min(distance) }
    }
}

#[cfg(test)]
#[path = "walk_tests.rs"]
mod tests;
