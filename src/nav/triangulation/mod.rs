use bevy::math::{DVec2, DVec3};
use std::sync::Arc;

use crate::nav::geometry::{
    point_in_triangle_with_nearness, to_unit, Bounds2, Bvh, Segment2, GEOMETRY_EPSILON,
};

/// Barycentric overshoot still accepted as "on" a triangle when no triangle
/// contains the point exactly.
pub const ACCEPTABLE_NEARNESS: f64 = 0.1;

/// Padding applied to triangle boxes in the point-location index.
const INDEX_PADDING: f64 = 1e-6;

// ============================================================================
// Triangle
// ============================================================================

/// One walkable triangle. Points are counter-clockwise seen from +z.
///
/// `neighbors[i]` is the triangle across the edge opposite `points[i]`
/// (the edge `points[i + 1] -> points[i + 2]`), or `None` at a wall.
#[derive(Clone, Debug)]
pub struct Triangle {
    pub points: [DVec3; 3],
    pub normal: DVec3,
    pub centroid: DVec3,
    pub neighbors: [Option<usize>; 3],
}

impl Triangle {
    pub fn new(points: [DVec3; 3], neighbors: [Option<usize>; 3]) -> Self {
        let normal = (points[1] - points[0]).cross(points[2] - points[0]).normalize_or_zero();
        let centroid = (points[0] + points[1] + points[2]) / 3.0;
        Self { points, normal, centroid, neighbors }
    }

    pub fn points_2d(&self) -> [DVec2; 3] {
        self.points.map(|p| p.truncate())
    }

    pub fn bounds(&self) -> Bounds2 {
        Bounds2::from_points(self.points_2d())
    }

    /// Edge opposite vertex `i`, in counter-clockwise order.
    pub fn edge(&self, i: usize) -> Segment2 {
        let p = self.points_2d();
        Segment2::new(p[(i + 1) % 3], p[(i + 2) % 3])
    }

    /// Barycentric containment, or the overshoot when outside.
    pub fn nearness(&self, p: DVec2) -> Result<(), f64> {
        let [a, b, c] = self.points_2d();
        point_in_triangle_with_nearness(p, a, b, c)
    }

    /// Height of the triangle plane above `p`.
    pub fn z_at(&self, p: DVec2) -> f64 {
        let n = self.normal;
        if n.z.abs() < GEOMETRY_EPSILON {
            return self.centroid.z;
        }
        // Use whichever of the first two vertices is further from p for stability.
        let q1 = self.points[0];
        let q2 = self.points[1];
        let q = if p.distance_squared(q1.truncate()) > p.distance_squared(q2.truncate()) { q1 } else { q2 };
        (n.x * (q.x - p.x) + n.y * (q.y - p.y)) / n.z + q.z
    }

    /// `p` lifted onto the triangle plane.
    pub fn lift(&self, p: DVec2) -> DVec3 {
        p.extend(self.z_at(p))
    }

    /// Direction `v` lifted into the triangle plane's basis.
    pub fn lift_vector(&self, v: DVec2) -> DVec3 {
        let n = self.normal;
        if n.z.abs() < GEOMETRY_EPSILON {
            return v.extend(0.0);
        }
        v.extend(-(n.x * v.x + n.y * v.y) / n.z)
    }
}

// ============================================================================
// Island
// ============================================================================

/// One connected walkable component of a triangulation.
#[derive(Debug)]
pub struct TriangulationIsland {
    triangles: Vec<Triangle>,
    bounds: Bounds2,
    index: Bvh<usize>,
}

impl TriangulationIsland {
    pub fn new(triangles: Vec<Triangle>) -> Self {
        let bounds = triangles.iter().fold(Bounds2::EMPTY, |acc, t| acc.union(&t.bounds()));
        let index = Bvh::build(
            triangles
                .iter()
                .enumerate()
                .map(|(i, t)| (t.bounds().expanded(INDEX_PADDING), i))
                .collect(),
        );
        Self { triangles, bounds, index }
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn triangle(&self, index: usize) -> &Triangle {
        &self.triangles[index]
    }

    pub fn bounds(&self) -> Bounds2 {
        self.bounds
    }

    /// Read-only view of the point-location index.
    pub fn index(&self) -> &Bvh<usize> {
        &self.index
    }

    /// Triangle containing `p`.
    ///
    /// Falls back to the candidate with the smallest barycentric overshoot
    /// when float error leaves `p` just outside every triangle, as long as
    /// that overshoot is within [`ACCEPTABLE_NEARNESS`].
    pub fn try_locate(&self, p: DVec2) -> Option<usize> {
        if !self.bounds.expanded(INDEX_PADDING).contains(p) {
            return None;
        }

        let mut best: Option<(usize, f64)> = None;
        let mut exact = None;
        self.index.visit_point(p, |&i| {
            if exact.is_some() {
                return;
            }
            match self.triangles[i].nearness(p) {
                Ok(()) => exact = Some(i),
                Err(nearness) => {
                    if nearness <= ACCEPTABLE_NEARNESS && best.map_or(true, |(_, n)| nearness < n) {
                        best = Some((i, nearness));
                    }
                }
            }
        });
        exact.or(best.map(|(i, _)| i))
    }

    pub fn contains(&self, p: DVec2) -> bool {
        self.try_locate(p).is_some()
    }

    /// Edges without a neighbor, oriented with land on their left, paired
    /// with the owning triangle.
    pub fn boundary_edges(&self) -> impl Iterator<Item = (usize, Segment2)> + '_ {
        self.triangles.iter().enumerate().flat_map(|(ti, t)| {
            (0..3).filter(move |&i| t.neighbors[i].is_none()).map(move |i| (ti, t.edge(i)))
        })
    }

    /// Closest land point to `p`: `p` itself when on land, otherwise the
    /// nearest boundary point nudged `inset` toward its triangle's centroid.
    /// Also returns the distance to that boundary point.
    pub fn nearest_land_point(&self, p: DVec2, inset: f64) -> (DVec2, f64) {
        if self.contains(p) {
            return (p, 0.0);
        }
        let mut best: Option<(DVec2, f64, usize)> = None;
        for (ti, edge) in self.boundary_edges() {
            let q = edge.nearest_point(p);
            let d = q.distance(p);
            if best.map_or(true, |(_, bd, _)| d < bd) {
                best = Some((q, d, ti));
            }
        }
        match best {
            Some((q, d, ti)) => {
                let toward = to_unit(self.triangles[ti].centroid.truncate() - q);
                (q + toward * inset, d)
            }
            None => (p, f64::INFINITY),
        }
    }

    /// Every neighbor link is mirrored by the neighbor.
    pub fn neighbor_links_are_symmetric(&self) -> bool {
        self.triangles.iter().enumerate().all(|(ti, t)| {
            t.neighbors.iter().flatten().all(|&n| {
                self.triangles.get(n).map_or(false, |other| other.neighbors.contains(&Some(ti)))
            })
        })
    }
}

// ============================================================================
// Triangulation
// ============================================================================

/// All islands of a terrain snapshot at one dilation radius.
#[derive(Debug, Default)]
pub struct Triangulation {
    pub islands: Vec<Arc<TriangulationIsland>>,
}

/// Result of locating a point: which island and which triangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IslandTriangle {
    pub island: usize,
    pub triangle: usize,
}

impl Triangulation {
    pub fn new(islands: Vec<Arc<TriangulationIsland>>) -> Self {
        Self { islands }
    }

    pub fn island(&self, index: usize) -> Option<&Arc<TriangulationIsland>> {
        self.islands.get(index)
    }

    pub fn try_locate(&self, p: DVec2) -> Option<IslandTriangle> {
        self.islands
            .iter()
            .enumerate()
            .find_map(|(island, isl)| isl.try_locate(p).map(|triangle| IslandTriangle { island, triangle }))
    }

    /// `(in_hole, point)`: `point` is `p` when already on land, otherwise the
    /// nearest land point across all islands. `None` when there is no land.
    pub fn find_nearest_land_point(&self, p: DVec2, inset: f64) -> Option<(bool, DVec2)> {
        if self.try_locate(p).is_some() {
            return Some((false, p));
        }
        self.islands
            .iter()
            .map(|island| island.nearest_land_point(p, inset))
            .filter(|(_, d)| d.is_finite())
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(q, _)| (true, q))
    }
}
