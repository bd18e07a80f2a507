use bevy::math::{DVec2, DVec3};
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use std::sync::OnceLock;

/// Tolerance for "this length is effectively zero".
pub const GEOMETRY_EPSILON: f64 = 1e-9;

/// Barycentric slack accepted by [`point_in_triangle`].
pub const POINT_IN_TRIANGLE_EPSILON: f64 = 5e-6;

/// Turn direction of three points.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Clockness {
    Clockwise,
    Neither,
    CounterClockwise,
}

#[inline]
pub fn cross(a: DVec2, b: DVec2) -> f64 {
    a.perp_dot(b)
}

#[inline]
fn classify(value: f64) -> Clockness {
    if value > 0.0 {
        Clockness::CounterClockwise
    } else if value < 0.0 {
        Clockness::Clockwise
    } else {
        Clockness::Neither
    }
}

/// Turn taken when travelling `a -> b -> c`.
#[inline]
pub fn clockness(a: DVec2, b: DVec2, c: DVec2) -> Clockness {
    classify(cross(b - a, c - b))
}

/// Rotation from direction `from` to direction `to`.
#[inline]
pub fn clockness_of(from: DVec2, to: DVec2) -> Clockness {
    classify(cross(from, to))
}

/// Unit vector, or zero for vectors shorter than [`GEOMETRY_EPSILON`].
#[inline]
pub fn to_unit(v: DVec2) -> DVec2 {
    let len = v.length();
    if len < GEOMETRY_EPSILON {
        DVec2::ZERO
    } else {
        v / len
    }
}

#[inline]
pub fn to_unit3(v: DVec3) -> DVec3 {
    let len = v.length();
    if len < GEOMETRY_EPSILON {
        DVec3::ZERO
    } else {
        v / len
    }
}

/// Scalar `t` such that `t * onto` is the projection of `v` onto `onto`.
#[inline]
pub fn project_component(v: DVec3, onto: DVec3) -> f64 {
    v.dot(onto) / onto.length_squared()
}

#[inline]
pub fn project_onto(v: DVec3, onto: DVec3) -> DVec3 {
    onto * project_component(v, onto)
}

/// Integer square root for squared distances between discretized positions.
///
/// Values below `1024 * 1024` come from a table built on first use; anything
/// larger (or negative, which clamps to zero) is computed directly.
pub fn int_sqrt(x: i64) -> i64 {
    const TABLE_LEN: usize = 1024 * 1024;
    static TABLE: OnceLock<Box<[u16]>> = OnceLock::new();

    if x <= 0 {
        return 0;
    }
    if (x as u64) < TABLE_LEN as u64 {
        let table = TABLE.get_or_init(|| (0..TABLE_LEN).map(|i| (i as f64).sqrt() as u16).collect());
        return i64::from(table[x as usize]);
    }
    (x as f64).sqrt() as i64
}

// ============================================================================
// Segments
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment2 {
    pub a: DVec2,
    pub b: DVec2,
}

impl Segment2 {
    pub const fn new(a: DVec2, b: DVec2) -> Self {
        Self { a, b }
    }

    pub fn length(&self) -> f64 {
        self.a.distance(self.b)
    }

    /// Point at parameter `t`. The endpoints come back bit-exact, and a
    /// coordinate the two endpoints share never drifts.
    pub fn point_at(&self, t: f64) -> DVec2 {
        if t == 0.0 {
            self.a
        } else if t == 1.0 {
            self.b
        } else {
            self.a + (self.b - self.a) * t
        }
    }

    pub fn midpoint(&self) -> DVec2 {
        (self.a + self.b) * 0.5
    }

    pub fn bounds(&self) -> Bounds2 {
        Bounds2::new(self.a.min(self.b), self.a.max(self.b))
    }

    pub fn translated(&self, offset: DVec2) -> Self {
        Self::new(self.a + offset, self.b + offset)
    }

    /// Unclamped parameter of the projection of `p` onto the segment's line.
    pub fn parameter_of(&self, p: DVec2) -> f64 {
        let ab = self.b - self.a;
        let len_sq = ab.length_squared();
        if len_sq < GEOMETRY_EPSILON {
            0.0
        } else {
            (p - self.a).dot(ab) / len_sq
        }
    }

    pub fn nearest_point(&self, p: DVec2) -> DVec2 {
        self.point_at(self.parameter_of(p).clamp(0.0, 1.0))
    }

    /// The segments share at least one point. Touching endpoints and
    /// collinear overlap count as intersecting.
    pub fn intersects(&self, other: &Segment2) -> bool {
        let o1 = clockness(self.a, self.b, other.a);
        let o2 = clockness(self.a, self.b, other.b);
        let o3 = clockness(other.a, other.b, self.a);
        let o4 = clockness(other.a, other.b, self.b);

        if o1 != o2 && o3 != o4 {
            return true;
        }
        (o1 == Clockness::Neither && on_collinear_segment(self.a, other.a, self.b))
            || (o2 == Clockness::Neither && on_collinear_segment(self.a, other.b, self.b))
            || (o3 == Clockness::Neither && on_collinear_segment(other.a, self.a, other.b))
            || (o4 == Clockness::Neither && on_collinear_segment(other.a, self.b, other.b))
    }

    /// Interiors cross at a single point: each segment's endpoints lie
    /// strictly on opposite sides of the other's line.
    pub fn crosses_properly(&self, other: &Segment2) -> bool {
        let o1 = clockness(self.a, self.b, other.a);
        let o2 = clockness(self.a, self.b, other.b);
        let o3 = clockness(other.a, other.b, self.a);
        let o4 = clockness(other.a, other.b, self.b);
        o1 != Clockness::Neither
            && o2 != Clockness::Neither
            && o3 != Clockness::Neither
            && o4 != Clockness::Neither
            && o1 != o2
            && o3 != o4
    }

    /// Parameter along `self` where the two non-parallel lines meet, if that
    /// point lies on both segments.
    pub fn intersection_parameter(&self, other: &Segment2) -> Option<f64> {
        let r = self.b - self.a;
        let s = other.b - other.a;
        let denom = cross(r, s);
        if denom.abs() < GEOMETRY_EPSILON {
            return None;
        }
        let qp = other.a - self.a;
        let t = cross(qp, s) / denom;
        let u = cross(qp, r) / denom;
        let slack = 1e-12;
        ((-slack..=1.0 + slack).contains(&t) && (-slack..=1.0 + slack).contains(&u)).then_some(t.clamp(0.0, 1.0))
    }
}

/// `q` lies within the bounding box of collinear `p` and `r`.
fn on_collinear_segment(p: DVec2, q: DVec2, r: DVec2) -> bool {
    q.x <= p.x.max(r.x) && q.x >= p.x.min(r.x) && q.y <= p.y.max(r.y) && q.y >= p.y.min(r.y)
}

// ============================================================================
// Bounds
// ============================================================================

/// Axis-aligned 2D box. `min` is inclusive, `max` is inclusive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds2 {
    pub min: DVec2,
    pub max: DVec2,
}

impl Bounds2 {
    pub const EMPTY: Self = Self {
        min: DVec2::splat(f64::INFINITY),
        max: DVec2::splat(f64::NEG_INFINITY),
    };

    pub const fn new(min: DVec2, max: DVec2) -> Self {
        Self { min, max }
    }

    /// Box from a corner and a size, the way map presets describe rectangles.
    pub fn from_rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(DVec2::new(x, y), DVec2::new(x + width, y + height))
    }

    pub fn from_points(points: impl IntoIterator<Item = DVec2>) -> Self {
        points.into_iter().fold(Self::EMPTY, |acc, p| acc.including(p))
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    pub fn including(&self, p: DVec2) -> Self {
        Self::new(self.min.min(p), self.max.max(p))
    }

    pub fn union(&self, other: &Bounds2) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn intersection(&self, other: &Bounds2) -> Self {
        Self::new(self.min.max(other.min), self.max.min(other.max))
    }

    pub fn expanded(&self, amount: f64) -> Self {
        Self::new(self.min - DVec2::splat(amount), self.max + DVec2::splat(amount))
    }

    pub fn translated(&self, offset: DVec2) -> Self {
        Self::new(self.min + offset, self.max + offset)
    }

    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> DVec2 {
        self.max - self.min
    }

    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Strict containment: points on the border are outside.
    pub fn contains_strictly(&self, p: DVec2) -> bool {
        p.x > self.min.x && p.x < self.max.x && p.y > self.min.y && p.y < self.max.y
    }

    pub fn intersects(&self, other: &Bounds2) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x && self.min.y <= other.max.y && self.max.y >= other.min.y
    }

    pub fn corners(&self) -> [DVec2; 4] {
        [
            self.min,
            DVec2::new(self.max.x, self.min.y),
            self.max,
            DVec2::new(self.min.x, self.max.y),
        ]
    }
}

// ============================================================================
// Triangles and convex hulls
// ============================================================================

/// Barycentric coordinates `(u, v)` of `p` against triangle `abc`, weighted
/// toward `c` and `b` respectively.
pub fn barycentric(p: DVec2, a: DVec2, b: DVec2, c: DVec2) -> (f64, f64) {
    let v0 = c - a;
    let v1 = b - a;
    let v2 = p - a;
    let dot00 = v0.dot(v0);
    let dot01 = v0.dot(v1);
    let dot02 = v0.dot(v2);
    let dot11 = v1.dot(v1);
    let dot12 = v1.dot(v2);
    let inv_denom = 1.0 / (dot00 * dot11 - dot01 * dot01);
    let u = (dot11 * dot02 - dot01 * dot12) * inv_denom;
    let v = (dot00 * dot12 - dot01 * dot02) * inv_denom;
    (u, v)
}

pub fn point_in_triangle(p: DVec2, a: DVec2, b: DVec2, c: DVec2) -> bool {
    let (u, v) = barycentric(p, a, b, c);
    u >= -POINT_IN_TRIANGLE_EPSILON && v >= -POINT_IN_TRIANGLE_EPSILON && u + v <= 1.0 + POINT_IN_TRIANGLE_EPSILON
}

/// Exact barycentric containment, or how far outside the point falls.
///
/// Returns `Ok(())` when `p` is inside, otherwise `Err(nearness)` where
/// nearness sums the barycentric overshoot on each violated side.
pub fn point_in_triangle_with_nearness(p: DVec2, a: DVec2, b: DVec2, c: DVec2) -> Result<(), f64> {
    let (u, v) = barycentric(p, a, b, c);
    let sum = u + v;
    if u >= 0.0 && v >= 0.0 && sum <= 1.0 {
        return Ok(());
    }
    let mut nearness = 0.0;
    if u < 0.0 {
        nearness -= u;
    }
    if v < 0.0 {
        nearness -= v;
    }
    if sum > 1.0 {
        nearness += sum - 1.0;
    }
    // Degenerate triangles produce NaN coordinates; never accept them.
    if nearness.is_nan() {
        nearness = f64::INFINITY;
    }
    Err(nearness)
}

/// The two points of three collinear points that are furthest apart.
pub fn find_collinear_bounds(a: DVec2, b: DVec2, c: DVec2) -> (DVec2, DVec2) {
    let ab = a.distance_squared(b);
    let ac = a.distance_squared(c);
    let bc = b.distance_squared(c);
    if ab > ac {
        if ab > bc { (a, b) } else { (b, c) }
    } else if ac > bc {
        (a, c)
    } else {
        (b, c)
    }
}

pub type Hull = SmallVec<[DVec2; 4]>;

/// Counter-clockwise convex hull of three points. Collinear input collapses
/// to a segment (or a single point).
pub fn convex_hull3(a: DVec2, b: DVec2, c: DVec2) -> Hull {
    match clockness(a, b, c) {
        Clockness::Neither => {
            let (s, t) = find_collinear_bounds(a, b, c);
            if s == t { smallvec![s] } else { smallvec![s, t] }
        }
        Clockness::Clockwise => smallvec![c, b, a],
        Clockness::CounterClockwise => smallvec![a, b, c],
    }
}

/// Counter-clockwise convex hull of four points.
pub fn convex_hull4(a: DVec2, b: DVec2, c: DVec2, d: DVec2) -> Hull {
    use Clockness::*;

    if clockness(a, b, c) == Neither {
        let (s, t) = find_collinear_bounds(a, b, c);
        return convex_hull3(s, t, d);
    }

    let (a, c) = if clockness(a, b, c) == Clockwise { (c, a) } else { (a, c) };

    let abd = clockness(a, b, d);
    let bcd = clockness(b, c, d);
    let cad = clockness(c, a, d);

    if abd == Neither {
        let (s, t) = find_collinear_bounds(a, b, d);
        return convex_hull3(s, t, c);
    }
    if bcd == Neither {
        let (s, t) = find_collinear_bounds(b, c, d);
        return convex_hull3(s, t, a);
    }
    if cad == Neither {
        let (s, t) = find_collinear_bounds(c, a, d);
        return convex_hull3(s, t, b);
    }

    match (abd, bcd, cad) {
        (CounterClockwise, CounterClockwise, CounterClockwise) => smallvec![a, b, c],
        (CounterClockwise, CounterClockwise, Clockwise) => smallvec![a, b, c, d],
        (CounterClockwise, Clockwise, CounterClockwise) => smallvec![a, b, d, c],
        (CounterClockwise, Clockwise, Clockwise) => smallvec![a, b, d],
        (Clockwise, CounterClockwise, CounterClockwise) => smallvec![a, d, b, c],
        (Clockwise, CounterClockwise, Clockwise) => smallvec![d, b, c],
        (Clockwise, Clockwise, CounterClockwise) => smallvec![a, d, c],
        // d cannot be right of all three edges of a ccw triangle
        _ => smallvec![a, b, c],
    }
}

/// `p` lies inside or on the border of counter-clockwise convex polygon `hull`.
pub fn convex_polygon_contains(hull: &[DVec2], p: DVec2) -> bool {
    let n = hull.len();
    (0..n).all(|i| clockness(hull[(i + n - 1) % n], hull[i], p) != Clockness::Clockwise)
}

/// Whether `segment` touches the counter-clockwise convex polygon `hull`.
/// The polygon border counts as interior, and hulls of one or two points
/// degrade to point and segment tests.
pub fn segment_intersects_convex_polygon_interior(segment: &Segment2, hull: &[DVec2]) -> bool {
    match hull.len() {
        0 | 1 => false,
        2 => segment.intersects(&Segment2::new(hull[0], hull[1])),
        n => {
            if convex_polygon_contains(hull, segment.a) || convex_polygon_contains(hull, segment.b) {
                return true;
            }
            (0..n).any(|i| segment.intersects(&Segment2::new(hull[i], hull[(i + 1) % n])))
        }
    }
}
