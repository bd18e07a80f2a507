/// Geometry primitives shared by the navigation layers.
///
/// - **primitives**: clockness, segments, bounds, barycentric tests, convex hulls,
///   and the integer square-root table
/// - **bvh**: static bounding-volume hierarchy used for point location and
///   barrier queries
pub mod bvh;
pub mod primitives;

pub use bvh::Bvh;
pub use primitives::*;
