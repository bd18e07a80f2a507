use super::*;
use crate::nav::geometry::Bounds2;
use crate::nav::terrain::compile::compile_islands;

const BUFFER: f64 = 0.1;

fn strip() -> TriangulationIsland {
    compile_islands(Bounds2::from_rect(0.0, 0.0, 300.0, 100.0), &[], 0.0, 100.0)
        .into_iter()
        .next()
        .expect("strip is land")
}

fn holed_square() -> TriangulationIsland {
    compile_islands(
        Bounds2::from_rect(0.0, 0.0, 1000.0, 1000.0),
        &[Bounds2::from_rect(400.0, 400.0, 200.0, 200.0)],
        10.0,
        100.0,
    )
    .into_iter()
    .next()
    .expect("square is land")
}

fn start(island: &TriangulationIsland, x: f64, y: f64) -> (DVec3, usize) {
    let p = DVec2::new(x, y);
    let triangle = island.try_locate(p).expect("start on land");
    (island.triangle(triangle).lift(p), triangle)
}

#[test]
fn test_walk_across_triangles_conserves_distance() {
    let island = strip();
    let walker = TriangleWalker::new(&island, BUFFER, 256);
    let (position, triangle) = start(&island, 10.0, 50.0);

    let outcome = walker.walk(position, DVec2::X, 250.0, triangle);
    assert!((outcome.distance_consumed - 250.0).abs() < 1e-6, "consumed {}", outcome.distance_consumed);
    assert!((outcome.position.x - 260.0).abs() < 1.0, "ended at {:?}", outcome.position);
    assert_eq!(island.try_locate(outcome.position.truncate()), Some(outcome.triangle));
}

#[test]
fn test_walk_stops_at_wall_head_on() {
    let island = strip();
    let walker = TriangleWalker::new(&island, BUFFER, 256);
    let (position, triangle) = start(&island, 250.0, 50.0);

    let outcome = walker.walk(position, DVec2::X, 100.0, triangle);
    assert!((outcome.distance_consumed - 100.0).abs() < 1e-6);
    assert!(outcome.position.x < 300.0);
    assert!(outcome.position.x > 299.0);
    assert!((outcome.position.y - 50.0).abs() < 0.2);
}

#[test]
fn test_walk_slides_along_wall() {
    let island = strip();
    let walker = TriangleWalker::new(&island, BUFFER, 256);
    let (position, triangle) = start(&island, 50.0, 80.0);

    // Heading up and right; the top wall turns it right.
    let outcome = walker.walk(position, DVec2::new(1.0, 1.0), 100.0, triangle);
    assert!(outcome.position.y < 100.0);
    assert!(outcome.position.y > 99.0);
    assert!(outcome.position.x > 100.0, "slid to {:?}", outcome.position);
    assert!(island.try_locate(outcome.position.truncate()).is_some());
}

#[test]
fn test_walk_into_corner_stays_inside() {
    let island = strip();
    let walker = TriangleWalker::new(&island, BUFFER, 256);
    let (position, triangle) = start(&island, 290.0, 90.0);

    let outcome = walker.walk(position, DVec2::new(1.0, 1.0), 500.0, triangle);
    assert!(outcome.position.x < 300.0 && outcome.position.y < 100.0);
    assert!(island.try_locate(outcome.position.truncate()).is_some());
}

#[test]
fn test_step_pushes_inward_from_outside() {
    let island = strip();
    let walker = TriangleWalker::new(&island, BUFFER, 256);
    let (_, triangle) = start(&island, 50.0, 50.0);
    let outside = DVec3::new(-5.0, 50.0, 0.0);

    // Heading along the triangle instead of into or out of it.
    let step = walker.step(outside, DVec2::Y, 10.0, triangle, EdgeFollow::Allowed);
    match step {
        WalkStep::PushInward { position, triangle: t } => {
            assert_eq!(t, triangle);
            assert!(position.x > outside.x);
        }
        other => panic!("expected push inward, got {other:?}"),
    }
}

#[test]
fn test_forbidden_edge_follow_reports_wall() {
    let island = strip();
    let walker = TriangleWalker::new(&island, BUFFER, 256);
    let (position, triangle) = start(&island, 50.0, 90.0);

    let step = walker.step(position, DVec2::Y, 50.0, triangle, EdgeFollow::Forbidden);
    match step {
        WalkStep::CanEdgeFollow { position, consumed, .. } => {
            assert!((consumed - 10.0).abs() < 1e-6);
            assert!((position.y - (100.0 - BUFFER)).abs() < 1e-6);
        }
        other => panic!("expected wall, got {other:?}"),
    }
}

#[test]
fn test_random_walks_stay_on_land() {
    let island = holed_square();
    let walker = TriangleWalker::new(&island, BUFFER, 256);
    let mut rng = fastrand::Rng::with_seed(7);

    for _ in 0..200 {
        let p = DVec2::new(rng.f64() * 1000.0, rng.f64() * 1000.0);
        let Some(triangle) = island.try_locate(p) else { continue };
        let angle = rng.f64() * std::f64::consts::TAU;
        let direction = DVec2::new(angle.cos(), angle.sin());
        let distance = rng.f64() * 400.0;

        let outcome = walker.walk(island.triangle(triangle).lift(p), direction, distance, triangle);
        assert!(outcome.distance_consumed <= distance + 1e-6);
        assert!(
            island.try_locate(outcome.position.truncate()).is_some(),
            "walk from {p:?} along {direction:?} left land at {:?}",
            outcome.position
        );
    }
}
