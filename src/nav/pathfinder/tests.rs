use super::*;
use crate::nav::geometry::{Bounds2, Segment2};
use crate::nav::overlay::{EdgeId, EdgeJobCache, RegionEdgeDescription, RegionGeometry, RegionId};
use crate::nav::terrain::compile::compile_islands;
use crate::nav::visibility::LandPolygon;

fn region(id: u32, bounds: Bounds2, holes: &[Bounds2]) -> RegionGeometry {
    RegionGeometry {
        region: RegionId(id),
        version: 0,
        polygons: compile_islands(bounds, holes, 0.0, 250.0)
            .into_iter()
            .map(|island| Arc::new(LandPolygon::from_island(Arc::new(island))))
            .collect(),
    }
}

/// Two 1000x1000 regions side by side. The left one is split by a wall at
/// x in [400, 600] with a gap at the top; the regions meet through a portal
/// at x = 1000, y in [200, 400].
fn network() -> Arc<TerrainOverlayNetwork> {
    let wall = Bounds2::from_rect(400.0, 0.0, 200.0, 800.0);
    let regions = vec![
        region(0, Bounds2::from_rect(0.0, 0.0, 1000.0, 1000.0), &[wall]),
        region(1, Bounds2::from_rect(1000.0, 0.0, 1000.0, 1000.0), &[]),
    ];
    let segment = Segment2::new(DVec2::new(1000.0, 200.0), DVec2::new(1000.0, 400.0));
    let edges = [RegionEdgeDescription {
        id: EdgeId(0),
        source: RegionId(0),
        destination: RegionId(1),
        source_segment: segment,
        destination_segment: segment,
    }];
    let cache = std::sync::Mutex::new(EdgeJobCache::default());
    Arc::new(TerrainOverlayNetwork::build(&regions, &edges, &cache, 0.0, 100.0))
}

fn length(path: &[DVec2]) -> f64 {
    path.windows(2).map(|w| w[0].distance(w[1])).sum()
}

#[test]
fn test_straight_path_in_open_land() {
    let network = network();
    let context = find_paths(&network, DVec2::new(1100.0, 100.0), &[DVec2::new(1900.0, 900.0)], 0.1);
    let path = context.roadmap(0).expect("reachable");
    assert_eq!(path, &[DVec2::new(1100.0, 100.0), DVec2::new(1900.0, 900.0)]);
    assert!((context.cost(0).unwrap_or_default() - length(path)).abs() < 1e-6);
}

#[test]
fn test_path_goes_around_wall_and_through_portal() {
    let network = network();
    let source = DVec2::new(100.0, 100.0);
    let destination = DVec2::new(1500.0, 300.0);
    let context = find_paths(&network, source, &[destination], 0.1);
    let path = context.roadmap(0).expect("reachable");

    assert_eq!(path.first(), Some(&source));
    assert_eq!(path.last(), Some(&destination));
    // Over the top of the wall, then down to the portal.
    assert!(path.iter().any(|p| (p.y - 800.0).abs() < 1e-9));
    assert!(path.iter().any(|p| p.x == 1000.0 && (200.0..=400.0).contains(&p.y)));
    assert!(path.windows(2).all(|w| w[0] != w[1]));
    assert!((context.cost(0).unwrap_or_default() - length(path)).abs() < 1e-6);
}

#[test]
fn test_multiple_destinations_share_one_search() {
    let network = network();
    let destinations = [DVec2::new(300.0, 100.0), DVec2::new(1800.0, 800.0), DVec2::new(700.0, 100.0)];
    let context = find_paths(&network, DVec2::new(100.0, 100.0), &destinations, 0.1);
    for k in 0..destinations.len() {
        let path = context.roadmap(k).expect("reachable");
        assert_eq!(path.last(), Some(&destinations[k]));
    }
    assert_eq!(context.roadmap(0).map(|p| p.len()), Some(2));
    assert!(context.cost(2).unwrap_or_default() > 1000.0);
}

#[test]
fn test_off_land_endpoints_are_kept_exact() {
    let network = network();
    let source = DVec2::new(500.0, 100.0);
    let context = find_paths(&network, source, &[DVec2::new(100.0, 100.0)], 0.1);
    let path = context.roadmap(0).expect("snapped onto land");
    assert_eq!(path.first(), Some(&source));
    assert_eq!(path.last(), Some(&DVec2::new(100.0, 100.0)));
}

#[test]
fn test_unreachable_destination() {
    let wall = Bounds2::from_rect(400.0, 0.0, 200.0, 1000.0);
    let regions = vec![region(0, Bounds2::from_rect(0.0, 0.0, 1000.0, 1000.0), &[wall])];
    let cache = std::sync::Mutex::new(EdgeJobCache::default());
    let network = Arc::new(TerrainOverlayNetwork::build(&regions, &[], &cache, 0.0, 100.0));

    let context = find_paths(&network, DVec2::new(100.0, 100.0), &[DVec2::new(900.0, 100.0)], 0.1);
    assert!(context.roadmap(0).is_none());
    assert!(context.cost(0).is_none());
}

#[test]
fn test_find_path_3d_keeps_exact_endpoints() {
    let network = network();
    let source = DVec3::new(100.0, 100.0, 0.0);
    let destination = DVec3::new(1500.0, 300.0, 0.0);
    let path = find_path(&network, source, destination, 0.1).expect("reachable");
    assert_eq!(path.first(), Some(&source));
    assert_eq!(path.last(), Some(&destination));
}
