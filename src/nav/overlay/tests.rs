use super::*;
use crate::nav::geometry::Bounds2;
use crate::nav::terrain::compile::compile_islands;

fn region(id: u32, bounds: Bounds2, holes: &[Bounds2], version: u64) -> RegionGeometry {
    RegionGeometry {
        region: RegionId(id),
        version,
        polygons: compile_islands(bounds, holes, 0.0, 500.0)
            .into_iter()
            .map(|island| Arc::new(LandPolygon::from_island(Arc::new(island))))
            .collect(),
    }
}

fn portal(id: u32, source: u32, destination: u32, x: f64, y0: f64, y1: f64) -> RegionEdgeDescription {
    let segment = Segment2::new(DVec2::new(x, y0), DVec2::new(x, y1));
    RegionEdgeDescription {
        id: EdgeId(id),
        source: RegionId(source),
        destination: RegionId(destination),
        source_segment: segment,
        destination_segment: segment,
    }
}

fn two_regions() -> Vec<RegionGeometry> {
    vec![
        region(0, Bounds2::from_rect(0.0, 0.0, 1000.0, 1000.0), &[], 0),
        region(1, Bounds2::from_rect(1000.0, 0.0, 1000.0, 1000.0), &[], 0),
    ]
}

#[test]
fn test_portal_creates_edge_groups_both_ways() {
    let cache = std::sync::Mutex::new(EdgeJobCache::default());
    let network =
        TerrainOverlayNetwork::build(&two_regions(), &[portal(0, 0, 1, 1000.0, 200.0, 400.0)], &cache, 10.0, 100.0);

    assert_eq!(network.nodes().len(), 2);
    assert_eq!(network.edge_groups().len(), 2);
    for group in network.edge_groups() {
        assert_eq!(group.len(), 3);
        assert_ne!(group.source, group.destination);
        for (&s, &d) in group.source_crossovers.iter().zip(&group.destination_crossovers) {
            let p = network.node(group.source).crossovers.point(s);
            let q = network.node(group.destination).crossovers.point(d);
            assert_eq!(p, q);
        }
    }
    let node = network.node(NodeId(0));
    assert_eq!(node.outbound_groups().len(), 1);
    assert_eq!(node.exits(0).len(), 1);
}

#[test]
fn test_duplicate_reverse_description_adds_no_pairs() {
    let cache = std::sync::Mutex::new(EdgeJobCache::default());
    let edges = [portal(0, 0, 1, 1000.0, 200.0, 400.0), portal(1, 1, 0, 1000.0, 200.0, 400.0)];
    let network = TerrainOverlayNetwork::build(&two_regions(), &edges, &cache, 10.0, 100.0);
    assert_eq!(network.edge_groups().len(), 2);
    assert!(network.edge_groups().iter().all(|g| g.len() == 3));
}

#[test]
fn test_locate_and_snap() {
    let cache = std::sync::Mutex::new(EdgeJobCache::default());
    let network = TerrainOverlayNetwork::build(&two_regions(), &[], &cache, 10.0, 100.0);

    assert_eq!(network.locate(DVec2::new(500.0, 500.0)), Some(NodeId(0)));
    assert_eq!(network.locate(DVec2::new(1500.0, 500.0)), Some(NodeId(1)));
    assert_eq!(network.locate(DVec2::new(5000.0, 500.0)), None);

    let (node, snapped) = network.locate_or_snap(DVec2::new(2100.0, 500.0), 0.1).expect("land exists");
    assert_eq!(node, NodeId(1));
    assert!(snapped.x < 2000.0 && snapped.x > 1999.0);
}

#[test]
fn test_rebuild_reuses_cached_jobs() {
    let cache = std::sync::Mutex::new(EdgeJobCache::default());
    let edges = [portal(0, 0, 1, 1000.0, 200.0, 400.0)];
    TerrainOverlayNetwork::build(&two_regions(), &edges, &cache, 10.0, 100.0);
    TerrainOverlayNetwork::build(&two_regions(), &edges, &cache, 10.0, 100.0);
    assert_eq!(cache.lock().unwrap().stats(), (1, 1));

    let mut changed = two_regions();
    changed[1] = region(1, Bounds2::from_rect(1000.0, 0.0, 1000.0, 1000.0), &[Bounds2::from_rect(1500.0, 500.0, 10.0, 10.0)], 1);
    TerrainOverlayNetwork::build(&changed, &edges, &cache, 10.0, 100.0);
    assert_eq!(cache.lock().unwrap().stats(), (1, 2));
    assert_eq!(cache.lock().unwrap().len(), 1);
}
