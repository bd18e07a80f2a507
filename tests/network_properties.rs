use bevy::math::{DVec2, DVec3};
use navmotion::nav::crossover::CrossoverPointManager;
use navmotion::nav::geometry::Segment2;
use navmotion::nav::terrain::compile::compile_islands;
use navmotion::nav::visibility::LandPolygon;
use navmotion::nav::{NavConfig, RegionPreset, TerrainService, TerrainSnapshot};
use std::sync::Arc;

const RADIUS: f64 = 10.0;

fn path_length(path: &[DVec3]) -> f64 {
    path.windows(2).map(|w| w[0].truncate().distance(w[1].truncate())).sum()
}

fn two_sectors() -> TerrainService {
    let mut terrain = TerrainService::from_config(&NavConfig::default());
    let left = terrain.add_region(&RegionPreset::test_2d(), DVec2::ZERO);
    let right = terrain.add_region(&RegionPreset::four_squares(), DVec2::new(1000.0, 0.0));
    for (low, high) in [(100.0, 180.0), (450.0, 550.0)] {
        terrain.add_portal(
            left,
            right,
            Segment2::new(DVec2::new(1000.0, low), DVec2::new(1000.0, high)),
            Segment2::new(DVec2::new(0.0, low), DVec2::new(0.0, high)),
        );
    }
    terrain
}

fn random_land_point(rng: &mut fastrand::Rng, snapshot: &dyn TerrainSnapshot, x_offset: f64) -> DVec3 {
    let triangulation = snapshot.compute_triangulation(RADIUS);
    loop {
        let p = DVec2::new(x_offset + rng.f64() * 1000.0, rng.f64() * 1000.0);
        if triangulation.try_locate(p).is_some() {
            return p.extend(0.0);
        }
    }
}

#[test]
fn test_paths_across_seam_are_symmetric() {
    let terrain = two_sectors();
    let snapshot = terrain.snapshot();
    let mut rng = fastrand::Rng::with_seed(42);

    for _ in 0..25 {
        let a = random_land_point(&mut rng, snapshot.as_ref(), 0.0);
        let b = random_land_point(&mut rng, snapshot.as_ref(), 1000.0);
        let forward = snapshot.find_path(RADIUS, a, b);
        let backward = snapshot.find_path(RADIUS, b, a);
        assert_eq!(forward.is_some(), backward.is_some(), "asymmetric reachability between {a:?} and {b:?}");
        if let (Some(forward), Some(backward)) = (forward, backward) {
            let (f, r) = (path_length(&forward), path_length(&backward));
            assert!((f - r).abs() <= 0.01 * f.max(r), "{a:?} <-> {b:?}: {f} vs {r}");
        }
    }
}

/// `cost(p, r) <= cost(p, q) + cost(q, r)` over every triple, and no pair
/// left without a route.
fn assert_costs_are_metric(crossovers: &CrossoverPointManager, context: &str) {
    let n = crossovers.len();
    for p in 0..n {
        for q in 0..n {
            let link = crossovers.link_between(p, q);
            assert!(!link.is_error(), "{context}: no route from {:?} to {:?}", crossovers.point(p), crossovers.point(q));
            for r in 0..n {
                let pr = crossovers.link_between(p, r).total_cost;
                let qr = crossovers.link_between(q, r).total_cost;
                let slack = 1e-6 * pr.max(1.0);
                assert!(pr <= link.total_cost + qr + slack, "{context}: cost({p},{r}) = {pr} > {} + {qr}", link.total_cost);
            }
        }
    }
}

#[test]
fn test_crossover_costs_obey_triangle_inequality() {
    let preset = RegionPreset::test_2d();
    let bounds = navmotion::nav::geometry::Bounds2::from_rect(0.0, 0.0, 1000.0, 1000.0);
    let corners = [DVec2::new(0.0, 0.0), DVec2::new(1000.0, 0.0), DVec2::new(1000.0, 1000.0), DVec2::new(0.0, 1000.0)];

    for radius in [5.0, 10.0] {
        let islands = compile_islands(bounds, &preset.holes, radius, 100.0);
        let island = islands
            .into_iter()
            .find(|island| island.contains(DVec2::new(5.0, 500.0)))
            .expect("outer island");
        let polygon = Arc::new(LandPolygon::from_island(Arc::new(island)));

        for seed in 0..12 {
            let mut rng = fastrand::Rng::with_seed(seed);
            let mut crossovers = CrossoverPointManager::new(polygon.clone());
            for k in 0..4 {
                let edge = Segment2::new(corners[k], corners[(k + 1) % 4]);
                // Interval ends are where dilated holes meet the border.
                for (t0, t1) in polygon.land_intervals(&edge) {
                    let mut samples = vec![edge.point_at(t0), edge.point_at(t1)];
                    samples.extend((0..3).map(|_| edge.point_at(t0 + rng.f64() * (t1 - t0))));
                    crossovers.add_many(edge, &samples);
                }
            }
            assert!(crossovers.len() >= 20);
            assert_costs_are_metric(&crossovers, &format!("radius {radius}, seed {seed}"));
        }
    }
}

/// Three regions glued along two seams, with randomly placed portals. The
/// upper seam runs through a hole that overhangs the lower-left region.
fn random_portals(rng: &mut fastrand::Rng) -> TerrainService {
    let mut terrain = TerrainService::from_config(&NavConfig::default());
    let home = terrain.add_region(&RegionPreset::test_2d(), DVec2::ZERO);
    let east = terrain.add_region(&RegionPreset::four_squares(), DVec2::new(1000.0, 0.0));
    let north = terrain.add_region(&RegionPreset::blank(), DVec2::new(0.0, 1000.0));
    let mut span = || {
        let low = rng.f64() * 900.0;
        (low, low + 20.0 + rng.f64() * (980.0 - low))
    };
    for _ in 0..2 {
        let (low, high) = span();
        terrain.add_portal(
            home,
            east,
            Segment2::new(DVec2::new(1000.0, low), DVec2::new(1000.0, high)),
            Segment2::new(DVec2::new(0.0, low), DVec2::new(0.0, high)),
        );
        let (low, high) = span();
        terrain.add_portal(
            home,
            north,
            Segment2::new(DVec2::new(low, 1000.0), DVec2::new(high, 1000.0)),
            Segment2::new(DVec2::new(low, 0.0), DVec2::new(high, 0.0)),
        );
    }
    terrain
}

#[test]
fn test_overlay_crossovers_on_random_portals_are_all_linked() {
    for seed in 0..8 {
        let mut rng = fastrand::Rng::with_seed(seed);
        let terrain = random_portals(&mut rng);
        let snapshot = terrain.snapshot();
        for radius in [5.0, 10.0] {
            let network = snapshot.compute_overlay_network(radius);
            let mut total = 0;
            for (i, node) in network.nodes().iter().enumerate() {
                total += node.crossovers.len();
                assert_costs_are_metric(&node.crossovers, &format!("seed {seed}, radius {radius}, node {i}"));
            }
            assert!(total > 0, "seed {seed}, radius {radius}: no crossovers");
        }
    }
}

#[test]
fn test_preset_loaded_from_json_routes_like_builtin() {
    let json = r#"{
        "size": [1000.0, 1000.0],
        "holes": [
            { "min": [200.0, 200.0], "max": [400.0, 400.0] },
            { "min": [200.0, 600.0], "max": [400.0, 800.0] },
            { "min": [600.0, 200.0], "max": [800.0, 400.0] },
            { "min": [600.0, 600.0], "max": [800.0, 800.0] }
        ]
    }"#;
    let loaded: RegionPreset = serde_json::from_str(json).expect("valid preset");
    assert_eq!(loaded, RegionPreset::four_squares());

    let route = |preset: &RegionPreset| {
        let mut terrain = TerrainService::from_config(&NavConfig::default());
        terrain.add_region(preset, DVec2::ZERO);
        terrain.snapshot().find_path(RADIUS, DVec3::new(100.0, 300.0, 0.0), DVec3::new(900.0, 700.0, 0.0))
    };
    let expected = route(&RegionPreset::four_squares()).expect("connected");
    assert_eq!(route(&loaded), Some(expected));
}
