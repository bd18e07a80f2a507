use super::*;
use crate::nav::geometry::Segment2;
use crate::nav::terrain::{RegionPreset, TerrainSettings};
use bevy::math::DVec2;

fn terrain() -> TerrainService {
    let mut terrain = TerrainService::new(TerrainSettings::from(&NavConfig::default()));
    terrain.add_region(&RegionPreset::test_2d(), DVec2::ZERO);
    terrain
}

#[test]
fn test_pathfind_sets_breadcrumbs() {
    let terrain = terrain();
    let config = NavConfig::default();
    let mut movement = MovementComponent::new(DVec3::new(60.0, 40.0, 0.0), 15.0, 100.0);
    let destination = DVec3::new(930.0, 300.0, 0.0);

    assert!(pathfind(terrain.snapshot().as_ref(), &BaseStats, &config, &mut movement, destination));
    assert_eq!(movement.pathing_destination, Some(destination));
    assert_eq!(movement.pathing_breadcrumbs.front(), Some(&movement.position));
    assert_eq!(movement.pathing_breadcrumbs.back(), Some(&destination));
    assert!(!movement.pathing_is_invalidated);
}

#[test]
fn test_unreachable_keeps_destination() {
    let mut terrain = TerrainService::new(TerrainSettings::from(&NavConfig::default()));
    let left = terrain.add_region(&RegionPreset::blank(), DVec2::ZERO);
    terrain.add_region(&RegionPreset::blank(), DVec2::new(5000.0, 0.0));
    assert!(terrain.region(left).is_some());

    let config = NavConfig::default();
    let mut movement = MovementComponent::new(DVec3::new(500.0, 500.0, 0.0), 10.0, 100.0);
    movement.pathing_breadcrumbs.push_back(DVec3::new(1.0, 1.0, 0.0));
    let destination = DVec3::new(5500.0, 500.0, 0.0);

    assert!(!pathfind(terrain.snapshot().as_ref(), &BaseStats, &config, &mut movement, destination));
    assert!(movement.pathing_breadcrumbs.is_empty());
    assert_eq!(movement.pathing_destination, Some(destination));
}

#[test]
fn test_portal_makes_destination_reachable() {
    let mut terrain = TerrainService::new(TerrainSettings::from(&NavConfig::default()));
    let left = terrain.add_region(&RegionPreset::blank(), DVec2::ZERO);
    let right = terrain.add_region(&RegionPreset::blank(), DVec2::new(5000.0, 0.0));
    let seam = Segment2::new(DVec2::new(1000.0, 400.0), DVec2::new(1000.0, 600.0));
    let other = Segment2::new(DVec2::new(0.0, 400.0), DVec2::new(0.0, 600.0));
    assert!(terrain.add_portal(left, right, seam, other).is_some());

    let config = NavConfig::default();
    let mut movement = MovementComponent::new(DVec3::new(500.0, 500.0, 0.0), 10.0, 100.0);
    assert!(pathfind(terrain.snapshot().as_ref(), &BaseStats, &config, &mut movement, DVec3::new(5500.0, 500.0, 0.0)));
}

#[test]
fn test_follow_breadcrumbs_spends_budget() {
    let mut movement = MovementComponent::new(DVec3::ZERO, 5.0, 10.0);
    movement.pathing_breadcrumbs =
        [DVec3::ZERO, DVec3::new(3.0, 0.0, 0.0), DVec3::new(3.0, 10.0, 0.0)].into_iter().collect();

    systems::follow_breadcrumbs(&mut movement, 5.0);
    assert_eq!(movement.position, DVec3::new(3.0, 2.0, 0.0));
    assert_eq!(movement.pathing_breadcrumbs.len(), 1);
    assert_eq!(movement.look_at, DVec3::Y);

    systems::follow_breadcrumbs(&mut movement, 100.0);
    assert_eq!(movement.position, DVec3::new(3.0, 10.0, 0.0));
    assert!(movement.pathing_breadcrumbs.is_empty());
}

#[test]
fn test_hole_pushes_agents_out_and_invalidates() {
    let mut terrain = terrain();
    let config = NavConfig::default();
    let mut inside = MovementComponent::new(DVec3::new(100.0, 470.0, 0.0), 10.0, 100.0);
    let mut outside = MovementComponent::new(DVec3::new(500.0, 100.0, 0.0), 10.0, 100.0);

    let hole = terrain.add_temporary_hole(Bounds2::from_rect(50.0, 420.0, 100.0, 100.0));
    handle_hole_added(terrain.snapshot().as_ref(), &BaseStats, &config, &hole, [&mut inside, &mut outside]);

    assert!(inside.pathing_is_invalidated && outside.pathing_is_invalidated);
    assert_eq!(outside.position, DVec3::new(500.0, 100.0, 0.0));
    let padded = 10.0 + config.additional_hole_dilation_radius + config.edge_buffer_radius;
    assert!(!hole.contains_point(padded, inside.position), "still in the hole at {:?}", inside.position);
    let triangulation = terrain.snapshot().compute_triangulation(10.0);
    assert!(triangulation.try_locate(inside.position.truncate()).is_some());
}

#[test]
fn test_invalidate_paths_flags_everyone() {
    let mut agents = vec![MovementComponent::new(DVec3::ZERO, 1.0, 1.0); 3];
    invalidate_paths(agents.iter_mut());
    assert!(agents.iter().all(|a| a.pathing_is_invalidated));
}
