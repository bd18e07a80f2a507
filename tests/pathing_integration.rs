use bevy::math::{DVec2, DVec3};
use bevy::prelude::*;
use navmotion::nav::geometry::Bounds2;
use navmotion::nav::movement::{
    add_temporary_hole, pathfind, remove_temporary_hole, BaseStats, InvalidatePaths, MovementComponent, PathRequest,
};
use navmotion::nav::{NavConfig, NavigationPlugin, RegionPreset, TerrainService};

/// Single blank region at the origin, no config file involved.
fn setup_app(preset: RegionPreset) -> App {
    let config = NavConfig::default();
    let mut terrain = TerrainService::from_config(&config);
    terrain.add_region(&preset, DVec2::ZERO);

    let mut app = App::new();
    app.insert_resource(config);
    app.insert_resource(terrain);
    app.add_plugins(NavigationPlugin::default());
    app
}

fn tick(app: &mut App, count: usize) {
    for _ in 0..count {
        app.world_mut().run_schedule(FixedUpdate);
    }
}

fn polyline_length(points: impl IntoIterator<Item = DVec3>) -> f64 {
    let points: Vec<DVec3> = points.into_iter().collect();
    points.windows(2).map(|w| w[0].truncate().distance(w[1].truncate())).sum()
}

fn route(app: &App, from: DVec3, to: DVec3, radius: f64) -> Option<Vec<DVec3>> {
    let config = app.world().resource::<NavConfig>();
    let snapshot = app.world().resource::<TerrainService>().snapshot();
    let mut movement = MovementComponent::new(from, radius, 100.0);
    pathfind(snapshot.as_ref(), &BaseStats, config, &mut movement, to).then(|| movement.pathing_breadcrumbs.into())
}

#[test]
fn test_open_island_path_keeps_exact_endpoints() {
    let app = setup_app(RegionPreset::blank());
    let source = DVec3::new(60.0, 40.0, 0.0);
    let destination = DVec3::new(930.0, 300.0, 0.0);

    let path = route(&app, source, destination, 15.0).expect("open land");
    assert!(!path.is_empty());
    assert_eq!(path.first(), Some(&source));
    assert_eq!(path.last(), Some(&destination));
}

#[test]
fn test_agent_walks_its_breadcrumbs_to_the_end() {
    let mut app = setup_app(RegionPreset::test_2d());
    let destination = DVec3::new(930.0, 300.0, 0.0);
    let entity = app.world_mut().spawn(MovementComponent::new(DVec3::new(60.0, 40.0, 0.0), 15.0, 600.0)).id();
    app.world_mut().write_message(PathRequest { entity, destination });

    tick(&mut app, 1);
    let movement = app.world().get::<MovementComponent>(entity).expect("spawned");
    assert_eq!(movement.pathing_destination, Some(destination));
    assert!(!movement.pathing_breadcrumbs.is_empty());

    tick(&mut app, 300);
    let movement = app.world().get::<MovementComponent>(entity).expect("spawned");
    assert_eq!(movement.position, destination);
    assert!(movement.pathing_breadcrumbs.is_empty());
}

#[test]
fn test_hole_on_straight_line_lengthens_path() {
    let mut app = setup_app(RegionPreset::blank());
    let source = DVec3::new(100.0, 500.0, 0.0);
    let destination = DVec3::new(900.0, 500.0, 0.0);

    let before = route(&app, source, destination, 10.0).expect("open land");
    assert!((polyline_length(before.iter().copied()) - 800.0).abs() < 1e-6);

    add_temporary_hole(app.world_mut(), Bounds2::from_rect(400.0, 300.0, 200.0, 400.0)).expect("terrain present");
    let after = route(&app, source, destination, 10.0).expect("way around the hole");
    assert!(polyline_length(after.iter().copied()) > polyline_length(before.iter().copied()));
}

#[test]
fn test_repathing_is_idempotent() {
    let app = setup_app(RegionPreset::test_2d());
    let source = DVec3::new(60.0, 40.0, 0.0);
    let destination = DVec3::new(930.0, 950.0, 0.0);

    let first = route(&app, source, destination, 12.0).expect("connected");
    let second = route(&app, source, destination, 12.0).expect("connected");
    assert_eq!(first, second);
}

#[test]
fn test_removed_hole_no_longer_detours() {
    let mut app = setup_app(RegionPreset::blank());
    let destination = DVec3::new(900.0, 500.0, 0.0);
    let entity = app.world_mut().spawn(MovementComponent::new(DVec3::new(100.0, 500.0, 0.0), 10.0, 30.0)).id();

    let hole = add_temporary_hole(app.world_mut(), Bounds2::from_rect(400.0, 300.0, 200.0, 400.0)).expect("terrain present");
    app.world_mut().write_message(PathRequest { entity, destination });
    tick(&mut app, 1);

    let movement = app.world().get::<MovementComponent>(entity).expect("spawned");
    let detour = movement.pathing_breadcrumbs.iter().map(|p| (p.y - 500.0).abs()).fold(0.0, f64::max);
    assert!(detour > 100.0, "expected a detour, got {:?}", movement.pathing_breadcrumbs);

    remove_temporary_hole(app.world_mut(), hole.id).expect("hole exists");
    app.world_mut().write_message(InvalidatePaths);
    tick(&mut app, 1);

    let movement = app.world().get::<MovementComponent>(entity).expect("spawned");
    assert_eq!(movement.pathing_breadcrumbs.back(), Some(&destination));
    for p in &movement.pathing_breadcrumbs {
        assert!((p.y - 500.0).abs() < 2.0, "still detouring: {:?}", movement.pathing_breadcrumbs);
    }
}

#[test]
fn test_agent_caught_by_new_hole_is_pushed_out() {
    let mut app = setup_app(RegionPreset::blank());
    let entity = app.world_mut().spawn(MovementComponent::new(DVec3::new(500.0, 500.0, 0.0), 10.0, 30.0)).id();

    let hole = add_temporary_hole(app.world_mut(), Bounds2::from_rect(450.0, 450.0, 100.0, 100.0)).expect("terrain present");
    tick(&mut app, 1);

    let movement = app.world().get::<MovementComponent>(entity).expect("spawned");
    assert!(!hole.contains_point(10.0, movement.position), "agent left at {:?}", movement.position);
}
