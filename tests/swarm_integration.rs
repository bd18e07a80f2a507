use bevy::math::{DVec2, DVec3};
use bevy::prelude::*;
use navmotion::nav::geometry::Bounds2;
use navmotion::nav::movement::{MovementComponent, Swarm};
use navmotion::nav::{NavConfig, NavigationPlugin, RegionPreset, TerrainService};

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

fn tick(app: &mut App) {
    app.world_mut().run_schedule(FixedUpdate);
}

fn swarmlings(app: &mut App) -> Vec<(Entity, MovementComponent)> {
    let mut query = app.world_mut().query::<(Entity, &MovementComponent)>();
    let mut agents: Vec<_> = query.iter(app.world()).map(|(e, m)| (e, m.clone())).collect();
    agents.sort_by_key(|(e, _)| *e);
    agents
}

fn assert_all_on_land(app: &mut App) {
    let snapshot = app.world().resource::<TerrainService>().snapshot();
    for (entity, movement) in swarmlings(app) {
        let triangulation = snapshot.compute_triangulation(movement.tick.computed_radius as f64);
        assert!(
            triangulation.try_locate(movement.position.truncate()).is_some(),
            "{entity:?} left land at {:?}",
            movement.position
        );
    }
}

#[test]
fn test_overlapping_agents_separate() {
    let mut app = setup_app(RegionPreset::blank());
    let speed = 60.0;
    let swarm = app.world_mut().spawn(Swarm { destination: DVec3::new(512.0, 900.0, 0.0) }).id();
    let a = DVec3::new(510.0, 520.0, 0.0);
    let b = DVec3::new(515.0, 520.0, 0.0);
    let first = app.world_mut().spawn(MovementComponent::new(a, 10.0, speed).in_swarm(swarm)).id();
    let second = app.world_mut().spawn(MovementComponent::new(b, 10.0, speed).in_swarm(swarm)).id();

    tick(&mut app);

    let seconds = app.world().resource::<NavConfig>().seconds_per_tick;
    let pa = app.world().get::<MovementComponent>(first).expect("spawned").position;
    let pb = app.world().get::<MovementComponent>(second).expect("spawned").position;
    assert!(pa.distance(pb) > a.distance(b), "{pa:?} and {pb:?} did not separate");
    let step = speed * seconds + 0.5;
    assert!(pa.distance(a) <= step);
    assert!(pb.distance(b) <= step);
}

#[test]
fn test_swarm_velocities_head_toward_destination() {
    let mut app = setup_app(RegionPreset::blank());
    let destination = DVec3::new(900.0, 500.0, 0.0);
    let swarm = app.world_mut().spawn(Swarm { destination }).id();
    for i in 0..10 {
        for j in 0..10 {
            let position = DVec3::new(100.0 + 30.0 * i as f64, 350.0 + 30.0 * j as f64, 0.0);
            app.world_mut().spawn(MovementComponent::new(position, 10.0, 60.0).in_swarm(swarm));
        }
    }

    tick(&mut app);

    let agents = swarmlings(&mut app);
    assert_eq!(agents.len(), 100);
    for (entity, movement) in agents {
        let velocity = movement.tick.swarmling_velocity;
        assert!(velocity.length() > 0.0, "{entity:?} is not moving");
        // Positions already advanced one step; the heading still points at the goal.
        let to_destination = destination.truncate() - movement.position.truncate();
        assert!(velocity.dot(to_destination) >= 0.0, "{entity:?} heads away with {velocity:?}");
    }
}

#[test]
fn test_swarm_stays_on_land_around_obstacles() {
    let mut app = setup_app(RegionPreset::four_squares());
    let swarm = app.world_mut().spawn(Swarm { destination: DVec3::new(900.0, 900.0, 0.0) }).id();
    let mut rng = fastrand::Rng::with_seed(11);
    for _ in 0..40 {
        let p = DVec2::new(rng.f64() * 180.0 + 10.0, rng.f64() * 980.0 + 10.0);
        app.world_mut().spawn(MovementComponent::new(p.extend(0.0), 10.0, 90.0).in_swarm(swarm));
    }

    for _ in 0..90 {
        tick(&mut app);
        assert_all_on_land(&mut app);
    }
}

#[test]
fn test_swarm_gets_closer_to_destination() {
    let mut app = setup_app(RegionPreset::four_squares());
    let destination = DVec3::new(900.0, 900.0, 0.0);
    let swarm = app.world_mut().spawn(Swarm { destination }).id();
    for i in 0..5 {
        let position = DVec3::new(100.0, 100.0 + 30.0 * i as f64, 0.0);
        app.world_mut().spawn(MovementComponent::new(position, 10.0, 90.0).in_swarm(swarm));
    }
    let mean_distance = |agents: &[(Entity, MovementComponent)]| {
        agents.iter().map(|(_, m)| m.position.truncate().distance(destination.truncate())).sum::<f64>() / agents.len() as f64
    };

    let before = mean_distance(&swarmlings(&mut app));
    for _ in 0..120 {
        tick(&mut app);
    }
    let after = mean_distance(&swarmlings(&mut app));
    assert!(after < before - 100.0, "mean distance went from {before} to {after}");
}

#[test]
fn test_swarm_retargets_on_path_request() {
    let mut app = setup_app(RegionPreset::blank());
    let swarm = app.world_mut().spawn(Swarm { destination: DVec3::new(900.0, 500.0, 0.0) }).id();
    app.world_mut().spawn(MovementComponent::new(DVec3::new(500.0, 500.0, 0.0), 10.0, 60.0).in_swarm(swarm));

    let destination = DVec3::new(100.0, 500.0, 0.0);
    app.world_mut().write_message(navmotion::nav::PathRequest { entity: swarm, destination });
    tick(&mut app);

    assert_eq!(app.world().get::<Swarm>(swarm).map(|s| s.destination), Some(destination));
    let (_, movement) = swarmlings(&mut app).remove(0);
    assert!(movement.position.x < 500.0);
}

#[test]
fn test_new_hole_pushes_swarmlings_out() {
    let mut app = setup_app(RegionPreset::blank());
    let swarm = app.world_mut().spawn(Swarm { destination: DVec3::new(900.0, 500.0, 0.0) }).id();
    app.world_mut().spawn(MovementComponent::new(DVec3::new(500.0, 500.0, 0.0), 10.0, 60.0).in_swarm(swarm));
    tick(&mut app);

    navmotion::nav::movement::add_temporary_hole(app.world_mut(), Bounds2::from_rect(450.0, 400.0, 150.0, 200.0))
        .expect("terrain present");
    tick(&mut app);
    assert_all_on_land(&mut app);
}
