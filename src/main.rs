use bevy::math::{DVec2, DVec3};
use bevy::prelude::*;

use navmotion::nav::config::DEFAULT_CONFIG_PATH;
use navmotion::nav::crossover::dump_performance_counters;
use navmotion::nav::geometry::{Bounds2, Segment2};
use navmotion::nav::movement::{add_temporary_hole, MovementComponent, PathRequest, Swarm};
use navmotion::nav::{NavConfig, NavigationPlugin, RegionPreset, TerrainService};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SWARM_SIZE: usize = 100;
const DEMO_SECONDS: f64 = 5.0;
const SECTOR_SIZE: f64 = 1000.0;

fn setup_file_logging() -> std::io::Result<String> {
    let log_dir = PathBuf::from("logs");
    fs::create_dir_all(&log_dir)?;

    // Keep the last 25 runs
    cleanup_old_logs(&log_dir, 25);

    let now = chrono::Local::now();
    let log_filename = format!("navmotion_{}.log", now.format("%Y%m%d_%H%M%S"));
    let log_path_str = log_dir.join(&log_filename).to_string_lossy().to_string();

    let file_appender = RollingFileAppender::new(Rotation::NEVER, &log_dir, &log_filename);
    let file_layer = fmt::layer().with_writer(file_appender).with_ansi(false);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bevy_ecs=info,navmotion=info"));

    tracing_subscriber::registry().with(filter).with(file_layer).with(stdout_layer).init();

    Ok(log_path_str)
}

fn cleanup_old_logs(log_dir: &Path, keep_count: usize) {
    if let Ok(entries) = fs::read_dir(log_dir) {
        let mut log_files: Vec<_> = entries
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|s| s.starts_with("navmotion") && s.ends_with(".log"))
                    .unwrap_or(false)
            })
            .collect();

        // Oldest first
        log_files.sort_by_key(|e| e.metadata().ok().and_then(|m| m.modified().ok()));

        if log_files.len() > keep_count {
            for file in log_files.iter().take(log_files.len() - keep_count) {
                let _ = fs::remove_file(file.path());
            }
        }
    }
}

/// Three sectors in a row, each seam crossed by two portals.
fn build_terrain(config: &NavConfig) -> TerrainService {
    let mut terrain = TerrainService::from_config(config);
    let presets = [RegionPreset::four_squares(), RegionPreset::test_2d(), RegionPreset::blank()];
    let regions: Vec<_> = presets
        .iter()
        .enumerate()
        .map(|(i, preset)| terrain.add_region(preset, DVec2::new(i as f64 * SECTOR_SIZE, 0.0)))
        .collect();

    let spans = [(200.0, 400.0), (600.0, 800.0)];
    for pair in regions.windows(2) {
        for &(low, high) in &spans {
            let right = Segment2::new(DVec2::new(SECTOR_SIZE, low), DVec2::new(SECTOR_SIZE, high));
            let left = Segment2::new(DVec2::new(0.0, low), DVec2::new(0.0, high));
            if terrain.add_portal(pair[0], pair[1], right, left).is_none() {
                warn!("[DEMO] Could not join {:?} and {:?}", pair[0], pair[1]);
            }
        }
    }
    terrain
}

fn spawn_agents(world: &mut World) -> (Entity, Vec<Entity>) {
    let mut rng = StdRng::seed_from_u64(7);
    let destination = DVec3::new(2900.0, 500.0, 0.0);
    let swarm = world.spawn(Swarm { destination }).id();
    for _ in 0..SWARM_SIZE {
        let position = DVec3::new(rng.random_range(2050.0..2400.0), rng.random_range(100.0..900.0), 0.0);
        world.spawn(MovementComponent::new(position, 10.0, 60.0).in_swarm(swarm));
    }

    let trips = [
        (DVec3::new(60.0, 40.0, 0.0), DVec3::new(2930.0, 500.0, 0.0)),
        (DVec3::new(2900.0, 100.0, 0.0), DVec3::new(100.0, 900.0, 0.0)),
    ];
    let loners = trips
        .iter()
        .map(|&(from, to)| {
            let entity = world.spawn(MovementComponent::new(from, 15.0, 250.0)).id();
            world.write_message(PathRequest { entity, destination: to });
            entity
        })
        .collect();
    (swarm, loners)
}

fn log_progress(world: &mut World, tick: u64, swarm: Entity, loners: &[Entity]) {
    let Some(destination) = world.get::<Swarm>(swarm).map(|s| s.destination) else {
        return;
    };
    let mut query = world.query::<&MovementComponent>();
    let (sum, count) = query
        .iter(world)
        .filter(|m| m.swarm == Some(swarm))
        .fold((DVec3::ZERO, 0usize), |(sum, n), m| (sum + m.position, n + 1));
    if count > 0 {
        let centroid = sum / count as f64;
        info!(
            "[DEMO] Tick {}: swarm centroid {:.1?}, {:.1} from its destination",
            tick,
            centroid.truncate(),
            centroid.truncate().distance(destination.truncate())
        );
    }
    for &loner in loners {
        if let Some(movement) = world.get::<MovementComponent>(loner) {
            info!(
                "[DEMO] Tick {}: agent {:?} at {:.1?}, {} breadcrumbs left",
                tick,
                loner,
                movement.position.truncate(),
                movement.pathing_breadcrumbs.len()
            );
        }
    }
}

fn main() -> std::io::Result<()> {
    let log_file = setup_file_logging()?;
    info!("[DEMO] Logging to {}", log_file);

    let config = NavConfig::load_or_default(DEFAULT_CONFIG_PATH);
    let ticks = (DEMO_SECONDS / config.seconds_per_tick).round() as u64;

    let mut app = App::new();
    app.insert_resource(build_terrain(&config));
    app.insert_resource(config);
    app.add_plugins(NavigationPlugin::default());

    let world = app.world_mut();
    let (swarm, loners) = spawn_agents(world);
    info!("[DEMO] Running {} ticks with {} swarm agents", ticks, SWARM_SIZE);

    let started = std::time::Instant::now();
    for tick in 0..ticks {
        if tick == ticks / 2 {
            match add_temporary_hole(world, Bounds2::from_rect(2500.0, 350.0, 100.0, 300.0)) {
                Some(hole) => info!("[DEMO] Dropped hole {:?} in front of the swarm", hole.id),
                None => warn!("[DEMO] No terrain to drop a hole into"),
            }
        }
        world.run_schedule(FixedUpdate);
        if tick % 30 == 0 || tick + 1 == ticks {
            log_progress(world, tick, swarm, &loners);
        }
    }

    info!("[DEMO] {} ticks in {:?}", ticks, started.elapsed());
    dump_performance_counters();
    Ok(())
}
