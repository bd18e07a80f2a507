/// Per-tick movement of agents over the terrain.
///
/// This module is organized into:
/// - **components**: agent state, swarms, stats, clock and messages
/// - **steering**: pairwise forces and per-swarm seek fields
/// - **walk**: the triangle-walk integrator
/// - **systems**: the `FixedUpdate` phases, in [`MovementSet`] order
use bevy::math::DVec3;
use bevy::prelude::*;

pub mod components;
pub mod steering;
pub mod systems;
pub mod walk;

pub use components::*;
pub use steering::{SteeringParams, SwarmField};
pub use systems::{SwarmFieldKey, SwarmFields};
pub use walk::{EdgeFollow, TriangleWalker, WalkOutcome, WalkStep};

use crate::nav::config::NavConfig;
use crate::nav::geometry::Bounds2;
use crate::nav::terrain::{HoleId, TerrainHole, TerrainService, TerrainSnapshot};

/// Phases of one movement tick.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum MovementSet {
    Commands,   // Clock, terrain messages, path requests
    Precompute, // Integer radius and speed, cleared accumulators
    Locate,     // Swarm agents onto triangles
    Steering,   // Forces and swarm velocities
    Advance,    // Breadcrumbs and triangle walks
}

pub struct MovementPlugin;

impl Plugin for MovementPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<NavConfig>();
        let config = app.world().get_resource::<NavConfig>().cloned().unwrap_or_default();
        if !app.world().contains_resource::<TickClock>() {
            app.insert_resource(TickClock::from_config(&config));
        }
        if !app.world().contains_resource::<TerrainService>() {
            app.insert_resource(TerrainService::from_config(&config));
        }
        app.init_resource::<MovementStats>();
        app.init_resource::<SwarmFields>();

        app.add_message::<PathRequest>();
        app.add_message::<InvalidatePaths>();
        app.add_message::<HoleAdded>();
        app.add_message::<HoleRemoved>();

        app.configure_sets(
            FixedUpdate,
            (
                MovementSet::Commands,
                MovementSet::Precompute,
                MovementSet::Locate,
                MovementSet::Steering,
                MovementSet::Advance,
            )
                .chain(),
        );

        app.add_systems(
            FixedUpdate,
            (
                (systems::advance_tick_clock, systems::apply_terrain_messages, systems::process_path_requests)
                    .chain()
                    .in_set(MovementSet::Commands),
                systems::precompute_agents.in_set(MovementSet::Precompute),
                systems::locate_agents.in_set(MovementSet::Locate),
                systems::compute_swarm_steering.in_set(MovementSet::Steering),
                systems::advance_agents.in_set(MovementSet::Advance),
            ),
        );
    }
}

// ============================================================================
// Produced surface
// ============================================================================

/// Route `movement` to `destination` at its radius plus the extra hole
/// dilation. On failure the breadcrumbs are cleared but the destination is
/// kept so a later invalidation retries it.
pub fn pathfind(
    snapshot: &dyn TerrainSnapshot,
    stats: &dyn StatsProvider,
    config: &NavConfig,
    movement: &mut MovementComponent,
    destination: DVec3,
) -> bool {
    let dilation = stats.character_radius(movement) + config.additional_hole_dilation_radius;
    let path = snapshot.find_path(dilation, movement.position, destination);
    movement.pathing_is_invalidated = false;
    movement.pathing_destination = Some(destination);
    match path {
        Some(path) => {
            debug!("[MOVEMENT] Path to {:?} with {} breadcrumbs", destination, path.len());
            movement.pathing_breadcrumbs = path.into();
            true
        }
        None => {
            warn!("[MOVEMENT] No path from {:?} to {:?}", movement.position, destination);
            movement.pathing_breadcrumbs.clear();
            false
        }
    }
}

pub fn invalidate_paths<'a>(movements: impl IntoIterator<Item = &'a mut MovementComponent>) {
    for movement in movements {
        movement.pathing_is_invalidated = true;
    }
}

/// Flag every agent for re-pathing and push the ones caught inside `hole`
/// back onto land. `snapshot` must already include the hole.
pub fn handle_hole_added<'a>(
    snapshot: &dyn TerrainSnapshot,
    stats: &dyn StatsProvider,
    config: &NavConfig,
    hole: &TerrainHole,
    movements: impl IntoIterator<Item = &'a mut MovementComponent>,
) {
    for movement in movements {
        movement.pathing_is_invalidated = true;
        let padded = stats.character_radius(movement) + config.additional_hole_dilation_radius + config.edge_buffer_radius;
        if !hole.contains_point(padded, movement.position) {
            continue;
        }
        match snapshot.find_nearest_land_point(padded, movement.position) {
            Some((_, land)) => {
                debug!("[MOVEMENT] Pushed agent out of hole {:?} to {:?}", hole.id, land);
                movement.position = land;
            }
            None => warn!("[MOVEMENT] No land left around {:?} after hole {:?}", movement.position, hole.id),
        }
    }
}

/// Add a hole to the world's terrain and tell the movement systems about it.
pub fn add_temporary_hole(world: &mut World, bounds: Bounds2) -> Option<TerrainHole> {
    let hole = world.get_resource_mut::<TerrainService>()?.add_temporary_hole(bounds);
    world.write_message(HoleAdded { hole });
    Some(hole)
}

pub fn remove_temporary_hole(world: &mut World, id: HoleId) -> Option<TerrainHole> {
    let hole = world.get_resource_mut::<TerrainService>()?.remove_temporary_hole(id)?;
    world.write_message(HoleRemoved { hole });
    Some(hole)
}

#[cfg(test)]
mod tests;
