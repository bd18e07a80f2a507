use bevy::math::{DVec2, DVec3};
use bevy::prelude::*;
use navmotion_macros::profile;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

use super::components::*;
use super::steering::{finalize_velocity, pairwise_force, SteeringAgent, SteeringParams, SwarmField};
use super::walk::TriangleWalker;
use super::{handle_hole_added, invalidate_paths, pathfind};
use crate::nav::config::NavConfig;
use crate::nav::geometry::{to_unit3, GEOMETRY_EPSILON};
use crate::nav::terrain::{TerrainService, TerrainSnapshot};
use crate::nav::triangulation::{IslandTriangle, TriangulationIsland};

// ============================================================================
// Swarm field cache
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SwarmFieldKey {
    pub radius: i32,
    pub island: usize,
    pub destination: [u64; 2],
}

impl SwarmFieldKey {
    pub fn new(radius: i32, island: usize, destination: DVec2) -> Self {
        Self { radius, island, destination: [destination.x.to_bits(), destination.y.to_bits()] }
    }
}

/// Swarm fields kept across ticks while the terrain is unchanged and some
/// agent still uses them.
#[derive(Resource, Default)]
pub struct SwarmFields {
    terrain_version: u64,
    fields: FxHashMap<SwarmFieldKey, SwarmField>,
    used: FxHashSet<SwarmFieldKey>,
}

impl SwarmFields {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn begin_tick(&mut self, terrain_version: u64) {
        if terrain_version != self.terrain_version {
            self.fields.clear();
            self.terrain_version = terrain_version;
        }
        self.used.clear();
    }

    fn field(&mut self, key: SwarmFieldKey, island: &Arc<TriangulationIsland>, destination: DVec2, inset: f64) -> &mut SwarmField {
        self.used.insert(key);
        self.fields.entry(key).or_insert_with(|| SwarmField::new(island.clone(), destination, inset))
    }

    fn end_tick(&mut self) {
        let used = &self.used;
        self.fields.retain(|key, _| used.contains(key));
    }
}

// ============================================================================
// Commands
// ============================================================================

pub fn advance_tick_clock(mut clock: ResMut<TickClock>) {
    clock.tick += 1;
}

pub fn apply_terrain_messages(
    mut added: MessageReader<HoleAdded>,
    mut removed: MessageReader<HoleRemoved>,
    mut invalidate: MessageReader<InvalidatePaths>,
    terrain: Res<TerrainService>,
    stats: Res<MovementStats>,
    config: Res<NavConfig>,
    mut agents: Query<&mut MovementComponent>,
) {
    let snapshot = terrain.snapshot();
    for message in added.read() {
        handle_hole_added(snapshot.as_ref(), &**stats, &config, &message.hole, agents.iter_mut().map(Mut::into_inner));
    }

    let removals = removed.read().count();
    let invalidations = invalidate.read().count();
    if removals + invalidations > 0 {
        invalidate_paths(agents.iter_mut().map(Mut::into_inner));
    }
}

/// Requests aimed at a [`Swarm`] entity retarget the whole swarm; anything
/// else gets a fresh breadcrumb route.
pub fn process_path_requests(
    mut requests: MessageReader<PathRequest>,
    terrain: Res<TerrainService>,
    stats: Res<MovementStats>,
    config: Res<NavConfig>,
    mut swarms: Query<&mut Swarm>,
    mut agents: Query<&mut MovementComponent>,
) {
    if requests.is_empty() {
        return;
    }
    let snapshot = terrain.snapshot();
    for request in requests.read() {
        if let Ok(mut swarm) = swarms.get_mut(request.entity) {
            swarm.destination = request.destination;
            info!("[MOVEMENT] Swarm {:?} heading to {:?}", request.entity, request.destination);
            continue;
        }
        match agents.get_mut(request.entity) {
            Ok(mut movement) => {
                pathfind(snapshot.as_ref(), &**stats, &config, &mut movement, request.destination);
            }
            Err(_) => warn!("[MOVEMENT] Path request for {:?}, which cannot move", request.entity),
        }
    }
}

// ============================================================================
// Per-tick phases
// ============================================================================

pub fn precompute_agents(stats: Res<MovementStats>, mut agents: Query<&mut MovementComponent>) {
    for mut movement in &mut agents {
        let radius = stats.character_radius(&movement).ceil() as i32;
        let speed = stats.movement_speed(&movement).ceil() as i32;
        let discretized = movement.position.truncate().as_ivec2();
        let tick = &mut movement.tick;
        tick.discretized_position = discretized;
        tick.computed_radius = radius;
        tick.computed_speed = speed;
        tick.weighted_sum_forces = DVec2::ZERO;
        tick.sum_weights = 0.0;
        tick.swarmling_velocity = DVec2::ZERO;
    }
}

/// Put every swarm agent on a triangle of its radius' triangulation,
/// snapping it back onto land once if it drifted off.
pub fn locate_agents(terrain: Res<TerrainService>, config: Res<NavConfig>, mut agents: Query<&mut MovementComponent>) {
    let snapshot = terrain.snapshot();
    for mut movement in &mut agents {
        movement.tick.located = None;
        if movement.swarm.is_none() {
            continue;
        }
        let radius = movement.tick.computed_radius as f64;
        let triangulation = snapshot.compute_triangulation(radius);
        let mut located = triangulation.try_locate(movement.position.truncate());
        if located.is_none() {
            warn!("[MOVEMENT] Agent at {:?} is not on land", movement.position);
            let padded = radius + config.additional_hole_dilation_radius + config.edge_buffer_radius;
            if let Some((_, land)) = snapshot.find_nearest_land_point(padded, movement.position) {
                movement.position = land;
                located = triangulation.try_locate(land.truncate());
            }
            if located.is_none() {
                warn!("[MOVEMENT] Could not put agent at {:?} back on land", movement.position);
            }
        }
        movement.tick.located = located;
    }
}

/// Pairwise separation and cohesion for every agent, then the seek blend
/// and final velocity for every located swarm agent.
#[profile(2)]
pub fn compute_swarm_steering(
    clock: Res<TickClock>,
    terrain: Res<TerrainService>,
    config: Res<NavConfig>,
    mut fields: ResMut<SwarmFields>,
    swarms: Query<&Swarm>,
    mut agents: Query<(Entity, &mut MovementComponent)>,
) {
    let params = SteeringParams::from(&*config);
    let mut order: Vec<(Entity, SteeringAgent)> = agents
        .iter()
        .map(|(entity, movement)| {
            (
                entity,
                SteeringAgent {
                    position: movement.tick.discretized_position.as_dvec2(),
                    radius: movement.tick.computed_radius as f64,
                    swarm: movement.swarm,
                },
            )
        })
        .collect();
    order.sort_by_key(|(entity, _)| *entity);

    let mut forces = vec![(DVec2::ZERO, 0.0); order.len()];
    for i in 0..order.len() {
        for j in i + 1..order.len() {
            let (a, b) = (&order[i].1, &order[j].1);
            if a.swarm.is_none() && b.swarm.is_none() {
                continue;
            }
            if let Some((force, weight)) = pairwise_force(a, b, &params) {
                forces[i].0 += force;
                forces[i].1 += weight;
                forces[j].0 -= force;
                forces[j].1 += weight;
            }
        }
    }

    let snapshot = terrain.snapshot();
    fields.begin_tick(snapshot.version());
    for (k, (entity, _)) in order.iter().enumerate() {
        let Ok((_, mut movement)) = agents.get_mut(*entity) else {
            continue;
        };
        let (sum, weights) = forces[k];
        movement.tick.weighted_sum_forces = sum;
        movement.tick.sum_weights = weights;

        let Some(swarm_entity) = movement.swarm else {
            continue;
        };
        let Ok(swarm) = swarms.get(swarm_entity) else {
            warn!("[MOVEMENT] Agent {:?} belongs to missing swarm {:?}", entity, swarm_entity);
            continue;
        };
        let Some(at) = movement.tick.located else {
            continue;
        };
        let radius = movement.tick.computed_radius;
        let triangulation = snapshot.compute_triangulation(radius as f64);
        let Some(island) = triangulation.island(at.island) else {
            continue;
        };
        let destination = swarm.destination.truncate();
        let field = fields.field(SwarmFieldKey::new(radius, at.island, destination), island, destination, config.edge_buffer_radius);
        let seek = field.steer(at.triangle, movement.position.truncate(), radius as f64, &params);
        movement.tick.swarmling_velocity = finalize_velocity(sum, weights, seek, &params, movement.tick.computed_speed as f64);
    }
    fields.end_tick();
    crate::profile_log!(clock, "[MOVEMENT] {} swarm fields cached", fields.len());
}

/// Re-path invalidated agents, then move everyone: breadcrumb followers
/// straight along their route, swarm agents through the triangle walk.
#[profile(2)]
pub fn advance_agents(
    clock: Res<TickClock>,
    terrain: Res<TerrainService>,
    stats: Res<MovementStats>,
    config: Res<NavConfig>,
    mut agents: Query<&mut MovementComponent>,
) {
    let snapshot = terrain.snapshot();
    for mut movement in &mut agents {
        let movement = &mut *movement;
        if movement.pathing_is_invalidated {
            match (movement.swarm, movement.pathing_destination) {
                (None, Some(destination)) => {
                    pathfind(snapshot.as_ref(), &**stats, &config, movement, destination);
                }
                _ => movement.pathing_is_invalidated = false,
            }
        }

        if movement.swarm.is_none() {
            let budget = stats.movement_speed(movement) * clock.seconds_per_tick;
            follow_breadcrumbs(movement, budget);
        } else {
            advance_swarmling(snapshot.as_ref(), &config, clock.seconds_per_tick, movement);
        }
    }
}

/// Walk the breadcrumb route for up to `budget` distance, dropping every
/// breadcrumb reached.
pub fn follow_breadcrumbs(movement: &mut MovementComponent, budget: f64) {
    let mut remaining = budget;
    while remaining > 0.0 {
        let Some(&next) = movement.pathing_breadcrumbs.front() else {
            break;
        };
        let to_next = next - movement.position;
        let distance = to_next.truncate().length();
        if distance > GEOMETRY_EPSILON {
            movement.look_at = to_unit3(to_next);
        }
        if distance <= remaining {
            movement.position = next;
            movement.pathing_breadcrumbs.pop_front();
            remaining -= distance;
        } else {
            movement.position += to_next * (remaining / distance);
            remaining = 0.0;
        }
    }
}

fn advance_swarmling(snapshot: &dyn TerrainSnapshot, config: &NavConfig, seconds_per_tick: f64, movement: &mut MovementComponent) {
    let Some(at) = movement.tick.located else {
        return;
    };
    let velocity = movement.tick.swarmling_velocity;
    let distance = velocity.length() * seconds_per_tick;
    if distance <= GEOMETRY_EPSILON {
        return;
    }
    let triangulation = snapshot.compute_triangulation(movement.tick.computed_radius as f64);
    let Some(island) = triangulation.island(at.island) else {
        return;
    };
    let walker = TriangleWalker::new(island, config.edge_buffer_radius, config.max_walk_steps);
    let outcome = walker.walk(movement.position, velocity, distance, at.triangle);
    movement.look_at = to_unit3(DVec3::new(velocity.x, velocity.y, 0.0));
    movement.position = outcome.position;
    movement.tick.located = Some(IslandTriangle { island: at.island, triangle: outcome.triangle });
}
