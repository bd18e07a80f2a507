use bevy::math::{DVec2, DVec3, IVec2};
use bevy::prelude::*;
use std::collections::VecDeque;

use crate::nav::config::NavConfig;
use crate::nav::terrain::TerrainHole;
use crate::nav::triangulation::IslandTriangle;

// ============================================================================
// Components
// ============================================================================

/// Movement state of one agent.
#[derive(Component, Debug, Clone)]
pub struct MovementComponent {
    pub position: DVec3,
    pub look_at: DVec3,
    pub base_radius: f64,
    pub base_speed: f64,

    /// Set when terrain changed in a way that may break the current route.
    pub pathing_is_invalidated: bool,
    /// Kept after a failed search so the route can be retried later.
    pub pathing_destination: Option<DVec3>,
    pub pathing_breadcrumbs: VecDeque<DVec3>,

    /// Entity holding this agent's [`Swarm`].
    pub swarm: Option<Entity>,

    pub tick: TickCache,
}

impl MovementComponent {
    pub fn new(position: DVec3, base_radius: f64, base_speed: f64) -> Self {
        Self {
            position,
            look_at: DVec3::X,
            base_radius,
            base_speed,
            pathing_is_invalidated: false,
            pathing_destination: None,
            pathing_breadcrumbs: VecDeque::new(),
            swarm: None,
            tick: TickCache::default(),
        }
    }

    pub fn in_swarm(mut self, swarm: Entity) -> Self {
        self.swarm = Some(swarm);
        self
    }
}

/// Values recomputed at the start of every tick.
#[derive(Debug, Clone, Default)]
pub struct TickCache {
    pub discretized_position: IVec2,
    pub computed_radius: i32,
    pub computed_speed: i32,
    pub located: Option<IslandTriangle>,
    pub weighted_sum_forces: DVec2,
    pub sum_weights: f64,
    pub swarmling_velocity: DVec2,
}

/// A group of agents sharing one destination.
#[derive(Component, Debug, Clone, Copy)]
pub struct Swarm {
    pub destination: DVec3,
}

// ============================================================================
// Resources
// ============================================================================

/// Per-agent radius and speed, after buffs or whatever else the game layers
/// on top of the base values.
pub trait StatsProvider: Send + Sync {
    fn character_radius(&self, movement: &MovementComponent) -> f64;
    fn movement_speed(&self, movement: &MovementComponent) -> f64;
}

/// Stats straight from the component.
#[derive(Debug, Default, Clone, Copy)]
pub struct BaseStats;

impl StatsProvider for BaseStats {
    fn character_radius(&self, movement: &MovementComponent) -> f64 {
        movement.base_radius
    }

    fn movement_speed(&self, movement: &MovementComponent) -> f64 {
        movement.base_speed
    }
}

#[derive(Resource)]
pub struct MovementStats(pub Box<dyn StatsProvider>);

impl Default for MovementStats {
    fn default() -> Self {
        Self(Box::new(BaseStats))
    }
}

impl std::ops::Deref for MovementStats {
    type Target = dyn StatsProvider;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

/// Fixed-step simulation clock.
#[derive(Resource, Debug, Clone, Copy)]
pub struct TickClock {
    pub tick: u64,
    pub seconds_per_tick: f64,
}

impl TickClock {
    pub fn from_config(config: &NavConfig) -> Self {
        Self { tick: 0, seconds_per_tick: config.seconds_per_tick }
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::from_config(&NavConfig::default())
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Route `entity` to `destination`.
#[derive(Event, Message, Debug, Clone, Copy)]
pub struct PathRequest {
    pub entity: Entity,
    pub destination: DVec3,
}

/// Flag every agent for re-pathing.
#[derive(Event, Message, Debug, Clone, Copy, Default)]
pub struct InvalidatePaths;

/// A temporary hole appeared; agents inside it are pushed out.
#[derive(Event, Message, Debug, Clone, Copy)]
pub struct HoleAdded {
    pub hole: TerrainHole,
}

#[derive(Event, Message, Debug, Clone, Copy)]
pub struct HoleRemoved {
    pub hole: TerrainHole,
}
