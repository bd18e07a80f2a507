use bevy::prelude::*;

pub mod config;
pub mod crossover;
pub mod geometry;
pub mod movement;
pub mod overlay;
pub mod pathfinder;
pub mod terrain;
pub mod triangulation;
pub mod visibility;

use config::NavConfigPlugin;
use movement::MovementPlugin;

pub use config::NavConfig;
pub use movement::{MovementComponent, MovementSet, PathRequest, Swarm};
pub use terrain::{RegionPreset, TerrainService, TerrainSnapshot};

/// Config, terrain and per-tick movement.
///
/// An app that inserts its own [`NavConfig`] or [`TerrainService`] before
/// adding the plugin keeps them.
#[derive(Default)]
pub struct NavigationPlugin {
    pub config_path: Option<String>,
}

impl Plugin for NavigationPlugin {
    fn build(&self, app: &mut App) {
        let config = match &self.config_path {
            Some(path) => NavConfigPlugin { path: path.clone() },
            None => NavConfigPlugin::default(),
        };
        app.add_plugins((config, MovementPlugin));
    }
}
