use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "assets/nav_config.ron";

/// Navigation and movement tuning, loaded once at startup.
///
/// Changing these mid-run alters every path and every agent trajectory, so
/// the plugin reads them once and the simulation treats them as constants.
#[derive(Resource, Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct NavConfig {
    // Simulation
    pub seconds_per_tick: f64,

    // Terrain
    pub edge_buffer_radius: f64,
    pub additional_hole_dilation_radius: f64,
    pub crossover_point_spacing: f64,
    pub max_cell_size: f64,

    // Steering
    pub separation_k: f64,
    pub grouping_tolerance: f64,
    pub cohesion_scale: f64,
    pub seek_weight: f64,
    pub triangle_hint_weight: f64,

    // Triangle walk
    pub max_walk_steps: usize,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            seconds_per_tick: 1.0 / 30.0,
            edge_buffer_radius: 0.1,
            additional_hole_dilation_radius: 1.0,
            crossover_point_spacing: 100.0,
            max_cell_size: 100.0,
            separation_k: 16.0,
            grouping_tolerance: 8.0,
            cohesion_scale: 0.001,
            seek_weight: 1.0,
            triangle_hint_weight: 0.3,
            max_walk_steps: 256,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ron::error::SpannedError,
    },
}

impl NavConfig {
    pub fn from_ron_str(contents: &str, path: &str) -> Result<Self, ConfigError> {
        ron::from_str(contents).map_err(|source| ConfigError::Parse { path: path.to_string(), source })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let contents =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: display.clone(), source })?;
        Self::from_ron_str(&contents, &display)
    }

    /// Load from `path`, logging and falling back to defaults on failure.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => {
                info!("[CONFIG] Loaded navigation config from {}", path.as_ref().display());
                config
            }
            Err(e) => {
                error!("[CONFIG] {}", e);
                error!("[CONFIG] Using default NavConfig");
                Self::default()
            }
        }
    }
}

/// Inserts [`NavConfig`] unless the app already has one.
pub struct NavConfigPlugin {
    pub path: String,
}

impl Default for NavConfigPlugin {
    fn default() -> Self {
        Self { path: DEFAULT_CONFIG_PATH.to_string() }
    }
}

impl Plugin for NavConfigPlugin {
    fn build(&self, app: &mut App) {
        if !app.world().contains_resource::<NavConfig>() {
            app.insert_resource(NavConfig::load_or_default(&self.path));
        }
    }
}
