//! Tile grid that animates server-confirmed agent movement.

mod camera;
mod coordinator;
mod feed;
mod path;
mod tilemap;


pub use camera::Camera;
pub use coordinator::{Direction, GridCoordinator, MovementState, Phase, DEBUG_ANCHOR_ID};
pub use feed::{animate, MovementFeed, SharedCoordinator};
pub use path::shortest_path;
pub use tilemap::{TileMap, HARVESTED_TILE, RESOURCE_TILE};

use crate::model::GridPosition;
use serde::Deserialize;

/// Grid configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    #[serde(default = "default_speed")]
    pub speed_tiles_per_second: f32,
    /// Waits behind another character before snapping to the destination
    #[serde(default = "default_max_blocked_steps")]
    pub max_blocked_steps: u32,
    #[serde(default = "default_debug_anchor")]
    pub debug_anchor: GridPosition,
    /// Fixed RNG seed for the ground scatter
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_tile_size() -> u32 {
    16
}

fn default_speed() -> f32 {
    4.0
}

fn default_max_blocked_steps() -> u32 {
    8
}

fn default_debug_anchor() -> GridPosition {
    GridPosition::new(15, 15)
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            tile_size: default_tile_size(),
            speed_tiles_per_second: default_speed(),
            max_blocked_steps: default_max_blocked_steps(),
            debug_anchor: default_debug_anchor(),
            seed: None,
        }
    }
}
