use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Tile coordinate. Travels on the wire as `[x, y]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct GridPosition {
    pub x: i32,
    pub y: i32,
}

impl GridPosition {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// 4-neighbourhood, in up/right/down/left order
    pub fn neighbours(self) -> [GridPosition; 4] {
        [
            GridPosition::new(self.x, self.y - 1),
            GridPosition::new(self.x + 1, self.y),
            GridPosition::new(self.x, self.y + 1),
            GridPosition::new(self.x - 1, self.y),
        ]
    }

    pub fn manhattan(self, other: GridPosition) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }
}

impl From<[i32; 2]> for GridPosition {
    fn from([x, y]: [i32; 2]) -> Self {
        Self { x, y }
    }
}

impl From<GridPosition> for [i32; 2] {
    fn from(p: GridPosition) -> Self {
        [p.x, p.y]
    }
}

impl fmt::Display for GridPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Simulation record from `GET /simulation/{id}`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Simulation {
    pub id: String,
    #[serde(default)]
    pub tick: u64,
    #[serde(default)]
    pub running: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// World record from `GET /simulation/{id}/world`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct World {
    pub id: String,
    #[serde(default)]
    pub simulation_id: String,
    pub size_x: u32,
    pub size_y: u32,
    #[serde(default)]
    pub base_energy_cost: f64,
    #[serde(default)]
    pub resource_coords: Vec<GridPosition>,
}

/// Agent record as served by the REST API
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub simulation_id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub hunger: f64,
    #[serde(default)]
    pub energy_level: Option<f64>,
    pub x_coord: i32,
    pub y_coord: i32,
    #[serde(default)]
    pub visibility_range: i32,
    #[serde(default)]
    pub range_per_move: i32,
    #[serde(default)]
    pub last_10_messages: Vec<Message>,
    #[serde(default)]
    pub last_10_action_logs: Vec<ActionLog>,
}

impl Agent {
    pub fn position(&self) -> GridPosition {
        GridPosition::new(self.x_coord, self.y_coord)
    }
}

/// Resource record
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub x_coord: i32,
    pub y_coord: i32,
    #[serde(default = "default_true")]
    pub available: bool,
    #[serde(default)]
    pub energy_yield: f64,
    #[serde(default)]
    pub being_harvested: bool,
    #[serde(default)]
    pub harvester: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Resource {
    pub fn position(&self) -> GridPosition {
        GridPosition::new(self.x_coord, self.y_coord)
    }
}

/// Agent-to-agent communication
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub conversation_id: String,
    pub content: String,
    #[serde(default)]
    pub created_at: String,
    pub agent_id: String,
    #[serde(default)]
    pub to_agent_id: String,
    #[serde(default)]
    pub serial_number: u64,
    #[serde(default)]
    pub tick: u64,
}

/// One executed agent action
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionLog {
    pub id: String,
    pub agent_id: String,
    #[serde(default)]
    pub simulation_id: String,
    #[serde(default)]
    pub tick: u64,
    pub action: String,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub created_at: String,
}
