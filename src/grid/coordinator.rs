use super::camera::Camera;
use super::path::shortest_path;
use super::tilemap::{TileMap, HARVESTED_TILE, RESOURCE_TILE};
use super::GridConfig;
use crate::model::{Agent, GridPosition, World};
use crate::state::Snapshot;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

/// Keyboard-driven character that never represents a simulation agent
pub const DEBUG_ANCHOR_ID: &str = "debug-anchor";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    fn step(self, from: GridPosition) -> GridPosition {
        match self {
            Direction::Up => GridPosition::new(from.x, from.y - 1),
            Direction::Down => GridPosition::new(from.x, from.y + 1),
            Direction::Left => GridPosition::new(from.x - 1, from.y),
            Direction::Right => GridPosition::new(from.x + 1, from.y),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Moving,
}

/// Per-character movement, written only by the coordinator
#[derive(Clone, Debug)]
pub struct MovementState {
    pub name: String,
    /// Last tile fully entered
    pub grid_position: GridPosition,
    pub pending_path: VecDeque<GridPosition>,
    pub is_moving: bool,
    /// Fraction of the way to the next tile of `pending_path`
    pub progress: f32,
    pub blocked_steps: u32,
    /// Blocks other colliding characters
    pub collides: bool,
    pub dead: bool,
}

impl MovementState {
    fn new(name: &str, at: GridPosition, collides: bool) -> Self {
        Self {
            name: name.to_string(),
            grid_position: at,
            pending_path: VecDeque::new(),
            is_moving: false,
            progress: 0.0,
            blocked_steps: 0,
            collides,
            dead: false,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.is_moving {
            Phase::Moving
        } else {
            Phase::Idle
        }
    }

    /// Where the current path ends
    pub fn destination(&self) -> GridPosition {
        self.pending_path.back().copied().unwrap_or(self.grid_position)
    }

    fn snap(&mut self, to: GridPosition) {
        self.grid_position = to;
        self.stop();
    }

    fn stop(&mut self) {
        self.pending_path.clear();
        self.is_moving = false;
        self.progress = 0.0;
        self.blocked_steps = 0;
    }
}

/// Local tile-grid simulation that animates server-confirmed moves.
///
/// Agents only ever move in response to server events; the sole locally
/// driven character is the debug anchor.
pub struct GridCoordinator {
    config: GridConfig,
    map: TileMap,
    characters: BTreeMap<String, MovementState>,
    camera: Camera,
    selection: Option<String>,
    anchor_home: GridPosition,
}

impl GridCoordinator {
    pub fn new(map: TileMap, config: GridConfig) -> Self {
        let anchor_home = map.clamp(config.debug_anchor);
        let mut coordinator = Self {
            camera: Camera::default(),
            config,
            map,
            characters: BTreeMap::new(),
            selection: None,
            anchor_home,
        };
        coordinator.camera.center_on(coordinator.map_center());
        coordinator
            .characters
            .insert(DEBUG_ANCHOR_ID.to_string(), MovementState::new(DEBUG_ANCHOR_ID, anchor_home, false));
        coordinator
    }

    /// Build the map for `world` and place every known agent
    pub fn from_world(world: &World, agents: &[Agent], config: GridConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let map = TileMap::from_world(world, &mut rng);
        let mut coordinator = Self::new(map, config);
        for agent in agents {
            coordinator.add_character(&agent.id, &agent.name, agent.position());
        }
        info!(
            width = world.size_x,
            height = world.size_y,
            agents = agents.len(),
            "Grid created"
        );
        coordinator
    }

    pub fn map(&self) -> &TileMap {
        &self.map
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Add a character, or snap an existing one to `at`
    pub fn add_character(&mut self, id: &str, name: &str, at: GridPosition) {
        match self.characters.get_mut(id) {
            Some(state) => {
                state.name = name.to_string();
                state.snap(at);
            }
            None => {
                self.characters
                    .insert(id.to_string(), MovementState::new(name, at, true));
            }
        }
    }

    pub fn on_agent_placed(&mut self, id: &str, name: &str, at: GridPosition) {
        debug!(agent_id = %id, position = %at, "Agent placed on grid");
        self.add_character(id, name, at);
    }

    /// Path toward the server-confirmed destination. Unknown agents are
    /// placed directly; unreachable destinations are snapped to.
    pub fn on_agent_moved(&mut self, id: &str, destination: GridPosition) {
        let Some(state) = self.characters.get(id) else {
            debug!(agent_id = %id, "Move for agent not on grid, placing at destination");
            self.add_character(id, id, destination);
            return;
        };
        if state.dead {
            debug!(agent_id = %id, "Ignoring move for dead agent");
            return;
        }
        let from = state.grid_position;

        let Some(path) = shortest_path(&self.map, from, destination) else {
            warn!(agent_id = %id, from = %from, to = %destination, "No path to destination, snapping");
            if let Some(state) = self.characters.get_mut(id) {
                state.snap(destination);
            }
            return;
        };

        if let Some(state) = self.characters.get_mut(id) {
            state.stop();
            state.pending_path = path.into();
            state.is_moving = !state.pending_path.is_empty();
        }
    }

    /// Dead agents stop where they are, or where the event says they died
    pub fn on_agent_dead(&mut self, id: &str, location: Option<GridPosition>) {
        let Some(state) = self.characters.get_mut(id) else {
            return;
        };
        match location {
            Some(at) => state.snap(at),
            None => state.stop(),
        }
        state.dead = true;
    }

    pub fn on_resource_harvested(&mut self, at: GridPosition) -> bool {
        self.map.set_tile(at, HARVESTED_TILE)
    }

    pub fn on_resource_grown(&mut self, at: GridPosition) -> bool {
        self.map.set_tile(at, RESOURCE_TILE)
    }

    /// Converge on roster snapshots, e.g. after a reseed
    pub fn sync_roster(&mut self, roster: &[Snapshot]) {
        for snap in roster {
            let Some(at) = snap.position() else {
                continue;
            };
            let name = snap.field_str("name").unwrap_or(snap.id());
            let known = self
                .characters
                .get(snap.id())
                .map(|s| (s.dead, s.destination()));
            match known {
                None => self.add_character(snap.id(), name, at),
                Some((false, destination)) if destination != at => self.on_agent_moved(snap.id(), at),
                Some(_) => {}
            }
            if snap.flag("dead") {
                self.on_agent_dead(snap.id(), None);
            }
        }
    }

    /// Queue one step for the debug anchor. Ignored while it is still moving
    /// or when the target tile collides.
    pub fn move_debug(&mut self, direction: Direction) -> bool {
        let Some(anchor) = self.characters.get(DEBUG_ANCHOR_ID) else {
            return false;
        };
        if anchor.is_moving {
            return false;
        }
        let target = direction.step(anchor.grid_position);
        if self.map.collides(target) {
            return false;
        }
        if let Some(anchor) = self.characters.get_mut(DEBUG_ANCHOR_ID) {
            anchor.pending_path.push_back(target);
            anchor.is_moving = true;
        }
        true
    }

    /// Advance every moving character by `dt` seconds
    pub fn advance(&mut self, dt: f32) {
        let distance = self.config.speed_tiles_per_second * dt;
        let ids: Vec<String> = self
            .characters
            .iter()
            .filter(|(_, s)| s.is_moving)
            .map(|(id, _)| id.clone())
            .collect();

        for id in ids {
            let Some(mut state) = self.characters.remove(&id) else {
                continue;
            };
            let occupied: HashSet<GridPosition> = self
                .characters
                .values()
                .filter(|other| other.collides)
                .map(|other| other.grid_position)
                .collect();
            self.step(&id, &mut state, distance, &occupied);
            self.characters.insert(id, state);
        }

        if let Some(followed) = self.camera.following().map(str::to_string) {
            if let Some(center) = self.render_position(&followed) {
                self.camera.center_on(center);
            }
        }
    }

    fn step(&self, id: &str, state: &mut MovementState, distance: f32, occupied: &HashSet<GridPosition>) {
        state.progress += distance;
        while state.progress >= 1.0 {
            let Some(next) = state.pending_path.front().copied() else {
                break;
            };
            if state.collides && occupied.contains(&next) {
                state.progress = 0.0;
                state.blocked_steps += 1;
                if state.blocked_steps >= self.config.max_blocked_steps {
                    let destination = state.destination();
                    warn!(agent_id = %id, to = %destination, "Blocked too long, snapping");
                    state.snap(destination);
                }
                return;
            }
            state.pending_path.pop_front();
            state.grid_position = next;
            state.progress -= 1.0;
            state.blocked_steps = 0;

            if id == DEBUG_ANCHOR_ID && next == self.anchor_home {
                state.pending_path.clear();
            }
        }
        if state.pending_path.is_empty() {
            state.stop();
        }
    }

    pub fn state(&self, id: &str) -> Option<&MovementState> {
        self.characters.get(id)
    }

    pub fn phase(&self, id: &str) -> Option<Phase> {
        self.characters.get(id).map(MovementState::phase)
    }

    pub fn grid_position(&self, id: &str) -> Option<GridPosition> {
        self.characters.get(id).map(|s| s.grid_position)
    }

    /// Character ids, debug anchor included
    pub fn character_ids(&self) -> Vec<String> {
        self.characters.keys().cloned().collect()
    }

    /// Agent standing on `at` (never the debug anchor)
    pub fn character_at(&self, at: GridPosition) -> Option<&str> {
        self.characters
            .iter()
            .find(|(id, s)| id.as_str() != DEBUG_ANCHOR_ID && s.grid_position == at)
            .map(|(id, _)| id.as_str())
    }

    /// Interpolated pixel centre for drawing
    pub fn render_position(&self, id: &str) -> Option<(f32, f32)> {
        let state = self.characters.get(id)?;
        let (x0, y0) = self.grid_to_world(state.grid_position);
        match state.pending_path.front() {
            Some(next) if state.is_moving => {
                let (x1, y1) = self.grid_to_world(*next);
                let t = state.progress.clamp(0.0, 1.0);
                Some((x0 + (x1 - x0) * t, y0 + (y1 - y0) * t))
            }
            _ => Some((x0, y0)),
        }
    }

    /// Tile under a world-pixel point
    pub fn world_to_grid(&self, (x, y): (f32, f32)) -> GridPosition {
        let size = self.config.tile_size as f32;
        GridPosition::new((x / size).floor() as i32, (y / size).floor() as i32)
    }

    /// Pixel centre of a tile
    pub fn grid_to_world(&self, pos: GridPosition) -> (f32, f32) {
        let size = self.config.tile_size as f32;
        ((pos.x as f32 + 0.5) * size, (pos.y as f32 + 0.5) * size)
    }

    /// Select an entity and move the camera follow onto it. Switching
    /// replaces the previous follow in one step.
    pub fn on_select(&mut self, id: Option<&str>) {
        self.selection = id.map(str::to_string);
        match id {
            Some(id) => {
                self.camera.follow(id);
                if let Some(center) = self.render_position(id) {
                    self.camera.center_on(center);
                }
            }
            None => self.camera.stop_follow(),
        }
    }

    pub fn current_selection(&self) -> Option<&str> {
        self.selection.as_deref()
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Stop following and centre on the map
    pub fn reset_camera(&mut self) {
        self.camera.stop_follow();
        let center = self.map_center();
        self.camera.center_on(center);
    }

    fn map_center(&self) -> (f32, f32) {
        let size = self.config.tile_size as f32;
        (
            0.5 * self.map.width() as f32 * size,
            0.5 * self.map.height() as f32 * size,
        )
    }
}
