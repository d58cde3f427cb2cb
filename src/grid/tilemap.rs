use crate::model::{GridPosition, World};
use rand::seq::SliceRandom;
use rand::Rng;

/// Tile shown on a resource that can be harvested
pub const RESOURCE_TILE: u32 = 8;
/// Tile shown on a resource while it regrows
pub const HARVESTED_TILE: u32 = 9;

/// Ground indices, repeated to weight the scatter toward mud over stones
const GROUND_TILES: [u32; 15] = [7, 7, 7, 6, 6, 6, 0, 0, 0, 1, 1, 2, 3, 4, 5];

/// Row-major tile indices for the world grid
#[derive(Clone, Debug)]
pub struct TileMap {
    width: u32,
    height: u32,
    tiles: Vec<u32>,
}

impl TileMap {
    /// Resource coordinates get the resource tile; everything else is ground
    pub fn from_world<R: Rng>(world: &World, rng: &mut R) -> Self {
        let mut map = Self {
            width: world.size_x,
            height: world.size_y,
            tiles: (0..world.size_x as usize * world.size_y as usize)
                .map(|_| GROUND_TILES.choose(rng).copied().unwrap_or(0))
                .collect(),
        };
        for coord in &world.resource_coords {
            map.set_tile(*coord, RESOURCE_TILE);
        }
        map
    }

    pub fn filled(width: u32, height: u32, index: u32) -> Self {
        Self {
            width,
            height,
            tiles: vec![index; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn contains(&self, pos: GridPosition) -> bool {
        self.offset(pos).is_some()
    }

    fn offset(&self, pos: GridPosition) -> Option<usize> {
        let x = u32::try_from(pos.x).ok().filter(|x| *x < self.width)?;
        let y = u32::try_from(pos.y).ok().filter(|y| *y < self.height)?;
        Some(y as usize * self.width as usize + x as usize)
    }

    pub fn tile(&self, pos: GridPosition) -> Option<u32> {
        self.offset(pos).map(|i| self.tiles[i])
    }

    /// Replace one tile's index in place. Returns whether it changed; setting
    /// the same index again is a no-op.
    pub fn set_tile(&mut self, pos: GridPosition, index: u32) -> bool {
        match self.offset(pos) {
            Some(i) if self.tiles[i] != index => {
                self.tiles[i] = index;
                true
            }
            _ => false,
        }
    }

    /// Off-map tiles collide too
    pub fn collides(&self, pos: GridPosition) -> bool {
        match self.tile(pos) {
            Some(index) => index == RESOURCE_TILE || index == HARVESTED_TILE,
            None => true,
        }
    }

    /// Clamp a position onto the map
    pub fn clamp(&self, pos: GridPosition) -> GridPosition {
        let max_x = self.width.saturating_sub(1) as i32;
        let max_y = self.height.saturating_sub(1) as i32;
        GridPosition::new(pos.x.clamp(0, max_x), pos.y.clamp(0, max_y))
    }
}
