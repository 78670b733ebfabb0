// Static tile grid and the solidity rule shared by movement, spawning and pathfinding.

use serde::Deserialize;
use std::fmt;

pub type TileId = i32;

pub const GRASS: TileId = 0;
pub const WALL: TileId = 1;
pub const WATER: TileId = 2;
pub const SAND: TileId = 3;
/// Returned for any lookup outside the grid.
pub const INVALID: TileId = -1;

/// Integer tile coordinate on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tile {
    pub x: i32,
    pub y: i32,
}

impl Tile {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan(self, other: Tile) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

#[derive(Debug)]
pub enum MapLoadError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Empty,
    Ragged { row: usize },
}

impl fmt::Display for MapLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapLoadError::Io(err) => write!(f, "failed to read map file: {err}"),
            MapLoadError::Parse(err) => write!(f, "failed to parse map file: {err}"),
            MapLoadError::Empty => write!(f, "map has no tiles"),
            MapLoadError::Ragged { row } => write!(f, "map row {row} has a different width"),
        }
    }
}

impl std::error::Error for MapLoadError {}

#[derive(Debug, Deserialize)]
struct MapFile {
    tiles: Vec<Vec<TileId>>,
}

/// Read-only grid indexed `tiles[y][x]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldMap {
    width: i32,
    height: i32,
    tiles: Vec<Vec<TileId>>,
}

impl WorldMap {
    pub fn from_rows(tiles: Vec<Vec<TileId>>) -> Result<Self, MapLoadError> {
        let width = tiles.first().map(Vec::len).unwrap_or(0);
        if width == 0 {
            return Err(MapLoadError::Empty);
        }
        if let Some(row) = tiles.iter().position(|r| r.len() != width) {
            return Err(MapLoadError::Ragged { row });
        }

        Ok(Self {
            width: width as i32,
            height: tiles.len() as i32,
            tiles,
        })
    }

    /// Parses a TOML document of the form `tiles = [[0, 1, ...], ...]`.
    pub fn from_toml_str(text: &str) -> Result<Self, MapLoadError> {
        let file: MapFile = toml::from_str(text).map_err(MapLoadError::Parse)?;
        Self::from_rows(file.tiles)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, MapLoadError> {
        let text = std::fs::read_to_string(path).map_err(MapLoadError::Io)?;
        Self::from_toml_str(&text)
    }

    /// Built-in field: walled border, a pond and a couple of wall runs.
    pub fn builtin() -> Self {
        const W: usize = 32;
        const H: usize = 24;

        let mut tiles = vec![vec![GRASS; W]; H];
        for (y, row) in tiles.iter_mut().enumerate() {
            for (x, tile) in row.iter_mut().enumerate() {
                if x == 0 || y == 0 || x == W - 1 || y == H - 1 {
                    *tile = WALL;
                }
            }
        }

        // Pond with a sand shore.
        for y in 5..=11 {
            for x in 18..=26 {
                let edge = y == 5 || y == 11 || x == 18 || x == 26;
                tiles[y][x] = if edge { SAND } else { WATER };
            }
        }

        for x in 4..=12 {
            tiles[8][x] = WALL;
        }
        for y in 14..=20 {
            tiles[y][10] = WALL;
        }
        // Gap so the south-west room stays reachable.
        tiles[17][10] = GRASS;

        Self {
            width: W as i32,
            height: H as i32,
            tiles,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn rows(&self) -> &[Vec<TileId>] {
        &self.tiles
    }

    pub fn get_tile(&self, x: i32, y: i32) -> TileId {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return INVALID;
        }
        self.tiles[y as usize][x as usize]
    }

    pub fn is_solid(tile_id: TileId) -> bool {
        tile_id < 0 || matches!(tile_id, WALL | WATER)
    }

    pub fn is_solid_at(&self, tile: Tile) -> bool {
        Self::is_solid(self.get_tile(tile.x, tile.y))
    }
}
