//! Triangular-grid geometry primitives.
//!
//! The amoebot world is the infinite triangular grid. Cells are addressed
//! with axial integer coordinates: the `x` axis runs east, the `y` axis
//! north-east, and every cell has exactly six neighbors. All grid math is
//! exact integer arithmetic.

use serde::{Deserialize, Serialize};

/// Number of edge directions incident to a grid cell.
pub const DIRECTION_COUNT: usize = 6;

/// One of the six grid directions, counterclockwise starting east.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Direction {
    East,
    NorthEast,
    NorthWest,
    West,
    SouthWest,
    SouthEast,
}

impl Direction {
    /// All six directions in counterclockwise order.
    pub const ALL: [Direction; DIRECTION_COUNT] = [
        Direction::East,
        Direction::NorthEast,
        Direction::NorthWest,
        Direction::West,
        Direction::SouthWest,
        Direction::SouthEast,
    ];

    /// Returns the direction with the given counterclockwise index (0..6).
    pub fn from_index(index: usize) -> Option<Direction> {
        Direction::ALL.get(index).copied()
    }

    /// Counterclockwise index of this direction (0..6).
    pub fn index(self) -> usize {
        self as usize
    }

    /// The opposite direction (rotation by three steps).
    pub fn opposite(self) -> Direction {
        self.rotated(3)
    }

    /// Rotates counterclockwise by `steps` (negative rotates clockwise).
    pub fn rotated(self, steps: i32) -> Direction {
        let index = (self.index() as i32 + steps).rem_euclid(DIRECTION_COUNT as i32);
        Direction::ALL[index as usize]
    }

    /// Axial coordinate offset of a unit step in this direction.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::East => (1, 0),
            Direction::NorthEast => (0, 1),
            Direction::NorthWest => (-1, 1),
            Direction::West => (-1, 0),
            Direction::SouthWest => (0, -1),
            Direction::SouthEast => (1, -1),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Direction::East => "E",
            Direction::NorthEast => "NE",
            Direction::NorthWest => "NW",
            Direction::West => "W",
            Direction::SouthWest => "SW",
            Direction::SouthEast => "SE",
        };
        write!(f, "{}", name)
    }
}

/// A cell of the triangular grid in axial coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    /// The origin cell.
    pub const ORIGIN: GridPos = GridPos { x: 0, y: 0 };

    /// Creates a position from axial coordinates.
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The adjacent cell in the given direction.
    pub fn neighbor(self, dir: Direction) -> GridPos {
        let (dx, dy) = dir.offset();
        GridPos::new(self.x + dx, self.y + dy)
    }

    /// True if `other` is one of this cell's six neighbors.
    pub fn is_adjacent_to(self, other: GridPos) -> bool {
        self.direction_to(other).is_some()
    }

    /// Direction from this cell to an adjacent cell, if adjacent.
    pub fn direction_to(self, other: GridPos) -> Option<Direction> {
        let delta = (other.x - self.x, other.y - self.y);
        Direction::ALL.iter().copied().find(|d| d.offset() == delta)
    }
}

impl std::fmt::Display for GridPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A particle's fixed orientation: a permutation of the six directions.
///
/// Programs address directions in their own local frame; the compass maps
/// local labels to global grid directions. The permutation is a rotation
/// offset plus an optional chirality flip, chosen once at particle creation
/// and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compass {
    /// Global direction that local `East` maps to.
    offset: Direction,

    /// If set, local directions advance clockwise instead of counterclockwise.
    flipped: bool,
}

impl Compass {
    /// The identity orientation (local frame equals the global frame).
    pub fn identity() -> Self {
        Self {
            offset: Direction::East,
            flipped: false,
        }
    }

    /// Creates a compass with the given rotation offset and chirality.
    pub fn new(offset: Direction, flipped: bool) -> Self {
        Self { offset, flipped }
    }

    /// Whether this compass has flipped chirality.
    pub fn is_flipped(self) -> bool {
        self.flipped
    }

    /// Maps a local direction label to the global grid direction.
    pub fn to_global(self, local: Direction) -> Direction {
        if self.flipped {
            self.offset.rotated(-(local.index() as i32))
        } else {
            self.offset.rotated(local.index() as i32)
        }
    }

    /// Maps a global grid direction back to this particle's local label.
    pub fn to_local(self, global: Direction) -> Direction {
        let delta = global.index() as i32 - self.offset.index() as i32;
        if self.flipped {
            Direction::East.rotated(-delta)
        } else {
            Direction::East.rotated(delta)
        }
    }
}

impl Default for Compass {
    fn default() -> Self {
        Self::identity()
    }
}
