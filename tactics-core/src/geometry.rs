//! Grid geometry: positions, 5-10-5 distance, and line of sight.
//!
//! One grid cell is five feet. Diagonal movement follows the alternating
//! variant rule: the first diagonal costs 5 ft, the second 10 ft, and so on.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Feet per grid cell.
pub const FEET_PER_CELL: u32 = 5;

/// An integer grid coordinate. `y` grows downward (south).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// The eight surrounding cells.
    pub fn neighbors(self) -> impl Iterator<Item = Position> {
        Direction8::ALL
            .into_iter()
            .map(move |d| self.step(d))
    }

    pub fn step(self, direction: Direction8) -> Self {
        let (dx, dy) = direction.delta();
        self.offset(dx, dy)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i32, i32)> for Position {
    fn from((x, y): (i32, i32)) -> Self {
        Self::new(x, y)
    }
}

/// The eight compass directions, screen oriented (north is -y).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction8 {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Direction8 {
    pub const ALL: [Direction8; 8] = [
        Direction8::N,
        Direction8::NE,
        Direction8::E,
        Direction8::SE,
        Direction8::S,
        Direction8::SW,
        Direction8::W,
        Direction8::NW,
    ];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction8::N => (0, -1),
            Direction8::NE => (1, -1),
            Direction8::E => (1, 0),
            Direction8::SE => (1, 1),
            Direction8::S => (0, 1),
            Direction8::SW => (-1, 1),
            Direction8::W => (-1, 0),
            Direction8::NW => (-1, -1),
        }
    }

    pub fn is_diagonal(self) -> bool {
        let (dx, dy) = self.delta();
        dx != 0 && dy != 0
    }

    /// Snap the vector `from -> to` to the nearest of the eight directions.
    ///
    /// Returns `None` when both points coincide.
    pub fn snap(from: Position, to: Position) -> Option<Direction8> {
        let dx = (to.x - from.x) as f64;
        let dy = (to.y - from.y) as f64;
        if dx == 0.0 && dy == 0.0 {
            return None;
        }
        // Angle measured clockwise from east because y grows downward.
        let angle = dy.atan2(dx).to_degrees();
        let octant = ((angle / 45.0).round() as i32).rem_euclid(8);
        Some(match octant {
            0 => Direction8::E,
            1 => Direction8::SE,
            2 => Direction8::S,
            3 => Direction8::SW,
            4 => Direction8::W,
            5 => Direction8::NW,
            6 => Direction8::N,
            _ => Direction8::NE,
        })
    }
}

/// Split an offset into (diagonal steps, straight steps).
fn decompose(dx: i32, dy: i32) -> (u32, u32) {
    let (ax, ay) = (dx.unsigned_abs(), dy.unsigned_abs());
    let diag = ax.min(ay);
    (diag, ax.max(ay) - diag)
}

/// Movement distance in feet under the 5-10-5 diagonal rule.
pub fn distance(from: Position, to: Position) -> u32 {
    let (diag, straight) = decompose(to.x - from.x, to.y - from.y);
    (straight + diag + diag / 2) * FEET_PER_CELL
}

/// Chessboard distance in cells.
pub fn chebyshev(from: Position, to: Position) -> u32 {
    (to.x - from.x)
        .unsigned_abs()
        .max((to.y - from.y).unsigned_abs())
}

/// A* estimate in feet: `diag * 7.5 + straight * 5`.
///
/// Diagonals are priced at the mean of the alternating 5/10 cost, so the
/// estimate can exceed the true cost by 2.5 ft when an odd number of
/// diagonals remains.
pub fn path_heuristic(dx: i32, dy: i32) -> f64 {
    let (diag, straight) = decompose(dx, dy);
    diag as f64 * 7.5 + straight as f64 * 5.0
}

/// The heuristic doubled, so it stays an integer (`diag * 15 + straight * 10`).
pub(crate) fn path_heuristic_doubled(dx: i32, dy: i32) -> u32 {
    let (diag, straight) = decompose(dx, dy);
    diag * 15 + straight * 10
}

/// Bresenham line from `from` to `to`, excluding both endpoints.
pub fn trace_line(from: Position, to: Position) -> Vec<Position> {
    let dx = (to.x - from.x).abs();
    let dy = -(to.y - from.y).abs();
    let sx = if from.x < to.x { 1 } else { -1 };
    let sy = if from.y < to.y { 1 } else { -1 };
    let mut err = dx + dy;
    let (mut x, mut y) = (from.x, from.y);
    let mut cells = Vec::new();

    loop {
        if x == to.x && y == to.y {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
        if x == to.x && y == to.y {
            break;
        }
        cells.push(Position::new(x, y));
    }

    cells
}

/// Whether a sight line from `from` to `to` is clear.
///
/// `blocks_sight` reports whether a cell obstructs vision. Cells within one
/// step of each other always see each other. The trace runs from the lesser
/// endpoint to the greater one so the verdict never depends on who looks.
pub fn has_line_of_sight(
    from: Position,
    to: Position,
    blocks_sight: impl Fn(Position) -> bool,
) -> bool {
    if chebyshev(from, to) <= 1 {
        return true;
    }
    let (a, b) = if from <= to { (from, to) } else { (to, from) };
    !trace_line(a, b).into_iter().any(blocks_sight)
}
