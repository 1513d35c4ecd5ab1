//! The battle grid: terrain, obstacles, elevation, stairs, and occupancy.

use crate::geometry::Position;
use crate::size::{occupied_cells, CreatureSize};
use crate::world::CombatantId;
use serde::{Deserialize, Serialize};

/// Terrain tags that change movement cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Terrain {
    Difficult,
    Hazard,
    Water,
}

/// Something standing in a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obstacle {
    pub kind: String,
    pub blocks_movement: bool,
    pub blocks_line_of_sight: bool,
}

impl Obstacle {
    /// Blocks both movement and sight.
    pub fn wall() -> Self {
        Self {
            kind: "wall".to_string(),
            blocks_movement: true,
            blocks_line_of_sight: true,
        }
    }

    /// Blocks movement but not sight (a table, a low boulder).
    pub fn low(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            blocks_movement: true,
            blocks_line_of_sight: false,
        }
    }

    /// Blocks sight but not movement (a curtain, thick foliage).
    pub fn screen(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            blocks_movement: false,
            blocks_line_of_sight: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StairDirection {
    Up,
    Down,
}

/// A stair link from one cell to a cell at another elevation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StairConnection {
    pub target_x: i32,
    pub target_y: i32,
    pub target_elevation: i32,
    pub direction: StairDirection,
}

/// One 5-foot square.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    pub x: i32,
    pub y: i32,
    pub terrain: Option<Terrain>,
    pub obstacle: Option<Obstacle>,
    #[serde(default)]
    pub elevation: i32,
    pub stairs: Option<StairConnection>,
    pub occupied_by: Option<CombatantId>,
}

impl GridCell {
    fn empty(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            terrain: None,
            obstacle: None,
            elevation: 0,
            stairs: None,
            occupied_by: None,
        }
    }

    pub fn blocks_movement(&self) -> bool {
        self.obstacle.as_ref().is_some_and(|o| o.blocks_movement)
    }

    pub fn blocks_line_of_sight(&self) -> bool {
        self.obstacle.as_ref().is_some_and(|o| o.blocks_line_of_sight)
    }
}

/// Outcome of checking whether a footprint can stand at an anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    /// The full footprint fits.
    Normal,
    /// Only the one-size-smaller footprint fits.
    Squeeze,
    Blocked,
}

/// Rectangular battle map, row-major.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    pub width: i32,
    pub height: i32,
    cells: Vec<GridCell>,
}

impl Grid {
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let cells = (0..height)
            .flat_map(|y| (0..width).map(move |x| GridCell::empty(x, y)))
            .collect();
        Self {
            width,
            height,
            cells,
        }
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    fn index(&self, pos: Position) -> Option<usize> {
        self.in_bounds(pos)
            .then(|| (pos.y * self.width + pos.x) as usize)
    }

    pub fn cell(&self, pos: Position) -> Option<&GridCell> {
        self.index(pos).map(|i| &self.cells[i])
    }

    pub fn cell_mut(&mut self, pos: Position) -> Option<&mut GridCell> {
        self.index(pos).map(move |i| &mut self.cells[i])
    }

    pub fn cells(&self) -> impl Iterator<Item = &GridCell> {
        self.cells.iter()
    }

    pub fn set_terrain(&mut self, pos: Position, terrain: Option<Terrain>) {
        if let Some(cell) = self.cell_mut(pos) {
            cell.terrain = terrain;
        }
    }

    pub fn set_obstacle(&mut self, pos: Position, obstacle: Option<Obstacle>) {
        if let Some(cell) = self.cell_mut(pos) {
            cell.obstacle = obstacle;
        }
    }

    pub fn set_elevation(&mut self, pos: Position, elevation: i32) {
        if let Some(cell) = self.cell_mut(pos) {
            cell.elevation = elevation;
        }
    }

    /// Link two cells with stairs in both directions.
    pub fn connect_stairs(&mut self, lower: Position, upper: Position) {
        let (lower_elev, upper_elev) = match (self.cell(lower), self.cell(upper)) {
            (Some(l), Some(u)) => (l.elevation, u.elevation),
            _ => return,
        };
        if let Some(cell) = self.cell_mut(lower) {
            cell.stairs = Some(StairConnection {
                target_x: upper.x,
                target_y: upper.y,
                target_elevation: upper_elev,
                direction: StairDirection::Up,
            });
        }
        if let Some(cell) = self.cell_mut(upper) {
            cell.stairs = Some(StairConnection {
                target_x: lower.x,
                target_y: lower.y,
                target_elevation: lower_elev,
                direction: StairDirection::Down,
            });
        }
    }

    pub fn elevation(&self, pos: Position) -> i32 {
        self.cell(pos).map(|c| c.elevation).unwrap_or(0)
    }

    pub fn terrain(&self, pos: Position) -> Option<Terrain> {
        self.cell(pos).and_then(|c| c.terrain)
    }

    /// Whether a stair joins `from` and `to` at their current elevations.
    pub fn stairs_between(&self, from: Position, to: Position) -> bool {
        let (Some(a), Some(b)) = (self.cell(from), self.cell(to)) else {
            return false;
        };
        let links = |c: &GridCell, target: &GridCell| {
            c.stairs.is_some_and(|s| {
                s.target_x == target.x && s.target_y == target.y && s.target_elevation == target.elevation
            })
        };
        links(a, b) || links(b, a)
    }

    /// Out-of-bounds cells block sight.
    pub fn blocks_sight(&self, pos: Position) -> bool {
        self.cell(pos).map_or(true, GridCell::blocks_line_of_sight)
    }

    pub fn has_line_of_sight(&self, from: Position, to: Position) -> bool {
        crate::geometry::has_line_of_sight(from, to, |p| self.blocks_sight(p))
    }

    pub fn occupant(&self, pos: Position) -> Option<CombatantId> {
        self.cell(pos).and_then(|c| c.occupied_by)
    }

    /// Whether an `n`×`n` footprint can stand at `anchor`.
    ///
    /// Cells must be in bounds, free of movement-blocking obstacles, level
    /// with the anchor cell, and unoccupied by anyone but `mover` (unless
    /// `ignore_occupants`).
    pub fn footprint_clear(
        &self,
        anchor: Position,
        footprint: i32,
        mover: Option<CombatantId>,
        ignore_occupants: bool,
    ) -> bool {
        let Some(anchor_cell) = self.cell(anchor) else {
            return false;
        };
        let level = anchor_cell.elevation;
        occupied_cells(anchor, footprint).into_iter().all(|pos| {
            self.cell(pos).is_some_and(|cell| {
                !cell.blocks_movement()
                    && cell.elevation == level
                    && (ignore_occupants
                        || cell.occupied_by.is_none()
                        || cell.occupied_by == mover)
            })
        })
    }

    /// Normal fit first, then squeeze fit.
    pub fn fit(
        &self,
        anchor: Position,
        size: CreatureSize,
        mover: Option<CombatantId>,
        ignore_occupants: bool,
    ) -> Fit {
        if self.footprint_clear(anchor, size.footprint(), mover, ignore_occupants) {
            return Fit::Normal;
        }
        match size.squeeze_footprint() {
            Some(n) if self.footprint_clear(anchor, n, mover, ignore_occupants) => Fit::Squeeze,
            _ => Fit::Blocked,
        }
    }

    /// Claim every cell of a footprint for `id`.
    pub fn occupy(&mut self, id: CombatantId, anchor: Position, footprint: i32) {
        for pos in occupied_cells(anchor, footprint) {
            if let Some(cell) = self.cell_mut(pos) {
                debug_assert!(
                    cell.occupied_by.is_none() || cell.occupied_by == Some(id),
                    "cell {pos} already occupied"
                );
                cell.occupied_by = Some(id);
            }
        }
    }

    /// Release every cell claimed by `id`.
    pub fn vacate(&mut self, id: CombatantId) {
        for cell in self.cells.iter_mut().filter(|c| c.occupied_by == Some(id)) {
            cell.occupied_by = None;
        }
    }

    pub fn cells_occupied_by(&self, id: CombatantId) -> Vec<Position> {
        self.cells
            .iter()
            .filter(|c| c.occupied_by == Some(id))
            .map(|c| Position::new(c.x, c.y))
            .collect()
    }
}
