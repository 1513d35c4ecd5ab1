//! Area-of-effect templates.
//!
//! Cones and lines start at the caster and are snapped to one of eight
//! directions. Spheres, cylinders and cubes are centered on the target cell.

use crate::geometry::{distance, Direction8, Position, FEET_PER_CELL};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Template shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AoeShape {
    Cone,
    Line,
    Cube,
    Sphere,
    Cylinder,
}

impl AoeShape {
    pub fn name(&self) -> &'static str {
        match self {
            AoeShape::Cone => "cone",
            AoeShape::Line => "line",
            AoeShape::Cube => "cube",
            AoeShape::Sphere => "sphere",
            AoeShape::Cylinder => "cylinder",
        }
    }

    /// Whether the template extends from the caster rather than a point.
    pub fn is_directional(&self) -> bool {
        matches!(self, AoeShape::Cone | AoeShape::Line)
    }
}

impl fmt::Display for AoeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A placed area template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaTemplate {
    pub shape: AoeShape,
    pub size_ft: u32,
    /// Caster position; only cones and lines use it.
    pub origin: Position,
    /// Aim point; the center for spheres, cylinders and cubes.
    pub target: Position,
}

impl AreaTemplate {
    pub fn new(shape: AoeShape, size_ft: u32, origin: Position, target: Position) -> Self {
        Self {
            shape,
            size_ft,
            origin,
            target,
        }
    }

    pub fn cells(&self) -> BTreeSet<Position> {
        affected_cells(self.shape, self.size_ft, self.origin, self.target)
    }

    /// Direction a cone or line points; east when aimed at the caster's own cell.
    pub fn direction(&self) -> Direction8 {
        Direction8::snap(self.origin, self.target).unwrap_or(Direction8::E)
    }
}

/// Every cell covered by a template.
pub fn affected_cells(
    shape: AoeShape,
    size_ft: u32,
    origin: Position,
    target: Position,
) -> BTreeSet<Position> {
    let length = (size_ft / FEET_PER_CELL) as i32;
    let direction = Direction8::snap(origin, target).unwrap_or(Direction8::E);
    match shape {
        AoeShape::Cone if direction.is_diagonal() => diagonal_cone(origin, direction, size_ft),
        AoeShape::Cone => cardinal_cone(origin, direction, length),
        AoeShape::Line => (1..=length)
            .map(|k| {
                let (dx, dy) = direction.delta();
                origin.offset(dx * k, dy * k)
            })
            .collect(),
        AoeShape::Sphere | AoeShape::Cylinder => radius(target, size_ft),
        AoeShape::Cube => cube(target, size_ft),
    }
}

/// Row `r` sits `r` cells out and is `r` cells wide.
fn cardinal_cone(origin: Position, direction: Direction8, length: i32) -> BTreeSet<Position> {
    let (dx, dy) = direction.delta();
    // Perpendicular axis for the row.
    let (px, py) = (-dy, dx);
    let mut cells = BTreeSet::new();
    for r in 1..=length {
        let start = -((r - 1) / 2);
        for i in start..start + r {
            cells.insert(origin.offset(dx * r + px * i, dy * r + py * i));
        }
    }
    cells
}

fn diagonal_cone(origin: Position, direction: Direction8, size_ft: u32) -> BTreeSet<Position> {
    let (sx, sy) = direction.delta();
    let length = (size_ft / FEET_PER_CELL) as i32;
    let mut cells = BTreeSet::new();
    for i in 0..=length {
        for j in 0..=length {
            if i == 0 && j == 0 {
                continue;
            }
            let cell = origin.offset(sx * i, sy * j);
            if distance(origin, cell) <= size_ft {
                cells.insert(cell);
            }
        }
    }
    cells
}

/// Strictly inside the radius under the 5-10-5 rule.
fn radius(center: Position, size_ft: u32) -> BTreeSet<Position> {
    let r = (size_ft / FEET_PER_CELL) as i32;
    let mut cells = BTreeSet::new();
    for dy in -r..=r {
        for dx in -r..=r {
            let cell = center.offset(dx, dy);
            if distance(center, cell) < size_ft.max(1) {
                cells.insert(cell);
            }
        }
    }
    cells
}

fn cube(center: Position, size_ft: u32) -> BTreeSet<Position> {
    let n = size_ft.div_ceil(FEET_PER_CELL).max(1) as i32;
    let start = -((n - 1) / 2);
    (start..start + n)
        .flat_map(|dy| (start..start + n).map(move |dx| center.offset(dx, dy)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(cells: &[(i32, i32)]) -> BTreeSet<Position> {
        cells.iter().map(|&c| Position::from(c)).collect()
    }

    #[test]
    fn test_east_cone() {
        let origin = Position::new(5, 5);
        let cells = affected_cells(AoeShape::Cone, 15, origin, Position::new(9, 5));
        assert_eq!(
            cells,
            set(&[(6, 5), (7, 5), (7, 6), (8, 4), (8, 5), (8, 6)])
        );
    }

    #[test]
    fn test_north_cone_rows() {
        let origin = Position::new(5, 5);
        let cells = affected_cells(AoeShape::Cone, 15, origin, Position::new(5, 0));
        assert_eq!(cells.len(), 6);
        assert!(cells.iter().all(|c| c.y < origin.y));
        assert!(cells.contains(&Position::new(5, 4)));
    }

    #[test]
    fn test_diagonal_cone_pruned_by_distance() {
        let origin = Position::new(0, 0);
        let cells = affected_cells(AoeShape::Cone, 15, origin, Position::new(4, 4));
        assert!(cells.contains(&Position::new(2, 2)));
        assert!(cells.contains(&Position::new(3, 0)));
        assert!(!cells.contains(&Position::new(3, 3)));
        assert!(!cells.contains(&origin));
        assert!(cells.iter().all(|c| distance(origin, *c) <= 15));
    }

    #[test]
    fn test_line() {
        let cells = affected_cells(AoeShape::Line, 20, Position::new(0, 0), Position::new(0, 9));
        assert_eq!(cells, set(&[(0, 1), (0, 2), (0, 3), (0, 4)]));
    }

    #[test]
    fn test_sphere_strict_radius() {
        let center = Position::new(10, 10);
        let cells = affected_cells(AoeShape::Sphere, 10, Position::new(0, 0), center);
        assert_eq!(cells.len(), 9);
        assert!(!cells.contains(&Position::new(12, 10)));

        let big = affected_cells(AoeShape::Sphere, 20, Position::new(0, 0), center);
        assert!(big.contains(&Position::new(13, 10)));
        assert!(big.contains(&Position::new(12, 12)));
        assert!(big.contains(&Position::new(13, 11)));
        assert!(!big.contains(&Position::new(13, 12)));
        assert!(!big.contains(&Position::new(14, 10)));
    }

    #[test]
    fn test_cube_centered() {
        let cells = affected_cells(AoeShape::Cube, 15, Position::new(0, 0), Position::new(5, 5));
        assert_eq!(cells.len(), 9);
        assert!(cells.contains(&Position::new(4, 4)));
        assert!(cells.contains(&Position::new(6, 6)));

        let small = affected_cells(AoeShape::Cube, 10, Position::new(0, 0), Position::new(5, 5));
        assert_eq!(small, set(&[(5, 5), (6, 5), (5, 6), (6, 6)]));
    }

    #[test]
    fn test_self_aimed_cone_points_east() {
        let template = AreaTemplate::new(AoeShape::Cone, 5, Position::new(2, 2), Position::new(2, 2));
        assert_eq!(template.direction(), Direction8::E);
        assert_eq!(template.cells(), set(&[(3, 2)]));
    }

    proptest! {
        #[test]
        fn prop_aoe_idempotent(
            shape in prop_oneof![
                Just(AoeShape::Cone),
                Just(AoeShape::Line),
                Just(AoeShape::Cube),
                Just(AoeShape::Sphere),
                Just(AoeShape::Cylinder),
            ],
            size in 1u32..12,
            ox in -10i32..10, oy in -10i32..10, tx in -10i32..10, ty in -10i32..10,
        ) {
            let origin = Position::new(ox, oy);
            let target = Position::new(tx, ty);
            let first = affected_cells(shape, size * 5, origin, target);
            let second = affected_cells(shape, size * 5, origin, target);
            prop_assert_eq!(first, second);
        }
    }
}
