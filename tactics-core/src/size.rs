//! Creature size categories and their grid footprints.

use crate::geometry::{Position, FEET_PER_CELL};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size categories, ordered smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CreatureSize {
    Tiny,
    Small,
    Medium,
    Large,
    Huge,
    Gargantuan,
}

impl CreatureSize {
    const ORDER: [CreatureSize; 6] = [
        CreatureSize::Tiny,
        CreatureSize::Small,
        CreatureSize::Medium,
        CreatureSize::Large,
        CreatureSize::Huge,
        CreatureSize::Gargantuan,
    ];

    /// Side length of the square footprint in cells.
    pub fn footprint(self) -> i32 {
        match self {
            CreatureSize::Tiny | CreatureSize::Small | CreatureSize::Medium => 1,
            CreatureSize::Large => 2,
            CreatureSize::Huge => 3,
            CreatureSize::Gargantuan => 4,
        }
    }

    /// Shift along the size ladder, capped at both ends.
    pub fn shifted(self, steps: i32) -> CreatureSize {
        let idx = Self::ORDER.iter().position(|s| *s == self).unwrap_or(2) as i32;
        let new_idx = (idx + steps).clamp(0, Self::ORDER.len() as i32 - 1);
        Self::ORDER[new_idx as usize]
    }

    /// Footprint side when squeezing, if squeezing is possible at all.
    pub fn squeeze_footprint(self) -> Option<i32> {
        let n = self.footprint();
        (n > 1).then_some(n - 1)
    }

    pub fn name(&self) -> &'static str {
        match self {
            CreatureSize::Tiny => "Tiny",
            CreatureSize::Small => "Small",
            CreatureSize::Medium => "Medium",
            CreatureSize::Large => "Large",
            CreatureSize::Huge => "Huge",
            CreatureSize::Gargantuan => "Gargantuan",
        }
    }
}

impl fmt::Display for CreatureSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// All cells of an `n`×`n` footprint anchored at its top-left cell.
pub fn occupied_cells(anchor: Position, footprint: i32) -> Vec<Position> {
    let n = footprint.max(1);
    (0..n)
        .flat_map(|dy| (0..n).map(move |dx| anchor.offset(dx, dy)))
        .collect()
}

/// Empty cells between two footprints along the worse axis.
///
/// Adjacent footprints have a gap of 0; overlapping footprints also report 0.
pub fn footprint_gap(a: Position, a_size: i32, b: Position, b_size: i32) -> u32 {
    let gap_axis = |a0: i32, an: i32, b0: i32, bn: i32| -> i32 {
        let a1 = a0 + an - 1;
        let b1 = b0 + bn - 1;
        if b0 > a1 {
            b0 - a1 - 1
        } else if a0 > b1 {
            a0 - b1 - 1
        } else {
            0
        }
    };
    let gx = gap_axis(a.x, a_size, b.x, b_size);
    let gy = gap_axis(a.y, a_size, b.y, b_size);
    gx.max(gy).max(0) as u32
}

/// Reach distance in feet between two footprints (adjacent = 5 ft).
pub fn reach_distance(a: Position, a_size: i32, b: Position, b_size: i32) -> u32 {
    (footprint_gap(a, a_size, b, b_size) + 1) * FEET_PER_CELL
}
