//! A* pathfinding and movement-range search on the battle grid.
//!
//! Search state is a cell plus the diagonal parity of the path that reached
//! it, because under the 5-10-5 rule the price of the next diagonal depends
//! on how many diagonals the path has already taken.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::geometry::{chebyshev, path_heuristic_doubled, Position};
use crate::grid::{Fit, Grid, Terrain};
use crate::size::{occupied_cells, CreatureSize};
use crate::world::CombatantId;
use serde::{Deserialize, Serialize};

/// Surcharge for taking a stair link, in feet.
pub const STAIR_COST: u32 = 5;

/// What the pathfinder needs to know about the creature moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoverProfile {
    /// Cells claimed by this id do not block the mover.
    pub id: Option<CombatantId>,
    pub size: CreatureSize,
    pub walk_speed: u32,
    pub swim_speed: Option<u32>,
}

impl MoverProfile {
    pub fn new(size: CreatureSize, walk_speed: u32) -> Self {
        Self {
            id: None,
            size,
            walk_speed,
            swim_speed: None,
        }
    }

    pub fn with_id(mut self, id: CombatantId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_swim_speed(mut self, swim: u32) -> Self {
        self.swim_speed = Some(swim);
        self
    }
}

/// Price of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepCost {
    pub cost: u32,
    pub squeezing: bool,
    /// Parity after the step (1 = the next diagonal costs 10 ft).
    pub parity: u8,
}

/// A found path, start and goal inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathResult {
    pub path: Vec<Position>,
    pub cost: u32,
    /// Any step along the way needed a squeeze.
    pub squeezed: bool,
    /// The final step only fit by squeezing.
    pub ends_squeezed: bool,
}

/// Evaluate a single step from `from` to an adjacent `to`.
///
/// `parity` is the diagonal parity of the path so far. `is_destination`
/// lets the step end on an occupied cell. Returns `None` if the step is
/// impossible.
pub fn step_cost(
    grid: &Grid,
    mover: &MoverProfile,
    from: Position,
    to: Position,
    parity: u8,
    is_destination: bool,
) -> Option<StepCost> {
    if chebyshev(from, to) != 1 || !grid.in_bounds(to) {
        return None;
    }

    let diagonal = from.x != to.x && from.y != to.y;
    let (mut cost, parity) = match (diagonal, parity) {
        (true, 0) => (5, 1),
        (true, _) => (10, 0),
        (false, p) => (5, p),
    };

    if grid.elevation(from) != grid.elevation(to) {
        if !grid.stairs_between(from, to) {
            return None;
        }
        cost += STAIR_COST;
    }

    let (footprint, squeezing) = match grid.fit(to, mover.size, mover.id, is_destination) {
        Fit::Normal => (mover.size.footprint(), false),
        Fit::Squeeze => (mover.size.footprint() - 1, true),
        Fit::Blocked => return None,
    };

    let terrains: Vec<Terrain> = occupied_cells(to, footprint)
        .into_iter()
        .filter_map(|p| grid.terrain(p))
        .collect();
    if terrains
        .iter()
        .any(|t| matches!(t, Terrain::Difficult | Terrain::Hazard))
    {
        cost *= 2;
    } else if terrains.contains(&Terrain::Water) {
        cost = match mover.swim_speed {
            Some(swim) if swim > 0 => (cost * mover.walk_speed).div_ceil(swim),
            _ => cost * 2,
        };
    }

    if squeezing {
        cost *= 2;
    }

    Some(StepCost {
        cost,
        squeezing,
        parity,
    })
}

/// Node in the A* open set.
#[derive(Debug, Clone, Copy)]
struct PathNode {
    pos: Position,
    parity: u8,
    g_cost: u32,
    /// Doubled so the 7.5 ft diagonal estimate stays integral.
    f_cost2: u32,
}

impl PartialEq for PathNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PathNode {}

impl Ord for PathNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap; deeper nodes first on ties.
        other
            .f_cost2
            .cmp(&self.f_cost2)
            .then_with(|| self.g_cost.cmp(&other.g_cost))
            .then_with(|| other.pos.cmp(&self.pos))
            .then_with(|| other.parity.cmp(&self.parity))
    }
}

impl PartialOrd for PathNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

type State = (Position, u8);

/// Find the cheapest path using A*.
///
/// The goal may be occupied; obstacles always block. Returns `None` if the
/// goal is unreachable or costs more than `max_cost`.
pub fn find_path(
    grid: &Grid,
    mover: &MoverProfile,
    start: Position,
    goal: Position,
    max_cost: Option<u32>,
) -> Option<PathResult> {
    if start == goal {
        return Some(PathResult {
            path: vec![start],
            cost: 0,
            squeezed: false,
            ends_squeezed: false,
        });
    }
    if !grid.in_bounds(goal) {
        return None;
    }

    let heuristic = |p: Position| path_heuristic_doubled(goal.x - p.x, goal.y - p.y);

    let mut open_set = BinaryHeap::new();
    let mut came_from: HashMap<State, (State, bool)> = HashMap::new();
    let mut g_scores: HashMap<State, u32> = HashMap::new();

    g_scores.insert((start, 0), 0);
    open_set.push(PathNode {
        pos: start,
        parity: 0,
        g_cost: 0,
        f_cost2: heuristic(start),
    });

    while let Some(current) = open_set.pop() {
        let state = (current.pos, current.parity);
        if current.pos == goal {
            return Some(reconstruct_path(&came_from, state, current.g_cost));
        }
        if g_scores.get(&state).is_some_and(|&g| g < current.g_cost) {
            continue;
        }

        for neighbor in current.pos.neighbors() {
            let Some(step) = step_cost(
                grid,
                mover,
                current.pos,
                neighbor,
                current.parity,
                neighbor == goal,
            ) else {
                continue;
            };

            let tentative_g = current.g_cost + step.cost;
            if max_cost.is_some_and(|max| tentative_g > max) {
                continue;
            }

            let next = (neighbor, step.parity);
            if tentative_g < *g_scores.get(&next).unwrap_or(&u32::MAX) {
                came_from.insert(next, (state, step.squeezing));
                g_scores.insert(next, tentative_g);
                open_set.push(PathNode {
                    pos: neighbor,
                    parity: step.parity,
                    g_cost: tentative_g,
                    f_cost2: tentative_g * 2 + heuristic(neighbor),
                });
            }
        }
    }

    None
}

fn reconstruct_path(
    came_from: &HashMap<State, (State, bool)>,
    goal: State,
    cost: u32,
) -> PathResult {
    let mut path = vec![goal.0];
    let mut squeezed = false;
    let ends_squeezed = came_from.get(&goal).is_some_and(|&(_, s)| s);
    let mut current = goal;
    while let Some(&(prev, squeezing)) = came_from.get(&current) {
        squeezed |= squeezing;
        path.push(prev.0);
        current = prev;
    }
    path.reverse();
    PathResult {
        path,
        cost,
        squeezed,
        ends_squeezed,
    }
}

/// Every cell reachable within `budget` feet, mapped to its cheapest cost.
///
/// Uses the same step rules as [`find_path`]. The start cell and cells a
/// footprint cannot legally end on are excluded.
pub fn reachable_positions(
    grid: &Grid,
    mover: &MoverProfile,
    start: Position,
    budget: u32,
) -> HashMap<Position, u32> {
    let mut best: HashMap<State, u32> = HashMap::new();
    let mut reachable: HashMap<Position, u32> = HashMap::new();
    let mut open_set = BinaryHeap::new();

    best.insert((start, 0), 0);
    open_set.push(PathNode {
        pos: start,
        parity: 0,
        g_cost: 0,
        f_cost2: 0,
    });

    while let Some(current) = open_set.pop() {
        let state = (current.pos, current.parity);
        if best.get(&state).is_some_and(|&g| g < current.g_cost) {
            continue;
        }
        if current.pos != start {
            let entry = reachable.entry(current.pos).or_insert(current.g_cost);
            *entry = (*entry).min(current.g_cost);
        }

        for neighbor in current.pos.neighbors() {
            let Some(step) = step_cost(grid, mover, current.pos, neighbor, current.parity, false)
            else {
                continue;
            };
            let cost = current.g_cost + step.cost;
            if cost > budget {
                continue;
            }
            let next = (neighbor, step.parity);
            if cost < *best.get(&next).unwrap_or(&u32::MAX) {
                best.insert(next, cost);
                open_set.push(PathNode {
                    pos: neighbor,
                    parity: step.parity,
                    g_cost: cost,
                    f_cost2: cost * 2,
                });
            }
        }
    }

    reachable
}

/// Re-price an existing path step by step. Returns `None` if any step is illegal.
pub fn path_cost(grid: &Grid, mover: &MoverProfile, path: &[Position]) -> Option<u32> {
    let mut parity = 0;
    let mut total = 0;
    for (i, pair) in path.windows(2).enumerate() {
        let last = i + 2 == path.len();
        let step = step_cost(grid, mover, pair[0], pair[1], parity, last)?;
        parity = step.parity;
        total += step.cost;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{distance, path_heuristic};
    use crate::grid::Obstacle;
    use proptest::prelude::*;

    fn medium() -> MoverProfile {
        MoverProfile::new(CreatureSize::Medium, 30)
    }

    #[test]
    fn test_two_diagonals_cost_fifteen() {
        let grid = Grid::new(20, 20);
        let result = find_path(&grid, &medium(), Position::new(0, 0), Position::new(2, 2), Some(30))
            .expect("reachable");
        assert_eq!(result.cost, 15);
        assert_eq!(result.path.first(), Some(&Position::new(0, 0)));
        assert_eq!(result.path.last(), Some(&Position::new(2, 2)));
        assert_eq!(result.path.len(), 3);
    }

    #[test]
    fn test_path_around_wall() {
        let mut grid = Grid::new(10, 10);
        for y in 0..9 {
            grid.set_obstacle(Position::new(4, y), Some(Obstacle::wall()));
        }
        let result =
            find_path(&grid, &medium(), Position::new(0, 0), Position::new(8, 0), None).unwrap();
        assert!(!result.path.iter().any(|p| p.x == 4 && p.y < 9));
        assert_eq!(path_cost(&grid, &medium(), &result.path), Some(result.cost));
    }

    #[test]
    fn test_max_cost_ceiling() {
        let grid = Grid::new(20, 20);
        let mover = medium();
        assert!(find_path(&grid, &mover, Position::new(0, 0), Position::new(6, 0), Some(30)).is_some());
        assert!(find_path(&grid, &mover, Position::new(0, 0), Position::new(7, 0), Some(30)).is_none());
    }

    #[test]
    fn test_difficult_terrain_doubles() {
        let mut grid = Grid::new(5, 1);
        grid.set_terrain(Position::new(1, 0), Some(Terrain::Difficult));
        let result =
            find_path(&grid, &medium(), Position::new(0, 0), Position::new(2, 0), None).unwrap();
        assert_eq!(result.cost, 15);
    }

    #[test]
    fn test_water_uses_swim_speed() {
        let mut grid = Grid::new(3, 1);
        grid.set_terrain(Position::new(1, 0), Some(Terrain::Water));
        let walker = medium();
        let swimmer = medium().with_swim_speed(30);
        let slow_swimmer = medium().with_swim_speed(20);
        let from = Position::new(0, 0);
        let to = Position::new(1, 0);
        assert_eq!(step_cost(&grid, &walker, from, to, 0, false).map(|s| s.cost), Some(10));
        assert_eq!(step_cost(&grid, &swimmer, from, to, 0, false).map(|s| s.cost), Some(5));
        assert_eq!(step_cost(&grid, &slow_swimmer, from, to, 0, false).map(|s| s.cost), Some(8));
    }

    #[test]
    fn test_elevation_requires_stairs() {
        let mut grid = Grid::new(4, 1);
        grid.set_elevation(Position::new(2, 0), 1);
        grid.set_elevation(Position::new(3, 0), 1);
        let mover = medium();
        assert!(find_path(&grid, &mover, Position::new(0, 0), Position::new(3, 0), None).is_none());

        grid.connect_stairs(Position::new(1, 0), Position::new(2, 0));
        let result = find_path(&grid, &mover, Position::new(0, 0), Position::new(3, 0), None).unwrap();
        assert_eq!(result.cost, 20);
    }

    #[test]
    fn test_destination_may_be_occupied() {
        let mut grid = Grid::new(5, 5);
        let other = CombatantId::new();
        grid.occupy(other, Position::new(2, 0), 1);
        let mover = medium();
        assert!(find_path(&grid, &mover, Position::new(0, 0), Position::new(2, 0), None).is_some());

        grid.set_obstacle(Position::new(4, 4), Some(Obstacle::wall()));
        assert!(find_path(&grid, &mover, Position::new(0, 0), Position::new(4, 4), None).is_none());
    }

    #[test]
    fn test_large_squeeze_doubles_cost() {
        let mut grid = Grid::new(6, 3);
        grid.set_obstacle(Position::new(3, 2), Some(Obstacle::wall()));
        let large = MoverProfile::new(CreatureSize::Large, 30);
        let step = step_cost(&grid, &large, Position::new(1, 1), Position::new(2, 1), 0, false)
            .expect("squeeze fits");
        assert!(step.squeezing);
        assert_eq!(step.cost, 10);

        let result = find_path(&grid, &large, Position::new(1, 1), Position::new(2, 1), None).unwrap();
        assert!(result.ends_squeezed);
        assert!(result.squeezed);
    }

    #[test]
    fn test_reachable_excludes_start_and_occupied() {
        let mut grid = Grid::new(10, 10);
        let other = CombatantId::new();
        grid.occupy(other, Position::new(5, 4), 1);
        let reach = reachable_positions(&grid, &medium(), Position::new(4, 4), 10);
        assert!(!reach.contains_key(&Position::new(4, 4)));
        assert!(!reach.contains_key(&Position::new(5, 4)));
        assert_eq!(reach.get(&Position::new(3, 3)), Some(&5));
        assert_eq!(reach.get(&Position::new(6, 6)), None);
        assert_eq!(reach.get(&Position::new(2, 4)), Some(&10));
    }

    #[test]
    fn test_reachable_tracks_parity() {
        let grid = Grid::new(20, 20);
        let reach = reachable_positions(&grid, &medium(), Position::new(0, 0), 30);
        assert_eq!(reach.get(&Position::new(2, 2)), Some(&15));
        assert_eq!(reach.get(&Position::new(3, 3)), Some(&20));
        assert_eq!(reach.get(&Position::new(4, 4)), Some(&30));
        assert_eq!(reach.get(&Position::new(5, 5)), None);
    }

    proptest! {
        #[test]
        fn prop_open_grid_cost_matches_distance(x in 0i32..12, y in 0i32..12) {
            let grid = Grid::new(12, 12);
            let goal = Position::new(x, y);
            let result = find_path(&grid, &medium(), Position::new(0, 0), goal, None).unwrap();
            prop_assert_eq!(result.cost, distance(Position::new(0, 0), goal));
        }

        /// The 7.5 ft diagonal estimate may overshoot by at most 2.5 ft.
        #[test]
        fn prop_cost_bounds_heuristic(
            x1 in 0i32..10, y1 in 0i32..10, x2 in 0i32..10, y2 in 0i32..10,
            walls in proptest::collection::hash_set((0i32..10, 0i32..10), 0..20),
        ) {
            let mut grid = Grid::new(10, 10);
            let start = Position::new(x1, y1);
            let goal = Position::new(x2, y2);
            for (wx, wy) in walls {
                let p = Position::new(wx, wy);
                if p != start && p != goal {
                    grid.set_obstacle(p, Some(Obstacle::wall()));
                }
            }
            if let Some(result) = find_path(&grid, &medium(), start, goal, None) {
                let h = path_heuristic(goal.x - start.x, goal.y - start.y);
                prop_assert!(result.cost as f64 + 2.5 >= h);
            }
        }
    }
}
