//! QA tests for movement, animation, hazards and opportunity attacks.

use tactics_core::testing::*;
use tactics_core::{
    ActiveCondition, AttackOptions, CombatError, CombatantId, Condition, EngineConfig, Grid,
    MovementStep, Phase, Position, Terrain,
};

/// Fighter at (5,5) next to a goblin at (6,5); the goblin acts first.
fn goblin_beside_fighter() -> (TestHarness, CombatantId, CombatantId) {
    let mut harness = TestHarness::new();
    let fighter = harness.add(character(sample_fighter()), 5, 5);
    let goblin = harness.add(monster(sample_goblin()), 6, 5);
    harness.start([1, 20]).unwrap();
    assert_eq!(harness.engine.current_combatant_id(), Some(goblin));
    (harness, fighter, goblin)
}

/// A lone fighter in the corner of an open grid, acting first.
fn fighter_in_corner(grid: Grid) -> (TestHarness, CombatantId) {
    let mut harness = TestHarness::with_grid(grid);
    let fighter = harness.add(character(sample_fighter()), 0, 0);
    harness.add(monster(sample_goblin()), 9, 9);
    harness.start([15, 5]).unwrap();
    (harness, fighter)
}

// =============================================================================
// TEST 1: Animation steps through every cell
// =============================================================================

#[test]
fn test_movement_animates_cell_by_cell() {
    let (mut harness, fighter) = fighter_in_corner(Grid::new(10, 10));
    let animation = harness.engine.move_combatant(fighter, Position::new(3, 0)).unwrap();
    assert_eq!(animation.cost, 15);
    assert_eq!(animation.path.len(), 4);

    let step = harness.engine.advance_movement_animation().unwrap();
    assert!(matches!(step, MovementStep::Moving(p) if p == Position::new(1, 0)));
    // Still anchored at the start until the move settles.
    assert_eq!(harness.position(fighter), Some(Position::new(0, 0)));

    let step = harness.engine.advance_movement_animation().unwrap();
    assert!(matches!(step, MovementStep::Moving(p) if p == Position::new(2, 0)));

    match harness.engine.advance_movement_animation().unwrap() {
        MovementStep::Arrived(outcome) => {
            assert_eq!(outcome.to, Position::new(3, 0));
            assert_eq!(outcome.cost, 15);
            assert!(!outcome.aborted);
        }
        other => panic!("expected arrival, got {other:?}"),
    }
    assert_eq!(harness.position(fighter), Some(Position::new(3, 0)));
    assert_eq!(harness.combatant(fighter).turn.movement_used, 15);
    assert_occupancy_consistent(&harness);
}

// =============================================================================
// TEST 2: Nothing else happens while a move is in flight
// =============================================================================

#[test]
fn test_actions_blocked_during_movement() {
    let (mut harness, fighter) = fighter_in_corner(Grid::new(10, 10));
    let goblin = harness.engine.state().turn_order[1];
    harness.engine.move_combatant(fighter, Position::new(2, 0)).unwrap();

    assert!(matches!(
        harness.engine.attack(fighter, goblin, AttackOptions::new()),
        Err(CombatError::MovementInProgress)
    ));
    assert!(matches!(harness.engine.next_turn(), Err(CombatError::MovementInProgress)));

    harness.engine.finish_movement_animation().unwrap();
    assert!(matches!(
        harness.engine.finish_movement_animation(),
        Err(CombatError::NoMovementInProgress)
    ));
}

// =============================================================================
// TEST 3: Movement budget and Dash
// =============================================================================

#[test]
fn test_speed_limits_and_dash() {
    let (mut harness, fighter) = fighter_in_corner(Grid::new(10, 10));
    assert!(matches!(
        harness.engine.move_combatant(fighter, Position::new(7, 0)),
        Err(CombatError::PathNotFound)
    ));
    assert_eq!(harness.engine.dash(fighter).unwrap(), 60);
    harness.engine.move_combatant(fighter, Position::new(7, 0)).unwrap();
    let outcome = harness.engine.finish_movement_animation().unwrap();
    assert_eq!(outcome.cost, 35);
    assert_eq!(harness.combatant(fighter).remaining_movement(), 25);
}

#[test]
fn test_reachable_positions_respect_budget() {
    let (harness, fighter) = fighter_in_corner(Grid::new(10, 10));
    let reachable = harness.engine.reachable_positions(fighter).unwrap();
    assert_eq!(reachable.get(&Position::new(6, 0)), Some(&30));
    assert!(!reachable.contains_key(&Position::new(7, 0)));
    // Diagonals alternate 5 and 10 ft.
    assert_eq!(reachable.get(&Position::new(2, 2)), Some(&15));
    assert!(!reachable.contains_key(&Position::new(0, 0)));
}

// =============================================================================
// TEST 4: Blocked destinations and difficult terrain
// =============================================================================

#[test]
fn test_cannot_end_on_another_creature() {
    let (mut harness, fighter, goblin) = goblin_beside_fighter();
    assert!(matches!(
        harness.engine.move_combatant(goblin, Position::new(5, 5)),
        Err(CombatError::DestinationBlocked)
    ));
    assert_eq!(harness.position(fighter), Some(Position::new(5, 5)));
}

#[test]
fn test_difficult_terrain_costs_double() {
    let mut grid = Grid::new(10, 10);
    grid.set_terrain(Position::new(1, 0), Some(Terrain::Difficult));
    let (mut harness, fighter) = fighter_in_corner(grid);
    harness.engine.move_combatant(fighter, Position::new(1, 0)).unwrap();
    let outcome = harness.engine.finish_movement_animation().unwrap();
    assert_eq!(outcome.cost, 10);
}

// =============================================================================
// TEST 5: Hazards hurt on arrival
// =============================================================================

#[test]
fn test_ending_on_hazard_deals_configured_damage() {
    let mut grid = Grid::new(10, 10);
    grid.set_terrain(Position::new(3, 0), Some(Terrain::Hazard));
    let (mut harness, fighter) = fighter_in_corner(grid);

    harness.engine.move_combatant(fighter, Position::new(3, 0)).unwrap();
    harness.script([4]);
    let outcome = harness.engine.finish_movement_animation().unwrap();
    assert_eq!(outcome.cost, 20);
    assert_eq!(outcome.hazard_damage, Some(4));
    assert_hp(&harness, fighter, 24);
}

#[test]
fn test_hazard_damage_follows_config() {
    let mut grid = Grid::new(10, 10);
    grid.set_terrain(Position::new(1, 0), Some(Terrain::Hazard));
    let config = EngineConfig::default().with_hazard_damage("3", tactics_core::DamageType::Acid);
    let mut harness = TestHarness::with_config(grid, config);
    let fighter = harness.add(character(sample_fighter()), 0, 0);
    harness.add(monster(sample_goblin()), 9, 9);
    harness.start([15, 5]).unwrap();

    harness.engine.move_combatant(fighter, Position::new(1, 0)).unwrap();
    let outcome = harness.engine.finish_movement_animation().unwrap();
    assert_eq!(outcome.hazard_damage, Some(3));
    assert_hp(&harness, fighter, 25);
}

// =============================================================================
// TEST 6: Opportunity attacks
// =============================================================================

#[test]
fn test_opportunity_attack_can_stop_a_move() {
    let (mut harness, fighter, goblin) = goblin_beside_fighter();
    harness.engine.move_combatant(goblin, Position::new(9, 5)).unwrap();
    harness.script([15, 8]);
    let outcome = harness.engine.finish_movement_animation().unwrap();

    assert!(outcome.aborted);
    assert_eq!(outcome.opportunity_attacks.len(), 1);
    assert!(outcome.opportunity_attacks[0].hit);
    assert!(harness.combatant(goblin).is_dead());
    assert!(harness.combatant(fighter).turn.has_reacted);
    assert_phase(&harness, Phase::Victory);
    assert_occupancy_consistent(&harness);
}

#[test]
fn test_missed_opportunity_attack_lets_mover_through() {
    let (mut harness, fighter, goblin) = goblin_beside_fighter();
    harness.engine.move_combatant(goblin, Position::new(9, 5)).unwrap();
    harness.script([2]);
    let outcome = harness.engine.finish_movement_animation().unwrap();

    assert!(!outcome.aborted);
    assert!(!outcome.opportunity_attacks[0].hit);
    assert_eq!(harness.position(goblin), Some(Position::new(9, 5)));
    assert_eq!(harness.combatant(goblin).turn.movement_used, 15);
    assert!(harness.combatant(fighter).turn.has_reacted);
}

#[test]
fn test_incapacitated_enemy_makes_no_opportunity_attack() {
    let (mut harness, fighter, goblin) = goblin_beside_fighter();
    harness.engine.move_combatant(goblin, Position::new(6, 6)).unwrap();
    harness.engine.finish_movement_animation().unwrap();
    harness
        .engine
        .apply_condition(fighter, tactics_core::ActiveCondition::new(tactics_core::Condition::Incapacitated))
        .unwrap();
    harness.engine.move_combatant(goblin, Position::new(9, 6)).unwrap();
    let outcome = harness.engine.finish_movement_animation().unwrap();
    assert!(outcome.opportunity_attacks.is_empty());
}

#[test]
fn test_disengage_prevents_opportunity_attacks() {
    let (mut harness, _, goblin) = goblin_beside_fighter();
    harness.engine.disengage(goblin).unwrap();
    harness.engine.move_combatant(goblin, Position::new(9, 5)).unwrap();
    let outcome = harness.engine.finish_movement_animation().unwrap();
    assert!(outcome.opportunity_attacks.is_empty());
    assert_eq!(harness.position(goblin), Some(Position::new(9, 5)));
}

#[test]
fn test_moving_within_reach_draws_nothing() {
    let (mut harness, _, goblin) = goblin_beside_fighter();
    harness.engine.move_combatant(goblin, Position::new(6, 6)).unwrap();
    let outcome = harness.engine.finish_movement_animation().unwrap();
    assert!(outcome.opportunity_attacks.is_empty());
}

#[test]
fn test_opportunity_attacks_can_be_disabled() {
    let config = EngineConfig::default().with_opportunity_attacks(false);
    let mut harness = TestHarness::with_config(Grid::new(20, 20), config);
    harness.add(character(sample_fighter()), 5, 5);
    let goblin = harness.add(monster(sample_goblin()), 6, 5);
    harness.start([1, 20]).unwrap();
    harness.engine.move_combatant(goblin, Position::new(9, 5)).unwrap();
    let outcome = harness.engine.finish_movement_animation().unwrap();
    assert!(outcome.opportunity_attacks.is_empty());
}

// =============================================================================
// TEST 7: Large creatures and squeezing
// =============================================================================

#[test]
fn test_large_creature_claims_four_cells() {
    let mut harness = TestHarness::new();
    let ogre = harness.add(monster(sample_ogre()), 2, 2);
    harness.add(character(sample_fighter()), 10, 10);
    for cell in [(2, 2), (3, 2), (2, 3), (3, 3)] {
        assert_eq!(
            harness.engine.grid().occupant(Position::new(cell.0, cell.1)),
            Some(ogre)
        );
    }
    harness.start([20, 1]).unwrap();
    harness.engine.move_combatant(ogre, Position::new(5, 2)).unwrap();
    harness.engine.finish_movement_animation().unwrap();
    assert_eq!(harness.engine.grid().occupant(Position::new(2, 2)), None);
    assert_eq!(harness.engine.grid().occupant(Position::new(6, 3)), Some(ogre));
    assert_occupancy_consistent(&harness);
}

#[test]
fn test_large_creature_squeezes_through_gap() {
    let mut grid = Grid::new(10, 10);
    // A wall at x=5 with a one-cell gap in row 2.
    for y in (0..10).filter(|&y| y != 2) {
        grid.set_obstacle(Position::new(5, y), Some(tactics_core::Obstacle::wall()));
    }
    let mut harness = TestHarness::with_grid(grid);
    let ogre = harness.add(monster(sample_ogre()), 2, 2);
    harness.add(character(sample_fighter()), 9, 9);
    harness.start([20, 1]).unwrap();

    let animation = harness.engine.move_combatant(ogre, Position::new(5, 2)).unwrap();
    // One normal step, then two squeezed steps at double cost.
    assert_eq!(animation.cost, 25);
    assert!(animation.ends_squeezed);
    harness.engine.finish_movement_animation().unwrap();
    assert!(harness.combatant(ogre).squeezing);
    assert_occupancy_consistent(&harness);
}

// =============================================================================
// TEST 8: Size changes re-claim cells
// =============================================================================

/// A reduced ogre at (5,5) with a goblin standing where its full body would be.
fn reduced_ogre_hemmed_in(source: Option<&str>) -> (TestHarness, CombatantId, CombatantId) {
    let mut harness = TestHarness::new();
    let ogre = harness.add(monster(sample_ogre()), 5, 5);
    let mut reduced = ActiveCondition::new(Condition::Reduced);
    if let Some(source) = source {
        reduced = reduced.with_source(source);
    }
    harness.engine.apply_condition(ogre, reduced).unwrap();
    assert_eq!(harness.engine.grid().cells_occupied_by(ogre), vec![Position::new(5, 5)]);

    let goblin = harness.add(monster(sample_goblin()), 6, 5);
    assert_occupancy_consistent(&harness);
    (harness, ogre, goblin)
}

#[test]
fn test_enlarge_blocked_by_neighbor() {
    let mut harness = TestHarness::new();
    let fighter = harness.add(character(sample_fighter()), 5, 5);
    harness.add(monster(sample_goblin()), 6, 5);
    let result = harness
        .engine
        .apply_condition(fighter, ActiveCondition::new(Condition::Enlarged));
    assert!(matches!(result, Err(CombatError::DestinationBlocked)));
    assert_no_condition(&harness, fighter, Condition::Enlarged);
    assert_occupancy_consistent(&harness);
}

#[test]
fn test_regrowing_beside_a_creature_squeezes() {
    let (mut harness, ogre, goblin) = reduced_ogre_hemmed_in(None);

    assert!(harness.engine.remove_condition(ogre, Condition::Reduced).unwrap());
    assert_no_condition(&harness, ogre, Condition::Reduced);
    assert!(harness.combatant(ogre).squeezing);
    assert_eq!(harness.engine.grid().cells_occupied_by(ogre), vec![Position::new(5, 5)]);
    assert_eq!(harness.engine.grid().occupant(Position::new(6, 5)), Some(goblin));
    assert_occupancy_consistent(&harness);
}

#[test]
fn test_regrowing_in_open_space_takes_full_footprint() {
    let mut harness = TestHarness::new();
    let ogre = harness.add(monster(sample_ogre()), 5, 5);
    harness
        .engine
        .apply_condition(ogre, ActiveCondition::new(Condition::Reduced))
        .unwrap();
    harness.engine.remove_condition(ogre, Condition::Reduced).unwrap();
    assert!(!harness.combatant(ogre).squeezing);
    assert_eq!(harness.engine.grid().cells_occupied_by(ogre).len(), 4);
    assert_occupancy_consistent(&harness);
}

#[test]
fn test_source_removal_regrows_without_overlap() {
    let (mut harness, ogre, goblin) = reduced_ogre_hemmed_in(Some("Reduce (Wizard)"));

    assert_eq!(harness.engine.remove_conditions_by_source("Reduce (Wizard)"), 1);
    assert_no_condition(&harness, ogre, Condition::Reduced);
    assert!(harness.combatant(ogre).squeezing);
    assert_eq!(harness.engine.grid().occupant(Position::new(6, 5)), Some(goblin));
    assert_occupancy_consistent(&harness);
}
