//! QA tests for spellcasting: attacks, saves, areas, concentration and zones.

use tactics_core::testing::*;
use tactics_core::{
    AttackOptions, CombatError, CombatantId, Condition, DamageType, Grid, Phase, Position,
    SpellTarget,
};

/// The wizard at (0,0) acting first against the given monsters.
fn wizard_vs(
    grid: Grid,
    monsters: &[(i32, i32)],
) -> (TestHarness, CombatantId, Vec<CombatantId>) {
    let mut harness = TestHarness::with_grid(grid);
    let wizard = harness.add(character(sample_wizard()), 0, 0);
    let ids: Vec<CombatantId> = monsters
        .iter()
        .map(|&(x, y)| harness.add(monster(sample_goblin()), x, y))
        .collect();
    let mut initiative = vec![20];
    initiative.extend(std::iter::repeat(1).take(ids.len()));
    harness.start(initiative).unwrap();
    assert_eq!(harness.engine.current_combatant_id(), Some(wizard));
    (harness, wizard, ids)
}

/// Pass turns until the wizard is up again.
fn back_to(harness: &mut TestHarness, id: CombatantId) {
    harness.engine.next_turn().unwrap();
    harness.skip_to(id).unwrap();
}

// =============================================================================
// TEST 1: Spell attacks
// =============================================================================

#[test]
fn test_fire_bolt_scales_with_level() {
    let (mut harness, wizard, goblins) = wizard_vs(Grid::new(20, 20), &[(5, 0)]);
    // +6 to hit; level 5 casts roll 2d10.
    harness.script([12, 2, 3]);
    let outcome = harness
        .engine
        .cast_spell(wizard, "Fire Bolt", None, SpellTarget::Creatures(vec![goblins[0]]))
        .unwrap();
    assert_eq!(outcome.slot_level, 0);
    assert_eq!(outcome.hits[0].damage, 5);
    assert_hp(&harness, goblins[0], 2);
    // Cantrips cost no slot but do cost the action.
    assert!(harness.combatant(wizard).turn.has_acted);
    assert!(matches!(
        harness.engine.cast_spell(wizard, "Fire Bolt", None, SpellTarget::Creatures(vec![goblins[0]])),
        Err(CombatError::AlreadyActed(_))
    ));
}

#[test]
fn test_spell_out_of_range() {
    let (mut harness, wizard, goblins) = wizard_vs(Grid::new(40, 5), &[(30, 0)]);
    let result = harness.engine.cast_spell(
        wizard,
        "Fire Bolt",
        None,
        SpellTarget::Creatures(vec![goblins[0]]),
    );
    assert!(matches!(
        result,
        Err(CombatError::OutOfRange { distance: 150, range: 120 })
    ));
    assert!(!harness.combatant(wizard).turn.has_acted);
}

#[test]
fn test_unknown_and_unlearned_spells() {
    let (mut harness, wizard, goblins) = wizard_vs(Grid::new(20, 20), &[(5, 0)]);
    assert!(matches!(
        harness.engine.cast_spell(wizard, "Wish", None, SpellTarget::None),
        Err(CombatError::UnknownSpell(_))
    ));
    // A real spell the wizard never learned.
    assert!(matches!(
        harness.engine.cast_spell(wizard, "Cure Wounds", None, SpellTarget::Creatures(vec![wizard])),
        Err(CombatError::UnknownSpell(_))
    ));
    assert!(matches!(
        harness.engine.cast_spell(wizard, "Fire Bolt", None, SpellTarget::Point(Position::new(5, 0))),
        Err(CombatError::InvalidTarget(_))
    ));
    assert_hp(&harness, goblins[0], 7);
}

// =============================================================================
// TEST 2: Auto-hit projectiles
// =============================================================================

#[test]
fn test_magic_missile_splits_darts() {
    let (mut harness, wizard, goblins) = wizard_vs(Grid::new(20, 20), &[(5, 0), (6, 3)]);
    harness.script([4, 4, 1]);
    let outcome = harness
        .engine
        .cast_spell(
            wizard,
            "Magic Missile",
            None,
            SpellTarget::Projectiles(vec![(goblins[0], 2), (goblins[1], 1)]),
        )
        .unwrap();
    assert_eq!(outcome.hits[0].damage, 10);
    assert_eq!(outcome.hits[1].damage, 2);
    assert!(harness.combatant(goblins[0]).is_dead());
    assert_hp(&harness, goblins[1], 5);
    assert_eq!(harness.combatant(wizard).spell_slots(1), 3);
}

#[test]
fn test_magic_missile_needs_every_dart_assigned() {
    let (mut harness, wizard, goblins) = wizard_vs(Grid::new(20, 20), &[(5, 0)]);
    let result = harness.engine.cast_spell(
        wizard,
        "Magic Missile",
        None,
        SpellTarget::Projectiles(vec![(goblins[0], 2)]),
    );
    assert!(matches!(result, Err(CombatError::InvalidTarget(_))));
    assert_eq!(harness.combatant(wizard).spell_slots(1), 4);
}

#[test]
fn test_upcast_magic_missile_fires_more_darts() {
    let (mut harness, wizard, goblins) = wizard_vs(Grid::new(20, 20), &[(5, 0)]);
    let result = harness.engine.cast_spell(
        wizard,
        "Magic Missile",
        Some(2),
        SpellTarget::Projectiles(vec![(goblins[0], 4)]),
    );
    assert!(result.is_ok());
    assert_eq!(harness.combatant(wizard).spell_slots(2), 2);
    assert_eq!(harness.combatant(wizard).spell_slots(1), 4);
}

// =============================================================================
// TEST 3: Area saves
// =============================================================================

#[test]
fn test_fireball_rolls_once_and_spares_allies() {
    let mut harness = TestHarness::new();
    let wizard = harness.add(character(sample_wizard()), 0, 0);
    let g1 = harness.add(monster(sample_goblin()), 10, 10);
    let g2 = harness.add(monster(sample_goblin()), 11, 10);
    let fighter = harness.add(character(sample_fighter()), 10, 11);
    harness.start([20, 1, 1, 1]).unwrap();

    // 8d6 of threes, then one DEX save per goblin in roster order.
    harness.script([3, 3, 3, 3, 3, 3, 3, 3, 2, 19]);
    let outcome = harness
        .engine
        .cast_spell(wizard, "Fireball", None, SpellTarget::Point(Position::new(10, 10)))
        .unwrap();
    assert_eq!(outcome.slot_level, 3);
    assert_eq!(outcome.hits.len(), 2);
    assert_eq!(outcome.hits[0].target, g1);
    assert_eq!(outcome.hits[0].damage, 24);
    assert_eq!(outcome.hits[1].damage, 12);
    assert!(outcome.cells.contains(&Position::new(10, 11)));

    assert!(harness.combatant(g1).is_dead());
    assert!(harness.combatant(g2).is_dead());
    assert_hp(&harness, fighter, 28);
    assert_phase(&harness, Phase::Victory);
}

#[test]
fn test_spell_slots_run_out() {
    let (mut harness, wizard, goblins) = wizard_vs(Grid::new(40, 40), &[(30, 30)]);
    let target = SpellTarget::Point(Position::new(10, 10));
    harness.engine.cast_spell(wizard, "Fireball", None, target.clone()).unwrap();
    back_to(&mut harness, wizard);
    harness.engine.cast_spell(wizard, "Fireball", None, target.clone()).unwrap();
    back_to(&mut harness, wizard);
    assert!(matches!(
        harness.engine.cast_spell(wizard, "Fireball", None, target),
        Err(CombatError::NoResourceRemaining(_))
    ));
    assert_hp(&harness, goblins[0], 7);
}

#[test]
fn test_burning_hands_cone_from_caster() {
    let (mut harness, wizard, goblins) = wizard_vs(Grid::new(20, 20), &[(2, 0), (0, 8)]);
    // 3d6 of ones, then a failed save.
    harness.script([1, 1, 1, 2]);
    let outcome = harness
        .engine
        .cast_spell(wizard, "Burning Hands", None, SpellTarget::Point(Position::new(5, 0)))
        .unwrap();
    assert_eq!(outcome.hits.len(), 1);
    assert_hp(&harness, goblins[0], 4);
    assert_hp(&harness, goblins[1], 7);
}

// =============================================================================
// TEST 4: Concentration
// =============================================================================

#[test]
fn test_hold_person_paralyzes_until_concentration_ends() {
    let (mut harness, wizard, goblins) = wizard_vs(Grid::new(20, 20), &[(1, 0)]);
    let goblin = goblins[0];
    harness.script([5]);
    harness
        .engine
        .cast_spell(wizard, "Hold Person", None, SpellTarget::Creatures(vec![goblin]))
        .unwrap();
    assert_condition(&harness, goblin, Condition::Paralyzed);
    assert!(harness.combatant(wizard).concentration.is_some());

    // Paralyzed creatures can't act on their turn.
    harness.engine.next_turn().unwrap();
    assert!(matches!(
        harness.engine.attack(goblin, wizard, AttackOptions::new()),
        Err(CombatError::Incapacitated(_))
    ));

    assert_eq!(harness.engine.end_concentration(wizard), Some("Hold Person".to_string()));
    assert_no_condition(&harness, goblin, Condition::Paralyzed);
}

#[test]
fn test_hold_person_repeat_save_at_end_of_turn() {
    let (mut harness, wizard, goblins) = wizard_vs(Grid::new(20, 20), &[(1, 0)]);
    let goblin = goblins[0];
    harness.script([5]);
    harness
        .engine
        .cast_spell(wizard, "Hold Person", None, SpellTarget::Creatures(vec![goblin]))
        .unwrap();
    harness.engine.next_turn().unwrap();
    harness.script([20]);
    harness.engine.next_turn().unwrap();
    assert_no_condition(&harness, goblin, Condition::Paralyzed);
    // The caster keeps concentrating even after every target shakes it off.
    assert!(harness.combatant(wizard).concentration.is_some());
}

#[test]
fn test_damage_can_break_concentration() {
    let (mut harness, wizard, goblins) = wizard_vs(Grid::new(20, 20), &[(1, 0)]);
    let goblin = goblins[0];
    harness.script([5]);
    harness
        .engine
        .cast_spell(wizard, "Hold Person", None, SpellTarget::Creatures(vec![goblin]))
        .unwrap();

    // CON save 3 + 2 against DC 10.
    harness.script([3]);
    let outcome = harness.engine.deal_damage(wizard, 10, DamageType::Piercing).unwrap();
    assert!(outcome.concentration_lost);
    assert!(harness.combatant(wizard).concentration.is_none());
    assert_no_condition(&harness, goblin, Condition::Paralyzed);
}

#[test]
fn test_new_concentration_spell_replaces_old() {
    let (mut harness, wizard, goblins) = wizard_vs(Grid::new(20, 20), &[(1, 0)]);
    harness.script([5]);
    harness
        .engine
        .cast_spell(wizard, "Hold Person", None, SpellTarget::Creatures(vec![goblins[0]]))
        .unwrap();
    back_to(&mut harness, wizard);
    harness
        .engine
        .cast_spell(wizard, "Fog Cloud", None, SpellTarget::Point(Position::new(10, 10)))
        .unwrap();
    assert_no_condition(&harness, goblins[0], Condition::Paralyzed);
    assert_eq!(
        harness.combatant(wizard).concentration.as_ref().map(|c| c.spell.as_str()),
        Some("Fog Cloud")
    );
}

#[test]
fn test_sleep_ends_when_damaged() {
    let (mut harness, wizard, goblins) = wizard_vs(Grid::new(20, 20), &[(5, 5)]);
    harness.script([1]);
    harness
        .engine
        .cast_spell(wizard, "Sleep", None, SpellTarget::Point(Position::new(5, 5)))
        .unwrap();
    assert_condition(&harness, goblins[0], Condition::Incapacitated);

    harness.engine.deal_damage(goblins[0], 1, DamageType::Piercing).unwrap();
    assert_no_condition(&harness, goblins[0], Condition::Incapacitated);
    assert_hp(&harness, goblins[0], 6);
}

#[test]
fn test_failed_sleep_save_upgrades_and_still_wakes_on_damage() {
    let (mut harness, wizard, goblins) = wizard_vs(Grid::new(20, 20), &[(5, 5)]);
    let goblin = goblins[0];
    harness.script([1]);
    harness
        .engine
        .cast_spell(wizard, "Sleep", None, SpellTarget::Point(Position::new(5, 5)))
        .unwrap();

    // The goblin fails again at the end of its turn and falls asleep.
    harness.engine.next_turn().unwrap();
    harness.script([1]);
    assert_eq!(harness.engine.next_turn().unwrap(), wizard);
    assert_no_condition(&harness, goblin, Condition::Incapacitated);
    assert_condition(&harness, goblin, Condition::Unconscious);
    let asleep = harness
        .combatant(goblin)
        .conditions
        .iter()
        .find(|c| c.condition == Condition::Unconscious)
        .cloned()
        .unwrap();
    assert!(asleep.ends_on_damage);
    assert!(asleep.repeat_save.is_none());

    harness.engine.deal_damage(goblin, 1, DamageType::Piercing).unwrap();
    assert_no_condition(&harness, goblin, Condition::Unconscious);
}

#[test]
fn test_repeat_save_frees_only_the_creature_that_rolled() {
    let (mut harness, wizard, goblins) = wizard_vs(Grid::new(20, 20), &[(1, 0), (0, 1)]);
    let (first, second) = (goblins[0], goblins[1]);
    harness.script([5, 5]);
    harness
        .engine
        .cast_spell(wizard, "Hold Person", Some(3), SpellTarget::Creatures(vec![first, second]))
        .unwrap();
    assert_condition(&harness, first, Condition::Paralyzed);
    assert_condition(&harness, second, Condition::Paralyzed);

    // First goblin's turn, then its end-of-turn save succeeds.
    assert_eq!(harness.engine.next_turn().unwrap(), first);
    harness.script([20]);
    assert_eq!(harness.engine.next_turn().unwrap(), second);
    assert_no_condition(&harness, first, Condition::Paralyzed);
    assert_condition(&harness, second, Condition::Paralyzed);

    // Ending concentration clears the rest of the casting.
    assert_eq!(harness.engine.end_concentration(wizard), Some("Hold Person".to_string()));
    assert_no_condition(&harness, second, Condition::Paralyzed);
}

// =============================================================================
// TEST 5: Zones
// =============================================================================

#[test]
fn test_zones_and_their_lifetimes() {
    let (mut harness, wizard, _) = wizard_vs(Grid::new(20, 20), &[(15, 15)]);
    let before = harness.engine.reachable_positions(wizard).unwrap();

    let fog = harness
        .engine
        .cast_spell(wizard, "Fog Cloud", None, SpellTarget::Point(Position::new(10, 0)))
        .unwrap();
    assert!(fog.zone.is_some());
    back_to(&mut harness, wizard);
    let grease = harness
        .engine
        .cast_spell(wizard, "Grease", None, SpellTarget::Point(Position::new(2, 0)))
        .unwrap();
    assert_eq!(harness.engine.zones().len(), 2);

    // Grease is difficult terrain.
    let after = harness.engine.reachable_positions(wizard).unwrap();
    let mut compared = 0;
    for cell in &grease.cells {
        if let (Some(plain), Some(greased)) = (before.get(cell), after.get(cell)) {
            assert!(greased > plain, "grease at {cell} should cost more");
            compared += 1;
        }
    }
    assert!(compared > 0);

    // Only the concentration zone goes away.
    harness.engine.end_concentration(wizard);
    assert_eq!(harness.engine.zones().len(), 1);
    assert_eq!(harness.engine.zones()[0].source, grease.source);
}
