//! Testing utilities for combat scenarios.
//!
//! This module provides:
//! - Sample stat blocks used across the test suites
//! - `TestHarness`, an engine driven by scripted dice
//! - Assertion helpers for verifying combat state

use crate::config::EngineConfig;
use crate::dice::ScriptedDice;
use crate::engine::CombatEngine;
use crate::error::CombatResult;
use crate::geometry::Position;
use crate::grid::Grid;
use crate::items::get_weapon;
use crate::size::CreatureSize;
use crate::state::{Combatant, Phase};
use crate::world::{
    Ability, AbilityScores, Actor, Character, CharacterClass, CombatantId, Condition, DamageType,
    FightingStyle, Maneuver, Monster, MonsterAction, Race, Speed, Spellcasting, Subclass,
};

// ============================================================================
// Sample Stat Blocks
// ============================================================================

fn weapons(ids: &[&str]) -> Vec<crate::world::Weapon> {
    ids.iter().filter_map(|id| get_weapon(id)).collect()
}

/// Roland, a level 3 human Battle Master with a longsword and longbow.
pub fn sample_fighter() -> Character {
    let mut c = Character::new("Roland", Race::Human, CharacterClass::Fighter, 3);
    c.subclass = Some(Subclass::BattleMaster);
    c.ability_scores = AbilityScores::new(16, 14, 14, 10, 12, 10);
    c.saving_throw_proficiencies = [Ability::Strength, Ability::Constitution].into();
    c.max_hp = 28;
    c.armor_class = 16;
    c.speed = Speed::new(30);
    c.weapons = weapons(&["longsword", "longbow"]);
    c.mastered_weapons = vec!["longsword".into(), "longbow".into()];
    c.fighting_style = Some(FightingStyle::Dueling);
    c.maneuvers = vec![
        Maneuver::PrecisionAttack,
        Maneuver::TripAttack,
        Maneuver::PushingAttack,
        Maneuver::MenacingAttack,
        Maneuver::Parry,
    ];
    c
}

/// Vess, a level 5 human rogue fighting with rapier, shortsword and dagger.
pub fn sample_rogue() -> Character {
    let mut c = Character::new("Vess", Race::Human, CharacterClass::Rogue, 5);
    c.ability_scores = AbilityScores::new(10, 18, 12, 14, 12, 10);
    c.saving_throw_proficiencies = [Ability::Dexterity, Ability::Intelligence].into();
    c.max_hp = 33;
    c.armor_class = 15;
    c.weapons = weapons(&["rapier", "shortsword", "dagger", "shortbow"]);
    c.mastered_weapons = vec!["shortsword".into(), "dagger".into()];
    c
}

/// Ilse, a level 5 elf wizard.
pub fn sample_wizard() -> Character {
    let mut c = Character::new("Ilse", Race::Elf, CharacterClass::Wizard, 5);
    c.ability_scores = AbilityScores::new(8, 14, 14, 16, 12, 10);
    c.saving_throw_proficiencies = [Ability::Intelligence, Ability::Wisdom].into();
    c.max_hp = 27;
    c.armor_class = 12;
    c.weapons = weapons(&["dagger"]);
    c.spellcasting = Some(
        Spellcasting::new(Ability::Intelligence)
            .with_slots(1, 4)
            .with_slots(2, 3)
            .with_slots(3, 2)
            .with_spells(&[
                "Fire Bolt",
                "Ray of Frost",
                "Magic Missile",
                "Burning Hands",
                "Thunderwave",
                "Sleep",
                "Fog Cloud",
                "Grease",
                "Shield",
                "Hold Person",
                "Shatter",
                "Fireball",
                "Lightning Bolt",
            ]),
    );
    c
}

pub fn sample_goblin() -> Monster {
    let mut m = Monster::new("Goblin", CreatureSize::Small, 15, 7);
    m.ability_scores = AbilityScores::new(8, 14, 10, 10, 8, 8);
    m.speed = Speed::new(30);
    m.with_action(MonsterAction::melee("Scimitar", 4, "1d6+2", DamageType::Slashing))
        .with_action(MonsterAction::ranged(
            "Shortbow",
            4,
            "1d6+2",
            DamageType::Piercing,
            80,
            320,
        ))
}

pub fn sample_ogre() -> Monster {
    let mut m = Monster::new("Ogre", CreatureSize::Large, 11, 59);
    m.ability_scores = AbilityScores::new(19, 8, 16, 5, 7, 7);
    m.speed = Speed::new(40);
    m.with_action(MonsterAction::melee("Greatclub", 6, "2d8+4", DamageType::Bludgeoning))
}

pub fn character(c: Character) -> Actor {
    Actor::Character(Box::new(c))
}

pub fn monster(m: Monster) -> Actor {
    Actor::Monster(Box::new(m))
}

// ============================================================================
// Test Harness
// ============================================================================

/// A combat engine whose dice are scripted by the test.
///
/// Faces not scripted fall back to a fixed seed.
pub struct TestHarness {
    pub engine: CombatEngine,
}

impl TestHarness {
    /// A 20x20 open grid with prompts for reactions enabled.
    pub fn new() -> Self {
        Self::with_grid(Grid::new(20, 20))
    }

    pub fn with_grid(grid: Grid) -> Self {
        Self::with_config(grid, EngineConfig::default())
    }

    pub fn with_config(grid: Grid, config: EngineConfig) -> Self {
        let engine = CombatEngine::with_roller(grid, config, Box::new(ScriptedDice::default()));
        Self { engine }
    }

    /// Add and place a creature during setup.
    pub fn add(&mut self, actor: Actor, x: i32, y: i32) -> CombatantId {
        match self.engine.add_combatant_at(actor, Position::new(x, y)) {
            Ok(id) => id,
            Err(err) => panic!("could not place combatant at ({x}, {y}): {err}"),
        }
    }

    /// Replace the dice with these faces.
    pub fn script(&mut self, faces: impl IntoIterator<Item = u32>) -> &mut Self {
        self.engine.set_roller(ScriptedDice::new(faces));
        self
    }

    /// Start combat with scripted initiative rolls, one per combatant in roster order.
    pub fn start(&mut self, initiative: impl IntoIterator<Item = u32>) -> CombatResult<Vec<CombatantId>> {
        self.script(initiative);
        self.engine.start_combat()
    }

    /// Advance turns until it is `id`'s turn.
    pub fn skip_to(&mut self, id: CombatantId) -> CombatResult<()> {
        for _ in 0..self.engine.state().turn_order.len() * 2 {
            if self.engine.current_combatant_id() == Some(id) {
                return Ok(());
            }
            self.engine.next_turn()?;
        }
        panic!("{id} never got a turn");
    }

    pub fn combatant(&self, id: CombatantId) -> &Combatant {
        match self.engine.combatant(id) {
            Some(c) => c,
            None => panic!("no combatant {id}"),
        }
    }

    pub fn hp(&self, id: CombatantId) -> i32 {
        self.combatant(id).current_hp
    }

    pub fn position(&self, id: CombatantId) -> Option<Position> {
        self.combatant(id).position
    }

    pub fn has_condition(&self, id: CombatantId, condition: Condition) -> bool {
        self.combatant(id).has_condition(condition)
    }

    /// The most recent log message.
    pub fn last_message(&self) -> Option<&str> {
        self.engine
            .state()
            .log
            .last()
            .map(|e| e.message.as_str())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

#[track_caller]
pub fn assert_hp(harness: &TestHarness, id: CombatantId, expected: i32) {
    let actual = harness.hp(id);
    assert_eq!(
        actual,
        expected,
        "Expected {} to have {expected} HP, got {actual}",
        harness.combatant(id).name()
    );
}

#[track_caller]
pub fn assert_condition(harness: &TestHarness, id: CombatantId, condition: Condition) {
    assert!(
        harness.has_condition(id, condition),
        "Expected {} to be {condition}",
        harness.combatant(id).name()
    );
}

#[track_caller]
pub fn assert_no_condition(harness: &TestHarness, id: CombatantId, condition: Condition) {
    assert!(
        !harness.has_condition(id, condition),
        "Expected {} to NOT be {condition}",
        harness.combatant(id).name()
    );
}

#[track_caller]
pub fn assert_phase(harness: &TestHarness, phase: Phase) {
    assert_eq!(harness.engine.phase(), phase, "Unexpected combat phase");
}

#[track_caller]
pub fn assert_occupancy_consistent(harness: &TestHarness) {
    assert!(
        harness.engine.state().occupancy_consistent(),
        "Grid occupancy disagrees with combatant footprints"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_stat_blocks() {
        let fighter = sample_fighter();
        assert_eq!(fighter.weapons.len(), 2);
        assert_eq!(fighter.superiority_dice().map(|(_, n)| n), Some(4));
        assert!(fighter.has_mastered("longsword"));

        let wizard = sample_wizard();
        assert_eq!(wizard.spell_save_dc(), Some(14));
        assert_eq!(wizard.spell_attack_bonus(), Some(6));

        let rogue = sample_rogue();
        assert_eq!(rogue.class.sneak_attack_dice(rogue.level), 3);
        assert!(rogue.has_uncanny_dodge());
    }

    #[test]
    fn test_harness_places_and_starts() {
        let mut harness = TestHarness::new();
        let fighter = harness.add(character(sample_fighter()), 0, 0);
        let goblin = harness.add(monster(sample_goblin()), 1, 0);
        assert_occupancy_consistent(&harness);

        let order = harness.start([15, 5]).unwrap();
        assert_eq!(order, vec![fighter, goblin]);
        assert_phase(&harness, Phase::Combat);
        assert_eq!(harness.engine.current_combatant_id(), Some(fighter));
        assert_hp(&harness, goblin, 7);
    }
}
