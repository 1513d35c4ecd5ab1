//! Creature data consumed by the combat core.
//!
//! Characters and monsters arrive from catalog collaborators as plain stat
//! blocks. This module holds those stat blocks plus the shared rule
//! vocabulary: abilities, conditions, damage types, weapons and maneuvers.

use crate::dice::DieType;
use crate::size::CreatureSize;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a combatant on the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CombatantId(pub Uuid);

impl CombatantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CombatantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CombatantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Ability Scores
// ============================================================================

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Ability::Strength => "Strength",
            Ability::Dexterity => "Dexterity",
            Ability::Constitution => "Constitution",
            Ability::Intelligence => "Intelligence",
            Ability::Wisdom => "Wisdom",
            Ability::Charisma => "Charisma",
        }
    }

    pub fn is_mental(&self) -> bool {
        matches!(
            self,
            Ability::Intelligence | Ability::Wisdom | Ability::Charisma
        )
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// Ability scores container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl AbilityScores {
    pub fn new(str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    pub fn get(&self, ability: Ability) -> u8 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        // Floor division: 8-9 = -1, 10-11 = 0, 12-13 = +1
        (self.get(ability) as i32 - 10).div_euclid(2)
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

// ============================================================================
// Damage
// ============================================================================

/// Common D&D damage types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageType {
    Slashing,
    Piercing,
    Bludgeoning,
    Fire,
    Cold,
    Lightning,
    Thunder,
    Acid,
    Poison,
    Necrotic,
    Radiant,
    Force,
    Psychic,
}

impl DamageType {
    pub fn name(&self) -> &'static str {
        match self {
            DamageType::Slashing => "slashing",
            DamageType::Piercing => "piercing",
            DamageType::Bludgeoning => "bludgeoning",
            DamageType::Fire => "fire",
            DamageType::Cold => "cold",
            DamageType::Lightning => "lightning",
            DamageType::Thunder => "thunder",
            DamageType::Acid => "acid",
            DamageType::Poison => "poison",
            DamageType::Necrotic => "necrotic",
            DamageType::Radiant => "radiant",
            DamageType::Force => "force",
            DamageType::Psychic => "psychic",
        }
    }
}

impl fmt::Display for DamageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Conditions tracked during combat, including the action-derived states
/// (dodging, disengaging) and weapon mastery marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    Blinded,
    Charmed,
    Deafened,
    Frightened,
    Grappled,
    Incapacitated,
    Invisible,
    Paralyzed,
    Petrified,
    Poisoned,
    Prone,
    Restrained,
    Stunned,
    Unconscious,
    Dodging,
    Disengaging,
    Sapped,
    Slowed,
    Enlarged,
    Reduced,
}

impl Condition {
    pub fn name(&self) -> &'static str {
        match self {
            Condition::Blinded => "Blinded",
            Condition::Charmed => "Charmed",
            Condition::Deafened => "Deafened",
            Condition::Frightened => "Frightened",
            Condition::Grappled => "Grappled",
            Condition::Incapacitated => "Incapacitated",
            Condition::Invisible => "Invisible",
            Condition::Paralyzed => "Paralyzed",
            Condition::Petrified => "Petrified",
            Condition::Poisoned => "Poisoned",
            Condition::Prone => "Prone",
            Condition::Restrained => "Restrained",
            Condition::Stunned => "Stunned",
            Condition::Unconscious => "Unconscious",
            Condition::Dodging => "Dodging",
            Condition::Disengaging => "Disengaging",
            Condition::Sapped => "Sapped",
            Condition::Slowed => "Slowed",
            Condition::Enlarged => "Enlarged",
            Condition::Reduced => "Reduced",
        }
    }

    /// Conditions that stop a creature from taking actions or reactions.
    pub fn is_incapacitating(&self) -> bool {
        matches!(
            self,
            Condition::Incapacitated
                | Condition::Paralyzed
                | Condition::Petrified
                | Condition::Stunned
                | Condition::Unconscious
        )
    }

    /// Conditions under which Strength and Dexterity saves fail automatically.
    pub fn fails_str_dex_saves(&self) -> bool {
        matches!(
            self,
            Condition::Paralyzed | Condition::Petrified | Condition::Stunned | Condition::Unconscious
        )
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A save the affected creature repeats to shake off a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatSave {
    pub ability: Ability,
    pub dc: i32,
    /// Roll at the end of each of the creature's turns.
    pub at_end_of_turn: bool,
    /// Roll whenever the creature takes damage.
    pub on_damage: bool,
    /// Condition that replaces this one when the repeat save fails.
    pub upgrade_on_fail: Option<Condition>,
}

/// A condition applied to a creature with tracking info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCondition {
    pub condition: Condition,
    /// Rounds remaining; `None` lasts until removed.
    pub duration_rounds: Option<u32>,
    /// Shared tag for bulk removal (all conditions from one casting).
    pub source: Option<String>,
    pub repeat_save: Option<RepeatSave>,
    #[serde(default)]
    pub ends_on_damage: bool,
    /// Removed when this combatant's turn starts ("until the start of your next turn").
    pub expires_at_turn_start_of: Option<CombatantId>,
}

impl ActiveCondition {
    pub fn new(condition: Condition) -> Self {
        Self {
            condition,
            duration_rounds: None,
            source: None,
            repeat_save: None,
            ends_on_damage: false,
            expires_at_turn_start_of: None,
        }
    }

    pub fn with_duration(mut self, rounds: u32) -> Self {
        self.duration_rounds = Some(rounds);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_repeat_save(mut self, save: RepeatSave) -> Self {
        self.repeat_save = Some(save);
        self
    }

    pub fn ending_on_damage(mut self) -> Self {
        self.ends_on_damage = true;
        self
    }

    pub fn until_turn_start_of(mut self, id: CombatantId) -> Self {
        self.expires_at_turn_start_of = Some(id);
        self
    }
}

// ============================================================================
// Health
// ============================================================================

/// Death saving throws.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathSaves {
    pub successes: u8,
    pub failures: u8,
}

impl DeathSaves {
    pub fn add_success(&mut self) -> bool {
        self.successes = (self.successes + 1).min(3);
        self.successes >= 3
    }

    pub fn add_failures(&mut self, count: u8) -> bool {
        self.failures = (self.failures + count).min(3);
        self.failures >= 3
    }

    pub fn reset(&mut self) {
        self.successes = 0;
        self.failures = 0;
    }

    pub fn is_dead(&self) -> bool {
        self.failures >= 3
    }
}

/// Movement speeds in feet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speed {
    pub walk: u32,
    pub swim: Option<u32>,
    pub fly: Option<u32>,
    pub climb: Option<u32>,
}

impl Speed {
    pub fn new(walk: u32) -> Self {
        Self {
            walk,
            swim: None,
            fly: None,
            climb: None,
        }
    }

    pub fn with_swim(mut self, swim: u32) -> Self {
        self.swim = Some(swim);
        self
    }
}

impl Default for Speed {
    fn default() -> Self {
        Self::new(30)
    }
}

// ============================================================================
// Races
// ============================================================================

/// Playable races. Only traits the combat core reacts to are modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Race {
    Human,
    Elf,
    Dwarf,
    Halfling,
    HalfOrc,
    Gnome,
    Dragonborn,
    Tiefling,
}

impl Race {
    pub fn name(&self) -> &'static str {
        match self {
            Race::Human => "Human",
            Race::Elf => "Elf",
            Race::Dwarf => "Dwarf",
            Race::Halfling => "Halfling",
            Race::HalfOrc => "Half-Orc",
            Race::Gnome => "Gnome",
            Race::Dragonborn => "Dragonborn",
            Race::Tiefling => "Tiefling",
        }
    }

    /// Halfling Luck: reroll natural 1s on d20 tests.
    pub fn rerolls_natural_ones(&self) -> bool {
        matches!(self, Race::Halfling)
    }

    pub fn has_savage_attacks(&self) -> bool {
        matches!(self, Race::HalfOrc)
    }

    pub fn has_relentless_endurance(&self) -> bool {
        matches!(self, Race::HalfOrc)
    }

    pub fn size(&self) -> CreatureSize {
        match self {
            Race::Halfling | Race::Gnome => CreatureSize::Small,
            _ => CreatureSize::Medium,
        }
    }
}

impl fmt::Display for Race {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// Classes and Features
// ============================================================================

/// D&D character classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacterClass {
    Barbarian,
    Bard,
    Cleric,
    Druid,
    Fighter,
    Monk,
    Paladin,
    Ranger,
    Rogue,
    Sorcerer,
    Warlock,
    Wizard,
}

impl CharacterClass {
    pub fn name(&self) -> &'static str {
        match self {
            CharacterClass::Barbarian => "Barbarian",
            CharacterClass::Bard => "Bard",
            CharacterClass::Cleric => "Cleric",
            CharacterClass::Druid => "Druid",
            CharacterClass::Fighter => "Fighter",
            CharacterClass::Monk => "Monk",
            CharacterClass::Paladin => "Paladin",
            CharacterClass::Ranger => "Ranger",
            CharacterClass::Rogue => "Rogue",
            CharacterClass::Sorcerer => "Sorcerer",
            CharacterClass::Warlock => "Warlock",
            CharacterClass::Wizard => "Wizard",
        }
    }

    /// Returns the spellcasting ability for this class, if any.
    pub fn spellcasting_ability(&self) -> Option<Ability> {
        match self {
            CharacterClass::Bard | CharacterClass::Sorcerer | CharacterClass::Warlock => {
                Some(Ability::Charisma)
            }
            CharacterClass::Cleric | CharacterClass::Druid | CharacterClass::Ranger => {
                Some(Ability::Wisdom)
            }
            CharacterClass::Wizard => Some(Ability::Intelligence),
            CharacterClass::Paladin => Some(Ability::Charisma),
            _ => None,
        }
    }

    /// Attacks granted by one Attack action.
    pub fn attacks_per_action(&self, level: u8) -> u8 {
        match self {
            CharacterClass::Fighter => match level {
                20.. => 4,
                11..=19 => 3,
                5..=10 => 2,
                _ => 1,
            },
            CharacterClass::Barbarian
            | CharacterClass::Monk
            | CharacterClass::Paladin
            | CharacterClass::Ranger
                if level >= 5 =>
            {
                2
            }
            _ => 1,
        }
    }

    /// How many weapons the class can have mastered at a level.
    pub fn weapon_mastery_cap(&self, level: u8) -> usize {
        match self {
            CharacterClass::Fighter => match level {
                16.. => 6,
                10..=15 => 5,
                4..=9 => 4,
                _ => 3,
            },
            CharacterClass::Barbarian => match level {
                10.. => 4,
                4..=9 => 3,
                _ => 2,
            },
            CharacterClass::Paladin | CharacterClass::Ranger | CharacterClass::Rogue => 2,
            _ => 0,
        }
    }

    /// Sneak Attack dice count (rogues only).
    pub fn sneak_attack_dice(&self, level: u8) -> u32 {
        match self {
            CharacterClass::Rogue => (level as u32).div_ceil(2),
            _ => 0,
        }
    }
}

impl fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Subclasses with combat-relevant features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subclass {
    Champion,
    BattleMaster,
    Thief,
    Evoker,
}

/// Fighting styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FightingStyle {
    /// +2 to ranged weapon attack rolls.
    Archery,
    /// +1 AC.
    Defense,
    /// +2 damage with a one-handed melee weapon.
    Dueling,
}

/// Battle-master maneuvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Maneuver {
    PrecisionAttack,
    TripAttack,
    PushingAttack,
    MenacingAttack,
    Parry,
}

impl Maneuver {
    pub fn name(&self) -> &'static str {
        match self {
            Maneuver::PrecisionAttack => "Precision Attack",
            Maneuver::TripAttack => "Trip Attack",
            Maneuver::PushingAttack => "Pushing Attack",
            Maneuver::MenacingAttack => "Menacing Attack",
            Maneuver::Parry => "Parry",
        }
    }
}

// ============================================================================
// Weapons
// ============================================================================

/// Weapon properties per D&D 5e.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeaponProperty {
    Finesse,
    Light,
    Heavy,
    TwoHanded,
    Versatile(String),
    Thrown,
    Ammunition,
    Loading,
    Reach,
}

/// Weapon mastery properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MasteryProperty {
    Cleave,
    Graze,
    Nick,
    Push,
    Sap,
    Slow,
    Topple,
    Vex,
}

impl MasteryProperty {
    pub fn name(&self) -> &'static str {
        match self {
            MasteryProperty::Cleave => "Cleave",
            MasteryProperty::Graze => "Graze",
            MasteryProperty::Nick => "Nick",
            MasteryProperty::Push => "Push",
            MasteryProperty::Sap => "Sap",
            MasteryProperty::Slow => "Slow",
            MasteryProperty::Topple => "Topple",
            MasteryProperty::Vex => "Vex",
        }
    }
}

/// A weapon definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weapon {
    /// Catalog id used for mastery selection ("longsword").
    pub id: String,
    pub name: String,
    pub damage_dice: String,
    pub damage_type: DamageType,
    pub properties: Vec<WeaponProperty>,
    /// Normal and long range in feet.
    pub range: Option<(u32, u32)>,
    pub mastery: Option<MasteryProperty>,
}

impl Weapon {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        damage_dice: impl Into<String>,
        damage_type: DamageType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            damage_dice: damage_dice.into(),
            damage_type,
            properties: Vec::new(),
            range: None,
            mastery: None,
        }
    }

    pub fn with_properties(mut self, properties: Vec<WeaponProperty>) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_range(mut self, normal: u32, long: u32) -> Self {
        self.range = Some((normal, long));
        self
    }

    pub fn with_mastery(mut self, mastery: MasteryProperty) -> Self {
        self.mastery = Some(mastery);
        self
    }

    pub fn is_finesse(&self) -> bool {
        self.properties.contains(&WeaponProperty::Finesse)
    }

    pub fn is_light(&self) -> bool {
        self.properties.contains(&WeaponProperty::Light)
    }

    pub fn is_two_handed(&self) -> bool {
        self.properties.contains(&WeaponProperty::TwoHanded)
    }

    pub fn has_reach(&self) -> bool {
        self.properties.contains(&WeaponProperty::Reach)
    }

    /// Ranged weapons fire ammunition; thrown melee weapons stay melee here.
    pub fn is_ranged(&self) -> bool {
        self.properties.contains(&WeaponProperty::Ammunition)
            || (self.range.is_some() && !self.properties.contains(&WeaponProperty::Thrown))
    }

    /// Melee reach in feet.
    pub fn reach_ft(&self) -> u32 {
        if self.has_reach() {
            10
        } else {
            5
        }
    }
}

// ============================================================================
// Characters
// ============================================================================

/// Spell slots and known spells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spellcasting {
    pub ability: Ability,
    /// Remaining slots per level, index 0 = 1st level.
    pub slots: [u8; 9],
    pub known_spells: Vec<String>,
}

impl Spellcasting {
    pub fn new(ability: Ability) -> Self {
        Self {
            ability,
            slots: [0; 9],
            known_spells: Vec::new(),
        }
    }

    pub fn with_slots(mut self, level: u8, count: u8) -> Self {
        if (1..=9).contains(&level) {
            self.slots[level as usize - 1] = count;
        }
        self
    }

    pub fn with_spells(mut self, spells: &[&str]) -> Self {
        self.known_spells
            .extend(spells.iter().map(|s| s.to_string()));
        self
    }

    pub fn knows(&self, spell: &str) -> bool {
        self.known_spells
            .iter()
            .any(|s| s.eq_ignore_ascii_case(spell))
    }

    pub fn slots_remaining(&self, level: u8) -> u8 {
        match level {
            1..=9 => self.slots[level as usize - 1],
            _ => 0,
        }
    }

    /// Spend a slot of exactly this level. Returns false if none remain.
    pub fn use_slot(&mut self, level: u8) -> bool {
        match level {
            1..=9 if self.slots[level as usize - 1] > 0 => {
                self.slots[level as usize - 1] -= 1;
                true
            }
            _ => false,
        }
    }
}

/// A player character stat block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    pub race: Race,
    pub class: CharacterClass,
    pub subclass: Option<Subclass>,
    pub level: u8,
    pub ability_scores: AbilityScores,
    pub saving_throw_proficiencies: HashSet<Ability>,
    pub max_hp: i32,
    /// Armor class before fighting-style bonuses.
    pub armor_class: i32,
    pub speed: Speed,
    pub weapons: Vec<Weapon>,
    /// Weapon ids the character has chosen to master.
    pub mastered_weapons: Vec<String>,
    pub fighting_style: Option<FightingStyle>,
    pub maneuvers: Vec<Maneuver>,
    pub spellcasting: Option<Spellcasting>,
}

impl Character {
    pub fn new(name: impl Into<String>, race: Race, class: CharacterClass, level: u8) -> Self {
        Self {
            name: name.into(),
            race,
            class,
            subclass: None,
            level,
            ability_scores: AbilityScores::default(),
            saving_throw_proficiencies: HashSet::new(),
            max_hp: 10,
            armor_class: 10,
            speed: Speed::default(),
            weapons: Vec::new(),
            mastered_weapons: Vec::new(),
            fighting_style: None,
            maneuvers: Vec::new(),
            spellcasting: None,
        }
    }

    pub fn proficiency_bonus(&self) -> i32 {
        match self.level {
            0..=4 => 2,
            5..=8 => 3,
            9..=12 => 4,
            13..=16 => 5,
            _ => 6,
        }
    }

    pub fn saving_throw_modifier(&self, ability: Ability) -> i32 {
        let ability_mod = self.ability_scores.modifier(ability);
        if self.saving_throw_proficiencies.contains(&ability) {
            ability_mod + self.proficiency_bonus()
        } else {
            ability_mod
        }
    }

    /// AC including the Defense fighting style.
    pub fn effective_ac(&self) -> i32 {
        let defense = match self.fighting_style {
            Some(FightingStyle::Defense) => 1,
            _ => 0,
        };
        self.armor_class + defense
    }

    /// Whether the character may use the mastery property of this weapon.
    ///
    /// Only the first `weapon_mastery_cap` entries of `mastered_weapons` count.
    pub fn has_mastered(&self, weapon_id: &str) -> bool {
        let cap = self.class.weapon_mastery_cap(self.level);
        self.mastered_weapons
            .iter()
            .take(cap)
            .any(|w| w.eq_ignore_ascii_case(weapon_id))
    }

    /// Lowest natural roll that crits.
    pub fn crit_threshold(&self) -> u32 {
        match (self.subclass, self.level) {
            (Some(Subclass::Champion), 15..) => 18,
            (Some(Subclass::Champion), 3..) => 19,
            _ => 20,
        }
    }

    pub fn has_uncanny_dodge(&self) -> bool {
        self.class == CharacterClass::Rogue && self.level >= 5
    }

    /// Superiority die size and starting count for battle masters.
    pub fn superiority_dice(&self) -> Option<(DieType, u8)> {
        if self.subclass != Some(Subclass::BattleMaster) || self.level < 3 {
            return None;
        }
        let die = match self.level {
            18.. => DieType::D12,
            10..=17 => DieType::D10,
            _ => DieType::D8,
        };
        let count = match self.level {
            15.. => 6,
            7..=14 => 5,
            _ => 4,
        };
        Some((die, count))
    }

    pub fn spell_save_dc(&self) -> Option<i32> {
        self.spellcasting
            .as_ref()
            .map(|s| 8 + self.proficiency_bonus() + self.ability_scores.modifier(s.ability))
    }

    pub fn spell_attack_bonus(&self) -> Option<i32> {
        self.spellcasting
            .as_ref()
            .map(|s| self.proficiency_bonus() + self.ability_scores.modifier(s.ability))
    }
}

// ============================================================================
// Monsters
// ============================================================================

/// A monster's attack action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonsterAction {
    pub name: String,
    pub attack_bonus: i32,
    /// Full damage expression including the modifier ("1d6+2").
    pub damage_dice: String,
    pub damage_type: DamageType,
    pub reach_ft: u32,
    /// Normal and long range for ranged actions.
    pub range: Option<(u32, u32)>,
}

impl MonsterAction {
    pub fn melee(
        name: impl Into<String>,
        attack_bonus: i32,
        damage_dice: impl Into<String>,
        damage_type: DamageType,
    ) -> Self {
        Self {
            name: name.into(),
            attack_bonus,
            damage_dice: damage_dice.into(),
            damage_type,
            reach_ft: 5,
            range: None,
        }
    }

    pub fn ranged(
        name: impl Into<String>,
        attack_bonus: i32,
        damage_dice: impl Into<String>,
        damage_type: DamageType,
        normal: u32,
        long: u32,
    ) -> Self {
        Self {
            range: Some((normal, long)),
            ..Self::melee(name, attack_bonus, damage_dice, damage_type)
        }
    }

    pub fn with_reach(mut self, reach_ft: u32) -> Self {
        self.reach_ft = reach_ft;
        self
    }

    pub fn is_ranged(&self) -> bool {
        self.range.is_some()
    }
}

/// A monster stat block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monster {
    pub name: String,
    pub size: CreatureSize,
    pub armor_class: i32,
    pub max_hp: i32,
    pub speed: Speed,
    pub ability_scores: AbilityScores,
    pub proficiency_bonus: i32,
    /// Explicit save bonuses; abilities not listed use the plain modifier.
    pub saving_throws: HashMap<Ability, i32>,
    pub actions: Vec<MonsterAction>,
    /// Attacks per Attack action.
    pub multiattack: u8,
}

impl Monster {
    pub fn new(name: impl Into<String>, size: CreatureSize, armor_class: i32, max_hp: i32) -> Self {
        Self {
            name: name.into(),
            size,
            armor_class,
            max_hp,
            speed: Speed::default(),
            ability_scores: AbilityScores::default(),
            proficiency_bonus: 2,
            saving_throws: HashMap::new(),
            actions: Vec::new(),
            multiattack: 1,
        }
    }

    pub fn with_action(mut self, action: MonsterAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn saving_throw_modifier(&self, ability: Ability) -> i32 {
        self.saving_throws
            .get(&ability)
            .copied()
            .unwrap_or_else(|| self.ability_scores.modifier(ability))
    }
}

// ============================================================================
// Actor
// ============================================================================

/// Which side of the fight a combatant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Party,
    Hostile,
}

impl Side {
    pub fn is_opposed_to(self, other: Side) -> bool {
        self != other
    }
}

/// The stat block behind a combatant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actor {
    Character(Box<Character>),
    Monster(Box<Monster>),
}

impl Actor {
    pub fn name(&self) -> &str {
        match self {
            Actor::Character(c) => &c.name,
            Actor::Monster(m) => &m.name,
        }
    }

    pub fn side(&self) -> Side {
        match self {
            Actor::Character(_) => Side::Party,
            Actor::Monster(_) => Side::Hostile,
        }
    }

    pub fn is_character(&self) -> bool {
        matches!(self, Actor::Character(_))
    }

    pub fn as_character(&self) -> Option<&Character> {
        match self {
            Actor::Character(c) => Some(c),
            Actor::Monster(_) => None,
        }
    }

    pub fn as_character_mut(&mut self) -> Option<&mut Character> {
        match self {
            Actor::Character(c) => Some(c),
            Actor::Monster(_) => None,
        }
    }

    pub fn as_monster(&self) -> Option<&Monster> {
        match self {
            Actor::Monster(m) => Some(m),
            Actor::Character(_) => None,
        }
    }

    pub fn ability_scores(&self) -> &AbilityScores {
        match self {
            Actor::Character(c) => &c.ability_scores,
            Actor::Monster(m) => &m.ability_scores,
        }
    }

    pub fn ability_modifier(&self, ability: Ability) -> i32 {
        self.ability_scores().modifier(ability)
    }

    pub fn proficiency_bonus(&self) -> i32 {
        match self {
            Actor::Character(c) => c.proficiency_bonus(),
            Actor::Monster(m) => m.proficiency_bonus,
        }
    }

    pub fn max_hp(&self) -> i32 {
        match self {
            Actor::Character(c) => c.max_hp,
            Actor::Monster(m) => m.max_hp,
        }
    }

    pub fn armor_class(&self) -> i32 {
        match self {
            Actor::Character(c) => c.effective_ac(),
            Actor::Monster(m) => m.armor_class,
        }
    }

    pub fn speed(&self) -> &Speed {
        match self {
            Actor::Character(c) => &c.speed,
            Actor::Monster(m) => &m.speed,
        }
    }

    /// Base size before enlarge/reduce effects.
    pub fn size(&self) -> CreatureSize {
        match self {
            Actor::Character(c) => c.race.size(),
            Actor::Monster(m) => m.size,
        }
    }

    pub fn saving_throw_modifier(&self, ability: Ability) -> i32 {
        match self {
            Actor::Character(c) => c.saving_throw_modifier(ability),
            Actor::Monster(m) => m.saving_throw_modifier(ability),
        }
    }

    pub fn attacks_per_action(&self) -> u8 {
        match self {
            Actor::Character(c) => c.class.attacks_per_action(c.level),
            Actor::Monster(m) => m.multiattack.max(1),
        }
    }

    pub fn rerolls_natural_ones(&self) -> bool {
        match self {
            Actor::Character(c) => c.race.rerolls_natural_ones(),
            Actor::Monster(_) => false,
        }
    }

    pub fn crit_threshold(&self) -> u32 {
        match self {
            Actor::Character(c) => c.crit_threshold(),
            Actor::Monster(_) => 20,
        }
    }
}
