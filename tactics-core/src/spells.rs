//! Spell database.
//!
//! Each entry carries only what combat resolution needs: how the spell is
//! resolved, what it targets, what it does on a hit or failed save, and how
//! it grows when cast with a higher slot.

use crate::aoe::AoeShape;
use crate::dice::DiceExpression;
use crate::world::{Ability, Condition, DamageType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Schools of magic in D&D.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpellSchool {
    Abjuration,
    Conjuration,
    Enchantment,
    Evocation,
}

impl SpellSchool {
    pub fn name(&self) -> &'static str {
        match self {
            SpellSchool::Abjuration => "Abjuration",
            SpellSchool::Conjuration => "Conjuration",
            SpellSchool::Enchantment => "Enchantment",
            SpellSchool::Evocation => "Evocation",
        }
    }
}

/// How long it takes to cast a spell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastingTime {
    Action,
    BonusAction,
    Reaction,
}

/// Type of spell attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpellAttackType {
    Melee,
    Ranged,
}

/// How the spell decides whether it lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpellResolution {
    /// Spell attack roll against AC.
    Attack(SpellAttackType),
    /// Targets save; damaging spells may deal half on a success.
    Save {
        ability: Ability,
        half_on_success: bool,
    },
    AutoHit,
    Healing,
    /// Places a zone; any save belongs to the zone.
    Zone,
    /// Only usable as a reaction (Shield).
    Reaction,
}

/// What the caster points the spell at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpellTargeting {
    SelfOnly,
    /// Up to `count` chosen creatures within range.
    Creatures { range_ft: u32, count: u32 },
    /// `count` projectiles the caster distributes among creatures in range.
    Projectiles { range_ft: u32, count: u32 },
    /// An area template. `range_ft: None` means the area starts at the caster.
    Area {
        shape: AoeShape,
        size_ft: u32,
        range_ft: Option<u32>,
    },
}

/// A condition a spell inflicts on a hit or failed save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellCondition {
    pub condition: Condition,
    pub duration_rounds: Option<u32>,
    /// The target repeats the save at the end of each of its turns.
    pub repeat_at_end_of_turn: bool,
    /// The target repeats the save whenever it takes damage.
    pub repeat_on_damage: bool,
    pub upgrade_on_fail: Option<Condition>,
    pub ends_on_damage: bool,
    /// Lasts until the start of the caster's next turn.
    pub until_caster_turn: bool,
}

impl SpellCondition {
    pub fn new(condition: Condition) -> Self {
        Self {
            condition,
            duration_rounds: None,
            repeat_at_end_of_turn: false,
            repeat_on_damage: false,
            upgrade_on_fail: None,
            ends_on_damage: false,
            until_caster_turn: false,
        }
    }

    pub fn for_rounds(mut self, rounds: u32) -> Self {
        self.duration_rounds = Some(rounds);
        self
    }

    pub fn repeating_at_end_of_turn(mut self) -> Self {
        self.repeat_at_end_of_turn = true;
        self
    }

    pub fn upgrading_to(mut self, condition: Condition) -> Self {
        self.upgrade_on_fail = Some(condition);
        self
    }

    pub fn ending_on_damage(mut self) -> Self {
        self.ends_on_damage = true;
        self
    }

    pub fn until_caster_turn(mut self) -> Self {
        self.until_caster_turn = true;
        self
    }
}

/// Kinds of persistent zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneKind {
    Fog,
    Grease,
}

impl ZoneKind {
    pub fn name(&self) -> &'static str {
        match self {
            ZoneKind::Fog => "fog",
            ZoneKind::Grease => "grease",
        }
    }
}

/// A save forced on creatures entering or starting a turn in a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSave {
    pub ability: Ability,
    pub condition: Condition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneTemplate {
    pub kind: ZoneKind,
    pub save: Option<ZoneSave>,
    pub obscures: bool,
    pub difficult_terrain: bool,
}

/// Per-slot-level growth above the spell's base level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upcast {
    /// Extra dice of the spell's main damage or healing die.
    pub extra_dice: u32,
    pub extra_area_ft: u32,
    pub extra_targets: u32,
    pub extra_projectiles: u32,
}

/// Complete spell definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellData {
    pub name: String,
    pub level: u8, // 0 for cantrips
    pub school: SpellSchool,
    pub casting_time: CastingTime,
    pub concentration: bool,
    pub resolution: SpellResolution,
    pub targeting: SpellTargeting,
    pub damage_dice: Option<String>,
    pub damage_type: Option<DamageType>,
    pub healing_dice: Option<String>,
    /// Applied on a hit or failed save.
    pub condition: Option<SpellCondition>,
    pub zone: Option<ZoneTemplate>,
    pub upcast: Upcast,
}

impl SpellData {
    fn new(
        name: &str,
        level: u8,
        school: SpellSchool,
        resolution: SpellResolution,
        targeting: SpellTargeting,
    ) -> Self {
        Self {
            name: name.to_string(),
            level,
            school,
            casting_time: CastingTime::Action,
            concentration: false,
            resolution,
            targeting,
            damage_dice: None,
            damage_type: None,
            healing_dice: None,
            condition: None,
            zone: None,
            upcast: Upcast::default(),
        }
    }

    fn damage(mut self, dice: &str, damage_type: DamageType) -> Self {
        self.damage_dice = Some(dice.to_string());
        self.damage_type = Some(damage_type);
        self
    }

    fn healing(mut self, dice: &str) -> Self {
        self.healing_dice = Some(dice.to_string());
        self
    }

    fn inflicts(mut self, condition: SpellCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    fn concentration(mut self) -> Self {
        self.concentration = true;
        self
    }

    fn casting_time(mut self, time: CastingTime) -> Self {
        self.casting_time = time;
        self
    }

    fn zone(mut self, zone: ZoneTemplate) -> Self {
        self.zone = Some(zone);
        self
    }

    fn upcast(mut self, upcast: Upcast) -> Self {
        self.upcast = upcast;
        self
    }

    /// Check if this is a cantrip.
    pub fn is_cantrip(&self) -> bool {
        self.level == 0
    }

    /// Get the number of damage dice based on caster level (for cantrips).
    pub fn cantrip_dice_count(&self, caster_level: u8) -> u32 {
        match caster_level {
            0..=4 => 1,
            5..=10 => 2,
            11..=16 => 3,
            _ => 4,
        }
    }

    fn levels_above_base(&self, slot_level: u8) -> u32 {
        slot_level.saturating_sub(self.level) as u32
    }

    fn scaled_dice(&self, base: &str, caster_level: u8, slot_level: u8) -> Option<DiceExpression> {
        let expr = DiceExpression::parse(base).ok()?;
        let die = expr.primary_die()?;
        if self.is_cantrip() {
            let extra = self.cantrip_dice_count(caster_level) - 1;
            return Some(if extra > 0 {
                expr.with_extra_dice(extra * count_of(&expr, die), die)
            } else {
                expr
            });
        }
        let extra = self.upcast.extra_dice * self.levels_above_base(slot_level);
        Some(if extra > 0 {
            expr.with_extra_dice(extra, die)
        } else {
            expr
        })
    }

    /// Damage dice for a given caster level and slot level.
    pub fn effective_damage_dice(&self, caster_level: u8, slot_level: u8) -> Option<DiceExpression> {
        let base = self.damage_dice.as_ref()?;
        self.scaled_dice(base, caster_level, slot_level)
    }

    /// Healing dice for a slot level, before the spellcasting modifier.
    pub fn effective_healing_dice(&self, slot_level: u8) -> Option<DiceExpression> {
        let base = self.healing_dice.as_ref()?;
        self.scaled_dice(base, 1, slot_level)
    }

    /// Targeting after upcast growth (area size, creature count, projectiles).
    pub fn effective_targeting(&self, slot_level: u8) -> SpellTargeting {
        let above = self.levels_above_base(slot_level);
        match self.targeting {
            SpellTargeting::Creatures { range_ft, count } => SpellTargeting::Creatures {
                range_ft,
                count: count + self.upcast.extra_targets * above,
            },
            SpellTargeting::Projectiles { range_ft, count } => SpellTargeting::Projectiles {
                range_ft,
                count: count + self.upcast.extra_projectiles * above,
            },
            SpellTargeting::Area {
                shape,
                size_ft,
                range_ft,
            } => SpellTargeting::Area {
                shape,
                size_ft: size_ft + self.upcast.extra_area_ft * above,
                range_ft,
            },
            SpellTargeting::SelfOnly => SpellTargeting::SelfOnly,
        }
    }

    /// Spells whose only payload is a condition.
    pub fn is_pure_condition(&self) -> bool {
        self.damage_dice.is_none() && self.condition.is_some()
    }
}

fn count_of(expr: &DiceExpression, die: crate::dice::DieType) -> u32 {
    expr.components
        .iter()
        .filter(|c| c.die_type == die)
        .map(|c| c.count)
        .sum()
}

// ============================================================================
// Spell Database
// ============================================================================

/// Global spell database.
static SPELL_DATABASE: LazyLock<HashMap<String, SpellData>> = LazyLock::new(build_spell_database);

/// Look up a spell by name (case-insensitive).
pub fn get_spell(name: &str) -> Option<&'static SpellData> {
    SPELL_DATABASE.get(&name.to_lowercase())
}

/// Get all spells in the database.
pub fn all_spells() -> impl Iterator<Item = &'static SpellData> {
    SPELL_DATABASE.values()
}

/// Get all spells of a specific level.
pub fn spells_by_level(level: u8) -> impl Iterator<Item = &'static SpellData> {
    SPELL_DATABASE.values().filter(move |s| s.level == level)
}

fn build_spell_database() -> HashMap<String, SpellData> {
    use SpellResolution as R;
    use SpellTargeting as T;

    let spells = vec![
        // ====================================================================
        // CANTRIPS
        // ====================================================================
        SpellData::new(
            "Fire Bolt",
            0,
            SpellSchool::Evocation,
            R::Attack(SpellAttackType::Ranged),
            T::Creatures { range_ft: 120, count: 1 },
        )
        .damage("1d10", DamageType::Fire),
        SpellData::new(
            "Ray of Frost",
            0,
            SpellSchool::Evocation,
            R::Attack(SpellAttackType::Ranged),
            T::Creatures { range_ft: 60, count: 1 },
        )
        .damage("1d8", DamageType::Cold)
        .inflicts(SpellCondition::new(Condition::Slowed).until_caster_turn()),
        SpellData::new(
            "Sacred Flame",
            0,
            SpellSchool::Evocation,
            R::Save { ability: Ability::Dexterity, half_on_success: false },
            T::Creatures { range_ft: 60, count: 1 },
        )
        .damage("1d8", DamageType::Radiant),
        // ====================================================================
        // 1ST LEVEL
        // ====================================================================
        SpellData::new(
            "Magic Missile",
            1,
            SpellSchool::Evocation,
            R::AutoHit,
            T::Projectiles { range_ft: 120, count: 3 },
        )
        .damage("1d4+1", DamageType::Force)
        .upcast(Upcast { extra_projectiles: 1, ..Upcast::default() }),
        SpellData::new(
            "Burning Hands",
            1,
            SpellSchool::Evocation,
            R::Save { ability: Ability::Dexterity, half_on_success: true },
            T::Area { shape: AoeShape::Cone, size_ft: 15, range_ft: None },
        )
        .damage("3d6", DamageType::Fire)
        .upcast(Upcast { extra_dice: 1, ..Upcast::default() }),
        SpellData::new(
            "Thunderwave",
            1,
            SpellSchool::Evocation,
            R::Save { ability: Ability::Constitution, half_on_success: true },
            T::Area { shape: AoeShape::Cube, size_ft: 15, range_ft: None },
        )
        .damage("2d8", DamageType::Thunder)
        .upcast(Upcast { extra_dice: 1, ..Upcast::default() }),
        SpellData::new(
            "Sleep",
            1,
            SpellSchool::Enchantment,
            R::Save { ability: Ability::Wisdom, half_on_success: false },
            T::Area { shape: AoeShape::Sphere, size_ft: 5, range_ft: Some(60) },
        )
        .concentration()
        .inflicts(
            SpellCondition::new(Condition::Incapacitated)
                .for_rounds(10)
                .repeating_at_end_of_turn()
                .upgrading_to(Condition::Unconscious)
                .ending_on_damage(),
        ),
        SpellData::new(
            "Fog Cloud",
            1,
            SpellSchool::Conjuration,
            R::Zone,
            T::Area { shape: AoeShape::Sphere, size_ft: 20, range_ft: Some(120) },
        )
        .concentration()
        .zone(ZoneTemplate {
            kind: ZoneKind::Fog,
            save: None,
            obscures: true,
            difficult_terrain: false,
        })
        .upcast(Upcast { extra_area_ft: 20, ..Upcast::default() }),
        SpellData::new(
            "Grease",
            1,
            SpellSchool::Conjuration,
            R::Zone,
            T::Area { shape: AoeShape::Cube, size_ft: 10, range_ft: Some(60) },
        )
        .zone(ZoneTemplate {
            kind: ZoneKind::Grease,
            save: Some(ZoneSave {
                ability: Ability::Dexterity,
                condition: Condition::Prone,
            }),
            obscures: false,
            difficult_terrain: true,
        }),
        SpellData::new(
            "Cure Wounds",
            1,
            SpellSchool::Abjuration,
            R::Healing,
            T::Creatures { range_ft: 5, count: 1 },
        )
        .healing("2d8")
        .upcast(Upcast { extra_dice: 2, ..Upcast::default() }),
        SpellData::new(
            "Healing Word",
            1,
            SpellSchool::Abjuration,
            R::Healing,
            T::Creatures { range_ft: 60, count: 1 },
        )
        .casting_time(CastingTime::BonusAction)
        .healing("2d4")
        .upcast(Upcast { extra_dice: 2, ..Upcast::default() }),
        SpellData::new("Shield", 1, SpellSchool::Abjuration, R::Reaction, T::SelfOnly)
            .casting_time(CastingTime::Reaction),
        // ====================================================================
        // 2ND LEVEL
        // ====================================================================
        SpellData::new(
            "Hold Person",
            2,
            SpellSchool::Enchantment,
            R::Save { ability: Ability::Wisdom, half_on_success: false },
            T::Creatures { range_ft: 60, count: 1 },
        )
        .concentration()
        .inflicts(
            SpellCondition::new(Condition::Paralyzed)
                .for_rounds(10)
                .repeating_at_end_of_turn(),
        )
        .upcast(Upcast { extra_targets: 1, ..Upcast::default() }),
        SpellData::new(
            "Shatter",
            2,
            SpellSchool::Evocation,
            R::Save { ability: Ability::Constitution, half_on_success: true },
            T::Area { shape: AoeShape::Sphere, size_ft: 10, range_ft: Some(60) },
        )
        .damage("3d8", DamageType::Thunder)
        .upcast(Upcast { extra_dice: 1, ..Upcast::default() }),
        // ====================================================================
        // 3RD LEVEL
        // ====================================================================
        SpellData::new(
            "Fireball",
            3,
            SpellSchool::Evocation,
            R::Save { ability: Ability::Dexterity, half_on_success: true },
            T::Area { shape: AoeShape::Sphere, size_ft: 20, range_ft: Some(150) },
        )
        .damage("8d6", DamageType::Fire)
        .upcast(Upcast { extra_dice: 1, ..Upcast::default() }),
        SpellData::new(
            "Lightning Bolt",
            3,
            SpellSchool::Evocation,
            R::Save { ability: Ability::Dexterity, half_on_success: true },
            T::Area { shape: AoeShape::Line, size_ft: 100, range_ft: None },
        )
        .damage("8d6", DamageType::Lightning)
        .upcast(Upcast { extra_dice: 1, ..Upcast::default() }),
    ];

    spells
        .into_iter()
        .map(|s| (s.name.to_lowercase(), s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_spell() {
        let fireball = get_spell("fireball").expect("Fireball should exist");
        assert_eq!(fireball.name, "Fireball");
        assert_eq!(fireball.level, 3);
        assert_eq!(fireball.school, SpellSchool::Evocation);
        assert!(fireball.damage_dice.is_some());
    }

    #[test]
    fn test_case_insensitive_lookup() {
        assert!(get_spell("FIREBALL").is_some());
        assert!(get_spell("Fireball").is_some());
        assert!(get_spell("fireball").is_some());
        assert!(get_spell("wish").is_none());
    }

    #[test]
    fn test_cantrip_scaling() {
        let fire_bolt = get_spell("fire bolt").expect("Fire Bolt should exist");
        assert!(fire_bolt.is_cantrip());
        assert_eq!(fire_bolt.effective_damage_dice(1, 0).unwrap().to_string(), "1d10");
        assert_eq!(fire_bolt.effective_damage_dice(5, 0).unwrap().to_string(), "2d10");
        assert_eq!(fire_bolt.effective_damage_dice(11, 0).unwrap().to_string(), "3d10");
        assert_eq!(fire_bolt.effective_damage_dice(17, 0).unwrap().to_string(), "4d10");
    }

    #[test]
    fn test_upcast_damage() {
        let fireball = get_spell("fireball").unwrap();
        assert_eq!(fireball.effective_damage_dice(5, 3).unwrap().to_string(), "8d6");
        assert_eq!(fireball.effective_damage_dice(9, 5).unwrap().to_string(), "10d6");

        let cure = get_spell("cure wounds").unwrap();
        assert_eq!(cure.effective_healing_dice(2).unwrap().to_string(), "4d8");
    }

    #[test]
    fn test_upcast_targets_and_area() {
        let hold = get_spell("hold person").unwrap();
        assert_eq!(
            hold.effective_targeting(4),
            SpellTargeting::Creatures { range_ft: 60, count: 3 }
        );

        let fog = get_spell("fog cloud").unwrap();
        assert!(matches!(
            fog.effective_targeting(2),
            SpellTargeting::Area { size_ft: 40, .. }
        ));

        let missile = get_spell("magic missile").unwrap();
        assert_eq!(
            missile.effective_targeting(3),
            SpellTargeting::Projectiles { range_ft: 120, count: 5 }
        );
    }

    #[test]
    fn test_concentration_spell() {
        let hold_person = get_spell("hold person").expect("Hold Person should exist");
        assert!(hold_person.concentration);
        assert!(hold_person.is_pure_condition());

        let fireball = get_spell("fireball").expect("Fireball should exist");
        assert!(!fireball.concentration);
    }

    #[test]
    fn test_sleep_upgrade_chain() {
        let sleep = get_spell("sleep").unwrap();
        let condition = sleep.condition.unwrap();
        assert_eq!(condition.condition, Condition::Incapacitated);
        assert_eq!(condition.upgrade_on_fail, Some(Condition::Unconscious));
        assert!(condition.ends_on_damage);
    }

    #[test]
    fn test_spells_by_level() {
        let cantrips: Vec<_> = spells_by_level(0).collect();
        assert!(!cantrips.is_empty());
        for spell in cantrips {
            assert_eq!(spell.level, 0);
        }
    }
}
