//! Attack, saving throw, and death save resolution.
//!
//! Functions here read combatants and the grid and return results. The
//! engine decides what to do with them.

use crate::dice::{roll_d20, Advantage, D20Roll, DiceExpression, DieRoller, DieType, RollResult};
use crate::error::CombatError;
use crate::geometry::FEET_PER_CELL;
use crate::grid::Grid;
use crate::size::reach_distance;
use crate::state::Combatant;
use crate::world::{
    Ability, Actor, Character, CharacterClass, CombatantId, Condition, DamageType, FightingStyle,
    Maneuver, Race, Weapon,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// Attack Profiles
// ============================================================================

/// What a combatant attacks with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackSource {
    /// A character weapon, by catalog id or name.
    Weapon(String),
    /// A monster action, by name.
    Action(String),
    Unarmed,
}

impl AttackSource {
    /// First weapon or action on the stat block.
    pub fn default_for(actor: &Actor) -> AttackSource {
        match actor {
            Actor::Character(c) => c
                .weapons
                .first()
                .map(|w| AttackSource::Weapon(w.id.clone()))
                .unwrap_or(AttackSource::Unarmed),
            Actor::Monster(m) => m
                .actions
                .first()
                .map(|a| AttackSource::Action(a.name.clone()))
                .unwrap_or(AttackSource::Unarmed),
        }
    }

    /// First melee weapon or action, used for opportunity attacks.
    pub fn melee_for(actor: &Actor) -> AttackSource {
        match actor {
            Actor::Character(c) => c
                .weapons
                .iter()
                .find(|w| !w.is_ranged())
                .map(|w| AttackSource::Weapon(w.id.clone()))
                .unwrap_or(AttackSource::Unarmed),
            Actor::Monster(m) => m
                .actions
                .iter()
                .find(|a| !a.is_ranged())
                .map(|a| AttackSource::Action(a.name.clone()))
                .unwrap_or(AttackSource::Unarmed),
        }
    }
}

/// Everything needed to roll one attack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackProfile {
    pub name: String,
    pub attack_bonus: i32,
    pub damage: DiceExpression,
    pub damage_type: DamageType,
    pub ranged: bool,
    pub reach_ft: u32,
    /// Normal and long range for ranged attacks.
    pub range: Option<(u32, u32)>,
    /// Ability modifier folded into damage (Graze deals this on a miss).
    pub ability_modifier: i32,
    pub weapon: Option<Weapon>,
}

impl AttackProfile {
    pub fn for_source(actor: &Actor, source: &AttackSource) -> Result<Self, CombatError> {
        match (actor, source) {
            (Actor::Character(c), AttackSource::Weapon(id)) => {
                let weapon = c
                    .weapons
                    .iter()
                    .find(|w| w.id.eq_ignore_ascii_case(id) || w.name.eq_ignore_ascii_case(id))
                    .ok_or_else(|| CombatError::UnknownWeapon(id.clone()))?;
                Self::for_weapon(c, weapon)
            }
            (Actor::Monster(m), AttackSource::Action(name)) => {
                let action = m
                    .actions
                    .iter()
                    .find(|a| a.name.eq_ignore_ascii_case(name))
                    .ok_or_else(|| CombatError::UnknownWeapon(name.clone()))?;
                let str_mod = m.ability_scores.modifier(Ability::Strength);
                let dex_mod = m.ability_scores.modifier(Ability::Dexterity);
                Ok(Self {
                    name: action.name.clone(),
                    attack_bonus: action.attack_bonus,
                    damage: DiceExpression::parse(&action.damage_dice)?,
                    damage_type: action.damage_type,
                    ranged: action.is_ranged(),
                    reach_ft: action.reach_ft,
                    range: action.range,
                    ability_modifier: if action.is_ranged() { dex_mod } else { str_mod },
                    weapon: None,
                })
            }
            (_, AttackSource::Unarmed) => {
                let str_mod = actor.ability_modifier(Ability::Strength);
                Ok(Self {
                    name: "Unarmed Strike".to_string(),
                    attack_bonus: str_mod + actor.proficiency_bonus(),
                    damage: DiceExpression::flat(1 + str_mod),
                    damage_type: DamageType::Bludgeoning,
                    ranged: false,
                    reach_ft: 5,
                    range: None,
                    ability_modifier: str_mod,
                    weapon: None,
                })
            }
            (_, AttackSource::Weapon(name)) | (_, AttackSource::Action(name)) => {
                Err(CombatError::UnknownWeapon(name.clone()))
            }
        }
    }

    fn for_weapon(character: &Character, weapon: &Weapon) -> Result<Self, CombatError> {
        // Ranged: DEX only. Finesse: higher of STR or DEX. Melee: STR only.
        let str_mod = character.ability_scores.modifier(Ability::Strength);
        let dex_mod = character.ability_scores.modifier(Ability::Dexterity);
        let ranged = weapon.is_ranged();
        let ability_mod = if ranged {
            dex_mod
        } else if weapon.is_finesse() {
            str_mod.max(dex_mod)
        } else {
            str_mod
        };

        let style_to_hit = match character.fighting_style {
            Some(FightingStyle::Archery) if ranged => 2,
            _ => 0,
        };
        let style_damage = match character.fighting_style {
            Some(FightingStyle::Dueling) if !ranged && !weapon.is_two_handed() => 2,
            _ => 0,
        };

        let damage = DiceExpression::parse(&weapon.damage_dice)?.plus(ability_mod + style_damage);
        Ok(Self {
            name: weapon.name.clone(),
            attack_bonus: ability_mod + character.proficiency_bonus() + style_to_hit,
            damage,
            damage_type: weapon.damage_type,
            ranged,
            reach_ft: weapon.reach_ft(),
            range: if ranged { weapon.range } else { None },
            ability_modifier: ability_mod,
            weapon: Some(weapon.clone()),
        })
    }

    /// Drop a positive ability modifier from damage (off-hand and cleave attacks).
    pub fn without_ability_damage(mut self) -> Self {
        if self.ability_modifier > 0 {
            self.damage = self.damage.plus(-self.ability_modifier);
        }
        self
    }

    pub fn is_light(&self) -> bool {
        self.weapon.as_ref().is_some_and(Weapon::is_light)
    }

    pub fn weapon_id(&self) -> Option<&str> {
        self.weapon.as_ref().map(|w| w.id.as_str())
    }
}

// ============================================================================
// Range and Targeting
// ============================================================================

/// Why an attack cannot be made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetingFailure {
    NotPlaced,
    OutOfRange { distance: u32, range: u32 },
    NoLineOfSight,
}

impl From<TargetingFailure> for CombatError {
    fn from(failure: TargetingFailure) -> Self {
        match failure {
            TargetingFailure::NotPlaced => {
                CombatError::InvalidTarget("combatant is not on the grid".to_string())
            }
            TargetingFailure::OutOfRange { distance, range } => {
                CombatError::OutOfRange { distance, range }
            }
            TargetingFailure::NoLineOfSight => CombatError::NoLineOfSight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeCheck {
    pub distance_ft: u32,
    /// Beyond normal range: the attack rolls with disadvantage.
    pub long_range: bool,
}

/// Distance in feet between the nearest cells of two footprints.
pub fn footprint_distance(a: &Combatant, b: &Combatant) -> Option<u32> {
    Some(reach_distance(a.position?, a.footprint(), b.position?, b.footprint()))
}

/// Check range and, for ranged attacks, line of sight.
pub fn can_attack_target(
    grid: &Grid,
    attacker: &Combatant,
    target: &Combatant,
    profile: &AttackProfile,
) -> Result<RangeCheck, TargetingFailure> {
    let (Some(from), Some(to)) = (attacker.position, target.position) else {
        return Err(TargetingFailure::NotPlaced);
    };
    let distance = footprint_distance(attacker, target).ok_or(TargetingFailure::NotPlaced)?;

    if !profile.ranged {
        if distance > profile.reach_ft {
            return Err(TargetingFailure::OutOfRange {
                distance,
                range: profile.reach_ft,
            });
        }
        return Ok(RangeCheck {
            distance_ft: distance,
            long_range: false,
        });
    }

    let (normal, long) = profile.range.unwrap_or((FEET_PER_CELL, FEET_PER_CELL));
    if distance > long {
        return Err(TargetingFailure::OutOfRange {
            distance,
            range: long,
        });
    }
    if !grid.has_line_of_sight(from, to) {
        return Err(TargetingFailure::NoLineOfSight);
    }
    Ok(RangeCheck {
        distance_ft: distance,
        long_range: distance > normal,
    })
}

/// Range and sight check for a spell aimed at a creature.
pub fn can_target_with_spell(
    grid: &Grid,
    caster: &Combatant,
    target: &Combatant,
    range_ft: u32,
) -> Result<u32, TargetingFailure> {
    let (Some(from), Some(to)) = (caster.position, target.position) else {
        return Err(TargetingFailure::NotPlaced);
    };
    let distance = footprint_distance(caster, target).ok_or(TargetingFailure::NotPlaced)?;
    if caster.id != target.id && distance > range_ft.max(FEET_PER_CELL) {
        return Err(TargetingFailure::OutOfRange {
            distance,
            range: range_ft,
        });
    }
    if !grid.has_line_of_sight(from, to) {
        return Err(TargetingFailure::NoLineOfSight);
    }
    Ok(distance)
}

/// Whether another conscious member of the attacker's side is within 5 ft of the target.
pub fn ally_adjacent_to_target(
    roster: &[Combatant],
    attacker: &Combatant,
    target: &Combatant,
) -> bool {
    roster.iter().any(|c| {
        c.id != attacker.id
            && c.id != target.id
            && c.side() == attacker.side()
            && c.can_act()
            && footprint_distance(c, target).is_some_and(|d| d <= FEET_PER_CELL)
    })
}

// ============================================================================
// Advantage
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvantageReport {
    pub advantage: Advantage,
    pub sources: Vec<String>,
    /// Advantage came from this attacker's Vex mark.
    pub vex: bool,
}

/// Scan both combatants' conditions for attack-roll advantage and disadvantage.
pub fn attack_advantage(
    attacker: &Combatant,
    target: &Combatant,
    ranged: bool,
    distance_ft: u32,
    long_range: bool,
    round: u32,
) -> AdvantageReport {
    let mut adv = Vec::new();
    let mut dis = Vec::new();

    if attacker.has_condition(Condition::Invisible) {
        adv.push("attacker unseen");
    }
    for (condition, reason) in [
        (Condition::Blinded, "attacker blinded"),
        (Condition::Poisoned, "attacker poisoned"),
        (Condition::Restrained, "attacker restrained"),
        (Condition::Prone, "attacker prone"),
        (Condition::Sapped, "attacker sapped"),
        (Condition::Frightened, "attacker frightened"),
    ] {
        if attacker.has_condition(condition) {
            dis.push(reason);
        }
    }
    if attacker.squeezing {
        dis.push("attacker squeezing");
    }

    for (condition, reason) in [
        (Condition::Blinded, "target blinded"),
        (Condition::Paralyzed, "target paralyzed"),
        (Condition::Restrained, "target restrained"),
        (Condition::Stunned, "target stunned"),
        (Condition::Unconscious, "target unconscious"),
    ] {
        if target.has_condition(condition) {
            adv.push(reason);
        }
    }
    if target.squeezing {
        adv.push("target squeezing");
    }
    if target.has_condition(Condition::Invisible) {
        dis.push("target unseen");
    }
    if target.has_condition(Condition::Prone) {
        if !ranged && distance_ft <= FEET_PER_CELL {
            adv.push("target prone");
        } else {
            dis.push("target prone at range");
        }
    }
    if target.has_condition(Condition::Dodging) && target.can_act() {
        dis.push("target dodging");
    }

    let vex = attacker
        .vex
        .is_some_and(|v| v.target == target.id && round <= v.expires_round);
    if vex {
        adv.push("vex");
    }
    if long_range {
        dis.push("long range");
    }

    let advantage = Advantage::from_sources(!adv.is_empty(), !dis.is_empty());
    let sources = adv
        .iter()
        .map(|s| format!("{s} (advantage)"))
        .chain(dis.iter().map(|s| format!("{s} (disadvantage)")))
        .collect();
    AdvantageReport {
        advantage,
        sources,
        vex,
    }
}

// ============================================================================
// Attack Resolution
// ============================================================================

/// Extra damage reported separately from the weapon roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusDamage {
    pub source: String,
    pub roll: RollResult,
}

/// A superiority die spent on an attack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManeuverUse {
    pub maneuver: Maneuver,
    pub die_roll: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackResult {
    pub attacker: CombatantId,
    pub target: CombatantId,
    pub attack_name: String,
    pub hit: bool,
    pub critical: bool,
    pub critical_miss: bool,
    pub roll: D20Roll,
    pub target_ac: i32,
    pub advantage_sources: Vec<String>,
    pub damage: Option<RollResult>,
    pub damage_type: DamageType,
    pub bonus_damage: Vec<BonusDamage>,
    pub ranged: bool,
    pub vex_consumed: bool,
    pub sneak_attack: bool,
    pub maneuver: Option<ManeuverUse>,
}

impl AttackResult {
    pub fn total_damage(&self) -> i32 {
        if !self.hit {
            return 0;
        }
        let base = self.damage.as_ref().map_or(0, RollResult::non_negative_total);
        let bonus: i32 = self
            .bonus_damage
            .iter()
            .map(|b| b.roll.non_negative_total())
            .sum();
        base + bonus
    }

    /// Human-readable damage breakdown, one part per source.
    pub fn damage_breakdown(&self) -> String {
        let mut parts = Vec::new();
        if let Some(damage) = &self.damage {
            parts.push(format!("{} {}", damage, self.damage_type));
        }
        for bonus in &self.bonus_damage {
            parts.push(format!("{}: {}", bonus.source, bonus.roll));
        }
        parts.join("; ")
    }
}

/// Situational inputs to an attack roll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttackContext {
    pub distance_ft: u32,
    pub long_range: bool,
    pub round: u32,
    pub ally_adjacent_to_target: bool,
    /// Maneuver declared with the attack and the superiority die it spends.
    pub maneuver: Option<(Maneuver, DieType)>,
}

fn roll_dice(roller: &mut dyn DieRoller, count: u32, die: DieType) -> RollResult {
    DiceExpression::flat(0)
        .with_extra_dice(count, die)
        .roll_with(roller)
}

/// Resolve one attack roll and, on a hit, its damage.
pub fn resolve_attack(
    roller: &mut dyn DieRoller,
    attacker: &Combatant,
    target: &Combatant,
    profile: &AttackProfile,
    context: &AttackContext,
) -> AttackResult {
    let report = attack_advantage(
        attacker,
        target,
        profile.ranged,
        context.distance_ft,
        context.long_range,
        context.round,
    );
    let roll = roll_d20(
        roller,
        report.advantage,
        profile.attack_bonus,
        attacker.actor.rerolls_natural_ones(),
    );
    let target_ac = target.actor.armor_class();
    let crit_threshold = attacker.actor.crit_threshold();

    // Natural 1 always misses, crit range always hits.
    let critical_miss = roll.is_natural_1();
    let mut critical = !critical_miss && roll.natural >= crit_threshold;
    let mut hit = critical || (!critical_miss && roll.total >= target_ac);

    let mut maneuver = None;
    if let Some((Maneuver::PrecisionAttack, die)) = context.maneuver {
        if !hit && !critical_miss {
            let die_roll = roller.roll_die(die.sides());
            maneuver = Some(ManeuverUse {
                maneuver: Maneuver::PrecisionAttack,
                die_roll,
            });
            hit = roll.total + die_roll as i32 >= target_ac;
        }
    }

    let helpless = target.has_condition(Condition::Paralyzed)
        || target.has_condition(Condition::Unconscious);
    if hit && helpless && !profile.ranged && context.distance_ft <= FEET_PER_CELL {
        critical = true;
    }

    let mut result = AttackResult {
        attacker: attacker.id,
        target: target.id,
        attack_name: profile.name.clone(),
        hit,
        critical,
        critical_miss,
        roll,
        target_ac,
        advantage_sources: report.sources,
        damage: None,
        damage_type: profile.damage_type,
        bonus_damage: Vec::new(),
        ranged: profile.ranged,
        vex_consumed: report.vex,
        sneak_attack: false,
        maneuver,
    };

    if !hit {
        return result;
    }

    let damage_expr = if critical {
        profile.damage.with_doubled_dice()
    } else {
        profile.damage.clone()
    };
    result.damage = Some(damage_expr.roll_with(roller));
    let dice_multiplier = if critical { 2 } else { 1 };

    // Savage Attacks: one extra weapon die on a melee crit.
    if critical && !profile.ranged && profile.weapon.is_some() {
        if let Actor::Character(c) = &attacker.actor {
            if c.race.has_savage_attacks() {
                if let Some(die) = profile.damage.primary_die() {
                    result.bonus_damage.push(BonusDamage {
                        source: "Savage Attacks".to_string(),
                        roll: roll_dice(roller, 1, die),
                    });
                }
            }
        }
    }

    if let Some(dice) = sneak_attack_dice(attacker, profile, report.advantage, context) {
        result.sneak_attack = true;
        result.bonus_damage.push(BonusDamage {
            source: "Sneak Attack".to_string(),
            roll: roll_dice(roller, dice * dice_multiplier, DieType::D6),
        });
    }

    if let Some((m, die)) = context.maneuver {
        if matches!(
            m,
            Maneuver::TripAttack | Maneuver::PushingAttack | Maneuver::MenacingAttack
        ) {
            let extra = roll_dice(roller, dice_multiplier, die);
            result.maneuver = Some(ManeuverUse {
                maneuver: m,
                die_roll: extra.total.max(0) as u32,
            });
            result.bonus_damage.push(BonusDamage {
                source: m.name().to_string(),
                roll: extra,
            });
        }
    }

    result
}

/// Sneak Attack dice if every condition for it holds.
fn sneak_attack_dice(
    attacker: &Combatant,
    profile: &AttackProfile,
    advantage: Advantage,
    context: &AttackContext,
) -> Option<u32> {
    let Actor::Character(c) = &attacker.actor else {
        return None;
    };
    let dice = c.class.sneak_attack_dice(c.level);
    if dice == 0 || attacker.turn.sneak_attack_used {
        return None;
    }
    let weapon = profile.weapon.as_ref()?;
    if !(weapon.is_finesse() || profile.ranged) {
        return None;
    }
    let eligible = advantage == Advantage::Advantage
        || (context.ally_adjacent_to_target && advantage != Advantage::Disadvantage);
    eligible.then_some(dice)
}

// ============================================================================
// Saving Throws
// ============================================================================

/// What the save is against, for racial traits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveContext {
    pub against_condition: Option<Condition>,
    pub magical: bool,
    pub poison: bool,
}

impl SaveContext {
    pub fn magical() -> Self {
        Self {
            magical: true,
            ..Self::default()
        }
    }

    pub fn against(mut self, condition: Condition) -> Self {
        self.against_condition = Some(condition);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResult {
    pub ability: Ability,
    pub roll: D20Roll,
    pub dc: i32,
    pub success: bool,
    /// Failed without a meaningful roll (paralyzed, stunned, ...).
    pub auto_failed: bool,
}

fn racial_save_advantage(race: Race, ability: Ability, context: &SaveContext) -> bool {
    match race {
        Race::Elf => context.against_condition == Some(Condition::Charmed),
        Race::Dwarf => context.poison || context.against_condition == Some(Condition::Poisoned),
        Race::Gnome => context.magical && ability.is_mental(),
        _ => false,
    }
}

/// Roll a saving throw. Success iff total >= DC.
pub fn saving_throw(
    roller: &mut dyn DieRoller,
    combatant: &Combatant,
    ability: Ability,
    dc: i32,
    context: &SaveContext,
) -> SaveResult {
    let modifier = combatant.actor.saving_throw_modifier(ability);
    let auto_fail = matches!(ability, Ability::Strength | Ability::Dexterity)
        && combatant
            .conditions
            .iter()
            .any(|c| c.condition.fails_str_dex_saves());

    let mut adv = false;
    let mut dis = false;
    if let Actor::Character(c) = &combatant.actor {
        adv |= racial_save_advantage(c.race, ability, context);
    }
    if ability == Ability::Dexterity {
        adv |= combatant.has_condition(Condition::Dodging);
        dis |= combatant.has_condition(Condition::Restrained);
    }

    let roll = roll_d20(
        roller,
        Advantage::from_sources(adv, dis),
        modifier,
        combatant.actor.rerolls_natural_ones(),
    );
    let success = !auto_fail && roll.total >= dc;
    SaveResult {
        ability,
        roll,
        dc,
        success,
        auto_failed: auto_fail,
    }
}

/// DC for saves forced by weapon mastery: 8 + ability modifier + proficiency.
pub fn mastery_save_dc(actor: &Actor, ability_modifier: i32) -> i32 {
    8 + ability_modifier + actor.proficiency_bonus()
}

/// DC for battle-master maneuvers: 8 + proficiency + max(STR, DEX).
pub fn maneuver_save_dc(actor: &Actor) -> i32 {
    let best = actor
        .ability_modifier(Ability::Strength)
        .max(actor.ability_modifier(Ability::Dexterity));
    8 + actor.proficiency_bonus() + best
}

/// Superiority die for a battle master, if the combatant is one.
pub fn superiority_die(combatant: &Combatant) -> Option<DieType> {
    combatant
        .actor
        .as_character()
        .and_then(Character::superiority_dice)
        .map(|(die, _)| die)
}

// ============================================================================
// Death Saves and Initiative
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeathSaveResult {
    Success,
    Failure,
    /// Natural 20: back up with 1 HP.
    Revived,
    /// Natural 1: two failures.
    CriticalFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathSaveOutcome {
    pub roll: D20Roll,
    pub result: DeathSaveResult,
}

/// Flat d20 with no modifiers; 10 or higher succeeds.
pub fn death_save(roller: &mut dyn DieRoller, combatant: &Combatant) -> DeathSaveOutcome {
    let roll = roll_d20(
        roller,
        Advantage::Normal,
        0,
        combatant.actor.rerolls_natural_ones(),
    );
    let result = if roll.is_natural_20() {
        DeathSaveResult::Revived
    } else if roll.is_natural_1() {
        DeathSaveResult::CriticalFailure
    } else if roll.total >= 10 {
        DeathSaveResult::Success
    } else {
        DeathSaveResult::Failure
    };
    DeathSaveOutcome { roll, result }
}

/// d20 + DEX modifier.
pub fn roll_initiative(roller: &mut dyn DieRoller, combatant: &Combatant) -> D20Roll {
    roll_d20(
        roller,
        Advantage::Normal,
        combatant.actor.ability_modifier(Ability::Dexterity),
        combatant.actor.rerolls_natural_ones(),
    )
}

/// Healing from Second Wind: 1d10 + fighter level.
pub fn second_wind_dice(character: &Character) -> Option<DiceExpression> {
    (character.class == CharacterClass::Fighter)
        .then(|| DiceExpression::flat(character.level as i32).with_extra_dice(1, DieType::D10))
}
