//! Spell casting: target selection, per-target resolution, and zone planning.
//!
//! Casting happens in two steps. [`plan_cast`] validates the request against
//! the grid and roster and picks the affected creatures; [`resolve_cast`]
//! rolls everything. Neither mutates state.

use crate::aoe::affected_cells;
use crate::combat::{
    attack_advantage, can_target_with_spell, footprint_distance, saving_throw, SaveContext,
    SaveResult,
};
use crate::dice::{roll_d20, D20Roll, DiceExpression, DieRoller, RollResult};
use crate::error::CombatError;
use crate::geometry::{distance, Position};
use crate::grid::Grid;
use crate::spells::{SpellAttackType, SpellCondition, SpellData, SpellResolution, SpellTargeting, ZoneTemplate};
use crate::state::{Combatant, Zone};
use crate::world::{Ability, ActiveCondition, CombatantId, DamageType, RepeatSave};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What the caster aims a spell at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpellTarget {
    None,
    Creatures(Vec<CombatantId>),
    /// A cell: area center, or aim direction for cones and lines.
    Point(Position),
    /// Projectile counts per target.
    Projectiles(Vec<(CombatantId, u32)>),
}

/// Source tag shared by everything one casting creates.
pub fn spell_source(spell: &str, cast_number: u32, caster: &str) -> String {
    format!("{spell} [cast {cast_number} by {caster}]")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTarget {
    pub id: CombatantId,
    pub projectiles: u32,
}

/// A validated casting, ready to roll.
#[derive(Debug, Clone)]
pub struct CastPlan {
    pub spell: &'static SpellData,
    pub slot_level: u8,
    pub targeting: SpellTargeting,
    pub targets: Vec<PlannedTarget>,
    /// Area cells for area and zone spells.
    pub cells: BTreeSet<Position>,
}

/// Slot level a cast uses. Cantrips use none.
pub fn slot_level_for(spell: &SpellData, requested: Option<u8>) -> Result<u8, CombatError> {
    if spell.is_cantrip() {
        return Ok(0);
    }
    let level = requested.unwrap_or(spell.level);
    if level < spell.level || level > 9 {
        return Err(CombatError::InvalidTarget(format!(
            "{} cannot be cast with a level {level} slot",
            spell.name
        )));
    }
    Ok(level)
}

fn find<'a>(roster: &'a [Combatant], id: CombatantId) -> Result<&'a Combatant, CombatError> {
    roster
        .iter()
        .find(|c| c.id == id)
        .ok_or(CombatError::UnknownCombatant(id))
}

fn living_target<'a>(roster: &'a [Combatant], id: CombatantId) -> Result<&'a Combatant, CombatError> {
    let target = find(roster, id)?;
    if target.is_dead() {
        return Err(CombatError::InvalidTarget(format!("{} is dead", target.name())));
    }
    Ok(target)
}

/// Living creatures opposed to the caster with any footprint cell in the area.
pub fn combatants_in_area(
    roster: &[Combatant],
    caster: &Combatant,
    cells: &BTreeSet<Position>,
) -> Vec<CombatantId> {
    roster
        .iter()
        .filter(|c| c.id != caster.id && !c.is_dead())
        .filter(|c| c.side().is_opposed_to(caster.side()))
        .filter(|c| c.occupied_cells().iter().any(|p| cells.contains(p)))
        .map(|c| c.id)
        .collect()
}

/// Validate a cast request and choose its targets.
pub fn plan_cast(
    grid: &Grid,
    roster: &[Combatant],
    caster: &Combatant,
    spell: &'static SpellData,
    requested_slot: Option<u8>,
    target: &SpellTarget,
) -> Result<CastPlan, CombatError> {
    let character = caster
        .actor
        .as_character()
        .ok_or_else(|| CombatError::UnknownSpell(spell.name.clone()))?;
    let knows = character
        .spellcasting
        .as_ref()
        .is_some_and(|s| s.knows(&spell.name));
    if !knows {
        return Err(CombatError::UnknownSpell(spell.name.clone()));
    }
    if spell.resolution == SpellResolution::Reaction {
        return Err(CombatError::InvalidTarget(format!(
            "{} is only cast as a reaction",
            spell.name
        )));
    }

    let slot_level = slot_level_for(spell, requested_slot)?;
    let targeting = spell.effective_targeting(slot_level);
    let mut plan = CastPlan {
        spell,
        slot_level,
        targeting,
        targets: Vec::new(),
        cells: BTreeSet::new(),
    };

    match (targeting, target) {
        (SpellTargeting::SelfOnly, _) => {
            plan.targets.push(PlannedTarget {
                id: caster.id,
                projectiles: 0,
            });
        }
        (SpellTargeting::Creatures { range_ft, count }, SpellTarget::Creatures(ids)) => {
            if ids.is_empty() || ids.len() > count as usize {
                return Err(CombatError::InvalidTarget(format!(
                    "{} takes 1 to {count} targets",
                    spell.name
                )));
            }
            let mut seen = BTreeSet::new();
            for &id in ids {
                if !seen.insert(id) {
                    return Err(CombatError::InvalidTarget(format!(
                        "{id} targeted twice"
                    )));
                }
                let t = living_target(roster, id)?;
                can_target_with_spell(grid, caster, t, range_ft)?;
                plan.targets.push(PlannedTarget { id, projectiles: 0 });
            }
        }
        (SpellTargeting::Projectiles { range_ft, count }, SpellTarget::Projectiles(assigned)) => {
            let total: u32 = assigned.iter().map(|(_, n)| n).sum();
            if total != count {
                return Err(CombatError::InvalidTarget(format!(
                    "{} fires {count} projectiles, {total} assigned",
                    spell.name
                )));
            }
            for &(id, projectiles) in assigned.iter().filter(|(_, n)| *n > 0) {
                let t = living_target(roster, id)?;
                can_target_with_spell(grid, caster, t, range_ft)?;
                match plan.targets.iter_mut().find(|p| p.id == id) {
                    Some(existing) => existing.projectiles += projectiles,
                    None => plan.targets.push(PlannedTarget { id, projectiles }),
                }
            }
        }
        (
            SpellTargeting::Area {
                shape,
                size_ft,
                range_ft,
            },
            _,
        ) => {
            let origin = caster.position.ok_or_else(|| {
                CombatError::InvalidTarget(format!("{} is not on the grid", caster.name()))
            })?;
            let aim = match target {
                SpellTarget::Point(p) => Some(*p),
                _ => None,
            };
            plan.cells = match (range_ft, aim) {
                (None, Some(aim)) if shape.is_directional() => {
                    affected_cells(shape, size_ft, origin, aim)
                }
                (None, None) if shape.is_directional() => {
                    return Err(CombatError::InvalidTarget(format!(
                        "{} needs a direction",
                        spell.name
                    )));
                }
                // Self-range areas like Thunderwave's cube are centered on the caster.
                (None, _) => affected_cells(shape, size_ft, origin, origin),
                (Some(range), Some(point)) => {
                    let d = distance(origin, point);
                    if d > range {
                        return Err(CombatError::OutOfRange { distance: d, range });
                    }
                    if !grid.has_line_of_sight(origin, point) {
                        return Err(CombatError::NoLineOfSight);
                    }
                    affected_cells(shape, size_ft, origin, point)
                }
                (Some(_), None) => {
                    return Err(CombatError::InvalidTarget(format!(
                        "{} needs a target point",
                        spell.name
                    )));
                }
            };
            if spell.resolution != SpellResolution::Zone {
                plan.targets = combatants_in_area(roster, caster, &plan.cells)
                    .into_iter()
                    .map(|id| PlannedTarget { id, projectiles: 0 })
                    .collect();
            }
        }
        (_, _) => {
            return Err(CombatError::InvalidTarget(format!(
                "wrong kind of target for {}",
                spell.name
            )));
        }
    }

    Ok(plan)
}

// ============================================================================
// Resolution
// ============================================================================

/// How a spell was checked against one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpellCheck {
    Attack {
        roll: D20Roll,
        hit: bool,
        critical: bool,
    },
    Save(SaveResult),
    AutoHit,
}

impl SpellCheck {
    /// The spell's payload lands in full.
    pub fn landed(&self) -> bool {
        match self {
            SpellCheck::Attack { hit, .. } => *hit,
            SpellCheck::Save(save) => !save.success,
            SpellCheck::AutoHit => true,
        }
    }
}

/// Everything a spell does to one creature, for the engine to apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellHit {
    pub target: CombatantId,
    pub check: SpellCheck,
    pub damage: i32,
    pub damage_type: Option<DamageType>,
    pub damage_roll: Option<RollResult>,
    pub critical: bool,
    pub healing: i32,
    pub condition: Option<ActiveCondition>,
}

impl SpellHit {
    fn new(target: CombatantId, check: SpellCheck) -> Self {
        Self {
            target,
            check,
            damage: 0,
            damage_type: None,
            damage_roll: None,
            critical: false,
            healing: 0,
            condition: None,
        }
    }
}

/// Build the condition a spell inflicts, tagged with the casting's source.
pub fn spell_condition(
    spell_condition: &SpellCondition,
    save_ability: Option<Ability>,
    dc: i32,
    source: &str,
    caster: CombatantId,
) -> ActiveCondition {
    let mut condition = ActiveCondition::new(spell_condition.condition).with_source(source);
    if let Some(rounds) = spell_condition.duration_rounds {
        condition = condition.with_duration(rounds);
    }
    if let Some(ability) = save_ability {
        if spell_condition.repeat_at_end_of_turn || spell_condition.repeat_on_damage {
            condition = condition.with_repeat_save(RepeatSave {
                ability,
                dc,
                at_end_of_turn: spell_condition.repeat_at_end_of_turn,
                on_damage: spell_condition.repeat_on_damage,
                upgrade_on_fail: spell_condition.upgrade_on_fail,
            });
        }
    }
    if spell_condition.ends_on_damage {
        condition = condition.ending_on_damage();
    }
    if spell_condition.until_caster_turn {
        condition = condition.until_turn_start_of(caster);
    }
    condition
}

fn halved(damage: i32) -> i32 {
    damage / 2
}

/// Roll a validated cast against every planned target.
pub fn resolve_cast(
    roller: &mut dyn DieRoller,
    plan: &CastPlan,
    caster: &Combatant,
    roster: &[Combatant],
    source: &str,
    round: u32,
) -> Result<Vec<SpellHit>, CombatError> {
    let spell = plan.spell;
    let Some(character) = caster.actor.as_character() else {
        return Err(CombatError::UnknownSpell(spell.name.clone()));
    };
    let dc = character.spell_save_dc().unwrap_or(10);
    let attack_bonus = character.spell_attack_bonus().unwrap_or(0);
    let casting_mod = character
        .spellcasting
        .as_ref()
        .map_or(0, |s| character.ability_scores.modifier(s.ability));
    let damage_dice = spell.effective_damage_dice(character.level, plan.slot_level);
    let is_area = matches!(plan.targeting, SpellTargeting::Area { .. });

    let mut hits = Vec::new();
    match spell.resolution {
        SpellResolution::Attack(kind) => {
            for planned in &plan.targets {
                let target = find(roster, planned.id)?;
                let distance_ft = footprint_distance(caster, target).unwrap_or(0);
                let report = attack_advantage(
                    caster,
                    target,
                    kind == SpellAttackType::Ranged,
                    distance_ft,
                    false,
                    round,
                );
                let roll = roll_d20(
                    roller,
                    report.advantage,
                    attack_bonus,
                    caster.actor.rerolls_natural_ones(),
                );
                let critical = roll.is_natural_20();
                let hit = critical || (!roll.is_natural_1() && roll.total >= target.actor.armor_class());
                let mut result = SpellHit::new(
                    planned.id,
                    SpellCheck::Attack {
                        roll,
                        hit,
                        critical,
                    },
                );
                result.critical = critical;
                if hit {
                    if let Some(dice) = &damage_dice {
                        let dice = if critical { dice.with_doubled_dice() } else { dice.clone() };
                        let rolled = dice.roll_with(roller);
                        result.damage = rolled.non_negative_total();
                        result.damage_roll = Some(rolled);
                        result.damage_type = spell.damage_type;
                    }
                    result.condition = spell
                        .condition
                        .as_ref()
                        .map(|c| spell_condition(c, None, dc, source, caster.id));
                }
                hits.push(result);
            }
        }
        SpellResolution::Save {
            ability,
            half_on_success,
        } => {
            // Area spells roll damage once for everyone caught in them.
            let shared = match (&damage_dice, is_area) {
                (Some(dice), true) => Some(dice.roll_with(roller)),
                _ => None,
            };
            let half = half_on_success && !spell.is_pure_condition();
            let against = spell.condition.as_ref().map(|c| c.condition);
            for planned in &plan.targets {
                let target = find(roster, planned.id)?;
                let mut ctx = SaveContext::magical();
                if let Some(condition) = against {
                    ctx = ctx.against(condition);
                }
                let save = saving_throw(roller, target, ability, dc, &ctx);
                let success = save.success;
                let mut result = SpellHit::new(planned.id, SpellCheck::Save(save));
                let rolled = match (&shared, &damage_dice) {
                    (Some(r), _) => Some(r.clone()),
                    (None, Some(dice)) => Some(dice.roll_with(roller)),
                    (None, None) => None,
                };
                if let Some(rolled) = rolled {
                    let full = rolled.non_negative_total();
                    result.damage = match (success, half) {
                        (false, _) => full,
                        (true, true) => halved(full),
                        (true, false) => 0,
                    };
                    result.damage_roll = Some(rolled);
                    result.damage_type = spell.damage_type;
                }
                if !success {
                    result.condition = spell
                        .condition
                        .as_ref()
                        .map(|c| spell_condition(c, Some(ability), dc, source, caster.id));
                }
                hits.push(result);
            }
        }
        SpellResolution::AutoHit => {
            for planned in &plan.targets {
                let mut result = SpellHit::new(planned.id, SpellCheck::AutoHit);
                if let Some(dice) = &damage_dice {
                    let count = planned.projectiles.max(1);
                    let mut total = 0;
                    let mut last = None;
                    for _ in 0..count {
                        let rolled = dice.roll_with(roller);
                        total += rolled.non_negative_total();
                        last = Some(rolled);
                    }
                    result.damage = total;
                    result.damage_roll = last;
                    result.damage_type = spell.damage_type;
                }
                hits.push(result);
            }
        }
        SpellResolution::Healing => {
            let dice = spell
                .effective_healing_dice(plan.slot_level)
                .unwrap_or_else(|| DiceExpression::flat(0))
                .plus(casting_mod);
            for planned in &plan.targets {
                let mut result = SpellHit::new(planned.id, SpellCheck::AutoHit);
                let rolled = dice.roll_with(roller);
                result.healing = rolled.non_negative_total();
                result.damage_roll = Some(rolled);
                hits.push(result);
            }
        }
        SpellResolution::Zone | SpellResolution::Reaction => {}
    }
    Ok(hits)
}

/// The zone a zone spell leaves behind.
pub fn plan_zone(
    id: u32,
    template: &ZoneTemplate,
    cells: BTreeSet<Position>,
    caster: CombatantId,
    source: &str,
    save_dc: Option<i32>,
) -> Zone {
    Zone {
        id,
        kind: template.kind,
        cells,
        caster,
        source: source.to_string(),
        save: template.save,
        save_dc: template.save.and(save_dc),
        obscures: template.obscures,
        difficult_terrain: template.difficult_terrain,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::ScriptedDice;
    use crate::spells::get_spell;
    use crate::testing::{sample_fighter, sample_goblin, sample_wizard};
    use crate::world::{Actor, Condition};

    fn wizard_at(x: i32, y: i32) -> Combatant {
        let mut c = Combatant::new(Actor::Character(Box::new(sample_wizard())));
        c.position = Some(Position::new(x, y));
        c
    }

    fn goblin_at(x: i32, y: i32) -> Combatant {
        let mut c = Combatant::new(Actor::Monster(Box::new(sample_goblin())));
        c.position = Some(Position::new(x, y));
        c
    }

    #[test]
    fn test_source_tag() {
        assert_eq!(
            spell_source("Hold Person", 3, "Ilse"),
            "Hold Person [cast 3 by Ilse]"
        );
    }

    #[test]
    fn test_slot_level_rules() {
        let fireball = get_spell("Fireball").unwrap();
        assert_eq!(slot_level_for(fireball, None).unwrap(), 3);
        assert_eq!(slot_level_for(fireball, Some(5)).unwrap(), 5);
        assert!(slot_level_for(fireball, Some(2)).is_err());
        let fire_bolt = get_spell("Fire Bolt").unwrap();
        assert_eq!(slot_level_for(fire_bolt, Some(3)).unwrap(), 0);
    }

    #[test]
    fn test_burning_hands_hits_only_enemies_in_cone() {
        let grid = Grid::new(20, 20);
        let wizard = wizard_at(5, 5);
        let in_cone = goblin_at(7, 5);
        let behind = goblin_at(3, 5);
        let mut ally = Combatant::new(Actor::Character(Box::new(sample_fighter())));
        ally.position = Some(Position::new(6, 5));
        let roster = vec![wizard.clone(), in_cone.clone(), behind, ally];
        let spell = get_spell("Burning Hands").unwrap();
        let plan = plan_cast(
            &grid,
            &roster,
            &wizard,
            spell,
            None,
            &SpellTarget::Point(Position::new(10, 5)),
        )
        .unwrap();
        assert_eq!(plan.cells.len(), 6);
        assert_eq!(plan.targets, vec![PlannedTarget { id: in_cone.id, projectiles: 0 }]);
    }

    #[test]
    fn test_thunderwave_centers_on_caster() {
        let grid = Grid::new(20, 20);
        let wizard = wizard_at(5, 5);
        let adjacent = goblin_at(4, 6);
        let distant = goblin_at(8, 5);
        let roster = vec![wizard.clone(), adjacent.clone(), distant];
        let spell = get_spell("Thunderwave").unwrap();
        // A point elsewhere does not move a self-range cube.
        let plan = plan_cast(&grid, &roster, &wizard, spell, None, &SpellTarget::Point(Position::new(12, 12))).unwrap();
        assert_eq!(plan.cells.len(), 9);
        assert!(plan.cells.contains(&Position::new(4, 4)));
        assert!(plan.cells.contains(&Position::new(6, 6)));
        assert_eq!(plan.targets, vec![PlannedTarget { id: adjacent.id, projectiles: 0 }]);

        let untargeted = plan_cast(&grid, &roster, &wizard, spell, None, &SpellTarget::None).unwrap();
        assert_eq!(untargeted.cells, plan.cells);
    }

    #[test]
    fn test_area_save_half_damage() {
        let grid = Grid::new(20, 20);
        let wizard = wizard_at(5, 5);
        let a = goblin_at(7, 5);
        let b = goblin_at(8, 5);
        let roster = vec![wizard.clone(), a.clone(), b.clone()];
        let spell = get_spell("Burning Hands").unwrap();
        let plan = plan_cast(&grid, &roster, &wizard, spell, None, &SpellTarget::Point(Position::new(10, 5))).unwrap();
        // Damage 3d6 rolled once, then a failed and a successful DEX save.
        let mut dice = ScriptedDice::new([4, 4, 4, 2, 19]);
        let hits = resolve_cast(&mut dice, &plan, &wizard, &roster, "src", 1).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].damage, 12);
        assert_eq!(hits[1].damage, 6);
    }

    #[test]
    fn test_fireball_out_of_range() {
        let grid = Grid::new(60, 5);
        let wizard = wizard_at(0, 0);
        let roster = vec![wizard.clone()];
        let spell = get_spell("Fireball").unwrap();
        let result = plan_cast(&grid, &roster, &wizard, spell, None, &SpellTarget::Point(Position::new(40, 0)));
        assert!(matches!(result, Err(CombatError::OutOfRange { distance: 200, range: 150 })));
    }

    #[test]
    fn test_magic_missile_distribution() {
        let grid = Grid::new(20, 20);
        let wizard = wizard_at(0, 0);
        let a = goblin_at(5, 0);
        let b = goblin_at(6, 0);
        let roster = vec![wizard.clone(), a.clone(), b.clone()];
        let spell = get_spell("Magic Missile").unwrap();

        let wrong = plan_cast(&grid, &roster, &wizard, spell, None, &SpellTarget::Projectiles(vec![(a.id, 2)]));
        assert!(matches!(wrong, Err(CombatError::InvalidTarget(_))));

        let plan = plan_cast(
            &grid,
            &roster,
            &wizard,
            spell,
            Some(2),
            &SpellTarget::Projectiles(vec![(a.id, 3), (b.id, 1)]),
        )
        .unwrap();
        let mut dice = ScriptedDice::new([1, 2, 3, 4]);
        let hits = resolve_cast(&mut dice, &plan, &wizard, &roster, "src", 1).unwrap();
        assert_eq!(hits[0].damage, 2 + 3 + 4);
        assert_eq!(hits[1].damage, 5);
    }

    #[test]
    fn test_hold_person_condition_carries_repeat_save() {
        let grid = Grid::new(20, 20);
        let wizard = wizard_at(0, 0);
        let target = goblin_at(3, 0);
        let roster = vec![wizard.clone(), target.clone()];
        let spell = get_spell("Hold Person").unwrap();
        let plan = plan_cast(&grid, &roster, &wizard, spell, None, &SpellTarget::Creatures(vec![target.id])).unwrap();
        let mut dice = ScriptedDice::new([2]);
        let hits = resolve_cast(&mut dice, &plan, &wizard, &roster, "Hold Person [cast 1 by Ilse]", 1).unwrap();
        let condition = hits[0].condition.clone().unwrap();
        assert_eq!(condition.condition, Condition::Paralyzed);
        assert_eq!(condition.source.as_deref(), Some("Hold Person [cast 1 by Ilse]"));
        let repeat = condition.repeat_save.unwrap();
        assert!(repeat.at_end_of_turn);
        assert_eq!(repeat.ability, Ability::Wisdom);
        assert_eq!(hits[0].damage, 0);
    }

    #[test]
    fn test_fire_bolt_crit_doubles_dice() {
        let grid = Grid::new(20, 20);
        let wizard = wizard_at(0, 0);
        let target = goblin_at(3, 0);
        let roster = vec![wizard.clone(), target.clone()];
        let spell = get_spell("Fire Bolt").unwrap();
        let plan = plan_cast(&grid, &roster, &wizard, spell, None, &SpellTarget::Creatures(vec![target.id])).unwrap();
        // Level 5 wizard: 2d10, doubled to 4d10.
        let mut dice = ScriptedDice::new([20, 1, 2, 3, 4]);
        let hits = resolve_cast(&mut dice, &plan, &wizard, &roster, "src", 1).unwrap();
        assert!(hits[0].critical);
        assert_eq!(hits[0].damage, 10);
    }

    #[test]
    fn test_unknown_spell_rejected() {
        let grid = Grid::new(5, 5);
        let mut fighter = Combatant::new(Actor::Character(Box::new(sample_fighter())));
        fighter.position = Some(Position::new(0, 0));
        let spell = get_spell("Fireball").unwrap();
        let result = plan_cast(&grid, &[fighter.clone()], &fighter, spell, None, &SpellTarget::Point(Position::new(2, 2)));
        assert!(matches!(result, Err(CombatError::UnknownSpell(_))));
    }
}
