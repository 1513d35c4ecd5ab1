//! Weapon mastery effects.
//!
//! Each effect is computed against a read-only view of the fight and
//! returned as a [`MasteryResult`]. The engine applies it.

use crate::combat::{footprint_distance, mastery_save_dc, saving_throw, AttackProfile, SaveContext, SaveResult};
use crate::dice::DieRoller;
use crate::geometry::{Direction8, Position, FEET_PER_CELL};
use crate::grid::Grid;
use crate::size::CreatureSize;
use crate::state::Combatant;
use crate::world::{Ability, Actor, CombatantId, MasteryProperty};
use serde::{Deserialize, Serialize};

/// Squares moved by the Push mastery.
pub const PUSH_SQUARES: u32 = 2;

/// Speed lost to the Slow mastery.
pub const SLOW_REDUCTION_FT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MasteryEffect {
    /// Target has disadvantage on its next attack.
    Sap,
    /// Attacker has advantage on its next attack against the target.
    Vex { expires_round: u32 },
    Push {
        from: Position,
        to: Position,
        squares: u32,
        blocked: bool,
    },
    Slow { reduction_ft: u32 },
    Topple { save: SaveResult, prone: bool },
    Graze { damage: i32 },
    /// Creatures the attacker may follow up on.
    Cleave { candidates: Vec<CombatantId> },
    /// The extra light-weapon attack can be made without a bonus action.
    Nick { available: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasteryResult {
    pub mastery: MasteryProperty,
    pub applied: bool,
    pub effect: MasteryEffect,
}

impl MasteryResult {
    fn new(mastery: MasteryProperty, applied: bool, effect: MasteryEffect) -> Self {
        Self {
            mastery,
            applied,
            effect,
        }
    }

    /// One-line narration for the combat log.
    pub fn describe(&self, target: &str) -> String {
        match &self.effect {
            MasteryEffect::Sap => format!("{target} is sapped"),
            MasteryEffect::Vex { .. } => format!("{target} is vexed"),
            MasteryEffect::Push { blocked: true, .. } => format!("{target} cannot be pushed"),
            MasteryEffect::Push { to, squares, .. } => {
                format!("{target} is pushed {} ft to {to}", squares * FEET_PER_CELL)
            }
            MasteryEffect::Slow { reduction_ft } => {
                format!("{target}'s speed drops by {reduction_ft} ft")
            }
            MasteryEffect::Topple { prone: true, .. } => format!("{target} is knocked prone"),
            MasteryEffect::Topple { .. } => format!("{target} keeps its footing"),
            MasteryEffect::Graze { damage } => format!("graze deals {damage} to {target}"),
            MasteryEffect::Cleave { candidates } => {
                format!("cleave can follow through to {} creature(s)", candidates.len())
            }
            MasteryEffect::Nick { available } => {
                if *available {
                    "nick: off-hand attack needs no bonus action".to_string()
                } else {
                    "nick already used this turn".to_string()
                }
            }
        }
    }
}

/// Read-only view of the fight a mastery effect needs.
#[derive(Clone, Copy)]
pub struct MasteryContext<'a> {
    pub grid: &'a Grid,
    pub roster: &'a [Combatant],
    pub round: u32,
}

/// The mastery property the attacker may use with this attack, if any.
pub fn usable_mastery(attacker: &Combatant, profile: &AttackProfile) -> Option<MasteryProperty> {
    let Actor::Character(character) = &attacker.actor else {
        return None;
    };
    let weapon = profile.weapon.as_ref()?;
    let mastery = weapon.mastery?;
    character.has_mastered(&weapon.id).then_some(mastery)
}

/// Resolve the weapon's mastery after an attack roll.
///
/// Graze only triggers on a miss, Nick on either outcome, everything else
/// on a hit.
pub fn resolve_mastery(
    roller: &mut dyn DieRoller,
    ctx: MasteryContext<'_>,
    attacker: &Combatant,
    target: &Combatant,
    profile: &AttackProfile,
    hit: bool,
) -> Option<MasteryResult> {
    let mastery = usable_mastery(attacker, profile)?;
    let result = match (mastery, hit) {
        (MasteryProperty::Sap, true) => MasteryResult::new(mastery, true, MasteryEffect::Sap),
        (MasteryProperty::Vex, true) => MasteryResult::new(
            mastery,
            true,
            MasteryEffect::Vex {
                expires_round: ctx.round + 1,
            },
        ),
        (MasteryProperty::Push, true) => push_effect(ctx.grid, attacker, target)?,
        (MasteryProperty::Slow, true) => MasteryResult::new(
            mastery,
            true,
            MasteryEffect::Slow {
                reduction_ft: SLOW_REDUCTION_FT,
            },
        ),
        (MasteryProperty::Topple, true) => {
            let dc = mastery_save_dc(&attacker.actor, profile.ability_modifier);
            let save = saving_throw(
                roller,
                target,
                Ability::Constitution,
                dc,
                &SaveContext::default(),
            );
            let prone = !save.success;
            MasteryResult::new(mastery, prone, MasteryEffect::Topple { save, prone })
        }
        (MasteryProperty::Graze, false) => {
            let damage = profile.ability_modifier.max(0);
            MasteryResult::new(mastery, damage > 0, MasteryEffect::Graze { damage })
        }
        (MasteryProperty::Cleave, true) => {
            let candidates = cleave_candidates(ctx.roster, attacker, target, profile);
            MasteryResult::new(
                mastery,
                !candidates.is_empty(),
                MasteryEffect::Cleave { candidates },
            )
        }
        (MasteryProperty::Nick, _) => {
            let available = profile.is_light() && !attacker.turn.nick_used;
            MasteryResult::new(mastery, available, MasteryEffect::Nick { available })
        }
        _ => return None,
    };
    Some(result)
}

fn push_effect(grid: &Grid, attacker: &Combatant, target: &Combatant) -> Option<MasteryResult> {
    let from = target.position?;
    let direction = attacker.position.and_then(|a| Direction8::snap(a, from));
    let too_big = target.size() > CreatureSize::Large;
    let (to, squares) = match direction {
        Some(dir) if !too_big => push_destination(grid, target, dir, PUSH_SQUARES),
        _ => (from, 0),
    };
    Some(MasteryResult::new(
        MasteryProperty::Push,
        squares > 0,
        MasteryEffect::Push {
            from,
            to,
            squares,
            blocked: squares == 0,
        },
    ))
}

/// Slide a combatant up to `squares` cells in `direction`.
///
/// Stops at the first cell its footprint cannot occupy (edge of the map,
/// obstacles, other creatures, or an elevation change). Returns the final
/// anchor and how many squares it actually moved.
pub fn push_destination(
    grid: &Grid,
    target: &Combatant,
    direction: Direction8,
    squares: u32,
) -> (Position, u32) {
    let Some(start) = target.position else {
        return (Position::new(0, 0), 0);
    };
    let footprint = target.footprint();
    let level = grid.elevation(start);
    let mut current = start;
    let mut moved = 0;
    while moved < squares {
        let next = current.step(direction);
        if grid.elevation(next) != level
            || !grid.footprint_clear(next, footprint, Some(target.id), false)
        {
            break;
        }
        current = next;
        moved += 1;
    }
    (current, moved)
}

/// Living enemies within 5 ft of the original target and within the
/// attacker's reach, in roster order.
pub fn cleave_candidates(
    roster: &[Combatant],
    attacker: &Combatant,
    target: &Combatant,
    profile: &AttackProfile,
) -> Vec<CombatantId> {
    roster
        .iter()
        .filter(|c| {
            c.id != target.id
                && c.id != attacker.id
                && c.side().is_opposed_to(attacker.side())
                && !c.is_dead()
                && c.current_hp > 0
        })
        .filter(|c| {
            footprint_distance(c, target).is_some_and(|d| d <= FEET_PER_CELL)
                && footprint_distance(attacker, c).is_some_and(|d| d <= profile.reach_ft)
        })
        .map(|c| c.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combat::AttackSource;
    use crate::dice::ScriptedDice;
    use crate::grid::Obstacle;
    use crate::items::get_weapon;
    use crate::testing::{sample_fighter, sample_goblin, sample_ogre};
    use crate::world::Character;

    fn wielder(weapon: &str) -> Combatant {
        let mut fighter: Character = sample_fighter();
        let w = get_weapon(weapon).unwrap();
        fighter.mastered_weapons = vec![w.id.clone()];
        fighter.weapons = vec![w];
        let mut c = Combatant::new(Actor::Character(Box::new(fighter)));
        c.position = Some(Position::new(2, 2));
        c
    }

    fn goblin_at(x: i32, y: i32) -> Combatant {
        let mut g = Combatant::new(Actor::Monster(Box::new(sample_goblin())));
        g.position = Some(Position::new(x, y));
        g
    }

    fn profile(c: &Combatant, weapon: &str) -> AttackProfile {
        AttackProfile::for_source(&c.actor, &AttackSource::Weapon(weapon.into())).unwrap()
    }

    fn place(grid: &mut Grid, roster: &[Combatant]) {
        for c in roster {
            if let Some(p) = c.position {
                grid.occupy(c.id, p, c.footprint());
            }
        }
    }

    #[test]
    fn test_unmastered_weapon_has_no_effect() {
        let mut attacker = wielder("warhammer");
        if let Actor::Character(c) = &mut attacker.actor {
            c.mastered_weapons.clear();
        }
        let target = goblin_at(3, 2);
        let grid = Grid::new(10, 10);
        let ctx = MasteryContext { grid: &grid, roster: &[], round: 1 };
        let p = profile(&attacker, "warhammer");
        let mut dice = ScriptedDice::default();
        assert!(resolve_mastery(&mut dice, ctx, &attacker, &target, &p, true).is_none());
    }

    #[test]
    fn test_push_moves_two_squares_away() {
        let attacker = wielder("warhammer");
        let target = goblin_at(3, 2);
        let mut grid = Grid::new(10, 10);
        let roster = vec![attacker.clone(), target.clone()];
        place(&mut grid, &roster);
        let ctx = MasteryContext { grid: &grid, roster: &roster, round: 1 };
        let p = profile(&attacker, "warhammer");
        let mut dice = ScriptedDice::default();
        let result = resolve_mastery(&mut dice, ctx, &attacker, &target, &p, true).unwrap();
        assert!(result.applied);
        assert_eq!(
            result.effect,
            MasteryEffect::Push {
                from: Position::new(3, 2),
                to: Position::new(5, 2),
                squares: 2,
                blocked: false,
            }
        );
    }

    #[test]
    fn test_push_partial_and_blocked() {
        let attacker = wielder("warhammer");
        let target = goblin_at(3, 2);
        let mut grid = Grid::new(10, 10);
        grid.set_obstacle(Position::new(5, 2), Some(Obstacle::wall()));
        let (to, moved) = push_destination(&grid, &target, Direction8::E, 2);
        assert_eq!((to, moved), (Position::new(4, 2), 1));

        grid.set_obstacle(Position::new(4, 2), Some(Obstacle::wall()));
        let roster = vec![attacker.clone(), target.clone()];
        let ctx = MasteryContext { grid: &grid, roster: &roster, round: 1 };
        let p = profile(&attacker, "warhammer");
        let mut dice = ScriptedDice::default();
        let result = resolve_mastery(&mut dice, ctx, &attacker, &target, &p, true).unwrap();
        assert!(!result.applied);
        assert!(matches!(result.effect, MasteryEffect::Push { blocked: true, squares: 0, .. }));
    }

    #[test]
    fn test_push_stops_at_grid_edge() {
        let target = goblin_at(9, 2);
        let grid = Grid::new(10, 10);
        assert_eq!(
            push_destination(&grid, &target, Direction8::E, 2),
            (Position::new(9, 2), 0)
        );
    }

    #[test]
    fn test_graze_only_on_miss() {
        let attacker = wielder("greatsword");
        let target = goblin_at(3, 2);
        let grid = Grid::new(10, 10);
        let ctx = MasteryContext { grid: &grid, roster: &[], round: 1 };
        let p = profile(&attacker, "greatsword");
        let mut dice = ScriptedDice::default();
        let miss = resolve_mastery(&mut dice, ctx, &attacker, &target, &p, false).unwrap();
        assert_eq!(miss.effect, MasteryEffect::Graze { damage: 3 });
        assert!(resolve_mastery(&mut dice, ctx, &attacker, &target, &p, true).is_none());
    }

    #[test]
    fn test_topple_save() {
        let attacker = wielder("maul");
        let target = goblin_at(3, 2);
        let grid = Grid::new(10, 10);
        let ctx = MasteryContext { grid: &grid, roster: &[], round: 1 };
        let p = profile(&attacker, "maul");
        // DC 8 + 3 + 2 = 13; goblin CON +0.
        let mut dice = ScriptedDice::new([5, 18]);
        let failed = resolve_mastery(&mut dice, ctx, &attacker, &target, &p, true).unwrap();
        assert!(failed.applied);
        let saved = resolve_mastery(&mut dice, ctx, &attacker, &target, &p, true).unwrap();
        assert!(!saved.applied);
        assert!(matches!(saved.effect, MasteryEffect::Topple { prone: false, .. }));
    }

    #[test]
    fn test_cleave_candidates() {
        let attacker = wielder("greataxe");
        let target = goblin_at(3, 2);
        let beside = goblin_at(3, 3);
        let far = goblin_at(6, 6);
        let roster = vec![attacker.clone(), target.clone(), beside.clone(), far];
        let mut grid = Grid::new(10, 10);
        place(&mut grid, &roster);
        let ctx = MasteryContext { grid: &grid, roster: &roster, round: 1 };
        let p = profile(&attacker, "greataxe");
        let mut dice = ScriptedDice::default();
        let result = resolve_mastery(&mut dice, ctx, &attacker, &target, &p, true).unwrap();
        assert_eq!(
            result.effect,
            MasteryEffect::Cleave {
                candidates: vec![beside.id]
            }
        );
    }

    #[test]
    fn test_vex_and_sap() {
        let attacker = wielder("shortsword");
        let target = goblin_at(3, 2);
        let grid = Grid::new(10, 10);
        let ctx = MasteryContext { grid: &grid, roster: &[], round: 4 };
        let p = profile(&attacker, "shortsword");
        let mut dice = ScriptedDice::default();
        let vex = resolve_mastery(&mut dice, ctx, &attacker, &target, &p, true).unwrap();
        assert_eq!(vex.effect, MasteryEffect::Vex { expires_round: 5 });

        let attacker = wielder("longsword");
        let p = profile(&attacker, "longsword");
        let sap = resolve_mastery(&mut dice, ctx, &attacker, &target, &p, true).unwrap();
        assert_eq!(sap.effect, MasteryEffect::Sap);
    }

    #[test]
    fn test_nick_once_per_turn() {
        let mut attacker = wielder("dagger");
        let target = goblin_at(3, 2);
        let grid = Grid::new(10, 10);
        let ctx = MasteryContext { grid: &grid, roster: &[], round: 1 };
        let p = profile(&attacker, "dagger");
        let mut dice = ScriptedDice::default();
        let first = resolve_mastery(&mut dice, ctx, &attacker, &target, &p, false).unwrap();
        assert_eq!(first.effect, MasteryEffect::Nick { available: true });
        attacker.turn.nick_used = true;
        let second = resolve_mastery(&mut dice, ctx, &attacker, &target, &p, true).unwrap();
        assert!(!second.applied);
    }

    #[test]
    fn test_huge_target_cannot_be_pushed() {
        let attacker = wielder("warhammer");
        let mut ogre = Combatant::new(Actor::Monster(Box::new(sample_ogre())));
        ogre.position = Some(Position::new(3, 2));
        ogre.conditions.push(crate::world::ActiveCondition::new(crate::world::Condition::Enlarged));
        let grid = Grid::new(10, 10);
        let ctx = MasteryContext { grid: &grid, roster: &[], round: 1 };
        let p = profile(&attacker, "warhammer");
        let mut dice = ScriptedDice::default();
        let result = resolve_mastery(&mut dice, ctx, &attacker, &ogre, &p, true).unwrap();
        assert!(!result.applied);
    }
}
