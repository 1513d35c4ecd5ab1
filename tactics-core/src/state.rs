//! Combat state: the roster, turn order, phase, and in-flight activity.
//!
//! Only [`crate::engine::CombatEngine`] mutates this. Everything else reads it.

use crate::combat::AttackResult;
use crate::geometry::Position;
use crate::grid::Grid;
use crate::log::{CombatLog, LogKind};
use crate::size::{occupied_cells, CreatureSize};
use crate::spells::{ZoneKind, ZoneSave};
use crate::world::{
    ActiveCondition, Actor, CombatantId, Condition, DeathSaves, Maneuver, Side,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Named counters in `class_feature_uses` / `racial_ability_uses`.
pub mod features {
    pub const SUPERIORITY_DICE: &str = "superiority_dice";
    pub const ACTION_SURGE: &str = "action_surge";
    pub const SECOND_WIND: &str = "second_wind";
    pub const RELENTLESS_ENDURANCE: &str = "relentless_endurance";

    /// Counter for spell slots of one level.
    pub fn spell_slot(level: u8) -> String {
        format!("spell_slot_{level}")
    }
}

// ============================================================================
// Phase
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Setup,
    Initiative,
    Combat,
    Victory,
    Defeat,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Setup => "setup",
            Phase::Initiative => "initiative",
            Phase::Combat => "combat",
            Phase::Victory => "victory",
            Phase::Defeat => "defeat",
        }
    }

    pub fn is_over(&self) -> bool {
        matches!(self, Phase::Victory | Phase::Defeat)
    }
}

// ============================================================================
// Combatants
// ============================================================================

/// Per-turn action economy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnFlags {
    pub has_acted: bool,
    pub has_bonus_acted: bool,
    pub has_reacted: bool,
    pub attacks_made_this_turn: u32,
    /// Attacks left in the current Attack action.
    pub attacks_remaining: u32,
    pub movement_used: u32,
    pub dashes: u32,
    /// A light weapon attack was made with the Attack action.
    pub light_attack_made: bool,
    pub nick_used: bool,
    pub cleave_used: bool,
    pub cleave_candidates: Vec<CombatantId>,
    pub sneak_attack_used: bool,
}

impl TurnFlags {
    /// Clear everything spent during a turn. The reaction refreshes separately.
    pub fn reset_for_turn_end(&mut self) {
        let has_reacted = self.has_reacted;
        *self = TurnFlags {
            has_reacted,
            ..TurnFlags::default()
        };
    }
}

/// Advantage granted by Vex on the next attack against `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VexMark {
    pub target: CombatantId,
    pub expires_round: u32,
}

/// The spell a caster is concentrating on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concentration {
    pub spell: String,
    /// Source tag shared by every condition and zone from this casting.
    pub source: String,
}

/// A creature on the roster with its mutable combat state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    pub id: CombatantId,
    pub actor: Actor,
    pub current_hp: i32,
    pub max_hp: i32,
    pub temporary_hp: i32,
    /// Footprint anchor (top-left cell).
    pub position: Option<Position>,
    pub initiative: Option<i32>,
    pub conditions: Vec<ActiveCondition>,
    pub turn: TurnFlags,
    pub vex: Option<VexMark>,
    pub racial_ability_uses: HashMap<String, u32>,
    pub class_feature_uses: HashMap<String, u32>,
    pub death_saves: DeathSaves,
    pub is_stable: bool,
    pub concentration: Option<Concentration>,
    /// Standing in a space only the squeeze footprint fits.
    pub squeezing: bool,
}

impl Combatant {
    pub fn new(actor: Actor) -> Self {
        let max_hp = actor.max_hp();
        let mut combatant = Self {
            id: CombatantId::new(),
            actor,
            current_hp: max_hp,
            max_hp,
            temporary_hp: 0,
            position: None,
            initiative: None,
            conditions: Vec::new(),
            turn: TurnFlags::default(),
            vex: None,
            racial_ability_uses: HashMap::new(),
            class_feature_uses: HashMap::new(),
            death_saves: DeathSaves::default(),
            is_stable: false,
            concentration: None,
            squeezing: false,
        };
        combatant.restore_resources();
        combatant
    }

    /// Refill per-combat feature counters from the stat block.
    pub fn restore_resources(&mut self) {
        self.class_feature_uses.clear();
        self.racial_ability_uses.clear();
        if let Actor::Character(c) = &self.actor {
            if let Some((_, count)) = c.superiority_dice() {
                self.class_feature_uses
                    .insert(features::SUPERIORITY_DICE.to_string(), count as u32);
            }
            if c.class == crate::world::CharacterClass::Fighter {
                self.class_feature_uses
                    .insert(features::SECOND_WIND.to_string(), 1);
                if c.level >= 2 {
                    self.class_feature_uses
                        .insert(features::ACTION_SURGE.to_string(), 1);
                }
            }
            if let Some(spellcasting) = &c.spellcasting {
                for level in 1..=9u8 {
                    let slots = spellcasting.slots_remaining(level);
                    if slots > 0 {
                        self.class_feature_uses
                            .insert(features::spell_slot(level), slots as u32);
                    }
                }
            }
            if c.race.has_relentless_endurance() {
                self.racial_ability_uses
                    .insert(features::RELENTLESS_ENDURANCE.to_string(), 1);
            }
        }
    }

    pub fn name(&self) -> &str {
        self.actor.name()
    }

    pub fn side(&self) -> Side {
        self.actor.side()
    }

    pub fn is_character(&self) -> bool {
        self.actor.is_character()
    }

    pub fn has_condition(&self, condition: Condition) -> bool {
        self.conditions.iter().any(|c| c.condition == condition)
    }

    /// Monsters die at 0 HP; characters after three failed death saves.
    pub fn is_dead(&self) -> bool {
        match self.actor {
            Actor::Character(_) => self.death_saves.is_dead(),
            Actor::Monster(_) => self.current_hp <= 0,
        }
    }

    /// A character at 0 HP who is not yet dead.
    pub fn is_dying(&self) -> bool {
        self.is_character() && self.current_hp <= 0 && !self.is_dead()
    }

    pub fn is_incapacitated(&self) -> bool {
        self.conditions
            .iter()
            .any(|c| c.condition.is_incapacitating())
    }

    /// Conscious and free to take actions.
    pub fn can_act(&self) -> bool {
        self.current_hp > 0 && !self.is_incapacitated()
    }

    pub fn can_react(&self) -> bool {
        self.can_act() && !self.turn.has_reacted
    }

    pub fn feature_uses(&self, feature: &str) -> u32 {
        self.class_feature_uses.get(feature).copied().unwrap_or(0)
    }

    /// Spend one use of a class feature. Returns false if none remain.
    pub fn spend_feature(&mut self, feature: &str) -> bool {
        match self.class_feature_uses.get_mut(feature) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }

    pub fn spell_slots(&self, level: u8) -> u32 {
        self.feature_uses(&features::spell_slot(level))
    }

    /// Lowest slot level at or above `min_level` with a slot left.
    pub fn lowest_available_slot(&self, min_level: u8) -> Option<u8> {
        (min_level.max(1)..=9).find(|&level| self.spell_slots(level) > 0)
    }

    pub fn knows_maneuver(&self, maneuver: Maneuver) -> bool {
        self.actor
            .as_character()
            .is_some_and(|c| c.maneuvers.contains(&maneuver))
    }

    /// Size after enlarge/reduce effects.
    pub fn size(&self) -> CreatureSize {
        let base = self.actor.size();
        let mut steps = 0;
        if self.has_condition(Condition::Enlarged) {
            steps += 1;
        }
        if self.has_condition(Condition::Reduced) {
            steps -= 1;
        }
        base.shifted(steps)
    }

    /// Side of the footprint actually claimed on the grid.
    pub fn footprint(&self) -> i32 {
        let full = self.size().footprint();
        if self.squeezing {
            (full - 1).max(1)
        } else {
            full
        }
    }

    pub fn occupied_cells(&self) -> Vec<Position> {
        self.position
            .map(|p| occupied_cells(p, self.footprint()))
            .unwrap_or_default()
    }

    /// Walking speed this turn after conditions and dashes.
    pub fn effective_speed(&self) -> u32 {
        if self.has_condition(Condition::Grappled) || self.has_condition(Condition::Restrained) {
            return 0;
        }
        let mut speed = self.actor.speed().walk;
        if self.has_condition(Condition::Slowed) {
            speed = speed.saturating_sub(10);
        }
        speed * (1 + self.turn.dashes)
    }

    pub fn remaining_movement(&self) -> u32 {
        self.effective_speed().saturating_sub(self.turn.movement_used)
    }

    /// Remove every condition of this kind.
    pub fn remove_condition(&mut self, condition: Condition) -> bool {
        let before = self.conditions.len();
        self.conditions.retain(|c| c.condition != condition);
        before != self.conditions.len()
    }

    pub fn remove_conditions_by_source(&mut self, source: &str) -> Vec<Condition> {
        let mut removed = Vec::new();
        self.conditions.retain(|c| {
            let matches = c.source.as_deref() == Some(source);
            if matches {
                removed.push(c.condition);
            }
            !matches
        });
        removed
    }
}

// ============================================================================
// Zones
// ============================================================================

/// A persistent area effect left on the grid by a spell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: u32,
    pub kind: ZoneKind,
    pub cells: BTreeSet<Position>,
    pub caster: CombatantId,
    pub source: String,
    pub save: Option<ZoneSave>,
    pub save_dc: Option<i32>,
    pub obscures: bool,
    pub difficult_terrain: bool,
}

impl Zone {
    pub fn contains(&self, pos: Position) -> bool {
        self.cells.contains(&pos)
    }
}

// ============================================================================
// Activity
// ============================================================================

/// A move that has been planned but not yet committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementAnimation {
    pub combatant: CombatantId,
    pub path: Vec<Position>,
    pub cost: u32,
    /// Index into `path` of the cell currently displayed.
    pub current_index: usize,
    pub ends_squeezed: bool,
}

impl MovementAnimation {
    pub fn destination(&self) -> Option<Position> {
        self.path.last().copied()
    }

    pub fn is_at_end(&self) -> bool {
        self.current_index + 1 >= self.path.len()
    }
}

/// How an attack was granted, which decides what it costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackKind {
    Action,
    OffHand,
    Cleave,
    Opportunity,
}

/// An attack that hit and is waiting on the target's reaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAttack {
    pub result: AttackResult,
    pub kind: AttackKind,
    pub maneuver: Option<Maneuver>,
    /// Weapon id used, for mastery once the attack lands.
    pub weapon_id: Option<String>,
}

/// Reactions a target may take against a pending hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactionChoice {
    Shield,
    UncannyDodge,
    Parry,
}

impl ReactionChoice {
    pub fn name(&self) -> &'static str {
        match self {
            ReactionChoice::Shield => "Shield",
            ReactionChoice::UncannyDodge => "Uncanny Dodge",
            ReactionChoice::Parry => "Parry",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionContext {
    pub reactor: CombatantId,
    pub pending: PendingAttack,
    pub options: Vec<ReactionChoice>,
}

/// What the engine is in the middle of.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activity {
    #[default]
    Idle,
    Moving(MovementAnimation),
    AwaitingReaction(ReactionContext),
}

// ============================================================================
// Combat State
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatState {
    pub grid: Grid,
    /// Roster in insertion order.
    pub combatants: Vec<Combatant>,
    pub turn_order: Vec<CombatantId>,
    pub turn_index: usize,
    pub round: u32,
    pub phase: Phase,
    pub activity: Activity,
    pub zones: Vec<Zone>,
    pub log: CombatLog,
    pub(crate) next_zone_id: u32,
    pub(crate) casts: u32,
}

impl CombatState {
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            combatants: Vec::new(),
            turn_order: Vec::new(),
            turn_index: 0,
            round: 0,
            phase: Phase::Setup,
            activity: Activity::Idle,
            zones: Vec::new(),
            log: CombatLog::new(),
            next_zone_id: 1,
            casts: 0,
        }
    }

    pub fn combatant(&self, id: CombatantId) -> Option<&Combatant> {
        self.combatants.iter().find(|c| c.id == id)
    }

    pub fn combatant_mut(&mut self, id: CombatantId) -> Option<&mut Combatant> {
        self.combatants.iter_mut().find(|c| c.id == id)
    }

    pub fn current_combatant_id(&self) -> Option<CombatantId> {
        if self.phase != Phase::Combat {
            return None;
        }
        self.turn_order.get(self.turn_index).copied()
    }

    pub fn current_combatant(&self) -> Option<&Combatant> {
        self.current_combatant_id().and_then(|id| self.combatant(id))
    }

    /// Living combatants opposed to `side`.
    pub fn enemies_of(&self, side: Side) -> impl Iterator<Item = &Combatant> {
        self.combatants
            .iter()
            .filter(move |c| c.side().is_opposed_to(side) && !c.is_dead())
    }

    pub fn log(&mut self, kind: LogKind, actor: Option<CombatantId>, target: Option<CombatantId>, message: impl Into<String>) {
        let round = self.round;
        self.log.push(kind, round, actor, target, message, None);
    }

    pub fn log_detailed(
        &mut self,
        kind: LogKind,
        actor: Option<CombatantId>,
        target: Option<CombatantId>,
        message: impl Into<String>,
        details: impl Into<String>,
    ) {
        let round = self.round;
        self.log
            .push(kind, round, actor, target, message, Some(details.into()));
    }

    /// Victory when every monster is down; defeat when every character is dead.
    pub fn check_combat_end(&self) -> Option<Phase> {
        let monsters: Vec<&Combatant> = self.combatants.iter().filter(|c| !c.is_character()).collect();
        let characters: Vec<&Combatant> = self.combatants.iter().filter(|c| c.is_character()).collect();
        if !monsters.is_empty() && monsters.iter().all(|m| m.current_hp <= 0) {
            return Some(Phase::Victory);
        }
        if !characters.is_empty() && characters.iter().all(|c| c.death_saves.is_dead()) {
            return Some(Phase::Defeat);
        }
        None
    }

    /// Whether the grid claims exactly the footprints of placed, living combatants.
    pub fn occupancy_consistent(&self) -> bool {
        self.combatants.iter().all(|c| {
            let expected: BTreeSet<Position> = if c.is_dead() {
                BTreeSet::new()
            } else {
                c.occupied_cells().into_iter().collect()
            };
            let actual: BTreeSet<Position> =
                self.grid.cells_occupied_by(c.id).into_iter().collect();
            expected == actual
        })
    }
}
