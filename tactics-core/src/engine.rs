//! The combat orchestrator.
//!
//! [`CombatEngine`] owns the [`CombatState`] and the dice. Every mutation of
//! the roster, the grid, or the turn order goes through one of its methods.

use crate::combat::{
    ally_adjacent_to_target, can_attack_target, death_save, footprint_distance, maneuver_save_dc,
    resolve_attack, roll_initiative, saving_throw, second_wind_dice, superiority_die,
    AttackContext, AttackProfile, AttackResult, AttackSource, DeathSaveOutcome, DeathSaveResult,
    SaveContext, SaveResult,
};
use crate::config::EngineConfig;
use crate::dice::{seeded_roller, DiceExpression, DieRoller, DieType};
use crate::error::{CombatError, CombatResult};
use crate::geometry::{Direction8, Position};
use crate::grid::{Fit, Grid, Terrain};
use crate::log::LogKind;
use crate::mastery::{push_destination, resolve_mastery, MasteryContext, MasteryEffect, MasteryResult};
use crate::pathfinding::{find_path, reachable_positions, MoverProfile};
use crate::size::{occupied_cells, CreatureSize};
use crate::spellcasting::{
    plan_cast, plan_zone, resolve_cast, spell_source, SpellCheck, SpellHit, SpellTarget,
};
use crate::spells::{get_spell, CastingTime};
use crate::state::{
    features, Activity, AttackKind, Combatant, CombatState, Concentration, MovementAnimation,
    PendingAttack, Phase, ReactionChoice, ReactionContext, TurnFlags, VexMark, Zone,
};
use crate::world::{
    Ability, ActiveCondition, Actor, CombatantId, Condition, DamageType, Maneuver,
    MasteryProperty,
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};

/// Source tag for the unconsciousness of a creature at 0 HP.
pub const DYING_SOURCE: &str = "dying";

/// Squares moved by the Pushing Attack maneuver.
const PUSHING_ATTACK_SQUARES: u32 = 3;

// ============================================================================
// Outcomes
// ============================================================================

/// Options for a weapon attack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackOptions {
    /// Defaults to the first weapon or action on the stat block.
    pub source: Option<AttackSource>,
    pub maneuver: Option<Maneuver>,
}

impl AttackOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: AttackSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_weapon(self, weapon: impl Into<String>) -> Self {
        self.with_source(AttackSource::Weapon(weapon.into()))
    }

    pub fn with_maneuver(mut self, maneuver: Maneuver) -> Self {
        self.maneuver = Some(maneuver);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackOutcome {
    pub result: AttackResult,
    pub kind: AttackKind,
    /// HP damage actually dealt (after reactions, before temp HP).
    pub damage_dealt: i32,
    /// The attack is paused waiting on the target's reaction.
    pub awaiting_reaction: bool,
    pub reaction: Option<ReactionChoice>,
    pub mastery: Option<MasteryResult>,
    pub maneuver_save: Option<SaveResult>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageOutcome {
    pub target: CombatantId,
    pub amount: i32,
    pub absorbed_by_temp_hp: i32,
    pub hp_after: i32,
    pub dropped_to_zero: bool,
    pub killed: bool,
    pub relentless_endurance: bool,
    pub concentration_lost: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementOutcome {
    pub combatant: CombatantId,
    pub from: Position,
    pub to: Position,
    pub cost: u32,
    pub opportunity_attacks: Vec<AttackResult>,
    pub hazard_damage: Option<i32>,
    /// An opportunity attack dropped the mover before it could leave.
    pub aborted: bool,
}

/// Result of one animation tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementStep {
    Moving(Position),
    Arrived(MovementOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellOutcome {
    pub spell: String,
    pub caster: CombatantId,
    pub slot_level: u8,
    pub source: String,
    pub cells: BTreeSet<Position>,
    pub hits: Vec<SpellHit>,
    pub zone: Option<u32>,
}

// ============================================================================
// Engine
// ============================================================================

pub struct CombatEngine {
    state: CombatState,
    roller: Box<dyn DieRoller>,
    config: EngineConfig,
}

impl std::fmt::Debug for CombatEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombatEngine")
            .field("phase", &self.state.phase)
            .field("round", &self.state.round)
            .field("combatants", &self.state.combatants.len())
            .field("config", &self.config)
            .finish()
    }
}

impl CombatEngine {
    /// Create an engine. Dice are seeded from `config.seed` when set.
    pub fn new(grid: Grid, config: EngineConfig) -> Self {
        let roller: Box<dyn DieRoller> = match config.seed {
            Some(seed) => Box::new(seeded_roller(seed)),
            None => Box::new(rand::thread_rng()),
        };
        Self::with_roller(grid, config, roller)
    }

    pub fn with_roller(grid: Grid, config: EngineConfig, roller: Box<dyn DieRoller>) -> Self {
        tracing::debug!(width = grid.width, height = grid.height, "combat engine created");
        Self {
            state: CombatState::new(grid),
            roller,
            config,
        }
    }

    /// Swap the dice source (tests script rolls this way).
    pub fn set_roller(&mut self, roller: impl DieRoller + 'static) {
        self.roller = Box::new(roller);
    }

    pub fn state(&self) -> &CombatState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid {
        &self.state.grid
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn round(&self) -> u32 {
        self.state.round
    }

    pub fn combatant(&self, id: CombatantId) -> Option<&Combatant> {
        self.state.combatant(id)
    }

    pub fn current_combatant_id(&self) -> Option<CombatantId> {
        self.state.current_combatant_id()
    }

    pub fn activity(&self) -> &Activity {
        &self.state.activity
    }

    /// The reaction prompt currently blocking the fight, if any.
    pub fn pending_reaction(&self) -> Option<&ReactionContext> {
        match &self.state.activity {
            Activity::AwaitingReaction(ctx) => Some(ctx),
            _ => None,
        }
    }

    // ------------------------------------------------------------------------
    // Guards
    // ------------------------------------------------------------------------

    fn get(&self, id: CombatantId) -> CombatResult<&Combatant> {
        self.state
            .combatant(id)
            .ok_or(CombatError::UnknownCombatant(id))
    }

    fn get_mut(&mut self, id: CombatantId) -> CombatResult<&mut Combatant> {
        self.state
            .combatant_mut(id)
            .ok_or(CombatError::UnknownCombatant(id))
    }

    fn name_of(&self, id: CombatantId) -> String {
        self.state
            .combatant(id)
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| id.to_string())
    }

    fn require_idle(&self) -> CombatResult<()> {
        match self.state.activity {
            Activity::Idle => Ok(()),
            Activity::Moving(_) => Err(CombatError::MovementInProgress),
            Activity::AwaitingReaction(_) => Err(CombatError::AwaitingReaction),
        }
    }

    fn require_combat(&self) -> CombatResult<()> {
        match self.state.phase {
            Phase::Combat => Ok(()),
            p if p.is_over() => Err(CombatError::CombatOver),
            p => Err(CombatError::InvalidPhase(p.name())),
        }
    }

    fn require_setup(&self) -> CombatResult<()> {
        match self.state.phase {
            Phase::Setup => Ok(()),
            p => Err(CombatError::InvalidPhase(p.name())),
        }
    }

    /// Combat is running, nothing is in flight, and it is `id`'s turn.
    fn require_turn(&self, id: CombatantId) -> CombatResult<&Combatant> {
        self.require_combat()?;
        self.require_idle()?;
        let combatant = self.get(id)?;
        if self.state.current_combatant_id() != Some(id) {
            return Err(CombatError::NotYourTurn(combatant.name().to_string()));
        }
        Ok(combatant)
    }

    /// As [`Self::require_turn`], and the combatant must be able to act.
    fn require_actor(&self, id: CombatantId) -> CombatResult<&Combatant> {
        let combatant = self.require_turn(id)?;
        if !combatant.can_act() {
            return Err(CombatError::Incapacitated(combatant.name().to_string()));
        }
        Ok(combatant)
    }

    /// Spend the action of the current turn.
    fn take_action(&mut self, id: CombatantId) -> CombatResult<()> {
        let combatant = self.get_mut(id)?;
        if combatant.turn.has_acted {
            return Err(CombatError::AlreadyActed(combatant.name().to_string()));
        }
        combatant.turn.has_acted = true;
        Ok(())
    }

    fn take_bonus_action(&mut self, id: CombatantId) -> CombatResult<()> {
        let combatant = self.get_mut(id)?;
        if combatant.turn.has_bonus_acted {
            return Err(CombatError::AlreadyActed(combatant.name().to_string()));
        }
        combatant.turn.has_bonus_acted = true;
        Ok(())
    }

    fn log(
        &mut self,
        kind: LogKind,
        actor: Option<CombatantId>,
        target: Option<CombatantId>,
        message: impl Into<String>,
    ) {
        self.state.log(kind, actor, target, message);
    }

    fn log_detailed(
        &mut self,
        kind: LogKind,
        actor: Option<CombatantId>,
        target: Option<CombatantId>,
        message: impl Into<String>,
        details: impl Into<String>,
    ) {
        self.state.log_detailed(kind, actor, target, message, details);
    }

    // ------------------------------------------------------------------------
    // Roster
    // ------------------------------------------------------------------------

    /// Add a creature to the roster, unplaced.
    pub fn add_combatant(&mut self, actor: Actor) -> CombatResult<CombatantId> {
        self.require_setup()?;
        let combatant = Combatant::new(actor);
        let id = combatant.id;
        tracing::info!(combatant = %combatant.name(), %id, "combatant added");
        self.state.combatants.push(combatant);
        Ok(id)
    }

    /// Add a creature and place it in one step. Nothing is added if it does not fit.
    pub fn add_combatant_at(&mut self, actor: Actor, anchor: Position) -> CombatResult<CombatantId> {
        let id = self.add_combatant(actor)?;
        if let Err(err) = self.place_combatant(id, anchor) {
            self.state.combatants.retain(|c| c.id != id);
            return Err(err);
        }
        Ok(id)
    }

    /// Put a combatant's footprint at `anchor`, releasing its old cells.
    pub fn place_combatant(&mut self, id: CombatantId, anchor: Position) -> CombatResult<()> {
        self.require_setup()?;
        let combatant = self.get(id)?;
        let size = combatant.size();
        if self.state.grid.fit(anchor, size, Some(id), false) != Fit::Normal {
            return Err(CombatError::DestinationBlocked);
        }
        self.state.grid.vacate(id);
        self.state.grid.occupy(id, anchor, size.footprint());
        let combatant = self.get_mut(id)?;
        combatant.position = Some(anchor);
        combatant.squeezing = false;
        tracing::debug!(%id, %anchor, "combatant placed");
        debug_assert!(self.state.occupancy_consistent());
        Ok(())
    }

    /// Remove a combatant from the roster, the grid, and the turn order.
    pub fn remove_combatant(&mut self, id: CombatantId) -> CombatResult<()> {
        self.require_idle()?;
        let index = self
            .state
            .combatants
            .iter()
            .position(|c| c.id == id)
            .ok_or(CombatError::UnknownCombatant(id))?;
        self.end_concentration(id);
        self.state.grid.vacate(id);
        let removed = self.state.combatants.remove(index);

        if let Some(order_index) = self.state.turn_order.iter().position(|&t| t == id) {
            self.state.turn_order.remove(order_index);
            if order_index < self.state.turn_index {
                self.state.turn_index -= 1;
            }
            if self.state.turn_index >= self.state.turn_order.len() {
                self.state.turn_index = 0;
            }
        }
        tracing::info!(combatant = %removed.name(), "combatant removed");
        self.log(LogKind::System, None, None, format!("{} leaves the fight", removed.name()));
        if self.state.phase == Phase::Combat {
            self.update_combat_end();
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Initiative and turns
    // ------------------------------------------------------------------------

    /// Roll initiative, fix the turn order, and begin round 1.
    ///
    /// Ties go to the higher DEX score, then to roster order.
    pub fn start_combat(&mut self) -> CombatResult<Vec<CombatantId>> {
        self.require_setup()?;
        if self.state.combatants.len() < 2 {
            return Err(CombatError::NotEnoughCombatants);
        }
        self.state.phase = Phase::Initiative;

        let mut rolls = Vec::with_capacity(self.state.combatants.len());
        for (index, combatant) in self.state.combatants.iter_mut().enumerate() {
            let roll = roll_initiative(self.roller.as_mut(), combatant);
            combatant.initiative = Some(roll.total);
            combatant.turn = TurnFlags::default();
            let dex = combatant.actor.ability_scores().get(Ability::Dexterity);
            rolls.push((combatant.id, roll.total, dex, index, roll.breakdown()));
        }
        for (id, total, _, _, breakdown) in &rolls {
            let name = self.name_of(*id);
            self.log_detailed(
                LogKind::Initiative,
                Some(*id),
                None,
                format!("{name} rolls {total} for initiative"),
                breakdown.clone(),
            );
        }

        rolls.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.3.cmp(&b.3)));
        self.state.turn_order = rolls.iter().map(|r| r.0).collect();
        self.state.turn_index = 0;
        self.state.round = 1;
        self.state.phase = Phase::Combat;
        tracing::info!(order = ?self.state.turn_order, "combat started");
        self.log(LogKind::System, None, None, "Round 1 begins");

        if self.update_combat_end().is_some() {
            return Ok(self.state.turn_order.clone());
        }
        let first_alive = self
            .state
            .turn_order
            .iter()
            .position(|&id| self.state.combatant(id).is_some_and(|c| !c.is_dead()));
        if let Some(index) = first_alive {
            self.state.turn_index = index;
            self.begin_turn(self.state.turn_order[index]);
        }
        Ok(self.state.turn_order.clone())
    }

    /// End the current turn and start the next living combatant's.
    pub fn next_turn(&mut self) -> CombatResult<CombatantId> {
        self.require_combat()?;
        self.require_idle()?;
        if self.state.turn_order.is_empty() {
            return Err(CombatError::NotEnoughCombatants);
        }
        if let Some(ending) = self.state.current_combatant_id() {
            self.end_turn(ending);
            if self.state.phase.is_over() {
                return Err(CombatError::CombatOver);
            }
        }

        let len = self.state.turn_order.len();
        for _ in 0..len {
            self.state.turn_index += 1;
            if self.state.turn_index >= len {
                self.state.turn_index = 0;
                self.state.round += 1;
                tracing::info!(round = self.state.round, "new round");
                let round = self.state.round;
                self.log(LogKind::System, None, None, format!("Round {round} begins"));
            }
            let id = self.state.turn_order[self.state.turn_index];
            if self.state.combatant(id).is_some_and(|c| !c.is_dead()) {
                self.begin_turn(id);
                return Ok(id);
            }
        }
        // Everyone in the order is dead.
        self.update_combat_end();
        Err(CombatError::CombatOver)
    }

    fn end_turn(&mut self, id: CombatantId) {
        self.end_of_turn_saves(id);
        if let Some(combatant) = self.state.combatant_mut(id) {
            combatant.turn.reset_for_turn_end();
        }
        tracing::debug!(%id, "turn ended");
    }

    /// Repeat saves that trigger at the end of the creature's own turn.
    fn end_of_turn_saves(&mut self, id: CombatantId) {
        let Some(combatant) = self.state.combatant(id) else {
            return;
        };
        let pending: Vec<ActiveCondition> = combatant
            .conditions
            .iter()
            .filter(|c| c.repeat_save.is_some_and(|r| r.at_end_of_turn))
            .cloned()
            .collect();
        for condition in pending {
            self.repeat_save(id, &condition);
        }
    }

    /// Roll a condition's repeat save: success ends every condition this
    /// creature carries from the same casting, failure may upgrade it.
    fn repeat_save(&mut self, id: CombatantId, condition: &ActiveCondition) {
        let Some(repeat) = condition.repeat_save else {
            return;
        };
        let Some(combatant) = self.state.combatant(id) else {
            return;
        };
        // An earlier save this turn may already have cleared it.
        if !combatant.conditions.contains(condition) {
            return;
        }
        let ctx = SaveContext::magical().against(condition.condition);
        let save = saving_throw(self.roller.as_mut(), combatant, repeat.ability, repeat.dc, &ctx);
        let name = combatant.name().to_string();
        let label = condition.condition.name();
        self.log_detailed(
            LogKind::Save,
            Some(id),
            None,
            format!(
                "{name} {} a {} save against {label}",
                if save.success { "succeeds on" } else { "fails" },
                repeat.ability.abbreviation()
            ),
            save.roll.breakdown(),
        );

        if save.success {
            // Only the saving creature shakes off the casting.
            let removed = match &condition.source {
                Some(source) => self.strip_source(id, source),
                None => {
                    if let Some(c) = self.state.combatant_mut(id) {
                        c.conditions.retain(|x| x != condition);
                    }
                    1
                }
            };
            tracing::debug!(%id, removed, "repeat save ended conditions");
            return;
        }

        if let Some(upgrade) = repeat.upgrade_on_fail {
            if let Some(c) = self.state.combatant_mut(id) {
                if let Some(existing) = c.conditions.iter_mut().find(|x| *x == condition) {
                    existing.condition = upgrade;
                    existing.repeat_save = None;
                }
            }
            self.log(
                LogKind::Condition,
                Some(id),
                None,
                format!("{name} is now {}", upgrade.name()),
            );
        }
    }

    fn begin_turn(&mut self, id: CombatantId) {
        let round = self.state.round;

        // Effects that last until the start of this creature's turn.
        let mut expired = Vec::new();
        for combatant in &mut self.state.combatants {
            let before = combatant.conditions.len();
            combatant
                .conditions
                .retain(|c| c.expires_at_turn_start_of != Some(id));
            if combatant.conditions.len() != before {
                expired.push(combatant.id);
            }
        }
        for other in expired {
            tracing::debug!(%other, "turn-anchored conditions expired");
        }

        let Some(combatant) = self.state.combatant_mut(id) else {
            return;
        };
        combatant.turn.has_reacted = false;
        if combatant.vex.is_some_and(|v| v.expires_round < round) {
            combatant.vex = None;
        }

        let mut ended = Vec::new();
        for condition in &mut combatant.conditions {
            if let Some(rounds) = condition.duration_rounds.as_mut() {
                *rounds = rounds.saturating_sub(1);
                if *rounds == 0 {
                    ended.push(condition.condition);
                }
            }
        }
        combatant
            .conditions
            .retain(|c| c.duration_rounds != Some(0));
        let name = combatant.name().to_string();
        let dying = combatant.is_dying() && !combatant.is_stable;

        for condition in ended {
            self.log(
                LogKind::Condition,
                Some(id),
                None,
                format!("{} on {name} wears off", condition.name()),
            );
        }
        tracing::info!(combatant = %name, round, "turn started");
        self.log(LogKind::Turn, Some(id), None, format!("{name}'s turn"));

        if dying && self.config.auto_death_saves {
            self.resolve_death_save(id);
        }
    }

    // ------------------------------------------------------------------------
    // Movement
    // ------------------------------------------------------------------------

    /// Grid as the mover sees it: zones of difficult terrain folded in.
    fn movement_grid(&self) -> Cow<'_, Grid> {
        if !self.state.zones.iter().any(|z| z.difficult_terrain) {
            return Cow::Borrowed(&self.state.grid);
        }
        let mut grid = self.state.grid.clone();
        for zone in self.state.zones.iter().filter(|z| z.difficult_terrain) {
            for &pos in &zone.cells {
                if grid.terrain(pos).is_none() {
                    grid.set_terrain(pos, Some(Terrain::Difficult));
                }
            }
        }
        Cow::Owned(grid)
    }

    fn mover_profile(combatant: &Combatant) -> MoverProfile {
        let speed = combatant.actor.speed();
        let mut profile = MoverProfile::new(combatant.size(), speed.walk).with_id(combatant.id);
        if let Some(swim) = speed.swim {
            profile = profile.with_swim_speed(swim);
        }
        profile
    }

    /// Cells the combatant can reach with its remaining movement.
    pub fn reachable_positions(&self, id: CombatantId) -> CombatResult<HashMap<Position, u32>> {
        let combatant = self.get(id)?;
        let Some(start) = combatant.position else {
            return Ok(HashMap::new());
        };
        let grid = self.movement_grid();
        Ok(reachable_positions(
            &grid,
            &Self::mover_profile(combatant),
            start,
            combatant.remaining_movement(),
        ))
    }

    /// Plan a move and hold it as the pending animation.
    pub fn move_combatant(
        &mut self,
        id: CombatantId,
        destination: Position,
    ) -> CombatResult<MovementAnimation> {
        let combatant = self.require_actor(id)?;
        let start = combatant.position.ok_or_else(|| {
            CombatError::InvalidTarget(format!("{} is not on the grid", combatant.name()))
        })?;
        if start == destination {
            return Err(CombatError::InvalidTarget("already there".to_string()));
        }
        if self.state.grid.fit(destination, combatant.size(), Some(id), false) == Fit::Blocked {
            return Err(CombatError::DestinationBlocked);
        }
        let remaining = combatant.remaining_movement();
        let grid = self.movement_grid();
        let path = find_path(
            &grid,
            &Self::mover_profile(combatant),
            start,
            destination,
            Some(remaining),
        )
        .ok_or(CombatError::PathNotFound)?;

        let animation = MovementAnimation {
            combatant: id,
            path: path.path,
            cost: path.cost,
            current_index: 0,
            ends_squeezed: path.ends_squeezed,
        };
        tracing::debug!(%id, %destination, cost = animation.cost, "movement planned");
        self.state.activity = Activity::Moving(animation.clone());
        Ok(animation)
    }

    /// Step the pending animation one cell. Arriving settles the move.
    pub fn advance_movement_animation(&mut self) -> CombatResult<MovementStep> {
        let Activity::Moving(animation) = &mut self.state.activity else {
            return Err(CombatError::NoMovementInProgress);
        };
        if !animation.is_at_end() {
            animation.current_index += 1;
        }
        if animation.is_at_end() {
            return self.finish_movement_animation().map(MovementStep::Arrived);
        }
        Ok(MovementStep::Moving(animation.path[animation.current_index]))
    }

    /// Settle the pending move: opportunity attacks, then relocation and hazards.
    pub fn finish_movement_animation(&mut self) -> CombatResult<MovementOutcome> {
        let Activity::Moving(animation) = std::mem::take(&mut self.state.activity) else {
            return Err(CombatError::NoMovementInProgress);
        };
        let id = animation.combatant;
        let Some(&from) = animation.path.first() else {
            return Err(CombatError::NoMovementInProgress);
        };
        let to = animation.destination().unwrap_or(from);

        let opportunity_attacks = self.opportunity_attacks(&animation)?;
        let mover = self.get(id)?;
        if mover.current_hp <= 0 {
            let name = mover.name().to_string();
            self.log(
                LogKind::Movement,
                Some(id),
                None,
                format!("{name} is stopped before leaving {from}"),
            );
            return Ok(MovementOutcome {
                combatant: id,
                from,
                to: from,
                cost: 0,
                opportunity_attacks,
                hazard_damage: None,
                aborted: true,
            });
        }

        self.state.grid.vacate(id);
        let mover = self.get_mut(id)?;
        mover.position = Some(to);
        mover.squeezing = animation.ends_squeezed;
        mover.turn.movement_used += animation.cost;
        let footprint = mover.footprint();
        let name = mover.name().to_string();
        self.state.grid.occupy(id, to, footprint);
        debug_assert!(self.state.occupancy_consistent());
        tracing::info!(combatant = %name, %from, %to, cost = animation.cost, "moved");
        self.log_detailed(
            LogKind::Movement,
            Some(id),
            None,
            format!("{name} moves from {from} to {to}"),
            format!("{} ft{}", animation.cost, if animation.ends_squeezed { ", squeezing" } else { "" }),
        );

        let on_hazard = occupied_cells(to, footprint)
            .into_iter()
            .any(|p| self.state.grid.terrain(p) == Some(Terrain::Hazard));
        let hazard_damage = if on_hazard {
            let dice = DiceExpression::parse(&self.config.hazard_damage)?;
            let rolled = dice.roll_with(self.roller.as_mut());
            let amount = rolled.non_negative_total();
            self.log_detailed(
                LogKind::Damage,
                None,
                Some(id),
                format!("{name} is hurt by the hazard"),
                rolled.to_string(),
            );
            let damage_type = self.config.hazard_damage_type;
            self.apply_damage(id, amount, damage_type, false)?;
            Some(amount)
        } else {
            None
        };

        Ok(MovementOutcome {
            combatant: id,
            from,
            to,
            cost: animation.cost,
            opportunity_attacks,
            hazard_damage,
            aborted: false,
        })
    }

    /// Opportunity attacks against a mover leaving enemies' reach.
    ///
    /// Each eligible enemy strikes once, from the last cell of the path still
    /// in its reach. These attacks never prompt reactions.
    fn opportunity_attacks(
        &mut self,
        animation: &MovementAnimation,
    ) -> CombatResult<Vec<AttackResult>> {
        let id = animation.combatant;
        let mut results = Vec::new();
        let mover = self.get(id)?;
        if !self.config.opportunity_attacks || mover.has_condition(Condition::Disengaging) {
            return Ok(results);
        }
        let mover_side = mover.side();
        let enemies: Vec<CombatantId> = self
            .state
            .combatants
            .iter()
            .filter(|c| c.side().is_opposed_to(mover_side) && c.can_react() && c.position.is_some())
            .map(|c| c.id)
            .collect();

        for enemy_id in enemies {
            let mover = self.get(id)?;
            if mover.current_hp <= 0 {
                break;
            }
            let enemy = self.get(enemy_id)?;
            let source = AttackSource::melee_for(&enemy.actor);
            let Ok(profile) = AttackProfile::for_source(&enemy.actor, &source) else {
                continue;
            };
            if profile.ranged {
                continue;
            }
            let in_reach = |pos: Position| {
                let mut stand_in = mover.clone();
                stand_in.position = Some(pos);
                footprint_distance(enemy, &stand_in).is_some_and(|d| d <= profile.reach_ft)
            };
            let leave_from = animation
                .path
                .windows(2)
                .find(|w| in_reach(w[0]) && !in_reach(w[1]))
                .map(|w| w[0]);
            let Some(leave_from) = leave_from else {
                continue;
            };

            let mut stand_in = mover.clone();
            stand_in.position = Some(leave_from);
            let enemy = enemy.clone();
            let ctx = AttackContext {
                distance_ft: footprint_distance(&enemy, &stand_in).unwrap_or(5),
                long_range: false,
                round: self.state.round,
                ally_adjacent_to_target: ally_adjacent_to_target(&self.state.combatants, &enemy, &stand_in),
                maneuver: None,
            };
            let result = resolve_attack(self.roller.as_mut(), &enemy, &stand_in, &profile, &ctx);
            self.get_mut(enemy_id)?.turn.has_reacted = true;
            let enemy_name = enemy.name().to_string();
            let mover_name = stand_in.name().to_string();
            self.log(
                LogKind::Reaction,
                Some(enemy_id),
                Some(id),
                format!("{enemy_name} makes an opportunity attack as {mover_name} leaves"),
            );
            let pending = PendingAttack {
                result,
                kind: AttackKind::Opportunity,
                maneuver: None,
                weapon_id: profile.weapon_id().map(str::to_string),
            };
            let outcome = self.land_attack(pending, None, None)?;
            results.push(outcome.result);
        }
        Ok(results)
    }

    // ------------------------------------------------------------------------
    // Attacks
    // ------------------------------------------------------------------------

    /// Make one weapon attack as part of the Attack action.
    ///
    /// The first attack spends the action and grants the full Extra Attack
    /// budget; later calls draw from that budget.
    pub fn attack(
        &mut self,
        attacker_id: CombatantId,
        target_id: CombatantId,
        options: AttackOptions,
    ) -> CombatResult<AttackOutcome> {
        let attacker = self.require_actor(attacker_id)?;
        if attacker.turn.attacks_remaining == 0 && attacker.turn.has_acted {
            return Err(CombatError::AlreadyActed(attacker.name().to_string()));
        }
        let source = options
            .source
            .clone()
            .unwrap_or_else(|| AttackSource::default_for(&attacker.actor));
        let profile = AttackProfile::for_source(&attacker.actor, &source)?;
        self.check_target(attacker_id, target_id, &profile)?;
        let die = match options.maneuver {
            Some(m) => Some((m, self.check_maneuver(attacker_id, m)?)),
            None => None,
        };

        let attacker = self.get_mut(attacker_id)?;
        if attacker.turn.attacks_remaining == 0 {
            attacker.turn.has_acted = true;
            attacker.turn.attacks_remaining = attacker.actor.attacks_per_action() as u32;
        }
        attacker.turn.attacks_remaining -= 1;
        attacker.turn.attacks_made_this_turn += 1;
        if profile.is_light() {
            attacker.turn.light_attack_made = true;
        }
        self.perform_attack(attacker_id, target_id, &profile, AttackKind::Action, die)
    }

    /// The extra attack with a second light weapon.
    ///
    /// Costs the bonus action unless the weapon's Nick mastery covers it.
    pub fn offhand_attack(
        &mut self,
        attacker_id: CombatantId,
        target_id: CombatantId,
        source: Option<AttackSource>,
    ) -> CombatResult<AttackOutcome> {
        let attacker = self.require_actor(attacker_id)?;
        if !attacker.turn.light_attack_made {
            return Err(CombatError::InvalidTarget(
                "an off-hand attack follows a light weapon attack".to_string(),
            ));
        }
        let Some(character) = attacker.actor.as_character() else {
            return Err(CombatError::InvalidTarget("only characters dual wield".to_string()));
        };
        let source = match source {
            Some(s) => s,
            None => {
                let light: Vec<_> = character.weapons.iter().filter(|w| w.is_light()).collect();
                let weapon = light
                    .get(1)
                    .or_else(|| light.first())
                    .ok_or_else(|| CombatError::UnknownWeapon("light weapon".to_string()))?;
                AttackSource::Weapon(weapon.id.clone())
            }
        };
        let profile = AttackProfile::for_source(&attacker.actor, &source)?;
        if !profile.is_light() {
            return Err(CombatError::InvalidTarget(format!(
                "{} is not a light weapon",
                profile.name
            )));
        }
        let nick = profile
            .weapon
            .as_ref()
            .is_some_and(|w| w.mastery == Some(MasteryProperty::Nick) && character.has_mastered(&w.id))
            && !attacker.turn.nick_used;
        self.check_target(attacker_id, target_id, &profile)?;

        if nick {
            let attacker = self.get_mut(attacker_id)?;
            attacker.turn.nick_used = true;
        } else {
            self.take_bonus_action(attacker_id)?;
        }
        let attacker = self.get_mut(attacker_id)?;
        attacker.turn.light_attack_made = false;
        attacker.turn.attacks_made_this_turn += 1;
        let profile = profile.without_ability_damage();
        self.perform_attack(attacker_id, target_id, &profile, AttackKind::OffHand, None)
    }

    /// Follow a Cleave hit with an attack on one of its candidates.
    pub fn cleave_attack(
        &mut self,
        attacker_id: CombatantId,
        target_id: CombatantId,
    ) -> CombatResult<AttackOutcome> {
        let attacker = self.require_actor(attacker_id)?;
        if attacker.turn.cleave_used {
            return Err(CombatError::NoResourceRemaining("cleave".to_string()));
        }
        if !attacker.turn.cleave_candidates.contains(&target_id) {
            return Err(CombatError::InvalidTarget(format!(
                "{} is not a cleave candidate",
                self.name_of(target_id)
            )));
        }
        let weapon = attacker
            .actor
            .as_character()
            .and_then(|c| {
                c.weapons
                    .iter()
                    .find(|w| w.mastery == Some(MasteryProperty::Cleave) && c.has_mastered(&w.id))
            })
            .ok_or_else(|| CombatError::UnknownWeapon("cleave weapon".to_string()))?;
        let profile =
            AttackProfile::for_source(&attacker.actor, &AttackSource::Weapon(weapon.id.clone()))?;
        self.check_target(attacker_id, target_id, &profile)?;

        let attacker = self.get_mut(attacker_id)?;
        attacker.turn.cleave_used = true;
        attacker.turn.cleave_candidates.clear();
        attacker.turn.attacks_made_this_turn += 1;
        let profile = profile.without_ability_damage();
        self.perform_attack(attacker_id, target_id, &profile, AttackKind::Cleave, None)
    }

    fn check_target(
        &self,
        attacker_id: CombatantId,
        target_id: CombatantId,
        profile: &AttackProfile,
    ) -> CombatResult<()> {
        if attacker_id == target_id {
            return Err(CombatError::InvalidTarget("cannot attack yourself".to_string()));
        }
        let attacker = self.get(attacker_id)?;
        let target = self.get(target_id)?;
        if target.is_dead() {
            return Err(CombatError::InvalidTarget(format!("{} is dead", target.name())));
        }
        can_attack_target(&self.state.grid, attacker, target, profile)?;
        Ok(())
    }

    /// Validate a declared maneuver and return its superiority die.
    fn check_maneuver(
        &self,
        attacker_id: CombatantId,
        maneuver: Maneuver,
    ) -> CombatResult<DieType> {
        let attacker = self.get(attacker_id)?;
        if maneuver == Maneuver::Parry || !attacker.knows_maneuver(maneuver) {
            return Err(CombatError::InvalidTarget(format!(
                "{} cannot use {}",
                attacker.name(),
                maneuver.name()
            )));
        }
        if attacker.feature_uses(features::SUPERIORITY_DICE) == 0 {
            return Err(CombatError::NoResourceRemaining("superiority dice".to_string()));
        }
        superiority_die(attacker)
            .ok_or_else(|| CombatError::NoResourceRemaining("superiority dice".to_string()))
    }

    fn perform_attack(
        &mut self,
        attacker_id: CombatantId,
        target_id: CombatantId,
        profile: &AttackProfile,
        kind: AttackKind,
        maneuver: Option<(Maneuver, DieType)>,
    ) -> CombatResult<AttackOutcome> {
        let attacker = self.get(attacker_id)?.clone();
        let target = self.get(target_id)?.clone();
        let range = can_attack_target(&self.state.grid, &attacker, &target, profile)?;
        let ctx = AttackContext {
            distance_ft: range.distance_ft,
            long_range: range.long_range,
            round: self.state.round,
            ally_adjacent_to_target: ally_adjacent_to_target(&self.state.combatants, &attacker, &target),
            maneuver,
        };
        let result = resolve_attack(self.roller.as_mut(), &attacker, &target, profile, &ctx);

        let attacker_mut = self.get_mut(attacker_id)?;
        if result.vex_consumed {
            attacker_mut.vex = None;
        }
        if result.sneak_attack {
            attacker_mut.turn.sneak_attack_used = true;
        }
        if result.maneuver.is_some() {
            attacker_mut.spend_feature(features::SUPERIORITY_DICE);
        }
        // Sap only hampers the next attack.
        attacker_mut.remove_condition(Condition::Sapped);

        self.log_attack(&result, &attacker, &target);
        let pending = PendingAttack {
            result,
            kind,
            maneuver: maneuver.map(|(m, _)| m),
            weapon_id: profile.weapon_id().map(str::to_string),
        };

        let options = self.reaction_options(&pending, &target);
        if pending.result.hit && !options.is_empty() {
            let reactor = target.id;
            let names: Vec<&str> = options.iter().map(ReactionChoice::name).collect();
            tracing::debug!(%reactor, ?options, "awaiting reaction");
            self.log(
                LogKind::Reaction,
                Some(reactor),
                Some(attacker_id),
                format!("{} may react: {}", target.name(), names.join(", ")),
            );
            let result = pending.result.clone();
            self.state.activity = Activity::AwaitingReaction(ReactionContext {
                reactor,
                pending,
                options,
            });
            return Ok(AttackOutcome {
                result,
                kind,
                damage_dealt: 0,
                awaiting_reaction: true,
                reaction: None,
                mastery: None,
                maneuver_save: None,
            });
        }
        self.land_attack(pending, None, None)
    }

    fn log_attack(&mut self, result: &AttackResult, attacker: &Combatant, target: &Combatant) {
        let verdict = match (result.hit, result.critical, result.critical_miss) {
            (true, true, _) => "critical hit",
            (true, false, _) => "hit",
            (false, _, true) => "critical miss",
            _ => "miss",
        };
        let mut details = format!("{} vs AC {}", result.roll.breakdown(), result.target_ac);
        if !result.advantage_sources.is_empty() {
            details.push_str(&format!(" [{}]", result.advantage_sources.join(", ")));
        }
        tracing::debug!(
            attacker = %attacker.name(),
            target = %target.name(),
            hit = result.hit,
            critical = result.critical,
            total = result.roll.total,
            "attack resolved"
        );
        self.log_detailed(
            LogKind::Attack,
            Some(attacker.id),
            Some(target.id),
            format!(
                "{} attacks {} with {}: {verdict}",
                attacker.name(),
                target.name(),
                result.attack_name
            ),
            details,
        );
        if let Some(m) = result.maneuver {
            self.log(
                LogKind::Maneuver,
                Some(attacker.id),
                Some(target.id),
                format!("{} uses {} (+{})", attacker.name(), m.maneuver.name(), m.die_roll),
            );
        }
    }

    /// Reactions the target could take against a pending hit.
    fn reaction_options(&self, pending: &PendingAttack, target: &Combatant) -> Vec<ReactionChoice> {
        let mut options = Vec::new();
        if !self.config.reactions_prompt
            || pending.kind == AttackKind::Opportunity
            || !pending.result.hit
            || !target.can_react()
        {
            return options;
        }
        let Some(character) = target.actor.as_character() else {
            return options;
        };

        let effective_total = effective_attack_total(&pending.result);
        let knows_shield = character
            .spellcasting
            .as_ref()
            .is_some_and(|s| s.knows("Shield"));
        if knows_shield
            && target.lowest_available_slot(1).is_some()
            && !pending.result.critical
            && effective_total < pending.result.target_ac + 5
        {
            options.push(ReactionChoice::Shield);
        }
        if character.has_uncanny_dodge() {
            options.push(ReactionChoice::UncannyDodge);
        }
        if !pending.result.ranged
            && target.knows_maneuver(Maneuver::Parry)
            && target.feature_uses(features::SUPERIORITY_DICE) > 0
        {
            options.push(ReactionChoice::Parry);
        }
        options
    }

    /// Take a reaction against the pending attack and finish it.
    pub fn resolve_reaction(&mut self, choice: ReactionChoice) -> CombatResult<AttackOutcome> {
        let Activity::AwaitingReaction(ctx) = &self.state.activity else {
            return Err(CombatError::NoPendingReaction);
        };
        if !ctx.options.contains(&choice) {
            return Err(CombatError::InvalidTarget(format!(
                "{} is not available",
                choice.name()
            )));
        }
        let Activity::AwaitingReaction(ctx) = std::mem::take(&mut self.state.activity) else {
            return Err(CombatError::NoPendingReaction);
        };
        let reactor_id = ctx.reactor;
        let mut pending = ctx.pending;
        let reactor = self.get_mut(reactor_id)?;
        reactor.turn.has_reacted = true;
        let name = reactor.name().to_string();

        let mut damage_override = None;
        match choice {
            ReactionChoice::Shield => {
                let level = reactor
                    .lowest_available_slot(1)
                    .ok_or_else(|| CombatError::NoResourceRemaining("spell slot".to_string()))?;
                reactor.spend_feature(&features::spell_slot(level));
                let shielded_ac = pending.result.target_ac + 5;
                let blocked = effective_attack_total(&pending.result) < shielded_ac;
                if blocked {
                    pending.result.hit = false;
                    pending.result.damage = None;
                    pending.result.bonus_damage.clear();
                }
                self.log(
                    LogKind::Reaction,
                    Some(reactor_id),
                    None,
                    format!(
                        "{name} casts Shield (AC {shielded_ac}): {}",
                        if blocked { "the attack misses" } else { "the attack still hits" }
                    ),
                );
            }
            ReactionChoice::UncannyDodge => {
                let halved = pending.result.total_damage() / 2;
                damage_override = Some(halved);
                self.log(
                    LogKind::Reaction,
                    Some(reactor_id),
                    None,
                    format!("{name} uses Uncanny Dodge, taking {halved}"),
                );
            }
            ReactionChoice::Parry => {
                let die = superiority_die(reactor)
                    .ok_or_else(|| CombatError::NoResourceRemaining("superiority dice".to_string()))?;
                if !reactor.spend_feature(features::SUPERIORITY_DICE) {
                    return Err(CombatError::NoResourceRemaining("superiority dice".to_string()));
                }
                let dex = reactor.actor.ability_modifier(Ability::Dexterity);
                let reduction = (self.roller.roll_die(die.sides()) as i32 + dex).max(0);
                let reduced = (pending.result.total_damage() - reduction).max(0);
                damage_override = Some(reduced);
                self.log(
                    LogKind::Reaction,
                    Some(reactor_id),
                    None,
                    format!("{name} parries, reducing the damage by {reduction}"),
                );
            }
        }
        tracing::debug!(reactor = %reactor_id, choice = choice.name(), "reaction resolved");
        self.land_attack(pending, damage_override, Some(choice))
    }

    /// Decline the reaction and let the attack land.
    pub fn skip_reaction(&mut self) -> CombatResult<AttackOutcome> {
        let Activity::AwaitingReaction(ctx) = std::mem::take(&mut self.state.activity) else {
            return Err(CombatError::NoPendingReaction);
        };
        self.land_attack(ctx.pending, None, None)
    }

    /// Apply an attack's damage, maneuver, and mastery.
    fn land_attack(
        &mut self,
        pending: PendingAttack,
        damage_override: Option<i32>,
        reaction: Option<ReactionChoice>,
    ) -> CombatResult<AttackOutcome> {
        let result = pending.result;
        let attacker_id = result.attacker;
        let target_id = result.target;

        let mut damage_dealt = 0;
        if result.hit {
            damage_dealt = damage_override.unwrap_or_else(|| result.total_damage());
            let target_name = self.name_of(target_id);
            self.log_detailed(
                LogKind::Damage,
                Some(attacker_id),
                Some(target_id),
                format!("{target_name} takes {damage_dealt} {} damage", result.damage_type),
                result.damage_breakdown(),
            );
            self.apply_damage(target_id, damage_dealt, result.damage_type, result.critical)?;
        }

        let mut maneuver_save = None;
        if result.hit && !self.state.phase.is_over() {
            if let Some(maneuver) = pending.maneuver {
                maneuver_save = self.apply_maneuver(attacker_id, target_id, maneuver)?;
            }
        }

        let mut mastery = None;
        if pending.kind != AttackKind::Opportunity && !self.state.phase.is_over() {
            if let Some(weapon_id) = &pending.weapon_id {
                mastery = self.apply_mastery(attacker_id, target_id, weapon_id, result.hit, pending.kind)?;
            }
        }

        Ok(AttackOutcome {
            result,
            kind: pending.kind,
            damage_dealt,
            awaiting_reaction: false,
            reaction,
            mastery,
            maneuver_save,
        })
    }

    fn apply_maneuver(
        &mut self,
        attacker_id: CombatantId,
        target_id: CombatantId,
        maneuver: Maneuver,
    ) -> CombatResult<Option<SaveResult>> {
        let dc = maneuver_save_dc(&self.get(attacker_id)?.actor);
        let target = self
            .state
            .combatant(target_id)
            .ok_or(CombatError::UnknownCombatant(target_id))?;
        if target.current_hp <= 0 {
            return Ok(None);
        }
        let (ability, against) = match maneuver {
            Maneuver::TripAttack => (Ability::Strength, Some(Condition::Prone)),
            Maneuver::PushingAttack => (Ability::Strength, None),
            Maneuver::MenacingAttack => (Ability::Wisdom, Some(Condition::Frightened)),
            Maneuver::PrecisionAttack | Maneuver::Parry => return Ok(None),
        };
        if matches!(maneuver, Maneuver::TripAttack | Maneuver::PushingAttack)
            && target.size() > CreatureSize::Large
        {
            return Ok(None);
        }
        let mut ctx = SaveContext::default();
        if let Some(condition) = against {
            ctx = ctx.against(condition);
        }
        let save = saving_throw(self.roller.as_mut(), target, ability, dc, &ctx);
        let target_name = target.name().to_string();
        self.log_detailed(
            LogKind::Save,
            Some(target_id),
            Some(attacker_id),
            format!(
                "{target_name} {} against {}",
                if save.success { "resists" } else { "fails" },
                maneuver.name()
            ),
            save.roll.breakdown(),
        );
        if save.success {
            return Ok(Some(save));
        }

        match maneuver {
            Maneuver::TripAttack => {
                self.apply_condition(target_id, ActiveCondition::new(Condition::Prone).with_source("Trip Attack"))?;
            }
            Maneuver::MenacingAttack => {
                self.apply_condition(
                    target_id,
                    ActiveCondition::new(Condition::Frightened)
                        .with_source("Menacing Attack")
                        .until_turn_start_of(attacker_id),
                )?;
            }
            Maneuver::PushingAttack => {
                let attacker = self.get(attacker_id)?;
                let target = self.get(target_id)?;
                if let Some(dir) = attacker
                    .position
                    .zip(target.position)
                    .and_then(|(a, t)| Direction8::snap(a, t))
                {
                    let (to, squares) =
                        push_destination(&self.state.grid, target, dir, PUSHING_ATTACK_SQUARES);
                    if squares > 0 {
                        self.relocate(target_id, to)?;
                        self.log(
                            LogKind::Maneuver,
                            Some(attacker_id),
                            Some(target_id),
                            format!("{target_name} is pushed to {to}"),
                        );
                    }
                }
            }
            Maneuver::PrecisionAttack | Maneuver::Parry => {}
        }
        Ok(Some(save))
    }

    fn apply_mastery(
        &mut self,
        attacker_id: CombatantId,
        target_id: CombatantId,
        weapon_id: &str,
        hit: bool,
        kind: AttackKind,
    ) -> CombatResult<Option<MasteryResult>> {
        let attacker = self.get(attacker_id)?.clone();
        let target = self.get(target_id)?.clone();
        let Ok(profile) = AttackProfile::for_source(&attacker.actor, &AttackSource::Weapon(weapon_id.to_string())) else {
            return Ok(None);
        };
        let ctx = MasteryContext {
            grid: &self.state.grid,
            roster: &self.state.combatants,
            round: self.state.round,
        };
        let Some(result) = resolve_mastery(self.roller.as_mut(), ctx, &attacker, &target, &profile, hit) else {
            return Ok(None);
        };
        // Cleave only chains off an Attack-action hit, never off itself.
        if matches!(result.effect, MasteryEffect::Cleave { .. }) && kind != AttackKind::Action {
            return Ok(None);
        }
        // Nick is spent by the off-hand attack itself.
        if matches!(result.effect, MasteryEffect::Nick { .. }) {
            return Ok(Some(result));
        }
        if !result.applied {
            return Ok(Some(result));
        }
        let target_alive = target.current_hp > 0;

        match &result.effect {
            MasteryEffect::Sap if target_alive => {
                self.apply_condition(
                    target_id,
                    ActiveCondition::new(Condition::Sapped)
                        .with_source("Sap")
                        .until_turn_start_of(attacker_id),
                )?;
            }
            MasteryEffect::Vex { expires_round } => {
                self.get_mut(attacker_id)?.vex = Some(VexMark {
                    target: target_id,
                    expires_round: *expires_round,
                });
            }
            MasteryEffect::Push { to, .. } if target_alive => {
                self.relocate(target_id, *to)?;
            }
            MasteryEffect::Slow { .. } if target_alive => {
                let target = self.get_mut(target_id)?;
                target
                    .conditions
                    .retain(|c| !(c.condition == Condition::Slowed && c.source.as_deref() == Some("Slow")));
                self.apply_condition(
                    target_id,
                    ActiveCondition::new(Condition::Slowed)
                        .with_source("Slow")
                        .until_turn_start_of(attacker_id),
                )?;
            }
            MasteryEffect::Topple { prone: true, .. } if target_alive => {
                self.apply_condition(target_id, ActiveCondition::new(Condition::Prone).with_source("Topple"))?;
            }
            MasteryEffect::Graze { damage } => {
                self.apply_damage(target_id, *damage, profile.damage_type, false)?;
            }
            MasteryEffect::Cleave { candidates } => {
                let attacker = self.get_mut(attacker_id)?;
                if !attacker.turn.cleave_used {
                    attacker.turn.cleave_candidates = candidates.clone();
                }
            }
            _ => {}
        }
        let target_name = target.name().to_string();
        self.log(
            LogKind::Mastery,
            Some(attacker_id),
            Some(target_id),
            format!("{}: {}", result.mastery.name(), result.describe(&target_name)),
        );
        Ok(Some(result))
    }

    /// Move a combatant's footprint without spending movement (forced movement).
    fn relocate(&mut self, id: CombatantId, to: Position) -> CombatResult<()> {
        self.state.grid.vacate(id);
        let combatant = self.get_mut(id)?;
        combatant.position = Some(to);
        let footprint = combatant.footprint();
        let dead = combatant.is_dead();
        if !dead {
            self.state.grid.occupy(id, to, footprint);
        }
        debug_assert!(self.state.occupancy_consistent());
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Spells
    // ------------------------------------------------------------------------

    /// Cast a spell from the caster's list.
    ///
    /// `slot` picks an upcast level; `None` uses the spell's own level.
    pub fn cast_spell(
        &mut self,
        caster_id: CombatantId,
        spell_name: &str,
        slot: Option<u8>,
        target: SpellTarget,
    ) -> CombatResult<SpellOutcome> {
        let caster = self.require_actor(caster_id)?;
        let spell = get_spell(spell_name).ok_or_else(|| CombatError::UnknownSpell(spell_name.to_string()))?;
        match spell.casting_time {
            CastingTime::Action if caster.turn.has_acted => {
                return Err(CombatError::AlreadyActed(caster.name().to_string()));
            }
            CastingTime::BonusAction if caster.turn.has_bonus_acted => {
                return Err(CombatError::AlreadyActed(caster.name().to_string()));
            }
            _ => {}
        }
        let plan = plan_cast(&self.state.grid, &self.state.combatants, caster, spell, slot, &target)?;
        if plan.slot_level > 0 && caster.spell_slots(plan.slot_level) == 0 {
            return Err(CombatError::NoResourceRemaining(format!(
                "level {} spell slot",
                plan.slot_level
            )));
        }

        match spell.casting_time {
            CastingTime::BonusAction => self.take_bonus_action(caster_id)?,
            _ => self.take_action(caster_id)?,
        }
        let caster = self.get_mut(caster_id)?;
        if plan.slot_level > 0 {
            caster.spend_feature(&features::spell_slot(plan.slot_level));
        }
        let caster_name = caster.name().to_string();
        self.state.casts += 1;
        let source = spell_source(&spell.name, self.state.casts, &caster_name);

        if spell.concentration {
            self.end_concentration(caster_id);
            self.get_mut(caster_id)?.concentration = Some(Concentration {
                spell: spell.name.clone(),
                source: source.clone(),
            });
        }

        let level_note = if plan.slot_level > spell.level {
            format!(" at level {}", plan.slot_level)
        } else {
            String::new()
        };
        tracing::info!(caster = %caster_name, spell = %spell.name, slot = plan.slot_level, targets = plan.targets.len(), "spell cast");
        self.log(
            LogKind::Spell,
            Some(caster_id),
            None,
            format!("{caster_name} casts {}{level_note}", spell.name),
        );

        let caster = self.get(caster_id)?.clone();
        let round = self.state.round;
        let hits = resolve_cast(
            self.roller.as_mut(),
            &plan,
            &caster,
            &self.state.combatants,
            &source,
            round,
        )?;
        for hit in &hits {
            self.apply_spell_hit(caster_id, &spell.name, hit)?;
        }

        let mut zone_id = None;
        if let Some(template) = &spell.zone {
            let id = self.state.next_zone_id;
            self.state.next_zone_id += 1;
            let save_dc = caster.actor.as_character().and_then(|c| c.spell_save_dc());
            let zone = plan_zone(id, template, plan.cells.clone(), caster_id, &source, save_dc);
            self.log_detailed(
                LogKind::Spell,
                Some(caster_id),
                None,
                format!("{} fills {} cells with {}", spell.name, zone.cells.len(), zone.kind.name()),
                format!("zone {id}"),
            );
            self.state.zones.push(zone);
            zone_id = Some(id);
        }

        Ok(SpellOutcome {
            spell: spell.name.clone(),
            caster: caster_id,
            slot_level: plan.slot_level,
            source,
            cells: plan.cells,
            hits,
            zone: zone_id,
        })
    }

    fn apply_spell_hit(&mut self, caster_id: CombatantId, spell: &str, hit: &SpellHit) -> CombatResult<()> {
        let target_name = self.name_of(hit.target);
        let check = match &hit.check {
            SpellCheck::Attack { roll, hit: landed, .. } => {
                format!("{} ({})", roll.breakdown(), if *landed { "hit" } else { "miss" })
            }
            SpellCheck::Save(save) => format!(
                "{} save {} vs DC {}: {}",
                save.ability.abbreviation(),
                save.roll.total,
                save.dc,
                if save.success { "success" } else { "failure" }
            ),
            SpellCheck::AutoHit => "automatic".to_string(),
        };
        self.log_detailed(
            LogKind::Spell,
            Some(caster_id),
            Some(hit.target),
            format!("{spell} affects {target_name}"),
            check,
        );

        if hit.damage > 0 {
            let damage_type = hit.damage_type.unwrap_or(DamageType::Force);
            self.log(
                LogKind::Damage,
                Some(caster_id),
                Some(hit.target),
                format!("{target_name} takes {} {damage_type} damage", hit.damage),
            );
            self.apply_damage(hit.target, hit.damage, damage_type, hit.critical)?;
        }
        if hit.healing > 0 {
            self.heal_damage(hit.target, hit.healing)?;
        }
        if let Some(condition) = &hit.condition {
            if !self.get(hit.target)?.is_dead() {
                self.apply_condition(hit.target, condition.clone())?;
            }
        }
        Ok(())
    }

    /// Drop a caster's concentration, clearing every condition and zone it sustained.
    pub fn end_concentration(&mut self, caster_id: CombatantId) -> Option<String> {
        let concentration = self.state.combatant_mut(caster_id)?.concentration.take()?;
        let removed = self.remove_conditions_by_source(&concentration.source);
        let name = self.name_of(caster_id);
        tracing::debug!(caster = %name, spell = %concentration.spell, removed, "concentration ended");
        self.log(
            LogKind::Spell,
            Some(caster_id),
            None,
            format!("{name} stops concentrating on {}", concentration.spell),
        );
        Some(concentration.spell)
    }

    // ------------------------------------------------------------------------
    // HP
    // ------------------------------------------------------------------------

    /// Deal damage from an outside source (traps, zone effects, the DM).
    pub fn deal_damage(
        &mut self,
        id: CombatantId,
        amount: i32,
        damage_type: DamageType,
    ) -> CombatResult<DamageOutcome> {
        self.require_idle()?;
        let name = self.name_of(id);
        self.log(LogKind::Damage, None, Some(id), format!("{name} takes {amount} {damage_type} damage"));
        self.apply_damage(id, amount, damage_type, false)
    }

    fn apply_damage(
        &mut self,
        id: CombatantId,
        amount: i32,
        damage_type: DamageType,
        critical: bool,
    ) -> CombatResult<DamageOutcome> {
        let massive_rule = self.config.massive_damage;
        let target = self.get_mut(id)?;
        let mut outcome = DamageOutcome {
            target: id,
            amount: amount.max(0),
            absorbed_by_temp_hp: 0,
            hp_after: target.current_hp,
            dropped_to_zero: false,
            killed: false,
            relentless_endurance: false,
            concentration_lost: false,
        };
        if target.is_dead() || amount <= 0 {
            return Ok(outcome);
        }

        let absorbed = target.temporary_hp.min(amount);
        target.temporary_hp -= absorbed;
        outcome.absorbed_by_temp_hp = absorbed;
        let remaining = amount - absorbed;
        let name = target.name().to_string();
        tracing::debug!(target = %name, amount, absorbed, %damage_type, "damage");
        if remaining == 0 {
            return Ok(outcome);
        }

        let was_at_zero = target.current_hp <= 0;
        let is_character = target.is_character();
        if was_at_zero && is_character {
            // Damage at 0 HP costs death saves instead.
            if massive_rule && remaining >= target.max_hp {
                target.death_saves.add_failures(3);
            } else {
                target.death_saves.add_failures(if critical { 2 } else { 1 });
            }
            target.is_stable = false;
            outcome.killed = target.is_dead();
            outcome.hp_after = 0;
        } else {
            let new_hp = target.current_hp - remaining;
            if new_hp > 0 {
                target.current_hp = new_hp;
            } else if is_character {
                let overflow = -new_hp;
                let relentless = target
                    .racial_ability_uses
                    .get(features::RELENTLESS_ENDURANCE)
                    .is_some_and(|&n| n > 0);
                if massive_rule && overflow >= target.max_hp {
                    target.current_hp = 0;
                    target.death_saves.add_failures(3);
                    outcome.killed = true;
                } else if relentless {
                    if let Some(n) = target.racial_ability_uses.get_mut(features::RELENTLESS_ENDURANCE) {
                        *n -= 1;
                    }
                    target.current_hp = 1;
                    outcome.relentless_endurance = true;
                } else {
                    target.current_hp = 0;
                    target.death_saves.reset();
                    target.is_stable = false;
                    target.conditions.push(
                        ActiveCondition::new(Condition::Unconscious).with_source(DYING_SOURCE),
                    );
                    outcome.dropped_to_zero = true;
                }
            } else {
                target.current_hp = 0;
                outcome.dropped_to_zero = true;
                outcome.killed = true;
            }
            outcome.hp_after = target.current_hp;
        }

        // Damage wakes sleepers and may shake off other effects.
        let woken: Vec<ActiveCondition> = target
            .conditions
            .iter()
            .filter(|c| c.ends_on_damage)
            .cloned()
            .collect();
        target.conditions.retain(|c| !c.ends_on_damage);
        let on_damage: Vec<ActiveCondition> = target
            .conditions
            .iter()
            .filter(|c| c.repeat_save.is_some_and(|r| r.on_damage))
            .cloned()
            .collect();
        let concentrating = target.concentration.is_some();
        let hp_after = target.current_hp;

        if outcome.relentless_endurance {
            self.log(
                LogKind::Damage,
                Some(id),
                None,
                format!("{name} refuses to fall (Relentless Endurance)"),
            );
        }
        for condition in woken {
            self.log(
                LogKind::Condition,
                Some(id),
                None,
                format!("{name} is no longer {}", condition.condition.name()),
            );
        }
        for condition in on_damage {
            self.repeat_save(id, &condition);
        }

        if concentrating {
            if hp_after <= 0 {
                outcome.concentration_lost = self.end_concentration(id).is_some();
            } else {
                let dc = (remaining / 2).max(10);
                let target = self
                    .state
                    .combatant(id)
                    .ok_or(CombatError::UnknownCombatant(id))?;
                let save = saving_throw(
                    self.roller.as_mut(),
                    target,
                    Ability::Constitution,
                    dc,
                    &SaveContext::default(),
                );
                self.log_detailed(
                    LogKind::Save,
                    Some(id),
                    None,
                    format!(
                        "{name} {} concentration",
                        if save.success { "maintains" } else { "loses" }
                    ),
                    format!("{} vs DC {dc}", save.roll.breakdown()),
                );
                if !save.success {
                    outcome.concentration_lost = self.end_concentration(id).is_some();
                }
            }
        }

        if outcome.killed {
            self.on_death(id);
        } else if outcome.dropped_to_zero {
            self.log(LogKind::Death, Some(id), None, format!("{name} falls unconscious"));
        }
        self.update_combat_end();
        Ok(outcome)
    }

    /// A creature died: free its cells and drop what it sustained.
    fn on_death(&mut self, id: CombatantId) {
        self.state.grid.vacate(id);
        self.end_concentration(id);
        let name = self.name_of(id);
        tracing::info!(combatant = %name, "died");
        self.log(LogKind::Death, Some(id), None, format!("{name} dies"));
    }

    /// Restore HP up to the maximum. Returns the HP actually restored.
    pub fn heal_damage(&mut self, id: CombatantId, amount: i32) -> CombatResult<i32> {
        let target = self.get_mut(id)?;
        if target.is_dead() {
            return Err(CombatError::InvalidTarget(format!("{} is dead", target.name())));
        }
        let was_down = target.current_hp <= 0;
        let before = target.current_hp.max(0);
        target.current_hp = (before + amount.max(0)).min(target.max_hp);
        let healed = target.current_hp - before;
        if was_down && target.current_hp > 0 {
            target.death_saves.reset();
            target.is_stable = false;
            target.remove_conditions_by_source(DYING_SOURCE);
        }
        let name = target.name().to_string();
        self.log(LogKind::Heal, None, Some(id), format!("{name} regains {healed} HP"));
        Ok(healed)
    }

    /// Temporary HP never stack; the larger pool wins.
    pub fn grant_temporary_hp(&mut self, id: CombatantId, amount: i32) -> CombatResult<i32> {
        let target = self.get_mut(id)?;
        target.temporary_hp = target.temporary_hp.max(amount);
        Ok(target.temporary_hp)
    }

    // ------------------------------------------------------------------------
    // Conditions
    // ------------------------------------------------------------------------

    /// Attach a condition. Size changes re-claim grid cells.
    pub fn apply_condition(&mut self, id: CombatantId, condition: ActiveCondition) -> CombatResult<()> {
        let target = self.get(id)?;
        let mut after = target.clone();
        after.conditions.push(condition.clone());
        if after.footprint() != target.footprint() {
            if let Some(anchor) = target.position {
                if !self.state.grid.footprint_clear(anchor, after.footprint(), Some(id), false) {
                    return Err(CombatError::DestinationBlocked);
                }
            }
        }
        let name = target.name().to_string();
        let label = condition.condition.name();
        let resized = after.footprint() != target.footprint();
        let combatant = self.get_mut(id)?;
        combatant.conditions.push(condition);
        if resized {
            self.reclaim_cells(id)?;
        }
        tracing::debug!(target = %name, condition = label, "condition applied");
        self.log(LogKind::Condition, None, Some(id), format!("{name} is {label}"));
        Ok(())
    }

    /// Remove every instance of a condition. Returns whether any was removed.
    ///
    /// A creature that regrows into occupied cells squeezes; if even the
    /// squeeze footprint is blocked the removal is refused.
    pub fn remove_condition(&mut self, id: CombatantId, condition: Condition) -> CombatResult<bool> {
        let target = self.get_mut(id)?;
        let kept = target.conditions.clone();
        let before = target.size();
        let removed = target.remove_condition(condition);
        let resized = target.size() != before;
        let name = target.name().to_string();
        if resized {
            if let Err(err) = self.reclaim_cells(id) {
                self.get_mut(id)?.conditions = kept;
                return Err(err);
            }
        }
        if removed {
            self.log(
                LogKind::Condition,
                None,
                Some(id),
                format!("{name} is no longer {}", condition.name()),
            );
        }
        Ok(removed)
    }

    /// Remove every condition and zone carrying `source`. Returns the count removed.
    pub fn remove_conditions_by_source(&mut self, source: &str) -> usize {
        let ids: Vec<CombatantId> = self.state.combatants.iter().map(|c| c.id).collect();
        let mut removed: usize = ids
            .into_iter()
            .map(|id| self.strip_source(id, source))
            .sum();
        let zones_before = self.state.zones.len();
        self.state.zones.retain(|z| z.source != source);
        removed += zones_before - self.state.zones.len();
        removed
    }

    /// Remove one creature's conditions carrying `source`.
    fn strip_source(&mut self, id: CombatantId, source: &str) -> usize {
        let Some(combatant) = self.state.combatant_mut(id) else {
            return 0;
        };
        let before = combatant.size();
        let gone = combatant.remove_conditions_by_source(source);
        if gone.is_empty() {
            return 0;
        }
        let resized = combatant.size() != before;
        let names: Vec<&str> = gone.iter().map(Condition::name).collect();
        let line = format!("{} is no longer {}", combatant.name(), names.join(", "));
        if resized {
            if let Err(err) = self.reclaim_cells(id) {
                tracing::warn!(%id, %err, "no room to regrow; keeping previous cells");
            }
        }
        self.log(LogKind::Condition, None, Some(id), line);
        gone.len()
    }

    /// Re-claim grid cells after a size change. Returns whether the creature
    /// had to squeeze to fit.
    fn reclaim_cells(&mut self, id: CombatantId) -> CombatResult<bool> {
        let combatant = self.get(id)?;
        let Some(anchor) = combatant.position else {
            return Ok(false);
        };
        if combatant.is_dead() {
            return Ok(false);
        }
        let full = combatant.size().footprint();
        let grid = &self.state.grid;
        let squeezing = if grid.footprint_clear(anchor, full, Some(id), false) {
            false
        } else if full > 1 && grid.footprint_clear(anchor, full - 1, Some(id), false) {
            true
        } else {
            return Err(CombatError::DestinationBlocked);
        };

        let combatant = self.get_mut(id)?;
        combatant.squeezing = squeezing;
        let footprint = combatant.footprint();
        let name = combatant.name().to_string();
        self.state.grid.vacate(id);
        self.state.grid.occupy(id, anchor, footprint);
        if squeezing {
            self.log(LogKind::Movement, Some(id), None, format!("{name} squeezes into the space it has"));
        }
        tracing::debug!(%id, footprint, squeezing, "cells reclaimed");
        Ok(squeezing)
    }

    pub fn zones(&self) -> &[Zone] {
        &self.state.zones
    }

    // ------------------------------------------------------------------------
    // Standard actions
    // ------------------------------------------------------------------------

    pub fn dash(&mut self, id: CombatantId) -> CombatResult<u32> {
        self.require_actor(id)?;
        self.take_action(id)?;
        let combatant = self.get_mut(id)?;
        combatant.turn.dashes += 1;
        let remaining = combatant.remaining_movement();
        let name = combatant.name().to_string();
        self.log(LogKind::Turn, Some(id), None, format!("{name} dashes"));
        Ok(remaining)
    }

    pub fn dodge(&mut self, id: CombatantId) -> CombatResult<()> {
        self.require_actor(id)?;
        self.take_action(id)?;
        self.apply_condition(id, ActiveCondition::new(Condition::Dodging).until_turn_start_of(id))
    }

    pub fn disengage(&mut self, id: CombatantId) -> CombatResult<()> {
        self.require_actor(id)?;
        self.take_action(id)?;
        self.apply_condition(id, ActiveCondition::new(Condition::Disengaging).until_turn_start_of(id))
    }

    /// Standing up costs half the creature's speed.
    pub fn stand_up(&mut self, id: CombatantId) -> CombatResult<()> {
        let combatant = self.require_actor(id)?;
        if !combatant.has_condition(Condition::Prone) {
            return Err(CombatError::InvalidTarget(format!("{} is not prone", combatant.name())));
        }
        let cost = combatant.actor.speed().walk / 2;
        if combatant.effective_speed() == 0 || combatant.remaining_movement() < cost {
            return Err(CombatError::NoResourceRemaining("movement".to_string()));
        }
        self.get_mut(id)?.turn.movement_used += cost;
        self.remove_condition(id, Condition::Prone)?;
        Ok(())
    }

    pub fn action_surge(&mut self, id: CombatantId) -> CombatResult<()> {
        self.require_actor(id)?;
        let combatant = self.get_mut(id)?;
        if !combatant.turn.has_acted {
            return Err(CombatError::InvalidTarget("the action is still unused".to_string()));
        }
        if !combatant.spend_feature(features::ACTION_SURGE) {
            return Err(CombatError::NoResourceRemaining("Action Surge".to_string()));
        }
        combatant.turn.has_acted = false;
        combatant.turn.attacks_remaining = 0;
        let name = combatant.name().to_string();
        self.log(LogKind::Turn, Some(id), None, format!("{name} surges into action"));
        Ok(())
    }

    /// Bonus action heal of 1d10 + fighter level.
    pub fn second_wind(&mut self, id: CombatantId) -> CombatResult<i32> {
        let combatant = self.require_actor(id)?;
        let dice = combatant
            .actor
            .as_character()
            .and_then(second_wind_dice)
            .ok_or_else(|| CombatError::NoResourceRemaining("Second Wind".to_string()))?;
        if combatant.feature_uses(features::SECOND_WIND) == 0 {
            return Err(CombatError::NoResourceRemaining("Second Wind".to_string()));
        }
        self.take_bonus_action(id)?;
        self.get_mut(id)?.spend_feature(features::SECOND_WIND);
        let rolled = dice.roll_with(self.roller.as_mut());
        let name = self.name_of(id);
        self.log_detailed(LogKind::Heal, Some(id), None, format!("{name} uses Second Wind"), rolled.to_string());
        self.heal_damage(id, rolled.non_negative_total())
    }

    // ------------------------------------------------------------------------
    // Saves
    // ------------------------------------------------------------------------

    /// Roll a death save for a dying character.
    pub fn roll_death_save(&mut self, id: CombatantId) -> CombatResult<DeathSaveOutcome> {
        self.require_combat()?;
        let combatant = self.get(id)?;
        if !combatant.is_dying() {
            return Err(CombatError::InvalidTarget(format!("{} is not dying", combatant.name())));
        }
        self.resolve_death_save(id)
            .ok_or(CombatError::UnknownCombatant(id))
    }

    fn resolve_death_save(&mut self, id: CombatantId) -> Option<DeathSaveOutcome> {
        let combatant = self.state.combatant(id)?;
        let outcome = death_save(self.roller.as_mut(), combatant);
        let combatant = self.state.combatant_mut(id)?;
        let name = combatant.name().to_string();
        let message = match outcome.result {
            DeathSaveResult::Success => {
                if combatant.death_saves.add_success() {
                    combatant.is_stable = true;
                    format!("{name} succeeds on a death save and stabilizes")
                } else {
                    format!("{name} succeeds on a death save")
                }
            }
            DeathSaveResult::Failure => {
                combatant.death_saves.add_failures(1);
                format!("{name} fails a death save")
            }
            DeathSaveResult::CriticalFailure => {
                combatant.death_saves.add_failures(2);
                format!("{name} fails a death save badly")
            }
            DeathSaveResult::Revived => {
                combatant.current_hp = 1;
                combatant.death_saves.reset();
                combatant.is_stable = false;
                combatant.remove_conditions_by_source(DYING_SOURCE);
                format!("{name} surges back to consciousness")
            }
        };
        let dead = combatant.is_dead();
        self.log_detailed(LogKind::DeathSave, Some(id), None, message, outcome.roll.breakdown());
        if dead {
            self.on_death(id);
            self.update_combat_end();
        }
        Some(outcome)
    }

    /// Roll a saving throw for an outside effect (zones, traps).
    pub fn saving_throw(&mut self, id: CombatantId, ability: Ability, dc: i32) -> CombatResult<SaveResult> {
        let combatant = self
            .state
            .combatant(id)
            .ok_or(CombatError::UnknownCombatant(id))?;
        let save = saving_throw(self.roller.as_mut(), combatant, ability, dc, &SaveContext::default());
        let name = combatant.name().to_string();
        self.log_detailed(
            LogKind::Save,
            Some(id),
            None,
            format!("{name} {} a DC {dc} {} save", if save.success { "makes" } else { "fails" }, ability.abbreviation()),
            save.roll.breakdown(),
        );
        Ok(save)
    }

    // ------------------------------------------------------------------------
    // End of combat
    // ------------------------------------------------------------------------

    /// Check for victory or defeat and enter the final phase if reached.
    pub fn check_combat_end(&mut self) -> Option<Phase> {
        self.update_combat_end()
    }

    fn update_combat_end(&mut self) -> Option<Phase> {
        if self.state.phase.is_over() {
            return Some(self.state.phase);
        }
        if self.state.phase != Phase::Combat {
            return None;
        }
        let end = self.state.check_combat_end()?;
        self.state.phase = end;
        self.state.activity = Activity::Idle;
        tracing::info!(phase = end.name(), round = self.state.round, "combat over");
        let message = match end {
            Phase::Victory => "Victory! All enemies are down",
            _ => "Defeat. The party has fallen",
        };
        self.log(LogKind::System, None, None, message);
        Some(end)
    }

    /// Return to setup with everyone fully restored in place.
    pub fn reset_to_setup(&mut self) {
        let state = &mut self.state;
        state.phase = Phase::Setup;
        state.round = 0;
        state.turn_order.clear();
        state.turn_index = 0;
        state.activity = Activity::Idle;
        state.zones.clear();
        for combatant in &mut state.combatants {
            combatant.current_hp = combatant.max_hp;
            combatant.temporary_hp = 0;
            combatant.initiative = None;
            combatant.conditions.clear();
            combatant.turn = TurnFlags::default();
            combatant.vex = None;
            combatant.death_saves.reset();
            combatant.is_stable = false;
            combatant.concentration = None;
            combatant.squeezing = false;
            combatant.restore_resources();
        }
        for index in 0..state.combatants.len() {
            let (id, anchor, footprint) = {
                let c = &state.combatants[index];
                (c.id, c.position, c.footprint())
            };
            state.grid.vacate(id);
            if let Some(anchor) = anchor {
                if state.grid.footprint_clear(anchor, footprint, Some(id), false) {
                    state.grid.occupy(id, anchor, footprint);
                } else {
                    state.combatants[index].position = None;
                }
            }
        }
        tracing::info!("reset to setup");
        self.log(LogKind::System, None, None, "Combat reset");
    }
}

/// Attack total including a Precision Attack die.
fn effective_attack_total(result: &AttackResult) -> i32 {
    let precision = result
        .maneuver
        .filter(|m| m.maneuver == Maneuver::PrecisionAttack)
        .map_or(0, |m| m.die_roll as i32);
    result.roll.total + precision
}
