//! Grid-based D&D 5e tactical combat engine.
//!
//! This crate provides:
//! - A square grid with terrain, obstacles, elevation and line of sight
//! - Multi-cell creature footprints, squeezing, and A* pathfinding
//! - Attacks, saving throws, weapon masteries and Battle Master maneuvers
//! - Spellcasting with areas of effect, concentration and lingering zones
//! - Turn order, reactions, opportunity attacks and death saves
//!
//! # Quick Start
//!
//! ```no_run
//! use tactics_core::{testing, CombatEngine, EngineConfig, Grid, Position};
//!
//! # fn main() -> Result<(), tactics_core::CombatError> {
//! let mut engine = CombatEngine::new(Grid::new(20, 20), EngineConfig::new().with_seed(7));
//! let hero = engine.add_combatant_at(testing::character(testing::sample_fighter()), Position::new(2, 2))?;
//! let goblin = engine.add_combatant_at(testing::monster(testing::sample_goblin()), Position::new(3, 2))?;
//! engine.start_combat()?;
//!
//! if engine.current_combatant_id() == Some(hero) {
//!     let outcome = engine.attack(hero, goblin, Default::default())?;
//!     println!("hit: {}", outcome.result.hit);
//! }
//! for entry in engine.state().log.entries() {
//!     println!("{}", entry.message);
//! }
//! # Ok(())
//! # }
//! ```

pub mod aoe;
pub mod combat;
pub mod config;
pub mod dice;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod items;
pub mod log;
pub mod mastery;
pub mod pathfinding;
pub mod size;
pub mod spellcasting;
pub mod spells;
pub mod state;
pub mod testing;
pub mod world;

// Primary public API
pub use combat::{AttackResult, AttackSource, SaveResult};
pub use config::EngineConfig;
pub use dice::{DiceExpression, DieRoller, ScriptedDice};
pub use engine::{
    AttackOptions, AttackOutcome, CombatEngine, DamageOutcome, MovementOutcome, MovementStep,
    SpellOutcome,
};
pub use error::{CombatError, CombatResult};
pub use geometry::Position;
pub use grid::{Grid, Obstacle, Terrain};
pub use log::{CombatLog, LogEntry, LogKind};
pub use spellcasting::SpellTarget;
pub use state::{Activity, Combatant, CombatState, Phase, ReactionChoice};
pub use world::{
    Ability, ActiveCondition, Actor, Character, CombatantId, Condition, DamageType, Maneuver,
    Monster, Side,
};
