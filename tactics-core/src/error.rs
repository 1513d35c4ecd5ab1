//! Errors returned by combat engine operations.
//!
//! Ordinary rule outcomes (a miss, a failed save, an empty area) are not
//! errors. These variants cover operations the engine refused to perform.

use crate::dice::DiceError;
use crate::world::CombatantId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CombatError {
    #[error("No combatant with id {0}")]
    UnknownCombatant(CombatantId),

    #[error("Operation not allowed during the {0} phase")]
    InvalidPhase(&'static str),

    #[error("It is not {0}'s turn")]
    NotYourTurn(String),

    #[error("{0} has already used that action this turn")]
    AlreadyActed(String),

    #[error("No {0} remaining")]
    NoResourceRemaining(String),

    #[error("Target is out of range ({distance} ft, range {range} ft)")]
    OutOfRange { distance: u32, range: u32 },

    #[error("No line of sight to target")]
    NoLineOfSight,

    #[error("Destination is blocked")]
    DestinationBlocked,

    #[error("No path to destination within available movement")]
    PathNotFound,

    #[error("A reaction decision is pending")]
    AwaitingReaction,

    #[error("No reaction is pending")]
    NoPendingReaction,

    #[error("A movement is still in progress")]
    MovementInProgress,

    #[error("No movement is in progress")]
    NoMovementInProgress,

    #[error("{0} is incapacitated")]
    Incapacitated(String),

    #[error("Combat needs at least two combatants")]
    NotEnoughCombatants,

    #[error("Combat is over")]
    CombatOver,

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Unknown spell: {0}")]
    UnknownSpell(String),

    #[error("Unknown weapon or action: {0}")]
    UnknownWeapon(String),

    #[error("Dice error: {0}")]
    Dice(#[from] DiceError),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

pub type CombatResult<T> = Result<T, CombatError>;
