//! Engine configuration.

use crate::error::CombatError;
use crate::world::DamageType;
use serde::{Deserialize, Serialize};

/// Tunable rules for a combat engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seed for deterministic dice; `None` seeds from entropy.
    pub seed: Option<u64>,

    /// Damage rolled when a creature ends a move on hazard terrain.
    pub hazard_damage: String,

    pub hazard_damage_type: DamageType,

    /// Roll death saves automatically at the start of a dying character's turn.
    pub auto_death_saves: bool,

    pub opportunity_attacks: bool,

    /// Overflow damage of at least max HP kills a character outright.
    pub massive_damage: bool,

    /// Pause for Shield, Uncanny Dodge and Parry when they could apply.
    pub reactions_prompt: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            hazard_damage: "1d6".to_string(),
            hazard_damage_type: DamageType::Fire,
            auto_death_saves: true,
            opportunity_attacks: true,
            massive_damage: true,
            reactions_prompt: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, CombatError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_hazard_damage(mut self, dice: impl Into<String>, damage_type: DamageType) -> Self {
        self.hazard_damage = dice.into();
        self.hazard_damage_type = damage_type;
        self
    }

    pub fn with_auto_death_saves(mut self, enabled: bool) -> Self {
        self.auto_death_saves = enabled;
        self
    }

    pub fn with_opportunity_attacks(mut self, enabled: bool) -> Self {
        self.opportunity_attacks = enabled;
        self
    }

    pub fn with_massive_damage(mut self, enabled: bool) -> Self {
        self.massive_damage = enabled;
        self
    }

    pub fn with_reactions_prompt(mut self, enabled: bool) -> Self {
        self.reactions_prompt = enabled;
        self
    }
}
