//! The narrative combat log.
//!
//! An append-only list of tagged entries the UI renders as the fight's
//! story. Diagnostics go through `tracing` instead.

use crate::world::CombatantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind tag for a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Initiative,
    Turn,
    Movement,
    Attack,
    Damage,
    Heal,
    Spell,
    Condition,
    Save,
    DeathSave,
    Reaction,
    Mastery,
    Maneuver,
    Death,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: LogKind,
    pub actor: Option<CombatantId>,
    pub target: Option<CombatantId>,
    pub message: String,
    pub details: Option<String>,
    pub round: u32,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatLog {
    entries: Vec<LogEntry>,
}

impl CombatLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        kind: LogKind,
        round: u32,
        actor: Option<CombatantId>,
        target: Option<CombatantId>,
        message: impl Into<String>,
        details: Option<String>,
    ) {
        self.entries.push(LogEntry {
            kind,
            actor,
            target,
            message: message.into(),
            details,
            round,
            timestamp: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn of_kind(&self, kind: LogKind) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_filter() {
        let mut log = CombatLog::new();
        let id = CombatantId::new();
        log.push(LogKind::Attack, 1, Some(id), None, "Roland attacks", None);
        log.push(LogKind::Damage, 1, None, Some(id), "Roland takes 4", Some("[4]".into()));
        assert_eq!(log.len(), 2);
        assert_eq!(log.of_kind(LogKind::Damage).count(), 1);
        assert_eq!(log.last().and_then(|e| e.details.clone()), Some("[4]".into()));
    }

    #[test]
    fn test_entry_shape_serializes() {
        let mut log = CombatLog::new();
        log.push(LogKind::DeathSave, 3, None, None, "rolls", None);
        let json = serde_json::to_value(&log.entries()[0]).unwrap();
        assert_eq!(json["kind"], "death_save");
        assert_eq!(json["round"], 3);
        assert!(json["timestamp"].is_string());
    }
}
