//! D&D dice rolling system.
//!
//! Supports standard dice notation: XdY+Z, advantage/disadvantage,
//! keep highest/lowest, and more. Every roll goes through a [`DieRoller`]
//! so combat outcomes are deterministic given the dice.

use rand::rngs::ThreadRng;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for dice parsing and rolling.
#[derive(Debug, Error)]
pub enum DiceError {
    #[error("Invalid dice notation: {0}")]
    InvalidNotation(String),
    #[error("Invalid die size: {0}")]
    InvalidDieSize(u32),
    #[error("No dice specified")]
    NoDice,
    #[error("Cannot keep {keep} dice when only rolling {count} (in {notation})")]
    InvalidKeepCount {
        keep: u32,
        count: u32,
        notation: String,
    },
}

// ============================================================================
// Die sources
// ============================================================================

/// Anything that can produce a single die face.
pub trait DieRoller {
    /// Roll one die with the given number of sides, returning 1..=sides.
    fn roll_die(&mut self, sides: u32) -> u32;
}

impl DieRoller for ChaCha8Rng {
    fn roll_die(&mut self, sides: u32) -> u32 {
        self.gen_range(1..=sides.max(1))
    }
}

impl DieRoller for ThreadRng {
    fn roll_die(&mut self, sides: u32) -> u32 {
        self.gen_range(1..=sides.max(1))
    }
}

/// Seeded roller used by the combat engine.
pub fn seeded_roller(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// A roller that hands out queued faces first, then falls back to a seeded RNG.
///
/// Queued faces are clamped into the die's range, so a queued 20 rolled on a
/// d6 yields 6.
#[derive(Debug, Clone)]
pub struct ScriptedDice {
    queue: VecDeque<u32>,
    fallback: ChaCha8Rng,
}

impl ScriptedDice {
    pub fn new(faces: impl IntoIterator<Item = u32>) -> Self {
        Self {
            queue: faces.into_iter().collect(),
            fallback: ChaCha8Rng::seed_from_u64(0),
        }
    }

    /// Queue more faces after the ones already scripted.
    pub fn push(&mut self, faces: impl IntoIterator<Item = u32>) {
        self.queue.extend(faces);
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl Default for ScriptedDice {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl DieRoller for ScriptedDice {
    fn roll_die(&mut self, sides: u32) -> u32 {
        match self.queue.pop_front() {
            Some(face) => face.clamp(1, sides.max(1)),
            None => self.fallback.roll_die(sides),
        }
    }
}

// ============================================================================
// Advantage and d20 tests
// ============================================================================

/// Advantage state for d20 rolls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Advantage {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
}

impl Advantage {
    /// Combine two advantage states (advantage + disadvantage = normal).
    pub fn combine(self, other: Advantage) -> Advantage {
        match (self, other) {
            (Advantage::Normal, x) | (x, Advantage::Normal) => x,
            (Advantage::Advantage, Advantage::Disadvantage) => Advantage::Normal,
            (Advantage::Disadvantage, Advantage::Advantage) => Advantage::Normal,
            (Advantage::Advantage, Advantage::Advantage) => Advantage::Advantage,
            (Advantage::Disadvantage, Advantage::Disadvantage) => Advantage::Disadvantage,
        }
    }

    /// Resolve from "any advantage source" / "any disadvantage source" flags.
    ///
    /// Any number of sources on both sides cancel to a straight roll.
    pub fn from_sources(has_advantage: bool, has_disadvantage: bool) -> Advantage {
        match (has_advantage, has_disadvantage) {
            (true, false) => Advantage::Advantage,
            (false, true) => Advantage::Disadvantage,
            _ => Advantage::Normal,
        }
    }
}

/// A resolved d20 test (attack roll, saving throw, death save).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct D20Roll {
    /// Faces as finally kept, one per d20 rolled (two with advantage).
    pub faces: Vec<u32>,
    /// Original face that was rerolled, if a reroll happened.
    pub rerolled_from: Option<u32>,
    /// The face that counts.
    pub natural: u32,
    pub modifier: i32,
    pub total: i32,
    pub advantage: Advantage,
}

impl D20Roll {
    pub fn is_natural_20(&self) -> bool {
        self.natural == 20
    }

    pub fn is_natural_1(&self) -> bool {
        self.natural == 1
    }

    /// Human readable breakdown, e.g. `d20 [1→14, 9] kept 14 + 5 = 19`.
    pub fn breakdown(&self) -> String {
        let mut faces: Vec<String> = self.faces.iter().map(|f| f.to_string()).collect();
        // roll_d20 always moves the rerolled die to the front.
        if let (Some(original), Some(first)) = (self.rerolled_from, self.faces.first()) {
            faces[0] = format!("{original}→{first}");
        }
        let modifier = match self.modifier {
            m if m > 0 => format!(" + {m}"),
            m if m < 0 => format!(" - {}", m.abs()),
            _ => String::new(),
        };
        let kept = if self.faces.len() > 1 {
            format!(" kept {}", self.natural)
        } else {
            String::new()
        };
        format!(
            "d20 [{}]{}{} = {}",
            faces.join(", "),
            kept,
            modifier,
            self.total
        )
    }
}

/// Roll a d20 test.
///
/// With `reroll_ones`, the first natural 1 among the dice is rerolled once
/// and the new face must be used.
pub fn roll_d20(
    roller: &mut dyn DieRoller,
    advantage: Advantage,
    modifier: i32,
    reroll_ones: bool,
) -> D20Roll {
    let count = match advantage {
        Advantage::Normal => 1,
        Advantage::Advantage | Advantage::Disadvantage => 2,
    };
    let mut faces: Vec<u32> = (0..count).map(|_| roller.roll_die(20)).collect();

    let mut rerolled_from = None;
    if reroll_ones {
        if let Some(idx) = faces.iter().position(|&f| f == 1) {
            rerolled_from = Some(1);
            faces[idx] = roller.roll_die(20);
            // Keep the rerolled die first so the breakdown can annotate it.
            faces.swap(0, idx);
        }
    }

    let natural = match advantage {
        Advantage::Normal => faces[0],
        Advantage::Advantage => faces.iter().copied().max().unwrap_or(1),
        Advantage::Disadvantage => faces.iter().copied().min().unwrap_or(1),
    };

    D20Roll {
        faces,
        rerolled_from,
        natural,
        modifier,
        total: natural as i32 + modifier,
        advantage,
    }
}

// ============================================================================
// Dice expressions
// ============================================================================

/// Standard D&D die types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DieType {
    D4,
    D6,
    D8,
    D10,
    D12,
    D20,
    D100,
}

impl DieType {
    pub fn sides(&self) -> u32 {
        match self {
            DieType::D4 => 4,
            DieType::D6 => 6,
            DieType::D8 => 8,
            DieType::D10 => 10,
            DieType::D12 => 12,
            DieType::D20 => 20,
            DieType::D100 => 100,
        }
    }

    pub fn from_sides(sides: u32) -> Option<DieType> {
        match sides {
            4 => Some(DieType::D4),
            6 => Some(DieType::D6),
            8 => Some(DieType::D8),
            10 => Some(DieType::D10),
            12 => Some(DieType::D12),
            20 => Some(DieType::D20),
            100 => Some(DieType::D100),
            _ => None,
        }
    }
}

impl fmt::Display for DieType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.sides())
    }
}

/// A single die component of a dice expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceComponent {
    pub count: u32,
    pub die_type: DieType,
    pub keep_highest: Option<u32>,
    pub keep_lowest: Option<u32>,
}

/// A complete dice expression (e.g., 2d6+3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceExpression {
    pub components: Vec<DiceComponent>,
    pub modifier: i32,
    pub original: String,
}

impl DiceExpression {
    /// Parse notation such as `2d6+3`, `1d20-1`, `4d6kh3` or `2d20kl1`.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let notation: String = notation
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        if notation.is_empty() {
            return Err(DiceError::NoDice);
        }

        let mut expr = DiceExpression {
            components: Vec::new(),
            modifier: 0,
            original: notation.clone(),
        };
        for (sign, term) in signed_terms(&notation) {
            if term.is_empty() {
                return Err(DiceError::InvalidNotation(notation.clone()));
            }
            match parse_term(term)? {
                Term::Dice(component) => expr.components.push(component),
                Term::Flat(value) => expr.modifier += sign * value,
            }
        }

        if expr.components.is_empty() && expr.modifier == 0 {
            return Err(DiceError::NoDice);
        }
        Ok(expr)
    }

    /// A flat expression with no dice.
    pub fn flat(value: i32) -> Self {
        Self {
            components: Vec::new(),
            modifier: value,
            original: value.to_string(),
        }
    }

    /// Same expression with every die count doubled (critical hit damage).
    /// The flat modifier is not doubled.
    pub fn with_doubled_dice(&self) -> Self {
        let components: Vec<DiceComponent> = self
            .components
            .iter()
            .map(|c| DiceComponent {
                count: c.count * 2,
                keep_highest: c.keep_highest.map(|k| k * 2),
                keep_lowest: c.keep_lowest.map(|k| k * 2),
                ..c.clone()
            })
            .collect();
        let original = render_notation(&components, self.modifier);
        Self {
            components,
            modifier: self.modifier,
            original,
        }
    }

    /// Same expression with an added flat modifier.
    pub fn plus(&self, bonus: i32) -> Self {
        let modifier = self.modifier + bonus;
        Self {
            components: self.components.clone(),
            modifier,
            original: render_notation(&self.components, modifier),
        }
    }

    /// Add `extra` dice of the given type (used for upcasting).
    pub fn with_extra_dice(&self, count: u32, die_type: DieType) -> Self {
        let mut components = self.components.clone();
        match components
            .iter_mut()
            .find(|c| c.die_type == die_type && c.keep_highest.is_none() && c.keep_lowest.is_none())
        {
            Some(existing) => existing.count += count,
            None => components.push(DiceComponent {
                count,
                die_type,
                keep_highest: None,
                keep_lowest: None,
            }),
        }
        let original = render_notation(&components, self.modifier);
        Self {
            components,
            modifier: self.modifier,
            original,
        }
    }

    /// The largest die in the expression (used for Savage Attacks).
    pub fn primary_die(&self) -> Option<DieType> {
        self.components
            .iter()
            .map(|c| c.die_type)
            .max_by_key(|d| d.sides())
    }

    /// Roll the expression with the given roller.
    pub fn roll_with(&self, roller: &mut dyn DieRoller) -> RollResult {
        let component_results: Vec<ComponentResult> = self
            .components
            .iter()
            .map(|component| {
                let rolls: Vec<u32> = (0..component.count)
                    .map(|_| roller.roll_die(component.die_type.sides()))
                    .collect();
                let mut kept = rolls.clone();
                match (component.keep_highest, component.keep_lowest) {
                    (Some(keep), _) => {
                        kept.sort_unstable_by(|a, b| b.cmp(a));
                        kept.truncate(keep as usize);
                    }
                    (None, Some(keep)) => {
                        kept.sort_unstable();
                        kept.truncate(keep as usize);
                    }
                    (None, None) => {}
                }
                ComponentResult {
                    die_type: component.die_type,
                    subtotal: kept.iter().sum(),
                    rolls,
                    kept,
                }
            })
            .collect();

        let total = component_results.iter().map(|c| c.subtotal as i32).sum::<i32>() + self.modifier;
        // A lone d20 is what natural 1/20 refer to.
        let natural = match component_results.as_slice() {
            [only] if only.die_type == DieType::D20 && only.rolls.len() == 1 => Some(only.rolls[0]),
            _ => None,
        };

        RollResult {
            expression: self.clone(),
            component_results,
            modifier: self.modifier,
            total,
            natural_20: natural == Some(20),
            natural_1: natural == Some(1),
        }
    }

    /// Roll with a fresh thread RNG.
    pub fn roll(&self) -> RollResult {
        self.roll_with(&mut rand::thread_rng())
    }
}

fn render_notation(components: &[DiceComponent], modifier: i32) -> String {
    let mut out = components
        .iter()
        .map(|c| {
            let keep = match (c.keep_highest, c.keep_lowest) {
                (Some(k), _) => format!("kh{k}"),
                (_, Some(k)) => format!("kl{k}"),
                _ => String::new(),
            };
            format!("{}{}{}", c.count, c.die_type, keep)
        })
        .collect::<Vec<_>>()
        .join("+");
    if modifier > 0 {
        if out.is_empty() {
            out = modifier.to_string();
        } else {
            out.push_str(&format!("+{modifier}"));
        }
    } else if modifier < 0 {
        out.push_str(&modifier.to_string());
    } else if out.is_empty() {
        out.push('0');
    }
    out
}

enum Term {
    Dice(DiceComponent),
    Flat(i32),
}

/// Split `2d6+1d4-2` into `(1, "2d6"), (1, "1d4"), (-1, "2")`.
fn signed_terms(notation: &str) -> Vec<(i32, &str)> {
    let mut terms = Vec::new();
    let mut sign = 1;
    let mut begin = 0;
    for (i, ch) in notation.char_indices() {
        if ch == '+' || ch == '-' {
            if i > begin {
                terms.push((sign, &notation[begin..i]));
            }
            sign = if ch == '-' { -1 } else { 1 };
            begin = i + 1;
        }
    }
    terms.push((sign, &notation[begin..]));
    terms
}

fn parse_term(term: &str) -> Result<Term, DiceError> {
    let invalid = || DiceError::InvalidNotation(term.to_string());
    let Some((count, rest)) = term.split_once('d') else {
        return term.parse().map(Term::Flat).map_err(|_| invalid());
    };

    let count: u32 = match count {
        "" => 1,
        n => n.parse().map_err(|_| invalid())?,
    };
    let (sides, keep_highest, keep_lowest) = match (rest.split_once("kh"), rest.split_once("kl")) {
        (Some((sides, keep)), _) => (sides, Some(keep.parse().map_err(|_| invalid())?), None),
        (None, Some((sides, keep))) => (sides, None, Some(keep.parse().map_err(|_| invalid())?)),
        (None, None) => (rest, None, None),
    };
    let sides: u32 = sides.parse().map_err(|_| invalid())?;
    let die_type = DieType::from_sides(sides).ok_or(DiceError::InvalidDieSize(sides))?;

    if let Some(keep) = keep_highest.or(keep_lowest).filter(|&k| k > count) {
        return Err(DiceError::InvalidKeepCount {
            keep,
            count,
            notation: term.to_string(),
        });
    }
    Ok(Term::Dice(DiceComponent {
        count,
        die_type,
        keep_highest,
        keep_lowest,
    }))
}

impl FromStr for DiceExpression {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpression::parse(s)
    }
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// Result of rolling a single dice component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentResult {
    pub die_type: DieType,
    pub rolls: Vec<u32>,
    pub kept: Vec<u32>,
    pub subtotal: u32,
}

/// Complete result of a dice roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollResult {
    pub expression: DiceExpression,
    pub component_results: Vec<ComponentResult>,
    pub modifier: i32,
    pub total: i32,
    pub natural_20: bool,
    pub natural_1: bool,
}

impl RollResult {
    /// Every die as rolled, with dropped dice in parentheses, e.g.
    /// `[6, 4, (1)] + 2`.
    pub fn dice_display(&self) -> String {
        let dice = self
            .component_results
            .iter()
            .map(|c| {
                let mut kept = c.kept.clone();
                let faces: Vec<String> = c
                    .rolls
                    .iter()
                    .map(|roll| match kept.iter().position(|k| k == roll) {
                        Some(i) => {
                            kept.swap_remove(i);
                            roll.to_string()
                        }
                        None => format!("({roll})"),
                    })
                    .collect();
                format!("[{}]", faces.join(", "))
            })
            .collect::<Vec<_>>()
            .join(" + ");

        match (dice.is_empty(), self.modifier) {
            (_, 0) => dice,
            (true, m) => m.to_string(),
            (false, m) if m > 0 => format!("{dice} + {m}"),
            (false, m) => format!("{dice} - {}", -m),
        }
    }

    /// Total clamped at zero, for damage and healing.
    pub fn non_negative_total(&self) -> i32 {
        self.total.max(0)
    }
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.dice_display(), self.total)
    }
}

/// Convenience function to roll dice from a notation string.
pub fn roll(notation: &str, roller: &mut dyn DieRoller) -> Result<RollResult, DiceError> {
    let expr = DiceExpression::parse(notation)?;
    Ok(expr.roll_with(roller))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let expr = DiceExpression::parse("1d20").unwrap();
        assert_eq!(expr.components.len(), 1);
        assert_eq!(expr.components[0].count, 1);
        assert_eq!(expr.components[0].die_type, DieType::D20);
        assert_eq!(expr.modifier, 0);
    }

    #[test]
    fn test_parse_with_modifier() {
        let expr = DiceExpression::parse("1d20+5").unwrap();
        assert_eq!(expr.modifier, 5);

        let expr = DiceExpression::parse("2d6-2").unwrap();
        assert_eq!(expr.modifier, -2);
    }

    #[test]
    fn test_parse_multiple_dice() {
        let expr = DiceExpression::parse("2d6+1d4+3").unwrap();
        assert_eq!(expr.components.len(), 2);
        assert_eq!(expr.modifier, 3);
    }

    #[test]
    fn test_invalid_keep_count() {
        let result = DiceExpression::parse("4d6kh5");
        assert!(matches!(
            result.unwrap_err(),
            DiceError::InvalidKeepCount {
                keep: 5,
                count: 4,
                ..
            }
        ));
        assert!(DiceExpression::parse("4d6kh4").is_ok());
    }

    #[test]
    fn test_invalid_die_size() {
        assert!(matches!(
            DiceExpression::parse("1d7"),
            Err(DiceError::InvalidDieSize(7))
        ));
    }

    #[test]
    fn test_doubled_dice_keeps_modifier() {
        let expr = DiceExpression::parse("1d8+3").unwrap().with_doubled_dice();
        assert_eq!(expr.components[0].count, 2);
        assert_eq!(expr.modifier, 3);
        assert_eq!(expr.to_string(), "2d8+3");
    }

    #[test]
    fn test_extra_dice_merge() {
        let expr = DiceExpression::parse("3d6")
            .unwrap()
            .with_extra_dice(2, DieType::D6);
        assert_eq!(expr.components.len(), 1);
        assert_eq!(expr.components[0].count, 5);
    }

    #[test]
    fn test_scripted_roll() {
        let mut dice = ScriptedDice::new([3, 5]);
        let result = DiceExpression::parse("2d6+1").unwrap().roll_with(&mut dice);
        assert_eq!(result.total, 9);
        assert_eq!(result.dice_display(), "[3, 5] + 1");
    }

    #[test]
    fn test_keep_highest_shows_dropped_dice() {
        let mut dice = ScriptedDice::new([6, 1, 4]);
        let result = DiceExpression::parse("3d6kh2").unwrap().roll_with(&mut dice);
        assert_eq!(result.total, 10);
        assert_eq!(result.dice_display(), "[6, (1), 4]");
    }

    #[test]
    fn test_leading_sign_and_spaces() {
        let expr = DiceExpression::parse(" -1 + 1d4 ").unwrap();
        assert_eq!(expr.modifier, -1);
        assert_eq!(expr.components[0].die_type, DieType::D4);
        assert!(matches!(DiceExpression::parse("1d6+"), Err(DiceError::InvalidNotation(_))));
        assert!(matches!(DiceExpression::parse("   "), Err(DiceError::NoDice)));
    }

    #[test]
    fn test_scripted_faces_are_clamped() {
        let mut dice = ScriptedDice::new([20]);
        assert_eq!(dice.roll_die(6), 6);
    }

    #[test]
    fn test_roll_range() {
        let mut rng = seeded_roller(7);
        for _ in 0..100 {
            let result = roll("1d20+5", &mut rng).unwrap();
            assert!(result.total >= 6 && result.total <= 25);
        }
    }

    #[test]
    fn test_advantage_combine() {
        assert_eq!(
            Advantage::Normal.combine(Advantage::Advantage),
            Advantage::Advantage
        );
        assert_eq!(
            Advantage::Advantage.combine(Advantage::Disadvantage),
            Advantage::Normal
        );
        assert_eq!(Advantage::from_sources(true, true), Advantage::Normal);
        assert_eq!(Advantage::from_sources(false, true), Advantage::Disadvantage);
    }

    #[test]
    fn test_d20_advantage_keeps_higher() {
        let mut dice = ScriptedDice::new([4, 17]);
        let roll = roll_d20(&mut dice, Advantage::Advantage, 2, false);
        assert_eq!(roll.natural, 17);
        assert_eq!(roll.total, 19);

        let mut dice = ScriptedDice::new([4, 17]);
        let roll = roll_d20(&mut dice, Advantage::Disadvantage, 2, false);
        assert_eq!(roll.natural, 4);
    }

    #[test]
    fn test_d20_reroll_ones_once() {
        let mut dice = ScriptedDice::new([1, 1]);
        let roll = roll_d20(&mut dice, Advantage::Normal, 0, true);
        // The reroll must be kept even if it is another 1.
        assert_eq!(roll.natural, 1);
        assert_eq!(roll.rerolled_from, Some(1));

        let mut dice = ScriptedDice::new([1, 14]);
        let roll = roll_d20(&mut dice, Advantage::Normal, 5, true);
        assert_eq!(roll.natural, 14);
        assert_eq!(roll.breakdown(), "d20 [1→14] + 5 = 19");
    }
}
