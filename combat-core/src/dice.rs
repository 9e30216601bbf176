//! Dice rolling for the combat engine.
//!
//! Supports standard dice notation: XdY+Z, several terms (`2d6+1d4+3`),
//! keep highest/lowest (`4d6kh3`) and advantage/disadvantage on a d20.
//!
//! Every roll goes through a [`DieRoller`], so the same expression can be
//! rolled against a real RNG or a scripted sequence of faces.

use rand::rngs::{StdRng, ThreadRng};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// Most dice a single term may roll.
pub const MAX_DICE_PER_TERM: u32 = 100;

/// Largest die the parser accepts.
pub const MAX_DIE_SIDES: u32 = 1000;

/// Error type for dice parsing.
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

/// Source of individual die faces.
pub trait DieRoller {
    /// Roll one die with `sides` faces, returning a value in `1..=sides`.
    fn roll_die(&mut self, sides: u32) -> u32;
}

/// A [`DieRoller`] backed by any `rand` RNG.
#[derive(Debug, Clone)]
pub struct RngRoller<R>(pub R);

impl RngRoller<ThreadRng> {
    pub fn thread() -> Self {
        Self(rand::thread_rng())
    }
}

impl RngRoller<StdRng> {
    /// Reproducible rolls for replays and tests.
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> DieRoller for RngRoller<R> {
    fn roll_die(&mut self, sides: u32) -> u32 {
        self.0.gen_range(1..=sides.max(1))
    }
}

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
}

/// A single die component of a dice expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceComponent {
    pub count: u32,
    pub sides: u32,
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
    /// Parse a dice notation string.
    pub fn parse(notation: &str) -> Result<Self, DiceError> {
        let notation = notation.trim().to_lowercase();
        if notation.is_empty() {
            return Err(DiceError::NoDice);
        }

        let mut components = Vec::new();
        let mut modifier: i32 = 0;
        let mut current = String::new();
        let mut sign: i32 = 1;

        for ch in notation.chars() {
            match ch {
                '+' | '-' => {
                    if !current.is_empty() {
                        Self::parse_component(&current, sign, &mut components, &mut modifier)?;
                        current.clear();
                    }
                    sign = if ch == '+' { 1 } else { -1 };
                }
                ' ' => continue,
                _ => current.push(ch),
            }
        }

        if !current.is_empty() {
            Self::parse_component(&current, sign, &mut components, &mut modifier)?;
        }

        if components.is_empty() && modifier == 0 {
            return Err(DiceError::NoDice);
        }

        Ok(DiceExpression {
            components,
            modifier,
            original: notation,
        })
    }

    /// A flat expression with no dice.
    pub fn flat(value: i32) -> Self {
        Self {
            components: Vec::new(),
            modifier: value,
            original: value.to_string(),
        }
    }

    fn parse_component(
        s: &str,
        sign: i32,
        components: &mut Vec<DiceComponent>,
        modifier: &mut i32,
    ) -> Result<(), DiceError> {
        if let Some(d_pos) = s.find('d') {
            // Subtracted dice ("1d20-1d4") are not part of the notation we accept.
            if sign < 0 {
                return Err(DiceError::InvalidNotation(s.to_string()));
            }

            let count_str = &s[..d_pos];
            let rest = &s[d_pos + 1..];

            let count: u32 = if count_str.is_empty() {
                1
            } else {
                count_str
                    .parse()
                    .map_err(|_| DiceError::InvalidNotation(s.to_string()))?
            };
            if count == 0 || count > MAX_DICE_PER_TERM {
                return Err(DiceError::InvalidNotation(s.to_string()));
            }

            let (sides_str, keep_highest, keep_lowest) = if let Some(kh_pos) = rest.find("kh") {
                let keep: u32 = rest[kh_pos + 2..]
                    .parse()
                    .map_err(|_| DiceError::InvalidNotation(s.to_string()))?;
                (&rest[..kh_pos], Some(keep), None)
            } else if let Some(kl_pos) = rest.find("kl") {
                let keep: u32 = rest[kl_pos + 2..]
                    .parse()
                    .map_err(|_| DiceError::InvalidNotation(s.to_string()))?;
                (&rest[..kl_pos], None, Some(keep))
            } else {
                (rest, None, None)
            };

            let sides: u32 = sides_str
                .parse()
                .map_err(|_| DiceError::InvalidNotation(s.to_string()))?;
            if sides == 0 || sides > MAX_DIE_SIDES {
                return Err(DiceError::InvalidDieSize(sides));
            }

            if let Some(keep) = keep_highest.or(keep_lowest) {
                if keep > count {
                    return Err(DiceError::InvalidKeepCount {
                        keep,
                        count,
                        notation: s.to_string(),
                    });
                }
            }

            components.push(DiceComponent {
                count,
                sides,
                keep_highest,
                keep_lowest,
            });
        } else {
            let value: i32 = s
                .parse()
                .map_err(|_| DiceError::InvalidNotation(s.to_string()))?;
            *modifier = sign
                .checked_mul(value)
                .and_then(|v| modifier.checked_add(v))
                .ok_or_else(|| DiceError::InvalidNotation(s.to_string()))?;
        }

        Ok(())
    }

    /// Roll the expression.
    pub fn roll_with(&self, roller: &mut dyn DieRoller) -> RollResult {
        let mut component_results = Vec::new();

        for component in &self.components {
            let rolls: Vec<u32> = (0..component.count)
                .map(|_| roller.roll_die(component.sides))
                .collect();

            let mut kept_rolls = rolls.clone();
            if let Some(keep) = component.keep_highest {
                kept_rolls.sort_by(|a, b| b.cmp(a));
                kept_rolls.truncate(keep as usize);
            } else if let Some(keep) = component.keep_lowest {
                kept_rolls.sort();
                kept_rolls.truncate(keep as usize);
            }

            let subtotal: u32 = kept_rolls.iter().sum();
            component_results.push(ComponentResult {
                sides: component.sides,
                rolls,
                kept: kept_rolls,
                subtotal,
            });
        }

        let dice_total = component_results
            .iter()
            .fold(0i32, |acc, c| acc.saturating_add(c.subtotal as i32));
        let total = dice_total.saturating_add(self.modifier);

        // Natural 20/1 only means something for a lone d20.
        let d20_roll = component_results
            .iter()
            .find(|c| c.sides == 20 && c.rolls.len() == 1)
            .and_then(|c| c.rolls.first().copied());

        let result = RollResult {
            expression: self.clone(),
            component_results,
            modifier: self.modifier,
            total,
            natural_20: d20_roll == Some(20),
            natural_1: d20_roll == Some(1),
        };
        debug!(notation = %self.original, total = result.total, "rolled {}", result);
        result
    }

    /// Roll with advantage/disadvantage (only applies to single d20 rolls).
    pub fn roll_with_advantage(&self, advantage: Advantage, roller: &mut dyn DieRoller) -> RollResult {
        if advantage == Advantage::Normal || !self.is_single_d20() {
            return self.roll_with(roller);
        }

        let d20 = roll_d20(advantage, roller);
        RollResult {
            expression: self.clone(),
            component_results: vec![ComponentResult {
                sides: 20,
                rolls: d20.rolls.clone(),
                kept: vec![d20.kept],
                subtotal: d20.kept,
            }],
            modifier: self.modifier,
            total: (d20.kept as i32).saturating_add(self.modifier),
            natural_20: d20.kept == 20,
            natural_1: d20.kept == 1,
        }
    }

    fn is_single_d20(&self) -> bool {
        self.components.len() == 1
            && self.components[0].count == 1
            && self.components[0].sides == 20
            && self.components[0].keep_highest.is_none()
            && self.components[0].keep_lowest.is_none()
    }
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
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentResult {
    pub sides: u32,
    pub rolls: Vec<u32>,
    pub kept: Vec<u32>,
    pub subtotal: u32,
}

/// Complete result of a dice roll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollResult {
    pub expression: DiceExpression,
    pub component_results: Vec<ComponentResult>,
    pub modifier: i32,
    pub total: i32,
    pub natural_20: bool,
    pub natural_1: bool,
}

impl RollResult {
    /// The zero result used when an expression cannot be parsed.
    pub fn zero(notation: &str) -> Self {
        Self {
            expression: DiceExpression {
                components: Vec::new(),
                modifier: 0,
                original: notation.to_string(),
            },
            component_results: Vec::new(),
            modifier: 0,
            total: 0,
            natural_20: false,
            natural_1: false,
        }
    }

    /// Format the individual dice results for display.
    pub fn dice_display(&self) -> String {
        let dice_parts: Vec<String> = self
            .component_results
            .iter()
            .map(|c| {
                if c.rolls.len() > c.kept.len() {
                    let mut kept_used = vec![false; c.kept.len()];
                    let shown: Vec<String> = c
                        .rolls
                        .iter()
                        .map(|&roll| {
                            let kept_slot = c
                                .kept
                                .iter()
                                .enumerate()
                                .position(|(i, &k)| k == roll && !kept_used[i]);
                            match kept_slot {
                                Some(i) => {
                                    kept_used[i] = true;
                                    format!("{roll}")
                                }
                                None => format!("({roll})"),
                            }
                        })
                        .collect();
                    format!("[{}]", shown.join(", "))
                } else {
                    let shown: Vec<String> = c.rolls.iter().map(|r| r.to_string()).collect();
                    format!("[{}]", shown.join(", "))
                }
            })
            .collect();

        let dice_str = dice_parts.join(" + ");
        match self.modifier {
            0 => dice_str,
            m if dice_str.is_empty() => m.to_string(),
            m if m > 0 => format!("{dice_str} + {m}"),
            m => format!("{} - {}", dice_str, m.abs()),
        }
    }

    /// Check if the roll meets or exceeds a DC.
    pub fn meets_dc(&self, dc: i32) -> bool {
        self.total >= dc
    }
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.dice_display(), self.total)
    }
}

/// A d20 roll, possibly made twice for advantage or disadvantage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct D20Roll {
    /// Every face rolled, in order.
    pub rolls: Vec<u32>,
    /// The face that counts.
    pub kept: u32,
}

impl D20Roll {
    pub fn is_natural_20(&self) -> bool {
        self.kept == 20
    }

    pub fn is_natural_1(&self) -> bool {
        self.kept == 1
    }
}

/// Roll a d20, twice when advantage or disadvantage applies (keep max/min).
pub fn roll_d20(advantage: Advantage, roller: &mut dyn DieRoller) -> D20Roll {
    let first = roller.roll_die(20);
    match advantage {
        Advantage::Normal => D20Roll {
            rolls: vec![first],
            kept: first,
        },
        Advantage::Advantage => {
            let second = roller.roll_die(20);
            D20Roll {
                rolls: vec![first, second],
                kept: first.max(second),
            }
        }
        Advantage::Disadvantage => {
            let second = roller.roll_die(20);
            D20Roll {
                rolls: vec![first, second],
                kept: first.min(second),
            }
        }
    }
}

/// Roll a notation string. Malformed notation evaluates to a zero result.
pub fn evaluate(notation: &str, roller: &mut dyn DieRoller) -> RollResult {
    match DiceExpression::parse(notation) {
        Ok(expr) => expr.roll_with(roller),
        Err(e) => {
            warn!(notation, error = %e, "malformed dice expression, treating as 0");
            RollResult::zero(notation)
        }
    }
}

/// Convenience function to roll dice from a notation string with the thread RNG.
pub fn roll(notation: &str) -> Result<RollResult, DiceError> {
    let expr = DiceExpression::parse(notation)?;
    Ok(expr.roll_with(&mut RngRoller::thread()))
}
