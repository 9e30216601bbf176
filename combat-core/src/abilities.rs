//! Ability scores, modifiers, and per-roll modifier composition.
//!
//! Actors store only base scores. Temporary and permanent changes are
//! [`ModifierEffect`]s, and the numbers a roll actually uses are derived on
//! demand by [`roll_components`].

use crate::dice::Advantage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    pub fn all() -> [Ability; 6] {
        [
            Ability::Strength,
            Ability::Dexterity,
            Ability::Constitution,
            Ability::Intelligence,
            Ability::Wisdom,
            Ability::Charisma,
        ]
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// Classic 5e modifier: floor((score - 10) / 2).
pub fn score_to_modifier(score: i32) -> i32 {
    (score - 10).div_euclid(2)
}

/// Ability scores container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityScores {
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
}

impl AbilityScores {
    pub fn new(str: i32, dex: i32, con: i32, int: i32, wis: i32, cha: i32) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    pub fn get(&self, ability: Ability) -> i32 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn set(&mut self, ability: Ability, value: i32) {
        match ability {
            Ability::Strength => self.strength = value,
            Ability::Dexterity => self.dexterity = value,
            Ability::Constitution => self.constitution = value,
            Ability::Intelligence => self.intelligence = value,
            Ability::Wisdom => self.wisdom = value,
            Ability::Charisma => self.charisma = value,
        }
    }

    /// Modifier of the base score, ignoring effects.
    pub fn modifier(&self, ability: Ability) -> i32 {
        score_to_modifier(self.get(ability))
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

/// Which kind of d20 roll a modifier applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RollKind {
    Check,
    Save,
    Attack,
    Initiative,
}

/// What a modifier effect does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifierOp {
    /// Set the final ability score; the highest setter wins.
    SetScore(i32),
    /// Add to the ability score.
    AddScore(i32),
    /// Flat bonus to the roll.
    Add(i32),
    /// Multiply the ability modifier.
    Mult(i32),
    /// Cap the ability modifier.
    Max(i32),
    /// Floor the ability modifier.
    Min(i32),
    Advantage,
    Disadvantage,
    /// Extra die added to the roll (e.g. Bless adds "1d4").
    AddDie(String),
}

/// Which rolls a modifier effect touches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModifierTarget {
    /// An ability score itself (only meaningful for `SetScore`/`AddScore`).
    Score(Ability),
    /// Every roll of a kind, regardless of ability.
    Roll(RollKind),
    /// Rolls of a kind made with a specific ability (e.g. DEX saves).
    AbilityRoll(RollKind, Ability),
}

/// A single change carried by a [`ModifierEffect`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierApplication {
    pub target: ModifierTarget,
    pub op: ModifierOp,
}

/// A named effect on an actor that changes scores or rolls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierEffect {
    pub key: String,
    pub applies: Vec<ModifierApplication>,
    /// Remaining rounds, ticked with timed statuses. `None` lasts until removed.
    pub rounds_remaining: Option<u32>,
}

impl ModifierEffect {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            applies: Vec::new(),
            rounds_remaining: None,
        }
    }

    pub fn with(mut self, target: ModifierTarget, op: ModifierOp) -> Self {
        self.applies.push(ModifierApplication { target, op });
        self
    }

    pub fn with_duration(mut self, rounds: u32) -> Self {
        self.rounds_remaining = Some(rounds);
        self
    }
}

/// Derived final score after `SetScore` (highest wins) then `AddScore` (sum).
pub fn ability_score(base: &AbilityScores, effects: &[ModifierEffect], ability: Ability) -> i32 {
    let mut set_to: Option<i32> = None;
    let mut add = 0;
    for app in effects.iter().flat_map(|e| e.applies.iter()) {
        if app.target != ModifierTarget::Score(ability) {
            continue;
        }
        match app.op {
            ModifierOp::SetScore(v) => set_to = Some(set_to.map_or(v, |s| s.max(v))),
            ModifierOp::AddScore(v) => add += v,
            _ => {}
        }
    }
    set_to.unwrap_or_else(|| base.get(ability)) + add
}

/// Derived final modifier for an ability.
pub fn ability_modifier(base: &AbilityScores, effects: &[ModifierEffect], ability: Ability) -> i32 {
    score_to_modifier(ability_score(base, effects, ability))
}

/// Everything a d20 roll needs from the roller's side.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RollComponents {
    pub modifier: i32,
    pub advantage: Advantage,
    pub bonus: i32,
    pub extra_dice: Vec<String>,
}

impl RollComponents {
    /// Modifier plus flat bonus.
    pub fn flat_total(&self) -> i32 {
        self.modifier + self.bonus
    }
}

/// Compose the modifier, advantage, bonus and extra dice for a roll.
///
/// Checks, saves and initiative start from the ability modifier (initiative
/// defaults to DEX); attacks start from zero since their flat modifier lives
/// on the actor.
pub fn roll_components(
    base: &AbilityScores,
    effects: &[ModifierEffect],
    kind: RollKind,
    ability: Option<Ability>,
) -> RollComponents {
    let ability = match kind {
        RollKind::Initiative => Some(ability.unwrap_or(Ability::Dexterity)),
        _ => ability,
    };
    let mut modifier = match (kind, ability) {
        (RollKind::Attack, _) | (_, None) => 0,
        (_, Some(a)) => ability_modifier(base, effects, a),
    };

    let mut has_advantage = false;
    let mut has_disadvantage = false;
    let mut bonus = 0;
    let mut extra_dice = Vec::new();

    for app in effects.iter().flat_map(|e| e.applies.iter()) {
        let applies = match &app.target {
            ModifierTarget::Roll(k) => *k == kind,
            ModifierTarget::AbilityRoll(k, a) => *k == kind && Some(*a) == ability,
            ModifierTarget::Score(_) => false,
        };
        if !applies {
            continue;
        }

        match &app.op {
            ModifierOp::Add(v) => bonus += v,
            ModifierOp::Mult(v) => modifier *= v,
            ModifierOp::Max(v) => modifier = modifier.min(*v),
            ModifierOp::Min(v) => modifier = modifier.max(*v),
            ModifierOp::Advantage => has_advantage = true,
            ModifierOp::Disadvantage => has_disadvantage = true,
            ModifierOp::AddDie(die) => extra_dice.push(die.clone()),
            ModifierOp::SetScore(_) | ModifierOp::AddScore(_) => {}
        }
    }

    let advantage = match (has_advantage, has_disadvantage) {
        (true, false) => Advantage::Advantage,
        (false, true) => Advantage::Disadvantage,
        _ => Advantage::Normal,
    };

    RollComponents {
        modifier,
        advantage,
        bonus,
        extra_dice,
    }
}
