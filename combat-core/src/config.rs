//! Engine configuration.

use crate::actor::StatBlock;
use crate::conditions::{Condition, TURN_BLOCKING};
use serde::{Deserialize, Serialize};

/// What a revival does when the caller does not say otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviveDefaults {
    /// Conditions cleared from the revived actor.
    pub clear_conditions: Vec<Condition>,
    /// Whether the revived actor gets back up prone.
    pub apply_prone: bool,
}

impl Default for ReviveDefaults {
    fn default() -> Self {
        Self {
            clear_conditions: TURN_BLOCKING.to_vec(),
            apply_prone: true,
        }
    }
}

/// Configuration for a [`CombatEngine`](crate::combat::CombatEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Feet per grid tile for areas and forced movement.
    pub feet_per_tile: i32,

    /// Conditions that make an actor skip its turn.
    pub turn_blocking_conditions: Vec<Condition>,

    pub revive: ReviveDefaults,

    /// Stats for participants whose key is not in the stat lookup.
    pub placeholder_stats: StatBlock,

    /// Where to go after combat when the encounter names no location.
    pub default_return_location: String,
}

impl CombatConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feet_per_tile(mut self, feet: i32) -> Self {
        self.feet_per_tile = feet;
        self
    }

    pub fn with_turn_blocking_conditions(mut self, conditions: Vec<Condition>) -> Self {
        self.turn_blocking_conditions = conditions;
        self
    }

    pub fn with_revive_defaults(mut self, revive: ReviveDefaults) -> Self {
        self.revive = revive;
        self
    }

    pub fn with_placeholder_stats(mut self, stats: StatBlock) -> Self {
        self.placeholder_stats = stats;
        self
    }

    pub fn with_default_return_location(mut self, location: impl Into<String>) -> Self {
        self.default_return_location = location.into();
        self
    }
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            feet_per_tile: 5,
            turn_blocking_conditions: TURN_BLOCKING.to_vec(),
            revive: ReviveDefaults::default(),
            placeholder_stats: StatBlock::placeholder(),
            default_return_location: "town".to_string(),
        }
    }
}
