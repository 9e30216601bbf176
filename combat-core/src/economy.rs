//! Per-turn action budget.

use serde::{Deserialize, Serialize};

/// What an actor has spent so far this turn. Everything starts unspent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnEconomy {
    pub action_used: bool,
    pub bonus_used: bool,
    pub move_used: bool,
    pub reaction_used: bool,
    pub disengaged_this_turn: bool,
    pub dashed_this_turn: bool,
}

impl TurnEconomy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn can_use_action(&self) -> bool {
        !self.action_used
    }

    pub fn can_use_bonus(&self) -> bool {
        !self.bonus_used
    }

    pub fn can_use_move(&self) -> bool {
        !self.move_used
    }

    pub fn can_use_reaction(&self) -> bool {
        !self.reaction_used
    }

    pub fn spend_action(&mut self) {
        self.action_used = true;
    }

    pub fn spend_bonus(&mut self) {
        self.bonus_used = true;
    }

    pub fn spend_move(&mut self) {
        self.move_used = true;
    }

    pub fn spend_reaction(&mut self) {
        self.reaction_used = true;
    }

    /// Only records the flag; the action is not spent.
    pub fn set_disengaged(&mut self) {
        self.disengaged_this_turn = true;
    }

    /// Dashing uses up both the action and the move for the turn.
    pub fn set_dashed(&mut self) {
        self.dashed_this_turn = true;
        self.action_used = true;
        self.move_used = true;
    }
}
