//! Testing utilities for the combat engine.
//!
//! This module provides tools for deterministic tests:
//! - `ScriptedDice` to control every die face
//! - `RecordingObserver` to capture lifecycle events
//! - Assertion helpers for verifying encounter state

use crate::actor::{ActorId, PlayerProfile, SharedProfile, StatBlock};
use crate::conditions::Condition;
use crate::dice::DieRoller;
use crate::encounter::{Encounter, Outcome};
use crate::events::{CombatEvent, CombatObserver, NotifyError};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::warn;

/// Face returned once the script runs dry.
const EXHAUSTED_FACE: u32 = 1;

/// A die roller that returns scripted faces in order.
///
/// Faces are clamped to the die being rolled. When the script is exhausted
/// every roll comes up 1.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDice {
    faces: VecDeque<u32>,
}

impl ScriptedDice {
    pub fn new(faces: impl IntoIterator<Item = u32>) -> Self {
        Self {
            faces: faces.into_iter().collect(),
        }
    }

    /// A script with no faces, for code paths that must not roll.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Faces not yet consumed.
    pub fn remaining(&self) -> usize {
        self.faces.len()
    }
}

impl DieRoller for ScriptedDice {
    fn roll_die(&mut self, sides: u32) -> u32 {
        match self.faces.pop_front() {
            Some(face) => face.clamp(1, sides.max(1)),
            None => {
                warn!(sides, "scripted dice exhausted");
                EXHAUSTED_FACE
            }
        }
    }
}

/// An observer that keeps every event it is sent. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    events: Rc<RefCell<Vec<CombatEvent>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CombatEvent> {
        self.events.borrow().clone()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl CombatObserver for RecordingObserver {
    fn notify(&mut self, event: &CombatEvent) -> Result<(), NotifyError> {
        self.events.borrow_mut().push(event.clone());
        Ok(())
    }
}

/// A level-1 fighter-ish player profile.
pub fn sample_profile(name: &str) -> SharedProfile {
    let mut profile = PlayerProfile::new(name, 12, 16);
    profile.attack_bonus = 5;
    profile.damage = "1d8+3".to_string();
    profile.shared()
}

/// A stat block with a given AC and hit points and a simple attack.
pub fn npc_stats(name: &str, armor_class: i32, hit_points: i32) -> StatBlock {
    StatBlock::new(name, armor_class, hit_points).with_attack(3, "1d6+1")
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert an actor's current hit points.
#[track_caller]
pub fn assert_hp(enc: &Encounter, id: &str, expected: i32) {
    let actor = enc
        .actor(&ActorId::new(id))
        .unwrap_or_else(|| panic!("no actor named '{id}'"));
    assert_eq!(actor.hp(), expected, "{id} HP");
}

#[track_caller]
pub fn assert_outcome(enc: &Encounter, expected: Outcome) {
    assert_eq!(enc.outcome(), expected, "encounter outcome");
}

/// Assert whose turn it is.
#[track_caller]
pub fn assert_current_actor(enc: &Encounter, id: &str) {
    let current = enc.current_actor_id().map(ActorId::as_str);
    assert_eq!(current, Some(id), "current actor");
}

#[track_caller]
pub fn assert_has_condition(enc: &Encounter, id: &str, condition: Condition) {
    let actor = enc
        .actor(&ActorId::new(id))
        .unwrap_or_else(|| panic!("no actor named '{id}'"));
    assert!(
        actor.has_condition(condition),
        "expected {id} to be {condition}, has {:?}",
        actor.conditions
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_dice_clamps_and_runs_dry() {
        let mut dice = ScriptedDice::new([25, 0, 4]);
        assert_eq!(dice.roll_die(20), 20);
        assert_eq!(dice.roll_die(6), 1);
        assert_eq!(dice.remaining(), 1);
        assert_eq!(dice.roll_die(6), 4);
        assert_eq!(dice.roll_die(6), EXHAUSTED_FACE);
    }

    #[test]
    fn test_recording_observer_shares_storage() {
        let recorder = RecordingObserver::new();
        let mut handle = recorder.clone();
        handle
            .notify(&CombatEvent::TurnBegan {
                actor: ActorId::new("player"),
                round: 1,
            })
            .unwrap();
        assert_eq!(recorder.events().len(), 1);
        recorder.clear();
        assert!(recorder.events().is_empty());
    }
}
