//! Resolver output and lifecycle notifications.
//!
//! Resolvers return a [`Resolution`]: the typed [`Effect`]s they applied plus
//! the human-readable lines they produced. The engine separately emits
//! [`CombatEvent`]s to registered [`CombatObserver`]s. Delivery is best
//! effort; a failing observer is logged and skipped.

use crate::abilities::Ability;
use crate::actor::ActorId;
use crate::battlefield::{Position, ZoneId, ZoneKind};
use crate::concentration::EndReason;
use crate::conditions::Condition;
use crate::encounter::{EncounterId, Outcome};
use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use thiserror::Error;
use tracing::warn;

/// The result of resolving an action.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub effects: Vec<Effect>,
    pub narrative: Vec<String>,
}

impl Resolution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl Into<String>) {
        self.narrative.push(text.into());
    }

    pub fn effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn extend(&mut self, other: Resolution) {
        self.effects.extend(other.effects);
        self.narrative.extend(other.narrative);
    }

    /// The narrative as one block of text.
    pub fn text(&self) -> String {
        self.narrative.join("\n")
    }
}

/// A concrete state change made while resolving an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// The attack never rolled because the attacker could not see the target.
    AttackBlocked { attacker: ActorId, target: ActorId },

    AttackHit {
        attacker: ActorId,
        target: ActorId,
        attack_roll: i32,
        armor_class: i32,
    },

    AttackMissed {
        attacker: ActorId,
        target: ActorId,
        attack_roll: i32,
        armor_class: i32,
    },

    /// A luck point turned a natural 1 into a reroll.
    LuckyReroll { actor: ActorId, from: u32, to: u32 },

    HpChanged {
        target: ActorId,
        amount: i32,
        new_current: i32,
        dropped_to_zero: bool,
    },

    SavingThrow {
        target: ActorId,
        ability: Ability,
        total: i32,
        dc: i32,
        passed: bool,
    },

    ConditionApplied {
        target: ActorId,
        condition: Condition,
        duration_rounds: Option<u32>,
    },

    ConditionRemoved { target: ActorId, condition: Condition },

    Pushed {
        target: ActorId,
        tiles_moved: i32,
        to: Position,
    },

    ZoneCreated { zone: ZoneId, kind: ZoneKind },

    ConcentrationStarted { actor: ActorId, label: String },

    ConcentrationEnded {
        actor: ActorId,
        label: String,
        reason: EndReason,
    },
}

/// Lifecycle notifications sent outward by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatEvent {
    TurnBegan { actor: ActorId, round: u32 },
    TurnEnded { actor: ActorId, round: u32 },
    CombatEnded { outcome: Outcome },
    PostCombatOutcome {
        outcome: Outcome,
        encounter_id: EncounterId,
        return_location: String,
    },
    Revived { actor: ActorId, round: u32 },
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("observer channel disconnected")]
    Disconnected,
    #[error("observer rejected event: {0}")]
    Rejected(String),
}

/// Receives lifecycle notifications.
pub trait CombatObserver {
    fn notify(&mut self, event: &CombatEvent) -> Result<(), NotifyError>;
}

impl CombatObserver for mpsc::Sender<CombatEvent> {
    fn notify(&mut self, event: &CombatEvent) -> Result<(), NotifyError> {
        self.send(event.clone()).map_err(|_| NotifyError::Disconnected)
    }
}

/// Deliver an event to every observer, logging failures.
pub(crate) fn broadcast(observers: &mut [Box<dyn CombatObserver>], event: &CombatEvent) {
    for observer in observers.iter_mut() {
        if let Err(e) = observer.notify(event) {
            warn!(?event, error = %e, "failed to deliver combat event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingObserver;

    struct Broken;

    impl CombatObserver for Broken {
        fn notify(&mut self, _event: &CombatEvent) -> Result<(), NotifyError> {
            Err(NotifyError::Rejected("no".into()))
        }
    }

    #[test]
    fn test_broadcast_skips_failing_observers() {
        let recorder = RecordingObserver::new();
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let mut observers: Vec<Box<dyn CombatObserver>> =
            vec![Box::new(Broken), Box::new(tx), Box::new(recorder.clone())];

        let event = CombatEvent::TurnBegan {
            actor: ActorId::new("player"),
            round: 1,
        };
        broadcast(&mut observers, &event);

        assert_eq!(recorder.events(), vec![event]);
    }

    #[test]
    fn test_channel_observer() {
        let (tx, rx) = mpsc::channel();
        let mut observers: Vec<Box<dyn CombatObserver>> = vec![Box::new(tx)];
        broadcast(
            &mut observers,
            &CombatEvent::CombatEnded {
                outcome: Outcome::Victory,
            },
        );
        assert_eq!(
            rx.try_recv().ok(),
            Some(CombatEvent::CombatEnded {
                outcome: Outcome::Victory
            })
        );
    }
}
