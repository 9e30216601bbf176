//! Single-slot concentration.
//!
//! An actor holds at most one [`ConcentrationRecord`]. Ending it takes the
//! record out of the slot before its [`Cleanup`] runs, so cleanup happens
//! exactly once per record no matter how often `end` is called. A failing
//! cleanup is logged and otherwise ignored.

use crate::abilities::{Ability, RollKind};
use crate::actor::ActorId;
use crate::battlefield::{Battlefield, ZoneId};
use crate::dice::{Advantage, DieRoller};
use crate::events::Effect;
use crate::statuses;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a concentration record ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// A new record replaced it.
    Replaced,
    FailedSave,
    DurationExpired,
    /// Ended on purpose by the caster or the caller.
    Ended,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Replaced => "replaced",
            EndReason::FailedSave => "failed_save",
            EndReason::DurationExpired => "duration_expired",
            EndReason::Ended => "ended",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("zone {0} was already gone")]
    ZoneMissing(ZoneId),
    #[error("cleanup failed: {0}")]
    Failed(String),
}

type CustomCleanup = Box<dyn FnOnce(&mut Battlefield, EndReason) -> Result<(), CleanupError>>;

/// How to undo what a concentration effect did to the world.
pub enum Cleanup {
    Nothing,
    DissolveZone(ZoneId),
    /// Drop the statuses with this key that the caster applied.
    WakeSleepers { key: String },
    Custom(CustomCleanup),
}

impl Cleanup {
    pub fn custom(
        f: impl FnOnce(&mut Battlefield, EndReason) -> Result<(), CleanupError> + 'static,
    ) -> Self {
        Cleanup::Custom(Box::new(f))
    }

    fn run(self, field: &mut Battlefield, owner: &ActorId, reason: EndReason) -> Result<(), CleanupError> {
        match self {
            Cleanup::Nothing => Ok(()),
            Cleanup::DissolveZone(id) => field
                .zones
                .remove(id)
                .map(|_| ())
                .ok_or(CleanupError::ZoneMissing(id)),
            Cleanup::WakeSleepers { key } => {
                for actor in field.actors.iter_mut() {
                    let changes = statuses::remove_from_source(actor, &key, owner);
                    for line in changes.narrative {
                        debug!("{line}");
                    }
                }
                Ok(())
            }
            Cleanup::Custom(f) => f(field, reason),
        }
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cleanup::Nothing => write!(f, "Nothing"),
            Cleanup::DissolveZone(id) => write!(f, "DissolveZone({id})"),
            Cleanup::WakeSleepers { key } => write!(f, "WakeSleepers({key})"),
            Cleanup::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// An active concentration effect.
#[derive(Debug)]
pub struct ConcentrationRecord {
    /// Identifier of what is being concentrated on (e.g. a spell key).
    pub source: String,
    pub label: String,
    pub cleanup: Cleanup,
    pub rounds_remaining: Option<u32>,
}

impl ConcentrationRecord {
    pub fn new(source: impl Into<String>, label: impl Into<String>, cleanup: Cleanup) -> Self {
        Self {
            source: source.into(),
            label: label.into(),
            cleanup,
            rounds_remaining: None,
        }
    }

    pub fn with_duration(mut self, rounds: u32) -> Self {
        self.rounds_remaining = Some(rounds);
        self
    }
}

/// A record that left the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ended {
    pub actor: ActorId,
    pub source: String,
    pub label: String,
    pub reason: EndReason,
    pub cleanup_ok: bool,
}

impl Ended {
    pub fn effect(&self) -> Effect {
        Effect::ConcentrationEnded {
            actor: self.actor.clone(),
            label: self.label.clone(),
            reason: self.reason,
        }
    }

    pub fn narrative(&self, actor_name: &str) -> String {
        match self.reason {
            EndReason::FailedSave => format!("{actor_name} loses concentration on {}.", self.label),
            EndReason::DurationExpired => format!("{} fades.", self.label),
            EndReason::Replaced | EndReason::Ended => {
                format!("{actor_name} stops concentrating on {}.", self.label)
            }
        }
    }
}

/// Result of a concentration check after damage.
#[derive(Debug, Clone)]
pub struct ConcentrationCheck {
    pub dc: i32,
    pub total: i32,
    pub ended: Option<Ended>,
}

/// DC of the concentration save for a hit of `damage`.
pub fn damage_dc(damage: i32) -> i32 {
    (damage.max(0) / 2).max(10)
}

pub fn is_concentrating(field: &Battlefield, actor: &ActorId) -> bool {
    field.actor(actor).is_some_and(|a| a.concentration.is_some())
}

/// Install a record, ending any previous one first.
///
/// Returns the previous record's end, if there was one.
pub fn begin(field: &mut Battlefield, actor: &ActorId, record: ConcentrationRecord) -> Option<Ended> {
    if !field.contains(actor) {
        warn!(%actor, source = %record.source, "cannot concentrate: unknown actor");
        return None;
    }
    let previous = end(field, actor, EndReason::Replaced);
    debug!(%actor, source = %record.source, "concentration begins");
    if let Some(a) = field.actor_mut(actor) {
        a.concentration = Some(record);
    }
    previous
}

/// End concentration. A no-op when the slot is empty.
pub fn end(field: &mut Battlefield, actor: &ActorId, reason: EndReason) -> Option<Ended> {
    let record = field.actor_mut(actor)?.concentration.take()?;
    let ConcentrationRecord {
        source,
        label,
        cleanup,
        ..
    } = record;

    let cleanup_ok = match cleanup.run(field, actor, reason) {
        Ok(()) => true,
        Err(e) => {
            warn!(%actor, %source, error = %e, "concentration cleanup failed");
            false
        }
    };
    debug!(%actor, %source, %reason, "concentration ended");

    Some(Ended {
        actor: actor.clone(),
        source,
        label,
        reason,
        cleanup_ok,
    })
}

/// Concentration save after taking damage: d20 + CON against
/// max(10, damage / 2). Failing ends concentration.
pub fn on_damage(
    field: &mut Battlefield,
    actor: &ActorId,
    damage: i32,
    roller: &mut dyn DieRoller,
) -> Option<ConcentrationCheck> {
    let a = field.actor(actor)?;
    a.concentration.as_ref()?;

    let dc = damage_dc(damage);
    let total = a
        .roll_d20(RollKind::Save, Some(Ability::Constitution), Advantage::Normal, roller)
        .total;
    debug!(%actor, damage, dc, total, "concentration save");

    let ended = if total < dc {
        end(field, actor, EndReason::FailedSave)
    } else {
        None
    };
    Some(ConcentrationCheck { dc, total, ended })
}

/// Count down a timed record for the actor whose turn just ended.
pub fn on_end_of_turn_tick(field: &mut Battlefield, actor: &ActorId) -> Option<Ended> {
    let record = field.actor_mut(actor)?.concentration.as_mut()?;
    let rounds = record.rounds_remaining.as_mut()?;
    *rounds = rounds.saturating_sub(1);
    if *rounds == 0 {
        end(field, actor, EndReason::DurationExpired)
    } else {
        None
    }
}
