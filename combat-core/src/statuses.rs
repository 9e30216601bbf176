//! Time-limited statuses and the end-of-turn ticker.

use crate::actor::{Actor, ActorId};
use crate::conditions::Condition;
use crate::events::Effect;
use serde::{Deserialize, Serialize};

/// A counter-bound status on an actor. When it runs out, the condition it
/// carries is removed unless another status still holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedStatus {
    pub key: String,
    pub condition: Option<Condition>,
    pub rounds_remaining: u32,
    pub source: Option<ActorId>,
    /// Damage ends the status early (sleep).
    pub ends_on_damage: bool,
}

impl TimedStatus {
    pub fn new(key: impl Into<String>, rounds: u32) -> Self {
        Self {
            key: key.into(),
            condition: None,
            rounds_remaining: rounds,
            source: None,
            ends_on_damage: false,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn from_source(mut self, source: ActorId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn ending_on_damage(mut self) -> Self {
        self.ends_on_damage = true;
        self
    }
}

/// What a tick or removal did to one actor.
#[derive(Debug, Default)]
pub struct StatusChanges {
    pub effects: Vec<Effect>,
    pub narrative: Vec<String>,
}

impl StatusChanges {
    fn merge(&mut self, other: StatusChanges) {
        self.effects.extend(other.effects);
        self.narrative.extend(other.narrative);
    }
}

/// Attach a status, applying its condition immediately.
pub fn apply(actor: &mut Actor, status: TimedStatus) -> Option<Effect> {
    let effect = status.condition.map(|condition| Effect::ConditionApplied {
        target: actor.id.clone(),
        condition,
        duration_rounds: Some(status.rounds_remaining),
    });
    if let Some(condition) = status.condition {
        actor.add_condition(condition);
    }
    actor.statuses.push(status);
    effect
}

/// Decrement every status and timed modifier effect on the actor.
pub fn tick(actor: &mut Actor) -> StatusChanges {
    let mut expired = Vec::new();
    actor.statuses.retain_mut(|status| {
        status.rounds_remaining = status.rounds_remaining.saturating_sub(1);
        if status.rounds_remaining == 0 {
            expired.push(status.clone());
            false
        } else {
            true
        }
    });

    let mut changes = StatusChanges::default();
    for status in expired {
        changes.merge(release(actor, &status));
    }

    let mut ended_effects = Vec::new();
    actor.effects.retain_mut(|effect| match effect.rounds_remaining.as_mut() {
        Some(rounds) => {
            *rounds = rounds.saturating_sub(1);
            if *rounds == 0 {
                ended_effects.push(effect.key.clone());
                false
            } else {
                true
            }
        }
        None => true,
    });
    if !ended_effects.is_empty() {
        actor.write_through();
    }
    for key in ended_effects {
        changes
            .narrative
            .push(format!("{}: {} has ended.", actor.name, key));
    }

    changes
}

/// Remove statuses that end when the actor takes damage.
pub fn end_on_damage(actor: &mut Actor) -> StatusChanges {
    let (ending, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut actor.statuses)
        .into_iter()
        .partition(|s| s.ends_on_damage);
    actor.statuses = kept;

    let mut changes = StatusChanges::default();
    for status in ending {
        changes.merge(release(actor, &status));
    }
    changes
}

/// Remove every status with this key from this source.
pub fn remove_from_source(actor: &mut Actor, key: &str, source: &ActorId) -> StatusChanges {
    let (ending, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut actor.statuses)
        .into_iter()
        .partition(|s| s.key == key && s.source.as_ref() == Some(source));
    actor.statuses = kept;

    let mut changes = StatusChanges::default();
    for status in ending {
        changes.merge(release(actor, &status));
    }
    changes
}

fn release(actor: &mut Actor, status: &TimedStatus) -> StatusChanges {
    let mut changes = StatusChanges::default();
    match status.condition {
        Some(condition) => {
            let still_held = actor.statuses.iter().any(|s| s.condition == Some(condition));
            if still_held || !actor.remove_condition(condition) {
                return changes;
            }
            changes.effects.push(Effect::ConditionRemoved {
                target: actor.id.clone(),
                condition,
            });
            if condition == Condition::Unconscious {
                changes.narrative.push(format!("{} stirs awake.", actor.name));
            } else {
                changes
                    .narrative
                    .push(format!("{}: {} has ended.", actor.name, status.key));
            }
        }
        None => changes
            .narrative
            .push(format!("{}: {} has ended.", actor.name, status.key)),
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abilities::{ModifierEffect, ModifierOp, ModifierTarget, RollKind};
    use crate::actor::StatBlock;

    fn goblin() -> Actor {
        Actor::from_stat_block("goblin", None, &StatBlock::new("Goblin", 13, 7))
    }

    #[test]
    fn test_sleep_expires_after_two_ticks() {
        let mut actor = goblin();
        apply(
            &mut actor,
            TimedStatus::new("sleep", 2).with_condition(Condition::Unconscious),
        );
        assert!(actor.has_condition(Condition::Unconscious));

        let first = tick(&mut actor);
        assert!(first.narrative.is_empty());
        assert!(actor.has_condition(Condition::Unconscious));

        let second = tick(&mut actor);
        assert_eq!(second.narrative, vec!["Goblin stirs awake.".to_string()]);
        assert!(!actor.has_condition(Condition::Unconscious));
        assert!(actor.statuses.is_empty());
    }

    #[test]
    fn test_overlapping_statuses_keep_condition() {
        let mut actor = goblin();
        apply(&mut actor, TimedStatus::new("hold", 1).with_condition(Condition::Paralyzed));
        apply(&mut actor, TimedStatus::new("web", 3).with_condition(Condition::Paralyzed));
        tick(&mut actor);
        assert!(actor.has_condition(Condition::Paralyzed));
    }

    #[test]
    fn test_damage_wakes_sleeper() {
        let mut actor = goblin();
        apply(
            &mut actor,
            TimedStatus::new("sleep", 2)
                .with_condition(Condition::Unconscious)
                .ending_on_damage(),
        );
        apply(&mut actor, TimedStatus::new("poison", 3).with_condition(Condition::Poisoned));
        let changes = end_on_damage(&mut actor);
        assert!(!actor.has_condition(Condition::Unconscious));
        assert!(actor.has_condition(Condition::Poisoned));
        assert_eq!(changes.narrative.len(), 1);
    }

    #[test]
    fn test_timed_modifier_effect_expires() {
        let mut actor = goblin();
        actor.effects.push(
            ModifierEffect::new("bless")
                .with(ModifierTarget::Roll(RollKind::Attack), ModifierOp::AddDie("1d4".into()))
                .with_duration(1),
        );
        let changes = tick(&mut actor);
        assert!(actor.effects.is_empty());
        assert_eq!(changes.narrative, vec!["Goblin: bless has ended.".to_string()]);
    }

    #[test]
    fn test_remove_from_source_only_touches_that_source() {
        let mut actor = goblin();
        apply(
            &mut actor,
            TimedStatus::new("sleep", 2)
                .with_condition(Condition::Unconscious)
                .from_source(ActorId::new("mage_a")),
        );
        remove_from_source(&mut actor, "sleep", &ActorId::new("mage_b"));
        assert!(actor.has_condition(Condition::Unconscious));
        remove_from_source(&mut actor, "sleep", &ActorId::new("mage_a"));
        assert!(!actor.has_condition(Condition::Unconscious));
    }
}
