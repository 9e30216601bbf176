//! Initiative rolling and turn order.
//!
//! Order is by total (highest first), then DEX modifier, then name
//! (case-insensitive), then the order entrants were added. Given the same
//! dice the result is always the same.

use crate::abilities::{Ability, RollKind};
use crate::actor::{Actor, ActorId};
use crate::dice::{self, Advantage, D20Roll, DieRoller};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// One participant going into initiative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiativeEntrant {
    pub id: ActorId,
    pub name: String,
    pub modifier: i32,
    pub dex_modifier: i32,
    pub advantage: Advantage,
    pub bonus: i32,
    pub extra_dice: Vec<String>,
    pub surprised: bool,
}

impl InitiativeEntrant {
    pub fn new(id: impl Into<ActorId>, name: impl Into<String>, modifier: i32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            modifier,
            dex_modifier: modifier,
            advantage: Advantage::Normal,
            bonus: 0,
            extra_dice: Vec::new(),
            surprised: false,
        }
    }

    /// Everything an actor's scores and effects contribute to initiative.
    pub fn from_actor(actor: &Actor) -> Self {
        let components = actor.roll_components(RollKind::Initiative, None);
        Self {
            id: actor.id.clone(),
            name: actor.name.clone(),
            modifier: components.modifier,
            dex_modifier: actor.ability_modifier(Ability::Dexterity),
            advantage: components.advantage,
            bonus: components.bonus,
            extra_dice: components.extra_dice,
            surprised: actor.surprised,
        }
    }
}

/// A rolled initiative and the data needed to break ties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiativeRoll {
    pub d20: D20Roll,
    pub modifier: i32,
    pub bonus: i32,
    pub total: i32,
    pub dex_modifier: i32,
    pub name: String,
    /// Position in the order entrants were added.
    pub sequence: usize,
}

/// Output of a full initiative resolution.
#[derive(Debug, Clone, Default)]
pub struct InitiativeResult {
    pub order: Vec<ActorId>,
    pub rolls: HashMap<ActorId, InitiativeRoll>,
    pub surprised: HashSet<ActorId>,
}

/// Tie-break ordering between two rolls.
pub fn compare(a: &InitiativeRoll, b: &InitiativeRoll) -> Ordering {
    b.total
        .cmp(&a.total)
        .then_with(|| b.dex_modifier.cmp(&a.dex_modifier))
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.sequence.cmp(&b.sequence))
}

/// Roll one entrant.
pub fn roll_entrant(entrant: &InitiativeEntrant, sequence: usize, roller: &mut dyn DieRoller) -> InitiativeRoll {
    let d20 = dice::roll_d20(entrant.advantage, roller);
    let extra: i32 = entrant
        .extra_dice
        .iter()
        .map(|die| dice::evaluate(die, roller).total)
        .sum();
    let bonus = entrant.bonus + extra;
    let total = d20.kept as i32 + entrant.modifier + bonus;
    debug!(actor = %entrant.id, d20 = d20.kept, total, "initiative");
    InitiativeRoll {
        d20,
        modifier: entrant.modifier,
        bonus,
        total,
        dex_modifier: entrant.dex_modifier,
        name: entrant.name.clone(),
        sequence,
    }
}

/// Sort ids by their rolls. Ids without a roll go last, in their current order.
pub fn sort_order(order: &mut [ActorId], rolls: &HashMap<ActorId, InitiativeRoll>) {
    order.sort_by(|a, b| match (rolls.get(a), rolls.get(b)) {
        (Some(ra), Some(rb)) => compare(ra, rb),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Roll initiative for every entrant and produce the turn order.
pub fn roll_initiative(entrants: &[InitiativeEntrant], roller: &mut dyn DieRoller) -> InitiativeResult {
    let mut result = InitiativeResult::default();
    for (sequence, entrant) in entrants.iter().enumerate() {
        if result.rolls.contains_key(&entrant.id) {
            continue;
        }
        let roll = roll_entrant(entrant, sequence, roller);
        result.rolls.insert(entrant.id.clone(), roll);
        result.order.push(entrant.id.clone());
        if entrant.surprised {
            result.surprised.insert(entrant.id.clone());
        }
    }
    sort_order(&mut result.order, &result.rolls);
    result
}

/// Roll a late entrant and slot it into an existing order.
pub fn insert(
    order: &mut Vec<ActorId>,
    rolls: &mut HashMap<ActorId, InitiativeRoll>,
    entrant: &InitiativeEntrant,
    roller: &mut dyn DieRoller,
) -> InitiativeRoll {
    let sequence = rolls.values().map(|r| r.sequence + 1).max().unwrap_or(0);
    let roll = roll_entrant(entrant, sequence, roller);
    rolls.insert(entrant.id.clone(), roll.clone());
    if !order.contains(&entrant.id) {
        order.push(entrant.id.clone());
    }
    sort_order(order, rolls);
    roll
}
