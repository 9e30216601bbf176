//! The combat orchestrator.
//!
//! [`CombatEngine`] owns the rules plumbing (dice, lookups, observers,
//! configuration) and drives an [`Encounter`] through its lifecycle:
//! assembly, round and turn advance, mid-combat arrivals and departures,
//! revival, and victory or defeat.

use crate::actor::{Actor, ActorId, SharedProfile};
use crate::attack::{self, AttackOptions};
use crate::battlefield::{Battlefield, Position};
use crate::concentration;
use crate::conditions::Condition;
use crate::config::CombatConfig;
use crate::dice::{DieRoller, RngRoller};
use crate::encounter::{
    Bestiary, Encounter, EncounterDefinition, EncounterId, Outcome, ParticipantDescriptor, Role,
    StatLookup,
};
use crate::events::{self, CombatEvent, CombatObserver, Resolution};
use crate::initiative::{self, InitiativeEntrant};
use crate::spells::{self, BuiltinSpells, SpellLookup};
use crate::statuses;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CombatError {
    #[error("unknown actor: {0}")]
    UnknownActor(ActorId),
    #[error("unknown spell: {0}")]
    UnknownSpell(String),
    #[error("the encounter is over ({0})")]
    EncounterOver(Outcome),
    #[error("no actor holds the current turn")]
    NoActiveActor,
    #[error("it is not {0}'s turn")]
    NotYourTurn(ActorId),
    #[error("{spell} has nowhere to land")]
    NoSpellArea { spell: String },
    #[error("{actor} has no {resource} left this turn")]
    ActionUnavailable {
        actor: ActorId,
        resource: &'static str,
    },
}

/// Per-call overrides for a revival. `None` uses the configured default.
#[derive(Debug, Clone, Default)]
pub struct ReviveOptions {
    pub clear_conditions: Option<Vec<Condition>>,
    pub prone: Option<bool>,
}

impl ReviveOptions {
    pub fn prone(mut self, prone: bool) -> Self {
        self.prone = Some(prone);
        self
    }

    pub fn clearing(mut self, conditions: Vec<Condition>) -> Self {
        self.clear_conditions = Some(conditions);
        self
    }
}

/// What an `end_turn` call did.
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub ended: ActorId,
    /// `None` when combat ended or nobody could act.
    pub began: Option<ActorId>,
    pub round: u32,
    pub outcome: Outcome,
    pub narrative: Vec<String>,
}

/// Drives encounters.
pub struct CombatEngine {
    config: CombatConfig,
    roller: Box<dyn DieRoller>,
    observers: Vec<Box<dyn CombatObserver>>,
    stats: Box<dyn StatLookup>,
    spells: Box<dyn SpellLookup>,
}

impl CombatEngine {
    pub fn new(config: CombatConfig) -> Self {
        Self {
            config,
            roller: Box::new(RngRoller::thread()),
            observers: Vec::new(),
            stats: Box::new(Bestiary),
            spells: Box::new(BuiltinSpells),
        }
    }

    pub fn with_roller(mut self, roller: impl DieRoller + 'static) -> Self {
        self.roller = Box::new(roller);
        self
    }

    pub fn with_stat_lookup(mut self, stats: impl StatLookup + 'static) -> Self {
        self.stats = Box::new(stats);
        self
    }

    pub fn with_spell_lookup(mut self, spells: impl SpellLookup + 'static) -> Self {
        self.spells = Box::new(spells);
        self
    }

    pub fn add_observer(&mut self, observer: impl CombatObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn config(&self) -> &CombatConfig {
        &self.config
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Assemble the participants, roll initiative and open round 1.
    pub fn start(&mut self, definition: EncounterDefinition, profile: SharedProfile) -> Encounter {
        let definition = definition.normalized();
        let id = definition.id.map(EncounterId).unwrap_or_default();
        let return_location = definition
            .return_location
            .clone()
            .unwrap_or_else(|| self.config.default_return_location.clone());
        let field = Battlefield {
            grid: definition.grid.clone(),
            ..Battlefield::default()
        };

        let mut enc = Encounter::new(
            id,
            definition.title.clone(),
            return_location,
            field,
            profile,
            definition.triggers.clone(),
        );
        for descriptor in &definition.participants {
            let actor = self.build_actor(&enc, descriptor);
            enc.field.add_actor(actor);
        }

        let entrants: Vec<InitiativeEntrant> =
            enc.field.actors.iter().map(InitiativeEntrant::from_actor).collect();
        let rolled = initiative::roll_initiative(&entrants, self.roller.as_mut());
        enc.order = rolled.order;
        enc.initiative = rolled.rolls;
        enc.surprised = rolled.surprised;
        info!(encounter = %enc.id, title = %enc.title, actors = enc.order.len(), "combat started");

        let mut narrative = vec![format!("{} begins!", enc.title)];
        self.start_round(&mut enc, 1, &mut narrative);
        if let Some(index) = self.first_eligible(&enc) {
            enc.turn_index = index;
        }
        enc.log.extend(narrative);

        if self.evaluate_outcome(&mut enc) == Outcome::Ongoing {
            self.begin_turn(&mut enc);
        }
        enc
    }

    /// Like [`start`](Self::start) from JSON, falling back to the default
    /// skirmish when the JSON does not parse.
    pub fn start_from_json(&mut self, json: &str, profile: SharedProfile) -> Encounter {
        self.start(EncounterDefinition::from_json_or_default(json), profile)
    }

    /// Finish the current turn and hand the turn to the next eligible actor.
    pub fn end_turn(&mut self, enc: &mut Encounter) -> Result<TurnReport, CombatError> {
        Self::ensure_ongoing(enc)?;
        let finished = enc
            .current_actor_id()
            .cloned()
            .ok_or(CombatError::NoActiveActor)?;
        let round = enc.round;
        let mut narrative = Vec::new();

        self.tick_end_of_turn(enc, &finished, &mut narrative);
        events::broadcast(
            &mut self.observers,
            &CombatEvent::TurnEnded {
                actor: finished.clone(),
                round,
            },
        );

        let outcome = self.check_end_conditions(enc);
        if outcome.is_over() {
            enc.log.extend(narrative.iter().cloned());
            self.finish(enc, outcome);
            return Ok(TurnReport {
                ended: finished,
                began: None,
                round: enc.round,
                outcome,
                narrative,
            });
        }

        let began = self.advance(enc, &mut narrative);
        if began.is_none() {
            warn!(encounter = %enc.id, "no eligible actor to take the next turn");
        }
        enc.log.extend(narrative.iter().cloned());

        Ok(TurnReport {
            ended: finished,
            began,
            round: enc.round,
            outcome: enc.outcome,
            narrative,
        })
    }

    /// Victory if no non-player is standing, else defeat if no player is
    /// standing. Victory wins when both sides are down.
    pub fn check_end_conditions(&self, enc: &Encounter) -> Outcome {
        let side_standing =
            |player: bool| enc.actors().any(|a| a.is_player() == player && a.is_standing());
        if !side_standing(false) {
            Outcome::Victory
        } else if !side_standing(true) {
            Outcome::Defeat
        } else {
            Outcome::Ongoing
        }
    }

    // ========================================================================
    // Participants
    // ========================================================================

    /// Add a participant mid-fight. It rolls initiative and is slotted into
    /// the order; the actor whose turn it is keeps the turn.
    pub fn join_mid_combat(
        &mut self,
        enc: &mut Encounter,
        descriptor: &ParticipantDescriptor,
    ) -> Result<ActorId, CombatError> {
        Self::ensure_ongoing(enc)?;
        let mut narrative = Vec::new();
        let id = self.join(enc, descriptor, true, &mut narrative);
        enc.log.extend(narrative);
        self.evaluate_outcome(enc);
        Ok(id)
    }

    /// Soft-remove an actor. It keeps its seat in the order but never acts.
    pub fn remove_actor(
        &mut self,
        enc: &mut Encounter,
        id: &ActorId,
        reason: impl Into<String>,
    ) -> Result<(), CombatError> {
        let actor = Self::actor_mut(enc, id)?;
        let reason = reason.into();
        actor.removed = true;
        actor.removed_reason = Some(reason.clone());
        let line = format!("{} leaves the fight ({reason}).", actor.name);
        debug!(actor = %id, %reason, "actor removed");
        enc.log.push(line);
        self.evaluate_outcome(enc);
        Ok(())
    }

    /// Undo a soft removal. Hit points are left alone.
    pub fn rejoin(&mut self, enc: &mut Encounter, id: &ActorId) -> Result<(), CombatError> {
        let actor = Self::actor_mut(enc, id)?;
        actor.removed = false;
        actor.removed_reason = None;
        let line = format!("{} rejoins the fight.", actor.name);
        enc.log.push(line);
        if enc.is_over() {
            self.try_reopen(enc);
        } else {
            self.evaluate_outcome(enc);
        }
        Ok(())
    }

    /// Bring an actor back with `hp` hit points, clearing incapacitating
    /// conditions and (by default) leaving it prone. Reopens a finished
    /// encounter when both sides have someone standing again.
    pub fn revive(
        &mut self,
        enc: &mut Encounter,
        id: &ActorId,
        hp: i32,
        options: ReviveOptions,
    ) -> Result<(), CombatError> {
        let clear = options
            .clear_conditions
            .unwrap_or_else(|| self.config.revive.clear_conditions.clone());
        let prone = options.prone.unwrap_or(self.config.revive.apply_prone);

        let actor = Self::actor_mut(enc, id)?;
        actor.removed = false;
        actor.removed_reason = None;
        actor
            .statuses
            .retain(|s| !s.condition.is_some_and(|c| clear.contains(&c)));
        for condition in &clear {
            actor.remove_condition(*condition);
        }
        actor.set_hp(hp.max(1));
        if prone {
            actor.add_condition(Condition::Prone);
        }
        let line = format!("{} is revived with {} HP.", actor.name, actor.hp());
        info!(actor = %id, hp = actor.hp(), "revived");
        enc.log.push(line);

        events::broadcast(
            &mut self.observers,
            &CombatEvent::Revived {
                actor: id.clone(),
                round: enc.round,
            },
        );

        if enc.is_over() {
            self.try_reopen(enc);
        }
        Ok(())
    }

    // ========================================================================
    // Actions
    // ========================================================================

    /// Spend the attacker's action on an attack.
    pub fn attack(
        &mut self,
        enc: &mut Encounter,
        attacker: &ActorId,
        defender: &ActorId,
        options: AttackOptions,
    ) -> Result<Resolution, CombatError> {
        Self::ensure_ongoing(enc)?;
        if !enc.field.contains(defender) {
            return Err(CombatError::UnknownActor(defender.clone()));
        }
        self.ensure_turn(enc, attacker)?;
        Self::spend_action(enc, attacker)?;

        let res = attack::resolve_attack(
            &mut enc.field,
            attacker,
            defender,
            &options,
            self.roller.as_mut(),
        );
        enc.log.extend(res.narrative.iter().cloned());
        self.evaluate_outcome(enc);
        Ok(res)
    }

    /// Spend the caster's action on a spell from the spell lookup.
    pub fn cast_spell(
        &mut self,
        enc: &mut Encounter,
        caster: &ActorId,
        spell_key: &str,
        target: Option<Position>,
    ) -> Result<Resolution, CombatError> {
        Self::ensure_ongoing(enc)?;
        let spell = self
            .spells
            .spell(spell_key)
            .ok_or_else(|| CombatError::UnknownSpell(spell_key.to_string()))?;
        self.ensure_turn(enc, caster)?;
        if spells::area_center(&enc.field, caster, &spell, target).is_none() {
            return Err(CombatError::NoSpellArea { spell: spell.key });
        }
        Self::spend_action(enc, caster)?;

        let res = spells::cast_spell(
            &mut enc.field,
            caster,
            &spell,
            target,
            self.roller.as_mut(),
            self.config.feet_per_tile,
        );
        enc.log.extend(res.narrative.iter().cloned());
        self.evaluate_outcome(enc);
        Ok(res)
    }

    /// Drop an actor's concentration on purpose.
    pub fn end_concentration(&mut self, enc: &mut Encounter, id: &ActorId) -> Result<bool, CombatError> {
        let name = Self::actor_mut(enc, id)?.name.clone();
        let ended = concentration::end(&mut enc.field, id, concentration::EndReason::Ended);
        if let Some(ended) = &ended {
            enc.log.push(ended.narrative(&name));
        }
        Ok(ended.is_some())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn ensure_ongoing(enc: &Encounter) -> Result<(), CombatError> {
        if enc.is_over() {
            Err(CombatError::EncounterOver(enc.outcome))
        } else {
            Ok(())
        }
    }

    fn actor_mut<'a>(enc: &'a mut Encounter, id: &ActorId) -> Result<&'a mut Actor, CombatError> {
        enc.field
            .actor_mut(id)
            .ok_or_else(|| CombatError::UnknownActor(id.clone()))
    }

    /// Only the actor holding the turn, and able to act, may take actions.
    fn ensure_turn(&self, enc: &Encounter, id: &ActorId) -> Result<(), CombatError> {
        let actor = enc
            .field
            .actor(id)
            .ok_or_else(|| CombatError::UnknownActor(id.clone()))?;
        if enc.current_actor_id() != Some(id)
            || !actor.can_act(&self.config.turn_blocking_conditions)
        {
            return Err(CombatError::NotYourTurn(id.clone()));
        }
        Ok(())
    }

    fn spend_action(enc: &mut Encounter, id: &ActorId) -> Result<(), CombatError> {
        let actor = Self::actor_mut(enc, id)?;
        if !actor.economy.can_use_action() {
            return Err(CombatError::ActionUnavailable {
                actor: id.clone(),
                resource: "action",
            });
        }
        actor.economy.spend_action();
        Ok(())
    }

    fn is_eligible(&self, enc: &Encounter, index: usize) -> bool {
        enc.order
            .get(index)
            .and_then(|id| enc.field.actor(id))
            .is_some_and(|a| a.can_act(&self.config.turn_blocking_conditions))
    }

    fn first_eligible(&self, enc: &Encounter) -> Option<usize> {
        (0..enc.order.len()).find(|&i| self.is_eligible(enc, i))
    }

    /// Next eligible index after `from`, wrapping at most once. The flag says
    /// whether the scan passed the end of the order.
    fn next_eligible(&self, enc: &Encounter, from: usize) -> Option<(usize, bool)> {
        let len = enc.order.len();
        (1..=len)
            .map(|step| from + step)
            .find(|&i| self.is_eligible(enc, i % len))
            .map(|i| (i % len, i >= len))
    }

    /// Move the turn to the next eligible actor, opening a new round when
    /// the scan wraps. A new round seats its arrivals first, then the turn
    /// goes to the first eligible actor in the new order. Leaves the index
    /// alone if nobody can act.
    fn advance(&mut self, enc: &mut Encounter, narrative: &mut Vec<String>) -> Option<ActorId> {
        let (index, wrapped) = self.next_eligible(enc, enc.turn_index)?;
        enc.turn_index = index;
        if wrapped {
            self.start_round(enc, enc.round + 1, narrative);
            if let Some(first) = self.first_eligible(enc) {
                enc.turn_index = first;
            }
        }
        self.begin_turn(enc)
    }

    /// Fresh economy for the active actor, then announce its turn.
    fn begin_turn(&mut self, enc: &mut Encounter) -> Option<ActorId> {
        let id = enc.current_actor_id().cloned()?;
        if let Some(actor) = enc.field.actor_mut(&id) {
            actor.refresh_from_profile();
            actor.begin_turn();
        }
        debug!(actor = %id, round = enc.round, "turn began");
        events::broadcast(
            &mut self.observers,
            &CombatEvent::TurnBegan {
                actor: id.clone(),
                round: enc.round,
            },
        );
        Some(id)
    }

    /// Round-start bookkeeping: reset every economy, spawn arrivals that are
    /// due, and expose announcements for the round after.
    fn start_round(&mut self, enc: &mut Encounter, round: u32, narrative: &mut Vec<String>) {
        enc.round = round;
        for actor in enc.field.actors.iter_mut() {
            actor.economy.reset();
        }
        debug!(encounter = %enc.id, round, "round started");
        if round > 1 {
            narrative.push(format!("Round {round}."));
        }

        let due: Vec<ParticipantDescriptor> = enc
            .triggers
            .iter_mut()
            .filter(|t| !t.fired && t.round <= round)
            .map(|t| {
                t.fired = true;
                t.actor.clone()
            })
            .collect();
        for descriptor in &due {
            self.join(enc, descriptor, false, narrative);
        }

        enc.announcements = enc
            .triggers
            .iter()
            .filter(|t| !t.fired && t.round == round + 1)
            .filter_map(|t| t.announcement.clone())
            .collect();
        narrative.extend(enc.announcements.iter().cloned());
    }

    /// Seat a new participant. With `reseat`, a current actor that cannot
    /// act hands the turn on; round starts pick the actor themselves.
    fn join(
        &mut self,
        enc: &mut Encounter,
        descriptor: &ParticipantDescriptor,
        reseat: bool,
        narrative: &mut Vec<String>,
    ) -> ActorId {
        let current = enc.current_actor_id().cloned();
        let actor = self.build_actor(enc, descriptor);
        let id = actor.id.clone();
        let entrant = InitiativeEntrant::from_actor(&actor);
        narrative.push(format!("{} joins the fight!", actor.name));
        enc.field.add_actor(actor);

        if entrant.surprised {
            enc.surprised.insert(id.clone());
        }
        initiative::insert(
            &mut enc.order,
            &mut enc.initiative,
            &entrant,
            self.roller.as_mut(),
        );
        if let Some(index) = current.and_then(|c| enc.order.iter().position(|x| *x == c)) {
            enc.turn_index = index;
        }
        debug!(actor = %id, order = ?enc.order, "joined mid-combat");

        if reseat && !enc.is_over() && !self.is_eligible(enc, enc.turn_index) {
            self.advance(enc, narrative);
        }
        id
    }

    fn build_actor(&self, enc: &Encounter, descriptor: &ParticipantDescriptor) -> Actor {
        let base = descriptor
            .id
            .clone()
            .or_else(|| descriptor.key.clone())
            .unwrap_or_else(|| match descriptor.role {
                Role::Player => "player".to_string(),
                Role::NonPlayer => "npc".to_string(),
            });
        let id = unique_id(&enc.field, base);

        let mut actor = match descriptor.role {
            Role::Player => Actor::from_profile(id, enc.profile.clone()),
            Role::NonPlayer => {
                let stats = match (&descriptor.stats, &descriptor.key) {
                    (Some(inline), _) => inline.clone(),
                    (None, Some(key)) => self.stats.stat_block(key).unwrap_or_else(|| {
                        warn!(%key, "unknown stat key, using placeholder stats");
                        self.config.placeholder_stats.clone()
                    }),
                    (None, None) => self.config.placeholder_stats.clone(),
                };
                Actor::from_stat_block(id, descriptor.key.clone(), &stats)
            }
        };

        if let Some(name) = &descriptor.name {
            actor.name = name.clone();
        }
        if let Some(distance) = descriptor.distance_ft {
            actor.distance_ft = distance;
        }
        actor.position = descriptor.position;
        actor.surprised = descriptor.surprised;
        actor
    }

    fn tick_end_of_turn(&mut self, enc: &mut Encounter, finished: &ActorId, narrative: &mut Vec<String>) {
        let name = enc
            .field
            .actor(finished)
            .map(|a| a.name.clone())
            .unwrap_or_default();
        if let Some(ended) = concentration::on_end_of_turn_tick(&mut enc.field, finished) {
            narrative.push(ended.narrative(&name));
        }
        let hazards = spells::resolve_hazards(&mut enc.field, finished, self.roller.as_mut());
        narrative.extend(hazards.narrative);
        for actor in enc.field.actors.iter_mut() {
            narrative.extend(statuses::tick(actor).narrative);
        }
    }

    /// Record a terminal outcome if the fight just ended.
    fn evaluate_outcome(&mut self, enc: &mut Encounter) -> Outcome {
        if enc.is_over() {
            return enc.outcome;
        }
        let outcome = self.check_end_conditions(enc);
        if outcome.is_over() {
            self.finish(enc, outcome);
        }
        outcome
    }

    fn finish(&mut self, enc: &mut Encounter, outcome: Outcome) {
        enc.outcome = outcome;
        info!(encounter = %enc.id, %outcome, round = enc.round, "combat ended");
        let line = if outcome == Outcome::Victory {
            "Victory!"
        } else {
            "Defeat..."
        };
        enc.log.push(line.to_string());
        events::broadcast(&mut self.observers, &CombatEvent::CombatEnded { outcome });
        events::broadcast(
            &mut self.observers,
            &CombatEvent::PostCombatOutcome {
                outcome,
                encounter_id: enc.id,
                return_location: enc.return_location.clone(),
            },
        );
    }

    /// Reopen a finished encounter if both sides have someone standing.
    fn try_reopen(&mut self, enc: &mut Encounter) {
        if self.check_end_conditions(enc).is_over() {
            return;
        }
        enc.outcome = Outcome::Ongoing;
        info!(encounter = %enc.id, round = enc.round, "combat reopened");
        enc.log.push("The fight resumes!".to_string());
        if !self.is_eligible(enc, enc.turn_index) {
            let mut narrative = Vec::new();
            self.advance(enc, &mut narrative);
            enc.log.extend(narrative);
        }
    }
}

impl Default for CombatEngine {
    fn default() -> Self {
        Self::new(CombatConfig::default())
    }
}

fn unique_id(field: &Battlefield, base: String) -> ActorId {
    let candidate = ActorId::new(base.clone());
    if !field.contains(&candidate) {
        return candidate;
    }
    (2..)
        .map(|n| ActorId::new(format!("{base}_{n}")))
        .find(|id| !field.contains(id))
        .unwrap_or(candidate)
}
