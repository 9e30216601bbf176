//! Encounter definitions, the stat lookup, and live encounter state.

use crate::actor::{Actor, ActorId, SharedProfile, StatBlock};
use crate::abilities::AbilityScores;
use crate::battlefield::{Battlefield, Position, TileGrid};
use crate::initiative::InitiativeRoll;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EncounterError {
    #[error("invalid encounter definition: {0}")]
    Json(#[from] serde_json::Error),
}

/// Unique identifier for an encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncounterId(pub Uuid);

impl EncounterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EncounterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EncounterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Ongoing,
    Victory,
    Defeat,
}

impl Outcome {
    pub fn is_over(&self) -> bool {
        !matches!(self, Outcome::Ongoing)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ongoing => write!(f, "ongoing"),
            Outcome::Victory => write!(f, "victory"),
            Outcome::Defeat => write!(f, "defeat"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Player,
    #[default]
    NonPlayer,
}

/// How to build one participant.
///
/// Player descriptors bind to the live profile handed to the engine.
/// Non-player descriptors use inline `stats`, else `key` in the stat lookup,
/// else the placeholder stats.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipantDescriptor {
    pub role: Role,
    pub id: Option<String>,
    pub key: Option<String>,
    pub name: Option<String>,
    pub stats: Option<StatBlock>,
    pub distance_ft: Option<i32>,
    pub position: Option<Position>,
    pub surprised: bool,
}

impl ParticipantDescriptor {
    pub fn player() -> Self {
        Self {
            role: Role::Player,
            id: Some("player".to_string()),
            ..Self::default()
        }
    }

    /// A non-player participant looked up by `key`.
    pub fn npc(id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            role: Role::NonPlayer,
            id: Some(id.into()),
            key: Some(key.into()),
            ..Self::default()
        }
    }

    /// A non-player participant with inline stats.
    pub fn inline(id: impl Into<String>, stats: StatBlock) -> Self {
        Self {
            role: Role::NonPlayer,
            id: Some(id.into()),
            stats: Some(stats),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn at_distance(mut self, feet: i32) -> Self {
        self.distance_ft = Some(feet);
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn surprised(mut self) -> Self {
        self.surprised = true;
        self
    }
}

/// A participant that arrives when the round counter reaches `round`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnTrigger {
    pub round: u32,
    pub actor: ParticipantDescriptor,
    #[serde(default)]
    pub announcement: Option<String>,
    #[serde(default)]
    pub fired: bool,
}

impl SpawnTrigger {
    pub fn new(round: u32, actor: ParticipantDescriptor) -> Self {
        Self {
            round,
            actor,
            announcement: None,
            fired: false,
        }
    }

    pub fn with_announcement(mut self, text: impl Into<String>) -> Self {
        self.announcement = Some(text.into());
        self
    }
}

/// Everything needed to start an encounter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncounterDefinition {
    pub id: Option<Uuid>,
    pub title: String,
    pub return_location: Option<String>,
    pub participants: Vec<ParticipantDescriptor>,
    pub triggers: Vec<SpawnTrigger>,
    pub grid: Option<TileGrid>,
}

impl Default for EncounterDefinition {
    fn default() -> Self {
        Self {
            id: None,
            title: "Skirmish".to_string(),
            return_location: None,
            participants: Vec::new(),
            triggers: Vec::new(),
            grid: None,
        }
    }
}

impl EncounterDefinition {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_participant(mut self, participant: ParticipantDescriptor) -> Self {
        self.participants.push(participant);
        self
    }

    pub fn with_trigger(mut self, trigger: SpawnTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn with_return_location(mut self, location: impl Into<String>) -> Self {
        self.return_location = Some(location.into());
        self
    }

    pub fn with_grid(mut self, grid: TileGrid) -> Self {
        self.grid = Some(grid);
        self
    }

    /// The fallback encounter: the player against two goblins, with a third
    /// arriving in round 2.
    pub fn default_skirmish() -> Self {
        Self::new("Skirmish")
            .with_participants(default_participants())
            .with_trigger(
                SpawnTrigger::new(
                    2,
                    ParticipantDescriptor::npc("intern", "goblin_intern").at_distance(30),
                )
                .with_announcement("A Goblin Intern rushes in!"),
            )
    }

    fn with_participants(mut self, participants: Vec<ParticipantDescriptor>) -> Self {
        self.participants.extend(participants);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, EncounterError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a definition, falling back to the default skirmish.
    pub fn from_json_or_default(json: &str) -> Self {
        match Self::from_json(json) {
            Ok(def) => def,
            Err(e) => {
                warn!(error = %e, "falling back to default skirmish");
                Self::default_skirmish()
            }
        }
    }

    /// Fill in the default participants when none are given.
    pub fn normalized(mut self) -> Self {
        if self.participants.is_empty() {
            self.participants = default_participants();
        }
        self
    }
}

fn default_participants() -> Vec<ParticipantDescriptor> {
    vec![
        ParticipantDescriptor::player(),
        ParticipantDescriptor::npc("goblin_a", "goblin")
            .named("Goblin A")
            .at_distance(5),
        ParticipantDescriptor::npc("goblin_b", "goblin")
            .named("Goblin B")
            .at_distance(5),
    ]
}

/// Keyed stat-block table.
pub trait StatLookup {
    fn stat_block(&self, key: &str) -> Option<StatBlock>;
}

impl StatLookup for HashMap<String, StatBlock> {
    fn stat_block(&self, key: &str) -> Option<StatBlock> {
        self.get(key).cloned()
    }
}

lazy_static::lazy_static! {
    /// Built-in creatures.
    static ref BESTIARY: HashMap<String, StatBlock> = {
        let creatures = [
            ("goblin", StatBlock::new("Goblin", 13, 7)
                .with_attack(4, "1d6+2")
                .with_abilities(AbilityScores::new(8, 14, 10, 10, 8, 8))),
            ("goblin_intern", StatBlock::new("Goblin Intern", 12, 5)
                .with_attack(3, "1d4+1")
                .with_abilities(AbilityScores::new(8, 12, 10, 8, 8, 8))),
            ("wolf", StatBlock::new("Wolf", 13, 11)
                .with_attack(4, "2d4+2")
                .with_abilities(AbilityScores::new(12, 15, 12, 3, 12, 6))),
            ("skeleton", StatBlock::new("Skeleton", 13, 13)
                .with_attack(4, "1d6+2")
                .with_abilities(AbilityScores::new(10, 14, 15, 6, 8, 5))),
        ];
        creatures
            .into_iter()
            .map(|(key, stats)| (key.to_string(), stats))
            .collect()
    };
}

/// The built-in creatures: goblin, goblin_intern, wolf, skeleton.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bestiary;

impl StatLookup for Bestiary {
    fn stat_block(&self, key: &str) -> Option<StatBlock> {
        BESTIARY.get(&key.to_lowercase()).cloned()
    }
}

/// A running encounter. Only the engine changes its order, turn index,
/// round and outcome.
#[derive(Debug)]
pub struct Encounter {
    pub(crate) id: EncounterId,
    pub(crate) title: String,
    pub(crate) return_location: String,
    pub(crate) field: Battlefield,
    pub(crate) profile: SharedProfile,
    pub(crate) order: Vec<ActorId>,
    pub(crate) turn_index: usize,
    pub(crate) round: u32,
    pub(crate) triggers: Vec<SpawnTrigger>,
    pub(crate) initiative: HashMap<ActorId, InitiativeRoll>,
    pub(crate) surprised: HashSet<ActorId>,
    pub(crate) outcome: Outcome,
    pub(crate) announcements: Vec<String>,
    pub(crate) log: Vec<String>,
}

impl Encounter {
    pub(crate) fn new(
        id: EncounterId,
        title: String,
        return_location: String,
        field: Battlefield,
        profile: SharedProfile,
        triggers: Vec<SpawnTrigger>,
    ) -> Self {
        Self {
            id,
            title,
            return_location,
            field,
            profile,
            order: Vec::new(),
            turn_index: 0,
            round: 1,
            triggers,
            initiative: HashMap::new(),
            surprised: HashSet::new(),
            outcome: Outcome::Ongoing,
            announcements: Vec::new(),
            log: Vec::new(),
        }
    }

    pub fn id(&self) -> EncounterId {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn return_location(&self) -> &str {
        &self.return_location
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn turn_index(&self) -> usize {
        self.turn_index
    }

    /// Turn order, soft-removed actors included.
    pub fn order(&self) -> &[ActorId] {
        &self.order
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn is_over(&self) -> bool {
        self.outcome.is_over()
    }

    pub fn current_actor_id(&self) -> Option<&ActorId> {
        self.order.get(self.turn_index)
    }

    pub fn current_actor(&self) -> Option<&Actor> {
        self.current_actor_id().and_then(|id| self.field.actor(id))
    }

    pub fn actor(&self, id: &ActorId) -> Option<&Actor> {
        self.field.actor(id)
    }

    pub fn actor_mut(&mut self, id: &ActorId) -> Option<&mut Actor> {
        self.field.actor_mut(id)
    }

    pub fn actors(&self) -> impl Iterator<Item = &Actor> {
        self.field.actors.iter()
    }

    pub fn battlefield(&self) -> &Battlefield {
        &self.field
    }

    /// The live player profile this encounter is bound to.
    pub fn profile(&self) -> &SharedProfile {
        &self.profile
    }

    pub fn initiative(&self, id: &ActorId) -> Option<&InitiativeRoll> {
        self.initiative.get(id)
    }

    /// Recorded at initiative; it does not cost anyone a turn.
    pub fn surprised(&self) -> &HashSet<ActorId> {
        &self.surprised
    }

    /// Announcements for arrivals due next round.
    pub fn upcoming_announcements(&self) -> &[String] {
        &self.announcements
    }

    pub fn pending_triggers(&self) -> impl Iterator<Item = &SpawnTrigger> {
        self.triggers.iter().filter(|t| !t.fired)
    }

    /// Every narrative line the encounter has produced.
    pub fn log(&self) -> &[String] {
        &self.log
    }
}
