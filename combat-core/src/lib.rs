//! Turn-based D&D 5e combat engine.
//!
//! This crate provides:
//! - Dice notation, advantage and d20 tests behind a pluggable `DieRoller`
//! - Initiative with deterministic tie-breaks and mid-combat arrivals
//! - Turn and round advance that skips actors who cannot act
//! - Attacks, area spells, zones, knockback and concentration
//! - Victory, defeat, revival and post-combat notifications
//!
//! # Quick Start
//!
//! ```ignore
//! use combat_core::{CombatConfig, CombatEngine, EncounterDefinition, PlayerProfile};
//!
//! let mut engine = CombatEngine::new(CombatConfig::default());
//! let profile = PlayerProfile::new("Aria", 12, 16).shared();
//! let mut encounter = engine.start(EncounterDefinition::default_skirmish(), profile);
//!
//! while !encounter.is_over() {
//!     let report = engine.end_turn(&mut encounter)?;
//!     for line in &report.narrative {
//!         println!("{line}");
//!     }
//! }
//! ```

pub mod abilities;
pub mod actor;
pub mod attack;
pub mod battlefield;
pub mod combat;
pub mod concentration;
pub mod conditions;
pub mod config;
pub mod dice;
pub mod economy;
pub mod encounter;
pub mod events;
pub mod initiative;
pub mod knockback;
pub mod spells;
pub mod statuses;
pub mod testing;

// Primary public API
pub use abilities::{Ability, AbilityScores, ModifierEffect, ModifierOp, ModifierTarget, RollKind};
pub use actor::{Actor, ActorId, HitPoints, PlayerProfile, SharedProfile, StatBlock};
pub use attack::AttackOptions;
pub use battlefield::{Battlefield, Position, TileGrid, ZoneId, ZoneKind};
pub use combat::{CombatEngine, CombatError, ReviveOptions, TurnReport};
pub use concentration::{Cleanup, ConcentrationRecord, EndReason};
pub use conditions::Condition;
pub use config::{CombatConfig, ReviveDefaults};
pub use dice::{Advantage, DiceExpression, DieRoller, RngRoller, RollResult};
pub use encounter::{
    Bestiary, Encounter, EncounterDefinition, EncounterId, Outcome, ParticipantDescriptor,
    SpawnTrigger, StatLookup,
};
pub use events::{CombatEvent, CombatObserver, Effect, Resolution};
pub use spells::{BuiltinSpells, SpellDefinition, SpellLookup};
pub use statuses::TimedStatus;
