//! Combat participants.
//!
//! Every participant shares one base [`Actor`] record. Role-specific data
//! lives in [`ActorKind`]: player actors are bound to a live, externally
//! owned [`PlayerProfile`], non-player actors carry the key of the stat
//! block they were built from.

use crate::abilities::{self, Ability, AbilityScores, ModifierEffect, RollComponents, RollKind};
use crate::battlefield::Position;
use crate::concentration::ConcentrationRecord;
use crate::conditions::Condition;
use crate::dice::{self, Advantage, D20Roll, DieRoller};
use crate::economy::TurnEconomy;
use crate::statuses::TimedStatus;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// Default relative distance from the reference actor, in feet.
pub const DEFAULT_DISTANCE_FT: i32 = 5;

/// Unique identifier for an actor within an encounter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ActorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current and maximum hit points. Current never drops below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitPoints {
    pub current: i32,
    pub maximum: i32,
}

impl HitPoints {
    pub fn new(maximum: i32) -> Self {
        Self {
            current: maximum,
            maximum,
        }
    }

    /// Apply damage and return how much was actually lost.
    pub fn take_damage(&mut self, amount: i32) -> i32 {
        let old = self.current;
        self.current = (self.current - amount.max(0)).max(0);
        old - self.current
    }

    pub fn heal(&mut self, amount: i32) -> i32 {
        let old = self.current;
        self.current = (self.current + amount.max(0)).min(self.maximum);
        self.current - old
    }

    pub fn set(&mut self, value: i32) {
        self.current = value.clamp(0, self.maximum);
    }

    pub fn is_down(&self) -> bool {
        self.current <= 0
    }
}

/// Special senses that bypass the visibility gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Senses {
    pub see_through_fog: bool,
    pub see_invisible: bool,
}

/// A creature's combat numbers, as read from a stat lookup or inline data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatBlock {
    pub name: String,
    pub armor_class: i32,
    pub hit_points: i32,
    pub attack_bonus: i32,
    pub damage: String,
    pub abilities: AbilityScores,
    pub proficiency_bonus: i32,
    pub senses: Senses,
    pub luck_points: u32,
    /// Extra d6s for a once-per-turn precision strike. Zero disables it.
    pub precision_dice: u32,
}

impl StatBlock {
    /// The conservative stat block used when a key cannot be resolved.
    pub fn placeholder() -> Self {
        Self {
            name: "Enemy".to_string(),
            armor_class: 12,
            hit_points: 7,
            attack_bonus: 3,
            damage: "1d6+2".to_string(),
            abilities: AbilityScores::new(10, 12, 10, 10, 10, 10),
            proficiency_bonus: 2,
            senses: Senses::default(),
            luck_points: 0,
            precision_dice: 0,
        }
    }

    pub fn new(name: impl Into<String>, armor_class: i32, hit_points: i32) -> Self {
        Self {
            name: name.into(),
            armor_class,
            hit_points,
            ..Self::placeholder()
        }
    }

    pub fn with_attack(mut self, attack_bonus: i32, damage: impl Into<String>) -> Self {
        self.attack_bonus = attack_bonus;
        self.damage = damage.into();
        self
    }

    pub fn with_abilities(mut self, abilities: AbilityScores) -> Self {
        self.abilities = abilities;
        self
    }
}

impl Default for StatBlock {
    fn default() -> Self {
        Self::placeholder()
    }
}

/// The live player record. The engine mutates it in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub name: String,
    pub abilities: AbilityScores,
    pub hit_points: HitPoints,
    pub armor_class: i32,
    pub attack_bonus: i32,
    pub damage: String,
    pub proficiency_bonus: i32,
    pub conditions: HashSet<Condition>,
    pub effects: Vec<ModifierEffect>,
    pub luck_points: u32,
    pub precision_dice: u32,
    pub spellcasting_ability: Ability,
    pub senses: Senses,
}

impl PlayerProfile {
    pub fn new(name: impl Into<String>, max_hp: i32, armor_class: i32) -> Self {
        Self {
            name: name.into(),
            abilities: AbilityScores::default(),
            hit_points: HitPoints::new(max_hp),
            armor_class,
            attack_bonus: 0,
            damage: "1d4".to_string(),
            proficiency_bonus: 2,
            conditions: HashSet::new(),
            effects: Vec::new(),
            luck_points: 0,
            precision_dice: 0,
            spellcasting_ability: Ability::Charisma,
            senses: Senses::default(),
        }
    }

    pub fn shared(self) -> SharedProfile {
        Rc::new(RefCell::new(self))
    }
}

/// A rolled d20 test and its final total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct D20Test {
    pub d20: D20Roll,
    pub total: i32,
}

/// Handle to a profile owned outside the engine.
pub type SharedProfile = Rc<RefCell<PlayerProfile>>;

/// Data only player actors carry.
#[derive(Debug, Clone)]
pub struct PlayerExt {
    pub profile: SharedProfile,
}

/// Data only non-player actors carry.
#[derive(Debug, Clone, Default)]
pub struct NonPlayerExt {
    /// Stat lookup key the actor was built from, if any.
    pub key: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ActorKind {
    Player(PlayerExt),
    NonPlayer(NonPlayerExt),
}

/// A combat participant.
#[derive(Debug)]
pub struct Actor {
    pub id: ActorId,
    pub name: String,
    pub kind: ActorKind,
    pub abilities: AbilityScores,
    pub effects: Vec<ModifierEffect>,
    pub hit_points: HitPoints,
    pub armor_class: i32,
    pub attack_bonus: i32,
    pub damage: String,
    pub proficiency_bonus: i32,
    pub spellcasting_ability: Ability,
    pub conditions: HashSet<Condition>,
    pub statuses: Vec<TimedStatus>,
    pub economy: TurnEconomy,
    pub concentration: Option<ConcentrationRecord>,
    pub removed: bool,
    pub removed_reason: Option<String>,
    pub skip_turn: bool,
    pub surprised: bool,
    pub senses: Senses,
    pub luck_points: u32,
    pub precision_dice: u32,
    pub precision_used_this_turn: bool,
    pub distance_ft: i32,
    pub position: Option<Position>,
}

impl Actor {
    /// Build a non-player actor from a stat block.
    pub fn from_stat_block(id: impl Into<ActorId>, key: Option<String>, stats: &StatBlock) -> Self {
        Self {
            id: id.into(),
            name: stats.name.clone(),
            kind: ActorKind::NonPlayer(NonPlayerExt { key }),
            abilities: stats.abilities.clone(),
            effects: Vec::new(),
            hit_points: HitPoints::new(stats.hit_points),
            armor_class: stats.armor_class,
            attack_bonus: stats.attack_bonus,
            damage: stats.damage.clone(),
            proficiency_bonus: stats.proficiency_bonus,
            spellcasting_ability: Ability::Charisma,
            conditions: HashSet::new(),
            statuses: Vec::new(),
            economy: TurnEconomy::new(),
            concentration: None,
            removed: false,
            removed_reason: None,
            skip_turn: false,
            surprised: false,
            senses: stats.senses,
            luck_points: stats.luck_points,
            precision_dice: stats.precision_dice,
            precision_used_this_turn: false,
            distance_ft: DEFAULT_DISTANCE_FT,
            position: None,
        }
    }

    /// Bind a player actor to a live profile.
    pub fn from_profile(id: impl Into<ActorId>, profile: SharedProfile) -> Self {
        let mut actor = {
            let p = profile.borrow();
            let stats = StatBlock {
                name: p.name.clone(),
                armor_class: p.armor_class,
                hit_points: p.hit_points.maximum,
                attack_bonus: p.attack_bonus,
                damage: p.damage.clone(),
                abilities: p.abilities.clone(),
                proficiency_bonus: p.proficiency_bonus,
                senses: p.senses,
                luck_points: p.luck_points,
                precision_dice: p.precision_dice,
            };
            Self::from_stat_block(id, None, &stats)
        };
        actor.kind = ActorKind::Player(PlayerExt { profile });
        actor.refresh_from_profile();
        actor
    }

    pub fn is_player(&self) -> bool {
        matches!(self.kind, ActorKind::Player(_))
    }

    pub fn profile(&self) -> Option<&SharedProfile> {
        match &self.kind {
            ActorKind::Player(ext) => Some(&ext.profile),
            ActorKind::NonPlayer(_) => None,
        }
    }

    pub fn hp(&self) -> i32 {
        self.hit_points.current
    }

    /// Not soft-removed and above zero hit points.
    pub fn is_standing(&self) -> bool {
        !self.removed && !self.hit_points.is_down()
    }

    /// Whether the actor may take a turn.
    pub fn can_act(&self, blocking: &[Condition]) -> bool {
        self.is_standing()
            && !self.skip_turn
            && !blocking.iter().any(|c| self.conditions.contains(c))
    }

    pub fn has_condition(&self, condition: Condition) -> bool {
        self.conditions.contains(&condition)
    }

    pub fn add_condition(&mut self, condition: Condition) {
        self.conditions.insert(condition);
        self.write_through();
    }

    pub fn remove_condition(&mut self, condition: Condition) -> bool {
        let removed = self.conditions.remove(&condition);
        self.write_through();
        removed
    }

    /// Apply damage, clamping at zero. Returns the hit points actually lost.
    pub fn take_damage(&mut self, amount: i32) -> i32 {
        let lost = self.hit_points.take_damage(amount);
        self.write_through();
        lost
    }

    pub fn set_hp(&mut self, value: i32) {
        self.hit_points.set(value);
        self.write_through();
    }

    /// Distance from the reference actor in feet, never negative.
    pub fn distance_from_reference(&self) -> i32 {
        self.distance_ft.max(0)
    }

    pub fn is_melee_range(&self) -> bool {
        self.distance_from_reference() <= 5
    }

    pub fn ability_modifier(&self, ability: Ability) -> i32 {
        abilities::ability_modifier(&self.abilities, &self.effects, ability)
    }

    pub fn roll_components(&self, kind: RollKind, ability: Option<Ability>) -> RollComponents {
        abilities::roll_components(&self.abilities, &self.effects, kind, ability)
    }

    /// Roll a d20 check, save or initiative with everything the actor's
    /// effects contribute.
    pub fn roll_d20(
        &self,
        kind: RollKind,
        ability: Option<Ability>,
        advantage: Advantage,
        roller: &mut dyn DieRoller,
    ) -> D20Test {
        let components = self.roll_components(kind, ability);
        let d20 = dice::roll_d20(components.advantage.combine(advantage), roller);
        let extra: i32 = components
            .extra_dice
            .iter()
            .map(|die| dice::evaluate(die, roller).total)
            .sum();
        let total = d20.kept as i32 + components.flat_total() + extra;
        D20Test { d20, total }
    }

    /// Save DC for this actor's spells: 8 + proficiency + casting modifier.
    pub fn spell_save_dc(&self) -> i32 {
        8 + self.proficiency_bonus + self.ability_modifier(self.spellcasting_ability)
    }

    /// Fresh turn: economy reset and the precision strike is available again.
    pub fn begin_turn(&mut self) {
        self.economy.reset();
        self.precision_used_this_turn = false;
    }

    /// Pull in changes made to the live profile outside combat.
    pub fn refresh_from_profile(&mut self) {
        let ActorKind::Player(ext) = &self.kind else {
            return;
        };
        let profile = Rc::clone(&ext.profile);
        let p = profile.borrow();
        self.name = p.name.clone();
        self.abilities = p.abilities.clone();
        self.effects = p.effects.clone();
        self.hit_points = p.hit_points;
        self.armor_class = p.armor_class;
        self.attack_bonus = p.attack_bonus;
        self.damage = p.damage.clone();
        self.proficiency_bonus = p.proficiency_bonus;
        self.conditions = p.conditions.clone();
        self.luck_points = p.luck_points;
        self.precision_dice = p.precision_dice;
        self.spellcasting_ability = p.spellcasting_ability;
        self.senses = p.senses;
    }

    /// Push hit points, conditions, effects and luck back into the profile.
    pub fn write_through(&self) {
        if let ActorKind::Player(ext) = &self.kind {
            let mut p = ext.profile.borrow_mut();
            p.hit_points = self.hit_points;
            p.conditions = self.conditions.clone();
            p.effects = self.effects.clone();
            p.luck_points = self.luck_points;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_points_clamp() {
        let mut hp = HitPoints::new(7);
        assert_eq!(hp.take_damage(10), 7);
        assert_eq!(hp.current, 0);
        assert!(hp.is_down());
        assert_eq!(hp.heal(20), 7);
        assert_eq!(hp.current, 7);
        hp.set(-3);
        assert_eq!(hp.current, 0);
    }

    #[test]
    fn test_placeholder_stats() {
        let stats = StatBlock::placeholder();
        assert_eq!(stats.armor_class, 12);
        assert_eq!(stats.hit_points, 7);
        assert_eq!(stats.attack_bonus, 3);
        assert_eq!(stats.damage, "1d6+2");
        assert_eq!(stats.abilities.dexterity, 12);
    }

    #[test]
    fn test_player_damage_writes_through() {
        let profile = PlayerProfile::new("Aria", 12, 16).shared();
        let mut actor = Actor::from_profile("player", profile.clone());
        assert!(actor.is_player());

        actor.take_damage(5);
        actor.add_condition(Condition::Prone);

        let p = profile.borrow();
        assert_eq!(p.hit_points.current, 7);
        assert!(p.conditions.contains(&Condition::Prone));
    }

    #[test]
    fn test_refresh_picks_up_external_changes() {
        let profile = PlayerProfile::new("Aria", 12, 16).shared();
        let mut actor = Actor::from_profile("player", profile.clone());
        profile.borrow_mut().hit_points.current = 3;
        profile.borrow_mut().armor_class = 18;
        actor.refresh_from_profile();
        assert_eq!(actor.hp(), 3);
        assert_eq!(actor.armor_class, 18);
    }

    #[test]
    fn test_eligibility() {
        let mut actor = Actor::from_stat_block("goblin", None, &StatBlock::new("Goblin", 13, 7));
        let blocking = crate::conditions::TURN_BLOCKING;
        assert!(actor.can_act(&blocking));

        actor.add_condition(Condition::Prone);
        assert!(actor.can_act(&blocking));

        actor.add_condition(Condition::Stunned);
        assert!(!actor.can_act(&blocking));
        actor.remove_condition(Condition::Stunned);

        actor.skip_turn = true;
        assert!(!actor.can_act(&blocking));
        actor.skip_turn = false;

        actor.removed = true;
        assert!(!actor.can_act(&blocking));
        actor.removed = false;

        actor.set_hp(0);
        assert!(!actor.can_act(&blocking));
    }

    #[test]
    fn test_range_helpers() {
        let mut actor = Actor::from_stat_block("wolf", None, &StatBlock::placeholder());
        assert_eq!(actor.distance_from_reference(), 5);
        assert!(actor.is_melee_range());
        actor.distance_ft = -10;
        assert_eq!(actor.distance_from_reference(), 0);
        actor.distance_ft = 30;
        assert!(!actor.is_melee_range());
    }

    #[test]
    fn test_spell_save_dc() {
        let mut actor = Actor::from_stat_block("mage", None, &StatBlock::placeholder());
        actor.abilities.charisma = 16;
        assert_eq!(actor.spell_save_dc(), 13);
        actor.spellcasting_ability = Ability::Intelligence;
        assert_eq!(actor.spell_save_dc(), 10);
    }
}
