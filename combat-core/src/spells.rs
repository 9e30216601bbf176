//! Declarative area spells and their resolution.
//!
//! A spell is data: an area, an optional saving throw, optional damage, an
//! optional secondary effect and whether it needs concentration. The
//! resolver interprets that data against a [`Battlefield`].

use crate::abilities::{Ability, RollKind};
use crate::actor::ActorId;
use crate::attack::apply_damage;
use crate::battlefield::{feet_to_tiles, Battlefield, Position, ZoneKind};
use crate::concentration::{self, Cleanup, ConcentrationRecord, EndReason};
use crate::conditions::Condition;
use crate::dice::{self, Advantage, DieRoller};
use crate::events::{Effect, Resolution};
use crate::knockback;
use crate::statuses::{self, TimedStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::debug;

/// Where a spell lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpellArea {
    /// A cube around the caster, `feet` out on each axis. The caster is spared.
    SelfCube { feet: i32 },
    /// A Chebyshev radius around a chosen point (the caster's tile by default).
    Radius { feet: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveOutcome {
    /// Half damage, rounded down, on a successful save.
    Half,
    /// Nothing happens on a successful save.
    Negates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellSave {
    pub ability: Ability,
    pub on_success: SaveOutcome,
}

/// What happens beyond damage. Creature effects only land on a failed save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpellEffect {
    Push { feet: i32 },
    Sleep { rounds: u32 },
    ObscuringZone,
    HazardZone { damage: String },
}

impl SpellEffect {
    fn creates_zone(&self) -> bool {
        matches!(self, SpellEffect::ObscuringZone | SpellEffect::HazardZone { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellDefinition {
    pub key: String,
    pub name: String,
    pub area: SpellArea,
    #[serde(default)]
    pub save: Option<SpellSave>,
    #[serde(default)]
    pub damage: Option<String>,
    #[serde(default)]
    pub effect: Option<SpellEffect>,
    #[serde(default)]
    pub concentration: bool,
    #[serde(default)]
    pub duration_rounds: Option<u32>,
    /// Creatures above this many hit points are ignored.
    #[serde(default)]
    pub max_target_hp: Option<i32>,
}

impl SpellDefinition {
    pub fn new(key: impl Into<String>, name: impl Into<String>, area: SpellArea) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            area,
            save: None,
            damage: None,
            effect: None,
            concentration: false,
            duration_rounds: None,
            max_target_hp: None,
        }
    }

    pub fn with_save(mut self, ability: Ability, on_success: SaveOutcome) -> Self {
        self.save = Some(SpellSave {
            ability,
            on_success,
        });
        self
    }

    pub fn with_damage(mut self, damage: impl Into<String>) -> Self {
        self.damage = Some(damage.into());
        self
    }

    pub fn with_effect(mut self, effect: SpellEffect) -> Self {
        self.effect = Some(effect);
        self
    }

    pub fn with_concentration(mut self, rounds: Option<u32>) -> Self {
        self.concentration = true;
        self.duration_rounds = rounds;
        self
    }

    pub fn with_max_target_hp(mut self, hp: i32) -> Self {
        self.max_target_hp = Some(hp);
        self
    }

    fn area_feet(&self) -> i32 {
        match self.area {
            SpellArea::SelfCube { feet } | SpellArea::Radius { feet } => feet,
        }
    }
}

/// Keyed spell table.
pub trait SpellLookup {
    fn spell(&self, key: &str) -> Option<SpellDefinition>;
}

impl SpellLookup for HashMap<String, SpellDefinition> {
    fn spell(&self, key: &str) -> Option<SpellDefinition> {
        self.get(key).cloned()
    }
}

fn build_catalog() -> HashMap<String, SpellDefinition> {
    let spells = [
        SpellDefinition::new("thunderwave", "Thunderwave", SpellArea::SelfCube { feet: 15 })
            .with_save(Ability::Constitution, SaveOutcome::Half)
            .with_damage("2d8")
            .with_effect(SpellEffect::Push { feet: 10 }),
        SpellDefinition::new("sleep", "Sleep", SpellArea::Radius { feet: 20 })
            .with_save(Ability::Constitution, SaveOutcome::Negates)
            .with_effect(SpellEffect::Sleep { rounds: 2 })
            .with_concentration(Some(10))
            .with_max_target_hp(20),
        SpellDefinition::new("fog_cloud", "Fog Cloud", SpellArea::Radius { feet: 20 })
            .with_effect(SpellEffect::ObscuringZone)
            .with_concentration(Some(10)),
        SpellDefinition::new("cloud_of_daggers", "Cloud of Daggers", SpellArea::Radius { feet: 5 })
            .with_effect(SpellEffect::HazardZone {
                damage: "4d4".to_string(),
            })
            .with_concentration(Some(10)),
    ];
    spells.into_iter().map(|s| (s.key.clone(), s)).collect()
}

static SPELL_CATALOG: LazyLock<HashMap<String, SpellDefinition>> = LazyLock::new(build_catalog);

/// The built-in spells: thunderwave, sleep, fog_cloud, cloud_of_daggers.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinSpells;

impl SpellLookup for BuiltinSpells {
    fn spell(&self, key: &str) -> Option<SpellDefinition> {
        SPELL_CATALOG.get(&key.to_lowercase()).cloned()
    }
}

/// Where a spell's area lands: the caster's tile for self-centred areas,
/// else `target` or the caster's tile. `None` when neither is known.
pub fn area_center(
    field: &Battlefield,
    caster: &ActorId,
    spell: &SpellDefinition,
    target: Option<Position>,
) -> Option<Position> {
    let caster_pos = field.actor(caster)?.position;
    match spell.area {
        SpellArea::SelfCube { .. } => caster_pos,
        SpellArea::Radius { .. } => target.or(caster_pos),
    }
}

/// Resolve an area spell cast by `caster`.
///
/// `target` picks the centre of a radius spell; without one the caster's
/// own tile is used.
pub fn cast_spell(
    field: &mut Battlefield,
    caster: &ActorId,
    spell: &SpellDefinition,
    target: Option<Position>,
    roller: &mut dyn DieRoller,
    feet_per_tile: i32,
) -> Resolution {
    let mut res = Resolution::new();
    let Some(c) = field.actor(caster) else {
        return res;
    };
    let caster_name = c.name.clone();
    let caster_pos = c.position;
    let dc = c.spell_save_dc();

    let Some(center) = area_center(field, caster, spell, target) else {
        res.line(format!(
            "{caster_name} casts {}, but there is nowhere for it to land.",
            spell.name
        ));
        return res;
    };
    res.line(format!("{caster_name} casts {}!", spell.name));

    // Recasting must not let the old cleanup undo the new effect.
    if spell.concentration {
        if let Some(ended) = concentration::end(field, caster, EndReason::Replaced) {
            res.line(ended.narrative(&caster_name));
            res.effect(ended.effect());
        }
    }

    let mut cleanup = Cleanup::Nothing;
    let radius_tiles = feet_to_tiles(spell.area_feet(), feet_per_tile);

    match &spell.effect {
        Some(SpellEffect::ObscuringZone) => {
            let zone = field.zones.add(
                ZoneKind::Obscuring,
                spell.name.clone(),
                center,
                radius_tiles,
                Some(caster.clone()),
            );
            res.line(format!("{} fills the area around {center}.", spell.name));
            res.effect(Effect::ZoneCreated {
                zone,
                kind: ZoneKind::Obscuring,
            });
            cleanup = Cleanup::DissolveZone(zone);
        }
        Some(SpellEffect::HazardZone { damage }) => {
            let kind = ZoneKind::Hazard {
                damage: damage.clone(),
            };
            let zone = field.zones.add(
                kind.clone(),
                spell.name.clone(),
                center,
                radius_tiles,
                Some(caster.clone()),
            );
            res.line(format!("{} fills the area around {center}.", spell.name));
            res.effect(Effect::ZoneCreated { zone, kind });
            cleanup = Cleanup::DissolveZone(zone);
        }
        Some(SpellEffect::Sleep { .. }) => {
            cleanup = Cleanup::WakeSleepers {
                key: spell.key.clone(),
            };
        }
        Some(SpellEffect::Push { .. }) | None => {}
    }

    if !spell.effect.as_ref().is_some_and(SpellEffect::creates_zone) {
        let targets = gather_targets(field, caster, spell, center, feet_per_tile);
        debug!(spell = %spell.key, %caster, dc, targets = targets.len(), "spell targets");
        if targets.is_empty() {
            res.line("No creature is caught in the area.");
        }

        let base_damage = match (&spell.damage, targets.is_empty()) {
            (Some(notation), false) => Some(dice::evaluate(notation, roller).total),
            _ => None,
        };

        for target in &targets {
            let outcome = resolve_target(field, caster, spell, target, dc, base_damage, caster_pos, roller, feet_per_tile);
            res.extend(outcome);
        }
    }

    if spell.concentration {
        let mut record = ConcentrationRecord::new(spell.key.clone(), spell.name.clone(), cleanup);
        if let Some(rounds) = spell.duration_rounds {
            record = record.with_duration(rounds);
        }
        concentration::begin(field, caster, record);
        res.effect(Effect::ConcentrationStarted {
            actor: caster.clone(),
            label: spell.name.clone(),
        });
    }

    res
}

fn gather_targets(
    field: &Battlefield,
    caster: &ActorId,
    spell: &SpellDefinition,
    center: Position,
    feet_per_tile: i32,
) -> Vec<ActorId> {
    let candidates = match spell.area {
        SpellArea::SelfCube { feet } => field.targets_in_self_cube(caster, feet, feet_per_tile),
        SpellArea::Radius { feet } => field.targets_in_radius(center, feet, feet_per_tile),
    };
    candidates
        .into_iter()
        .filter(|id| id != caster)
        .filter(|id| match spell.max_target_hp {
            Some(max) => field.actor(id).is_some_and(|a| a.hp() <= max),
            None => true,
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn resolve_target(
    field: &mut Battlefield,
    caster: &ActorId,
    spell: &SpellDefinition,
    target: &ActorId,
    dc: i32,
    base_damage: Option<i32>,
    caster_pos: Option<Position>,
    roller: &mut dyn DieRoller,
    feet_per_tile: i32,
) -> Resolution {
    let mut res = Resolution::new();
    let Some(t) = field.actor(target) else {
        return res;
    };
    let name = t.name.clone();

    let passed = match spell.save {
        Some(save) => {
            let total = t
                .roll_d20(RollKind::Save, Some(save.ability), Advantage::Normal, roller)
                .total;
            let passed = total >= dc;
            res.line(format!(
                "{name} makes a {} save: {total} vs DC {dc}. {}",
                save.ability,
                if passed { "Success." } else { "Failure." }
            ));
            res.effect(Effect::SavingThrow {
                target: target.clone(),
                ability: save.ability,
                total,
                dc,
                passed,
            });
            passed
        }
        None => false,
    };

    if let Some(full) = base_damage {
        let amount = match (passed, spell.save.map(|s| s.on_success)) {
            (false, _) => full,
            (true, Some(SaveOutcome::Half)) => full / 2,
            (true, _) => 0,
        };
        if amount > 0 {
            res.extend(apply_damage(field, target, amount, roller));
        }
    }

    if passed {
        return res;
    }

    match &spell.effect {
        Some(SpellEffect::Push { feet }) => {
            if let Some(from) = caster_pos {
                let push = knockback::apply_push(field, target, from, *feet, feet_per_tile);
                if let Some(to) = push.to.filter(|_| push.moved_tiles > 0) {
                    res.line(format!("{name} is pushed {} ft.", push.moved_tiles * feet_per_tile));
                    res.effect(Effect::Pushed {
                        target: target.clone(),
                        tiles_moved: push.moved_tiles,
                        to,
                    });
                }
            }
        }
        Some(SpellEffect::Sleep { rounds }) => {
            if let Some(t) = field.actor_mut(target).filter(|a| a.is_standing()) {
                let status = TimedStatus::new(spell.key.clone(), *rounds)
                    .with_condition(Condition::Unconscious)
                    .from_source(caster.clone())
                    .ending_on_damage();
                if let Some(effect) = statuses::apply(t, status) {
                    res.effect(effect);
                }
                res.line(format!("{name} falls asleep."));
            }
        }
        Some(SpellEffect::ObscuringZone) | Some(SpellEffect::HazardZone { .. }) | None => {}
    }
    res
}

/// Damage from hazard zones covering the actor's tile.
pub fn resolve_hazards(field: &mut Battlefield, actor: &ActorId, roller: &mut dyn DieRoller) -> Resolution {
    let mut res = Resolution::new();
    let Some((name, pos)) = field
        .actor(actor)
        .filter(|a| a.is_standing())
        .and_then(|a| a.position.map(|p| (a.name.clone(), p)))
    else {
        return res;
    };
    let hazards: Vec<(String, String)> = field
        .zones
        .hazards_at(pos)
        .into_iter()
        .filter_map(|z| match &z.kind {
            ZoneKind::Hazard { damage } => Some((z.label.clone(), damage.clone())),
            ZoneKind::Obscuring => None,
        })
        .collect();

    for (label, damage) in hazards {
        let amount = dice::evaluate(&damage, roller).total;
        res.line(format!("{label} cuts into {name}."));
        res.extend(apply_damage(field, actor, amount, roller));
    }
    res
}
