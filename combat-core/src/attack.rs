//! Single-target attacks and damage application.

use crate::abilities::RollKind;
use crate::actor::ActorId;
use crate::battlefield::Battlefield;
use crate::concentration;
use crate::conditions::Condition;
use crate::dice::{self, Advantage, DieRoller};
use crate::events::{Effect, Resolution};
use crate::statuses;
use tracing::debug;

/// Caller-supplied attack modifiers.
#[derive(Debug, Clone, Default)]
pub struct AttackOptions {
    pub advantage: Advantage,
    /// Flat damage added on a hit.
    pub damage_bonus: i32,
    /// Overrides the attacker's own damage expression.
    pub damage: Option<String>,
}

impl AttackOptions {
    pub fn with_advantage(mut self, advantage: Advantage) -> Self {
        self.advantage = advantage;
        self
    }

    pub fn with_damage_bonus(mut self, bonus: i32) -> Self {
        self.damage_bonus = bonus;
        self
    }

    pub fn with_damage(mut self, damage: impl Into<String>) -> Self {
        self.damage = Some(damage.into());
        self
    }
}

/// Whether the attacker can see the defender well enough to attack.
pub fn can_see(field: &Battlefield, attacker: &ActorId, defender: &ActorId) -> bool {
    let (Some(a), Some(d)) = (field.actor(attacker), field.actor(defender)) else {
        return false;
    };
    if a.has_condition(Condition::Blinded) {
        return false;
    }
    if !a.senses.see_through_fog {
        let fogged = |pos| field.zones.is_obscured(pos);
        if a.position.is_some_and(fogged) || d.position.is_some_and(fogged) {
            return false;
        }
    }
    if d.has_condition(Condition::Invisible) && !a.senses.see_invisible {
        return false;
    }
    true
}

/// Another standing member of the attacker's side is next to the defender.
fn ally_adjacent(field: &Battlefield, attacker: &ActorId, defender: &ActorId) -> bool {
    let (Some(a), Some(d)) = (field.actor(attacker), field.actor(defender)) else {
        return false;
    };
    let Some(target_pos) = d.position else {
        return false;
    };
    field.actors.iter().any(|ally| {
        &ally.id != attacker
            && &ally.id != defender
            && ally.is_player() == a.is_player()
            && ally.is_standing()
            && ally.position.is_some_and(|p| p.distance(target_pos) <= 1)
    })
}

/// Resolve one attack roll and its damage.
///
/// Returns an empty resolution if either actor is unknown; callers check
/// existence first.
pub fn resolve_attack(
    field: &mut Battlefield,
    attacker: &ActorId,
    defender: &ActorId,
    options: &AttackOptions,
    roller: &mut dyn DieRoller,
) -> Resolution {
    let mut res = Resolution::new();
    let (Some(a), Some(d)) = (field.actor(attacker), field.actor(defender)) else {
        return res;
    };
    let attacker_name = a.name.clone();
    let defender_name = d.name.clone();
    let armor_class = d.armor_class;

    if !can_see(field, attacker, defender) {
        res.line(format!(
            "{attacker_name} cannot see {defender_name}. The attack fails."
        ));
        res.effect(Effect::AttackBlocked {
            attacker: attacker.clone(),
            target: defender.clone(),
        });
        return res;
    }

    let components = a.roll_components(RollKind::Attack, None);
    let advantage = components.advantage.combine(options.advantage);
    let mut d20 = dice::roll_d20(advantage, roller);

    if d20.is_natural_1() {
        if let Some(a) = field.actor_mut(attacker).filter(|a| a.luck_points > 0) {
            a.luck_points -= 1;
            a.write_through();
            let reroll = roller.roll_die(20);
            let kept = d20.kept.max(reroll);
            res.line(format!("{attacker_name} is Lucky and rerolls: 1 -> {reroll}."));
            res.effect(Effect::LuckyReroll {
                actor: attacker.clone(),
                from: d20.kept,
                to: kept,
            });
            d20.rolls.push(reroll);
            d20.kept = kept;
        }
    }

    let Some(a) = field.actor(attacker) else {
        return res;
    };
    let extra: i32 = components
        .extra_dice
        .iter()
        .map(|die| dice::evaluate(die, roller).total)
        .sum();
    let attack_roll = d20.kept as i32 + a.attack_bonus + components.bonus + extra;
    debug!(%attacker, %defender, d20 = d20.kept, attack_roll, armor_class, "attack roll");

    if attack_roll < armor_class {
        res.line(format!(
            "{attacker_name} attacks {defender_name}: {attack_roll} vs AC {armor_class}. Miss."
        ));
        res.effect(Effect::AttackMissed {
            attacker: attacker.clone(),
            target: defender.clone(),
            attack_roll,
            armor_class,
        });
        return res;
    }

    res.line(format!(
        "{attacker_name} attacks {defender_name}: {attack_roll} vs AC {armor_class}. Hit!"
    ));
    res.effect(Effect::AttackHit {
        attacker: attacker.clone(),
        target: defender.clone(),
        attack_roll,
        armor_class,
    });

    let notation = options.damage.clone().unwrap_or_else(|| a.damage.clone());
    let mut damage = dice::evaluate(&notation, roller).total + options.damage_bonus;

    let precision_ready = a.precision_dice > 0 && !a.precision_used_this_turn;
    let precision_dice = a.precision_dice;
    if precision_ready
        && (advantage == Advantage::Advantage || ally_adjacent(field, attacker, defender))
    {
        let extra = dice::evaluate(&format!("{precision_dice}d6"), roller).total;
        damage += extra;
        if let Some(a) = field.actor_mut(attacker) {
            a.precision_used_this_turn = true;
        }
        res.line(format!("Precision strike adds {extra} damage."));
    }

    res.extend(apply_damage(field, defender, damage.max(0), roller));
    res
}

/// Deal damage to an actor: clamp at zero, end statuses broken by damage,
/// then check concentration.
pub fn apply_damage(
    field: &mut Battlefield,
    target: &ActorId,
    amount: i32,
    roller: &mut dyn DieRoller,
) -> Resolution {
    let mut res = Resolution::new();
    let Some(actor) = field.actor_mut(target) else {
        return res;
    };

    let lost = actor.take_damage(amount);
    let dropped_to_zero = actor.hit_points.is_down();
    res.effect(Effect::HpChanged {
        target: target.clone(),
        amount: -lost,
        new_current: actor.hp(),
        dropped_to_zero,
    });
    if dropped_to_zero {
        res.line(format!("{} takes {amount} damage and falls!", actor.name));
    } else {
        res.line(format!(
            "{} takes {amount} damage ({}/{} HP).",
            actor.name, actor.hit_points.current, actor.hit_points.maximum
        ));
    }

    if amount <= 0 {
        return res;
    }
    let woken = statuses::end_on_damage(actor);
    res.effects.extend(woken.effects);
    res.narrative.extend(woken.narrative);

    let name = actor.name.clone();
    if let Some(check) = concentration::on_damage(field, target, amount, roller) {
        if let Some(ended) = check.ended {
            res.line(ended.narrative(&name));
            res.effect(ended.effect());
        } else {
            res.line(format!(
                "{name} keeps concentration ({} vs DC {}).",
                check.total, check.dc
            ));
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{Actor, StatBlock};
    use crate::battlefield::{Position, ZoneKind};
    use crate::concentration::{Cleanup, ConcentrationRecord, EndReason};
    use crate::statuses::TimedStatus;
    use crate::testing::ScriptedDice;

    fn field() -> Battlefield {
        let mut field = Battlefield::new();
        let mut hero = Actor::from_stat_block("hero", None, &StatBlock::new("Hero", 16, 12).with_attack(5, "1d8+3"));
        hero.position = Some(Position::new(0, 0));
        field.add_actor(hero);
        let mut goblin = Actor::from_stat_block("goblin", None, &StatBlock::new("Goblin", 13, 7).with_attack(4, "1d6+2"));
        goblin.position = Some(Position::new(1, 0));
        field.add_actor(goblin);
        field
    }

    fn id(s: &str) -> ActorId {
        ActorId::new(s)
    }

    #[test]
    fn test_hit_drops_target_to_zero() {
        let mut field = field();
        let mut dice = ScriptedDice::new([14, 4]);
        let res = resolve_attack(&mut field, &id("hero"), &id("goblin"), &AttackOptions::default(), &mut dice);

        assert!(matches!(res.effects[0], Effect::AttackHit { attack_roll: 19, armor_class: 13, .. }));
        assert_eq!(field.actor(&id("goblin")).unwrap().hp(), 0);
        assert!(res.narrative.iter().any(|l| l.contains("falls")));
    }

    #[test]
    fn test_miss_below_armor_class() {
        let mut field = field();
        let mut dice = ScriptedDice::new([7]);
        let res = resolve_attack(&mut field, &id("hero"), &id("goblin"), &AttackOptions::default(), &mut dice);
        assert!(matches!(res.effects[0], Effect::AttackMissed { attack_roll: 12, .. }));
        assert_eq!(field.actor(&id("goblin")).unwrap().hp(), 7);
    }

    #[test]
    fn test_blinded_attacker_auto_fails_without_rolling() {
        let mut field = field();
        field.actor_mut(&id("hero")).unwrap().add_condition(Condition::Blinded);
        let mut dice = ScriptedDice::new([20, 8]);
        let res = resolve_attack(&mut field, &id("hero"), &id("goblin"), &AttackOptions::default(), &mut dice);
        assert!(matches!(res.effects[0], Effect::AttackBlocked { .. }));
        assert_eq!(dice.remaining(), 2);
    }

    #[test]
    fn test_fog_blocks_unless_sense_bypasses() {
        let mut field = field();
        field.zones.add(ZoneKind::Obscuring, "Fog Cloud", Position::new(1, 0), 0, None);
        assert!(!can_see(&field, &id("hero"), &id("goblin")));
        field.actor_mut(&id("hero")).unwrap().senses.see_through_fog = true;
        assert!(can_see(&field, &id("hero"), &id("goblin")));
    }

    #[test]
    fn test_invisible_target() {
        let mut field = field();
        field.actor_mut(&id("goblin")).unwrap().add_condition(Condition::Invisible);
        assert!(!can_see(&field, &id("hero"), &id("goblin")));
        field.actor_mut(&id("hero")).unwrap().senses.see_invisible = true;
        assert!(can_see(&field, &id("hero"), &id("goblin")));
    }

    #[test]
    fn test_lucky_rerolls_natural_one() {
        let mut field = field();
        field.actor_mut(&id("hero")).unwrap().luck_points = 1;
        let mut dice = ScriptedDice::new([1, 15, 2]);
        let res = resolve_attack(&mut field, &id("hero"), &id("goblin"), &AttackOptions::default(), &mut dice);
        assert!(res.effects.contains(&Effect::LuckyReroll { actor: id("hero"), from: 1, to: 15 }));
        assert_eq!(field.actor(&id("hero")).unwrap().luck_points, 0);
        assert_eq!(field.actor(&id("goblin")).unwrap().hp(), 2);
    }

    #[test]
    fn test_precision_strike_once_per_turn() {
        let mut field = field();
        {
            let hero = field.actor_mut(&id("hero")).unwrap();
            hero.precision_dice = 1;
            hero.damage = "1".into();
        }
        field.actor_mut(&id("goblin")).unwrap().hit_points.maximum = 30;
        field.actor_mut(&id("goblin")).unwrap().set_hp(30);
        let opts = AttackOptions::default().with_advantage(Advantage::Advantage);

        // d20 pair, then the precision d6.
        let mut dice = ScriptedDice::new([15, 3, 4, 15, 3]);
        resolve_attack(&mut field, &id("hero"), &id("goblin"), &opts, &mut dice);
        assert_eq!(field.actor(&id("goblin")).unwrap().hp(), 25);

        resolve_attack(&mut field, &id("hero"), &id("goblin"), &opts, &mut dice);
        assert_eq!(field.actor(&id("goblin")).unwrap().hp(), 24);
        assert_eq!(dice.remaining(), 0);
    }

    #[test]
    fn test_damage_wakes_and_checks_concentration() {
        let mut field = field();
        let goblin = id("goblin");
        {
            let g = field.actor_mut(&goblin).unwrap();
            g.hit_points.maximum = 30;
            g.set_hp(30);
        }
        statuses::apply(
            field.actor_mut(&goblin).unwrap(),
            TimedStatus::new("sleep", 2)
                .with_condition(Condition::Unconscious)
                .ending_on_damage(),
        );
        concentration::begin(&mut field, &goblin, ConcentrationRecord::new("hex", "Hex", Cleanup::Nothing));

        let mut dice = ScriptedDice::new([2]);
        let res = apply_damage(&mut field, &goblin, 3, &mut dice);

        let g = field.actor(&goblin).unwrap();
        assert_eq!(g.hp(), 27);
        assert!(!g.has_condition(Condition::Unconscious));
        assert!(g.concentration.is_none());
        assert!(res.effects.iter().any(|e| matches!(
            e,
            Effect::ConcentrationEnded { reason: EndReason::FailedSave, .. }
        )));
    }

    #[test]
    fn test_zero_damage_skips_concentration_check() {
        let mut field = field();
        let goblin = id("goblin");
        concentration::begin(&mut field, &goblin, ConcentrationRecord::new("hex", "Hex", Cleanup::Nothing));

        let mut dice = ScriptedDice::new([1]);
        let res = apply_damage(&mut field, &goblin, 0, &mut dice);

        assert_eq!(dice.remaining(), 1, "no save should be rolled");
        assert!(field.actor(&goblin).unwrap().concentration.is_some());
        assert!(!res.narrative.iter().any(|l| l.contains("concentration")));
    }
}
