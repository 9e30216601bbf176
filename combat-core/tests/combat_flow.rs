//! End-to-end encounter tests driven through the engine with scripted dice.

use combat_core::battlefield::{Position, TileGrid};
use combat_core::concentration::EndReason;
use combat_core::testing::{
    assert_current_actor, assert_has_condition, assert_hp, assert_outcome, npc_stats,
    sample_profile, RecordingObserver, ScriptedDice,
};
use combat_core::{
    Ability, ActorId, AttackOptions, CombatConfig, CombatEngine, CombatError, CombatEvent,
    Condition, Effect, EncounterDefinition, Outcome, ParticipantDescriptor, PlayerProfile, ReviveOptions,
};
use std::sync::mpsc;

fn id(s: &str) -> ActorId {
    ActorId::new(s)
}

fn engine(faces: impl IntoIterator<Item = u32>) -> CombatEngine {
    CombatEngine::new(CombatConfig::default()).with_roller(ScriptedDice::new(faces))
}

/// Player against two 7 HP goblins, all with +0 initiative.
fn goblin_pair() -> EncounterDefinition {
    EncounterDefinition::new("Goblin Ambush")
        .with_participant(ParticipantDescriptor::player())
        .with_participant(ParticipantDescriptor::inline("goblin_a", npc_stats("Goblin A", 13, 7)))
        .with_participant(ParticipantDescriptor::inline("goblin_b", npc_stats("Goblin B", 13, 7)))
}

fn duel(goblin_hp: i32) -> EncounterDefinition {
    EncounterDefinition::new("Duel")
        .with_participant(ParticipantDescriptor::player())
        .with_participant(ParticipantDescriptor::inline("goblin", npc_stats("Goblin", 13, goblin_hp)))
}

#[test]
fn test_goblin_ambush_to_victory() {
    let recorder = RecordingObserver::new();
    // Initiative 15/11/9, then the player's attack (14) and damage (4 + 3).
    let mut engine = engine([15, 11, 9, 14, 4]);
    engine.add_observer(recorder.clone());
    let mut enc = engine.start(goblin_pair(), sample_profile("Aria"));

    let order: Vec<&str> = enc.order().iter().map(ActorId::as_str).collect();
    assert_eq!(order, vec!["player", "goblin_a", "goblin_b"]);
    assert_eq!(enc.round(), 1);
    assert_current_actor(&enc, "player");

    let res = engine
        .attack(&mut enc, &id("player"), &id("goblin_a"), AttackOptions::default())
        .unwrap();
    assert!(res.effects.iter().any(|e| matches!(e, Effect::AttackHit { attack_roll: 19, .. })));
    assert_hp(&enc, "goblin_a", 0);
    assert_outcome(&enc, Outcome::Ongoing);

    // Goblin A is down, so the turn goes straight to Goblin B.
    let report = engine.end_turn(&mut enc).unwrap();
    assert_eq!(report.began, Some(id("goblin_b")));
    assert_current_actor(&enc, "goblin_b");

    enc.actor_mut(&id("goblin_b")).unwrap().set_hp(0);
    let report = engine.end_turn(&mut enc).unwrap();
    assert_eq!(report.outcome, Outcome::Victory);
    assert_eq!(report.began, None);
    assert_outcome(&enc, Outcome::Victory);

    let events = recorder.events();
    assert!(events.contains(&CombatEvent::CombatEnded {
        outcome: Outcome::Victory
    }));
    assert!(events.iter().any(|e| matches!(
        e,
        CombatEvent::PostCombatOutcome { outcome: Outcome::Victory, return_location, .. }
            if return_location == "town"
    )));
}

#[test]
fn test_round_wraps_once_per_pass() {
    let recorder = RecordingObserver::new();
    let mut engine = engine([15, 5]);
    engine.add_observer(recorder.clone());
    let mut enc = engine.start(duel(7), sample_profile("Aria"));

    let mut rounds = vec![enc.round()];
    for _ in 0..4 {
        engine.end_turn(&mut enc).unwrap();
        rounds.push(enc.round());
    }
    assert_eq!(rounds, vec![1, 1, 2, 2, 3]);
    assert_current_actor(&enc, "player");

    let began: Vec<(String, u32)> = recorder
        .events()
        .into_iter()
        .filter_map(|e| match e {
            CombatEvent::TurnBegan { actor, round } => Some((actor.as_str().to_string(), round)),
            _ => None,
        })
        .collect();
    assert_eq!(
        began,
        vec![
            ("player".to_string(), 1),
            ("goblin".to_string(), 1),
            ("player".to_string(), 2),
            ("goblin".to_string(), 2),
            ("player".to_string(), 3),
        ]
    );
}

#[test]
fn test_end_turn_skips_incapacitated_actors() {
    let mut engine = engine([15, 11, 9]);
    let mut enc = engine.start(goblin_pair(), sample_profile("Aria"));
    enc.actor_mut(&id("goblin_a"))
        .unwrap()
        .add_condition(Condition::Unconscious);

    engine.end_turn(&mut enc).unwrap();
    assert_current_actor(&enc, "goblin_b");

    enc.actor_mut(&id("player")).unwrap().skip_turn = true;
    let report = engine.end_turn(&mut enc).unwrap();
    // Nobody else can act: goblin B keeps the turn and a new round opens.
    assert_eq!(report.began, Some(id("goblin_b")));
    assert_eq!(enc.round(), 2);
}

#[test]
fn test_nobody_eligible_leaves_the_pointer() {
    let mut engine = engine([15, 5]);
    let mut enc = engine.start(duel(7), sample_profile("Aria"));
    enc.actor_mut(&id("player")).unwrap().skip_turn = true;
    enc.actor_mut(&id("goblin")).unwrap().skip_turn = true;

    let report = engine.end_turn(&mut enc).unwrap();
    assert_eq!(report.began, None);
    assert_eq!(enc.turn_index(), 0);
    assert_eq!(enc.round(), 1);
    assert_outcome(&enc, Outcome::Ongoing);
}

#[test]
fn test_both_sides_down_is_victory() {
    let mut engine = engine([15, 5]);
    let mut enc = engine.start(duel(7), sample_profile("Aria"));
    enc.actor_mut(&id("player")).unwrap().set_hp(0);
    enc.actor_mut(&id("goblin")).unwrap().set_hp(0);
    assert_eq!(engine.check_end_conditions(&enc), Outcome::Victory);

    let report = engine.end_turn(&mut enc).unwrap();
    assert_eq!(report.outcome, Outcome::Victory);
}

#[test]
fn test_spawn_trigger_joins_in_round_two() {
    // Default skirmish goblins have +2 initiative, the intern +1.
    let recorder = RecordingObserver::new();
    let mut engine = engine([10, 5, 3, 20]);
    engine.add_observer(recorder.clone());
    let mut enc = engine.start_from_json("{ not valid json", sample_profile("Aria"));

    assert_eq!(enc.title(), "Skirmish");
    assert_eq!(enc.upcoming_announcements(), ["A Goblin Intern rushes in!".to_string()]);
    assert_eq!(enc.order().len(), 3);

    for _ in 0..3 {
        engine.end_turn(&mut enc).unwrap();
    }
    assert_eq!(enc.round(), 2);
    assert_eq!(enc.order().len(), 4);
    assert_eq!(enc.order()[0], id("intern"));
    // Seated at the top of the new round, the intern goes first.
    assert_current_actor(&enc, "intern");
    assert!(recorder.events().contains(&CombatEvent::TurnBegan {
        actor: id("intern"),
        round: 2
    }));
    assert_eq!(enc.actor(&id("intern")).unwrap().distance_ft, 30);
    assert_eq!(enc.pending_triggers().count(), 0);
    assert!(enc.upcoming_announcements().is_empty());
    assert!(enc.log().iter().any(|l| l == "Goblin Intern joins the fight!"));
}

#[test]
fn test_join_mid_combat_keeps_current_actor() {
    let mut engine = engine([15, 5, 20]);
    let mut enc = engine.start(duel(7), sample_profile("Aria"));

    let wolf = engine
        .join_mid_combat(&mut enc, &ParticipantDescriptor::npc("wolf", "wolf"))
        .unwrap();
    assert_eq!(wolf, id("wolf"));
    let order: Vec<&str> = enc.order().iter().map(ActorId::as_str).collect();
    assert_eq!(order, vec!["wolf", "player", "goblin"]);
    assert_current_actor(&enc, "player");
    assert_eq!(enc.initiative(&wolf).unwrap().total, 22);

    engine.end_turn(&mut enc).unwrap();
    assert_current_actor(&enc, "goblin");
    engine.end_turn(&mut enc).unwrap();
    assert_current_actor(&enc, "wolf");
    assert_eq!(enc.round(), 2);
}

#[test]
fn test_join_hands_on_a_turn_that_cannot_be_taken() {
    // The wolf rolls 1 + 2 and is seated last.
    let mut engine = engine([15, 5, 1]);
    let mut enc = engine.start(duel(7), sample_profile("Aria"));
    enc.actor_mut(&id("player")).unwrap().skip_turn = true;

    engine
        .join_mid_combat(&mut enc, &ParticipantDescriptor::npc("wolf", "wolf"))
        .unwrap();
    let order: Vec<&str> = enc.order().iter().map(ActorId::as_str).collect();
    assert_eq!(order, vec!["player", "goblin", "wolf"]);
    assert_current_actor(&enc, "goblin");
    assert_eq!(enc.round(), 1);
}

#[test]
fn test_remove_and_rejoin_reopens() {
    let mut engine = engine([15, 5]);
    let mut enc = engine.start(duel(7), sample_profile("Aria"));

    engine.remove_actor(&mut enc, &id("goblin"), "fled").unwrap();
    assert_outcome(&enc, Outcome::Victory);
    assert_eq!(enc.order().len(), 2);
    assert_eq!(
        enc.actor(&id("goblin")).unwrap().removed_reason.as_deref(),
        Some("fled")
    );

    engine.rejoin(&mut enc, &id("goblin")).unwrap();
    assert_outcome(&enc, Outcome::Ongoing);
    assert_current_actor(&enc, "player");
}

#[test]
fn test_revive_after_defeat_reopens() {
    let recorder = RecordingObserver::new();
    // Goblin hits with 18 + 3 and deals 3 + 1 + 50.
    let mut engine = engine([15, 5, 18, 3]);
    engine.add_observer(recorder.clone());
    let mut enc = engine.start(duel(7), sample_profile("Aria"));
    engine.end_turn(&mut enc).unwrap();

    engine
        .attack(
            &mut enc,
            &id("goblin"),
            &id("player"),
            AttackOptions::default().with_damage_bonus(50),
        )
        .unwrap();
    assert_outcome(&enc, Outcome::Defeat);
    assert_eq!(enc.profile().borrow().hit_points.current, 0);

    engine
        .revive(&mut enc, &id("player"), 5, ReviveOptions::default())
        .unwrap();
    assert_outcome(&enc, Outcome::Ongoing);
    assert_hp(&enc, "player", 5);
    assert_has_condition(&enc, "player", Condition::Prone);
    assert_current_actor(&enc, "goblin");

    let profile = enc.profile().borrow();
    assert_eq!(profile.hit_points.current, 5);
    assert!(profile.conditions.contains(&Condition::Prone));
    drop(profile);

    assert!(recorder.events().contains(&CombatEvent::Revived {
        actor: id("player"),
        round: 1
    }));
}

#[test]
fn test_reopen_past_the_last_seat_starts_a_new_round() {
    let recorder = RecordingObserver::new();
    let mut engine = engine([15, 11, 9]);
    engine.add_observer(recorder.clone());
    let mut enc = engine.start(goblin_pair(), sample_profile("Aria"));
    engine.end_turn(&mut enc).unwrap();
    engine.end_turn(&mut enc).unwrap();
    assert_current_actor(&enc, "goblin_b");

    enc.actor_mut(&id("goblin_a")).unwrap().set_hp(0);
    engine.remove_actor(&mut enc, &id("goblin_b"), "fled").unwrap();
    assert_outcome(&enc, Outcome::Victory);

    engine
        .revive(&mut enc, &id("goblin_a"), 3, ReviveOptions::default())
        .unwrap();
    assert_outcome(&enc, Outcome::Ongoing);
    assert_eq!(enc.round(), 2);
    assert_current_actor(&enc, "player");
    assert!(recorder.events().contains(&CombatEvent::TurnBegan {
        actor: id("player"),
        round: 2
    }));
}

#[test]
fn test_downed_actor_cannot_attack_out_of_turn() {
    let mut engine = engine([15, 5, 18, 3]);
    let mut enc = engine.start(duel(7), sample_profile("Aria"));
    enc.actor_mut(&id("goblin"))
        .unwrap()
        .add_condition(Condition::Unconscious);

    let err = engine.attack(&mut enc, &id("goblin"), &id("player"), AttackOptions::default());
    assert!(matches!(err, Err(CombatError::NotYourTurn(_))));
    assert_hp(&enc, "player", 12);
    assert_outcome(&enc, Outcome::Ongoing);
}

#[test]
fn test_revive_without_prone_clears_blocking_conditions() {
    let mut engine = engine([15, 5]);
    let mut enc = engine.start(duel(7), sample_profile("Aria"));
    {
        let goblin = enc.actor_mut(&id("goblin")).unwrap();
        goblin.add_condition(Condition::Stunned);
        goblin.set_hp(0);
    }
    engine
        .revive(&mut enc, &id("goblin"), 0, ReviveOptions::default().prone(false))
        .unwrap();
    let goblin = enc.actor(&id("goblin")).unwrap();
    assert_eq!(goblin.hp(), 1);
    assert!(!goblin.has_condition(Condition::Stunned));
    assert!(!goblin.has_condition(Condition::Prone));
}

#[test]
fn test_failed_concentration_save_clears_fog() {
    let mut profile = PlayerProfile::new("Mira", 30, 12);
    profile.abilities.set(Ability::Constitution, 14);
    let profile = profile.shared();

    // Initiative, the goblin's attack (18) and damage (3 + 1 + 10), then a
    // concentration save of 7 + 2 against DC 10.
    let mut engine = engine([15, 5, 18, 3, 7]);
    let def = EncounterDefinition::new("Misty Glade")
        .with_participant(ParticipantDescriptor::player().at(Position::new(0, 0)))
        .with_participant(
            ParticipantDescriptor::inline("goblin", npc_stats("Goblin", 13, 7)).at(Position::new(1, 0)),
        );
    let mut enc = engine.start(def, profile);

    engine
        .cast_spell(&mut enc, &id("player"), "fog_cloud", Some(Position::new(20, 20)))
        .unwrap();
    assert!(!enc.battlefield().zones.is_empty());
    assert!(enc.actor(&id("player")).unwrap().concentration.is_some());
    engine.end_turn(&mut enc).unwrap();

    let res = engine
        .attack(
            &mut enc,
            &id("goblin"),
            &id("player"),
            AttackOptions::default().with_damage_bonus(10),
        )
        .unwrap();
    assert_hp(&enc, "player", 16);
    assert!(res.effects.iter().any(|e| matches!(
        e,
        Effect::ConcentrationEnded { reason: EndReason::FailedSave, .. }
    )));
    assert!(enc.battlefield().zones.is_empty());
    assert!(enc.actor(&id("player")).unwrap().concentration.is_none());
}

#[test]
fn test_thunderwave_push_stops_at_wall() {
    // Initiative, 2d8 damage (3 + 3), then the goblin's failed save.
    let mut engine = engine([15, 5, 3, 3, 2]);
    let def = EncounterDefinition::new("Corridor")
        .with_grid(TileGrid::new(10, 3).with_wall(Position::new(3, 0)))
        .with_participant(ParticipantDescriptor::player().at(Position::new(0, 0)))
        .with_participant(
            ParticipantDescriptor::inline("goblin", npc_stats("Goblin", 13, 30)).at(Position::new(1, 0)),
        );
    let mut enc = engine.start(def, sample_profile("Aria"));

    let res = engine
        .cast_spell(&mut enc, &id("player"), "thunderwave", None)
        .unwrap();
    assert_hp(&enc, "goblin", 24);
    assert!(res.effects.contains(&Effect::Pushed {
        target: id("goblin"),
        tiles_moved: 1,
        to: Position::new(2, 0),
    }));
    assert_eq!(enc.actor(&id("goblin")).unwrap().position, Some(Position::new(2, 0)));
}

#[test]
fn test_sleepers_skip_turns_then_wake() {
    let mut engine = engine([15, 11, 9, 3, 3]);
    let def = EncounterDefinition::new("Lullaby")
        .with_participant(ParticipantDescriptor::player().at(Position::new(0, 0)))
        .with_participant(
            ParticipantDescriptor::inline("goblin_a", npc_stats("Goblin A", 13, 7)).at(Position::new(5, 0)),
        )
        .with_participant(
            ParticipantDescriptor::inline("goblin_b", npc_stats("Goblin B", 13, 7)).at(Position::new(5, 1)),
        );
    let mut enc = engine.start(def, sample_profile("Aria"));

    engine
        .cast_spell(&mut enc, &id("player"), "sleep", Some(Position::new(5, 0)))
        .unwrap();
    assert_has_condition(&enc, "goblin_a", Condition::Unconscious);
    assert_has_condition(&enc, "goblin_b", Condition::Unconscious);
    assert_outcome(&enc, Outcome::Ongoing);

    let report = engine.end_turn(&mut enc).unwrap();
    assert_eq!(report.began, Some(id("player")));
    assert_eq!(enc.round(), 2);

    let report = engine.end_turn(&mut enc).unwrap();
    assert!(report.narrative.iter().any(|l| l == "Goblin A stirs awake."));
    assert_eq!(report.began, Some(id("goblin_a")));
}

#[test]
fn test_action_budget_resets_each_turn() {
    let mut engine = engine([15, 5, 2, 2]);
    let mut enc = engine.start(duel(30), sample_profile("Aria"));
    engine
        .attack(&mut enc, &id("player"), &id("goblin"), AttackOptions::default())
        .unwrap();
    assert!(!enc.actor(&id("player")).unwrap().economy.can_use_action());

    engine.end_turn(&mut enc).unwrap();
    engine.end_turn(&mut enc).unwrap();
    assert_current_actor(&enc, "player");
    assert!(enc.actor(&id("player")).unwrap().economy.can_use_action());
}

#[test]
fn test_json_definition_and_unknown_key() {
    let json = r#"{
        "title": "Crypt",
        "return_location": "chapel",
        "participants": [
            { "role": "player" },
            { "id": "bones", "key": "skeleton" },
            { "id": "mystery", "key": "gelatinous_thing", "name": "Ooze" }
        ]
    }"#;
    let recorder = RecordingObserver::new();
    let mut engine = engine([15, 5, 4]);
    engine.add_observer(recorder.clone());
    let mut enc = engine.start_from_json(json, sample_profile("Aria"));

    assert_eq!(enc.title(), "Crypt");
    assert_eq!(enc.return_location(), "chapel");
    assert_hp(&enc, "bones", 13);
    let ooze = enc.actor(&id("mystery")).unwrap();
    assert_eq!(ooze.name, "Ooze");
    assert_eq!((ooze.armor_class, ooze.hp()), (12, 7));

    engine.remove_actor(&mut enc, &id("bones"), "crumbled").unwrap();
    engine.remove_actor(&mut enc, &id("mystery"), "oozed away").unwrap();
    assert!(recorder.events().iter().any(|e| matches!(
        e,
        CombatEvent::PostCombatOutcome { return_location, .. } if return_location == "chapel"
    )));
}

#[test]
fn test_disconnected_observer_does_not_block() {
    let (tx, rx) = mpsc::channel();
    let mut engine = engine([15, 5]);
    engine.add_observer(tx);
    let mut enc = engine.start(duel(7), sample_profile("Aria"));
    assert!(matches!(rx.try_recv(), Ok(CombatEvent::TurnBegan { .. })));

    drop(rx);
    let report = engine.end_turn(&mut enc).unwrap();
    assert_eq!(report.began, Some(id("goblin")));
}
