//! Run the default skirmish with a fixed seed, the player attacking the
//! first standing goblin and each goblin swinging back.
//!
//! RUST_LOG=combat_core=debug cargo run --example skirmish

use combat_core::{
    ActorId, AttackOptions, CombatConfig, CombatEngine, CombatError, EncounterDefinition,
    PlayerProfile, RngRoller,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), CombatError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut profile = PlayerProfile::new("Aria", 12, 16);
    profile.attack_bonus = 5;
    profile.damage = "1d8+3".to_string();
    let profile = profile.shared();

    let mut engine =
        CombatEngine::new(CombatConfig::default()).with_roller(RngRoller::seeded(7));
    let mut enc = engine.start(EncounterDefinition::default_skirmish(), profile.clone());
    let player = ActorId::new("player");

    while !enc.is_over() && enc.round() <= 20 {
        let Some(current) = enc.current_actor_id().cloned() else {
            break;
        };
        let target = if current == player {
            enc.actors()
                .find(|a| !a.is_player() && a.is_standing())
                .map(|a| a.id.clone())
        } else {
            Some(player.clone())
        };
        if let Some(target) = target {
            let res = engine.attack(&mut enc, &current, &target, AttackOptions::default())?;
            println!("{}", res.text());
        }
        if enc.is_over() {
            break;
        }
        let report = engine.end_turn(&mut enc)?;
        for line in &report.narrative {
            println!("{line}");
        }
    }

    println!(
        "{} after {} rounds. {} has {} HP.",
        enc.outcome(),
        enc.round(),
        profile.borrow().name,
        profile.borrow().hit_points.current
    );
    Ok(())
}
