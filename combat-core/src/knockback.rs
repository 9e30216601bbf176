//! Forced movement along a straight line away from a source point.

use crate::actor::ActorId;
use crate::battlefield::{feet_to_tiles, Battlefield, Position};
use tracing::debug;

/// Result of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    pub requested_tiles: i32,
    pub moved_tiles: i32,
    pub to: Option<Position>,
}

/// Push an actor `feet` away from `from`, one tile at a time.
///
/// The direction is the sign of the offset on each axis. The push stops
/// before a tile that is not walkable or holds another standing actor, so
/// the actor always ends on a walkable, unoccupied tile.
pub fn apply_push(
    field: &mut Battlefield,
    target: &ActorId,
    from: Position,
    feet: i32,
    feet_per_tile: i32,
) -> PushOutcome {
    let requested_tiles = feet_to_tiles(feet, feet_per_tile);
    let start = field.actor(target).and_then(|a| a.position);
    let Some(start) = start else {
        return PushOutcome {
            requested_tiles,
            moved_tiles: 0,
            to: None,
        };
    };

    let dx = (start.x - from.x).signum();
    let dy = (start.y - from.y).signum();
    let mut pos = start;
    let mut moved_tiles = 0;

    if dx != 0 || dy != 0 {
        while moved_tiles < requested_tiles {
            let next = pos.offset(dx, dy);
            if !field.is_walkable(next) || field.is_occupied(next, target) {
                break;
            }
            pos = next;
            moved_tiles += 1;
        }
    }

    if let Some(actor) = field.actor_mut(target) {
        actor.position = Some(pos);
    }
    debug!(%target, requested_tiles, moved_tiles, to = %pos, "push resolved");

    PushOutcome {
        requested_tiles,
        moved_tiles,
        to: Some(pos),
    }
}
