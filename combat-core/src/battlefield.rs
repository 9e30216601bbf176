//! Actors on a tile grid, persistent zones, and area queries.

use crate::actor::{Actor, ActorId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A tile coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance: max(|dx|, |dy|).
    pub fn distance(&self, other: Position) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Position {
        Position::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Convert feet to whole tiles, rounding down.
pub fn feet_to_tiles(feet: i32, feet_per_tile: i32) -> i32 {
    if feet_per_tile <= 0 {
        return 0;
    }
    feet.max(0) / feet_per_tile
}

/// Walkability map. Tiles outside the bounds are not walkable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileGrid {
    pub width: i32,
    pub height: i32,
    #[serde(default)]
    pub blocked: HashSet<Position>,
}

impl TileGrid {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            blocked: HashSet::new(),
        }
    }

    pub fn with_wall(mut self, pos: Position) -> Self {
        self.blocked.insert(pos);
        self
    }

    pub fn is_walkable(&self, pos: Position) -> bool {
        pos.x >= 0
            && pos.y >= 0
            && pos.x < self.width
            && pos.y < self.height
            && !self.blocked.contains(&pos)
    }
}

/// Identifier of a registered zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZoneId(pub u64);

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zone#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneKind {
    /// Blocks sight for anyone inside without a bypassing sense.
    Obscuring,
    /// Deals damage to an actor that ends its turn inside.
    Hazard { damage: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub kind: ZoneKind,
    pub label: String,
    pub center: Position,
    pub radius_tiles: i32,
    pub source: Option<ActorId>,
}

impl Zone {
    pub fn contains(&self, pos: Position) -> bool {
        self.center.distance(pos) <= self.radius_tiles
    }
}

#[derive(Debug, Clone, Default)]
pub struct ZoneRegistry {
    next_id: u64,
    zones: Vec<Zone>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        kind: ZoneKind,
        label: impl Into<String>,
        center: Position,
        radius_tiles: i32,
        source: Option<ActorId>,
    ) -> ZoneId {
        self.next_id += 1;
        let id = ZoneId(self.next_id);
        self.zones.push(Zone {
            id,
            kind,
            label: label.into(),
            center,
            radius_tiles,
            source,
        });
        id
    }

    pub fn remove(&mut self, id: ZoneId) -> Option<Zone> {
        let index = self.zones.iter().position(|z| z.id == id)?;
        Some(self.zones.remove(index))
    }

    pub fn get(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn is_obscured(&self, pos: Position) -> bool {
        self.zones
            .iter()
            .any(|z| z.kind == ZoneKind::Obscuring && z.contains(pos))
    }

    /// Hazards covering a position.
    pub fn hazards_at(&self, pos: Position) -> Vec<&Zone> {
        self.zones
            .iter()
            .filter(|z| matches!(z.kind, ZoneKind::Hazard { .. }) && z.contains(pos))
            .collect()
    }
}

/// Everything the resolvers act on: actors, zones and the optional grid.
#[derive(Debug, Default)]
pub struct Battlefield {
    pub actors: Vec<Actor>,
    pub zones: ZoneRegistry,
    /// Without a grid every tile is walkable.
    pub grid: Option<TileGrid>,
}

impl Battlefield {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grid(mut self, grid: TileGrid) -> Self {
        self.grid = Some(grid);
        self
    }

    pub fn add_actor(&mut self, actor: Actor) {
        self.actors.push(actor);
    }

    pub fn actor(&self, id: &ActorId) -> Option<&Actor> {
        self.actors.iter().find(|a| &a.id == id)
    }

    pub fn actor_mut(&mut self, id: &ActorId) -> Option<&mut Actor> {
        self.actors.iter_mut().find(|a| &a.id == id)
    }

    pub fn contains(&self, id: &ActorId) -> bool {
        self.actor(id).is_some()
    }

    pub fn is_walkable(&self, pos: Position) -> bool {
        self.grid.as_ref().map_or(true, |g| g.is_walkable(pos))
    }

    /// A standing actor other than `except` occupies the tile.
    pub fn is_occupied(&self, pos: Position, except: &ActorId) -> bool {
        self.actors
            .iter()
            .any(|a| &a.id != except && a.is_standing() && a.position == Some(pos))
    }

    /// Standing actors inside a cube centred on the caster, caster excluded.
    pub fn targets_in_self_cube(
        &self,
        caster: &ActorId,
        feet: i32,
        feet_per_tile: i32,
    ) -> Vec<ActorId> {
        let Some(origin) = self.actor(caster).and_then(|a| a.position) else {
            return Vec::new();
        };
        let tiles = feet_to_tiles(feet, feet_per_tile).max(1);
        self.actors
            .iter()
            .filter(|a| &a.id != caster && a.is_standing())
            .filter(|a| {
                a.position.is_some_and(|p| {
                    (p.x - origin.x).abs() <= tiles && (p.y - origin.y).abs() <= tiles
                })
            })
            .map(|a| a.id.clone())
            .collect()
    }

    /// Standing actors within a Chebyshev radius of a point. The radius is
    /// at least one tile.
    pub fn targets_in_radius(&self, center: Position, feet: i32, feet_per_tile: i32) -> Vec<ActorId> {
        let tiles = feet_to_tiles(feet, feet_per_tile).max(1);
        self.actors
            .iter()
            .filter(|a| a.is_standing())
            .filter(|a| a.position.is_some_and(|p| center.distance(p) <= tiles))
            .map(|a| a.id.clone())
            .collect()
    }
}
