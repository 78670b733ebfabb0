// Domain-level actors, intents and the per-tick outputs of the simulation.

use crate::domain::world_map::{Tile, WorldMap};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use uuid::Uuid;

/// Transient per-connection key for the actor registry.
pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    // Carried through but ignored by movement.
    pub z: i32,
}

impl Position {
    pub fn tile(&self) -> Tile {
        Tile::new(self.x, self.y)
    }
}

/// Persisted character as returned by the character store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub race_id: Option<Uuid>,
    #[serde(default)]
    pub class_id: Option<Uuid>,
    #[serde(default)]
    pub gender_id: Option<Uuid>,
    #[serde(default)]
    pub level: i32,
    #[serde(default)]
    pub health: i32,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub bg: String,
    #[serde(default)]
    pub position: Position,
}

/// Live simulation state for one connected character.
#[derive(Debug, Clone)]
pub struct Actor {
    pub character_id: Uuid,
    pub name: String,
    pub position: Position,
    pub health: i32,
    pub level: i32,
    pub color: String,
    pub bg: String,

    // Owned by the tick engine.
    pub path: VecDeque<Tile>,
    pub walking: bool,
}

impl Actor {
    /// Builds an actor from a stored character placed at `spawn`.
    pub fn spawn(record: CharacterRecord, spawn: Tile) -> Self {
        Self {
            character_id: record.id,
            name: record.name,
            position: Position {
                x: spawn.x,
                y: spawn.y,
                z: record.position.z,
            },
            health: record.health,
            level: record.level,
            color: record.color,
            bg: record.bg,
            path: VecDeque::new(),
            walking: false,
        }
    }

    pub fn tile(&self) -> Tile {
        self.position.tile()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Case-insensitive parse of `up`/`down`/`left`/`right`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            "left" => Some(Direction::Left),
            "right" => Some(Direction::Right),
            _ => None,
        }
    }

    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentKind {
    Move { direction: Direction },
    Message { text: String },
    Pathfind { dest: Tile },
    // Accepted but not resolved yet.
    Attack,
    UseItem,
}

/// One queued client request, consumed exactly once by the tick engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub session_id: SessionId,
    pub kind: IntentKind,
}

impl Intent {
    pub fn new(session_id: SessionId, kind: IntentKind) -> Self {
        Self { session_id, kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorSnapshot {
    pub session_id: SessionId,
    pub character_id: Uuid,
    pub name: String,
    pub position: Position,
    pub health: i32,
}

impl From<(&SessionId, &Actor)> for ActorSnapshot {
    fn from((session_id, actor): (&SessionId, &Actor)) -> Self {
        Self {
            session_id: *session_id,
            character_id: actor.character_id,
            name: actor.name.clone(),
            position: actor.position,
            health: actor.health,
        }
    }
}

/// World view broadcast once per tick.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub tick: u64,
    pub timestamp_ms: u64,
    pub map: Arc<WorldMap>,
    pub actors: Vec<ActorSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub timestamp_ms: u64,
    pub sender_name: String,
    pub text: String,
}

/// A committed position change handed to the persistence bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptedMove {
    pub character_id: Uuid,
    pub x: i32,
    pub y: i32,
}

pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
