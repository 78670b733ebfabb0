// Wire protocol DTOs and conversions for public world server messages.

use crate::domain::{ActorSnapshot, ChatMessage, Position, SessionId, Snapshot, TileId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages the server sends to connected clients over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    // Session id assigned to the connection on upgrade.
    Identity { session_id: SessionId },
    // World snapshot for one tick.
    GameState(SnapshotDto),
    // Chat line or system notice.
    Message(ChatDto),
}

/// Messages the client sends to the server over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    JoinCharacter { character_id: Uuid },
    MoveCharacter { direction: String },
    SendMessage { text: String },
    StartAutoWalk { dest_x: i32, dest_y: i32 },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDto {
    pub tick: u64,
    pub timestamp: u64,
    pub map_tiles: Vec<Vec<TileId>>,
    pub characters: Vec<CharacterDto>,
}

impl From<&Snapshot> for SnapshotDto {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            tick: snapshot.tick,
            timestamp: snapshot.timestamp_ms,
            map_tiles: snapshot.map.rows().to_vec(),
            characters: snapshot.actors.iter().map(CharacterDto::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CharacterDto {
    pub id: Uuid,
    pub name: String,
    pub position: Position,
    pub health: i32,
}

impl From<&ActorSnapshot> for CharacterDto {
    fn from(actor: &ActorSnapshot) -> Self {
        Self {
            id: actor.character_id,
            name: actor.name.clone(),
            position: actor.position,
            health: actor.health,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatDto {
    pub timestamp: u64,
    pub sender_name: String,
    pub text: String,
}

impl From<ChatMessage> for ChatDto {
    fn from(message: ChatMessage) -> Self {
        Self {
            timestamp: message.timestamp_ms,
            sender_name: message.sender_name,
            text: message.text,
        }
    }
}
