// Domain layer: grid, search algorithms and simulation types.

pub mod errors;
pub mod pathfinding;
pub mod ports;
pub mod spawn;
pub mod state;
pub mod world_map;

pub use state::{
    AcceptedMove, Actor, ActorSnapshot, CharacterRecord, ChatMessage, Direction, EngineState,
    Intent, IntentKind, Position, SessionId, Snapshot,
};
pub use world_map::{Tile, TileId, WorldMap};
