// Use cases layer: application workflows for the world server.

pub mod engine;
pub mod persistence;
pub mod queue;
pub mod registry;
pub mod replay;
pub mod session;

pub use engine::{EngineSettings, TickEngine, TickReport};
pub use persistence::{MoveOutbox, PublishSettings, spawn_move_publisher};
pub use queue::{ActionQueue, ActionSender, action_queue};
pub use registry::{ActorRegistry, Placement};
pub use session::{JoinCharacterUseCase, leave};
