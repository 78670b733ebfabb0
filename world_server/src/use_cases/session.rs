// Join/leave workflows run on the connection task, never inside the tick.

use crate::domain::errors::JoinError;
use crate::domain::ports::CharacterStore;
use crate::domain::{SessionId, WorldMap};
use crate::use_cases::registry::{ActorRegistry, Placement};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

// Join use case with injected dependencies.
pub struct JoinCharacterUseCase<S> {
    pub store: S,
    pub registry: Arc<ActorRegistry>,
    pub map: Arc<WorldMap>,
    pub spawn_radius: i32,
}

impl<S> JoinCharacterUseCase<S>
where
    S: CharacterStore,
{
    pub async fn execute(
        &self,
        token: &str,
        character_id: Uuid,
        session_id: SessionId,
    ) -> Result<Placement, JoinError> {
        if let Some(actor) = self.registry.get(session_id).await {
            return Ok(Placement::AlreadyPresent(actor.tile()));
        }

        // Network call; the registry is not locked while it runs.
        let record = self
            .store
            .get_character_by_id(token, character_id)
            .await
            .map_err(JoinError::CharacterUnavailable)?;

        let placement = self
            .registry
            .add_spawned(session_id, record, &self.map, self.spawn_radius)
            .await?;

        if let Placement::Spawned(tile) = placement {
            info!(session_id, %character_id, x = tile.x, y = tile.y, "character joined");
        }
        Ok(placement)
    }
}

/// Removes the session's actor; returns whether one was present.
pub async fn leave(registry: &ActorRegistry, session_id: SessionId) -> bool {
    let removed = registry.remove(session_id).await;
    if let Some(actor) = &removed {
        info!(session_id, character_id = %actor.character_id, "character left");
    }
    removed.is_some()
}
