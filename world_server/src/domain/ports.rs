use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::{CharacterStoreError, PublishError};
use crate::domain::state::{AcceptedMove, CharacterRecord, ChatMessage, Snapshot};

// Port for loading characters on join, authorised with the caller's token.
#[async_trait]
pub trait CharacterStore: Send + Sync {
    async fn get_character_by_id(
        &self,
        token: &str,
        character_id: Uuid,
    ) -> Result<CharacterRecord, CharacterStoreError>;
}

// Port used by the replay consumer to write positions back.
#[async_trait]
pub trait CharacterRecords: Send + Sync {
    async fn get_character(&self, character_id: Uuid) -> Result<CharacterRecord, CharacterStoreError>;
    async fn update_character(&self, record: &CharacterRecord) -> Result<(), CharacterStoreError>;
}

// Port for durable publication of accepted moves.
#[async_trait]
pub trait MovePublisher: Send + Sync {
    async fn publish(&self, event: &AcceptedMove) -> Result<(), PublishError>;
}

// Port for pushes to every connected client. Must not block.
pub trait Broadcaster: Send + Sync {
    fn push_snapshot(&self, snapshot: Snapshot);
    fn push_message(&self, message: ChatMessage);
}

impl<T: Broadcaster + ?Sized> Broadcaster for std::sync::Arc<T> {
    fn push_snapshot(&self, snapshot: Snapshot) {
        (**self).push_snapshot(snapshot)
    }

    fn push_message(&self, message: ChatMessage) {
        (**self).push_message(message)
    }
}
