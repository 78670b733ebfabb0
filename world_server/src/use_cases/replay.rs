// Applies logged accepted moves to persisted character records.

use crate::domain::AcceptedMove;
use crate::domain::errors::CharacterStoreError;
use crate::domain::ports::CharacterRecords;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

pub const MOVE_ACTION: &str = "Move";

/// One line of the move log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterAction {
    pub action_type: String,
    pub character_id: Uuid,
    pub action_data: MoveData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveData {
    pub x: i32,
    pub y: i32,
}

impl From<&AcceptedMove> for CharacterAction {
    fn from(event: &AcceptedMove) -> Self {
        Self {
            action_type: MOVE_ACTION.to_string(),
            character_id: event.character_id,
            action_data: MoveData {
                x: event.x,
                y: event.y,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    UnknownAction,
    MissingCharacter,
}

#[derive(Debug)]
pub enum ReplayError {
    Decode(serde_json::Error),
    Store(CharacterStoreError),
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayError::Decode(err) => write!(f, "invalid move log entry: {err}"),
            ReplayError::Store(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ReplayError {}

pub struct MoveReplayer<R> {
    pub records: R,
}

impl<R> MoveReplayer<R>
where
    R: CharacterRecords,
{
    /// Applies one raw log line. Store failures are returned so the caller
    /// can stop before committing its offset.
    pub async fn apply_line(&self, line: &str) -> Result<ApplyOutcome, ReplayError> {
        let action: CharacterAction = serde_json::from_str(line).map_err(ReplayError::Decode)?;
        self.apply(&action).await
    }

    pub async fn apply(&self, action: &CharacterAction) -> Result<ApplyOutcome, ReplayError> {
        if action.action_type != MOVE_ACTION {
            warn!(action_type = %action.action_type, "unknown action type; skipping");
            return Ok(ApplyOutcome::UnknownAction);
        }

        let mut record = match self.records.get_character(action.character_id).await {
            Ok(record) => record,
            Err(CharacterStoreError::NotFound) => {
                warn!(character_id = %action.character_id, "character not found; skipping move");
                return Ok(ApplyOutcome::MissingCharacter);
            }
            Err(err) => return Err(ReplayError::Store(err)),
        };

        record.position.x = action.action_data.x;
        record.position.y = action.action_data.y;
        self.records
            .update_character(&record)
            .await
            .map_err(ReplayError::Store)?;

        info!(
            character_id = %action.character_id,
            x = action.action_data.x,
            y = action.action_data.y,
            "applied move"
        );
        Ok(ApplyOutcome::Applied)
    }
}
