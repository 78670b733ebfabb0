// Domain-level errors for the world server workflows.

use std::fmt;

#[derive(Debug)]
pub enum CharacterStoreError {
    Unauthorized,
    NotFound,
    Upstream { status: u16 },
    Transport(String),
    Decode(String),
}

impl fmt::Display for CharacterStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CharacterStoreError::Unauthorized => write!(f, "character store rejected credentials"),
            CharacterStoreError::NotFound => write!(f, "character not found"),
            CharacterStoreError::Upstream { status } => {
                write!(f, "character store upstream error {status}")
            }
            CharacterStoreError::Transport(err) => write!(f, "character store transport error: {err}"),
            CharacterStoreError::Decode(err) => write!(f, "character store decode error: {err}"),
        }
    }
}

impl std::error::Error for CharacterStoreError {}

#[derive(Debug)]
pub enum JoinError {
    // No open tile within the spawn search radius.
    WorldFull,
    CharacterUnavailable(CharacterStoreError),
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::WorldFull => write!(f, "world full"),
            JoinError::CharacterUnavailable(err) => write!(f, "character unavailable: {err}"),
        }
    }
}

impl std::error::Error for JoinError {}

#[derive(Debug)]
pub enum PublishError {
    Io(std::io::Error),
    Encode(serde_json::Error),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::Io(err) => write!(f, "move log write failed: {err}"),
            PublishError::Encode(err) => write!(f, "move encode failed: {err}"),
        }
    }
}

impl std::error::Error for PublishError {}
