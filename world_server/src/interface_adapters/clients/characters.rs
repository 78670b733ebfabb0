use crate::domain::errors::CharacterStoreError;
use crate::domain::ports::{CharacterRecords, CharacterStore};
use crate::domain::{CharacterRecord, Position};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct UpdateCharacterRequest<'a> {
    level: i32,
    color: &'a str,
    bg: &'a str,
    position: Position,
}

// Thin reqwest client for the character records service.
#[derive(Clone)]
pub struct CharactersClient {
    http: reqwest::Client,
    base_url: String,
    // Credential used by the replay consumer, which acts without a player.
    service_token: Option<String>,
}

impl CharactersClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_token: None,
        })
    }

    pub fn with_service_token(mut self, token: Option<String>) -> Self {
        self.service_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    fn character_url(&self, character_id: Uuid) -> String {
        format!("{}/v1/characters/{}", self.base_url, character_id)
    }

    async fn fetch(
        &self,
        token: Option<&str>,
        character_id: Uuid,
    ) -> Result<CharacterRecord, CharacterStoreError> {
        let mut request = self.http.get(self.character_url(character_id));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| CharacterStoreError::Transport(e.to_string()))?;

        check_status(response)?
            .json::<CharacterRecord>()
            .await
            .map_err(|e| CharacterStoreError::Decode(e.to_string()))
    }
}

fn check_status(response: Response) -> Result<Response, CharacterStoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CharacterStoreError::Unauthorized,
        StatusCode::NOT_FOUND => CharacterStoreError::NotFound,
        other => CharacterStoreError::Upstream {
            status: other.as_u16(),
        },
    })
}

#[async_trait]
impl CharacterStore for CharactersClient {
    async fn get_character_by_id(
        &self,
        token: &str,
        character_id: Uuid,
    ) -> Result<CharacterRecord, CharacterStoreError> {
        self.fetch(Some(token), character_id).await
    }
}

#[async_trait]
impl CharacterRecords for CharactersClient {
    async fn get_character(&self, character_id: Uuid) -> Result<CharacterRecord, CharacterStoreError> {
        self.fetch(self.service_token.as_deref(), character_id).await
    }

    async fn update_character(&self, record: &CharacterRecord) -> Result<(), CharacterStoreError> {
        let mut request = self
            .http
            .put(self.character_url(record.id))
            .json(&UpdateCharacterRequest {
                level: record.level,
                color: &record.color,
                bg: &record.bg,
                position: record.position,
            });
        if let Some(token) = self.service_token.as_deref() {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| CharacterStoreError::Transport(e.to_string()))?;
        check_status(response).map(|_| ())
    }
}
