use crate::interface_adapters::broadcast::ChannelBroadcaster;
use crate::interface_adapters::clients::characters::CharactersClient;
use crate::use_cases::{ActionSender, ActorRegistry, JoinCharacterUseCase};
use axum::extract::ws::Utf8Bytes;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ActorRegistry>,
    // Intents flowing from connections into the tick engine.
    pub intents: ActionSender,
    pub join: Arc<JoinCharacterUseCase<CharactersClient>>,
    // Chat fan-out; connections subscribe on upgrade.
    pub broadcaster: Arc<ChannelBroadcaster>,
    // Serialized snapshots, shared across all connections.
    pub snapshot_bytes_tx: broadcast::Sender<Utf8Bytes>,
    // Latest serialized snapshot for lag recovery and `GET /state`.
    pub snapshot_latest_tx: watch::Sender<Utf8Bytes>,
}
