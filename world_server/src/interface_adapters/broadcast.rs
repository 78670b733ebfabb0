// Fan-out of snapshots and chat to every connection.

use crate::domain::ports::Broadcaster;
use crate::domain::{ChatMessage, Snapshot};
use crate::interface_adapters::protocol::{ServerMessage, SnapshotDto};
use axum::extract::ws::Utf8Bytes;
use tokio::sync::{broadcast, watch};
use tracing::{error, warn};

/// Broadcaster backed by tokio broadcast channels. Sends never block the tick;
/// slow receivers lag and resync from the latest snapshot.
pub struct ChannelBroadcaster {
    snapshot_tx: broadcast::Sender<Snapshot>,
    chat_tx: broadcast::Sender<ChatMessage>,
}

impl ChannelBroadcaster {
    pub fn new(snapshot_capacity: usize, chat_capacity: usize) -> Self {
        let (snapshot_tx, _) = broadcast::channel(snapshot_capacity);
        let (chat_tx, _) = broadcast::channel(chat_capacity);
        Self {
            snapshot_tx,
            chat_tx,
        }
    }

    pub fn subscribe_snapshots(&self) -> broadcast::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn subscribe_chat(&self) -> broadcast::Receiver<ChatMessage> {
        self.chat_tx.subscribe()
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn push_snapshot(&self, snapshot: Snapshot) {
        // No receivers is not an error: nobody is listening yet.
        let _ = self.snapshot_tx.send(snapshot);
    }

    fn push_message(&self, message: ChatMessage) {
        let _ = self.chat_tx.send(message);
    }
}

pub async fn snapshot_serializer(
    mut snapshot_rx: broadcast::Receiver<Snapshot>,
    snapshot_bytes_tx: broadcast::Sender<Utf8Bytes>,
    snapshot_latest_tx: watch::Sender<Utf8Bytes>,
) {
    // Serialize each snapshot once and broadcast the shared bytes.
    loop {
        match snapshot_rx.recv().await {
            Ok(snapshot) => {
                let msg = ServerMessage::GameState(SnapshotDto::from(&snapshot));
                let txt = match serde_json::to_string(&msg) {
                    Ok(txt) => txt,
                    Err(e) => {
                        error!(error = ?e, tick = snapshot.tick, "failed to serialize snapshot");
                        continue;
                    }
                };

                let bytes = Utf8Bytes::from(txt);
                // Kept for lag recovery and the /state endpoint.
                let _ = snapshot_latest_tx.send_replace(bytes.clone());
                let _ = snapshot_bytes_tx.send(bytes);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(missed = n, "snapshot serializer lagged; skipping to latest");
            }
            Err(broadcast::error::RecvError::Closed) => {
                warn!("snapshot channel closed; serializer exiting");
                break;
            }
        }
    }
}
