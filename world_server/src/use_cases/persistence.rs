// Non-blocking hand-off from the tick to durable move publication.

use crate::domain::AcceptedMove;
use crate::domain::ports::MovePublisher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Retry policy for the background publisher.
#[derive(Debug, Clone, Copy)]
pub struct PublishSettings {
    pub max_attempts: u32,
    pub backoff: Duration,
}

/// Tick-side handle. `publish` never waits on the downstream publisher.
#[derive(Debug, Clone)]
pub struct MoveOutbox {
    tx: mpsc::UnboundedSender<AcceptedMove>,
}

impl MoveOutbox {
    /// Bare outbox plus its receiving end, for wiring a custom consumer.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AcceptedMove>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn publish(&self, event: AcceptedMove) {
        if self.tx.send(event).is_err() {
            warn!(
                character_id = %event.character_id,
                "move publisher stopped; dropping accepted move"
            );
        }
    }
}

/// Starts the long-lived publisher task and returns the outbox feeding it.
pub fn spawn_move_publisher<P>(
    publisher: Arc<P>,
    settings: PublishSettings,
) -> (MoveOutbox, JoinHandle<()>)
where
    P: MovePublisher + ?Sized + 'static,
{
    let (outbox, rx) = MoveOutbox::channel();
    let handle = tokio::spawn(run_publisher(rx, publisher, settings));
    (outbox, handle)
}

async fn run_publisher<P>(
    mut rx: mpsc::UnboundedReceiver<AcceptedMove>,
    publisher: Arc<P>,
    settings: PublishSettings,
) where
    P: MovePublisher + ?Sized,
{
    while let Some(event) = rx.recv().await {
        publish_with_retry(publisher.as_ref(), &event, settings).await;
    }
    debug!("move outbox closed; publisher exiting");
}

/// Returns whether the event was published. Failures are logged, never raised.
pub async fn publish_with_retry<P>(publisher: &P, event: &AcceptedMove, settings: PublishSettings) -> bool
where
    P: MovePublisher + ?Sized,
{
    let attempts = settings.max_attempts.max(1);
    for attempt in 1..=attempts {
        match publisher.publish(event).await {
            Ok(()) => return true,
            Err(error) if attempt < attempts => {
                debug!(attempt, %error, "move publish failed; retrying");
                tokio::time::sleep(settings.backoff * attempt).await;
            }
            Err(error) => {
                warn!(
                    character_id = %event.character_id,
                    x = event.x,
                    y = event.y,
                    attempts,
                    %error,
                    "dropping accepted move after failed publish"
                );
            }
        }
    }
    false
}
