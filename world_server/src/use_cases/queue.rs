// Unbounded multi-producer queue of intents drained once per tick.

use crate::domain::Intent;
use tokio::sync::mpsc;

/// Returned when the engine side of the queue is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueClosed;

/// Cloneable producer handle; enqueueing never blocks.
#[derive(Debug, Clone)]
pub struct ActionSender {
    tx: mpsc::UnboundedSender<Intent>,
}

impl ActionSender {
    pub fn enqueue(&self, intent: Intent) -> Result<(), QueueClosed> {
        self.tx.send(intent).map_err(|_| QueueClosed)
    }
}

/// Single consumer side, owned by the tick engine.
#[derive(Debug)]
pub struct ActionQueue {
    rx: mpsc::UnboundedReceiver<Intent>,
}

pub fn action_queue() -> (ActionSender, ActionQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ActionSender { tx }, ActionQueue { rx })
}

impl ActionQueue {
    /// Takes, in FIFO order, the intents queued when the drain starts.
    /// Anything enqueued afterwards waits for the next call.
    pub fn drain_all(&mut self) -> Vec<Intent> {
        let pending = self.rx.len();
        let mut drained = Vec::with_capacity(pending);
        for _ in 0..pending {
            match self.rx.try_recv() {
                Ok(intent) => drained.push(intent),
                Err(_) => break,
            }
        }
        drained
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }
}
