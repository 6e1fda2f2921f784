//! Completion event fan-out.
//!
//! Downstream content-refresh collaborators subscribe to the bus; emission
//! never blocks on slow subscribers.

use tokio::sync::broadcast;
use tracing::info;

use crate::models::CompletionEvent;

const EVENT_BUS_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CompletionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { tx }
    }

    /// Emits one completion event; returns the number of live subscribers.
    pub fn emit(&self, event: CompletionEvent) -> usize {
        let job_id = event.job_id.clone();
        let receivers = self.tx.send(event).unwrap_or(0);
        info!(%job_id, receivers, "completion event emitted");
        receivers
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CompletionEvent> {
        self.tx.subscribe()
    }
}
