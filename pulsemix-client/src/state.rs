//! Event fan-out
//!
//! Controllers never print. They publish [`ClientEvent`]s on a shared bus and
//! the front end (or a test) subscribes.

use pulsemix_common::ClientEvent;
use tokio::sync::broadcast;

/// Default number of buffered events per subscriber
pub const EVENT_CAPACITY: usize = 256;

/// Broadcast channel for client events
#[derive(Debug, Clone)]
pub struct EventBus {
    event_tx: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity);
        Self { event_tx }
    }

    /// Publish an event to all subscribers
    pub fn broadcast_event(&self, event: ClientEvent) {
        // No receivers is OK
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
