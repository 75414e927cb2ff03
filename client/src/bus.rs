use tokio::sync::broadcast;

use scrim_common::event::ServerEvent;

/// Events buffered per subscriber before the slowest one starts lagging.
const BUS_CAPACITY: usize = 256;

/// Typed fan-out of push events.
///
/// The transport client owns one bus per session and publishes every
/// parsed [`ServerEvent`] onto it. Each open conversation subscribes and
/// filters the shared stream for its own peer; dropping the receiver
/// unsubscribes.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        EventBus { tx }
    }

    /// Deliver an event to all current subscribers. An event published
    /// with no subscribers is simply dropped.
    pub fn publish(&self, event: ServerEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
