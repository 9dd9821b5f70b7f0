//! Broadcast bus for distributing `SaveEvent` to multiple subscribers.
//!
//! This is the error channel of the draft store: storage failures are
//! published here instead of being returned to the caller, so an edit
//! handler is never interrupted by a failed write. Publishing with no
//! active subscribers is a no-op.

use tokio::sync::broadcast;
use tutorhub_types::event::SaveEvent;

/// Default channel capacity for a single wizard session.
pub const DEFAULT_CAPACITY: usize = 64;

/// Multi-consumer bus for save events.
///
/// Cloning the bus clones the sender, allowing multiple producers and
/// consumers.
pub struct SaveEventBus {
    sender: broadcast::Sender<SaveEvent>,
}

impl SaveEventBus {
    /// Create a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a new subscriber that will receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<SaveEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no subscribers, the event is silently dropped.
    pub fn publish(&self, event: SaveEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for SaveEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Clone for SaveEventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl std::fmt::Debug for SaveEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveEventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}
