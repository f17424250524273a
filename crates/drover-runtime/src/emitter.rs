//! Broadcast-based event emitter.
//!
//! Non-blocking fan-out used for the orchestrator's live raw-event tail and
//! the coordinator's session notices. `emit` never awaits; slow receivers
//! lag and drop rather than blocking the sender. The channel carries only
//! the live tail — a late subscriber that needs history must fetch it from
//! the transport before attaching.

use tokio::sync::broadcast;

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast-based event emitter.
pub struct EventEmitter<T> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone> EventEmitter<T> {
    /// Create a new emitter with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new emitter with a custom channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers. Non-blocking.
    ///
    /// Returns the number of receivers that got the event; 0 with no
    /// active subscribers.
    pub fn emit(&self, event: T) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
