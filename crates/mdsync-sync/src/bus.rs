//! Live-reload notification fan-out.
//!
//! Each subscriber gets its own bounded queue. Broadcasting never waits: a full queue
//! drops the message for that subscriber only, and a closed queue is pruned.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Message pushed to live-reload subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusMessage {
    /// Sent once when a subscription is opened.
    Connected,
    /// Stored documents changed.
    Reload,
}

impl BusMessage {
    /// Wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Reload => "reload",
        }
    }
}

/// Result of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    /// Subscribers whose queue accepted the message.
    pub delivered: usize,
    /// Subscribers whose queue was full.
    pub dropped: usize,
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    endpoints: HashMap<u64, mpsc::Sender<BusMessage>>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of live subscriber endpoints.
#[derive(Debug)]
pub struct NotificationBus {
    registry: Arc<Mutex<Registry>>,
    capacity: usize,
}

impl NotificationBus {
    /// Create a bus whose subscribers buffer up to `capacity` messages (at least 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber. Its first message is [`BusMessage::Connected`].
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        // Fresh queue with capacity >= 1
        let _ = tx.try_send(BusMessage::Connected);

        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.endpoints.insert(id, tx);
        tracing::debug!(id, subscribers = registry.endpoints.len(), "Subscriber connected");

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deregister a subscriber and close its queue. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: u64) {
        remove(&self.registry, id);
    }

    /// Deliver `message` to every subscriber without waiting.
    pub fn broadcast(&self, message: BusMessage) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        let mut registry = lock(&self.registry);
        registry.endpoints.retain(|id, tx| match tx.try_send(message) {
            Ok(()) => {
                outcome.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::debug!(id, message = message.as_str(), "Subscriber queue full, dropping message");
                outcome.dropped += 1;
                true
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(id, "Pruning closed subscriber");
                false
            }
        });
        outcome
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).endpoints.len()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(16)
    }
}

fn remove(registry: &Mutex<Registry>, id: u64) {
    let mut registry = lock(registry);
    if registry.endpoints.remove(&id).is_some() {
        tracing::debug!(id, subscribers = registry.endpoints.len(), "Subscriber disconnected");
    }
}

/// Receiving side of a subscriber endpoint. Deregisters itself on drop.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<BusMessage>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Registry id, usable with [`NotificationBus::unsubscribe`].
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next message. `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        self.rx.recv().await
    }

    /// Next message if one is queued.
    pub fn try_recv(&mut self) -> Option<BusMessage> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            remove(&registry, self.id);
        }
    }
}
