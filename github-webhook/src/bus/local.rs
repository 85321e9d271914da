//! In-process event bus built on a tokio broadcast channel.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

use super::types::{DispatchedEvent, PatternSet, TopicPattern};
use super::EventBus;

/// Default broadcast buffer per subscriber.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast bus delivering events to in-process subscribers.
///
/// Emission never blocks. A subscriber that falls more than the channel
/// capacity behind skips the oldest events.
pub struct LocalBus {
    sender: broadcast::Sender<DispatchedEvent>,
    registered: PatternSet,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            registered: PatternSet::default(),
        }
    }

    /// Subscribe to every future event matching `pattern`.
    pub fn subscribe(&self, pattern: TopicPattern) -> Subscription {
        Subscription {
            pattern,
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for LocalBus {
    fn register(&self, pattern: TopicPattern) {
        self.registered.insert(pattern);
    }

    fn emit(&self, event: DispatchedEvent) {
        if !self.registered.covers(&event.topic) {
            debug!(topic = %event.topic, "local_bus_topic_not_registered");
            return;
        }

        // Err only means nobody is subscribed right now
        if self.sender.send(event).is_err() {
            debug!("local_bus_no_subscribers");
        }
    }
}

/// A filtered view of the bus for one pattern.
pub struct Subscription {
    pattern: TopicPattern,
    receiver: broadcast::Receiver<DispatchedEvent>,
}

impl Subscription {
    /// Wait for the next matching event. Returns `None` once the bus is dropped.
    pub async fn recv(&mut self) -> Option<DispatchedEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.pattern.matches(&event.topic) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "local_bus_subscriber_lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<DispatchedEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.pattern.matches(&event.topic) => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "local_bus_subscriber_lagged");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}
