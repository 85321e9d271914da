//! Internal event bus that authenticated webhook payloads are dispatched onto.
//!
//! ## Topics
//!
//! ```text
//! github/<event>            every delivery of <event>
//! github/<event>/<action>   deliveries whose payload carries `action`
//! ```
//!
//! Buses only forward topics covered by a pattern passed to
//! [`EventBus::register`]; the server registers `github/*` once at startup.

pub mod amqp;
pub mod local;
pub mod types;

use std::sync::Arc;

pub use amqp::AmqpBus;
pub use local::{LocalBus, Subscription};
pub use types::{
    action_topic, event_topic, routing_key, BusError, DispatchedEvent, TopicPattern,
    TOPIC_NAMESPACE,
};

/// Collaborator that receives dispatched events.
///
/// `emit` is fire-and-forget: it must not block on subscribers and must keep
/// the relative order of events emitted from one caller.
pub trait EventBus: Send + Sync {
    /// Declare a topic family this bus forwards.
    fn register(&self, pattern: TopicPattern);

    /// Hand an event to the bus.
    fn emit(&self, event: DispatchedEvent);
}

/// Forwards every call to each inner bus in order.
#[derive(Default)]
pub struct FanoutBus {
    buses: Vec<Arc<dyn EventBus>>,
}

impl FanoutBus {
    pub fn new(buses: Vec<Arc<dyn EventBus>>) -> Self {
        Self { buses }
    }
}

impl EventBus for FanoutBus {
    fn register(&self, pattern: TopicPattern) {
        for bus in &self.buses {
            bus.register(pattern.clone());
        }
    }

    fn emit(&self, event: DispatchedEvent) {
        for bus in &self.buses {
            bus.emit(event.clone());
        }
    }
}
