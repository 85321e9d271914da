//! GitHub webhook intake.
//!
//! Receives GitHub webhook deliveries over HTTP, authenticates each one
//! against a configured shared secret, and re-dispatches the payload onto an
//! internal event bus.
//!
//! ## Architecture
//!
//! ```text
//! POST → intake → registry::resolve → signature → dispatch → EventBus
//!                                                             ├─ LocalBus (in-process)
//!                                                             └─ AmqpBus  (RabbitMQ, optional)
//! ```

pub mod bus;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod web;

// Re-export commonly used types
pub use bus::{AmqpBus, DispatchedEvent, EventBus, FanoutBus, LocalBus, TopicPattern};
pub use config::{Config, ConfigError};
pub use dispatch::dispatch;
pub use error::WebhookError;
pub use registry::{resolve, WebhookMatcher, WebhookRegistration};
pub use web::AppState;
