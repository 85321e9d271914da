//! Event and topic types shared by every bus implementation.
//!
//! Topics look like `github/<event>` or `github/<event>/<action>`.
//! Patterns are either an exact topic or a prefix followed by `/*`, which
//! matches every topic below the prefix at any depth.

use std::sync::{Arc, RwLock};

use serde_json::Value;
use thiserror::Error;

/// Namespace all webhook topics live under.
pub const TOPIC_NAMESPACE: &str = "github";

/// Errors raised by bus operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("invalid topic pattern {0:?}")]
    InvalidPattern(String),
}

/// An event handed to the bus.
///
/// The payload is shared between the general and the action-specific
/// emission of the same delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedEvent {
    pub topic: String,
    pub payload: Arc<Value>,
    /// `X-GitHub-Delivery` of the originating request, when supplied
    pub delivery_id: Option<String>,
}

impl DispatchedEvent {
    pub fn new(topic: String, payload: Arc<Value>, delivery_id: Option<String>) -> Self {
        Self {
            topic,
            payload,
            delivery_id,
        }
    }
}

/// Topic for an event family: `github/<event>`.
pub fn event_topic(event: &str) -> String {
    format!("{}/{}", TOPIC_NAMESPACE, event)
}

/// Topic for a specific action: `github/<event>/<action>`.
pub fn action_topic(event: &str, action: &str) -> String {
    format!("{}/{}/{}", TOPIC_NAMESPACE, event, action)
}

/// A subscription/registration pattern over topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicPattern {
    Exact(String),
    /// Everything strictly below the prefix, e.g. `github/*`.
    Prefix(String),
}

impl TopicPattern {
    /// Parse `a/b`, `a/*` or `*`.
    pub fn parse(pattern: &str) -> Result<Self, BusError> {
        let invalid = || BusError::InvalidPattern(pattern.to_string());

        if pattern == "*" {
            return Ok(TopicPattern::Prefix(String::new()));
        }

        let (body, wildcard) = match pattern.strip_suffix("/*") {
            Some(prefix) => (prefix, true),
            None => (pattern, false),
        };

        if body.is_empty() || body.split('/').any(|segment| segment.is_empty() || segment.contains('*')) {
            return Err(invalid());
        }

        Ok(if wildcard {
            TopicPattern::Prefix(body.to_string())
        } else {
            TopicPattern::Exact(body.to_string())
        })
    }

    pub fn matches(&self, topic: &str) -> bool {
        match self {
            TopicPattern::Exact(exact) => exact == topic,
            TopicPattern::Prefix(prefix) if prefix.is_empty() => !topic.is_empty(),
            TopicPattern::Prefix(prefix) => topic
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .map_or(false, |rest| !rest.is_empty()),
        }
    }

    /// Equivalent AMQP topic-exchange binding key (`github/*` -> `github.#`).
    pub fn amqp_binding_key(&self) -> String {
        match self {
            TopicPattern::Exact(exact) => routing_key(exact),
            TopicPattern::Prefix(prefix) if prefix.is_empty() => "#".to_string(),
            TopicPattern::Prefix(prefix) => format!("{}.#", routing_key(prefix)),
        }
    }
}

/// AMQP routing key for a topic (`github/issues/opened` -> `github.issues.opened`).
pub fn routing_key(topic: &str) -> String {
    topic.replace('/', ".")
}

/// The set of registered patterns a bus forwards events for.
#[derive(Debug, Default)]
pub struct PatternSet {
    patterns: RwLock<Vec<TopicPattern>>,
}

impl PatternSet {
    pub fn insert(&self, pattern: TopicPattern) {
        let mut patterns = self.patterns.write().unwrap_or_else(|e| e.into_inner());
        if !patterns.contains(&pattern) {
            patterns.push(pattern);
        }
    }

    pub fn covers(&self, topic: &str) -> bool {
        self.patterns
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|pattern| pattern.matches(topic))
    }
}
