//! Two-stage emission of an authenticated payload.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::bus::{action_topic, event_topic, DispatchedEvent, EventBus};

/// The payload's `action`, if it is a non-empty string.
pub fn payload_action(payload: &Value) -> Option<&str> {
    payload
        .get("action")
        .and_then(Value::as_str)
        .filter(|action| !action.is_empty())
}

/// Emit `github/<event>` and, when the payload has an action,
/// `github/<event>/<action>` after it. Returns the number of events emitted.
pub fn dispatch(
    bus: &dyn EventBus,
    event_name: &str,
    payload: Value,
    delivery_id: Option<&str>,
) -> usize {
    let action = payload_action(&payload).map(str::to_owned);
    let payload = Arc::new(payload);
    let delivery_id = delivery_id.map(str::to_owned);

    let mut topics = vec![event_topic(event_name)];
    if let Some(action) = &action {
        topics.push(action_topic(event_name, action));
    }

    let emitted = topics.len();
    for topic in topics {
        bus.emit(DispatchedEvent::new(topic, payload.clone(), delivery_id.clone()));
    }

    info!(
        event = %event_name,
        action = action.as_deref().unwrap_or(""),
        delivery_id = delivery_id.as_deref().unwrap_or(""),
        emitted = emitted,
        "github_event_dispatched"
    );

    emitted
}
