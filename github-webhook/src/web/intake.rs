//! Header and body extraction for inbound deliveries.
//!
//! The JSON document is read from a `payload` string field, either of an
//! `application/x-www-form-urlencoded` body or of a JSON object body. A JSON
//! body without such a field is the document itself, which is how GitHub
//! sends `application/json` deliveries. In every case the raw bytes are kept
//! untouched for signature verification.

use axum::body::Bytes;
use axum::http::{header::CONTENT_TYPE, HeaderMap};
use serde_json::Value;
use tracing::debug;

use crate::error::WebhookError;

pub const EVENT_HEADER: &str = "x-github-event";
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const HOOK_ID_HEADER: &str = "x-github-hook-id";
pub const DELIVERY_HEADER: &str = "x-github-delivery";

/// Topic separators and AMQP routing wildcards.
const RESERVED_EVENT_CHARS: [char; 4] = ['/', '.', '*', '#'];

/// Required and informational headers of a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookHeaders {
    pub event_name: String,
    pub signature: String,
    pub hook_id: u64,
    pub delivery_id: Option<String>,
}

/// A delivery whose headers and payload have been extracted.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub event_name: String,
    pub signature: String,
    pub delivery_id: Option<String>,
    pub hook_id: u64,
    /// Bytes exactly as received; the signature covers these
    pub raw_body: Bytes,
    pub payload: Value,
}

impl InboundRequest {
    /// `repository.full_name` of the payload, if present.
    pub fn repository_full_name(&self) -> Option<&str> {
        self.payload
            .pointer("/repository/full_name")
            .and_then(Value::as_str)
    }
}

/// Build an [`InboundRequest`] from a POST's headers and raw body.
pub fn intake(headers: &HeaderMap, raw_body: Bytes) -> Result<InboundRequest, WebhookError> {
    let WebhookHeaders {
        event_name,
        signature,
        hook_id,
        delivery_id,
    } = extract_headers(headers)?;

    let payload = match parse_payload(headers, &raw_body) {
        Ok(payload) => payload,
        Err(e) => {
            debug!(event = %event_name, error = %e, "github_payload_rejected");
            return Err(e);
        }
    };

    debug!(
        event = %event_name,
        delivery_id = delivery_id.as_deref().unwrap_or(""),
        hook_id = hook_id,
        "github_webhook_received"
    );

    Ok(InboundRequest {
        event_name,
        signature,
        delivery_id,
        hook_id,
        raw_body,
        payload,
    })
}

/// Validate presence and format of the GitHub headers.
pub fn extract_headers(headers: &HeaderMap) -> Result<WebhookHeaders, WebhookError> {
    let event_name = required_header(headers, EVENT_HEADER)?;
    if event_name.is_empty() || event_name.contains(RESERVED_EVENT_CHARS) {
        return Err(WebhookError::InvalidHeader {
            name: EVENT_HEADER,
            reason: "must be a non-empty name without '/', '.', '*' or '#'",
        });
    }

    let signature = required_header(headers, SIGNATURE_HEADER)?;

    let hook_id = required_header(headers, HOOK_ID_HEADER)?
        .trim()
        .parse::<u64>()
        .map_err(|_| WebhookError::InvalidHeader {
            name: HOOK_ID_HEADER,
            reason: "not an unsigned integer",
        })?;

    let delivery_id = headers
        .get(DELIVERY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    Ok(WebhookHeaders {
        event_name,
        signature,
        hook_id,
        delivery_id,
    })
}

fn required_header(headers: &HeaderMap, name: &'static str) -> Result<String, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .ok_or(WebhookError::MissingHeader(name))
}

/// How the JSON document is carried in the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyEncoding {
    Form,
    Json,
}

fn body_encoding(headers: &HeaderMap, body: &[u8]) -> BodyEncoding {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase());

    match content_type.as_deref() {
        Some("application/x-www-form-urlencoded") => BodyEncoding::Form,
        Some(ct) if ct == "application/json" || ct.ends_with("+json") => BodyEncoding::Json,
        _ => match body.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') | Some(b'[') => BodyEncoding::Json,
            _ => BodyEncoding::Form,
        },
    }
}

/// Parse the JSON document out of the body without touching the raw bytes.
pub fn parse_payload(headers: &HeaderMap, body: &[u8]) -> Result<Value, WebhookError> {
    let payload: Value = match body_encoding(headers, body) {
        BodyEncoding::Form => {
            let field = url::form_urlencoded::parse(body)
                .find(|(key, _)| key == "payload")
                .map(|(_, value)| value.into_owned())
                .ok_or(WebhookError::MissingPayload)?;
            serde_json::from_str(&field).map_err(WebhookError::MalformedPayload)?
        }
        BodyEncoding::Json => {
            let document: Value =
                serde_json::from_slice(body).map_err(WebhookError::MalformedPayload)?;
            match document.get("payload").and_then(Value::as_str) {
                Some(field) => serde_json::from_str(field).map_err(WebhookError::MalformedPayload)?,
                None => document,
            }
        }
    };

    if is_falsy(&payload) {
        return Err(WebhookError::EmptyPayload);
    }

    Ok(payload)
}

/// `null`, `false`, `0` and `""`; any other JSON value is accepted.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}
