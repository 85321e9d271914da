//! Request-level error taxonomy and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Why a webhook delivery was rejected. Every variant ends the request.
///
/// Messages never contain secrets or signature material.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing or non-UTF-8 header {0}")]
    MissingHeader(&'static str),

    #[error("invalid header {name}: {reason}")]
    InvalidHeader {
        name: &'static str,
        reason: &'static str,
    },

    #[error("request body has no `payload` field")]
    MissingPayload,

    #[error("payload is not valid JSON: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    #[error("payload is null, false, 0 or an empty string")]
    EmptyPayload,

    #[error("no webhook registered for hook id {hook_id}")]
    UnknownWebhook { hook_id: u64 },

    #[error("signature mismatch")]
    SignatureMismatch,
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::MissingHeader(_)
            | WebhookError::InvalidHeader { .. }
            | WebhookError::MissingPayload
            | WebhookError::MalformedPayload(_)
            | WebhookError::EmptyPayload => StatusCode::BAD_REQUEST,
            WebhookError::UnknownWebhook { .. } => StatusCode::NOT_FOUND,
            WebhookError::SignatureMismatch => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        self.status().into_response()
    }
}
