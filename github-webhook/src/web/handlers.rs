//! Webhook endpoint handlers.
//!
//! A delivery goes through intake, resolution, verification and dispatch, in
//! that order. Nothing is emitted unless every earlier step succeeded.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::dispatch::dispatch;
use crate::error::WebhookError;
use crate::registry::resolve;
use crate::web::intake::intake;
use crate::web::signature::{verify_github_signature, SIGNATURE_PREFIX};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub bus: Arc<dyn EventBus>,
}

impl AppState {
    pub fn new(config: Config, bus: Arc<dyn EventBus>) -> Self {
        Self {
            config: Arc::new(config),
            bus,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// GitHub Webhook
// =============================================================================

/// Authenticate one delivery and dispatch it onto the bus.
///
/// Returns the number of events emitted.
pub fn handle_delivery(
    config: &Config,
    bus: &dyn EventBus,
    headers: &HeaderMap,
    raw_body: Bytes,
) -> Result<usize, WebhookError> {
    let request = intake(headers, raw_body)?;

    let registration = resolve(
        &config.webhooks,
        request.hook_id,
        request.repository_full_name(),
    )
    .ok_or_else(|| {
        warn!(
            event = %request.event_name,
            hook_id = request.hook_id,
            repository = request.repository_full_name().unwrap_or(""),
            "github_webhook_unknown"
        );
        WebhookError::UnknownWebhook {
            hook_id: request.hook_id,
        }
    })?;

    if !verify_github_signature(
        registration.secret.expose(),
        &request.raw_body,
        &request.signature,
    ) {
        warn!(
            event = %request.event_name,
            hook_id = request.hook_id,
            delivery_id = request.delivery_id.as_deref().unwrap_or(""),
            signature_length = request.signature.len(),
            has_prefix = request.signature.starts_with(SIGNATURE_PREFIX),
            "github_signature_mismatch"
        );
        return Err(WebhookError::SignatureMismatch);
    }

    Ok(dispatch(
        bus,
        &request.event_name,
        request.payload,
        request.delivery_id.as_deref(),
    ))
}

/// GitHub webhook endpoint.
///
/// Responds with a bare status: 200 dispatched, 400 malformed request,
/// 404 no matching registration, 403 bad signature.
pub async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, WebhookError> {
    handle_delivery(&state.config, state.bus.as_ref(), &headers, body)
        .map(|emitted| {
            debug!(emitted = emitted, "github_webhook_accepted");
            StatusCode::OK
        })
        .map_err(|e| {
            debug!(status = e.status().as_u16(), error = %e, "github_webhook_rejected");
            e
        })
}
