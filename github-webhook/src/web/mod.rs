//! HTTP surface: the GitHub webhook endpoint and a health check.

pub mod handlers;
pub mod intake;
pub mod signature;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use handlers::{github_webhook, handle_delivery, health, AppState, HealthResponse};
pub use intake::{intake, InboundRequest, WebhookHeaders};
pub use signature::{sign, verify_github_signature};

/// Build the router, mounting the webhook endpoint on the configured path.
pub fn router(state: AppState) -> Router {
    let path = state.config.path.clone();

    Router::new()
        .route("/health", get(health))
        .route(&path, post(github_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
