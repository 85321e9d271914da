//! Configuration module for environment variable parsing.
//!
//! Configuration is read once at startup and is immutable afterwards.

use std::env;
use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

use crate::registry::{RawRegistration, WebhookRegistration};

/// Default POST path of the webhook endpoint.
pub const DEFAULT_WEBHOOK_PATH: &str = "/github/webhook";

/// Default RabbitMQ exchange events are forwarded to.
pub const DEFAULT_AMQP_EXCHANGE: &str = "github";

/// Errors raised while loading configuration.
///
/// Secrets are never included in messages.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("neither GITHUB_WEBHOOKS nor GITHUB_WEBHOOKS_FILE is set")]
    MissingWebhooks,

    #[error("failed to read webhooks file {path}: {source}")]
    ReadWebhooksFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("webhook list is not valid JSON: {0}")]
    InvalidWebhooksJson(#[from] serde_json::Error),

    #[error("webhook #{index} has an empty secret")]
    EmptySecret { index: usize },

    #[error("webhook #{index} has an empty repo")]
    EmptyRepo { index: usize },

    #[error("webhook #{index} needs at least one of `id` or `repo`")]
    MissingMatcher { index: usize },

    #[error("invalid WEBHOOK_PATH {0:?}: must start with '/' and not be /health")]
    InvalidPath(String),

    #[error("invalid PORT {0:?}")]
    InvalidPort(String),
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Path the webhook endpoint is mounted on
    pub path: String,

    /// Registered webhooks, in configured order
    pub webhooks: Vec<WebhookRegistration>,

    /// RabbitMQ connection URL; forwarding is disabled when unset
    pub cloudamqp_url: Option<String>,

    /// Topic exchange used when forwarding to RabbitMQ
    pub amqp_exchange: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup("PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidPort(raw))?,
            None => 8080,
        };

        let path = lookup("WEBHOOK_PATH").unwrap_or_else(|| DEFAULT_WEBHOOK_PATH.to_string());
        if !path.starts_with('/') || path == "/health" {
            return Err(ConfigError::InvalidPath(path));
        }

        let webhooks = match (lookup("GITHUB_WEBHOOKS"), lookup("GITHUB_WEBHOOKS_FILE")) {
            (Some(json), _) => parse_registrations(&json)?,
            (None, Some(file)) => {
                let path = PathBuf::from(file);
                let json = fs::read_to_string(&path)
                    .map_err(|source| ConfigError::ReadWebhooksFile { path, source })?;
                parse_registrations(&json)?
            }
            (None, None) => return Err(ConfigError::MissingWebhooks),
        };

        if webhooks.is_empty() {
            warn!("no_webhooks_registered");
        }

        Ok(Config {
            port,
            path,
            webhooks,
            cloudamqp_url: lookup("CLOUDAMQP_URL").filter(|url| !url.trim().is_empty()),
            amqp_exchange: lookup("AMQP_EXCHANGE")
                .unwrap_or_else(|| DEFAULT_AMQP_EXCHANGE.to_string()),
        })
    }
}

/// Parse a JSON array of `{ "id"?, "repo"?, "secret" }` registrations.
pub fn parse_registrations(json: &str) -> Result<Vec<WebhookRegistration>, ConfigError> {
    let raw: Vec<RawRegistration> = serde_json::from_str(json)?;

    raw.into_iter()
        .enumerate()
        .map(|(index, registration)| registration.into_registration(index))
        .collect()
}
