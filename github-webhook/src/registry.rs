//! Webhook registrations and request-to-registration resolution.
//!
//! A registration pairs a shared secret with a matching rule. Two rules exist:
//! - `ById`: the request's `x-github-hook-id` must equal the configured id
//! - `ByRepo`: the payload's `repository.full_name` must equal the configured
//!   repository, optionally pinned to a single hook id
//!
//! Registrations are loaded once at startup and never mutated. Duplicates are
//! allowed; the first match in configured order wins.

use std::fmt;

use serde::Deserialize;

use crate::config::ConfigError;

/// Shared webhook secret.
///
/// The `Debug` impl never prints the value so registrations can be logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Matching rule of a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookMatcher {
    /// Matches a single hook id.
    ById { id: u64 },
    /// Matches a repository, and additionally a hook id when one is given.
    ByRepo { repo: String, id: Option<u64> },
}

impl WebhookMatcher {
    /// Whether a request with this hook id and repository matches the rule.
    pub fn matches(&self, hook_id: u64, repo_full_name: Option<&str>) -> bool {
        match self {
            WebhookMatcher::ById { id } => *id == hook_id,
            WebhookMatcher::ByRepo { repo, id } => {
                repo_full_name == Some(repo.as_str()) && id.map_or(true, |id| id == hook_id)
            }
        }
    }
}

/// A configured webhook: matching rule plus the secret used to verify it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRegistration {
    pub matcher: WebhookMatcher,
    pub secret: Secret,
}

impl WebhookRegistration {
    pub fn by_id(id: u64, secret: impl Into<String>) -> Self {
        Self {
            matcher: WebhookMatcher::ById { id },
            secret: Secret::new(secret),
        }
    }

    pub fn by_repo(repo: impl Into<String>, id: Option<u64>, secret: impl Into<String>) -> Self {
        Self {
            matcher: WebhookMatcher::ByRepo {
                repo: repo.into(),
                id,
            },
            secret: Secret::new(secret),
        }
    }
}

/// Registration as written in configuration: `{ "id"?, "repo"?, "secret" }`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawRegistration {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub repo: Option<String>,
    pub secret: String,
}

impl RawRegistration {
    /// Validate and convert into a registration. `index` is the position in
    /// the configured list and is only used for error reporting.
    pub(crate) fn into_registration(self, index: usize) -> Result<WebhookRegistration, ConfigError> {
        if self.secret.trim().is_empty() {
            return Err(ConfigError::EmptySecret { index });
        }

        let matcher = match (self.repo, self.id) {
            (Some(repo), _) if repo.trim().is_empty() => {
                return Err(ConfigError::EmptyRepo { index })
            }
            (Some(repo), id) => WebhookMatcher::ByRepo { repo, id },
            (None, Some(id)) => WebhookMatcher::ById { id },
            (None, None) => return Err(ConfigError::MissingMatcher { index }),
        };

        Ok(WebhookRegistration {
            matcher,
            secret: Secret(self.secret),
        })
    }
}

/// Find the registration whose secret should authenticate the request.
pub fn resolve<'a>(
    registrations: &'a [WebhookRegistration],
    hook_id: u64,
    repo_full_name: Option<&str>,
) -> Option<&'a WebhookRegistration> {
    registrations
        .iter()
        .find(|registration| registration.matcher.matches(hook_id, repo_full_name))
}
