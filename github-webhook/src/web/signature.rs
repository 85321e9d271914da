//! GitHub webhook signature verification.
//!
//! GitHub signs the raw request body with HMAC-SHA256 keyed by the webhook
//! secret and sends the result as `X-Hub-Signature-256: sha256=<hex digest>`.
//! Reference: https://docs.github.com/en/webhooks/using-webhooks/validating-webhook-deliveries

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of the `X-Hub-Signature-256` header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Compute the signature header value for `body`: `sha256=<lowercase hex>`.
///
/// Returns `None` if the secret cannot be used as an HMAC key.
pub fn sign(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => {
            warn!("github_signature_invalid_key");
            return None;
        }
    };

    mac.update(body);

    Some(format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Verify a GitHub webhook signature over the raw body.
///
/// # Arguments
///
/// * `secret` - The secret of the resolved webhook registration
/// * `body` - The exact bytes received over the wire
/// * `signature` - The `X-Hub-Signature-256` header value
///
/// # Returns
///
/// `true` if `signature` equals `sha256=<hex(HMAC-SHA256(secret, body))>`.
/// Mismatches are not logged here; the caller has the request context.
pub fn verify_github_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    sign(secret, body).map_or(false, |expected| constant_time_compare(&expected, signature))
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
