//! # Webhook Delivery
//!
//! Outbound event notifications signed with HMAC-SHA256.
//!
//! The body is `{"event": <name>}` serialized as compact JSON with sorted
//! keys. The `X-Signature` header carries the lowercase hex HMAC of exactly
//! those bytes, keyed with the webhook's own secret or, when it has none,
//! the process-wide signing secret.

use std::time::Duration;

use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Signature";

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("failed to serialize payload: {0}")]
    Payload(String),
    #[error("request to webhook target failed: {0}")]
    Transport(String),
}

/// Canonical body bytes for an event notification.
pub fn event_body(event: &str) -> Result<Vec<u8>, DeliveryError> {
    // serde_json's default map is ordered, so keys come out sorted.
    serde_json::to_vec(&json!({ "event": event }))
        .map_err(|e| DeliveryError::Payload(e.to_string()))
}

/// Lowercase hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(body: &[u8], secret: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length.
        Err(_) => return String::new(),
    };
    mac.update(body);
    mac.finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Constant-time check of a presented signature.
pub fn verify(body: &[u8], secret: &str, signature: &str) -> bool {
    let expected = sign(body, secret);
    let provided = signature.trim().to_ascii_lowercase();
    if expected.is_empty() || provided.len() != expected.len() {
        return false;
    }
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Signs and sends webhook notifications.
#[derive(Clone)]
pub struct WebhookDispatcher {
    http: reqwest::Client,
    default_secret: Zeroizing<String>,
}

impl std::fmt::Debug for WebhookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookDispatcher")
            .field("default_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl WebhookDispatcher {
    pub fn new(
        timeout: Duration,
        default_secret: Zeroizing<String>,
    ) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Client(e.to_string()))?;
        Ok(Self {
            http,
            default_secret,
        })
    }

    /// POST a signed `event` notification to `url`, returning the target's
    /// HTTP status. Any status counts as delivered; only transport failures
    /// (connect, timeout) are errors.
    pub async fn deliver(
        &self,
        url: &str,
        event: &str,
        secret: Option<&str>,
    ) -> Result<u16, DeliveryError> {
        let body = event_body(event)?;
        let key = secret.unwrap_or(self.default_secret.as_str());
        let signature = sign(&body, key);

        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        Ok(response.status().as_u16())
    }
}
