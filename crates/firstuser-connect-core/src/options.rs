// Configuration for a FirstUser Connect instance.
//
// One `ConnectOptions` is built at startup and shared through the context.
// Durations are seconds; defaults follow the hosted platform's behavior
// (short-lived codes, 15s client heartbeats with a 3x timeout window).

use serde::{Deserialize, Serialize};

/// Top-level configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectOptions {
    /// Public base URL of the platform (used to build hosted join and
    /// widget URLs), e.g. `https://firstuser.app`.
    pub base_url: String,

    /// Base path the integration API is mounted under.
    pub base_path: String,

    /// Access code time-to-live in seconds. Minutes, not hours.
    pub access_code_ttl_secs: i64,

    /// Heartbeat interval clients are expected to tick at, in seconds.
    pub heartbeat_interval_secs: i64,

    /// Window after which a session with no heartbeat is considered stale
    /// and implicitly closed. Roughly 3x the client interval.
    pub heartbeat_timeout_secs: i64,

    /// Widget token time-to-live in seconds.
    pub widget_token_ttl_secs: i64,

    /// Webhook retry policy.
    pub webhook: WebhookOptions,
}

/// Webhook delivery/retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOptions {
    /// Maximum delivery attempts per logical event before the delivery is
    /// terminally failed.
    pub max_attempts: i64,

    /// Base backoff in seconds; attempt n retries after base * 2^(n-1).
    pub retry_base_secs: i64,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for WebhookOptions {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_base_secs: 30,
            request_timeout_secs: 10,
        }
    }
}

impl ConnectOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            base_path: "/api/integration/v1".to_string(),
            access_code_ttl_secs: 300,
            heartbeat_interval_secs: 15,
            heartbeat_timeout_secs: 45,
            widget_token_ttl_secs: 600,
            webhook: WebhookOptions::default(),
        }
    }

    /// Backoff delay in seconds before the given attempt number (1-based)
    /// is retried.
    pub fn webhook_backoff_secs(&self, attempt: i64) -> i64 {
        self.webhook.retry_base_secs * (1 << (attempt - 1).clamp(0, 16))
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::new("http://localhost:3000")
    }
}
