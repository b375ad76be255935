//! # FirstUser Connect client SDK
//!
//! Partner-side SDK for the FirstUser integration protocol. The client
//! talks to the *partner's own backend* — which holds the server-to-server
//! API key and proxies to the platform — so no secret ever lives in this
//! crate or in the process embedding it.
//!
//! Every runtime binding of the SDK (web, React Native, Expo, Capacitor,
//! Next.js, Nuxt, Vue, Angular) implements this same contract; this crate
//! is the Rust binding and the reference for the others.
//!
//! ```rust,no_run
//! use firstuser_connect_client::{ClientOptions, ConnectClient, PresenceSink};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), firstuser_connect_client::ClientError> {
//!     let client = ConnectClient::new(ClientOptions {
//!         base_url: "https://partner.example".into(),
//!         ..Default::default()
//!     });
//!
//!     // Redeem the code from the join-flow redirect
//!     let access = client
//!         .exchange_access_code("XYZ", "ext_1")
//!         .await?;
//!     println!("linked as {}", access.linked_identity.firstuser_user_id);
//!
//!     // Start the recurring heartbeat
//!     client.start_presence(PresenceSink::auto("ext_1")).await;
//!     Ok(())
//! }
//! ```

mod error;
mod presence;
mod types;
mod widget;

pub use error::ClientError;
pub use presence::{PresenceSink, PresenceTickResult};
pub use types::*;
pub use widget::HostedChatWidget;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

// ─── Client Options ────────────────────────────────────────────────

/// Configuration for the Connect client.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL of the partner backend (e.g. `https://partner.example`).
    pub base_url: String,

    /// Base path the partner backend proxies under (default:
    /// `/api/firstuser`).
    pub base_path: String,

    /// Interval between presence heartbeats (default: 15s).
    pub heartbeat_interval: Duration,

    /// HTTP request timeout (default: 30s).
    pub timeout: Duration,

    /// Reported client platform (default: `"rust"`; the web binding sends
    /// `"web"`, the React Native binding `"react-native"`, and so on).
    pub client_platform: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            base_path: "/api/firstuser".to_string(),
            heartbeat_interval: Duration::from_secs(15),
            timeout: Duration::from_secs(30),
            client_platform: "rust".to_string(),
        }
    }
}

// ─── Client ────────────────────────────────────────────────────────

/// Async client for the partner backend's FirstUser proxy endpoints.
///
/// Cloning is cheap and clones share the presence timer: `start_presence`
/// on any clone replaces the running loop, `stop_presence` cancels it.
#[derive(Clone)]
pub struct ConnectClient {
    http: reqwest::Client,
    base_url: String,
    options: ClientOptions,
    presence_task: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
    presence_state: Arc<RwLock<PresenceState>>,
}

impl ConnectClient {
    pub fn new(options: ClientOptions) -> Self {
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let base_url = format!(
            "{}{}",
            options.base_url.trim_end_matches('/'),
            options.base_path
        );

        Self {
            http,
            base_url,
            options,
            presence_task: Arc::new(Mutex::new(None)),
            presence_state: Arc::new(RwLock::new(PresenceState::Live)),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// The full base URL (base_url + base_path).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ─── Internal helpers ───────────────────────────────────────────

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let resp = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(ClientError::network)?;

        Self::handle_response(resp).await
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = resp.status();

        if status.is_success() {
            let body = resp.text().await.map_err(ClientError::network)?;
            return serde_json::from_str(&body).map_err(|e| {
                ClientError::Deserialization(format!("failed to deserialize response: {e}"))
            });
        }

        let body = resp.text().await.unwrap_or_else(|_| "Unknown error".into());
        let detail = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                let err = v.get("error")?;
                Some((
                    err.get("code")?.as_str()?.to_string(),
                    err.get("message")?.as_str()?.to_string(),
                ))
            });
        let (code, message) = detail.unwrap_or_else(|| ("UNKNOWN".into(), body));

        Err(match status.as_u16() {
            400 => ClientError::BadRequest { code, message },
            401 => ClientError::Unauthorized { message },
            404 => ClientError::NotFound { message },
            409 => ClientError::Conflict { code, message },
            410 => ClientError::Gone { message },
            s => ClientError::Server { status: s, message },
        })
    }

    // ─── Endpoint wrappers ──────────────────────────────────────────

    /// Begin the embedded waitlist flow. The returned continuation URL is
    /// where the partner UI sends the user.
    pub async fn start_embedded_waitlist(
        &self,
        request: StartEmbeddedWaitlistRequest,
    ) -> Result<StartEmbeddedWaitlistResponse, ClientError> {
        self.post("/waitlist/start", &request).await
    }

    /// Exchange the one-time code from the join-flow redirect for an
    /// identity link and membership snapshot.
    pub async fn exchange_access_code(
        &self,
        code: &str,
        external_user_id: &str,
    ) -> Result<ExchangeAccessCodeResponse, ClientError> {
        self.post(
            "/access/exchange",
            &ExchangeAccessCodeRequest {
                code: code.to_string(),
                external_user_id: external_user_id.to_string(),
                client_platform: Some(self.options.client_platform.clone()),
            },
        )
        .await
    }

    /// Send a single heartbeat.
    pub async fn send_heartbeat(
        &self,
        external_user_id: &str,
        status: PresenceState,
    ) -> Result<HeartbeatResponse, ClientError> {
        self.post(
            "/usage/heartbeat",
            &HeartbeatRequest {
                external_user_id: external_user_id.to_string(),
                status,
                client_platform: Some(self.options.client_platform.clone()),
            },
        )
        .await
    }

    /// Sync the user's plan tier.
    pub async fn set_plan_tier(
        &self,
        external_user_id: &str,
        plan_tier: &str,
    ) -> Result<SetPlanTierResponse, ClientError> {
        self.post(
            &format!("/users/{external_user_id}/plan"),
            &SetPlanTierRequest {
                plan_tier: plan_tier.to_string(),
            },
        )
        .await
    }

    /// Fetch a short-lived hosted chat widget URL.
    pub async fn get_hosted_chat_widget_token(
        &self,
        external_user_id: &str,
    ) -> Result<WidgetTokenResponse, ClientError> {
        self.post(
            "/chat/widget-token",
            &WidgetTokenRequest {
                external_user_id: external_user_id.to_string(),
            },
        )
        .await
    }

    /// Fetch a widget token and wrap it for embedding. The iframe is
    /// sandboxed and the URL is platform-signed — the API key is never
    /// part of it.
    pub async fn hosted_chat_widget(
        &self,
        external_user_id: &str,
    ) -> Result<HostedChatWidget, ClientError> {
        let token = self.get_hosted_chat_widget_token(external_user_id).await?;
        Ok(HostedChatWidget::new(token.widget_url))
    }
}

impl std::fmt::Debug for ConnectClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = ClientOptions::default();
        assert_eq!(opts.base_path, "/api/firstuser");
        assert_eq!(opts.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(opts.client_platform, "rust");
    }

    #[test]
    fn test_url_building() {
        let client = ConnectClient::new(ClientOptions {
            base_url: "https://partner.example/".into(),
            ..Default::default()
        });
        assert_eq!(client.base_url(), "https://partner.example/api/firstuser");
        assert_eq!(
            client.url("/usage/heartbeat"),
            "https://partner.example/api/firstuser/usage/heartbeat"
        );
    }

    #[test]
    fn test_custom_base_path() {
        let client = ConnectClient::new(ClientOptions {
            base_url: "https://partner.example".into(),
            base_path: "/proxy/fu".into(),
            ..Default::default()
        });
        assert_eq!(client.base_url(), "https://partner.example/proxy/fu");
    }
}
