// Typed records for every integration table.
//
// Models serialize to camelCase JSON at the adapter boundary. Dynamic data
// that the platform stores as text columns elsewhere (allowed origins,
// webhook payloads) is typed here and validated at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::id::generate_id;

/// One partner integration. Created by a platform admin; the id is
/// immutable, config fields are mutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationApp {
    pub id: String,
    /// The FirstUser space (community) this integration belongs to.
    pub space_id: String,
    /// Browser-facing identifier used in the hosted join URL.
    pub public_app_id: String,
    pub name: String,
    /// Whether the hosted (redirect) join flow is enabled.
    pub redirect_enabled: bool,
    /// Whether the embedded waitlist flow is enabled.
    pub embedded_enabled: bool,
    /// Origins allowed as `returnTo` targets and widget embedders.
    pub allowed_origins: Vec<String>,
    /// Partner endpoint for signed webhook deliveries, if configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    /// Secret used to HMAC-sign webhook payloads and widget URLs.
    pub signing_secret: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IntegrationApp {
    pub fn new(space_id: &str, public_app_id: &str, name: &str, signing_secret: &str) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            space_id: space_id.to_string(),
            public_app_id: public_app_id.to_string(),
            name: name.to_string(),
            redirect_enabled: true,
            embedded_enabled: true,
            allowed_origins: Vec::new(),
            webhook_url: None,
            signing_secret: signing_secret.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Server-to-server credential for one integration app.
///
/// The secret is never stored — only its hash. A key with a non-null
/// `revoked_at` must never authenticate; revoked keys are kept for audit.
/// Multiple keys may be active at once to support rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationApiKey {
    pub id: String,
    pub integration_app_id: String,
    /// Public, stable key identifier (the part before the dot).
    pub key_id: String,
    /// SHA-256 hex of the secret.
    pub secret_hash: String,
    /// Last four characters of the secret, for display only.
    pub last_four: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Durable 1:1 mapping between a partner's external user id and a FirstUser
/// user id, scoped per integration app. Both directions are unique; links
/// are never deleted so historical linkage stays traceable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationIdentityLink {
    pub id: String,
    pub integration_app_id: String,
    pub external_user_id: String,
    pub firstuser_user_id: String,
    /// Partner-synced plan tier.
    pub current_plan_tier: PlanTier,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Plan tiers a partner can sync onto a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Mid,
    Pro,
}

impl Default for PlanTier {
    fn default() -> Self {
        Self::Free
    }
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Mid => "mid",
            Self::Pro => "pro",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Self::Free),
            "mid" => Some(Self::Mid),
            "pro" => Some(Self::Pro),
            _ => None,
        }
    }
}

/// Lifecycle of a one-time access code.
///
/// Transitions are issued→redeemed and issued→expired only; redeemed is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessCodeStatus {
    Issued,
    Redeemed,
    Expired,
}

impl AccessCodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issued => "issued",
            Self::Redeemed => "redeemed",
            Self::Expired => "expired",
        }
    }
}

/// One-time code proving a just-completed join flow.
///
/// Only the SHA-256 hex hash is persisted; the raw code is returned to the
/// issuing caller exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationAccessCode {
    pub id: String,
    pub integration_app_id: String,
    pub firstuser_user_id: String,
    pub space_id: String,
    pub code_hash: String,
    pub status: AccessCodeStatus,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redeemed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Presence signal carried by a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Live,
    Idle,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Idle => "idle",
            Self::Offline => "offline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "live" => Some(Self::Live),
            "idle" => Some(Self::Idle),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }
}

/// Coarse liveness record for one linked user.
///
/// Only the latest unterminated row is treated as the current session;
/// stale rows are closed by the read-time recency check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationUsageSession {
    pub id: String,
    pub integration_app_id: String,
    pub external_user_id: String,
    pub firstuser_user_id: String,
    /// Membership snapshot taken when the session opened.
    pub membership_status: MembershipStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_platform: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
}

/// Delivery state of one webhook attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

/// One webhook delivery attempt. One row per attempt (not per logical
/// event), so the full delivery history is auditable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationWebhookDelivery {
    pub id: String,
    pub integration_app_id: String,
    pub event_type: String,
    /// The exact signed body string. Stored verbatim because the signature
    /// covers raw bytes.
    pub payload: String,
    pub signature: String,
    /// 1-based attempt counter.
    pub attempt: i64,
    pub status: DeliveryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Waitlist state of a platform user, as seen by partners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Pending,
    Approved,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
        }
    }
}

/// The integration layer's view of a platform user. The waitlist CRUD owns
/// everything else about users; this is the membership snapshot partners
/// receive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstuserUser {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub membership_status: MembershipStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge_tier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FirstuserUser {
    pub fn new(email: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            email: email.map(|e| e.to_lowercase()),
            display_name: None,
            membership_status: MembershipStatus::Pending,
            badge_tier: None,
            created_at: now,
            updated_at: now,
        }
    }
}
