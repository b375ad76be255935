// Typed storage operations built on top of the raw Adapter trait.
//
// Every query that serves a partner request is scoped by integrationAppId,
// which is what enforces cross-app isolation after key authentication.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;

use firstuser_connect_core::db::adapter::{Adapter, FindManyQuery, SortBy, WhereClause};
use firstuser_connect_core::db::models::{
    AccessCodeStatus, DeliveryStatus, FirstuserUser, IntegrationAccessCode, IntegrationApiKey,
    IntegrationApp, IntegrationIdentityLink, IntegrationUsageSession, IntegrationWebhookDelivery,
    PlanTier,
};
use firstuser_connect_core::db::schema::{
    ACCESS_CODE_TABLE, API_KEY_TABLE, APP_TABLE, IDENTITY_LINK_TABLE, USAGE_SESSION_TABLE,
    USER_TABLE, WEBHOOK_DELIVERY_TABLE,
};
use firstuser_connect_core::error::{ConnectError, Result};

/// Typed store over a storage adapter.
#[derive(Clone)]
pub struct ConnectStore {
    adapter: Arc<dyn Adapter>,
}

impl std::fmt::Debug for ConnectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectStore").finish()
    }
}

fn to_value<T: Serialize>(record: &T) -> Result<serde_json::Value> {
    serde_json::to_value(record).map_err(|e| ConnectError::Database(e.to_string()))
}

fn from_value<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ConnectError::Database(e.to_string()))
}

fn from_opt<T: DeserializeOwned>(value: Option<serde_json::Value>) -> Result<Option<T>> {
    value.map(from_value).transpose()
}

impl ConnectStore {
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &Arc<dyn Adapter> {
        &self.adapter
    }

    // ─── Integration apps ────────────────────────────────────────

    pub async fn create_app(&self, app: &IntegrationApp) -> Result<IntegrationApp> {
        from_value(self.adapter.create(APP_TABLE, to_value(app)?).await?)
    }

    pub async fn find_app_by_id(&self, id: &str) -> Result<Option<IntegrationApp>> {
        from_opt(
            self.adapter
                .find_one(APP_TABLE, &[WhereClause::eq("id", id)])
                .await?,
        )
    }

    pub async fn find_app_by_public_id(&self, public_app_id: &str) -> Result<Option<IntegrationApp>> {
        from_opt(
            self.adapter
                .find_one(APP_TABLE, &[WhereClause::eq("publicAppId", public_app_id)])
                .await?,
        )
    }

    // ─── Platform users ──────────────────────────────────────────

    pub async fn create_user(&self, user: &FirstuserUser) -> Result<FirstuserUser> {
        from_value(self.adapter.create(USER_TABLE, to_value(user)?).await?)
    }

    pub async fn find_user_by_id(&self, id: &str) -> Result<Option<FirstuserUser>> {
        from_opt(
            self.adapter
                .find_one(USER_TABLE, &[WhereClause::eq("id", id)])
                .await?,
        )
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<FirstuserUser>> {
        from_opt(
            self.adapter
                .find_one(USER_TABLE, &[WhereClause::eq("email", email.to_lowercase())])
                .await?,
        )
    }

    pub async fn update_user_membership(
        &self,
        user_id: &str,
        status: &str,
    ) -> Result<Option<FirstuserUser>> {
        from_opt(
            self.adapter
                .update(
                    USER_TABLE,
                    &[WhereClause::eq("id", user_id)],
                    json!({"membershipStatus": status, "updatedAt": Utc::now()}),
                )
                .await?,
        )
    }

    // ─── API keys ────────────────────────────────────────────────

    pub async fn create_api_key(&self, key: &IntegrationApiKey) -> Result<IntegrationApiKey> {
        from_value(self.adapter.create(API_KEY_TABLE, to_value(key)?).await?)
    }

    pub async fn find_api_key_by_key_id(&self, key_id: &str) -> Result<Option<IntegrationApiKey>> {
        from_opt(
            self.adapter
                .find_one(API_KEY_TABLE, &[WhereClause::eq("keyId", key_id)])
                .await?,
        )
    }

    /// Set `revokedAt` on a key. Returns the updated record, `None` if the
    /// key does not exist. Keys are never deleted.
    pub async fn revoke_api_key(&self, key_id: &str) -> Result<Option<IntegrationApiKey>> {
        from_opt(
            self.adapter
                .update(
                    API_KEY_TABLE,
                    &[WhereClause::eq("keyId", key_id)],
                    json!({"revokedAt": Utc::now()}),
                )
                .await?,
        )
    }

    pub async fn list_api_keys(&self, integration_app_id: &str) -> Result<Vec<IntegrationApiKey>> {
        let rows = self
            .adapter
            .find_many(
                API_KEY_TABLE,
                FindManyQuery {
                    where_clauses: vec![WhereClause::eq("integrationAppId", integration_app_id)],
                    sort_by: Some(SortBy::asc("createdAt")),
                    ..Default::default()
                },
            )
            .await?;
        rows.into_iter().map(from_value).collect()
    }

    // ─── Identity links ──────────────────────────────────────────

    pub async fn create_link(
        &self,
        link: &IntegrationIdentityLink,
    ) -> Result<IntegrationIdentityLink> {
        from_value(self.adapter.create(IDENTITY_LINK_TABLE, to_value(link)?).await?)
    }

    pub async fn find_link_by_external(
        &self,
        integration_app_id: &str,
        external_user_id: &str,
    ) -> Result<Option<IntegrationIdentityLink>> {
        from_opt(
            self.adapter
                .find_one(
                    IDENTITY_LINK_TABLE,
                    &[
                        WhereClause::eq("integrationAppId", integration_app_id),
                        WhereClause::eq("externalUserId", external_user_id),
                    ],
                )
                .await?,
        )
    }

    pub async fn find_link_by_user(
        &self,
        integration_app_id: &str,
        firstuser_user_id: &str,
    ) -> Result<Option<IntegrationIdentityLink>> {
        from_opt(
            self.adapter
                .find_one(
                    IDENTITY_LINK_TABLE,
                    &[
                        WhereClause::eq("integrationAppId", integration_app_id),
                        WhereClause::eq("firstuserUserId", firstuser_user_id),
                    ],
                )
                .await?,
        )
    }

    /// Every link a platform user has, across all integration apps.
    pub async fn find_links_for_user(
        &self,
        firstuser_user_id: &str,
    ) -> Result<Vec<IntegrationIdentityLink>> {
        let rows = self
            .adapter
            .find_many(
                IDENTITY_LINK_TABLE,
                FindManyQuery {
                    where_clauses: vec![WhereClause::eq("firstuserUserId", firstuser_user_id)],
                    ..Default::default()
                },
            )
            .await?;
        rows.into_iter().map(from_value).collect()
    }

    pub async fn update_link_plan(
        &self,
        link_id: &str,
        tier: PlanTier,
    ) -> Result<Option<IntegrationIdentityLink>> {
        from_opt(
            self.adapter
                .update(
                    IDENTITY_LINK_TABLE,
                    &[WhereClause::eq("id", link_id)],
                    json!({"currentPlanTier": tier.as_str(), "updatedAt": Utc::now()}),
                )
                .await?,
        )
    }

    // ─── Access codes ────────────────────────────────────────────

    pub async fn create_access_code(
        &self,
        code: &IntegrationAccessCode,
    ) -> Result<IntegrationAccessCode> {
        from_value(self.adapter.create(ACCESS_CODE_TABLE, to_value(code)?).await?)
    }

    pub async fn find_code_by_hash(
        &self,
        integration_app_id: &str,
        code_hash: &str,
    ) -> Result<Option<IntegrationAccessCode>> {
        from_opt(
            self.adapter
                .find_one(
                    ACCESS_CODE_TABLE,
                    &[
                        WhereClause::eq("integrationAppId", integration_app_id),
                        WhereClause::eq("codeHash", code_hash),
                    ],
                )
                .await?,
        )
    }

    /// Compare-and-swap the status of an access code. The update only
    /// applies if the row's current status equals `from`; `None` means the
    /// swap lost (someone else transitioned the row first).
    pub async fn cas_code_status(
        &self,
        code_hash: &str,
        from: AccessCodeStatus,
        to: AccessCodeStatus,
        redeemed_at: Option<DateTime<Utc>>,
    ) -> Result<Option<IntegrationAccessCode>> {
        let mut patch = json!({"status": to.as_str()});
        if let Some(at) = redeemed_at {
            patch["redeemedAt"] = json!(at);
        }
        from_opt(
            self.adapter
                .update(
                    ACCESS_CODE_TABLE,
                    &[
                        WhereClause::eq("codeHash", code_hash),
                        WhereClause::eq("status", from.as_str()),
                    ],
                    patch,
                )
                .await?,
        )
    }

    // ─── Usage sessions ──────────────────────────────────────────

    pub async fn create_session(
        &self,
        session: &IntegrationUsageSession,
    ) -> Result<IntegrationUsageSession> {
        from_value(
            self.adapter
                .create(USAGE_SESSION_TABLE, to_value(session)?)
                .await?,
        )
    }

    /// The latest unterminated session for a link, if any.
    pub async fn find_open_session(
        &self,
        integration_app_id: &str,
        external_user_id: &str,
    ) -> Result<Option<IntegrationUsageSession>> {
        let rows = self
            .adapter
            .find_many(
                USAGE_SESSION_TABLE,
                FindManyQuery {
                    where_clauses: vec![
                        WhereClause::eq("integrationAppId", integration_app_id),
                        WhereClause::eq("externalUserId", external_user_id),
                        WhereClause::is_null("endedAt"),
                    ],
                    sort_by: Some(SortBy::desc("startedAt")),
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .await?;
        rows.into_iter().next().map(from_value).transpose()
    }

    pub async fn touch_session(
        &self,
        session_id: &str,
        last_seen_at: DateTime<Utc>,
    ) -> Result<Option<IntegrationUsageSession>> {
        from_opt(
            self.adapter
                .update(
                    USAGE_SESSION_TABLE,
                    &[WhereClause::eq("id", session_id)],
                    json!({"lastSeenAt": last_seen_at}),
                )
                .await?,
        )
    }

    pub async fn close_session(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
        duration_seconds: i64,
    ) -> Result<Option<IntegrationUsageSession>> {
        from_opt(
            self.adapter
                .update(
                    USAGE_SESSION_TABLE,
                    &[WhereClause::eq("id", session_id), WhereClause::is_null("endedAt")],
                    json!({"endedAt": ended_at, "durationSeconds": duration_seconds}),
                )
                .await?,
        )
    }

    /// Open sessions whose last heartbeat is older than `cutoff`.
    pub async fn find_stale_sessions(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<IntegrationUsageSession>> {
        let rows = self
            .adapter
            .find_many(
                USAGE_SESSION_TABLE,
                FindManyQuery {
                    where_clauses: vec![
                        WhereClause::is_null("endedAt"),
                        WhereClause::lt("lastSeenAt", json!(cutoff)),
                    ],
                    ..Default::default()
                },
            )
            .await?;
        rows.into_iter().map(from_value).collect()
    }

    // ─── Webhook deliveries ──────────────────────────────────────

    pub async fn create_delivery(
        &self,
        delivery: &IntegrationWebhookDelivery,
    ) -> Result<IntegrationWebhookDelivery> {
        from_value(
            self.adapter
                .create(WEBHOOK_DELIVERY_TABLE, to_value(delivery)?)
                .await?,
        )
    }

    /// Pending deliveries due at or before `now`, oldest first.
    pub async fn due_deliveries(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<IntegrationWebhookDelivery>> {
        let rows = self
            .adapter
            .find_many(
                WEBHOOK_DELIVERY_TABLE,
                FindManyQuery {
                    where_clauses: vec![
                        WhereClause::eq("status", DeliveryStatus::Pending.as_str()),
                        WhereClause::lte("nextRetryAt", json!(now)),
                    ],
                    sort_by: Some(SortBy::asc("nextRetryAt")),
                    limit: Some(limit),
                    ..Default::default()
                },
            )
            .await?;
        rows.into_iter().map(from_value).collect()
    }

    /// Claim a pending delivery for sending (CAS pending→status). `None`
    /// means another worker claimed it first.
    pub async fn mark_delivery(
        &self,
        delivery_id: &str,
        status: DeliveryStatus,
    ) -> Result<Option<IntegrationWebhookDelivery>> {
        from_opt(
            self.adapter
                .update(
                    WEBHOOK_DELIVERY_TABLE,
                    &[
                        WhereClause::eq("id", delivery_id),
                        WhereClause::eq("status", DeliveryStatus::Pending.as_str()),
                    ],
                    json!({"status": status.as_str(), "nextRetryAt": null, "updatedAt": Utc::now()}),
                )
                .await?,
        )
    }

    /// Full delivery history for an app, newest first.
    pub async fn deliveries_for_app(
        &self,
        integration_app_id: &str,
    ) -> Result<Vec<IntegrationWebhookDelivery>> {
        let rows = self
            .adapter
            .find_many(
                WEBHOOK_DELIVERY_TABLE,
                FindManyQuery {
                    where_clauses: vec![WhereClause::eq("integrationAppId", integration_app_id)],
                    sort_by: Some(SortBy::desc("createdAt")),
                    ..Default::default()
                },
            )
            .await?;
        rows.into_iter().map(from_value).collect()
    }
}
