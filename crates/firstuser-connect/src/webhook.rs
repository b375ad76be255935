// Webhook dispatch: signed, retried, audited notifications to partners.
//
// `dispatch` signs the payload and enqueues an attempt-1 row; `deliver_due`
// sends whatever is due and schedules follow-up attempts with exponential
// backoff until the attempt cap, after which the delivery is terminally
// failed and visible in the delivery log. Payloads are self-describing
// (full state, not diffs) because deliveries may arrive out of order.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use firstuser_connect_core::db::models::{
    DeliveryStatus, IntegrationApp, IntegrationWebhookDelivery,
};
use firstuser_connect_core::error::Result;
use firstuser_connect_core::utils::id::generate_id;

use crate::context::ConnectContext;
use crate::crypto::{make_signature, verify_signature as verify_hmac};

/// Header carrying the HMAC-SHA256 hex signature.
pub const SIGNATURE_HEADER: &str = "x-firstuser-signature-sha256";
/// Deprecated header, still sent (same value) for receivers that have not
/// migrated.
pub const LEGACY_SIGNATURE_HEADER: &str = "x-firstuser-signature";

/// Events the platform pushes to partners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEvent {
    #[serde(rename = "access.granted")]
    AccessGranted,
    #[serde(rename = "membership.updated")]
    MembershipUpdated,
    #[serde(rename = "plan.updated")]
    PlanUpdated,
    #[serde(rename = "presence.ended")]
    PresenceEnded,
}

impl WebhookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessGranted => "access.granted",
            Self::MembershipUpdated => "membership.updated",
            Self::PlanUpdated => "plan.updated",
            Self::PresenceEnded => "presence.ended",
        }
    }
}

/// Serialize the wire body `{type, data}`. The exact string is stored and
/// signed; receivers must verify against the raw bytes they read.
pub fn build_payload(event: WebhookEvent, data: &serde_json::Value) -> Result<String> {
    serde_json::to_string(&serde_json::json!({
        "type": event.as_str(),
        "data": data,
    }))
    .map_err(|e| firstuser_connect_core::error::ConnectError::Database(e.to_string()))
}

/// Sign a payload and enqueue the first delivery attempt. Returns `None`
/// when the app has no webhook URL configured.
pub async fn dispatch(
    ctx: &ConnectContext,
    app: &IntegrationApp,
    event: WebhookEvent,
    data: serde_json::Value,
) -> Result<Option<String>> {
    if app.webhook_url.is_none() {
        return Ok(None);
    }

    let payload = build_payload(event, &data)?;
    let signature = make_signature(payload.as_bytes(), &app.signing_secret)?;

    let now = Utc::now();
    let delivery = IntegrationWebhookDelivery {
        id: generate_id(),
        integration_app_id: app.id.clone(),
        event_type: event.as_str().to_string(),
        payload,
        signature,
        attempt: 1,
        status: DeliveryStatus::Pending,
        next_retry_at: Some(now),
        created_at: now,
        updated_at: now,
    };
    let created = ctx.store.create_delivery(&delivery).await?;

    ctx.logger.debug(&format!(
        "queued webhook {} delivery {} for app {}",
        event.as_str(),
        created.id,
        app.id
    ));
    Ok(Some(created.id))
}

/// Send every pending delivery due at or before `now`. Returns the number
/// of attempts performed.
pub async fn deliver_due(
    ctx: &ConnectContext,
    http: &reqwest::Client,
    now: DateTime<Utc>,
) -> Result<usize> {
    let due = ctx.store.due_deliveries(now, 50).await?;
    let mut attempted = 0;

    for delivery in due {
        let Some(app) = ctx.store.find_app_by_id(&delivery.integration_app_id).await? else {
            ctx.store
                .mark_delivery(&delivery.id, DeliveryStatus::Failed)
                .await?;
            continue;
        };
        let Some(url) = app.webhook_url.clone() else {
            ctx.store
                .mark_delivery(&delivery.id, DeliveryStatus::Failed)
                .await?;
            continue;
        };

        attempted += 1;
        let ok = send_attempt(http, &url, &delivery).await;

        if ok {
            ctx.store
                .mark_delivery(&delivery.id, DeliveryStatus::Delivered)
                .await?;
            continue;
        }

        // This attempt failed; schedule the next one unless the cap is hit.
        ctx.store
            .mark_delivery(&delivery.id, DeliveryStatus::Failed)
            .await?;

        if delivery.attempt < ctx.options.webhook.max_attempts {
            let backoff = ctx.options.webhook_backoff_secs(delivery.attempt);
            let retry = IntegrationWebhookDelivery {
                id: generate_id(),
                attempt: delivery.attempt + 1,
                status: DeliveryStatus::Pending,
                next_retry_at: Some(now + Duration::seconds(backoff)),
                created_at: Utc::now(),
                updated_at: Utc::now(),
                ..delivery.clone()
            };
            ctx.store.create_delivery(&retry).await?;
            ctx.logger.warn(&format!(
                "webhook delivery {} failed (attempt {}), retrying in {}s",
                delivery.id, delivery.attempt, backoff
            ));
        } else {
            ctx.logger.error(&format!(
                "webhook delivery {} failed terminally after {} attempts",
                delivery.id, delivery.attempt
            ));
        }
    }

    Ok(attempted)
}

/// One HTTP POST. Any non-2xx response or transport error counts as a
/// failed attempt.
async fn send_attempt(
    http: &reqwest::Client,
    url: &str,
    delivery: &IntegrationWebhookDelivery,
) -> bool {
    let result = http
        .post(url)
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, &delivery.signature)
        .header(LEGACY_SIGNATURE_HEADER, &delivery.signature)
        .body(delivery.payload.clone())
        .send()
        .await;

    match result {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

/// Receiver-side verification, constant-time. The signature may come from
/// either header. Receivers must reject a bad signature with 401 before
/// trusting the payload.
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    verify_hmac(payload, secret, signature).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use firstuser_connect_core::db::schema::integration_schema;
    use firstuser_connect_core::options::ConnectOptions;
    use firstuser_connect_memory::MemoryAdapter;

    use crate::context::ConnectContext;

    fn test_ctx() -> Arc<ConnectContext> {
        let adapter = Arc::new(MemoryAdapter::new(integration_schema()));
        ConnectContext::new(ConnectOptions::default(), adapter)
    }

    fn app_with_webhook(url: Option<&str>) -> IntegrationApp {
        let mut app = IntegrationApp::new("space_1", "pub_1", "Acme", "whsec_1");
        app.webhook_url = url.map(|u| u.to_string());
        app
    }

    #[test]
    fn test_event_names() {
        assert_eq!(WebhookEvent::AccessGranted.as_str(), "access.granted");
        assert_eq!(WebhookEvent::MembershipUpdated.as_str(), "membership.updated");
        assert_eq!(WebhookEvent::PlanUpdated.as_str(), "plan.updated");
        assert_eq!(WebhookEvent::PresenceEnded.as_str(), "presence.ended");
    }

    #[test]
    fn test_payload_shape() {
        let payload = build_payload(
            WebhookEvent::AccessGranted,
            &serde_json::json!({"externalUserId": "ext_1"}),
        )
        .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed["type"], "access.granted");
        assert_eq!(parsed["data"]["externalUserId"], "ext_1");
    }

    #[test]
    fn test_signature_round_trip() {
        let payload = build_payload(WebhookEvent::PlanUpdated, &serde_json::json!({"planTier": "pro"})).unwrap();
        let sig = make_signature(payload.as_bytes(), "whsec_1").unwrap();
        assert!(verify_signature(payload.as_bytes(), &sig, "whsec_1"));
        assert!(!verify_signature(payload.as_bytes(), &sig, "whsec_other"));

        let mut tampered = payload.into_bytes();
        tampered[5] ^= 1;
        assert!(!verify_signature(&tampered, &sig, "whsec_1"));
    }

    #[tokio::test]
    async fn test_dispatch_skips_apps_without_url() {
        let ctx = test_ctx();
        let app = ctx.store.create_app(&app_with_webhook(None)).await.unwrap();
        let id = dispatch(&ctx, &app, WebhookEvent::AccessGranted, serde_json::json!({}))
            .await
            .unwrap();
        assert!(id.is_none());
        assert!(ctx.store.deliveries_for_app(&app.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_enqueues_signed_pending_row() {
        let ctx = test_ctx();
        let app = ctx
            .store
            .create_app(&app_with_webhook(Some("http://partner.test/hooks")))
            .await
            .unwrap();

        let id = dispatch(
            &ctx,
            &app,
            WebhookEvent::AccessGranted,
            serde_json::json!({"externalUserId": "ext_1"}),
        )
        .await
        .unwrap()
        .unwrap();

        let rows = ctx.store.deliveries_for_app(&app.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.id, id);
        assert_eq!(row.attempt, 1);
        assert_eq!(row.status, DeliveryStatus::Pending);
        assert!(row.next_retry_at.is_some());
        assert!(verify_signature(row.payload.as_bytes(), &row.signature, "whsec_1"));
    }

    #[tokio::test]
    async fn test_failed_attempts_backoff_to_terminal() {
        let ctx = test_ctx();
        // Unroutable URL — every attempt fails at the transport level.
        let app = ctx
            .store
            .create_app(&app_with_webhook(Some("http://127.0.0.1:1/hooks")))
            .await
            .unwrap();
        let http = reqwest::Client::new();

        dispatch(&ctx, &app, WebhookEvent::PlanUpdated, serde_json::json!({"planTier": "mid"}))
            .await
            .unwrap();

        // Walk the retry schedule by advancing "now" past each nextRetryAt.
        let mut now = Utc::now();
        for _ in 0..ctx.options.webhook.max_attempts {
            deliver_due(&ctx, &http, now).await.unwrap();
            now = now + Duration::seconds(ctx.options.webhook_backoff_secs(ctx.options.webhook.max_attempts) + 1);
        }

        let rows = ctx.store.deliveries_for_app(&app.id).await.unwrap();
        // One row per attempt, all failed, none pending
        assert_eq!(rows.len() as i64, ctx.options.webhook.max_attempts);
        assert!(rows.iter().all(|r| r.status == DeliveryStatus::Failed));
        let attempts: Vec<i64> = rows.iter().map(|r| r.attempt).collect();
        assert!(attempts.contains(&ctx.options.webhook.max_attempts));

        // Nothing further is due — the failure is terminal
        let due = ctx
            .store
            .due_deliveries(now + Duration::days(1), 50)
            .await
            .unwrap();
        assert!(due.is_empty());
    }
}
