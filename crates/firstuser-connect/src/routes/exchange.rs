// POST /access/exchange — server-to-server redemption of an access code.

use serde::{Deserialize, Serialize};

use firstuser_connect_core::error::ApiError;

use crate::access_code::{self, RedeemedAccess};
use crate::api_key::AuthenticatedApp;
use crate::context::ConnectContext;
use crate::routes::to_api_error;
use crate::webhook::{self, WebhookEvent};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest {
    pub code: String,
    pub external_user_id: String,
    #[serde(default)]
    pub client_platform: Option<String>,
}

/// Response body: the linked user, the identity link, and the membership
/// snapshot the partner gates features on.
pub type ExchangeResponse = RedeemedAccess;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessGrantedData<'a> {
    external_user_id: &'a str,
    firstuser_user_id: &'a str,
    membership_status: &'a str,
    plan_tier: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_platform: Option<&'a str>,
}

pub async fn handle_exchange(
    ctx: &ConnectContext,
    auth: &AuthenticatedApp,
    body: ExchangeRequest,
) -> Result<ExchangeResponse, ApiError> {
    if body.code.trim().is_empty() {
        return Err(ApiError::validation("code is required"));
    }
    if body.external_user_id.trim().is_empty() {
        return Err(ApiError::validation("externalUserId is required"));
    }

    let access = access_code::redeem(
        ctx,
        body.code.trim(),
        &body.external_user_id,
        &auth.integration_app_id,
    )
    .await
    .map_err(|e| to_api_error(ctx, e))?;

    // Notify the partner backend asynchronously. The exchange response
    // already carries the state; the webhook is the push channel.
    if let Ok(Some(app)) = ctx.store.find_app_by_id(&auth.integration_app_id).await {
        let data = serde_json::to_value(AccessGrantedData {
            external_user_id: &access.linked_identity.external_user_id,
            firstuser_user_id: &access.linked_identity.firstuser_user_id,
            membership_status: access.membership.status.as_str(),
            plan_tier: access.linked_identity.current_plan_tier.as_str(),
            client_platform: body.client_platform.as_deref(),
        })
        .unwrap_or_default();

        if let Err(e) = webhook::dispatch(ctx, &app, WebhookEvent::AccessGranted, data).await {
            // Delivery bookkeeping must not fail the exchange.
            ctx.logger
                .error(&format!("failed to queue access.granted webhook: {e}"));
        }
    }

    Ok(access)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use firstuser_connect_core::db::models::{FirstuserUser, IntegrationApp};
    use firstuser_connect_core::db::schema::integration_schema;
    use firstuser_connect_core::options::ConnectOptions;
    use firstuser_connect_core::ErrorCode;
    use firstuser_connect_memory::MemoryAdapter;

    async fn setup() -> (Arc<ConnectContext>, AuthenticatedApp, String) {
        let adapter = Arc::new(MemoryAdapter::new(integration_schema()));
        let ctx = ConnectContext::new(ConnectOptions::default(), adapter);
        let mut app = IntegrationApp::new("space_1", "pub_1", "Acme", "whsec_1");
        app.webhook_url = Some("http://partner.test/hooks".into());
        let app = ctx.store.create_app(&app).await.unwrap();
        let user = ctx
            .store
            .create_user(&FirstuserUser::new(Some("alice@example.com")))
            .await
            .unwrap();
        let issued = crate::access_code::issue(&ctx, &app.id, &user.id, &app.space_id)
            .await
            .unwrap();
        let auth = AuthenticatedApp {
            integration_app_id: app.id,
            key_id: "fuk_test".into(),
        };
        (ctx, auth, issued.code)
    }

    #[tokio::test]
    async fn test_exchange_returns_link_and_queues_webhook() {
        let (ctx, auth, code) = setup().await;
        let resp = handle_exchange(
            &ctx,
            &auth,
            ExchangeRequest {
                code,
                external_user_id: "ext_1".into(),
                client_platform: Some("web".into()),
            },
        )
        .await
        .unwrap();

        assert_eq!(resp.linked_identity.external_user_id, "ext_1");

        let deliveries = ctx
            .store
            .deliveries_for_app(&auth.integration_app_id)
            .await
            .unwrap();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].event_type, "access.granted");

        let payload: serde_json::Value = serde_json::from_str(&deliveries[0].payload).unwrap();
        assert_eq!(payload["data"]["externalUserId"], "ext_1");
        assert_eq!(payload["data"]["membershipStatus"], "pending");
    }

    #[tokio::test]
    async fn test_blank_fields_rejected() {
        let (ctx, auth, code) = setup().await;
        let err = handle_exchange(
            &ctx,
            &auth,
            ExchangeRequest {
                code,
                external_user_id: "".into(),
                client_platform: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_bad_code_maps_to_not_found() {
        let (ctx, auth, _code) = setup().await;
        let err = handle_exchange(
            &ctx,
            &auth,
            ExchangeRequest {
                code: "nope".into(),
                external_user_id: "ext_1".into(),
                client_platform: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::CodeNotFound);
    }
}
