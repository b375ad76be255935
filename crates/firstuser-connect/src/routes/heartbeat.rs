// POST /usage/heartbeat — presence ping from the partner backend.

use serde::{Deserialize, Serialize};

use firstuser_connect_core::db::models::{MembershipStatus, PresenceStatus};
use firstuser_connect_core::error::ApiError;

use crate::api_key::AuthenticatedApp;
use crate::context::ConnectContext;
use crate::heartbeat;
use crate::routes::to_api_error;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub external_user_id: String,
    pub status: String,
    #[serde(default)]
    pub client_platform: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub membership_status: MembershipStatus,
}

pub async fn handle_heartbeat(
    ctx: &ConnectContext,
    auth: &AuthenticatedApp,
    body: HeartbeatRequest,
) -> Result<HeartbeatResponse, ApiError> {
    if body.external_user_id.trim().is_empty() {
        return Err(ApiError::validation("externalUserId is required"));
    }
    let Some(status) = PresenceStatus::parse(&body.status) else {
        return Err(ApiError::validation(
            "status must be one of: live, idle, offline",
        ));
    };

    let outcome = heartbeat::heartbeat(
        ctx,
        &auth.integration_app_id,
        &body.external_user_id,
        status,
        body.client_platform.as_deref(),
    )
    .await
    .map_err(|e| to_api_error(ctx, e))?;

    Ok(HeartbeatResponse {
        membership_status: outcome.membership_status,
    })
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

    async fn linked_setup() -> (Arc<ConnectContext>, AuthenticatedApp) {
        let adapter = Arc::new(MemoryAdapter::new(integration_schema()));
        let ctx = ConnectContext::new(ConnectOptions::default(), adapter);
        let app = ctx
            .store
            .create_app(&IntegrationApp::new("space_1", "pub_1", "Acme", "whsec_1"))
            .await
            .unwrap();
        let user = ctx
            .store
            .create_user(&FirstuserUser::new(Some("alice@example.com")))
            .await
            .unwrap();
        crate::identity_link::ensure_link(&ctx, &app.id, "ext_1", &user.id)
            .await
            .unwrap();
        let auth = AuthenticatedApp {
            integration_app_id: app.id,
            key_id: "fuk_test".into(),
        };
        (ctx, auth)
    }

    #[tokio::test]
    async fn test_live_heartbeat_returns_membership() {
        let (ctx, auth) = linked_setup().await;
        let resp = handle_heartbeat(
            &ctx,
            &auth,
            HeartbeatRequest {
                external_user_id: "ext_1".into(),
                status: "live".into(),
                client_platform: Some("react-native".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(resp.membership_status, MembershipStatus::Pending);
    }

    #[tokio::test]
    async fn test_invalid_status_rejected() {
        let (ctx, auth) = linked_setup().await;
        let err = handle_heartbeat(
            &ctx,
            &auth,
            HeartbeatRequest {
                external_user_id: "ext_1".into(),
                status: "away".into(),
                client_platform: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_unlinked_maps_to_not_linked() {
        let (ctx, auth) = linked_setup().await;
        let err = handle_heartbeat(
            &ctx,
            &auth,
            HeartbeatRequest {
                external_user_id: "ext_other".into(),
                status: "live".into(),
                client_platform: None,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotLinked);
    }
}
