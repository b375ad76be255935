// POST /chat/widget-token — short-lived hosted chat widget URL.

use serde::{Deserialize, Serialize};

use firstuser_connect_core::error::{ApiError, ErrorCode};

use crate::api_key::AuthenticatedApp;
use crate::context::ConnectContext;
use crate::routes::to_api_error;
use crate::widget::build_widget_url;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetTokenRequest {
    pub external_user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetTokenResponse {
    pub widget_url: String,
}

pub async fn handle_widget_token(
    ctx: &ConnectContext,
    auth: &AuthenticatedApp,
    body: WidgetTokenRequest,
) -> Result<WidgetTokenResponse, ApiError> {
    if body.external_user_id.trim().is_empty() {
        return Err(ApiError::validation("externalUserId is required"));
    }

    // Widgets are only issued for linked users.
    let link = ctx
        .store
        .find_link_by_external(&auth.integration_app_id, &body.external_user_id)
        .await
        .map_err(|e| to_api_error(ctx, e))?;
    if link.is_none() {
        return Err(ApiError::from_code(ErrorCode::NotLinked));
    }

    let app = ctx
        .store
        .find_app_by_id(&auth.integration_app_id)
        .await
        .map_err(|e| to_api_error(ctx, e))?
        .ok_or_else(|| ApiError::from_code(ErrorCode::AppNotFound))?;

    let widget_url = build_widget_url(
        &ctx.options,
        &app,
        &body.external_user_id,
        chrono::Utc::now(),
    )
    .map_err(|e| to_api_error(ctx, e))?;

    Ok(WidgetTokenResponse { widget_url })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use firstuser_connect_core::db::models::{FirstuserUser, IntegrationApp};
    use firstuser_connect_core::db::schema::integration_schema;
    use firstuser_connect_core::options::ConnectOptions;
    use firstuser_connect_memory::MemoryAdapter;

    async fn linked_setup() -> (Arc<ConnectContext>, AuthenticatedApp) {
        let adapter = Arc::new(MemoryAdapter::new(integration_schema()));
        let ctx = ConnectContext::new(ConnectOptions::new("https://firstuser.app"), adapter);
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
    async fn test_widget_url_issued_for_linked_user() {
        let (ctx, auth) = linked_setup().await;
        let resp = handle_widget_token(
            &ctx,
            &auth,
            WidgetTokenRequest {
                external_user_id: "ext_1".into(),
            },
        )
        .await
        .unwrap();
        assert!(resp.widget_url.starts_with("https://firstuser.app/widget/chat/pub_1"));
        assert!(resp.widget_url.contains("sig="));
    }

    #[tokio::test]
    async fn test_unlinked_user_rejected() {
        let (ctx, auth) = linked_setup().await;
        let err = handle_widget_token(
            &ctx,
            &auth,
            WidgetTokenRequest {
                external_user_id: "ext_stranger".into(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotLinked);
    }
}
