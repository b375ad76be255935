// POST /waitlist/start — embedded join entry point.
//
// Returns a continuation URL pointing at the hosted join flow, carrying the
// external user id (and contact hints) so the completion step can bind the
// access code back to this partner request.

use serde::{Deserialize, Serialize};

use firstuser_connect_core::error::ApiError;

use crate::api_key::AuthenticatedApp;
use crate::context::ConnectContext;
use crate::routes::{is_allowed_return_to, to_api_error};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistStartRequest {
    pub external_user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub return_to: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistStartResponse {
    pub continuation_url: String,
}

pub async fn handle_waitlist_start(
    ctx: &ConnectContext,
    auth: &AuthenticatedApp,
    body: WaitlistStartRequest,
) -> Result<WaitlistStartResponse, ApiError> {
    if body.external_user_id.trim().is_empty() {
        return Err(ApiError::validation("externalUserId is required"));
    }

    let app = ctx
        .store
        .find_app_by_id(&auth.integration_app_id)
        .await
        .map_err(|e| to_api_error(ctx, e))?
        .ok_or_else(|| ApiError::from_code(firstuser_connect_core::ErrorCode::AppNotFound))?;

    if !app.embedded_enabled {
        return Err(ApiError::validation(
            "Embedded waitlist is not enabled for this app",
        ));
    }

    if let Some(ref return_to) = body.return_to {
        if !is_allowed_return_to(&app, return_to) {
            return Err(ApiError::validation("returnTo is not an allowed origin"));
        }
    }

    let mut url = url::Url::parse(&ctx.options.base_url)
        .map_err(|_| ApiError::internal("invalid base URL"))?;
    url.set_path(&format!("/i/{}/join", app.public_app_id));
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("fu_ext", &body.external_user_id);
        if let Some(ref return_to) = body.return_to {
            query.append_pair("returnTo", return_to);
        }
        if let Some(ref email) = body.email {
            query.append_pair("email", email);
        }
        if let Some(ref phone) = body.phone {
            query.append_pair("phone", phone);
        }
    }

    Ok(WaitlistStartResponse {
        continuation_url: url.to_string(),
    })
}
