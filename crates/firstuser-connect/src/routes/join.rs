// GET /i/{publicAppId}/join — hosted join flow completion.
//
// The waitlist UI owns everything between landing on this URL and the user
// finishing the flow; this handler is the integration boundary at the end:
// resolve (or create) the platform user, issue a one-time access code, and
// redirect back to the partner with `fu_access_code` + `fu_public_app_id`
// appended to `returnTo`.

use serde::Deserialize;

use firstuser_connect_core::db::models::FirstuserUser;
use firstuser_connect_core::error::{ApiError, ErrorCode};

use crate::access_code;
use crate::context::ConnectContext;
use crate::routes::{is_allowed_return_to, to_api_error};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinQuery {
    #[serde(rename = "returnTo")]
    pub return_to: Option<String>,
    /// External user id carried over from the embedded start call. The join
    /// UI shows it for confirmation; the partner supplies it again at
    /// exchange time, which is the binding that matters.
    pub fu_ext: Option<String>,
    pub email: Option<String>,
}

/// The redirect the browser should follow.
#[derive(Debug, Clone)]
pub struct JoinRedirect {
    pub location: String,
}

pub async fn handle_join_complete(
    ctx: &ConnectContext,
    public_app_id: &str,
    query: JoinQuery,
) -> Result<JoinRedirect, ApiError> {
    let app = ctx
        .store
        .find_app_by_public_id(public_app_id)
        .await
        .map_err(|e| to_api_error(ctx, e))?
        .ok_or_else(|| ApiError::from_code(ErrorCode::AppNotFound))?;

    if !app.redirect_enabled && !app.embedded_enabled {
        return Err(ApiError::validation("Join flows are disabled for this app"));
    }

    let Some(return_to) = query.return_to else {
        return Err(ApiError::validation("returnTo is required"));
    };
    if !is_allowed_return_to(&app, &return_to) {
        return Err(ApiError::validation("returnTo is not an allowed origin"));
    }

    // Resolve the platform user: an existing account by email, or a fresh
    // pending membership.
    let user = match query.email.as_deref() {
        Some(email) => match ctx
            .store
            .find_user_by_email(email)
            .await
            .map_err(|e| to_api_error(ctx, e))?
        {
            Some(existing) => existing,
            None => ctx
                .store
                .create_user(&FirstuserUser::new(Some(email)))
                .await
                .map_err(|e| to_api_error(ctx, e))?,
        },
        None => ctx
            .store
            .create_user(&FirstuserUser::new(None))
            .await
            .map_err(|e| to_api_error(ctx, e))?,
    };

    let issued = access_code::issue(ctx, &app.id, &user.id, &app.space_id)
        .await
        .map_err(|e| to_api_error(ctx, e))?;

    let mut location = url::Url::parse(&return_to)
        .map_err(|_| ApiError::validation("returnTo is not a valid URL"))?;
    location
        .query_pairs_mut()
        .append_pair("fu_access_code", &issued.code)
        .append_pair("fu_public_app_id", &app.public_app_id);

    Ok(JoinRedirect {
        location: location.to_string(),
    })
}
