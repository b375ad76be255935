// POST /users/{externalUserId}/plan — partner-driven plan tier sync.

use serde::{Deserialize, Serialize};

use firstuser_connect_core::db::models::PlanTier;
use firstuser_connect_core::error::ApiError;

use crate::api_key::AuthenticatedApp;
use crate::context::ConnectContext;
use crate::identity_link;
use crate::routes::to_api_error;
use crate::webhook::{self, WebhookEvent};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPlanRequest {
    pub plan_tier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPlanResponse {
    pub current_plan_tier: PlanTier,
}

pub async fn handle_set_plan(
    ctx: &ConnectContext,
    auth: &AuthenticatedApp,
    external_user_id: &str,
    body: SetPlanRequest,
) -> Result<SetPlanResponse, ApiError> {
    let Some(tier) = PlanTier::parse(&body.plan_tier) else {
        return Err(ApiError::validation("planTier must be one of: free, mid, pro"));
    };

    let link = identity_link::set_plan_tier(ctx, &auth.integration_app_id, external_user_id, tier)
        .await
        .map_err(|e| to_api_error(ctx, e))?;

    if let Ok(Some(app)) = ctx.store.find_app_by_id(&auth.integration_app_id).await {
        let data = serde_json::json!({
            "externalUserId": link.external_user_id,
            "firstuserUserId": link.firstuser_user_id,
            "planTier": link.current_plan_tier.as_str(),
        });
        if let Err(e) = webhook::dispatch(ctx, &app, WebhookEvent::PlanUpdated, data).await {
            ctx.logger
                .error(&format!("failed to queue plan.updated webhook: {e}"));
        }
    }

    Ok(SetPlanResponse {
        current_plan_tier: link.current_plan_tier,
    })
}
