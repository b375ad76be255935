// Membership status transitions, as seen from the integration layer.
//
// The waitlist system owns approval decisions; it calls into here when a
// user's membership changes so every partner app linked to that user gets a
// `membership.updated` webhook. The payload carries the full snapshot —
// receivers must not depend on delivery order.

use firstuser_connect_core::db::models::{FirstuserUser, MembershipStatus};
use firstuser_connect_core::error::{ConnectError, Result};

use crate::context::ConnectContext;
use crate::webhook::{self, WebhookEvent};

/// Update a user's membership status and notify every linked partner app.
/// Returns the updated user.
pub async fn set_membership_status(
    ctx: &ConnectContext,
    user_id: &str,
    status: MembershipStatus,
) -> Result<FirstuserUser> {
    let user = ctx
        .store
        .update_user_membership(user_id, status.as_str())
        .await?
        .ok_or_else(|| ConnectError::Database(format!("user {user_id} not found")))?;

    let links = ctx.store.find_links_for_user(user_id).await?;
    for link in links {
        let Some(app) = ctx.store.find_app_by_id(&link.integration_app_id).await? else {
            continue;
        };
        let data = serde_json::json!({
            "externalUserId": link.external_user_id,
            "firstuserUserId": user.id,
            "membershipStatus": user.membership_status.as_str(),
            "badgeTier": user.badge_tier,
        });
        webhook::dispatch(ctx, &app, WebhookEvent::MembershipUpdated, data).await?;
    }

    Ok(user)
}
