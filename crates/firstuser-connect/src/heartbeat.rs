// Usage/presence heartbeat tracking.
//
// Clients tick every ~15s with live/idle/offline. Heartbeats are only
// accepted for linked users; they open, refresh or close the one current
// usage session per link. Staleness is enforced at read time: a session
// whose last heartbeat is older than the timeout window is closed
// (backdated to its last proven-alive moment) before anything else happens,
// so crashed clients never leave sessions open. `sweep_stale_sessions`
// offers the same closing as a periodic pump for embedders that want one.

use chrono::{DateTime, Utc};

use firstuser_connect_core::db::models::{
    IntegrationIdentityLink, IntegrationUsageSession, MembershipStatus, PresenceStatus,
};
use firstuser_connect_core::error::{ApiError, ConnectError, ErrorCode, Result};
use firstuser_connect_core::utils::id::generate_id;

use crate::context::ConnectContext;
use crate::webhook::{self, WebhookEvent};

/// Outcome of an accepted heartbeat.
#[derive(Debug, Clone)]
pub struct HeartbeatOutcome {
    pub membership_status: MembershipStatus,
    /// The session the heartbeat landed in; `None` for an `offline` ping
    /// with nothing open.
    pub session_id: Option<String>,
}

/// Record a liveness ping for a linked user.
pub async fn heartbeat(
    ctx: &ConnectContext,
    integration_app_id: &str,
    external_user_id: &str,
    status: PresenceStatus,
    client_platform: Option<&str>,
) -> Result<HeartbeatOutcome> {
    let Some(link) = ctx
        .store
        .find_link_by_external(integration_app_id, external_user_id)
        .await?
    else {
        return Err(ApiError::from_code(ErrorCode::NotLinked).into());
    };

    let user = ctx
        .store
        .find_user_by_id(&link.firstuser_user_id)
        .await?
        .ok_or_else(|| ConnectError::Database("linked user not found".into()))?;

    let now = Utc::now();
    let current = current_session(ctx, &link, now).await?;

    let session_id = match status {
        PresenceStatus::Offline => {
            if let Some(session) = current {
                close(ctx, &session, now).await?;
            }
            None
        }
        PresenceStatus::Live | PresenceStatus::Idle => match current {
            Some(session) => {
                ctx.store.touch_session(&session.id, now).await?;
                Some(session.id)
            }
            None => {
                let session = IntegrationUsageSession {
                    id: generate_id(),
                    integration_app_id: integration_app_id.to_string(),
                    external_user_id: external_user_id.to_string(),
                    firstuser_user_id: link.firstuser_user_id.clone(),
                    membership_status: user.membership_status,
                    client_platform: client_platform.map(|p| p.to_string()),
                    started_at: now,
                    last_seen_at: now,
                    ended_at: None,
                    duration_seconds: None,
                };
                Some(ctx.store.create_session(&session).await?.id)
            }
        },
    };

    Ok(HeartbeatOutcome {
        membership_status: user.membership_status,
        session_id,
    })
}

/// The current (open, non-stale) session for a link. A stale open session
/// is closed here, backdated to its last heartbeat.
async fn current_session(
    ctx: &ConnectContext,
    link: &IntegrationIdentityLink,
    now: DateTime<Utc>,
) -> Result<Option<IntegrationUsageSession>> {
    let Some(session) = ctx
        .store
        .find_open_session(&link.integration_app_id, &link.external_user_id)
        .await?
    else {
        return Ok(None);
    };

    let age_secs = (now - session.last_seen_at).num_seconds();
    if age_secs > ctx.options.heartbeat_timeout_secs {
        close(ctx, &session, session.last_seen_at).await?;
        return Ok(None);
    }

    Ok(Some(session))
}

async fn close(
    ctx: &ConnectContext,
    session: &IntegrationUsageSession,
    ended_at: DateTime<Utc>,
) -> Result<()> {
    let duration = (ended_at - session.started_at).num_seconds().max(0);
    let closed = ctx
        .store
        .close_session(&session.id, ended_at, duration)
        .await?;

    // Notify the partner only when this call actually closed the session.
    if closed.is_some() {
        if let Some(app) = ctx.store.find_app_by_id(&session.integration_app_id).await? {
            let data = serde_json::json!({
                "externalUserId": session.external_user_id,
                "firstuserUserId": session.firstuser_user_id,
                "endedAt": ended_at,
                "durationSeconds": duration,
            });
            webhook::dispatch(ctx, &app, WebhookEvent::PresenceEnded, data).await?;
        }
    }
    Ok(())
}

/// Close every open session whose last heartbeat is older than the timeout
/// window. Returns the number of sessions closed.
pub async fn sweep_stale_sessions(ctx: &ConnectContext) -> Result<usize> {
    let now = Utc::now();
    let cutoff = now - chrono::Duration::seconds(ctx.options.heartbeat_timeout_secs);
    let stale = ctx.store.find_stale_sessions(cutoff).await?;

    let mut closed = 0;
    for session in &stale {
        close(ctx, session, session.last_seen_at).await?;
        closed += 1;
    }
    if closed > 0 {
        ctx.logger.info(&format!("closed {closed} stale usage sessions"));
    }
    Ok(closed)
}
