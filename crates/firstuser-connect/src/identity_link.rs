// Identity link store — the durable 1:1 mapping between a partner's
// external user id and a FirstUser user id, scoped per integration app.
//
// Uniqueness in both directions is the store's job (unique-together
// constraints); this module turns constraint violations and mismatched
// existing links into `IdentityConflict` instead of overwriting. Links are
// never deleted.

use chrono::Utc;

use firstuser_connect_core::db::models::{IntegrationIdentityLink, PlanTier};
use firstuser_connect_core::error::{ApiError, ConnectError, ErrorCode, Result};
use firstuser_connect_core::utils::id::generate_id;

use crate::context::ConnectContext;

/// Verify that linking `(external_user_id ⇄ firstuser_user_id)` would not
/// conflict with an existing link. Returns the existing link when it already
/// matches exactly (idempotent re-link), `None` when no link exists.
pub async fn check_conflict(
    ctx: &ConnectContext,
    integration_app_id: &str,
    external_user_id: &str,
    firstuser_user_id: &str,
) -> Result<Option<IntegrationIdentityLink>> {
    if let Some(existing) = ctx
        .store
        .find_link_by_external(integration_app_id, external_user_id)
        .await?
    {
        if existing.firstuser_user_id != firstuser_user_id {
            return Err(ApiError::from_code(ErrorCode::IdentityConflict).into());
        }
        return Ok(Some(existing));
    }

    if ctx
        .store
        .find_link_by_user(integration_app_id, firstuser_user_id)
        .await?
        .is_some()
    {
        // The platform user is already linked to a different external id.
        return Err(ApiError::from_code(ErrorCode::IdentityConflict).into());
    }

    Ok(None)
}

/// Create the link if missing, or return the existing exact match.
///
/// A concurrent insert between check and create trips the store's
/// unique-together constraint; the loser re-reads and either adopts the
/// winner's identical link or reports the conflict.
pub async fn ensure_link(
    ctx: &ConnectContext,
    integration_app_id: &str,
    external_user_id: &str,
    firstuser_user_id: &str,
) -> Result<IntegrationIdentityLink> {
    if let Some(existing) =
        check_conflict(ctx, integration_app_id, external_user_id, firstuser_user_id).await?
    {
        return Ok(existing);
    }

    let now = Utc::now();
    let link = IntegrationIdentityLink {
        id: generate_id(),
        integration_app_id: integration_app_id.to_string(),
        external_user_id: external_user_id.to_string(),
        firstuser_user_id: firstuser_user_id.to_string(),
        current_plan_tier: PlanTier::default(),
        created_at: now,
        updated_at: now,
    };

    match ctx.store.create_link(&link).await {
        Ok(created) => Ok(created),
        Err(ConnectError::Duplicate(_)) => {
            match ctx
                .store
                .find_link_by_external(integration_app_id, external_user_id)
                .await?
            {
                Some(existing) if existing.firstuser_user_id == firstuser_user_id => Ok(existing),
                _ => Err(ApiError::from_code(ErrorCode::IdentityConflict).into()),
            }
        }
        Err(e) => Err(e),
    }
}

/// Sync the partner-reported plan tier onto an existing link.
pub async fn set_plan_tier(
    ctx: &ConnectContext,
    integration_app_id: &str,
    external_user_id: &str,
    tier: PlanTier,
) -> Result<IntegrationIdentityLink> {
    let Some(link) = ctx
        .store
        .find_link_by_external(integration_app_id, external_user_id)
        .await?
    else {
        return Err(ApiError::from_code(ErrorCode::NotLinked).into());
    };

    ctx.store
        .update_link_plan(&link.id, tier)
        .await?
        .ok_or_else(|| ConnectError::Database("identity link vanished during update".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use firstuser_connect_core::db::schema::integration_schema;
    use firstuser_connect_core::options::ConnectOptions;
    use firstuser_connect_memory::MemoryAdapter;

    fn test_ctx() -> Arc<ConnectContext> {
        let adapter = Arc::new(MemoryAdapter::new(integration_schema()));
        ConnectContext::new(ConnectOptions::default(), adapter)
    }

    fn is_conflict(result: &Result<IntegrationIdentityLink>) -> bool {
        matches!(result, Err(ConnectError::Api(e)) if e.code == ErrorCode::IdentityConflict)
    }

    #[tokio::test]
    async fn test_ensure_link_creates_once() {
        let ctx = test_ctx();
        let first = ensure_link(&ctx, "app1", "ext_1", "u1").await.unwrap();
        let second = ensure_link(&ctx, "app1", "ext_1", "u1").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.current_plan_tier, PlanTier::Free);
    }

    #[tokio::test]
    async fn test_conflict_on_different_user() {
        let ctx = test_ctx();
        ensure_link(&ctx, "app1", "ext_1", "u1").await.unwrap();
        let result = ensure_link(&ctx, "app1", "ext_1", "u2").await;
        assert!(is_conflict(&result));
    }

    #[tokio::test]
    async fn test_conflict_on_different_external_id() {
        let ctx = test_ctx();
        ensure_link(&ctx, "app1", "ext_1", "u1").await.unwrap();
        // u1 cannot be linked twice to the same partner app
        let result = ensure_link(&ctx, "app1", "ext_2", "u1").await;
        assert!(is_conflict(&result));
    }

    #[tokio::test]
    async fn test_same_pair_under_other_app_allowed() {
        let ctx = test_ctx();
        ensure_link(&ctx, "app1", "ext_1", "u1").await.unwrap();
        assert!(ensure_link(&ctx, "app2", "ext_1", "u1").await.is_ok());
    }

    #[tokio::test]
    async fn test_set_plan_tier_requires_link() {
        let ctx = test_ctx();
        let result = set_plan_tier(&ctx, "app1", "ext_missing", PlanTier::Pro).await;
        assert!(matches!(result, Err(ConnectError::Api(e)) if e.code == ErrorCode::NotLinked));

        ensure_link(&ctx, "app1", "ext_1", "u1").await.unwrap();
        let updated = set_plan_tier(&ctx, "app1", "ext_1", PlanTier::Pro).await.unwrap();
        assert_eq!(updated.current_plan_tier, PlanTier::Pro);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_link_single_row() {
        let ctx = test_ctx();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                ensure_link(&ctx, "app1", "ext_1", "u1").await
            }));
        }
        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            let link = handle.await.unwrap().unwrap();
            ids.insert(link.id);
        }
        // Every concurrent call resolved to the same single row
        assert_eq!(ids.len(), 1);
    }
}
