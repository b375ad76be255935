// One-time access code issuing and redemption.
//
// A code proves a just-completed join flow. Only its SHA-256 hash is stored;
// the raw value is returned to the issuing caller exactly once. Redemption
// is a compare-and-swap on status=issued, so concurrent attempts produce
// exactly one winner.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use firstuser_connect_core::db::models::{
    AccessCodeStatus, FirstuserUser, IntegrationAccessCode, IntegrationIdentityLink,
    MembershipStatus,
};
use firstuser_connect_core::error::{ApiError, ConnectError, ErrorCode, Result};
use firstuser_connect_core::utils::id::generate_id;

use crate::context::ConnectContext;
use crate::crypto::{generate_access_code, sha256_hex};
use crate::identity_link;

/// A freshly issued code. The raw `code` is not recoverable after this
/// value is dropped.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Membership snapshot returned to partners.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipSnapshot {
    pub status: MembershipStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge_tier: Option<String>,
}

impl From<&FirstuserUser> for MembershipSnapshot {
    fn from(user: &FirstuserUser) -> Self {
        Self {
            status: user.membership_status,
            badge_tier: user.badge_tier.clone(),
        }
    }
}

/// Result of a successful redemption.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedeemedAccess {
    pub user: FirstuserUser,
    pub linked_identity: IntegrationIdentityLink,
    pub membership: MembershipSnapshot,
}

/// Issue a one-time code binding (app, user, space).
pub async fn issue(
    ctx: &ConnectContext,
    integration_app_id: &str,
    firstuser_user_id: &str,
    space_id: &str,
) -> Result<IssuedCode> {
    let code = generate_access_code();
    let expires_at = Utc::now() + Duration::seconds(ctx.options.access_code_ttl_secs);

    let record = IntegrationAccessCode {
        id: generate_id(),
        integration_app_id: integration_app_id.to_string(),
        firstuser_user_id: firstuser_user_id.to_string(),
        space_id: space_id.to_string(),
        code_hash: sha256_hex(&code),
        status: AccessCodeStatus::Issued,
        expires_at,
        redeemed_at: None,
        created_at: Utc::now(),
    };
    ctx.store.create_access_code(&record).await?;

    Ok(IssuedCode { code, expires_at })
}

/// Redeem a code for an identity link and membership snapshot.
///
/// Errors: `CodeNotFound` (no hash match for this app), `CodeExpired`
/// (past TTL), `CodeAlreadyRedeemed` (status already terminal),
/// `IdentityConflict` (the external id or the platform user is already
/// linked elsewhere — checked before the code is consumed, so a conflicting
/// call performs no write).
pub async fn redeem(
    ctx: &ConnectContext,
    code: &str,
    external_user_id: &str,
    integration_app_id: &str,
) -> Result<RedeemedAccess> {
    let code_hash = sha256_hex(code);

    let Some(record) = ctx
        .store
        .find_code_by_hash(integration_app_id, &code_hash)
        .await?
    else {
        return Err(ApiError::from_code(ErrorCode::CodeNotFound).into());
    };

    match record.status {
        AccessCodeStatus::Redeemed => {
            return Err(ApiError::from_code(ErrorCode::CodeAlreadyRedeemed).into());
        }
        AccessCodeStatus::Expired => {
            return Err(ApiError::from_code(ErrorCode::CodeExpired).into());
        }
        AccessCodeStatus::Issued => {}
    }

    let now = Utc::now();
    if now > record.expires_at {
        // Lazy expiry: flip the row so later attempts see the terminal state.
        ctx.store
            .cas_code_status(
                &code_hash,
                AccessCodeStatus::Issued,
                AccessCodeStatus::Expired,
                None,
            )
            .await?;
        return Err(ApiError::from_code(ErrorCode::CodeExpired).into());
    }

    // Conflict check happens before the code is consumed.
    identity_link::check_conflict(
        ctx,
        integration_app_id,
        external_user_id,
        &record.firstuser_user_id,
    )
    .await?;

    // The CAS: exactly one concurrent redeemer wins.
    let redeemed = ctx
        .store
        .cas_code_status(
            &code_hash,
            AccessCodeStatus::Issued,
            AccessCodeStatus::Redeemed,
            Some(now),
        )
        .await?;

    let Some(redeemed) = redeemed else {
        // Lost the race — report what actually happened to the row.
        let current = ctx
            .store
            .find_code_by_hash(integration_app_id, &code_hash)
            .await?;
        let code = match current.map(|c| c.status) {
            Some(AccessCodeStatus::Expired) => ErrorCode::CodeExpired,
            Some(AccessCodeStatus::Redeemed) => ErrorCode::CodeAlreadyRedeemed,
            _ => ErrorCode::CodeNotFound,
        };
        return Err(ApiError::from_code(code).into());
    };

    let link = identity_link::ensure_link(
        ctx,
        integration_app_id,
        external_user_id,
        &redeemed.firstuser_user_id,
    )
    .await?;

    let user = ctx
        .store
        .find_user_by_id(&redeemed.firstuser_user_id)
        .await?
        .ok_or_else(|| ConnectError::Database("user for redeemed code not found".into()))?;

    let membership = MembershipSnapshot::from(&user);
    ctx.logger.info(&format!(
        "linked external user {external_user_id} to {} via access code",
        user.id
    ));

    Ok(RedeemedAccess {
        user,
        linked_identity: link,
        membership,
    })
}
