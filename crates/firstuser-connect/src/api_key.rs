// Server-to-server API key authentication.
//
// Credentials are `Authorization: Bearer <keyId>.<secret>`. The secret is
// stored hashed; verification hashes the supplied secret and compares in
// constant time. Revocation is checked on every call, so a revoked key is
// rejected on its very next use. Multiple active keys per app support
// rotation; revoked keys are kept for audit.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use firstuser_connect_core::db::models::IntegrationApiKey;
use firstuser_connect_core::error::{ApiError, Result};
use firstuser_connect_core::utils::id::generate_id;

use crate::context::ConnectContext;
use crate::crypto::{constant_time_equal, generate_random_string, hash_secret};

/// Prefix on every key id.
pub const KEY_ID_PREFIX: &str = "fuk_";
/// Random part of the key id.
pub const KEY_ID_LENGTH: usize = 16;
/// Length of the generated secret.
pub const SECRET_LENGTH: usize = 32;

/// A freshly minted key. The `secret` exists only in this value — it is
/// never persisted and cannot be recovered later.
#[derive(Debug, Clone)]
pub struct MintedKey {
    pub record: IntegrationApiKey,
    pub key_id: String,
    pub secret: String,
}

impl MintedKey {
    /// The bearer credential to hand to the partner: `<keyId>.<secret>`.
    pub fn bearer(&self) -> String {
        format!("{}.{}", self.key_id, self.secret)
    }
}

/// The result of successful authentication. All subsequent operations are
/// scoped to this app id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedApp {
    pub integration_app_id: String,
    pub key_id: String,
}

/// Public projection of a key record — everything except the hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyPublic {
    pub id: String,
    pub key_id: String,
    pub last_four: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<chrono::DateTime<Utc>>,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<&IntegrationApiKey> for ApiKeyPublic {
    fn from(key: &IntegrationApiKey) -> Self {
        Self {
            id: key.id.clone(),
            key_id: key.key_id.clone(),
            last_four: key.last_four.clone(),
            revoked_at: key.revoked_at,
            created_at: key.created_at,
        }
    }
}

/// Mint a new API key for an app.
pub async fn mint(ctx: &ConnectContext, integration_app_id: &str) -> Result<MintedKey> {
    let key_id = format!("{KEY_ID_PREFIX}{}", generate_random_string(KEY_ID_LENGTH));
    let secret = generate_random_string(SECRET_LENGTH);

    let record = IntegrationApiKey {
        id: generate_id(),
        integration_app_id: integration_app_id.to_string(),
        key_id: key_id.clone(),
        secret_hash: hash_secret(&secret),
        last_four: secret[secret.len() - 4..].to_string(),
        revoked_at: None,
        created_at: Utc::now(),
    };

    let record = ctx.store.create_api_key(&record).await?;
    Ok(MintedKey {
        record,
        key_id,
        secret,
    })
}

/// Split a bearer credential into `(key_id, secret)`.
pub fn parse_bearer(header: &str) -> Option<(&str, &str)> {
    let credential = header.strip_prefix("Bearer ")?.trim();
    let (key_id, secret) = credential.split_once('.')?;
    if key_id.is_empty() || secret.is_empty() {
        return None;
    }
    Some((key_id, secret))
}

/// Authenticate an `Authorization` header value.
///
/// Fails `Unauthorized` on a malformed header, unknown key id, revoked key,
/// or secret mismatch — the caller cannot distinguish which.
pub async fn authenticate(ctx: &ConnectContext, header: &str) -> Result<AuthenticatedApp> {
    let Some((key_id, secret)) = parse_bearer(header) else {
        return Err(ApiError::unauthorized().into());
    };

    let Some(key) = ctx.store.find_api_key_by_key_id(key_id).await? else {
        return Err(ApiError::unauthorized().into());
    };

    if key.revoked_at.is_some() {
        ctx.logger
            .warn(&format!("rejected revoked API key {key_id}"));
        return Err(ApiError::unauthorized().into());
    }

    let supplied_hash = hash_secret(secret);
    if !constant_time_equal(supplied_hash.as_bytes(), key.secret_hash.as_bytes()) {
        return Err(ApiError::unauthorized().into());
    }

    Ok(AuthenticatedApp {
        integration_app_id: key.integration_app_id,
        key_id: key.key_id,
    })
}

/// Revoke a key. Idempotent on already-revoked keys; the record is kept.
pub async fn revoke(ctx: &ConnectContext, key_id: &str) -> Result<bool> {
    Ok(ctx.store.revoke_api_key(key_id).await?.is_some())
}

/// List an app's keys as public projections.
pub async fn list(ctx: &ConnectContext, integration_app_id: &str) -> Result<Vec<ApiKeyPublic>> {
    let keys = ctx.store.list_api_keys(integration_app_id).await?;
    Ok(keys.iter().map(ApiKeyPublic::from).collect())
}
