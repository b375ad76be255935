// Seed helpers for integration tests.

use firstuser_connect::api_key::{self, MintedKey};
use firstuser_connect::context::ConnectContext;
use firstuser_connect_core::db::models::IntegrationApp;

/// Create an integration app (optionally pointed at a webhook receiver) and
/// mint one API key for it.
pub async fn seed_app_with_key(
    ctx: &ConnectContext,
    public_app_id: &str,
    signing_secret: &str,
    webhook_url: Option<&str>,
) -> (IntegrationApp, MintedKey) {
    let mut app = IntegrationApp::new("space_test", public_app_id, "Test Partner", signing_secret);
    app.webhook_url = webhook_url.map(|u| u.to_string());
    let app = ctx.store.create_app(&app).await.expect("create app");
    let key = api_key::mint(ctx, &app.id).await.expect("mint key");
    (app, key)
}
