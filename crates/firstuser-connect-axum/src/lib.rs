#![doc = include_str!("../README.md")]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use firstuser_connect::api_key::{self, AuthenticatedApp};
use firstuser_connect::context::ConnectContext;
use firstuser_connect::routes;
use firstuser_connect::{heartbeat, webhook};
use firstuser_connect_core::error::ApiError as CoreApiError;

// ─── Error Handling ──────────────────────────────────────────────

/// Wrapper so the core error type can implement Axum's `IntoResponse`.
pub struct ApiError(pub CoreApiError);

impl From<CoreApiError> for ApiError {
    fn from(e: CoreApiError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.to_json())).into_response()
    }
}

// ─── Bearer Authentication ───────────────────────────────────────

/// Resolve the calling app from the `Authorization` header.
async fn require_app(
    ctx: &ConnectContext,
    headers: &HeaderMap,
) -> Result<AuthenticatedApp, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
        return Err(CoreApiError::unauthorized().into());
    };
    api_key::authenticate(ctx, value)
        .await
        .map_err(|e| ApiError(routes::to_api_error(ctx, e)))
}

// ─── Router ──────────────────────────────────────────────────────

/// The main entry point for mounting FirstUser Connect on Axum.
pub struct ConnectRouter {
    ctx: Arc<ConnectContext>,
}

impl ConnectRouter {
    pub fn from_context(ctx: Arc<ConnectContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<ConnectContext> {
        &self.ctx
    }

    /// Build the Axum `Router`: the integration API nested under the
    /// configured base path, plus the browser-facing hosted join redirect.
    pub fn router(&self) -> Router {
        let api = Router::new()
            .route("/waitlist/start", post(handle_waitlist_start))
            .route("/access/exchange", post(handle_exchange))
            .route("/usage/heartbeat", post(handle_heartbeat))
            .route("/users/{external_user_id}/plan", post(handle_set_plan))
            .route("/chat/widget-token", post(handle_widget_token))
            .route("/webhooks/deliveries", get(handle_list_deliveries));

        Router::new()
            .nest(&self.ctx.options.base_path, api)
            .route("/i/{public_app_id}/join", get(handle_join))
            .with_state(self.ctx.clone())
    }

    /// Same router with permissive CORS (partner dashboards in dev).
    pub fn router_with_cors(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        self.router().layer(cors)
    }
}

// ─── Background Workers ──────────────────────────────────────────

/// Spawn the webhook delivery pump and the stale-session sweep on one
/// interval. Aborting the returned handle stops both.
pub fn spawn_background_workers(
    ctx: Arc<ConnectContext>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(ctx.options.webhook.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = webhook::deliver_due(&ctx, &http, chrono::Utc::now()).await {
                ctx.logger.error(&format!("webhook delivery pump failed: {e}"));
            }
            if let Err(e) = heartbeat::sweep_stale_sessions(&ctx).await {
                ctx.logger.error(&format!("session sweep failed: {e}"));
            }
        }
    })
}

// ─── Route Handlers ──────────────────────────────────────────────

async fn handle_waitlist_start(
    State(ctx): State<Arc<ConnectContext>>,
    headers: HeaderMap,
    Json(body): Json<routes::waitlist::WaitlistStartRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = require_app(&ctx, &headers).await?;
    let result = routes::waitlist::handle_waitlist_start(&ctx, &auth, body).await?;
    Ok(Json(result))
}

async fn handle_exchange(
    State(ctx): State<Arc<ConnectContext>>,
    headers: HeaderMap,
    Json(body): Json<routes::exchange::ExchangeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = require_app(&ctx, &headers).await?;
    let result = routes::exchange::handle_exchange(&ctx, &auth, body).await?;
    Ok(Json(result))
}

async fn handle_heartbeat(
    State(ctx): State<Arc<ConnectContext>>,
    headers: HeaderMap,
    Json(body): Json<routes::heartbeat::HeartbeatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = require_app(&ctx, &headers).await?;
    let result = routes::heartbeat::handle_heartbeat(&ctx, &auth, body).await?;
    Ok(Json(result))
}

async fn handle_set_plan(
    State(ctx): State<Arc<ConnectContext>>,
    Path(external_user_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<routes::plan::SetPlanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = require_app(&ctx, &headers).await?;
    let result = routes::plan::handle_set_plan(&ctx, &auth, &external_user_id, body).await?;
    Ok(Json(result))
}

async fn handle_widget_token(
    State(ctx): State<Arc<ConnectContext>>,
    headers: HeaderMap,
    Json(body): Json<routes::widget::WidgetTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = require_app(&ctx, &headers).await?;
    let result = routes::widget::handle_widget_token(&ctx, &auth, body).await?;
    Ok(Json(result))
}

/// Delivery history for the calling app — the dashboard feed where terminal
/// failures surface.
async fn handle_list_deliveries(
    State(ctx): State<Arc<ConnectContext>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let auth = require_app(&ctx, &headers).await?;
    let deliveries = ctx
        .store
        .deliveries_for_app(&auth.integration_app_id)
        .await
        .map_err(|e| ApiError(routes::to_api_error(&ctx, e)))?;
    Ok(Json(serde_json::json!({ "deliveries": deliveries })))
}

async fn handle_join(
    State(ctx): State<Arc<ConnectContext>>,
    Path(public_app_id): Path<String>,
    Query(query): Query<routes::join::JoinQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let redirect = routes::join::handle_join_complete(&ctx, &public_app_id, query).await?;
    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, redirect.location)],
    ))
}
