// Client SDK tests against a mock partner backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};

use firstuser_connect_client::{
    ClientError, ClientOptions, ConnectClient, PresenceSink, PresenceState,
    StartEmbeddedWaitlistRequest,
};

struct MockState {
    heartbeats: AtomicUsize,
}

async fn mock_waitlist_start() -> impl IntoResponse {
    Json(serde_json::json!({"continuationUrl": "https://firstuser.app/i/pub_1/join?fu_ext=ext_1"}))
}

async fn mock_exchange(Json(body): Json<serde_json::Value>) -> impl IntoResponse {
    if body["code"] == "expired-code" {
        return (
            StatusCode::GONE,
            Json(serde_json::json!({
                "error": {"code": "CODE_EXPIRED", "message": "Access code expired"}
            })),
        );
    }
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "user": {"id": "u1"},
            "linkedIdentity": {
                "externalUserId": body["externalUserId"],
                "firstuserUserId": "u1",
                "currentPlanTier": "free"
            },
            "membership": {"status": "pending"}
        })),
    )
}

async fn mock_heartbeat(State(state): State<Arc<MockState>>) -> impl IntoResponse {
    state.heartbeats.fetch_add(1, Ordering::SeqCst);
    Json(serde_json::json!({"membershipStatus": "approved"}))
}

async fn mock_widget_token() -> impl IntoResponse {
    Json(serde_json::json!({"widgetUrl": "https://firstuser.app/widget/chat/pub_1?sig=x"}))
}

async fn start_mock() -> (String, Arc<MockState>) {
    let state = Arc::new(MockState {
        heartbeats: AtomicUsize::new(0),
    });

    let app = Router::new()
        .route("/api/firstuser/waitlist/start", post(mock_waitlist_start))
        .route("/api/firstuser/access/exchange", post(mock_exchange))
        .route("/api/firstuser/usage/heartbeat", post(mock_heartbeat))
        .route("/api/firstuser/chat/widget-token", post(mock_widget_token))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("http://{addr}"), state)
}

fn client_for(base_url: &str) -> ConnectClient {
    ConnectClient::new(ClientOptions {
        base_url: base_url.to_string(),
        heartbeat_interval: Duration::from_millis(25),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_start_embedded_waitlist() {
    let (base, _state) = start_mock().await;
    let client = client_for(&base);

    let resp = client
        .start_embedded_waitlist(StartEmbeddedWaitlistRequest {
            external_user_id: "ext_1".into(),
            email: None,
            phone: None,
            return_to: Some("https://partner.example/done".into()),
        })
        .await
        .unwrap();
    assert!(resp.continuation_url.contains("/i/pub_1/join"));
}

#[tokio::test]
async fn test_exchange_access_code() {
    let (base, _state) = start_mock().await;
    let client = client_for(&base);

    let access = client.exchange_access_code("XYZ", "ext_1").await.unwrap();
    assert_eq!(access.linked_identity.external_user_id, "ext_1");
    assert_eq!(access.linked_identity.firstuser_user_id, "u1");
    assert_eq!(access.membership.status, "pending");
}

#[tokio::test]
async fn test_expired_code_maps_to_gone() {
    let (base, _state) = start_mock().await;
    let client = client_for(&base);

    let err = client
        .exchange_access_code("expired-code", "ext_1")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Gone { .. }));
}

#[tokio::test]
async fn test_send_heartbeat() {
    let (base, state) = start_mock().await;
    let client = client_for(&base);

    let resp = client
        .send_heartbeat("ext_1", PresenceState::Live)
        .await
        .unwrap();
    assert_eq!(resp.membership_status, "approved");
    assert_eq!(state.heartbeats.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_auto_presence_posts_heartbeats() {
    let (base, state) = start_mock().await;
    let client = client_for(&base);

    let results = Arc::new(AtomicUsize::new(0));
    let r = results.clone();
    client
        .start_presence(PresenceSink::auto_with("ext_1", move |result| {
            assert!(result.is_ok());
            r.fetch_add(1, Ordering::SeqCst);
        }))
        .await;

    tokio::time::sleep(Duration::from_millis(140)).await;
    client.stop_presence().await;

    let posted = state.heartbeats.load(Ordering::SeqCst);
    assert!(posted >= 3, "expected >= 3 heartbeat POSTs, got {posted}");
    assert_eq!(results.load(Ordering::SeqCst), posted);

    // Stopped means stopped
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(state.heartbeats.load(Ordering::SeqCst), posted);
}

#[tokio::test]
async fn test_double_start_single_stream_of_posts() {
    let (base, state) = start_mock().await;
    let client = client_for(&base);

    client.start_presence(PresenceSink::auto("ext_1")).await;
    client.start_presence(PresenceSink::auto("ext_1")).await;

    tokio::time::sleep(Duration::from_millis(130)).await;
    client.stop_presence().await;

    // ~5 intervals elapsed; two live timers would have posted ~10.
    let posted = state.heartbeats.load(Ordering::SeqCst);
    assert!(
        (3..=7).contains(&posted),
        "expected a single timer's worth of POSTs, got {posted}"
    );
}

#[tokio::test]
async fn test_hosted_chat_widget() {
    let (base, _state) = start_mock().await;
    let client = client_for(&base);

    let widget = client.hosted_chat_widget("ext_1").await.unwrap();
    assert!(widget.url().starts_with("https://firstuser.app/widget/chat/"));
    assert!(widget.iframe_html().contains("sandbox="));
}
