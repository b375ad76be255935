// Recording webhook receiver bound to an ephemeral local port.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use tokio::sync::Mutex;

use firstuser_connect::webhook::{
    verify_signature, LEGACY_SIGNATURE_HEADER, SIGNATURE_HEADER,
};

/// One recorded delivery.
#[derive(Debug, Clone)]
pub struct ReceivedWebhook {
    pub payload: String,
    pub signature: Option<String>,
    pub legacy_signature: Option<String>,
    /// Whether the signature verified against the receiver's secret.
    pub verified: bool,
}

struct ReceiverState {
    signing_secret: String,
    received: Mutex<Vec<ReceivedWebhook>>,
    /// Respond 500 to this many upcoming requests (after recording them).
    fail_remaining: AtomicUsize,
}

/// An in-process partner backend for webhook tests.
pub struct TestReceiver {
    addr: SocketAddr,
    state: Arc<ReceiverState>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestReceiver {
    /// Bind on `127.0.0.1:0` and start serving.
    pub async fn start(signing_secret: &str) -> Self {
        let state = Arc::new(ReceiverState {
            signing_secret: signing_secret.to_string(),
            received: Mutex::new(Vec::new()),
            fail_remaining: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/hooks", post(handle_webhook))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test receiver");
        let addr = listener.local_addr().expect("local addr");

        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    /// The URL to configure as the app's `webhookUrl`.
    pub fn url(&self) -> String {
        format!("http://{}/hooks", self.addr)
    }

    /// Everything received so far, in arrival order.
    pub async fn received(&self) -> Vec<ReceivedWebhook> {
        self.state.received.lock().await.clone()
    }

    /// Answer 500 to the next `n` requests (still recorded), then recover.
    pub fn fail_next(&self, n: usize) {
        self.state.fail_remaining.store(n, Ordering::SeqCst);
    }

    pub fn shutdown(self) {
        self.handle.abort();
    }
}

async fn handle_webhook(
    State(state): State<Arc<ReceiverState>>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let signature = header_value(&headers, SIGNATURE_HEADER);
    let legacy_signature = header_value(&headers, LEGACY_SIGNATURE_HEADER);

    // Either header is accepted during the deprecation window.
    let presented = signature.as_deref().or(legacy_signature.as_deref());
    let verified = presented
        .map(|sig| verify_signature(body.as_bytes(), sig, &state.signing_secret))
        .unwrap_or(false);

    state.received.lock().await.push(ReceivedWebhook {
        payload: body,
        signature,
        legacy_signature,
        verified,
    });

    // A bad signature is an auth failure, distinct from transient errors —
    // the payload is never trusted.
    if !verified {
        return StatusCode::UNAUTHORIZED;
    }

    let remaining = state.fail_remaining.load(Ordering::SeqCst);
    if remaining > 0
        && state
            .fail_remaining
            .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    StatusCode::OK
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}
