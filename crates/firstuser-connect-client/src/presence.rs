// The presence heartbeat loop.
//
// One cooperative timer per client. `start_presence` replaces any running
// loop (never two timers), `stop_presence` is idempotent, and a failed
// tick is reported through the sink instead of killing the timer.

use std::sync::Arc;

use crate::types::PresenceState;
use crate::{ClientError, ConnectClient, HeartbeatResponse};

/// Result delivered to the sink on each automatic tick.
pub type PresenceTickResult = Result<HeartbeatResponse, ClientError>;

type TickFn = Arc<dyn Fn() + Send + Sync>;
type ResultFn = Arc<dyn Fn(PresenceTickResult) + Send + Sync>;

/// Where each presence tick goes.
pub enum PresenceSink {
    /// Invoke a plain callback every tick; the embedder sends its own
    /// heartbeats.
    Callback(TickFn),
    /// The SDK sends the heartbeat itself, with the client's current
    /// presence state. Tick outcomes (including errors) go to `on_result`.
    Auto {
        external_user_id: String,
        on_result: Option<ResultFn>,
    },
}

impl PresenceSink {
    /// Callback sink from a closure.
    pub fn callback<F: Fn() + Send + Sync + 'static>(f: F) -> Self {
        Self::Callback(Arc::new(f))
    }

    /// Auto sink without a result observer.
    pub fn auto(external_user_id: impl Into<String>) -> Self {
        Self::Auto {
            external_user_id: external_user_id.into(),
            on_result: None,
        }
    }

    /// Auto sink with a result observer.
    pub fn auto_with<F: Fn(PresenceTickResult) + Send + Sync + 'static>(
        external_user_id: impl Into<String>,
        on_result: F,
    ) -> Self {
        Self::Auto {
            external_user_id: external_user_id.into(),
            on_result: Some(Arc::new(on_result)),
        }
    }
}

impl ConnectClient {
    /// Begin the recurring presence timer. Calling this again replaces the
    /// existing timer — duplicate timers never accumulate.
    pub async fn start_presence(&self, sink: PresenceSink) {
        let mut slot = self.presence_task.lock().await;
        if let Some(task) = slot.take() {
            task.abort();
        }

        let client = self.clone();
        let interval = self.options.heartbeat_interval;
        let state = self.presence_state.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick of `interval` fires immediately; skip it so
            // ticks land at t+interval, t+2*interval, ...
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match &sink {
                    PresenceSink::Callback(f) => f(),
                    PresenceSink::Auto {
                        external_user_id,
                        on_result,
                    } => {
                        let status = *state.read().await;
                        let result = client.send_heartbeat(external_user_id, status).await;
                        if let Some(f) = on_result {
                            f(result);
                        }
                    }
                }
            }
        });

        *slot = Some(task);
    }

    /// Cancel the presence timer. Safe to call when not started.
    pub async fn stop_presence(&self) {
        if let Some(task) = self.presence_task.lock().await.take() {
            task.abort();
        }
    }

    /// Whether a presence timer is currently running.
    pub async fn presence_running(&self) -> bool {
        self.presence_task
            .lock()
            .await
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    /// Set the state automatic ticks report. The web binding wires this to
    /// `document.hidden` (live/idle); mobile bindings stay `live` unless
    /// told otherwise.
    pub async fn set_presence_state(&self, state: PresenceState) {
        *self.presence_state.write().await = state;
    }
}
