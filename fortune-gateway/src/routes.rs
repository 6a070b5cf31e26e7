//! Stream gateway routes (spec §4.9 C9): per-connection SSE translation of a
//! task's progress-bus stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::routing::get;
use axum::{http::StatusCode, Json, Router};
use fortune_bus::{recv_or_lag, ProgressBus};
use fortune_store::TaskStore;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::auth::AuthenticatedOwner;
use crate::wire::{event_to_json, task_to_status_json, task_to_terminal_json};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub ping_interval: Duration,
    pub max_connection: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            max_connection: Duration::from_secs(300),
        }
    }
}

#[derive(Clone)]
pub struct GatewayState {
    pub store: Arc<TaskStore>,
    pub bus: Arc<ProgressBus>,
    pub config: GatewayConfig,
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/stream/{task_id}", get(stream_task))
        .with_state(state)
}

async fn stream_task(
    State(state): State<GatewayState>,
    Path(task_id): Path<Uuid>,
    AuthenticatedOwner(owner_id): AuthenticatedOwner,
) -> Result<Sse<ReceiverStream<Result<Event, Infallible>>>, (StatusCode, Json<serde_json::Value>)> {
    let task = state.store.get(task_id, &owner_id).await.map_err(|err| {
        let status = match err.category() {
            fortune_shared::ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": err.to_string() })))
    })?;

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(32);

    // Step 2: initial status snapshot from the persisted row.
    let _ = tx.send(Ok(to_sse(task_to_status_json(&task)))).await;

    if task.state.is_terminal() {
        // Step 3: already terminal, emit the final event and close.
        let _ = tx.send(Ok(to_sse(task_to_terminal_json(&task)))).await;
        return Ok(Sse::new(ReceiverStream::new(rx)));
    }

    tokio::spawn(forward_live_events(state, task_id, tx));
    Ok(Sse::new(ReceiverStream::new(rx)))
}

async fn forward_live_events(state: GatewayState, task_id: Uuid, tx: mpsc::Sender<Result<Event, Infallible>>) {
    let mut subscription = state.bus.subscribe(task_id);
    for event in subscription.backlog {
        if tx.send(Ok(to_sse(event_to_json(&event)))).await.is_err() {
            return;
        }
        if event.is_terminal() {
            return;
        }
    }

    let deadline = tokio::time::Instant::now() + state.config.max_connection;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            tracing::debug!(%task_id, "stream reached absolute connection cap");
            return;
        }
        let wait = remaining.min(state.config.ping_interval);
        match tokio::time::timeout(wait, recv_or_lag(&mut subscription.receiver)).await {
            Ok(Some(event)) => {
                let terminal = event.is_terminal();
                if tx.send(Ok(to_sse(event_to_json(&event)))).await.is_err() {
                    return;
                }
                if terminal {
                    return;
                }
            }
            Ok(None) => return,
            Err(_elapsed) => {
                if tx.send(Ok(Event::default().data("{\"type\":\"ping\"}"))).await.is_err() {
                    return;
                }
            }
        }
    }
}

fn to_sse(body: serde_json::Value) -> Event {
    Event::default().data(body.to_string())
}
