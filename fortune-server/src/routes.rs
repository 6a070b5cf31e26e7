//! Web layer (spec §6 "Submission request" / "Task-history query"): the only
//! HTTP routes this core owns directly. Owner authentication, deity/temple
//! metadata and everything else under "external interfaces" are injected or
//! mounted by [`crate::build_router`].

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use fortune_bus::ProgressBus;
use fortune_shared::task::Language;
use fortune_shared::{DeityMap, ErrorCategory, FortuneError, Task};
use fortune_gateway::AuthenticatedOwner;
use fortune_store::TaskStore;
use fortune_worker::WorkerPool;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TaskStore>,
    pub bus: Arc<ProgressBus>,
    pub pool: Arc<WorkerPool>,
    pub deities: Arc<DeityMap>,
    pub stream_base_url: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tasks", post(submit_task))
        .route("/tasks", get(list_tasks))
        .route("/tasks/{task_id}/cancel", post(cancel_task))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub deity_id: String,
    pub fortune_number: i32,
    pub question: String,
    #[serde(default)]
    pub context: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub language: Option<Language>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_id: Uuid,
    pub stream_url: String,
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    category: ErrorCategory,
}

fn rejection(err: FortuneError) -> (StatusCode, Json<ErrorBody>) {
    let category = err.category();
    let status = match category {
        ErrorCategory::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorCategory::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorBody { error: err.to_string(), category }))
}

/// Validate and enqueue a new task (spec §6 "Submission request").
async fn submit_task(
    State(state): State<AppState>,
    AuthenticatedOwner(owner_id): AuthenticatedOwner,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, (StatusCode, Json<ErrorBody>)> {
    state
        .deities
        .resolve(&request.deity_id)
        .map_err(rejection)?;
    if !(1..=100).contains(&request.fortune_number) {
        return Err(rejection(FortuneError::InvalidInput(format!(
            "fortune_number {} out of range 1..100",
            request.fortune_number
        ))));
    }
    let question = request.question.trim().to_string();
    if question.is_empty() || question.chars().count() > 1000 {
        return Err(rejection(FortuneError::InvalidInput(
            "question must be 1..1000 characters after trimming".to_string(),
        )));
    }

    let task = Task::new_submission(
        owner_id,
        request.deity_id,
        request.fortune_number,
        question,
        request.context,
        request.language.unwrap_or_default(),
        0,
    );
    let task_id = task.id;
    let queued_message = fortune_shared::message_for(
        fortune_shared::StatusCode::Queued,
        task.language,
    );
    state.store.create(&task).await.map_err(rejection)?;
    state.bus.publish_status(task_id, task.status_code, queued_message);
    state.pool.notify_submission();

    Ok(Json(SubmitResponse {
        task_id,
        stream_url: format!("{}/stream/{task_id}", state.stream_base_url),
        status: "queued",
        message: "task accepted",
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// Owner-scoped task history (spec §6 "Task-history query").
async fn list_tasks(
    State(state): State<AppState>,
    AuthenticatedOwner(owner_id): AuthenticatedOwner,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<fortune_shared::TaskSummary>>, (StatusCode, Json<ErrorBody>)> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);
    let summaries = state.store.list(&owner_id, limit, offset).await.map_err(rejection)?;
    Ok(Json(summaries))
}

#[derive(Debug, Serialize)]
struct CancelResponse {
    cancelled: bool,
}

/// Request cancellation; the running worker observes the flag at its next
/// suspension point (spec §4.6 "Cancellation").
async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    AuthenticatedOwner(owner_id): AuthenticatedOwner,
) -> Result<Json<CancelResponse>, (StatusCode, Json<ErrorBody>)> {
    state.store.request_cancel(task_id, &owner_id).await.map_err(rejection)?;
    Ok(Json(CancelResponse { cancelled: true }))
}
