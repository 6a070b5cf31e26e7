//! Database row shape for `tasks`, and its conversion to/from the shared
//! [`Task`] domain type.

use chrono::{DateTime, Utc};
use fortune_shared::{ErrorCategory, FortuneError, Language, Task, TaskState};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub(crate) struct TaskRow {
    pub id: Uuid,
    pub owner_id: String,
    pub deity_id: String,
    pub fortune_number: i32,
    pub question: String,
    pub context: Option<Value>,
    pub language: String,

    pub state: String,
    pub progress: i32,
    pub status_code: i32,
    pub status_message: Option<String>,

    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub response_text: Option<String>,
    pub response_sections: Option<Value>,
    pub confidence: Option<f64>,
    pub sources_used: Option<Value>,
    pub processing_time_ms: Option<i64>,

    pub error_category: Option<String>,
    pub error_message: Option<String>,

    pub can_generate_report: bool,
    pub retry_count: i32,

    pub priority: i32,
    pub cancel_requested: bool,
    pub claimed_by: Option<String>,
}

fn parse_language(raw: &str) -> Language {
    match raw {
        "en" => Language::En,
        "ja" => Language::Ja,
        _ => Language::Zh,
    }
}

fn parse_state(raw: &str) -> TaskState {
    match raw {
        "processing" => TaskState::Processing,
        "completed" => TaskState::Completed,
        "failed" => TaskState::Failed,
        "cancelled" => TaskState::Cancelled,
        _ => TaskState::Queued,
    }
}

pub(crate) fn state_as_str(state: TaskState) -> &'static str {
    match state {
        TaskState::Queued => "queued",
        TaskState::Processing => "processing",
        TaskState::Completed => "completed",
        TaskState::Failed => "failed",
        TaskState::Cancelled => "cancelled",
    }
}

fn parse_category(raw: &str) -> ErrorCategory {
    match raw {
        "invalid_input" => ErrorCategory::InvalidInput,
        "not_found" => ErrorCategory::NotFound,
        "dependency_unavailable" => ErrorCategory::DependencyUnavailable,
        "timeout" => ErrorCategory::Timeout,
        "malformed_model_output" => ErrorCategory::MalformedModelOutput,
        "cancelled" => ErrorCategory::Cancelled,
        _ => ErrorCategory::Internal,
    }
}

impl TryFrom<TaskRow> for Task {
    type Error = FortuneError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let sources_used = row
            .sources_used
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| FortuneError::Internal(format!("corrupt sources_used column: {e}")))?;
        let context = row
            .context
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| FortuneError::Internal(format!("corrupt context column: {e}")))?;

        Ok(Task {
            id: row.id,
            owner_id: row.owner_id,
            deity_id: row.deity_id,
            fortune_number: row.fortune_number,
            question: row.question,
            context,
            language: parse_language(&row.language),
            state: parse_state(&row.state),
            progress: row.progress,
            status_code: row.status_code,
            status_message: row.status_message,
            submitted_at: row.submitted_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            response_text: row.response_text,
            response_sections: row.response_sections,
            confidence: row.confidence,
            sources_used,
            processing_time_ms: row.processing_time_ms,
            error_category: row.error_category.as_deref().map(parse_category),
            error_message: row.error_message,
            can_generate_report: row.can_generate_report,
            retry_count: row.retry_count,
            priority: row.priority,
            cancel_requested: row.cancel_requested,
            claimed_by: row.claimed_by,
        })
    }
}
