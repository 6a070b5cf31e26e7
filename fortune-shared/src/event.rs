//! Progress bus event types (spec §4.7 Progress Bus, §6 SSE protocol).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ErrorCategory;

/// The SSE `event:` discriminant. Wire framing is `data: <json>\n\n` with no
/// separate `event:` line; the discriminant travels inside the JSON body as
/// `type` (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Status,
    Progress,
    Complete,
    Error,
    Ping,
    Lag,
}

/// A single event published on a task's progress stream.
///
/// `seq` is monotonically increasing per task and lets subscribers detect
/// gaps across a reconnect; it is assigned by the bus at publish time, never
/// by the publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub task_id: Uuid,
    pub seq: u64,
    pub status_code: i32,
    pub message: Option<String>,
    pub progress: Option<i32>,
    pub response_text: Option<String>,
    pub response_sections: Option<serde_json::Value>,
    pub confidence: Option<f64>,
    pub sources_used: Option<Vec<String>>,
    pub processing_time_ms: Option<i64>,
    pub can_generate_report: Option<bool>,
    pub error_category: Option<ErrorCategory>,
    pub lag_count: Option<u64>,
    pub emitted_at: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn status(task_id: Uuid, seq: u64, status_code: i32, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Status,
            task_id,
            seq,
            status_code,
            message: Some(message.into()),
            progress: None,
            response_text: None,
            response_sections: None,
            confidence: None,
            sources_used: None,
            processing_time_ms: None,
            can_generate_report: None,
            error_category: None,
            lag_count: None,
            emitted_at: Utc::now(),
        }
    }

    pub fn progress(
        task_id: Uuid,
        seq: u64,
        status_code: i32,
        progress: i32,
        message: Option<String>,
    ) -> Self {
        Self {
            kind: EventKind::Progress,
            task_id,
            seq,
            status_code,
            message,
            progress: Some(progress),
            response_text: None,
            response_sections: None,
            confidence: None,
            sources_used: None,
            processing_time_ms: None,
            can_generate_report: None,
            error_category: None,
            lag_count: None,
            emitted_at: Utc::now(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn complete(
        task_id: Uuid,
        seq: u64,
        response_text: String,
        response_sections: serde_json::Value,
        confidence: Option<f64>,
        sources_used: Vec<String>,
        processing_time_ms: i64,
        can_generate_report: bool,
    ) -> Self {
        Self {
            kind: EventKind::Complete,
            task_id,
            seq,
            status_code: crate::status::StatusCode::Completed.code(),
            message: None,
            progress: Some(100),
            response_text: Some(response_text),
            response_sections: Some(response_sections),
            confidence,
            sources_used: Some(sources_used),
            processing_time_ms: Some(processing_time_ms),
            can_generate_report: Some(can_generate_report),
            error_category: None,
            lag_count: None,
            emitted_at: Utc::now(),
        }
    }

    pub fn error(task_id: Uuid, seq: u64, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Error,
            task_id,
            seq,
            status_code: crate::status::StatusCode::Error.code(),
            message: Some(message.into()),
            progress: None,
            response_text: None,
            response_sections: None,
            confidence: None,
            sources_used: None,
            processing_time_ms: None,
            can_generate_report: None,
            error_category: Some(category),
            lag_count: None,
            emitted_at: Utc::now(),
        }
    }

    pub fn ping(task_id: Uuid, seq: u64) -> Self {
        Self {
            kind: EventKind::Ping,
            task_id,
            seq,
            status_code: crate::status::StatusCode::Processing.code(),
            message: None,
            progress: None,
            response_text: None,
            response_sections: None,
            confidence: None,
            sources_used: None,
            processing_time_ms: None,
            can_generate_report: None,
            error_category: None,
            lag_count: None,
            emitted_at: Utc::now(),
        }
    }

    /// A gap marker emitted when a slow subscriber's buffer overflows and
    /// events had to be dropped for it (spec §4.7 per-subscriber flow control).
    pub fn lag(task_id: Uuid, seq: u64, lag_count: u64) -> Self {
        Self {
            kind: EventKind::Lag,
            task_id,
            seq,
            status_code: crate::status::StatusCode::Processing.code(),
            message: None,
            progress: None,
            response_text: None,
            response_sections: None,
            confidence: None,
            sources_used: None,
            processing_time_ms: None,
            can_generate_report: None,
            error_category: None,
            lag_count: Some(lag_count),
            emitted_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::Complete | EventKind::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_event_carries_message_and_code() {
        let id = Uuid::now_v7();
        let event = ProgressEvent::status(id, 1, 2, "starting up");
        assert_eq!(event.kind, EventKind::Status);
        assert_eq!(event.status_code, 2);
        assert_eq!(event.message.as_deref(), Some("starting up"));
    }

    #[test]
    fn complete_event_is_terminal() {
        let id = Uuid::now_v7();
        let event = ProgressEvent::complete(
            id,
            5,
            "wisdom".into(),
            serde_json::json!({}),
            Some(0.8),
            vec!["chunk-1".to_string()],
            900,
            true,
        );
        assert!(event.is_terminal());
        assert_eq!(event.progress, Some(100));
        assert_eq!(event.processing_time_ms, Some(900));
    }

    #[test]
    fn error_event_is_terminal_and_carries_category() {
        let id = Uuid::now_v7();
        let event = ProgressEvent::error(id, 3, ErrorCategory::Timeout, "rag timed out");
        assert!(event.is_terminal());
        assert_eq!(event.error_category, Some(ErrorCategory::Timeout));
    }

    #[test]
    fn ping_and_lag_are_not_terminal() {
        let id = Uuid::now_v7();
        assert!(!ProgressEvent::ping(id, 0).is_terminal());
        assert!(!ProgressEvent::lag(id, 0, 3).is_terminal());
    }

    #[test]
    fn lag_event_reports_drop_count() {
        let id = Uuid::now_v7();
        let event = ProgressEvent::lag(id, 9, 4);
        assert_eq!(event.lag_count, Some(4));
    }
}
