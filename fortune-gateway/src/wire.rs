//! Translates internal [`ProgressEvent`]s into the wire JSON shape clients
//! read over SSE (spec §6 "Streaming protocol").

use fortune_shared::event::EventKind;
use fortune_shared::{ErrorCategory, ProgressEvent, Task};
use serde_json::{json, Value};

/// Whether a client may retry after an error in this category
/// (mirrors `FortuneError::retry_allowed`, spec §7).
fn retry_allowed(category: ErrorCategory) -> bool {
    !matches!(category, ErrorCategory::Cancelled | ErrorCategory::InvalidInput | ErrorCategory::NotFound)
}

/// Render a progress-bus event as the JSON body of a `data: <json>\n\n` line.
pub fn event_to_json(event: &ProgressEvent) -> Value {
    match event.kind {
        EventKind::Status => json!({
            "type": "status",
            "status": event.status_code,
            "progress": event.progress.unwrap_or(0),
            "message": event.message,
        }),
        EventKind::Progress => json!({
            "type": "progress",
            "status": event.status_code,
            "progress": event.progress,
            "message": event.message,
        }),
        EventKind::Complete => json!({
            "type": "complete",
            "result": {
                "response": event.response_text,
                "confidence": event.confidence,
                "sources_used": event.sources_used,
                "processing_time_ms": event.processing_time_ms,
                "can_generate_report": event.can_generate_report,
            }
        }),
        EventKind::Error => json!({
            "type": "error",
            "error": event.message,
            "retry_allowed": event.error_category.map(retry_allowed).unwrap_or(true),
        }),
        EventKind::Ping => json!({ "type": "ping" }),
        EventKind::Lag => json!({ "type": "lag", "dropped": event.lag_count.unwrap_or(0) }),
    }
}

/// Render the current persisted row as an initial `status` event (spec §4.9
/// step 2), used both for the first attach and for an already-terminal task.
pub fn task_to_status_json(task: &Task) -> Value {
    json!({
        "type": "status",
        "status": task.status_code,
        "progress": task.progress,
        "message": task.status_message,
    })
}

/// Render an already-terminal task as its `complete`/`error` wire event
/// (spec §4.9 step 3).
pub fn task_to_terminal_json(task: &Task) -> Value {
    if task.state == fortune_shared::TaskState::Failed || task.state == fortune_shared::TaskState::Cancelled {
        let category = task.error_category.unwrap_or(ErrorCategory::Internal);
        json!({
            "type": "error",
            "error": task.error_message.clone().unwrap_or_default(),
            "retry_allowed": retry_allowed(category),
        })
    } else {
        json!({
            "type": "complete",
            "result": {
                "response": task.response_text,
                "confidence": task.confidence,
                "sources_used": task.sources_used,
                "processing_time_ms": task.processing_time_ms,
                "can_generate_report": task.can_generate_report,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn status_event_carries_progress_and_message() {
        let event = ProgressEvent::status(Uuid::now_v7(), 0, 1, "starting");
        let json = event_to_json(&event);
        assert_eq!(json["type"], "status");
        assert_eq!(json["status"], 1);
    }

    #[test]
    fn error_event_reports_retry_allowed_for_dependency_unavailable() {
        let event = ProgressEvent::error(Uuid::now_v7(), 0, ErrorCategory::DependencyUnavailable, "rag down");
        let json = event_to_json(&event);
        assert_eq!(json["retry_allowed"], true);
    }

    #[test]
    fn error_event_forbids_retry_for_invalid_input() {
        let event = ProgressEvent::error(Uuid::now_v7(), 0, ErrorCategory::InvalidInput, "bad deity");
        let json = event_to_json(&event);
        assert_eq!(json["retry_allowed"], false);
    }

    #[test]
    fn lag_event_reports_dropped_count() {
        let event = ProgressEvent::lag(Uuid::now_v7(), 0, 7);
        let json = event_to_json(&event);
        assert_eq!(json["dropped"], 7);
    }
}
