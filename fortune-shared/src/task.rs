//! Task record types (spec §3 Task).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ErrorCategory;

/// Requested human language for the interpretation, defaulting to `Zh`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Zh,
    En,
    Ja,
}

impl Default for Language {
    fn default() -> Self {
        Self::Zh
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Zh => "zh",
            Self::En => "en",
            Self::Ja => "ja",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a task. Transitions are monotonic and form the DAG
/// `Queued -> Processing -> {Completed | Failed | Cancelled}` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    /// Whether this state is one of the three terminal states.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is a legal transition under the state DAG.
    pub fn can_transition_to(self, next: Self) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Queued, Processing)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
                | (Queued, Cancelled)
        )
    }
}

/// A submitted interpretation request and its lifecycle (spec §3 Task).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub owner_id: String,
    pub deity_id: String,
    pub fortune_number: i32,
    pub question: String,
    pub context: Option<HashMap<String, serde_json::Value>>,
    pub language: Language,

    pub state: TaskState,
    pub progress: i32,
    pub status_code: i32,
    pub status_message: Option<String>,

    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub response_text: Option<String>,
    pub response_sections: Option<serde_json::Value>,
    pub confidence: Option<f64>,
    pub sources_used: Option<Vec<String>>,
    pub processing_time_ms: Option<i64>,

    pub error_category: Option<ErrorCategory>,
    pub error_message: Option<String>,

    pub can_generate_report: bool,
    pub retry_count: i32,

    pub priority: i32,
    pub cancel_requested: bool,
    pub claimed_by: Option<String>,
}

impl Task {
    /// Build a fresh, `Queued` task for a newly-validated submission.
    #[allow(clippy::too_many_arguments)]
    pub fn new_submission(
        owner_id: String,
        deity_id: String,
        fortune_number: i32,
        question: String,
        context: Option<HashMap<String, serde_json::Value>>,
        language: Language,
        priority: i32,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            owner_id,
            deity_id,
            fortune_number,
            question,
            context,
            language,
            state: TaskState::Queued,
            progress: 0,
            status_code: crate::status::StatusCode::Queued.code(),
            status_message: None,
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            response_text: None,
            response_sections: None,
            confidence: None,
            sources_used: None,
            processing_time_ms: None,
            error_category: None,
            error_message: None,
            can_generate_report: false,
            retry_count: 0,
            priority,
            cancel_requested: false,
            claimed_by: None,
        }
    }

    /// Exactly one of (response / error) must be populated once terminal
    /// (spec §3 invariant).
    pub fn terminal_invariant_holds(&self) -> bool {
        if !self.state.is_terminal() {
            return true;
        }
        match self.state {
            TaskState::Completed => self.response_text.is_some() && self.error_message.is_none(),
            TaskState::Failed => self.error_message.is_some() && self.response_text.is_none(),
            TaskState::Cancelled => self.response_text.is_none(),
            TaskState::Queued | TaskState::Processing => unreachable!(),
        }
    }
}

/// Compact summary row for task-history queries (spec §6 Task-history query).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: Uuid,
    pub deity_id: String,
    pub fortune_number: i32,
    pub question_preview: String,
    pub state: TaskState,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        const PREVIEW_LEN: usize = 80;
        let question_preview: String = task.question.chars().take(PREVIEW_LEN).collect();
        Self {
            id: task.id,
            deity_id: task.deity_id.clone(),
            fortune_number: task.fortune_number,
            question_preview,
            state: task.state,
            submitted_at: task.submitted_at,
            completed_at: task.completed_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_language_is_zh() {
        assert_eq!(Language::default(), Language::Zh);
    }

    #[test]
    fn queued_can_move_to_processing() {
        assert!(TaskState::Queued.can_transition_to(TaskState::Processing));
    }

    #[test]
    fn processing_cannot_revert_to_queued() {
        assert!(!TaskState::Processing.can_transition_to(TaskState::Queued));
    }

    #[test]
    fn processing_self_loops_for_progress_updates() {
        assert!(TaskState::Processing.can_transition_to(TaskState::Processing));
    }

    #[test]
    fn terminal_states_do_not_transition_further() {
        assert!(!TaskState::Completed.can_transition_to(TaskState::Processing));
        assert!(!TaskState::Failed.can_transition_to(TaskState::Completed));
    }

    #[test]
    fn new_submission_starts_queued_with_zero_progress() {
        let task = Task::new_submission(
            "user-1".into(),
            "guan_yin".into(),
            42,
            "Career advice?".into(),
            None,
            Language::En,
            0,
        );
        assert_eq!(task.state, TaskState::Queued);
        assert_eq!(task.progress, 0);
        assert!(task.terminal_invariant_holds());
    }

    #[test]
    fn terminal_invariant_rejects_completed_without_response() {
        let mut task = Task::new_submission(
            "u".into(),
            "d".into(),
            1,
            "q".into(),
            None,
            Language::Zh,
            0,
        );
        task.state = TaskState::Completed;
        assert!(!task.terminal_invariant_holds());
        task.response_text = Some("done".into());
        assert!(task.terminal_invariant_holds());
    }

    #[test]
    fn summary_truncates_question_preview() {
        let mut task = Task::new_submission(
            "u".into(),
            "d".into(),
            1,
            "x".repeat(200),
            None,
            Language::Zh,
            0,
        );
        task.question = "x".repeat(200);
        let summary = TaskSummary::from(&task);
        assert_eq!(summary.question_preview.chars().count(), 80);
    }
}
