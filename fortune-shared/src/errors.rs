//! Error taxonomy for the fortune-interpretation core.
//!
//! Every error raised inside an adapter or component is classified into one
//! of the categories below at the boundary (see spec §7 Propagation policy).
//! The categories are surfaced to clients as-is; they are not an internal
//! implementation detail.

use thiserror::Error;

/// Result alias used across the core crates.
pub type FortuneResult<T> = Result<T, FortuneError>;

/// Classified error taxonomy for the task lifecycle and its dependencies.
#[derive(Debug, Error)]
pub enum FortuneError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("malformed model output: {0}")]
    MalformedModelOutput(String),

    #[error("task was cancelled")]
    Cancelled,

    #[error("conflicting update: {0}")]
    ConflictingUpdate(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl FortuneError {
    /// The `error_category` string persisted on a failed task and surfaced
    /// to the client as part of the terminal `error` event.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput(_) => ErrorCategory::InvalidInput,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::DependencyUnavailable(_) => ErrorCategory::DependencyUnavailable,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::MalformedModelOutput(_) => ErrorCategory::MalformedModelOutput,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::ConflictingUpdate(_) => ErrorCategory::Internal,
            Self::Serialization(_) | Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether a client is allowed to retry after receiving this error
    /// (spec §7 user-visible failure behavior).
    pub fn retry_allowed(&self) -> bool {
        !matches!(self, Self::Cancelled | Self::InvalidInput(_) | Self::NotFound(_))
    }
}

/// Stable, serializable error category, independent of the error's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    InvalidInput,
    NotFound,
    DependencyUnavailable,
    Timeout,
    MalformedModelOutput,
    Cancelled,
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InvalidInput => "invalid_input",
            Self::NotFound => "not_found",
            Self::DependencyUnavailable => "dependency_unavailable",
            Self::Timeout => "timeout",
            Self::MalformedModelOutput => "malformed_model_output",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_is_not_retryable() {
        let err = FortuneError::InvalidInput("bad deity".into());
        assert!(!err.retry_allowed());
        assert_eq!(err.category(), ErrorCategory::InvalidInput);
    }

    #[test]
    fn dependency_unavailable_is_retryable() {
        let err = FortuneError::DependencyUnavailable("vector store".into());
        assert!(err.retry_allowed());
        assert_eq!(err.category(), ErrorCategory::DependencyUnavailable);
    }

    #[test]
    fn cancelled_is_not_retryable() {
        let err = FortuneError::Cancelled;
        assert!(!err.retry_allowed());
        assert_eq!(err.category(), ErrorCategory::Cancelled);
    }

    #[test]
    fn malformed_output_is_retryable() {
        let err = FortuneError::MalformedModelOutput("missing section".into());
        assert!(err.retry_allowed());
    }

    #[test]
    fn category_display_is_snake_case() {
        assert_eq!(ErrorCategory::DependencyUnavailable.to_string(), "dependency_unavailable");
        assert_eq!(ErrorCategory::NotFound.to_string(), "not_found");
    }

    #[test]
    fn not_found_is_not_retryable() {
        let err = FortuneError::NotFound("poem 999".into());
        assert!(!err.retry_allowed());
    }
}
