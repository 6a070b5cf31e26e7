//! Numeric status codes for progress reporting (spec §6).
//!
//! Codes form a closed, stable set grouped by phase. Clients translate codes
//! to localized strings locally; `message` on the wire is advisory only.

/// Numeric status codes, grouped 0-9 queue/init, 10-19 RAG, 20-39 LLM,
/// 40-49 LLM streaming/heartbeat, 50-59 validation, 60-69 completion,
/// 70-79 errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum StatusCode {
    Queued = 0,
    Initializing = 1,
    Processing = 2,

    RagStart = 10,
    RagConnecting = 11,
    RagVectorizing = 12,
    RagSearching = 13,
    RagScoring = 14,
    RagSorting = 15,
    RagPreparing = 16,
    RagComplete = 17,

    LlmStart = 20,
    LlmLoading = 21,
    LlmAnalyzing = 22,
    LlmContext = 23,
    LlmGenerating = 24,
    LlmOptimizing = 25,
    LlmWisdom = 26,
    LlmChecking = 27,
    LlmPolishing = 28,
    LlmFormatting = 29,
    LlmFinalCheck = 30,
    LlmComplete = 31,

    LlmStreaming = 40,
    LlmStreamingEarly = 41,
    LlmStreamingMiddle = 42,
    LlmStreamingLate = 43,
    LlmStreamingOvertime = 44,

    Validating = 50,
    ValidationComplete = 51,

    Finalizing = 60,
    Completed = 61,
    Success = 62,

    Error = 70,
    Timeout = 71,
    Failed = 72,
}

impl StatusCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Initializing => "INITIALIZING",
            Self::Processing => "PROCESSING",
            Self::RagStart => "RAG_START",
            Self::RagConnecting => "RAG_CONNECTING",
            Self::RagVectorizing => "RAG_VECTORIZING",
            Self::RagSearching => "RAG_SEARCHING",
            Self::RagScoring => "RAG_SCORING",
            Self::RagSorting => "RAG_SORTING",
            Self::RagPreparing => "RAG_PREPARING",
            Self::RagComplete => "RAG_COMPLETE",
            Self::LlmStart => "LLM_START",
            Self::LlmLoading => "LLM_LOADING",
            Self::LlmAnalyzing => "LLM_ANALYZING",
            Self::LlmContext => "LLM_CONTEXT",
            Self::LlmGenerating => "LLM_GENERATING",
            Self::LlmOptimizing => "LLM_OPTIMIZING",
            Self::LlmWisdom => "LLM_WISDOM",
            Self::LlmChecking => "LLM_CHECKING",
            Self::LlmPolishing => "LLM_POLISHING",
            Self::LlmFormatting => "LLM_FORMATTING",
            Self::LlmFinalCheck => "LLM_FINAL_CHECK",
            Self::LlmComplete => "LLM_COMPLETE",
            Self::LlmStreaming => "LLM_STREAMING",
            Self::LlmStreamingEarly => "LLM_STREAMING_EARLY",
            Self::LlmStreamingMiddle => "LLM_STREAMING_MIDDLE",
            Self::LlmStreamingLate => "LLM_STREAMING_LATE",
            Self::LlmStreamingOvertime => "LLM_STREAMING_OVERTIME",
            Self::Validating => "VALIDATING",
            Self::ValidationComplete => "VALIDATION_COMPLETE",
            Self::Finalizing => "FINALIZING",
            Self::Completed => "COMPLETED",
            Self::Success => "SUCCESS",
            Self::Error => "ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}

/// How far along the elapsed/estimate ratio an in-flight heartbeat operation
/// is, driving the adaptive LLM streaming status code (spec §4.8 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatPhase {
    Early,
    Middle,
    Late,
    Overtime,
}

impl HeartbeatPhase {
    /// Classify elapsed/estimated ratio into a heartbeat phase.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < 0.3 {
            Self::Early
        } else if ratio < 0.7 {
            Self::Middle
        } else if ratio <= 1.0 {
            Self::Late
        } else {
            Self::Overtime
        }
    }

    pub fn status_code(self) -> StatusCode {
        match self {
            Self::Early => StatusCode::LlmStreamingEarly,
            Self::Middle => StatusCode::LlmStreamingMiddle,
            Self::Late => StatusCode::LlmStreamingLate,
            Self::Overtime => StatusCode::LlmStreamingOvertime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_spec_ranges() {
        assert_eq!(StatusCode::Queued.code(), 0);
        assert_eq!(StatusCode::RagStart.code(), 10);
        assert_eq!(StatusCode::LlmStart.code(), 20);
        assert_eq!(StatusCode::LlmStreaming.code(), 40);
        assert_eq!(StatusCode::Validating.code(), 50);
        assert_eq!(StatusCode::Finalizing.code(), 60);
        assert_eq!(StatusCode::Error.code(), 70);
    }

    #[test]
    fn heartbeat_phase_boundaries() {
        assert_eq!(HeartbeatPhase::from_ratio(0.0), HeartbeatPhase::Early);
        assert_eq!(HeartbeatPhase::from_ratio(0.29), HeartbeatPhase::Early);
        assert_eq!(HeartbeatPhase::from_ratio(0.3), HeartbeatPhase::Middle);
        assert_eq!(HeartbeatPhase::from_ratio(0.69), HeartbeatPhase::Middle);
        assert_eq!(HeartbeatPhase::from_ratio(0.7), HeartbeatPhase::Late);
        assert_eq!(HeartbeatPhase::from_ratio(1.0), HeartbeatPhase::Late);
        assert_eq!(HeartbeatPhase::from_ratio(1.01), HeartbeatPhase::Overtime);
    }

    #[test]
    fn heartbeat_phase_maps_to_status_code() {
        assert_eq!(HeartbeatPhase::Early.status_code(), StatusCode::LlmStreamingEarly);
        assert_eq!(HeartbeatPhase::Overtime.status_code(), StatusCode::LlmStreamingOvertime);
    }

    #[test]
    fn display_includes_name_and_code() {
        assert_eq!(StatusCode::Completed.to_string(), "COMPLETED(61)");
    }
}
