//! LLM adapter (spec §4.2 C2): provider-agnostic generation with an
//! optional schema-constrained structured mode.

pub mod schema;

pub use schema::InterpretationSections;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, ResponseFormat,
};
use async_openai::Client;
use async_trait::async_trait;
use fortune_resilience::CircuitBreaker;
use fortune_shared::{FortuneError, FortuneResult};
use validator::Validate;

/// Per-call generation tunables (spec §4.2 `generate`).
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2_500,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Uniform interface over a generation backend.
#[async_trait]
pub trait LlmAdapter: Send + Sync + std::fmt::Debug {
    /// Free-form text generation.
    async fn generate_text(&self, prompt: &str, params: &GenerationParams) -> FortuneResult<String>;

    /// Structured generation against the fixed seven-section schema,
    /// retrying up to twice on parse/validation failure before giving up
    /// (spec §4.2 structured mode contract).
    async fn generate_sections(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> FortuneResult<InterpretationSections> {
        const MAX_ATTEMPTS: u32 = 3;
        let mut last_error = None;
        for attempt in 1..=MAX_ATTEMPTS {
            let raw = self.generate_text(&schema_embedded_prompt(prompt), params).await?;
            match parse_sections(&raw) {
                Ok(sections) => return Ok(sections),
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "structured output failed validation");
                    last_error = Some(err);
                }
            }
        }
        Err(FortuneError::MalformedModelOutput(
            last_error.map(|e| e.to_string()).unwrap_or_else(|| "no attempts made".to_string()),
        ))
    }
}

fn schema_embedded_prompt(prompt: &str) -> String {
    format!(
        "{prompt}\n\nRespond with a single JSON object with exactly these string fields, in this \
         order: line_by_line_interpretation, overall_development, positive_factors, challenges, \
         suggested_actions, supplementary_notes, conclusion. No prose outside the JSON object."
    )
}

fn parse_sections(raw: &str) -> FortuneResult<InterpretationSections> {
    let trimmed = extract_json_object(raw);
    let sections: InterpretationSections = serde_json::from_str(trimmed)
        .map_err(|e| FortuneError::MalformedModelOutput(format!("invalid JSON: {e}")))?;
    sections
        .validate()
        .map_err(|e| FortuneError::MalformedModelOutput(format!("schema validation failed: {e}")))?;
    Ok(sections)
}

/// Models occasionally wrap JSON in markdown fences or leading chatter;
/// take the outermost `{...}` span rather than failing outright.
fn extract_json_object(raw: &str) -> &str {
    let start = raw.find('{');
    let end = raw.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if e >= s => &raw[s..=e],
        _ => raw,
    }
}

/// OpenAI-compatible chat completion backend, guarded by a circuit breaker.
#[derive(Debug)]
pub struct OpenAiLlmAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    breaker: Arc<CircuitBreaker>,
}

impl OpenAiLlmAdapter {
    pub fn new(model: impl Into<String>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            client: Client::with_config(OpenAIConfig::new()),
            model: model.into(),
            breaker,
        }
    }

    pub fn with_base_url(model: impl Into<String>, base_url: impl Into<String>, breaker: Arc<CircuitBreaker>) -> Self {
        let config = OpenAIConfig::new().with_api_base(base_url);
        Self {
            client: Client::with_config(config),
            model: model.into(),
            breaker,
        }
    }
}

#[async_trait]
impl LlmAdapter for OpenAiLlmAdapter {
    async fn generate_text(&self, prompt: &str, params: &GenerationParams) -> FortuneResult<String> {
        if !self.breaker.should_allow() {
            return Err(FortuneError::DependencyUnavailable("llm circuit open".into()));
        }

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(params.temperature)
            .max_tokens(params.max_tokens)
            .response_format(ResponseFormat::JsonObject)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content("You are a temple fortune-teller interpreting a drawn poem for a supplicant.")
                    .build()
                    .map_err(|e| FortuneError::Internal(format!("request build failed: {e}")))?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt)
                    .build()
                    .map_err(|e| FortuneError::Internal(format!("request build failed: {e}")))?
                    .into(),
            ])
            .build()
            .map_err(|e| FortuneError::Internal(format!("request build failed: {e}")))?;

        let start = Instant::now();
        let outcome = tokio::time::timeout(params.timeout, self.client.chat().create(request)).await;
        match outcome {
            Ok(Ok(response)) => {
                self.breaker.record_success_manual(start.elapsed());
                response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
                    .ok_or_else(|| FortuneError::MalformedModelOutput("empty completion".into()))
            }
            Ok(Err(err)) => {
                self.breaker.record_failure_manual(start.elapsed());
                Err(FortuneError::DependencyUnavailable(format!("llm request failed: {err}")))
            }
            Err(_elapsed) => {
                self.breaker.record_failure_manual(start.elapsed());
                Err(FortuneError::Timeout("llm call exceeded configured timeout".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_json() -> String {
        serde_json::json!({
            "line_by_line_interpretation": "x".repeat(100),
            "overall_development": "x".repeat(50),
            "positive_factors": "x".repeat(50),
            "challenges": "x".repeat(50),
            "suggested_actions": "x".repeat(50),
            "supplementary_notes": "x".repeat(30),
            "conclusion": "x".repeat(30),
        })
        .to_string()
    }

    #[test]
    fn extract_json_object_strips_markdown_fence() {
        let wrapped = format!("```json\n{}\n```", valid_json());
        let extracted = extract_json_object(&wrapped);
        assert!(serde_json::from_str::<serde_json::Value>(extracted).is_ok());
    }

    #[test]
    fn parse_sections_accepts_well_formed_payload() {
        let sections = parse_sections(&valid_json()).unwrap();
        assert_eq!(sections.conclusion.len(), 30);
    }

    #[test]
    fn parse_sections_rejects_short_field() {
        let mut value: serde_json::Value = serde_json::from_str(&valid_json()).unwrap();
        value["conclusion"] = serde_json::json!("too short");
        let err = parse_sections(&value.to_string()).unwrap_err();
        assert_eq!(err.category(), fortune_shared::ErrorCategory::MalformedModelOutput);
    }

    #[test]
    fn parse_sections_rejects_non_json() {
        let err = parse_sections("not json at all").unwrap_err();
        assert_eq!(err.category(), fortune_shared::ErrorCategory::MalformedModelOutput);
    }

    #[derive(Debug, Default)]
    struct FakeAdapter {
        responses: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmAdapter for FakeAdapter {
        async fn generate_text(&self, _prompt: &str, _params: &GenerationParams) -> FortuneResult<String> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(FortuneError::Internal("no canned responses left".into()));
            }
            Ok(responses.remove(0))
        }
    }

    #[tokio::test]
    async fn generate_sections_retries_once_then_succeeds() {
        let adapter = FakeAdapter {
            responses: std::sync::Mutex::new(vec!["garbage".to_string(), valid_json()]),
        };
        let result = adapter.generate_sections("prompt", &GenerationParams::default()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn generate_sections_fails_after_exhausting_retries() {
        let adapter = FakeAdapter {
            responses: std::sync::Mutex::new(vec!["garbage".into(), "also garbage".into(), "still garbage".into()]),
        };
        let result = adapter.generate_sections("prompt", &GenerationParams::default()).await;
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().category(), fortune_shared::ErrorCategory::MalformedModelOutput);
    }
}
