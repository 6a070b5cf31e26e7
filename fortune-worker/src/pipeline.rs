//! Pipeline orchestrator (spec §4.8 C8): the per-task RAG -> prompt ->
//! LLM -> validate sequence, emitting progress at every stage boundary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fortune_bus::ProgressBus;
use fortune_cache::ResultCache;
use fortune_llm::{GenerationParams, InterpretationSections, LlmAdapter};
use fortune_shared::deity::DeityMap;
use fortune_shared::status::{HeartbeatPhase, StatusCode};
use fortune_shared::{CacheEntry, CacheKey, ErrorCategory, FortuneError, FortuneResult, Language, Task};
use fortune_store::TaskStore;
use fortune_vector::{SearchFilters, VectorStore};
use uuid::Uuid;

const MIN_RESPONSE_LEN: usize = 300;
const MAX_RESPONSE_LEN: usize = 20_000;
const HEARTBEAT_MIN: Duration = Duration::from_millis(800);
const HEARTBEAT_MAX: Duration = Duration::from_millis(1_500);

/// Tracks a rolling average duration for one operation kind, used to drive
/// the adaptive heartbeat phase (spec §4.8 step 5).
#[derive(Debug)]
pub struct RollingAverage {
    millis: AtomicU64,
}

impl RollingAverage {
    pub fn new(seed: Duration) -> Self {
        Self {
            millis: AtomicU64::new(seed.as_millis() as u64),
        }
    }

    fn estimate(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::Relaxed))
    }

    /// Exponential moving average, weighted 80% history / 20% latest sample.
    fn record(&self, sample: Duration) {
        let prev = self.millis.load(Ordering::Relaxed) as f64;
        let next = prev * 0.8 + sample.as_millis() as f64 * 0.2;
        self.millis.store(next.round() as u64, Ordering::Relaxed);
    }
}

pub struct PipelineOrchestrator {
    pub store: Arc<TaskStore>,
    pub cache: Arc<ResultCache>,
    pub vector: Arc<dyn VectorStore>,
    pub llm: Arc<dyn LlmAdapter>,
    pub bus: Arc<ProgressBus>,
    pub deities: Arc<DeityMap>,
    pub rag_top_k: usize,
    pub llm_params: GenerationParams,
    pub llm_duration_estimate: Arc<RollingAverage>,
}

impl PipelineOrchestrator {
    /// Run the full pipeline for a task the caller has already claimed
    /// (`state == Processing`). All terminal outcomes - success, validation
    /// failure, dependency failure, cancellation - are persisted to the
    /// store and published to the bus before this returns.
    pub async fn run(&self, task: Task) -> FortuneResult<()> {
        let task_id = task.id;
        let language = task.language;

        // 1. Initialize
        self.emit(task_id, language, StatusCode::Initializing, 5).await;
        let temple = match self.deities.resolve(&task.deity_id) {
            Ok(t) => t.to_string(),
            Err(err) => {
                self.fail(task_id, &err).await;
                return Err(err);
            }
        };
        if task.question.trim().is_empty() {
            let err = FortuneError::InvalidInput("question is empty after trimming".to_string());
            self.fail(task_id, &err).await;
            return Err(err);
        }
        if self.bail_if_cancelled(task_id).await {
            return Ok(());
        }

        // 2. Cache probe
        self.emit(task_id, language, StatusCode::Initializing, 10).await;
        let key = CacheKey::new(&temple, task.fortune_number, &task.question, task.language);
        if let Some(cached) = self.cache.get(&key).await {
            self.store
                .complete(
                    task_id,
                    &cached.response_text,
                    &cached.response_sections,
                    cached.confidence,
                    &cached.sources_used,
                    cached.processing_time_ms,
                    true,
                )
                .await?;
            self.bus.publish_complete(
                task_id,
                cached.response_text,
                cached.response_sections,
                cached.confidence,
                cached.sources_used,
                cached.processing_time_ms,
                true,
            );
            return Ok(());
        }
        if self.bail_if_cancelled(task_id).await {
            return Ok(());
        }

        // 3. RAG stage
        let started = Instant::now();
        self.emit(task_id, language, StatusCode::RagStart, 20).await;
        self.emit(task_id, language, StatusCode::RagConnecting, 25).await;
        let poem_chunks = match self.vector.get_poem(&temple, task.fortune_number).await {
            Ok(chunks) => chunks,
            Err(err) => {
                self.fail(task_id, &err).await;
                return Err(err);
            }
        };
        if poem_chunks.is_empty() {
            let err = FortuneError::NotFound(format!(
                "no poem found for {temple} #{}",
                task.fortune_number
            ));
            self.fail(task_id, &err).await;
            return Err(err);
        }

        self.emit(task_id, language, StatusCode::RagSearching, 35).await;
        let filters = SearchFilters {
            temple: Some(temple.clone()),
            language: Some(task.language.to_string()),
        };
        let contextual = match self.vector.search(&task.question, self.rag_top_k, filters).await {
            Ok(hits) => hits,
            Err(err) => {
                self.fail(task_id, &err).await;
                return Err(err);
            }
        };

        self.emit(task_id, language, StatusCode::RagSorting, 45).await;
        let mut sources_used: Vec<String> = vec![poem_chunks[0].chunk_id.clone()];
        let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
        seen.insert(poem_chunks[0].chunk_id.as_str());
        for hit in &contextual {
            if seen.insert(hit.chunk.chunk_id.as_str()) {
                sources_used.push(hit.chunk.chunk_id.clone());
            }
        }
        self.emit(task_id, language, StatusCode::RagComplete, 50).await;
        if self.bail_if_cancelled(task_id).await {
            return Ok(());
        }

        // 4. Prompt assembly
        self.emit(task_id, language, StatusCode::LlmContext, 55).await;
        let prompt = build_prompt(&task, &poem_chunks[0], &contextual);

        // 5. LLM invocation, with heartbeat-driven adaptive progress.
        if self.bail_if_cancelled(task_id).await {
            return Ok(());
        }
        let mut sections = match self.generate_with_heartbeat(task_id, language, &prompt).await {
            Ok(sections) => sections,
            Err(err) => {
                self.fail(task_id, &err).await;
                return Err(err);
            }
        };
        self.llm_duration_estimate.record(started.elapsed());

        // 6. Validation, with at most one retry against a tightened prompt
        // (spec §4.8 step 6) - distinct from the adapter-level parse retry
        // of §4.2, which has already run inside `generate_with_heartbeat`.
        self.emit(task_id, language, StatusCode::Validating, 92).await;
        if let Err(err) = validate_sections(&sections) {
            if self.bail_if_cancelled(task_id).await {
                return Ok(());
            }
            let retry_prompt = tightened_prompt(&prompt, &err);
            sections = match self.generate_with_heartbeat(task_id, language, &retry_prompt).await {
                Ok(sections) => sections,
                Err(retry_err) => {
                    self.fail(task_id, &retry_err).await;
                    return Err(retry_err);
                }
            };
            if let Err(retry_err) = validate_sections(&sections) {
                self.fail(task_id, &retry_err).await;
                return Err(retry_err);
            }
        }
        self.emit(task_id, language, StatusCode::ValidationComplete, 94).await;
        if self.bail_if_cancelled(task_id).await {
            return Ok(());
        }

        // 7. Finalize
        self.emit(task_id, language, StatusCode::Finalizing, 95).await;
        let response_text = sections.concatenated();
        let response_sections = serde_json::to_value(&sections)
            .map_err(|e| FortuneError::Internal(format!("failed to serialize sections: {e}")))?;
        let confidence = if contextual.is_empty() {
            0.5
        } else {
            contextual
                .iter()
                .map(|c| c.similarity())
                .fold(f64::INFINITY, f64::min)
                .clamp(0.0, 1.0)
        };
        let processing_time_ms = started.elapsed().as_millis() as i64;

        self.store
            .complete(
                task_id,
                &response_text,
                &response_sections,
                Some(confidence),
                &sources_used,
                processing_time_ms,
                true,
            )
            .await?;
        let entry = CacheEntry::new(
            key,
            response_text.clone(),
            response_sections.clone(),
            sources_used.clone(),
            Some(confidence),
            processing_time_ms,
        );
        self.cache.put(entry).await;
        self.bus.publish_complete(
            task_id,
            response_text,
            response_sections,
            Some(confidence),
            sources_used,
            processing_time_ms,
            true,
        );
        Ok(())
    }

    async fn generate_with_heartbeat(
        &self,
        task_id: Uuid,
        language: Language,
        prompt: &str,
    ) -> FortuneResult<InterpretationSections> {
        self.emit(task_id, language, StatusCode::LlmGenerating, 60).await;

        let mut generation = self.llm.generate_sections(prompt, &self.llm_params);

        let estimate = self.llm_duration_estimate.estimate().max(Duration::from_secs(1));
        let start = Instant::now();
        let mut tick = tokio::time::interval(HEARTBEAT_MIN);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                result = &mut generation => return result,
                _ = tick.tick() => {
                    if self.bail_if_cancelled(task_id).await {
                        return Err(FortuneError::Cancelled);
                    }
                    let ratio = start.elapsed().as_secs_f64() / estimate.as_secs_f64();
                    let phase = HeartbeatPhase::from_ratio(ratio);
                    let progress = 60 + ((phase_fraction(phase) * 30.0) as i32).min(30);
                    self.emit(task_id, language, phase.status_code(), progress.min(90)).await;
                    tick = tokio::time::interval(heartbeat_interval(ratio));
                    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                }
            }
        }
    }

    async fn emit(&self, task_id: Uuid, language: Language, code: StatusCode, progress: i32) {
        let message = fortune_shared::message_for(code, language).to_string();
        if let Err(err) = self.store.update_progress(task_id, code.code(), progress, Some(&message)).await {
            tracing::warn!(%task_id, error = %err, "failed to persist progress update");
        }
        self.bus.publish_progress(task_id, code.code(), progress, Some(message));
    }

    async fn bail_if_cancelled(&self, task_id: Uuid) -> bool {
        match self.store.is_cancel_requested(task_id).await {
            Ok(true) => {
                let _ = self.store.mark_cancelled(task_id).await;
                self.bus.publish_error(task_id, ErrorCategory::Cancelled, "cancelled");
                true
            }
            Ok(false) => false,
            Err(err) => {
                tracing::warn!(%task_id, error = %err, "failed to check cancel flag");
                false
            }
        }
    }

    async fn fail(&self, task_id: Uuid, err: &FortuneError) {
        let category = err.category();
        if let Err(store_err) = self.store.fail(task_id, category, &err.to_string()).await {
            tracing::warn!(%task_id, error = %store_err, "failed to persist task failure");
        }
        self.bus.publish_error(task_id, category, err.to_string());
    }
}

fn phase_fraction(phase: HeartbeatPhase) -> f64 {
    match phase {
        HeartbeatPhase::Early => 0.1,
        HeartbeatPhase::Middle => 0.5,
        HeartbeatPhase::Late => 0.85,
        HeartbeatPhase::Overtime => 1.0,
    }
}

fn heartbeat_interval(ratio: f64) -> Duration {
    // Tick faster while early, coarser once the estimate is long blown past.
    if ratio > 1.0 {
        HEARTBEAT_MAX
    } else {
        HEARTBEAT_MIN
    }
}

fn build_prompt(task: &Task, poem: &fortune_shared::PoemChunk, context: &[fortune_shared::ScoredChunk]) -> String {
    let preamble = match task.language {
        fortune_shared::Language::Zh => "你是一位解籤的智者，請以清晰且有同理心的語氣回答信眾的問題。",
        fortune_shared::Language::En => "You are a wise fortune interpreter. Answer the seeker's question clearly and with empathy.",
        fortune_shared::Language::Ja => "あなたは籤を解釈する賢者です。質問者の問いに明確かつ共感的に答えてください。",
    };
    let mut prompt = String::new();
    prompt.push_str(preamble);
    prompt.push_str("\n\n");
    prompt.push_str(&format!(
        "Poem #{} ({}): {}\nFortune level: {}\nBody:\n{}\n\n",
        poem.poem_number,
        poem.temple,
        poem.title,
        poem.fortune_level.as_deref().unwrap_or("unspecified"),
        poem.body
    ));
    if !context.is_empty() {
        prompt.push_str("Additional context:\n");
        for hit in context {
            prompt.push_str(&format!("- {}: {}\n", hit.chunk.title, hit.chunk.body));
        }
        prompt.push('\n');
    }
    prompt.push_str(&format!("Question: {}\n", task.question));
    prompt
}

fn validate_sections(sections: &InterpretationSections) -> FortuneResult<()> {
    let total_len = sections.concatenated().chars().count();
    if !(MIN_RESPONSE_LEN..=MAX_RESPONSE_LEN).contains(&total_len) {
        return Err(FortuneError::MalformedModelOutput(format!(
            "total response length {total_len} outside [{MIN_RESPONSE_LEN}, {MAX_RESPONSE_LEN}]"
        )));
    }
    Ok(())
}

/// Append an explicit correction to `prompt` for the single retry spec §4.8
/// step 6 allows after a validation failure.
fn tightened_prompt(prompt: &str, err: &FortuneError) -> String {
    format!(
        "{prompt}\n\nYour previous response was rejected: {err}. Rewrite it so the combined \
         length of all seven sections falls between {MIN_RESPONSE_LEN} and {MAX_RESPONSE_LEN} \
         characters, keeping every section non-empty and on topic."
    )
}
