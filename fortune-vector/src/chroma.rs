//! ChromaDB-backed [`VectorStore`] implementation.
//!
//! Talks to a ChromaDB HTTP server's query/get endpoints. Metadata keys on
//! each returned chunk (`temple`, `poem_number`, `title`, `body`,
//! `fortune_level`, ...) mirror the ingestion job's schema; this adapter
//! does not perform ingestion itself.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fortune_resilience::CircuitBreaker;
use fortune_shared::task::Language;
use fortune_shared::{FortuneError, FortuneResult, PoemChunk, ScoredChunk};
use serde::Deserialize;

use crate::{SearchFilters, VectorStore, VectorStoreStats};

#[derive(Debug, Deserialize)]
struct ChromaMetadata {
    temple: String,
    poem_number: i32,
    title: String,
    body: String,
    #[serde(default)]
    fortune_level: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    analysis: Option<serde_json::Value>,
    #[serde(default)]
    rag_analysis_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChromaQueryResponse {
    ids: Vec<Vec<String>>,
    metadatas: Vec<Vec<ChromaMetadata>>,
    distances: Vec<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct ChromaGetResponse {
    ids: Vec<String>,
    metadatas: Vec<ChromaMetadata>,
}

#[derive(Debug, Deserialize)]
struct ChromaCountResponse {
    count: u64,
    unique_temples: u64,
}

fn parse_language(tag: Option<&str>) -> Language {
    match tag {
        Some("en") => Language::En,
        Some("ja") => Language::Ja,
        _ => Language::Zh,
    }
}

fn chunk_from(id: String, metadata: ChromaMetadata) -> PoemChunk {
    PoemChunk {
        chunk_id: id,
        temple: metadata.temple,
        poem_number: metadata.poem_number,
        fortune_level: metadata.fortune_level,
        title: metadata.title,
        body: metadata.body,
        language: parse_language(metadata.language.as_deref()),
        analysis: metadata.analysis,
        rag_analysis_text: metadata.rag_analysis_text,
        generation_metadata: None,
    }
}

/// Wall-clock budget for every call (spec §4.1: "a 30-second wall-clock
/// timeout").
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for a ChromaDB collection, guarded by a circuit breaker and
/// a per-call timeout.
#[derive(Debug, Clone)]
pub struct ChromaVectorStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    breaker: Arc<CircuitBreaker>,
}

impl ChromaVectorStore {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            collection: collection.into(),
            breaker,
        }
    }

    async fn guarded<F, T, Fut>(&self, op: F) -> FortuneResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = FortuneResult<T>>,
    {
        if !self.breaker.should_allow() {
            return Err(FortuneError::DependencyUnavailable("vector store circuit open".into()));
        }
        let start = Instant::now();
        let result = tokio::time::timeout(CALL_TIMEOUT, op()).await;
        match result {
            Ok(Ok(value)) => {
                self.breaker.record_success_manual(start.elapsed());
                Ok(value)
            }
            Ok(Err(err)) => {
                self.breaker.record_failure_manual(start.elapsed());
                Err(err)
            }
            Err(_elapsed) => {
                self.breaker.record_failure_manual(start.elapsed());
                Err(FortuneError::Timeout("vector store call exceeded 30s".into()))
            }
        }
    }
}

#[async_trait]
impl VectorStore for ChromaVectorStore {
    async fn get_poem(&self, temple: &str, number: i32) -> FortuneResult<Vec<PoemChunk>> {
        let url = format!("{}/api/v1/collections/{}/get", self.base_url, self.collection);
        let body = serde_json::json!({
            "where": { "temple": temple, "poem_number": number },
        });
        self.guarded(|| async {
            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| FortuneError::DependencyUnavailable(format!("vector store request failed: {e}")))?;
            let parsed: ChromaGetResponse = response
                .json()
                .await
                .map_err(|e| FortuneError::DependencyUnavailable(format!("vector store response malformed: {e}")))?;
            if parsed.ids.is_empty() {
                return Err(FortuneError::NotFound(format!("no poem chunks for {temple}/{number}")));
            }
            Ok(parsed
                .ids
                .into_iter()
                .zip(parsed.metadatas)
                .map(|(id, metadata)| chunk_from(id, metadata))
                .collect())
        })
        .await
    }

    async fn search(
        &self,
        query_text: &str,
        top_k: usize,
        filters: SearchFilters,
    ) -> FortuneResult<Vec<ScoredChunk>> {
        let url = format!("{}/api/v1/collections/{}/query", self.base_url, self.collection);
        let mut where_clause = serde_json::Map::new();
        if let Some(temple) = &filters.temple {
            where_clause.insert("temple".into(), serde_json::json!(temple));
        }
        if let Some(language) = &filters.language {
            where_clause.insert("language".into(), serde_json::json!(language));
        }
        let body = serde_json::json!({
            "query_texts": [query_text],
            "n_results": top_k,
            "where": where_clause,
        });
        self.guarded(|| async {
            let response = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| FortuneError::DependencyUnavailable(format!("vector store request failed: {e}")))?;
            let parsed: ChromaQueryResponse = response
                .json()
                .await
                .map_err(|e| FortuneError::DependencyUnavailable(format!("vector store response malformed: {e}")))?;
            let ids = parsed.ids.into_iter().next().unwrap_or_default();
            let metadatas = parsed.metadatas.into_iter().next().unwrap_or_default();
            let distances = parsed.distances.into_iter().next().unwrap_or_default();
            let mut scored: Vec<ScoredChunk> = ids
                .into_iter()
                .zip(metadatas)
                .zip(distances)
                .map(|((id, metadata), score)| ScoredChunk { chunk: chunk_from(id, metadata), score })
                .collect();
            scored.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
            Ok(scored)
        })
        .await
    }

    async fn stats(&self) -> FortuneResult<VectorStoreStats> {
        let url = format!("{}/api/v1/collections/{}/count", self.base_url, self.collection);
        self.guarded(|| async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| FortuneError::DependencyUnavailable(format!("vector store request failed: {e}")))?;
            let parsed: ChromaCountResponse = response
                .json()
                .await
                .map_err(|e| FortuneError::DependencyUnavailable(format!("vector store response malformed: {e}")))?;
            Ok(VectorStoreStats {
                total_chunks: parsed.count,
                unique_temples: parsed.unique_temples,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fortune_resilience::CircuitBreakerConfig;

    fn breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new("vector_store", CircuitBreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(45),
            success_threshold: 2,
        }))
    }

    #[tokio::test]
    async fn open_breaker_short_circuits_before_any_request() {
        let cb = breaker();
        cb.force_open_internal();
        let store = ChromaVectorStore::new("http://localhost:9999", "poems", cb);
        let err = store.get_poem("guan_yin_temple", 1).await.unwrap_err();
        assert_eq!(err.category(), fortune_shared::ErrorCategory::DependencyUnavailable);
    }

    #[test]
    fn parse_language_defaults_to_zh() {
        assert_eq!(parse_language(None), Language::Zh);
        assert_eq!(parse_language(Some("en")), Language::En);
        assert_eq!(parse_language(Some("ja")), Language::Ja);
        assert_eq!(parse_language(Some("bogus")), Language::Zh);
    }
}
