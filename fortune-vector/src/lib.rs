//! Vector store adapter (spec §4.1 C1): exact poem lookup plus similarity
//! search over a ChromaDB-style HTTP collection, guarded by a circuit
//! breaker and a wall-clock timeout.

mod chroma;

pub use chroma::ChromaVectorStore;

use async_trait::async_trait;
use fortune_shared::{FortuneResult, PoemChunk, ScoredChunk};
use serde::{Deserialize, Serialize};

/// Structural filter conjunction applied to a similarity search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    pub temple: Option<String>,
    pub language: Option<String>,
}

/// Aggregate counters used by health reporting (spec §4.1 `stats()`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreStats {
    pub total_chunks: u64,
    pub unique_temples: u64,
}

/// Uniform interface over the backing similarity index.
///
/// All operations are read-only; implementations are expected to guard
/// themselves with a circuit breaker and timeout (spec §4.1 Semantics).
#[async_trait]
pub trait VectorStore: Send + Sync + std::fmt::Debug {
    async fn get_poem(&self, temple: &str, number: i32) -> FortuneResult<Vec<PoemChunk>>;

    async fn search(
        &self,
        query_text: &str,
        top_k: usize,
        filters: SearchFilters,
    ) -> FortuneResult<Vec<ScoredChunk>>;

    async fn stats(&self) -> FortuneResult<VectorStoreStats>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use fortune_shared::task::Language;
    use std::sync::Mutex;

    /// A deterministic in-memory double used to exercise callers of
    /// [`VectorStore`] without a real ChromaDB instance.
    #[derive(Debug, Default)]
    pub struct FakeVectorStore {
        pub poems: Mutex<Vec<PoemChunk>>,
    }

    fn sample_chunk(temple: &str, number: i32) -> PoemChunk {
        PoemChunk {
            chunk_id: format!("{temple}-{number}"),
            temple: temple.to_string(),
            poem_number: number,
            fortune_level: Some("upper".into()),
            title: "title".into(),
            body: "body text".into(),
            language: Language::En,
            analysis: None,
            rag_analysis_text: None,
            generation_metadata: None,
        }
    }

    #[async_trait]
    impl VectorStore for FakeVectorStore {
        async fn get_poem(&self, temple: &str, number: i32) -> FortuneResult<Vec<PoemChunk>> {
            let poems = self.poems.lock().unwrap();
            let matches: Vec<PoemChunk> = poems
                .iter()
                .filter(|p| p.temple == temple && p.poem_number == number)
                .cloned()
                .collect();
            if matches.is_empty() {
                Err(fortune_shared::FortuneError::NotFound(format!(
                    "no chunks for {temple}/{number}"
                )))
            } else {
                Ok(matches)
            }
        }

        async fn search(
            &self,
            _query_text: &str,
            top_k: usize,
            filters: SearchFilters,
        ) -> FortuneResult<Vec<ScoredChunk>> {
            let poems = self.poems.lock().unwrap();
            let mut results: Vec<ScoredChunk> = poems
                .iter()
                .filter(|p| filters.temple.as_deref().map_or(true, |t| t == p.temple))
                .enumerate()
                .map(|(i, p)| ScoredChunk { chunk: p.clone(), score: i as f64 * 0.1 })
                .collect();
            results.truncate(top_k);
            Ok(results)
        }

        async fn stats(&self) -> FortuneResult<VectorStoreStats> {
            let poems = self.poems.lock().unwrap();
            Ok(VectorStoreStats {
                total_chunks: poems.len() as u64,
                unique_temples: 1,
            })
        }
    }

    #[tokio::test]
    async fn get_poem_returns_not_found_for_unknown_key() {
        let store = FakeVectorStore::default();
        let err = store.get_poem("guan_yin_temple", 1).await.unwrap_err();
        assert_eq!(err.category(), fortune_shared::ErrorCategory::NotFound);
    }

    #[tokio::test]
    async fn get_poem_returns_matching_chunks() {
        let store = FakeVectorStore {
            poems: Mutex::new(vec![sample_chunk("guan_yin_temple", 42)]),
        };
        let chunks = store.get_poem("guan_yin_temple", 42).await.unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn search_respects_top_k() {
        let store = FakeVectorStore {
            poems: Mutex::new((0..10).map(|i| sample_chunk("guan_yin_temple", i)).collect()),
        };
        let results = store
            .search("career advice", 3, SearchFilters::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn search_applies_temple_filter() {
        let store = FakeVectorStore {
            poems: Mutex::new(vec![
                sample_chunk("guan_yin_temple", 1),
                sample_chunk("mazu_temple", 1),
            ]),
        };
        let filters = SearchFilters { temple: Some("mazu_temple".to_string()), language: None };
        let results = store.search("q", 10, filters).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.temple, "mazu_temple");
    }
}
