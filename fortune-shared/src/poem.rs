//! Retrieved fortune poem content (spec §3 PoemChunk).

use serde::{Deserialize, Serialize};

use crate::task::Language;

/// An immutable chunk of poem content as ingested into the vector store.
///
/// `(temple, poem_number)` is a primary semantic key; several chunks may
/// exist per poem (e.g. one per language, or a separate analysis chunk), but
/// at least one chunk always carries the full poem body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoemChunk {
    /// Stable, content-addressed chunk id.
    pub chunk_id: String,
    pub temple: String,
    pub poem_number: i32,
    pub fortune_level: Option<String>,
    pub title: String,
    pub body: String,
    pub language: Language,
    pub analysis: Option<serde_json::Value>,
    pub rag_analysis_text: Option<String>,
    pub generation_metadata: Option<serde_json::Value>,
}

/// A chunk paired with its similarity search score.
///
/// `score` is a cosine distance in `[0, 2]`; lower means closer. Results from
/// [`search`](../../fortune_vector/trait.VectorStore.html#tymethod.search)
/// are sorted ascending by score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: PoemChunk,
    pub score: f64,
}

impl ScoredChunk {
    /// A `[0, 1]`-normalized similarity derived from the distance score.
    pub fn similarity(&self) -> f64 {
        1.0 - (self.score / 2.0).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk() -> PoemChunk {
        PoemChunk {
            chunk_id: "guan_yin-42".into(),
            temple: "guan_yin".into(),
            poem_number: 42,
            fortune_level: Some("upper-upper".into()),
            title: "第四十二籤".into(),
            body: "雲開月出照乾坤".into(),
            language: Language::Zh,
            analysis: None,
            rag_analysis_text: Some("A period of obscurity gives way to clarity.".into()),
            generation_metadata: None,
        }
    }

    #[test]
    fn similarity_is_one_at_zero_distance() {
        let scored = ScoredChunk { chunk: sample_chunk(), score: 0.0 };
        assert_eq!(scored.similarity(), 1.0);
    }

    #[test]
    fn similarity_is_zero_at_max_distance() {
        let scored = ScoredChunk { chunk: sample_chunk(), score: 2.0 };
        assert_eq!(scored.similarity(), 0.0);
    }

    #[test]
    fn similarity_is_clamped_for_out_of_range_scores() {
        let scored = ScoredChunk { chunk: sample_chunk(), score: 3.0 };
        assert_eq!(scored.similarity(), 0.0);
    }
}
