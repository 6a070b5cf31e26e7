//! Result cache key/value types (spec §3 CacheEntry).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::task::Language;

/// Deterministic cache key: `(temple, poem_number, question fingerprint,
/// language)`. The question is lower-cased and trimmed before hashing so that
/// whitespace/case variants of the same question share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub temple: String,
    pub poem_number: i32,
    pub question_fingerprint: String,
    pub language: String,
}

impl CacheKey {
    pub fn new(temple: &str, poem_number: i32, question: &str, language: Language) -> Self {
        let normalized = question.trim().to_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        let digest = hasher.finalize();
        Self {
            temple: temple.to_string(),
            poem_number,
            question_fingerprint: format!("{digest:x}"),
            language: language.to_string(),
        }
    }
}

/// A cached interpretation result, keyed by [`CacheKey`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub response_text: String,
    pub response_sections: serde_json::Value,
    pub sources_used: Vec<String>,
    pub confidence: Option<f64>,
    pub processing_time_ms: i64,
    pub cached_at: DateTime<Utc>,
    pub hit_count: u64,
}

impl CacheEntry {
    pub fn new(
        key: CacheKey,
        response_text: String,
        response_sections: serde_json::Value,
        sources_used: Vec<String>,
        confidence: Option<f64>,
        processing_time_ms: i64,
    ) -> Self {
        Self {
            key,
            response_text,
            response_sections,
            sources_used,
            confidence,
            processing_time_ms,
            cached_at: Utc::now(),
            hit_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_normalizes_case_and_whitespace() {
        let a = CacheKey::new("guan_yin_temple", 42, "  Will I Find Love?  ", Language::En);
        let b = CacheKey::new("guan_yin_temple", 42, "will i find love?", Language::En);
        assert_eq!(a, b);
    }

    #[test]
    fn key_differs_by_language() {
        let a = CacheKey::new("guan_yin_temple", 42, "career?", Language::En);
        let b = CacheKey::new("guan_yin_temple", 42, "career?", Language::Zh);
        assert_ne!(a, b);
    }

    #[test]
    fn key_differs_by_poem_number() {
        let a = CacheKey::new("guan_yin_temple", 1, "career?", Language::En);
        let b = CacheKey::new("guan_yin_temple", 2, "career?", Language::En);
        assert_ne!(a, b);
    }

    #[test]
    fn new_entry_starts_with_zero_hits() {
        let key = CacheKey::new("mazu_temple", 7, "health?", Language::Zh);
        let entry = CacheEntry::new(key, "text".into(), serde_json::json!({}), vec![], Some(0.9), 1200);
        assert_eq!(entry.hit_count, 0);
    }
}
