//! Result cache (spec §5 C4): avoids re-running RAG + LLM for a repeat
//! `(deity, fortune_number, question, language)` submission within its TTL.

use std::time::Duration;

use fortune_shared::{CacheEntry, CacheKey};
use moka::future::Cache;

/// Async, in-process cache of completed interpretation results.
///
/// Bounded by entry count (LRU eviction) and by a fixed TTL; a cache miss
/// (including an expired entry) is not distinguished from "never computed" -
/// callers always fall through to the full pipeline on `None`.
#[derive(Debug, Clone)]
pub struct ResultCache {
    inner: Cache<CacheKey, CacheEntry>,
}

impl ResultCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { inner }
    }

    /// Look up a cached result. Does not mutate `hit_count` in the stored
    /// entry - moka entries are immutable once inserted, so hit accounting
    /// is the caller's responsibility if it is needed for observability.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.inner.get(key).await;
        if entry.is_some() {
            tracing::debug!(temple = %key.temple, poem_number = key.poem_number, "cache hit");
        }
        entry
    }

    pub async fn put(&self, entry: CacheEntry) {
        self.inner.insert(entry.key.clone(), entry).await;
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        self.inner.invalidate(key).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fortune_shared::Language;

    fn sample_entry(temple: &str, number: i32) -> CacheEntry {
        let key = CacheKey::new(temple, number, "will I find love?", Language::En);
        CacheEntry::new(key, "wisdom text".into(), serde_json::json!({}), vec![], Some(0.8), 900)
    }

    #[tokio::test]
    async fn miss_on_empty_cache() {
        let cache = ResultCache::new(100, Duration::from_secs(60));
        let key = CacheKey::new("guan_yin", 1, "q", Language::Zh);
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = ResultCache::new(100, Duration::from_secs(60));
        let entry = sample_entry("guan_yin", 7);
        let key = entry.key.clone();
        cache.put(entry).await;
        let found = cache.get(&key).await;
        assert!(found.is_some());
        assert_eq!(found.unwrap().response_text, "wisdom text");
    }

    #[tokio::test]
    async fn invalidate_removes_entry() {
        let cache = ResultCache::new(100, Duration::from_secs(60));
        let entry = sample_entry("mazu", 3);
        let key = entry.key.clone();
        cache.put(entry).await;
        cache.invalidate(&key).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache = ResultCache::new(100, Duration::from_millis(10));
        let entry = sample_entry("guan_yin", 9);
        let key = entry.key.clone();
        cache.put(entry).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.inner.run_pending_tasks().await;
        assert!(cache.get(&key).await.is_none());
    }
}
