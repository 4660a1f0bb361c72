//! Response cache keyed by normalized query text.
//!
//! Best-effort: read and write failures are logged and treated as a miss.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use skill_storage::KeyValueStore;
use skill_types::CacheConfig;
use tracing::{debug, warn};

use crate::types::QueryResponse;

pub struct ResponseCache {
    kv: Arc<dyn KeyValueStore>,
    config: CacheConfig,
}

impl ResponseCache {
    pub fn new(kv: Arc<dyn KeyValueStore>, config: CacheConfig) -> Self {
        Self { kv, config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.ttl_secs > 0
    }

    /// Case, spacing and trailing punctuation do not change the key.
    pub fn normalize(query: &str) -> String {
        query
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .trim_end_matches(['?', '!', '.'])
            .trim_end()
            .to_lowercase()
    }

    pub fn key(&self, query: &str) -> String {
        let digest = Sha256::digest(Self::normalize(query).as_bytes());
        format!("{}:{}", self.config.key_prefix, hex::encode(digest))
    }

    /// Cached response with `cached` set, or `None` on miss or failure.
    pub fn get(&self, query: &str) -> Option<QueryResponse> {
        if !self.is_enabled() {
            return None;
        }
        let key = self.key(query);

        let bytes = match self.kv.get(&key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key = %key, "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Cache read failed");
                return None;
            }
        };

        match serde_json::from_slice::<QueryResponse>(&bytes) {
            Ok(mut response) => {
                debug!(key = %key, "Cache hit");
                response.cached = true;
                Some(response)
            }
            Err(e) => {
                warn!(error = %e, key = %key, "Dropping undecodable cache entry");
                if let Err(e) = self.kv.delete(&key) {
                    warn!(error = %e, "Cache delete failed");
                }
                None
            }
        }
    }

    /// Store `response` for the TTL. Returns whether it was written.
    pub fn put(&self, query: &str, response: &QueryResponse) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let key = self.key(query);

        let mut stored = response.clone();
        stored.cached = false;
        let bytes = match serde_json::to_vec(&stored) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Cache encode failed");
                return false;
            }
        };

        let ttl = Duration::from_secs(self.config.ttl_secs);
        match self.kv.put_with_ttl(&key, &bytes, Some(ttl)) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Cache write failed");
                false
            }
        }
    }

    pub fn invalidate(&self, query: &str) -> bool {
        self.kv.delete(&self.key(query)).unwrap_or_else(|e| {
            warn!(error = %e, "Cache delete failed");
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use skill_storage::MemoryKvStore;
    use skill_types::{ProficiencyLevel, SkillRecord};

    use crate::types::{Confidence, SkillMatch};

    fn response() -> QueryResponse {
        QueryResponse {
            query: "What is your experience with Python?".into(),
            matches: vec![SkillMatch {
                record: SkillRecord::new("py", "Python", "Languages", 12.0, ProficiencyLevel::Advanced)
                    .with_employer("Acme"),
                score: 0.88,
                raw_score: 0.8,
                boost: 1.1,
            }],
            reply: "Twelve years of senior Python work at Acme.".into(),
            cached: false,
            quota_exceeded: false,
            inference_failed: false,
            confidence: Some(Confidence::High),
            project: None,
            provenance: Some(skill_vector::Backend::LinearScan),
        }
    }

    fn cache(config: CacheConfig) -> (ResponseCache, Arc<MemoryKvStore>) {
        let kv = Arc::new(MemoryKvStore::new());
        (ResponseCache::new(kv.clone(), config), kv)
    }

    #[test]
    fn test_round_trip_differs_only_in_cached_flag() {
        let (cache, _kv) = cache(CacheConfig::default());
        let original = response();
        assert!(cache.put(&original.query, &original));

        let hit = cache.get(&original.query).unwrap();
        assert!(hit.cached);
        assert_eq!(QueryResponse { cached: false, ..hit }, original);
    }

    #[test]
    fn test_key_ignores_case_spacing_and_trailing_punctuation() {
        let (cache, _kv) = cache(CacheConfig::default());
        let key = cache.key("What is your experience with Python?");
        assert_eq!(key, cache.key("  what is your   EXPERIENCE with python "));
        assert!(key.starts_with("query-cache:"));
        assert_eq!(key.len(), "query-cache:".len() + 64);
        assert_ne!(key, cache.key("What is your experience with Rust?"));
    }

    #[test]
    fn test_disabled_cache_never_hits() {
        let (cache, kv) = cache(CacheConfig {
            enabled: false,
            ..Default::default()
        });
        assert!(!cache.put("q", &response()));
        assert!(cache.get("q").is_none());
        assert!(kv.is_empty());
    }

    #[test]
    fn test_corrupt_entry_is_a_miss_and_removed() {
        let (cache, kv) = cache(CacheConfig::default());
        let key = cache.key("python");
        kv.put_with_ttl(&key, b"not json", None).unwrap();

        assert!(cache.get("python").is_none());
        assert!(kv.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_invalidate() {
        let (cache, _kv) = cache(CacheConfig::default());
        cache.put("python", &response());
        assert!(cache.invalidate("python"));
        assert!(cache.get("python").is_none());
    }
}
