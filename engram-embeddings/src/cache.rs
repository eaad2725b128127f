//! Bounded, TTL-swept embedding result cache.

use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use sha2::{Digest, Sha256};

/// A cached embedding with its provenance.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub embedding: Vec<f32>,
    pub model: String,
    pub inserted_at: DateTime<Utc>,
}

/// Capacity-bounded cache with entry TTL. Keys are
/// `sha256(provider | model | sha256(input))`, so distinct backends never
/// collide on the same input.
pub struct EmbeddingCache {
    cache: Cache<String, CacheEntry>,
}

impl EmbeddingCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    /// Cache key for a text or byte input under a given backend.
    pub fn key(provider_id: &str, model_id: &str, input: &[u8]) -> String {
        let input_hash = Sha256::digest(input);
        let mut hasher = Sha256::new();
        hasher.update(provider_id.as_bytes());
        hasher.update(b"|");
        hasher.update(model_id.as_bytes());
        hasher.update(b"|");
        hasher.update(input_hash);
        format!("{:x}", hasher.finalize())
    }

    /// Look up an entry; a hit refreshes its recency.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.cache.get(key)
    }

    pub fn insert(&self, key: String, embedding: Vec<f32>, model: String) {
        self.cache.insert(
            key,
            CacheEntry {
                embedding,
                model,
                inserted_at: Utc::now(),
            },
        );
    }

    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}
