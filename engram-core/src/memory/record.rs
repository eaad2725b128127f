use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::MemoryType;

/// Classification attached to every memory record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryMetadata {
    /// Tenant identifier.
    pub user_id: String,
    /// Memory tier; drives lifecycle and rerank weight.
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Importance in [0, 1].
    pub importance: f64,
    /// Optional category label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl MemoryMetadata {
    /// Build metadata with clamped importance and the current timestamp.
    pub fn new(user_id: impl Into<String>, memory_type: MemoryType, importance: f64) -> Self {
        Self {
            user_id: user_id.into(),
            memory_type,
            timestamp: Utc::now(),
            importance: importance.clamp(0.0, 1.0),
            category: None,
            tags: Vec::new(),
        }
    }
}

/// The central entity of the memory core: a user-attributed unit of text
/// with an embedding, classification metadata, and lifecycle counters.
///
/// The `id` is immutable once assigned. A non-empty `embedding` always has
/// exactly the configured dimension count and unit L2 norm; an empty
/// embedding marks a pseudo-record used only for conflict detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Opaque unique identifier (UUID v4).
    pub id: String,
    /// The original text.
    pub content: String,
    /// Unit-norm dense vector; may be empty.
    #[serde(default)]
    pub embedding: Vec<f32>,
    /// Classification metadata.
    pub metadata: MemoryMetadata,
    /// Monotonically increasing retrieval-hit counter.
    pub access_count: u64,
    /// Updated on every successful retrieval hit.
    pub last_accessed: DateTime<Utc>,
    /// blake3 hash of `content`, for dedup and embedding-cache keys.
    pub content_hash: String,
}

impl MemoryRecord {
    /// Create a record with a fresh id and lifecycle counters at zero.
    pub fn new(content: impl Into<String>, metadata: MemoryMetadata) -> Self {
        let content = content.into();
        let content_hash = Self::compute_content_hash(&content);
        Self {
            id: Uuid::new_v4().to_string(),
            content,
            embedding: Vec::new(),
            last_accessed: metadata.timestamp,
            metadata,
            access_count: 0,
            content_hash,
        }
    }

    /// blake3 hash of the raw content.
    pub fn compute_content_hash(content: &str) -> String {
        blake3::hash(content.as_bytes()).to_hex().to_string()
    }

    /// Record a retrieval hit.
    pub fn touch(&mut self) {
        self.access_count += 1;
        self.last_accessed = Utc::now();
    }

    /// Age relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.metadata.timestamp
    }

    /// Days since the last retrieval hit.
    pub fn inactive_days(&self, now: DateTime<Utc>) -> f64 {
        (now - self.last_accessed).num_milliseconds() as f64 / 86_400_000.0
    }

    /// Whether this record carries a usable embedding.
    pub fn has_embedding(&self) -> bool {
        !self.embedding.is_empty()
    }
}

impl PartialEq for MemoryRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_hashes_content() {
        let meta = MemoryMetadata::new("u1", MemoryType::ShortTerm, 0.5);
        let rec = MemoryRecord::new("hello", meta);
        assert_eq!(rec.content_hash, MemoryRecord::compute_content_hash("hello"));
        assert_eq!(rec.access_count, 0);
        assert!(rec.embedding.is_empty());
    }

    #[test]
    fn touch_bumps_counters() {
        let meta = MemoryMetadata::new("u1", MemoryType::ShortTerm, 0.5);
        let mut rec = MemoryRecord::new("hello", meta);
        let before = rec.last_accessed;
        rec.touch();
        assert_eq!(rec.access_count, 1);
        assert!(rec.last_accessed >= before);
    }

    #[test]
    fn importance_is_clamped() {
        let meta = MemoryMetadata::new("u1", MemoryType::Profile, 3.0);
        assert_eq!(meta.importance, 1.0);
        let meta = MemoryMetadata::new("u1", MemoryType::Profile, -0.5);
        assert_eq!(meta.importance, 0.0);
    }

    #[test]
    fn metadata_type_field_serializes_as_type() {
        let meta = MemoryMetadata::new("u1", MemoryType::LongTerm, 0.7);
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "longTerm");
    }
}
