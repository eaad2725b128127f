//! Shared builders for Engram tests.
//!
//! Keeps test setup terse across crates: records with a chosen tier,
//! age, and access history, plus unit-norm synthetic embeddings.

use chrono::{Duration, Utc};
use engram_core::memory::{MemoryMetadata, MemoryRecord, MemoryType};

/// Fluent builder for memory records.
pub struct RecordBuilder {
    record: MemoryRecord,
}

impl RecordBuilder {
    pub fn new(user_id: &str, content: &str) -> Self {
        let metadata = MemoryMetadata::new(user_id, MemoryType::ShortTerm, 0.5);
        Self {
            record: MemoryRecord::new(content, metadata),
        }
    }

    pub fn memory_type(mut self, t: MemoryType) -> Self {
        self.record.metadata.memory_type = t;
        self
    }

    pub fn importance(mut self, importance: f64) -> Self {
        self.record.metadata.importance = importance.clamp(0.0, 1.0);
        self
    }

    /// Backdate creation by `days`.
    pub fn age_days(mut self, days: i64) -> Self {
        self.record.metadata.timestamp = Utc::now() - Duration::days(days);
        self
    }

    pub fn access_count(mut self, count: u64) -> Self {
        self.record.access_count = count;
        self
    }

    /// Backdate the last retrieval hit by `hours`.
    pub fn last_accessed_hours_ago(mut self, hours: i64) -> Self {
        self.record.last_accessed = Utc::now() - Duration::hours(hours);
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.record.metadata.category = Some(category.to_string());
        self
    }

    pub fn tags(mut self, tags: &[&str]) -> Self {
        self.record.metadata.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn embedding(mut self, embedding: Vec<f32>) -> Self {
        self.record.embedding = embedding;
        self
    }

    pub fn build(self) -> MemoryRecord {
        self.record
    }
}

/// A unit-norm vector of dimension `dims` pointing along `axis`. Two
/// vectors with the same axis have cosine similarity 1.0; different
/// axes are orthogonal.
pub fn unit_vector(dims: usize, axis: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dims];
    v[axis % dims] = 1.0;
    v
}
