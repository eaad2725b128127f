//! Result shapes returned by the orchestrator.

use std::collections::HashMap;

use serde::Serialize;

use engram_core::conflict::{Conflict, Resolution};
use engram_core::graph::{GraphEntity, GraphRelation};
use engram_core::memory::MemoryRecord;
use engram_graph::GraphPath;

/// Outcome of `update_memory`.
#[derive(Debug, Default)]
pub struct MemoryUpdateResult {
    pub success: bool,
    pub vectors_added: usize,
    pub added_ids: Vec<String>,
    pub conflicts_detected: Vec<Conflict>,
    pub conflicts_resolved: Vec<Resolution>,
    /// Entities/relations written to the graph, when extraction ran.
    pub graph_extracted: Option<(usize, usize)>,
    pub errors: Vec<String>,
}

/// One retrieved memory with its final hybrid score.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub record: MemoryRecord,
    pub score: f64,
}

/// Graph context attached to a query result.
#[derive(Debug, Clone, Default)]
pub struct GraphAttachment {
    pub entities: Vec<GraphEntity>,
    pub relations: Vec<GraphRelation>,
    pub paths: Vec<GraphPath>,
}

/// Query bookkeeping.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryMetadata {
    /// Candidates found before truncation to `max_results`.
    pub total_found: usize,
    pub query_time_ms: u64,
}

/// Outcome of `query`.
#[derive(Debug, Default)]
pub struct EnhancedMemoryResult {
    pub memories: Vec<ScoredMemory>,
    pub conflicts: Vec<Conflict>,
    pub graph: Option<GraphAttachment>,
    pub metadata: QueryMetadata,
}

/// Outcome of `distill_memories_for_context`.
#[derive(Debug, Clone, Default)]
pub struct DistillResult {
    pub distilled: String,
    /// Ids of the records that contributed.
    pub sources: Vec<String>,
    pub tokens_used: usize,
}

/// Outcome of `auto_compress_memories`.
#[derive(Debug, Clone, Default)]
pub struct CompressionResult {
    pub compressed: bool,
    pub deleted: usize,
    pub created: usize,
    pub tokens_saved: i64,
    pub errors: Vec<String>,
}

/// Aggregate store and conflict statistics for one user.
#[derive(Debug, Clone, Default)]
pub struct MemoryStats {
    pub vector_count: usize,
    pub by_type: HashMap<String, usize>,
    pub estimated_tokens: usize,
    pub conflicts_detected: usize,
    pub conflicts_auto_resolvable: usize,
}
