//! # engram-manager
//!
//! The orchestrator of the memory core. Wires the embedding service,
//! vector store, keyword index, knowledge graph, conflict resolver,
//! compression, token budget, and lifecycle manager behind one
//! programmatic API: ingest, hybrid retrieval, distillation under a
//! token budget, compression, and stats, with a transaction log backing
//! out partial failures.

mod extract;
mod hybrid;
mod manager;
mod results;
mod txlog;

pub use extract::{extract_structured_info, ExtractedItem};
pub use manager::{GraphQueryOptions, MemoryManager, QueryOptions, UpdateOptions};
pub use results::{
    CompressionResult, DistillResult, EnhancedMemoryResult, GraphAttachment, MemoryStats,
    MemoryUpdateResult, QueryMetadata, ScoredMemory,
};
pub use txlog::{Operation, OperationType, TransactionLog};
