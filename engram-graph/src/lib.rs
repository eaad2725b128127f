//! # engram-graph
//!
//! The knowledge graph: SQLite-persisted entities and relations, an
//! in-memory adjacency index with a path cache, BFS path and subgraph
//! queries, and regex-driven entity/relation extraction with optional
//! LLM augmentation.

pub mod extract;

mod index;
mod llm;
mod store;

pub use index::{Direction, GraphIndex, GraphPath, Neighbor, Subgraph};
pub use llm::LlmClient;
pub use store::{EntityFilter, GraphStore, RelationFilter};
