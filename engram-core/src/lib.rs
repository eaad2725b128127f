//! # engram-core
//!
//! Foundation crate for the Engram memory system.
//! Defines all types, traits, errors, config, and constants.
//! Every other crate in the workspace depends on this.

pub mod asyncutil;
pub mod config;
pub mod conflict;
pub mod constants;
pub mod errors;
pub mod graph;
pub mod memory;
pub mod vecmath;

// Re-export the most commonly used types at the crate root.
pub use config::EngramConfig;
pub use conflict::{Conflict, ConflictSeverity, ConflictType, Resolution, ResolutionAction};
pub use errors::{EngramError, EngramResult};
pub use graph::{EntityType, GraphEntity, GraphRelation, RelationType};
pub use memory::{MemoryMetadata, MemoryRecord, MemoryType};
