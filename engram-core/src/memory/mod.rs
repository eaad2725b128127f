//! The central memory record and its type system.

mod record;
mod types;

pub use record::{MemoryMetadata, MemoryRecord};
pub use types::MemoryType;
