//! Error taxonomy. Each subsystem has its own `thiserror` enum; the
//! `EngramError` umbrella folds them together and maps every variant to a
//! stable error code for logs and gateway translation.

mod embedding_error;
mod graph_error;
mod index_error;
mod store_error;

pub use embedding_error::EmbeddingError;
pub use graph_error::GraphError;
pub use index_error::IndexError;
pub use store_error::StoreError;

/// Convenience alias used across the workspace.
pub type EngramResult<T> = Result<T, EngramError>;

/// The umbrella error for the memory core.
#[derive(Debug, thiserror::Error)]
pub enum EngramError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("input validation failed: {reason}")]
    InputValidation { reason: String },

    #[error("transaction rollback failed: {reason}")]
    RollbackFailed { reason: String },

    #[error("hard cap {cap} unsatisfiable for user {user_id}: {protected} protected records")]
    HardLimitUnsatisfiable {
        user_id: String,
        cap: usize,
        protected: usize,
    },
}

impl EngramError {
    /// Stable, machine-readable code for each failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            EngramError::Embedding(_) => "EMBEDDING_FAILED",
            EngramError::Store(StoreError::NotReady)
            | EngramError::Store(StoreError::AlreadyInitializing) => "STORE_NOT_READY",
            EngramError::Store(StoreError::PersistenceFailed { .. }) => "PERSISTENCE_FAILED",
            EngramError::Index(IndexError::Timeout { .. })
            | EngramError::Graph(GraphError::Timeout { .. }) => "SQL_TIMEOUT",
            EngramError::Index(_) | EngramError::Graph(_) => "SQL_FAILED",
            EngramError::InputValidation { .. } => "INPUT_VALIDATION_FAILED",
            EngramError::RollbackFailed { .. } => "TRANSACTION_ROLLBACK_FAILED",
            EngramError::HardLimitUnsatisfiable { .. } => "HARD_LIMIT_UNSATISFIABLE",
        }
    }
}
