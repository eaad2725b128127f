/// Vector-store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store not ready: call initialize() first")]
    NotReady,

    #[error("store is already being initialized by another caller")]
    AlreadyInitializing,

    #[error("persistence failed: {reason}")]
    PersistenceFailed { reason: String },
}
