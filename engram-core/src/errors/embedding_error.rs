/// Embedding-service errors. Terminal failures degrade to the
/// deterministic fallback provider, so most of these never reach callers.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("provider {provider} is unavailable")]
    ProviderUnavailable { provider: String },

    #[error("embedding request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("embedding request timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
