/// Keyword-index (BM25) errors.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("keyword index SQL failed: {message}")]
    SqlFailed { message: String },

    #[error("keyword index call timed out after {millis}ms")]
    Timeout { millis: u64 },
}
