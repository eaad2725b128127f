/// Knowledge-graph errors.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("graph SQL failed: {message}")]
    SqlFailed { message: String },

    #[error("graph call timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("unknown entity: {id}")]
    UnknownEntity { id: String },
}
