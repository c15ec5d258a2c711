use thiserror::Error;

/// Failure kinds a vector-index collaborator can report, per the error
/// taxonomy the orchestrator core uses for every external adapter.
#[derive(Debug, Error)]
pub enum VectorIndexError {
    #[error("transient error talking to vector index: {0}")]
    Transient(String),

    #[error("index not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    Invalid(String),

    #[error("fatal vector index error: {0}")]
    Fatal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VectorIndexError {
    /// Whether a caller should retry the same call unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VectorIndexError::Transient(_) | VectorIndexError::Io(_))
    }
}
