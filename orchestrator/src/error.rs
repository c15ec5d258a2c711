//! Error taxonomy shared by every stage of the pipeline.
//!
//! Adapters (LLM, vector index, document generation) and the Task Store
//! each have their own lower-level error type; this is the shape the
//! pipeline driver actually reasons about once those are classified.

use std::time::Duration;

use thiserror::Error;

/// The error kinds defined by the orchestrator's failure taxonomy.
///
/// Workers and adapters convert their own errors into one of these; the
/// driver then decides, per stage, whether to continue (`Input`) or fail
/// the task (`Fatal`).
#[derive(Debug, Error, Clone)]
pub enum OrchestratorError {
    #[error("transient error: {0}")]
    Transient(String),

    #[error("rate limited, retry after {retry_after:?}: {message}")]
    RateLimited { message: String, retry_after: Duration },

    #[error("invalid input: {0}")]
    Input(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("fatal error: {0}")]
    Fatal(String),
}

impl OrchestratorError {
    /// Whether the same operation can reasonably be retried unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrchestratorError::Transient(_) | OrchestratorError::RateLimited { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, OrchestratorError::RateLimited { .. })
    }

    /// The kind this error should be reported as in `FileAnalysis.error`
    /// or `Task.error_message`.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            OrchestratorError::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<taskstore::StoreError> for OrchestratorError {
    fn from(err: taskstore::StoreError) -> Self {
        match err {
            taskstore::StoreError::NotFound { collection, id } => {
                OrchestratorError::NotFound(format!("{collection}/{id}"))
            }
            taskstore::StoreError::Conflict { collection, id } => {
                OrchestratorError::Conflict(format!("{collection}/{id}"))
            }
            other => OrchestratorError::Transient(other.to_string()),
        }
    }
}

impl From<crate::store::TaskStoreError> for OrchestratorError {
    fn from(err: crate::store::TaskStoreError) -> Self {
        match err {
            crate::store::TaskStoreError::NotFound(id) => OrchestratorError::NotFound(id),
            other => OrchestratorError::Transient(other.to_string()),
        }
    }
}

impl From<vectorindex::VectorIndexError> for OrchestratorError {
    fn from(err: vectorindex::VectorIndexError) -> Self {
        match err {
            vectorindex::VectorIndexError::NotFound(id) => OrchestratorError::NotFound(id),
            vectorindex::VectorIndexError::Invalid(msg) => OrchestratorError::Input(msg),
            vectorindex::VectorIndexError::Transient(msg) => OrchestratorError::Transient(msg),
            vectorindex::VectorIndexError::Fatal(msg) => OrchestratorError::Fatal(msg),
            other => OrchestratorError::Transient(other.to_string()),
        }
    }
}
