use thiserror::Error;

/// Errors surfaced by the generic store.
///
/// Collection-specific semantics (e.g. "duplicate task") are layered on top
/// by callers; this enum only covers what the storage mechanism itself can
/// observe.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("record already exists: {collection}/{id}")]
    Conflict { collection: String, id: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the caller can reasonably retry the operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Io(_) | StoreError::Sqlite(_))
    }
}
