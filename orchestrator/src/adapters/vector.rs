//! Vector Index Adapter (C5) wiring: the orchestrator depends on the
//! `vectorindex` crate's trait directly and only adds error-taxonomy
//! translation at this boundary.

use std::sync::Arc;

use vectorindex::{ChunkMatch, Document, VectorIndexAdapter};

use crate::error::OrchestratorError;

/// Wraps an `Arc<dyn VectorIndexAdapter>` so call sites in the pipeline
/// driver only ever see [`OrchestratorError`].
#[derive(Clone)]
pub struct VectorAdapter {
    inner: Arc<dyn VectorIndexAdapter>,
}

impl VectorAdapter {
    pub fn new(inner: Arc<dyn VectorIndexAdapter>) -> Self {
        Self { inner }
    }

    pub async fn create_index(&self, documents: &[Document]) -> Result<String, OrchestratorError> {
        Ok(self.inner.create_index(documents).await?)
    }

    pub async fn add_documents(&self, index_name: &str, documents: &[Document]) -> Result<(), OrchestratorError> {
        Ok(self.inner.add_documents(index_name, documents).await?)
    }

    pub async fn query(&self, index_name: &str, text: &str, k: usize) -> Result<Vec<ChunkMatch>, OrchestratorError> {
        Ok(self.inner.query(index_name, text, k).await?)
    }

    /// Idempotent: deleting a missing index is success.
    pub async fn delete_index(&self, index_name: &str) -> Result<(), OrchestratorError> {
        Ok(self.inner.delete_index(index_name).await?)
    }

    pub async fn index_exists(&self, index_name: &str) -> Result<bool, OrchestratorError> {
        Ok(self.inner.index_exists(index_name).await?)
    }
}
