use async_trait::async_trait;

use crate::chunk::{ChunkMatch, Document};
use crate::error::VectorIndexError;

/// Typed client to whatever embedding/vector-store service backs chunk
/// retrieval. The orchestrator core only ever talks to this trait; it has
/// no knowledge of how (or where) documents are embedded and stored.
#[async_trait]
pub trait VectorIndexAdapter: Send + Sync {
    /// Create a new index and load the first batch of documents into it.
    /// Returns the opaque index name the Task persists as
    /// `vector_index_name`.
    async fn create_index(&self, documents: &[Document]) -> Result<String, VectorIndexError>;

    /// Add another batch of documents to an existing index.
    async fn add_documents(&self, index_name: &str, documents: &[Document]) -> Result<(), VectorIndexError>;

    /// Retrieve the `k` chunks most relevant to `text` from `index_name`.
    async fn query(&self, index_name: &str, text: &str, k: usize) -> Result<Vec<ChunkMatch>, VectorIndexError>;

    /// Delete an index. Deleting a missing index is a success — idempotent
    /// by contract.
    async fn delete_index(&self, index_name: &str) -> Result<(), VectorIndexError>;

    /// Whether `index_name` currently exists, used by the Index stage to
    /// decide whether a persisted `vector_index_name` can be reused as-is.
    async fn index_exists(&self, index_name: &str) -> Result<bool, VectorIndexError>;
}
