//! Vector Index Adapter.
//!
//! The orchestrator core needs a typed, retryable contract for chunk
//! retrieval; it does not compute embeddings or operate a vector database
//! itself. [`VectorIndexAdapter`] is that contract, and
//! [`LocalVectorIndexAdapter`] is a local, file-backed implementation of it
//! (lexical overlap scoring instead of embeddings) so the crate is runnable
//! without a real vector-store dependency.

mod adapter;
mod chunk;
mod error;
mod local;

pub use adapter::VectorIndexAdapter;
pub use chunk::{ChunkMatch, ChunkMeta, Document};
pub use error::VectorIndexError;
pub use local::LocalVectorIndexAdapter;
