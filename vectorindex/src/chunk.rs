use serde::{Deserialize, Serialize};

/// A document handed to the adapter by the Index stage: one chunk of one
/// file, already split by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub path: String,
    pub language: String,
    pub content: String,
    pub start_line: u32,
    pub end_line: u32,
}

/// Metadata persisted alongside a chunk's content, returned by queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub chunk_id: String,
    pub path: String,
    pub language: String,
    pub start_line: u32,
    pub end_line: u32,
    pub content_hash: String,
    pub created_at: i64,
}

/// A single query result: the matched chunk's metadata plus its content and
/// a relevance score (higher is more relevant; not comparable across
/// queries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMatch {
    pub meta: ChunkMeta,
    pub content: String,
    pub score: f32,
}
