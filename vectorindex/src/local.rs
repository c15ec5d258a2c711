//! Local, file-backed implementation of [`VectorIndexAdapter`].
//!
//! Stands in for a real embedding/vector-store service: chunks are scored
//! by lexical term overlap rather than a learned embedding, but the
//! create/add/query/delete contract is identical to what a remote service
//! would implement, so swapping this out for an HTTP-backed adapter later
//! touches no caller code.
//!
//! Layout on disk, one directory per index:
//! ```text
//! {base_path}/{index_name}/
//!   index.jsonl     # one ChunkMeta per line, append-only
//!   chunks/
//!     {chunk_id}.txt
//! ```

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::adapter::VectorIndexAdapter;
use crate::chunk::{ChunkMatch, ChunkMeta, Document};
use crate::error::VectorIndexError;

pub struct LocalVectorIndexAdapter {
    base_path: PathBuf,
}

impl LocalVectorIndexAdapter {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn index_dir(&self, index_name: &str) -> PathBuf {
        self.base_path.join(index_name)
    }

    async fn write_chunk(
        &self,
        index_name: &str,
        document: &Document,
    ) -> Result<ChunkMeta, VectorIndexError> {
        let dir = self.index_dir(index_name);
        let chunks_dir = dir.join("chunks");
        fs::create_dir_all(&chunks_dir).await?;

        let chunk_id = Uuid::now_v7().to_string();
        fs::write(chunks_dir.join(format!("{chunk_id}.txt")), &document.content).await?;

        let meta = ChunkMeta {
            chunk_id,
            path: document.path.clone(),
            language: document.language.clone(),
            start_line: document.start_line,
            end_line: document.end_line,
            content_hash: format!("{:x}", content_hash(document.content.as_bytes())),
            created_at: now_ms(),
        };

        let mut index_file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("index.jsonl"))
            .await?;
        let line = serde_json::to_string(&meta)?;
        index_file.write_all(line.as_bytes()).await?;
        index_file.write_all(b"\n").await?;

        Ok(meta)
    }

    async fn read_index(&self, index_name: &str) -> Result<Vec<ChunkMeta>, VectorIndexError> {
        let index_path = self.index_dir(index_name).join("index.jsonl");
        let raw = match fs::read_to_string(&index_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VectorIndexError::NotFound(index_name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let mut metas = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            metas.push(serde_json::from_str(line)?);
        }
        Ok(metas)
    }
}

#[async_trait]
impl VectorIndexAdapter for LocalVectorIndexAdapter {
    async fn create_index(&self, documents: &[Document]) -> Result<String, VectorIndexError> {
        let index_name = Uuid::now_v7().to_string();
        fs::create_dir_all(self.index_dir(&index_name)).await?;
        for doc in documents {
            self.write_chunk(&index_name, doc).await?;
        }
        info!(index_name, chunk_count = documents.len(), "create_index: done");
        Ok(index_name)
    }

    async fn add_documents(&self, index_name: &str, documents: &[Document]) -> Result<(), VectorIndexError> {
        if !self.index_dir(index_name).exists() {
            return Err(VectorIndexError::NotFound(index_name.to_string()));
        }
        for doc in documents {
            self.write_chunk(index_name, doc).await?;
        }
        debug!(index_name, chunk_count = documents.len(), "add_documents: done");
        Ok(())
    }

    async fn query(&self, index_name: &str, text: &str, k: usize) -> Result<Vec<ChunkMatch>, VectorIndexError> {
        let metas = self.read_index(index_name).await?;
        let query_terms = terms(text);
        if query_terms.is_empty() || metas.is_empty() {
            return Ok(Vec::new());
        }

        let chunks_dir = self.index_dir(index_name).join("chunks");
        let mut scored = Vec::new();
        for meta in metas {
            let path = chunks_dir.join(format!("{}.txt", meta.chunk_id));
            let content = match fs::read_to_string(&path).await {
                Ok(c) => c,
                Err(_) => continue,
            };
            let content_terms = terms(&content);
            let overlap = query_terms.intersection(&content_terms).count();
            if overlap == 0 {
                continue;
            }
            let score = overlap as f32 / query_terms.len() as f32;
            scored.push(ChunkMatch { meta, content, score });
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete_index(&self, index_name: &str) -> Result<(), VectorIndexError> {
        let dir = self.index_dir(index_name);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => info!(index_name, "delete_index: removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(index_name, "delete_index: already absent, idempotent success");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    async fn index_exists(&self, index_name: &str) -> Result<bool, VectorIndexError> {
        Ok(self.index_dir(index_name).join("index.jsonl").exists())
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.len() > 1)
        .map(|s| s.to_lowercase())
        .collect()
}

fn content_hash(data: &[u8]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    data.hash(&mut hasher);
    hasher.finish()
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(path: &str, content: &str) -> Document {
        Document {
            path: path.to_string(),
            language: "rust".to_string(),
            content: content.to_string(),
            start_line: 1,
            end_line: 10,
        }
    }

    #[tokio::test]
    async fn create_and_query_finds_overlapping_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalVectorIndexAdapter::new(dir.path());

        let index_name = adapter
            .create_index(&[
                doc("a.rs", "fn admission_queue() { schedule_task(); }"),
                doc("b.rs", "fn render_html() { draw_pixels(); }"),
            ])
            .await
            .unwrap();

        let matches = adapter.query(&index_name, "schedule task queue", 5).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].meta.path, "a.rs");
    }

    #[tokio::test]
    async fn add_documents_to_missing_index_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalVectorIndexAdapter::new(dir.path());
        let err = adapter.add_documents("nope", &[doc("a.rs", "x")]).await.unwrap_err();
        assert!(matches!(err, VectorIndexError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_index_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalVectorIndexAdapter::new(dir.path());
        let index_name = adapter.create_index(&[doc("a.rs", "hello")]).await.unwrap();
        adapter.delete_index(&index_name).await.unwrap();
        // Second delete of the same (now missing) index must still succeed.
        adapter.delete_index(&index_name).await.unwrap();
        assert!(!adapter.index_exists(&index_name).await.unwrap());
    }

    #[tokio::test]
    async fn index_exists_reflects_presence() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = LocalVectorIndexAdapter::new(dir.path());
        assert!(!adapter.index_exists("ghost").await.unwrap());
        let index_name = adapter.create_index(&[doc("a.rs", "hello")]).await.unwrap();
        assert!(adapter.index_exists(&index_name).await.unwrap());
    }
}
