//! Stage 1 — Index: build a vector index over the repository's files,
//! delivered to the adapter in batches of `index.batch_size`.

use std::path::Path;

use vectorindex::Document;

use crate::adapters::VectorAdapter;
use crate::config::IndexConfig;
use crate::domain::{FileAnalysis, Task};
use crate::error::OrchestratorError;

async fn load_document(repo_path: &Path, file: &FileAnalysis) -> Option<Document> {
    let full_path = repo_path.join(&file.path);
    let content = tokio::fs::read_to_string(&full_path).await.ok()?;
    let end_line = content.lines().count() as u32;
    Some(Document {
        path: file.path.clone(),
        language: file.language.clone().unwrap_or_else(|| "text".to_string()),
        content,
        start_line: 1,
        end_line: end_line.max(1),
    })
}

/// Returns the index name to persist on the task. Idempotent: if the
/// task already has an index name and the adapter confirms it still
/// exists, the existing index is reused rather than rebuilt.
pub async fn run(
    vector: &VectorAdapter,
    task: &Task,
    repo_path: &Path,
    files: &[FileAnalysis],
    config: &IndexConfig,
) -> Result<String, OrchestratorError> {
    if let Some(existing) = &task.vector_index_name {
        if vector.index_exists(existing).await? {
            return Ok(existing.clone());
        }
    }

    let mut documents = Vec::with_capacity(files.len());
    for file in files {
        if let Some(doc) = load_document(repo_path, file).await {
            documents.push(doc);
        }
    }

    if documents.is_empty() {
        // Empty repository: still needs an index name so the stage can
        // progress and later queries simply return no matches.
        return vector.create_index(&[]).await;
    }

    let mut batches = documents.chunks(config.batch_size.max(1));
    let first_batch = batches.next().unwrap_or(&[]);
    let index_name = vector.create_index(first_batch).await?;

    for batch in batches {
        vector.add_documents(&index_name, batch).await?;
    }

    Ok(index_name)
}
