//! Stage 2 — Analyze: fan out pending FileAnalyses to the Worker Pool,
//! each worker querying the vector index for context and calling the
//! LLM adapter to produce a summary and a list of AnalysisItems.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use crate::adapters::llm::{CompletionRequest, LlmAdapter, Message};
use crate::adapters::VectorAdapter;
use crate::domain::{AnalysisItem, FileAnalysis, FileAnalysisStatus};
use crate::error::OrchestratorError;
use crate::store::TaskStore;
use crate::workers::{CancellationToken, Job, JobFuture, WorkerPool};

const CONTEXT_TOP_K: usize = 5;

/// Runs one pass over every pending FileAnalysis for `task_id`. Returns
/// the number of files that completed (either succeeded or exhausted
/// retries) this pass; the driver keeps calling this until it returns 0,
/// at which point the stage is done (see [`crate::domain::Task::is_analyze_complete`]).
pub async fn run(
    pool: &WorkerPool,
    store: &TaskStore,
    vector: &VectorAdapter,
    llm: Arc<dyn LlmAdapter>,
    task_id: &str,
    repo_path: PathBuf,
    index_name: &str,
    cancel: CancellationToken,
) -> Result<usize, OrchestratorError> {
    let all_files = store.list_file_analyses_by_task(task_id).await?;
    let pending: Vec<FileAnalysis> = all_files.into_iter().filter(|f| f.status == FileAnalysisStatus::Pending).collect();

    if pending.is_empty() {
        return Ok(0);
    }

    let mut jobs = Vec::with_capacity(pending.len());
    for file in pending {
        let store = store.clone();
        let vector = vector.clone();
        let llm = llm.clone();
        let repo_path = repo_path.clone();
        let index_name = index_name.to_string();
        let task_id = task_id.to_string();
        let label = file.path.clone();

        jobs.push(Job {
            label: label.clone(),
            // Cloned per call rather than moved: a retry needs a fresh
            // owned `FileAnalysis` each attempt, since `analyze_one`
            // consumes it.
            run: Box::new(move || -> JobFuture {
                let store = store.clone();
                let vector = vector.clone();
                let llm = llm.clone();
                let repo_path = repo_path.clone();
                let index_name = index_name.clone();
                let task_id = task_id.clone();
                let file = file.clone();
                Box::pin(async move { analyze_one(&store, &vector, llm.as_ref(), &task_id, &repo_path, &index_name, file).await })
            }),
        });
    }

    let job_count = jobs.len();
    let outcomes = pool.run_batch(jobs, cancel).await;
    for (label, result) in &outcomes {
        if let Err(err) = result {
            warn!(path = %label, %err, "file analysis did not complete cleanly");
        }
    }
    Ok(job_count)
}

async fn analyze_one(
    store: &TaskStore,
    vector: &VectorAdapter,
    llm: &dyn LlmAdapter,
    task_id: &str,
    repo_path: &std::path::Path,
    index_name: &str,
    mut file: FileAnalysis,
) -> Result<(), OrchestratorError> {
    let full_path = repo_path.join(&file.path);
    let content = match tokio::fs::read_to_string(&full_path).await {
        Ok(content) => content,
        Err(err) => {
            file.mark_failed(format!("could not read file: {err}"));
            store.append_file_analysis(file).await?;
            return Ok(());
        }
    };

    if content.trim().is_empty() {
        file.mark_failed("empty file");
        store.append_file_analysis(file).await?;
        return Ok(());
    }

    let context_matches = vector.query(index_name, &content, CONTEXT_TOP_K).await.unwrap_or_default();
    let context = context_matches
        .iter()
        .filter(|m| m.meta.path != file.path)
        .map(|m| format!("# {} (lines {}-{})\n{}", m.meta.path, m.meta.start_line, m.meta.end_line, m.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    let prompt = format!(
        "Analyze this file and summarize its purpose and key dependencies.\n\nFile: {}\n\n{}\n\nRelated context:\n{}",
        file.path, content, context
    );

    let response = llm
        .complete(CompletionRequest {
            system: Some("You are a precise code analyst.".to_string()),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt,
            }],
            model: "mock".to_string(),
            max_tokens: 1024,
        })
        .await?;

    let dependencies = extract_dependencies(file.language.as_deref(), &content);
    let line_count = content.lines().count() as u32;

    file.mark_success(response.text.clone(), dependencies.clone());
    let file_id = store.append_file_analysis(file.clone()).await?;

    let mut items = Vec::with_capacity(1 + dependencies.len());
    let summary_title = response.text.lines().next().unwrap_or("").to_string();
    let excerpt: String = content.lines().take(20).collect::<Vec<_>>().join("\n");
    let summary_item = AnalysisItem::new(task_id, file_id.clone(), "summary", summary_title, response.text)
        .with_location(file.language.clone(), Some(excerpt), None, Some(1), Some(line_count.max(1)))
        .expect("1 <= line_count by construction");
    items.push(summary_item);

    for dependency in dependencies {
        items.push(AnalysisItem::new(
            task_id,
            file_id.clone(),
            "dependency",
            dependency.clone(),
            format!("imported by {}", file.path),
        ));
    }

    store.append_analysis_items(items).await?;

    Ok(())
}

/// Pulls a best-effort list of imported module/package names out of a
/// file's source text, based on the language's import syntax. Unknown
/// languages yield no dependencies rather than guessing.
fn extract_dependencies(language: Option<&str>, content: &str) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    for line in content.lines() {
        let line = line.trim();
        let dep = match language {
            Some("rust") => line
                .strip_prefix("use ")
                .or_else(|| line.strip_prefix("pub use "))
                .and_then(|rest| {
                    let root = rest.trim_end_matches(';').split("::").next().unwrap_or(rest).trim();
                    if matches!(root, "crate" | "self" | "super" | "") {
                        None
                    } else {
                        Some(root.to_string())
                    }
                }),
            Some("python") => line
                .strip_prefix("import ")
                .or_else(|| line.strip_prefix("from "))
                .map(|rest| rest.split([' ', '.']).next().unwrap_or(rest).to_string()),
            Some("javascript") | Some("typescript") => {
                if let Some(rest) = line.strip_prefix("import ") {
                    rest.split("from").nth(1).map(|m| m.trim().trim_matches(['\'', '"', ';']).to_string())
                } else if line.starts_with("const ") || line.starts_with("let ") || line.starts_with("var ") {
                    line.split("require(").nth(1).map(|m| m.split(')').next().unwrap_or("").trim_matches(['\'', '"']).to_string())
                } else {
                    None
                }
            }
            Some("go") => {
                if line.starts_with('"') && line.ends_with('"') && line.len() > 1 {
                    Some(line.trim_matches('"').to_string())
                } else {
                    line.strip_prefix("import ").map(|rest| rest.trim_matches('"').to_string())
                }
            }
            Some("java") => line.strip_prefix("import ").map(|rest| rest.trim_end_matches(';').to_string()),
            Some("ruby") => line
                .strip_prefix("require ")
                .or_else(|| line.strip_prefix("require_relative "))
                .map(|rest| rest.trim_matches(['\'', '"']).to_string()),
            _ => None,
        };
        if let Some(dep) = dep {
            if !dep.is_empty() {
                seen.insert(dep);
            }
        }
    }
    seen.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_rust_use_crate_roots() {
        let content = "use std::fmt;\nuse serde::Serialize;\nuse crate::error::OrchestratorError;\n";
        let deps = extract_dependencies(Some("rust"), content);
        assert_eq!(deps, vec!["serde", "std"]);
    }

    #[test]
    fn extracts_python_imports() {
        let content = "import os\nfrom collections import OrderedDict\n";
        let deps = extract_dependencies(Some("python"), content);
        assert_eq!(deps, vec!["collections", "os"]);
    }

    #[test]
    fn unknown_language_yields_no_dependencies() {
        assert!(extract_dependencies(None, "whatever\n").is_empty());
    }
}
