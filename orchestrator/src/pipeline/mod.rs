//! Pipeline Driver (C3) — the per-task state machine advancing through
//! Scan → Index → Analyze → Document. A function of the task's own
//! `status` and `current_step`: re-running [`PipelineDriver::drive`] on
//! a task that crashed mid-stage resumes from exactly where it was.

mod analyze;
mod document;
mod index;
mod scan;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::adapters::llm::LlmAdapter;
use crate::adapters::{DocGenAdapter, VectorAdapter};
use crate::admission::AdmissionQueue;
use crate::config::Config;
use crate::domain::{FileAnalysisStatus, PipelineStage, Task};
use crate::error::OrchestratorError;
use crate::store::TaskStore;
use crate::workers::{CancellationToken, WorkerPool};

pub use document::DocumentOutcome;

#[derive(Clone)]
pub struct PipelineDriver {
    store: TaskStore,
    vector: VectorAdapter,
    llm: Arc<dyn LlmAdapter>,
    docgen: Arc<dyn DocGenAdapter>,
    workers: Arc<WorkerPool>,
    admission: AdmissionQueue,
    config: Config,
}

impl PipelineDriver {
    pub fn new(
        store: TaskStore,
        vector: VectorAdapter,
        llm: Arc<dyn LlmAdapter>,
        docgen: Arc<dyn DocGenAdapter>,
        workers: Arc<WorkerPool>,
        admission: AdmissionQueue,
        config: Config,
    ) -> Self {
        Self {
            store,
            vector,
            llm,
            docgen,
            workers,
            admission,
            config,
        }
    }

    /// Drive `task_id` from its current state to a terminal one.
    /// Re-entrant: safe to call again after a crash, since each stage
    /// only performs work its own idempotency rule allows to repeat.
    pub async fn drive(&self, task_id: &str, cancel: CancellationToken) -> Result<(), OrchestratorError> {
        let mut task = self
            .store
            .get_task(task_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("task/{task_id}")))?;

        let repository = self
            .store
            .get_repository(&task.repository_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(format!("repository/{}", task.repository_id)))?;
        let repo_path = self.config.paths.repo_root.join(&repository.local_path);

        loop {
            if cancel.is_cancelled() {
                task.mark_failed("cancelled").map_err(OrchestratorError::Conflict)?;
                self.store.update_task(task).await?;
                self.admission.notify_slot_freed();
                return Ok(());
            }

            let stage = task.current_step;
            debug!(task_id, ?stage, "pipeline driver dispatching stage");

            let outcome = match stage {
                PipelineStage::Scan => self.run_scan(&mut task, &repo_path).await,
                PipelineStage::Index => self.run_index(&mut task, &repo_path).await,
                PipelineStage::Analyze => self.run_analyze(&mut task, &repo_path, cancel.clone()).await,
                PipelineStage::Document => self.run_document(&mut task, &repository.local_path).await,
            };

            if let Err(err) = outcome {
                error!(task_id, stage = ?stage, %err, "pipeline stage failed");
                task.mark_failed(err.to_string()).map_err(OrchestratorError::Conflict)?;
                self.store.update_task(task).await?;
                self.admission.notify_slot_freed();
                return Err(err);
            }

            self.store.update_task(task.clone()).await?;

            if task.status.is_terminal() {
                info!(task_id, status = %task.status, "task reached terminal state");
                self.admission.notify_slot_freed();
                return Ok(());
            }
        }
    }

    async fn run_scan(&self, task: &mut Task, repo_path: &std::path::Path) -> Result<(), OrchestratorError> {
        let (total_files, code_lines) = scan::run(&self.store, task, repo_path).await?;
        task.set_scan_totals(total_files, code_lines);
        task.advance_stage(PipelineStage::Index).map_err(OrchestratorError::Conflict)
    }

    async fn run_index(&self, task: &mut Task, repo_path: &std::path::Path) -> Result<(), OrchestratorError> {
        let files = self.store.list_file_analyses_by_task(&task.id).await?;
        let index_name = index::run(&self.vector, task, repo_path, &files, &self.config.index).await?;
        task.set_vector_index_name(index_name).map_err(OrchestratorError::Conflict)?;
        task.set_analysis_totals(files.len() as u32);
        task.advance_stage(PipelineStage::Analyze).map_err(OrchestratorError::Conflict)
    }

    async fn run_analyze(&self, task: &mut Task, repo_path: &std::path::Path, cancel: CancellationToken) -> Result<(), OrchestratorError> {
        let index_name = task
            .vector_index_name
            .clone()
            .ok_or_else(|| OrchestratorError::Fatal("analyze stage entered without an index".to_string()))?;

        analyze::run(
            &self.workers,
            &self.store,
            &self.vector,
            self.llm.clone(),
            &task.id,
            repo_path.to_path_buf(),
            &index_name,
            cancel,
        )
        .await?;

        let files = self.store.list_file_analyses_by_task(&task.id).await?;
        let successful = files.iter().filter(|f| f.status == FileAnalysisStatus::Success).count() as u32;
        let failed = files.iter().filter(|f| f.status == FileAnalysisStatus::Failed).count() as u32;
        task.successful_files = successful;
        task.failed_files = failed;
        task.analysis_success_files = successful;
        task.analysis_failed_files = failed;
        if let Some(last) = files.iter().filter(|f| f.is_terminal()).last() {
            task.current_file = Some(last.path.clone());
        }

        if task.is_analyze_complete() {
            task.set_module_count(Task::compute_module_count(&files.iter().map(|f| f.path.clone()).collect::<Vec<_>>()));
            task.advance_stage(PipelineStage::Document).map_err(OrchestratorError::Conflict)?;
        }
        Ok(())
    }

    async fn run_document(&self, task: &mut Task, local_path: &str) -> Result<(), OrchestratorError> {
        let repo_dir = PathBuf::from(&self.config.paths.repo_root).join(local_path);
        let outcome = document::run(self.docgen.as_ref(), &repo_dir.to_string_lossy(), &self.config.doc).await?;
        let failure_reason = match outcome {
            DocumentOutcome::Completed { markdown } => {
                self.store.upsert_readme(&task.id, markdown).await?;
                None
            }
            DocumentOutcome::Failed { reason } => Some(reason),
            DocumentOutcome::TimedOut => Some("document generation timed out".to_string()),
        };

        match failure_reason {
            Some(reason) if self.config.doc.fail_task_on_doc_error => {
                task.mark_failed(reason).map_err(OrchestratorError::Conflict)
            }
            _ => task.mark_completed().map_err(OrchestratorError::Conflict),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::llm::MockLlmAdapter;
    use crate::adapters::LocalDocGenAdapter;
    use crate::config::{Config, ConcurrencyConfig};
    use crate::domain::Repository;
    use crate::workers::RateLimiter;
    use std::time::Duration;
    use taskstore::Store as RawStore;

    async fn build_driver(repo_root: &std::path::Path) -> (PipelineDriver, TaskStore, String, String) {
        let store_dir = tempfile::tempdir().unwrap();
        let raw = RawStore::open(store_dir.path()).unwrap();
        let store = TaskStore::spawn(raw);

        let index_dir = tempfile::tempdir().unwrap();
        let vector = VectorAdapter::new(Arc::new(vectorindex::LocalVectorIndexAdapter::new(index_dir.path())));
        let llm: Arc<dyn LlmAdapter> = Arc::new(MockLlmAdapter);
        let docgen: Arc<dyn DocGenAdapter> = Arc::new(LocalDocGenAdapter::new(llm.clone()));

        let mut config = Config::default();
        config.paths.repo_root = repo_root.to_path_buf();
        config.doc.poll_interval_ms = 1;
        config.doc.max_total_ms = 2_000;
        config.index.batch_size = 10;
        let concurrency = ConcurrencyConfig {
            global_running_tasks: 5,
            worker_count: 2,
            prefetch: 1,
        };
        let pool = Arc::new(WorkerPool::new(&concurrency, config.retry.clone(), Arc::new(RateLimiter::new(1_000, Duration::from_secs(1)))));
        let admission = AdmissionQueue::new(store.clone(), &(&concurrency).into());

        let repo = Repository::new("demo", "alice/demo", "content-hash-1");
        let repo_id = repo.id.clone();
        store.create_repository(repo).await.unwrap();

        let mut task = Task::new(repo_id.clone(), serde_json::json!({}));
        task.admit().unwrap();
        let task_id = task.id.clone();
        store.create_task(task).await.unwrap();

        let driver = PipelineDriver::new(store.clone(), vector, llm, docgen, pool, admission, config);
        (driver, store, task_id, repo_id)
    }

    #[tokio::test]
    async fn drives_a_small_repository_to_completion() {
        let repo_root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(repo_root.path().join("content-hash-1")).unwrap();
        std::fs::write(repo_root.path().join("content-hash-1/main.rs"), "fn main() {\n    println!(\"hi\");\n}\n").unwrap();

        let (driver, store, task_id, _repo_id) = build_driver(repo_root.path()).await;
        driver.drive(&task_id, CancellationToken::new()).await.unwrap();

        let task = store.get_task(&task_id).await.unwrap().unwrap();
        assert_eq!(task.status, crate::domain::TaskStatus::Completed);
        assert_eq!(task.total_files, 1);
        assert!(task.vector_index_name.is_some());

        let readme = store.get_readme_by_task(&task_id).await.unwrap();
        assert!(readme.is_some());
    }

    #[tokio::test]
    async fn empty_repository_still_completes() {
        let repo_root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(repo_root.path().join("content-hash-1")).unwrap();

        let (driver, store, task_id, _repo_id) = build_driver(repo_root.path()).await;
        driver.drive(&task_id, CancellationToken::new()).await.unwrap();

        let task = store.get_task(&task_id).await.unwrap().unwrap();
        assert_eq!(task.status, crate::domain::TaskStatus::Completed);
        assert_eq!(task.total_files, 0);
    }
}
