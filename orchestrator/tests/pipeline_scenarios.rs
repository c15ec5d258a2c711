//! End-to-end scenarios against the full stack (real TaskStore, real
//! vector index adapter, mock/local LLM and doc-gen), no mocked
//! internals — only the external services are swapped for local ones.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use orchestrator::{
    AdmissionQueue, CancellationToken, CompletionRequest, CompletionResponse, Config, LlmAdapter, LocalDocGenAdapter,
    MockLlmAdapter, OrchestratorError, PipelineDriver, PipelineStage, RateLimiter, Repository, Task, TaskStatus, TaskStore,
    VectorAdapter, WorkerPool,
};
use taskstore::Store as RawStore;

fn concurrency(workers: usize) -> orchestrator::config::ConcurrencyConfig {
    orchestrator::config::ConcurrencyConfig {
        global_running_tasks: 5,
        worker_count: workers,
        prefetch: 1,
    }
}

async fn new_store() -> (TaskStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let raw = RawStore::open(dir.path()).unwrap();
    (TaskStore::spawn(raw), dir)
}

fn write_repo(root: &Path, hash: &str, files: &[(&str, &str)]) {
    let dir = root.join(hash);
    std::fs::create_dir_all(&dir).unwrap();
    for (name, content) in files {
        std::fs::write(dir.join(name), content).unwrap();
    }
}

struct DriverHarness {
    driver: PipelineDriver,
    store: TaskStore,
    admission: AdmissionQueue,
    _store_dir: tempfile::TempDir,
    _index_dir: tempfile::TempDir,
}

async fn build_driver(repo_root: &Path, llm: Arc<dyn LlmAdapter>, concurrency_cfg: orchestrator::config::ConcurrencyConfig) -> DriverHarness {
    let (store, store_dir) = new_store().await;

    let index_dir = tempfile::tempdir().unwrap();
    let vector = VectorAdapter::new(Arc::new(vectorindex::LocalVectorIndexAdapter::new(index_dir.path())));

    let docgen = Arc::new(LocalDocGenAdapter::new(llm.clone()));

    let mut config = Config::default();
    config.paths.repo_root = repo_root.to_path_buf();
    config.doc.poll_interval_ms = 1;
    config.doc.max_total_ms = 2_000;
    config.retry.max_attempts = 3;
    config.retry.base_ms = 1;

    let pool = Arc::new(WorkerPool::new(
        &concurrency_cfg,
        config.retry.clone(),
        Arc::new(RateLimiter::new(10_000, Duration::from_secs(1))),
    ));
    let admission = AdmissionQueue::new(store.clone(), &(&concurrency_cfg).into());
    let driver = PipelineDriver::new(store.clone(), vector, llm, docgen, pool, admission.clone(), config);
    DriverHarness {
        driver,
        store,
        admission,
        _store_dir: store_dir,
        _index_dir: index_dir,
    }
}

/// S1 — happy path over a tiny repository.
#[tokio::test]
async fn happy_path_tiny_repo() {
    let repo_root = tempfile::tempdir().unwrap();
    write_repo(
        repo_root.path(),
        "hash-s1",
        &[
            ("a.py", "def a():\n    return 1\n"),
            ("b.py", "def b():\n    return 2\n"),
            ("c.md", "# hello\n"),
        ],
    );

    let h = build_driver(repo_root.path(), Arc::new(MockLlmAdapter), concurrency(2)).await;

    let repo = Repository::new("s1", "org/s1", "hash-s1");
    let repo_id = repo.id.clone();
    h.store.create_repository(repo).await.unwrap();

    let mut task = Task::new(repo_id, serde_json::json!({}));
    task.admit().unwrap();
    let task_id = task.id.clone();
    h.store.create_task(task).await.unwrap();

    h.driver.drive(&task_id, CancellationToken::new()).await.unwrap();

    let task = h.store.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.total_files, 3);
    assert_eq!(task.successful_files, 3);
    assert_eq!(task.failed_files, 0);
    assert!(task.vector_index_name.is_some());

    let readme = h.store.get_readme_by_task(&task_id).await.unwrap();
    assert!(readme.is_some());
    assert!(!readme.unwrap().content.is_empty());
}

/// S2 — admission queue with a concurrency cap of 1 admits tasks FIFO.
#[tokio::test]
async fn admission_queue_respects_concurrency_cap() {
    let (store, _dir) = new_store().await;

    let admission_cfg = orchestrator::config::AdmissionConfig {
        max_concurrent_tasks: 1,
        avg_task_duration_secs: 30,
    };
    let admission = AdmissionQueue::new(store.clone(), &admission_cfg);

    let repo = Repository::new("s2", "org/s2", "hash-s2");
    let repo_id = repo.id.clone();
    store.create_repository(repo).await.unwrap();

    let mut task_ids = Vec::new();
    for _ in 0..3 {
        let task = Task::new(repo_id.clone(), serde_json::json!({}));
        task_ids.push(task.id.clone());
        store.create_task(task).await.unwrap();
    }

    let r0 = admission.try_admit(&task_ids[0]).await.unwrap();
    assert_eq!(r0, orchestrator::AdmissionResult::Admitted);

    let r1 = admission.try_admit(&task_ids[1]).await.unwrap();
    assert!(matches!(r1, orchestrator::AdmissionResult::Queued { .. }));

    let running = store.count_running().await.unwrap();
    assert_eq!(running, 1, "only one task may be running at a time under N=1");
}

/// Returns transient errors for the first `fail_count` calls, then a
/// deterministic success, used to exercise S3's retry-then-succeed path.
struct FlakyLlmAdapter {
    fail_count: usize,
    calls: AtomicUsize,
}

#[async_trait]
impl LlmAdapter for FlakyLlmAdapter {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, OrchestratorError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_count {
            return Err(OrchestratorError::Transient("simulated transient failure".to_string()));
        }
        Ok(CompletionResponse {
            text: "Summary: recovered after retrying.".to_string(),
            usage: orchestrator::TokenUsage {
                input_tokens: 4,
                output_tokens: 6,
            },
        })
    }
}

/// S3 — a file that fails transiently twice still ends up with exactly
/// one success row once retries exhaust the failures.
#[tokio::test]
async fn transient_failure_retries_to_a_single_success_row() {
    let repo_root = tempfile::tempdir().unwrap();
    write_repo(repo_root.path(), "hash-s3", &[("x.py", "def x():\n    return 42\n")]);

    let flaky = Arc::new(FlakyLlmAdapter {
        fail_count: 2,
        calls: AtomicUsize::new(0),
    });
    let h = build_driver(repo_root.path(), flaky, concurrency(1)).await;

    let repo = Repository::new("s3", "org/s3", "hash-s3");
    let repo_id = repo.id.clone();
    h.store.create_repository(repo).await.unwrap();

    let mut task = Task::new(repo_id, serde_json::json!({}));
    task.admit().unwrap();
    let task_id = task.id.clone();
    h.store.create_task(task).await.unwrap();

    h.driver.drive(&task_id, CancellationToken::new()).await.unwrap();

    let files = h.store.list_file_analyses_by_task(&task_id).await.unwrap();
    let success_count = files.iter().filter(|f| f.status == orchestrator::FileAnalysisStatus::Success).count();
    assert_eq!(success_count, 1, "exactly one success row for (task, x.py)");

    let task = h.store.get_task(&task_id).await.unwrap().unwrap();
    assert_eq!(task.successful_files, 1);
}

/// S6 — hard-deleting a repository cascades its tasks/file-analyses/readme
/// and vector index, and a second delete is a no-op success.
#[tokio::test]
async fn delete_repository_cascade_is_idempotent() {
    let (store, _dir) = new_store().await;
    let index_dir = tempfile::tempdir().unwrap();
    let vector = VectorAdapter::new(Arc::new(vectorindex::LocalVectorIndexAdapter::new(index_dir.path())));

    let repo = Repository::new("s6", "org/s6", "hash-s6");
    let repo_id = repo.id.clone();
    store.create_repository(repo).await.unwrap();

    let mut task = Task::new(repo_id.clone(), serde_json::json!({}));
    task.admit().unwrap();
    task.advance_stage(orchestrator::PipelineStage::Index).unwrap();
    task.set_vector_index_name("s6-index").unwrap();
    let task_id = task.id.clone();
    store.create_task(task).await.unwrap();
    store.upsert_readme(&task_id, "# s6\n").await.unwrap();

    store.delete_repository_cascade(&repo_id, &vector).await.unwrap();
    assert!(store.get_repository(&repo_id).await.unwrap().is_none());
    assert!(store.get_task(&task_id).await.unwrap().is_none());
    assert!(store.get_readme_by_task(&task_id).await.unwrap().is_none());

    // Second delete of the same (now-absent) repository is still success.
    store.delete_repository_cascade(&repo_id, &vector).await.unwrap();
}

/// S6b — a soft delete flips status but keeps every row intact.
#[tokio::test]
async fn soft_delete_repository_keeps_rows() {
    let (store, _dir) = new_store().await;

    let repo = Repository::new("s6b", "org/s6b", "hash-s6b");
    let repo_id = repo.id.clone();
    store.create_repository(repo).await.unwrap();

    let task = Task::new(repo_id.clone(), serde_json::json!({}));
    let task_id = task.id.clone();
    store.create_task(task).await.unwrap();

    store.soft_delete_repository(&repo_id).await.unwrap();
    let repo = store.get_repository(&repo_id).await.unwrap().unwrap();
    assert!(!repo.is_active());
    assert!(store.get_task(&task_id).await.unwrap().is_some());
}
