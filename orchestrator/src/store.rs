//! TaskStore - actor that owns the generic `taskstore::Store`.
//!
//! Everything the pipeline driver, admission queue, and worker pool need
//! from persistence goes through this handle so the underlying
//! `rusqlite::Connection` (not `Send`-friendly to share directly) stays
//! owned by a single task.

use taskstore::{Filter, FilterOp, IndexValue, Store};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::adapters::VectorAdapter;
use crate::domain::{AnalysisItem, FileAnalysis, FileAnalysisStatus, ReadmeArtifact, Repository, Task, TaskStatus};
use crate::error::OrchestratorError;

#[derive(Debug, Error)]
pub enum TaskStoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("actor channel closed")]
    ChannelClosed,
}

impl From<taskstore::StoreError> for TaskStoreError {
    fn from(err: taskstore::StoreError) -> Self {
        match err {
            taskstore::StoreError::NotFound { collection, id } => {
                TaskStoreError::NotFound(format!("{collection}/{id}"))
            }
            other => TaskStoreError::Store(other.to_string()),
        }
    }
}

pub type TaskStoreResult<T> = Result<T, TaskStoreError>;

enum Command {
    CreateRepository {
        repo: Repository,
        reply: oneshot::Sender<TaskStoreResult<String>>,
    },
    GetRepository {
        id: String,
        reply: oneshot::Sender<TaskStoreResult<Option<Repository>>>,
    },
    /// `soft: true` only flips the repository's status; `soft: false`
    /// additionally removes the Repository row and every owned Task's
    /// dependent rows. Replies with the `vector_index_name` of every task
    /// actually removed, so the caller can clean up those indexes too
    /// (empty on a soft delete).
    DeleteRepositoryCascade {
        id: String,
        soft: bool,
        reply: oneshot::Sender<TaskStoreResult<Vec<String>>>,
    },

    CreateTask {
        task: Task,
        reply: oneshot::Sender<TaskStoreResult<String>>,
    },
    GetTask {
        id: String,
        reply: oneshot::Sender<TaskStoreResult<Option<Task>>>,
    },
    UpdateTask {
        task: Task,
        reply: oneshot::Sender<TaskStoreResult<()>>,
    },
    /// Pending task ids, ordered oldest-created-first (FIFO admission order).
    ListPendingTaskIds {
        reply: oneshot::Sender<TaskStoreResult<Vec<String>>>,
    },
    /// Running task ids, used by startup recovery to re-spawn drivers
    /// for tasks orphaned by a prior crash.
    ListRunningTaskIds {
        reply: oneshot::Sender<TaskStoreResult<Vec<String>>>,
    },
    CountRunning {
        reply: oneshot::Sender<TaskStoreResult<usize>>,
    },

    /// Upsert policy: a file that already reached `Success` is never
    /// overwritten by a later `Failed` retry result for the same path.
    AppendFileAnalysis {
        analysis: FileAnalysis,
        reply: oneshot::Sender<TaskStoreResult<String>>,
    },
    ListFileAnalysesByTask {
        task_id: String,
        reply: oneshot::Sender<TaskStoreResult<Vec<FileAnalysis>>>,
    },
    GetFileAnalysisByPath {
        task_id: String,
        path: String,
        reply: oneshot::Sender<TaskStoreResult<Option<FileAnalysis>>>,
    },

    AppendAnalysisItems {
        items: Vec<AnalysisItem>,
        reply: oneshot::Sender<TaskStoreResult<usize>>,
    },
    ListAnalysisItemsByFileAnalysis {
        file_analysis_id: String,
        reply: oneshot::Sender<TaskStoreResult<Vec<AnalysisItem>>>,
    },

    UpsertReadme {
        task_id: String,
        content: String,
        reply: oneshot::Sender<TaskStoreResult<ReadmeArtifact>>,
    },
    GetReadmeByTask {
        task_id: String,
        reply: oneshot::Sender<TaskStoreResult<Option<ReadmeArtifact>>>,
    },

    Sync {
        reply: oneshot::Sender<TaskStoreResult<()>>,
    },
}

/// Handle to the TaskStore actor. Cheap to clone; every clone shares the
/// same underlying `taskstore::Store`.
#[derive(Clone)]
pub struct TaskStore {
    tx: mpsc::Sender<Command>,
}

impl TaskStore {
    pub fn spawn(store: Store) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(store, rx));
        info!("TaskStore actor spawned");
        Self { tx }
    }

    async fn call<T>(&self, make_cmd: impl FnOnce(oneshot::Sender<TaskStoreResult<T>>) -> Command) -> TaskStoreResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make_cmd(reply_tx))
            .await
            .map_err(|_| TaskStoreError::ChannelClosed)?;
        reply_rx.await.map_err(|_| TaskStoreError::ChannelClosed)?
    }

    pub async fn create_repository(&self, repo: Repository) -> TaskStoreResult<String> {
        self.call(|reply| Command::CreateRepository { repo, reply }).await
    }

    pub async fn get_repository(&self, id: &str) -> TaskStoreResult<Option<Repository>> {
        self.call(|reply| Command::GetRepository { id: id.to_string(), reply }).await
    }

    /// Soft delete: flips the repository's status only, keeping every row
    /// for audit/recovery. The local repo directory is considered gone
    /// once this is called, but nothing in the store is removed.
    pub async fn soft_delete_repository(&self, id: &str) -> TaskStoreResult<()> {
        self.call(|reply| Command::DeleteRepositoryCascade {
            id: id.to_string(),
            soft: true,
            reply,
        })
        .await
        .map(|_| ())
    }

    /// Hard delete: removes the Repository row and every owned Task's
    /// FileAnalysis, AnalysisItem, and ReadmeArtifact rows, then deletes
    /// the vector index for each task that had one. A second call against
    /// an already-deleted repository is a no-op success.
    pub async fn delete_repository_cascade(&self, id: &str, vector: &VectorAdapter) -> Result<(), OrchestratorError> {
        let index_names = self
            .call(|reply| Command::DeleteRepositoryCascade {
                id: id.to_string(),
                soft: false,
                reply,
            })
            .await?;
        for index_name in index_names {
            vector.delete_index(&index_name).await?;
        }
        Ok(())
    }

    pub async fn create_task(&self, task: Task) -> TaskStoreResult<String> {
        self.call(|reply| Command::CreateTask { task, reply }).await
    }

    pub async fn get_task(&self, id: &str) -> TaskStoreResult<Option<Task>> {
        self.call(|reply| Command::GetTask { id: id.to_string(), reply }).await
    }

    pub async fn update_task(&self, task: Task) -> TaskStoreResult<()> {
        self.call(|reply| Command::UpdateTask { task, reply }).await
    }

    pub async fn list_pending_task_ids(&self) -> TaskStoreResult<Vec<String>> {
        self.call(|reply| Command::ListPendingTaskIds { reply }).await
    }

    pub async fn list_running_task_ids(&self) -> TaskStoreResult<Vec<String>> {
        self.call(|reply| Command::ListRunningTaskIds { reply }).await
    }

    pub async fn count_running(&self) -> TaskStoreResult<usize> {
        self.call(|reply| Command::CountRunning { reply }).await
    }

    pub async fn append_file_analysis(&self, analysis: FileAnalysis) -> TaskStoreResult<String> {
        self.call(|reply| Command::AppendFileAnalysis { analysis, reply }).await
    }

    pub async fn list_file_analyses_by_task(&self, task_id: &str) -> TaskStoreResult<Vec<FileAnalysis>> {
        self.call(|reply| Command::ListFileAnalysesByTask {
            task_id: task_id.to_string(),
            reply,
        })
        .await
    }

    pub async fn get_file_analysis_by_path(&self, task_id: &str, path: &str) -> TaskStoreResult<Option<FileAnalysis>> {
        self.call(|reply| Command::GetFileAnalysisByPath {
            task_id: task_id.to_string(),
            path: path.to_string(),
            reply,
        })
        .await
    }

    pub async fn append_analysis_items(&self, items: Vec<AnalysisItem>) -> TaskStoreResult<usize> {
        self.call(|reply| Command::AppendAnalysisItems { items, reply }).await
    }

    pub async fn list_analysis_items_by_file_analysis(&self, file_analysis_id: &str) -> TaskStoreResult<Vec<AnalysisItem>> {
        self.call(|reply| Command::ListAnalysisItemsByFileAnalysis {
            file_analysis_id: file_analysis_id.to_string(),
            reply,
        })
        .await
    }

    pub async fn upsert_readme(&self, task_id: &str, content: impl Into<String>) -> TaskStoreResult<ReadmeArtifact> {
        self.call(|reply| Command::UpsertReadme {
            task_id: task_id.to_string(),
            content: content.into(),
            reply,
        })
        .await
    }

    pub async fn get_readme_by_task(&self, task_id: &str) -> TaskStoreResult<Option<ReadmeArtifact>> {
        self.call(|reply| Command::GetReadmeByTask {
            task_id: task_id.to_string(),
            reply,
        })
        .await
    }

    pub async fn sync(&self) -> TaskStoreResult<()> {
        self.call(|reply| Command::Sync { reply }).await
    }
}

fn by_task_id(task_id: &str) -> Filter {
    Filter {
        field: "task_id".to_string(),
        op: FilterOp::Eq,
        value: IndexValue::String(task_id.to_string()),
    }
}

async fn actor_loop(mut store: Store, mut rx: mpsc::Receiver<Command>) {
    debug!("TaskStore actor_loop: started");
    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::CreateRepository { repo, reply } => {
                let result = store.create(repo).map_err(TaskStoreError::from);
                let _ = reply.send(result);
            }
            Command::GetRepository { id, reply } => {
                let result = store.get(&id).map_err(TaskStoreError::from);
                let _ = reply.send(result);
            }
            Command::DeleteRepositoryCascade { id, soft, reply } => {
                let result = (|| -> TaskStoreResult<Vec<String>> {
                    if soft {
                        if let Some(mut repo) = store.get::<Repository>(&id)? {
                            repo.mark_deleted();
                            store.update(repo)?;
                        }
                        return Ok(Vec::new());
                    }

                    let tasks: Vec<Task> = store.list::<Task>(&[Filter {
                        field: "repository_id".to_string(),
                        op: FilterOp::Eq,
                        value: IndexValue::String(id.clone()),
                    }])?;
                    let mut index_names = Vec::new();
                    for task in tasks {
                        if let Some(index_name) = &task.vector_index_name {
                            index_names.push(index_name.clone());
                        }
                        store.delete_by_index::<FileAnalysis>("task_id", &IndexValue::String(task.id.clone()))?;
                        store.delete_by_index::<AnalysisItem>("task_id", &IndexValue::String(task.id.clone()))?;
                        store.delete_by_index::<ReadmeArtifact>("task_id", &IndexValue::String(task.id.clone()))?;
                        store.delete::<Task>(&task.id)?;
                    }
                    store.delete::<Repository>(&id)?;
                    Ok(index_names)
                })();
                let _ = reply.send(result);
            }

            Command::CreateTask { task, reply } => {
                let result = store.create(task).map_err(TaskStoreError::from);
                let _ = reply.send(result);
            }
            Command::GetTask { id, reply } => {
                let result = store.get(&id).map_err(TaskStoreError::from);
                let _ = reply.send(result);
            }
            Command::UpdateTask { task, reply } => {
                let result = store.update(task).map_err(TaskStoreError::from);
                let _ = reply.send(result);
            }
            Command::ListPendingTaskIds { reply } => {
                let result = (|| -> TaskStoreResult<Vec<String>> {
                    let mut tasks = store.list::<Task>(&[Filter {
                        field: "status".to_string(),
                        op: FilterOp::Eq,
                        value: IndexValue::String(TaskStatus::Pending.to_string()),
                    }])?;
                    tasks.sort_by_key(|t| t.created_at);
                    Ok(tasks.into_iter().map(|t| t.id).collect())
                })();
                let _ = reply.send(result);
            }
            Command::ListRunningTaskIds { reply } => {
                let result = (|| -> TaskStoreResult<Vec<String>> {
                    let mut tasks = store.list::<Task>(&[Filter {
                        field: "status".to_string(),
                        op: FilterOp::Eq,
                        value: IndexValue::String(TaskStatus::Running.to_string()),
                    }])?;
                    tasks.sort_by_key(|t| t.created_at);
                    Ok(tasks.into_iter().map(|t| t.id).collect())
                })();
                let _ = reply.send(result);
            }
            Command::CountRunning { reply } => {
                let result = store
                    .list::<Task>(&[Filter {
                        field: "status".to_string(),
                        op: FilterOp::Eq,
                        value: IndexValue::String(TaskStatus::Running.to_string()),
                    }])
                    .map(|v| v.len())
                    .map_err(TaskStoreError::from);
                let _ = reply.send(result);
            }

            Command::AppendFileAnalysis { analysis, reply } => {
                let result = (|| -> TaskStoreResult<String> {
                    let existing = store.list::<FileAnalysis>(&[
                        by_task_id(&analysis.task_id),
                        Filter {
                            field: "path".to_string(),
                            op: FilterOp::Eq,
                            value: IndexValue::String(analysis.path.clone()),
                        },
                    ])?;
                    if let Some(prior) = existing.into_iter().next() {
                        if prior.status == FileAnalysisStatus::Success && analysis.status != FileAnalysisStatus::Success {
                            debug!(path = %analysis.path, "preserving prior success, ignoring later failure");
                            return Ok(prior.id);
                        }
                        let mut merged = analysis;
                        merged.id = prior.id.clone();
                        store.update(merged)?;
                        return Ok(prior.id);
                    }
                    let id = analysis.id.clone();
                    store.create(analysis)?;
                    Ok(id)
                })();
                let _ = reply.send(result);
            }
            Command::ListFileAnalysesByTask { task_id, reply } => {
                let result = store.list::<FileAnalysis>(&[by_task_id(&task_id)]).map_err(TaskStoreError::from);
                let _ = reply.send(result);
            }
            Command::GetFileAnalysisByPath { task_id, path, reply } => {
                let result = (|| -> TaskStoreResult<Option<FileAnalysis>> {
                    let found = store.list::<FileAnalysis>(&[
                        by_task_id(&task_id),
                        Filter {
                            field: "path".to_string(),
                            op: FilterOp::Eq,
                            value: IndexValue::String(path),
                        },
                    ])?;
                    Ok(found.into_iter().next())
                })();
                let _ = reply.send(result);
            }

            Command::AppendAnalysisItems { items, reply } => {
                let result = (|| -> TaskStoreResult<usize> {
                    let mut count = 0;
                    for item in items {
                        store.create(item)?;
                        count += 1;
                    }
                    Ok(count)
                })();
                let _ = reply.send(result);
            }
            Command::ListAnalysisItemsByFileAnalysis { file_analysis_id, reply } => {
                let result = store
                    .list::<AnalysisItem>(&[Filter {
                        field: "file_analysis_id".to_string(),
                        op: FilterOp::Eq,
                        value: IndexValue::String(file_analysis_id),
                    }])
                    .map_err(TaskStoreError::from);
                let _ = reply.send(result);
            }

            Command::UpsertReadme { task_id, content, reply } => {
                let result = (|| -> TaskStoreResult<ReadmeArtifact> {
                    let existing = store.list::<ReadmeArtifact>(&[by_task_id(&task_id)])?;
                    if let Some(mut readme) = existing.into_iter().next() {
                        readme.replace_content(content);
                        store.update(readme.clone())?;
                        return Ok(readme);
                    }
                    let readme = ReadmeArtifact::new(task_id, content);
                    store.create(readme.clone())?;
                    Ok(readme)
                })();
                let _ = reply.send(result);
            }
            Command::GetReadmeByTask { task_id, reply } => {
                let result = (|| -> TaskStoreResult<Option<ReadmeArtifact>> {
                    let found = store.list::<ReadmeArtifact>(&[by_task_id(&task_id)])?;
                    Ok(found.into_iter().next())
                })();
                let _ = reply.send(result);
            }

            Command::Sync { reply } => {
                let result = store.sync().map_err(TaskStoreError::from);
                let _ = reply.send(result);
            }
        }
    }
    debug!("TaskStore actor_loop: channel closed, exiting");
}
