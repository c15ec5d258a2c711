//! Top-level orchestrator: polls the admission queue, spawns a pipeline
//! driver task per running task, and tracks their lifecycle via a task
//! registry. Mirrors the teacher's loop-manager shape but over a single
//! flat task model rather than loops/executions/cascades.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::admission::{AdmissionQueue, AdmissionResult};
use crate::config::Config;
use crate::domain::TaskStatus;
use crate::pipeline::PipelineDriver;
use crate::store::TaskStore;
use crate::workers::CancellationToken;

/// Outcome of one task's pipeline run, reported back to the manager loop.
#[derive(Debug)]
enum TaskOutcome {
    Finished { task_id: String },
    Failed { task_id: String, reason: String },
}

pub struct OrchestratorConfig {
    pub poll_interval_secs: u64,
    pub shutdown_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            shutdown_timeout_secs: 60,
        }
    }
}

/// Owns the long-running admission loop. Spawns one tokio task per
/// admitted [`crate::domain::Task`], tracked by id in `tasks` so the
/// manager can detect completion and coordinate shutdown.
pub struct Orchestrator {
    config: OrchestratorConfig,
    store: TaskStore,
    admission: AdmissionQueue,
    driver: PipelineDriver,
    tasks: HashMap<String, JoinHandle<TaskOutcome>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        store: TaskStore,
        admission: AdmissionQueue,
        driver: PipelineDriver,
    ) -> Self {
        Self {
            config,
            store,
            admission,
            driver,
            tasks: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Run the manager loop until `shutdown_rx` fires. Recovers
    /// interrupted tasks first, then alternates between polling for
    /// newly-pending tasks and reaping finished ones.
    pub async fn run(&mut self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        info!("orchestrator starting");

        self.recover_interrupted_tasks().await.context("failed to recover interrupted tasks")?;
        self.poll_and_spawn().await.context("initial poll_and_spawn failed")?;

        let mut interval = tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.poll_and_spawn().await {
                        warn!(%err, "poll_and_spawn failed");
                    }
                    self.reap_finished_tasks().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Find pending tasks and admit as many as the concurrency cap allows.
    async fn poll_and_spawn(&mut self) -> Result<()> {
        let pending_ids = self.store.list_pending_task_ids().await.context("list_pending_task_ids failed")?;
        for task_id in pending_ids {
            if self.tasks.contains_key(&task_id) {
                continue;
            }
            match self.admission.try_admit(&task_id).await {
                Ok(AdmissionResult::Admitted) => {
                    debug!(%task_id, "admitted, spawning pipeline driver");
                    self.spawn_task(task_id);
                }
                Ok(AdmissionResult::Queued { position, estimated_wait }) => {
                    debug!(%task_id, position, ?estimated_wait, "still queued");
                }
                Err(err) => {
                    warn!(%task_id, %err, "admission attempt failed");
                }
            }
        }
        Ok(())
    }

    fn spawn_task(&mut self, task_id: String) {
        let driver = self.driver.clone();
        let cancel = self.cancel.clone();
        let spawn_id = task_id.clone();

        let handle = tokio::spawn(async move {
            match driver.drive(&spawn_id, cancel).await {
                Ok(()) => TaskOutcome::Finished { task_id: spawn_id },
                Err(err) => TaskOutcome::Failed {
                    task_id: spawn_id,
                    reason: err.to_string(),
                },
            }
        });
        self.tasks.insert(task_id, handle);
    }

    async fn reap_finished_tasks(&mut self) {
        let finished: Vec<String> = self.tasks.iter().filter(|(_, h)| h.is_finished()).map(|(id, _)| id.clone()).collect();

        for task_id in finished {
            if let Some(handle) = self.tasks.remove(&task_id) {
                match handle.await {
                    Ok(TaskOutcome::Finished { task_id }) => {
                        info!(%task_id, "task completed");
                    }
                    Ok(TaskOutcome::Failed { task_id, reason }) => {
                        error!(%task_id, %reason, "task failed");
                    }
                    Err(join_err) => {
                        error!(%task_id, %join_err, "pipeline driver task panicked");
                    }
                }
                self.admission.notify_slot_freed();
            }
        }
    }

    /// On startup, any task left in `Running` belongs to a process that
    /// crashed mid-pipeline. Its `current_step` already says where it
    /// stopped, so we just re-spawn the driver for it rather than
    /// resetting state.
    async fn recover_interrupted_tasks(&mut self) -> Result<()> {
        let running_ids = self.store.list_running_task_ids().await.context("list_running_task_ids failed")?;
        if running_ids.is_empty() {
            debug!("no running tasks to recover at startup");
            return Ok(());
        }

        info!(running_count = running_ids.len(), "recovering interrupted tasks from a prior run");
        for task_id in running_ids {
            info!(%task_id, "re-spawning pipeline driver for interrupted task");
            self.spawn_task(task_id);
        }
        Ok(())
    }

    /// Signal cancellation to in-flight drivers and wait up to
    /// `shutdown_timeout_secs` for them to wind down before returning.
    async fn shutdown(&mut self) {
        info!(task_count = self.tasks.len(), "shutting down orchestrator");
        self.cancel.cancel();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(self.config.shutdown_timeout_secs);
        while !self.tasks.is_empty() && tokio::time::Instant::now() < deadline {
            self.reap_finished_tasks().await;
            if !self.tasks.is_empty() {
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
        }

        if !self.tasks.is_empty() {
            warn!(remaining = self.tasks.len(), "aborting tasks still running past shutdown timeout");
            for (_, handle) in self.tasks.drain() {
                handle.abort();
            }
        }

        info!("orchestrator shutdown complete");
    }
}
