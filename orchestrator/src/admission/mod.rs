//! Admission queue: gates how many tasks can be `Running` at once.
//!
//! Strict FIFO by task creation time (no priority lanes). Backed by the
//! `TaskStore`'s `pending` index rather than an in-memory heap, so the
//! queue survives process restarts without any extra bookkeeping: on
//! crash recovery the orchestrator just re-derives "what's waiting" from
//! `list_pending_task_ids`.

use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

use crate::config::AdmissionConfig;
use crate::error::OrchestratorError;
use crate::store::TaskStore;

/// Outcome of an admission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionResult {
    /// A slot was free; the task transitioned to `running` immediately.
    Admitted,
    /// Still waiting behind `position` other pending tasks.
    Queued { position: usize, estimated_wait: Duration },
}

/// Admission queue over the durable task store. Cheap to clone; every
/// clone wakes the same waiters.
#[derive(Clone)]
pub struct AdmissionQueue {
    store: TaskStore,
    max_concurrent: usize,
    avg_task_duration: Duration,
    notify: std::sync::Arc<Notify>,
}

impl AdmissionQueue {
    pub fn new(store: TaskStore, config: &AdmissionConfig) -> Self {
        Self {
            store,
            max_concurrent: config.max_concurrent_tasks,
            avg_task_duration: Duration::from_secs(config.avg_task_duration_secs),
            notify: std::sync::Arc::new(Notify::new()),
        }
    }

    /// Try to admit `task_id`. Does not block; callers that want to wait
    /// for a slot should use [`Self::wait_for_slot`].
    pub async fn try_admit(&self, task_id: &str) -> Result<AdmissionResult, OrchestratorError> {
        let running = self.store.count_running().await.map_err(store_err)?;
        let pending_ids = self.store.list_pending_task_ids().await.map_err(store_err)?;

        if running < self.max_concurrent {
            let mut task = self
                .store
                .get_task(task_id)
                .await
                .map_err(store_err)?
                .ok_or_else(|| OrchestratorError::NotFound(format!("task/{task_id}")))?;
            task.admit().map_err(OrchestratorError::Conflict)?;
            self.store.update_task(task).await.map_err(store_err)?;
            debug!(task_id, "admitted");
            return Ok(AdmissionResult::Admitted);
        }

        let position = pending_ids.iter().position(|id| id == task_id).map(|p| p + 1).unwrap_or(pending_ids.len());
        let estimated_wait = estimate_wait(position, self.max_concurrent, self.avg_task_duration);
        Ok(AdmissionResult::Queued { position, estimated_wait })
    }

    /// Block until `task_id` is admitted, polling on completion
    /// notifications rather than a fixed interval.
    pub async fn wait_for_slot(&self, task_id: &str) -> Result<(), OrchestratorError> {
        loop {
            match self.try_admit(task_id).await? {
                AdmissionResult::Admitted => return Ok(()),
                AdmissionResult::Queued { .. } => {
                    self.notify.notified().await;
                }
            }
        }
    }

    /// Called by the pipeline driver when a task reaches a terminal
    /// state, to wake any admission waiters blocked on a free slot.
    pub fn notify_slot_freed(&self) {
        self.notify.notify_waiters();
    }

}

fn estimate_wait(position: usize, max_concurrent: usize, avg_task_duration: Duration) -> Duration {
    if max_concurrent == 0 {
        return Duration::from_secs(0);
    }
    Duration::from_secs((position as u64 * avg_task_duration.as_secs()) / max_concurrent as u64)
}

fn store_err(err: crate::store::TaskStoreError) -> OrchestratorError {
    OrchestratorError::Transient(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_wait_scales_with_position_and_concurrency() {
        // position 3 behind a concurrency of 2 => 90s estimate.
        assert_eq!(estimate_wait(3, 2, Duration::from_secs(60)), Duration::from_secs(90));
    }

    #[test]
    fn estimate_wait_is_zero_with_no_concurrency_configured() {
        assert_eq!(estimate_wait(5, 0, Duration::from_secs(60)), Duration::from_secs(0));
    }
}
