//! Health & Queue Introspection (C7).
//!
//! Read-only snapshot assembled from the TaskStore and worker pool; no
//! state lives here beyond what's needed to compute it on demand.

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::OrchestratorError;
use crate::store::TaskStore;
use crate::workers::WorkerPool;

/// A worker is declared unhealthy once its heartbeat is older than
/// 2x `HEARTBEAT_INTERVAL`.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Serialize)]
pub struct WorkerHealth {
    pub worker_id: usize,
    pub in_flight: usize,
    pub healthy: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub worker_count: usize,
    pub workers: Vec<WorkerHealth>,
    pub pending_queue_depth: usize,
    pub running_count: usize,
    pub estimated_wait_secs: u64,
}

pub struct HealthMonitor {
    store: TaskStore,
    pool: std::sync::Arc<WorkerPool>,
}

impl HealthMonitor {
    pub fn new(store: TaskStore, pool: std::sync::Arc<WorkerPool>) -> Self {
        Self { store, pool }
    }

    pub async fn report(&self) -> Result<HealthReport, OrchestratorError> {
        let pending = self
            .store
            .list_pending_task_ids()
            .await
            .map_err(|e| OrchestratorError::Transient(e.to_string()))?;
        let running_count = self
            .store
            .count_running()
            .await
            .map_err(|e| OrchestratorError::Transient(e.to_string()))?;

        let workers = self.pool.worker_snapshots();
        let worker_count = workers.len();
        let estimated_wait_secs = if worker_count == 0 {
            0
        } else {
            (pending.len() as u64 * 30) / worker_count as u64
        };

        Ok(HealthReport {
            worker_count,
            workers,
            pending_queue_depth: pending.len(),
            running_count,
            estimated_wait_secs,
        })
    }
}

/// Whether a heartbeat taken at `last_heartbeat` is stale enough that the
/// worker should be declared unhealthy and its tasks orphan-recovered.
pub fn is_unhealthy(last_heartbeat: Instant, now: Instant) -> bool {
    now.saturating_duration_since(last_heartbeat) > HEARTBEAT_INTERVAL * 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_heartbeat_is_healthy() {
        let now = Instant::now();
        assert!(!is_unhealthy(now, now));
    }

    #[test]
    fn heartbeat_older_than_2h_is_unhealthy() {
        let now = Instant::now();
        let stale = now - HEARTBEAT_INTERVAL * 3;
        assert!(is_unhealthy(stale, now));
    }
}
