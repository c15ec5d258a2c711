//! File Analysis Worker Pool (C4).
//!
//! A bounded number of concurrent workers drain a task's pending
//! FileAnalysis rows. Workers share a global rate-limit token bucket and
//! a cancellation flag; each worker's own in-flight cap is 1 (a single
//! sequential request pipeline), enforced by the semaphore permit count
//! rather than any per-worker queue depth.

mod rate_limiter;
mod retry;

pub use rate_limiter::RateLimiter;
pub use retry::retry_with_backoff;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::{ConcurrencyConfig, RetryConfig};
use crate::error::OrchestratorError;
use crate::health::{is_unhealthy, WorkerHealth};

pub type JobFuture = Pin<Box<dyn Future<Output = Result<(), OrchestratorError>> + Send>>;

/// One unit of work: analyze a single file. `run` is supplied by the
/// pipeline driver so the worker pool stays agnostic of what "analyze"
/// actually does (LLM call, vector query, store write).
pub struct Job {
    pub label: String,
    pub run: Box<dyn Fn() -> JobFuture + Send>,
}

/// Signals workers to stop picking up new jobs; in-flight jobs finish or
/// abort at their next cancellation check.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    rate_limiter: Arc<RateLimiter>,
    retry_config: RetryConfig,
    worker_count: usize,
    in_flight: Arc<Mutex<HashMap<usize, usize>>>,
    last_heartbeat: Arc<Mutex<HashMap<usize, Instant>>>,
    next_worker_id: AtomicUsize,
}

impl WorkerPool {
    pub fn new(concurrency: &ConcurrencyConfig, retry: RetryConfig, rate_limiter: Arc<RateLimiter>) -> Self {
        let mut in_flight = HashMap::new();
        let mut last_heartbeat = HashMap::new();
        let now = Instant::now();
        for id in 0..concurrency.worker_count {
            in_flight.insert(id, 0);
            last_heartbeat.insert(id, now);
        }
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency.worker_count)),
            rate_limiter,
            retry_config: retry,
            worker_count: concurrency.worker_count,
            in_flight: Arc::new(Mutex::new(in_flight)),
            last_heartbeat: Arc::new(Mutex::new(last_heartbeat)),
            next_worker_id: AtomicUsize::new(0),
        }
    }

    pub fn worker_snapshots(&self) -> Vec<WorkerHealth> {
        let in_flight = self.in_flight.lock().unwrap();
        let last_heartbeat = self.last_heartbeat.lock().unwrap();
        let now = Instant::now();
        (0..self.worker_count)
            .map(|id| {
                let healthy = last_heartbeat.get(&id).map_or(true, |seen| !is_unhealthy(*seen, now));
                WorkerHealth {
                    worker_id: id,
                    in_flight: *in_flight.get(&id).unwrap_or(&0),
                    healthy,
                }
            })
            .collect()
    }

    /// Run every job to completion (or exhausted retries), honoring the
    /// pool's concurrency cap, the shared rate limiter, and `cancel`.
    /// Collects per-job outcomes rather than failing fast: one file's
    /// exhausted retries doesn't stop the rest of the batch.
    pub async fn run_batch(&self, jobs: Vec<Job>, cancel: CancellationToken) -> Vec<(String, Result<(), OrchestratorError>)> {
        let mut handles = Vec::with_capacity(jobs.len());

        for job in jobs {
            if cancel.is_cancelled() {
                break;
            }
            let semaphore = self.semaphore.clone();
            let rate_limiter = self.rate_limiter.clone();
            let retry_config = self.retry_config.clone();
            let in_flight = self.in_flight.clone();
            let last_heartbeat = self.last_heartbeat.clone();
            let worker_id = self.next_worker_id.fetch_add(1, Ordering::SeqCst) % self.worker_count.max(1);
            let cancel = cancel.clone();
            let label = job.label.clone();
            let run = job.run;

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                if cancel.is_cancelled() {
                    return (label, Err(OrchestratorError::Fatal("cancelled".to_string())));
                }

                {
                    let mut guard = in_flight.lock().unwrap();
                    *guard.entry(worker_id).or_insert(0) += 1;
                }
                last_heartbeat.lock().unwrap().insert(worker_id, Instant::now());

                rate_limiter.acquire().await;
                debug!(%label, worker_id, "worker starting job");

                let result = retry_with_backoff(&retry_config, || run()).await;

                {
                    let mut guard = in_flight.lock().unwrap();
                    if let Some(count) = guard.get_mut(&worker_id) {
                        *count = count.saturating_sub(1);
                    }
                }
                last_heartbeat.lock().unwrap().insert(worker_id, Instant::now());

                if let Err(ref err) = result {
                    warn!(%label, %err, "job failed after retries");
                }
                (label, result)
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_err) => outcomes.push(("<unknown>".to_string(), Err(OrchestratorError::Fatal(join_err.to_string())))),
            }
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn config(worker_count: usize) -> ConcurrencyConfig {
        ConcurrencyConfig {
            global_running_tasks: 5,
            worker_count,
            prefetch: 1,
        }
    }

    #[tokio::test]
    async fn fresh_pool_reports_every_worker_healthy() {
        let pool = WorkerPool::new(
            &config(3),
            RetryConfig {
                max_attempts: 1,
                base_ms: 1,
                jitter_frac: 0.0,
            },
            Arc::new(RateLimiter::new(1_000, Duration::from_secs(1))),
        );
        let snapshots = pool.worker_snapshots();
        assert_eq!(snapshots.len(), 3);
        assert!(snapshots.iter().all(|w| w.healthy));
    }

    #[tokio::test]
    async fn runs_all_jobs_and_reports_each_outcome() {
        let pool = WorkerPool::new(
            &config(2),
            RetryConfig {
                max_attempts: 1,
                base_ms: 1,
                jitter_frac: 0.0,
            },
            Arc::new(RateLimiter::new(1_000, Duration::from_secs(1))),
        );

        let jobs = (0..3)
            .map(|i| Job {
                label: format!("job-{i}"),
                run: Box::new(move || Box::pin(async move { Ok(()) }) as JobFuture),
            })
            .collect();

        let outcomes = pool.run_batch(jobs, CancellationToken::new()).await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|(_, r)| r.is_ok()));
    }

    #[tokio::test]
    async fn cancellation_stops_further_jobs_from_starting() {
        let pool = WorkerPool::new(
            &config(1),
            RetryConfig {
                max_attempts: 1,
                base_ms: 1,
                jitter_frac: 0.0,
            },
            Arc::new(RateLimiter::new(1_000, Duration::from_secs(1))),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let started = Arc::new(AtomicU32::new(0));
        let started_clone = started.clone();
        let jobs = vec![Job {
            label: "job-0".to_string(),
            run: Box::new(move || {
                started_clone.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move { Ok(()) }) as JobFuture
            }),
        }];

        let outcomes = pool.run_batch(jobs, cancel).await;
        assert!(outcomes.is_empty());
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }
}
