//! Exponential backoff with jitter for transient adapter errors.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::config::RetryConfig;
use crate::error::OrchestratorError;

/// Retries `f` up to `config.max_attempts` times while its error is
/// retryable (transient or rate-limited). Rate-limited errors honor
/// their own `retry_after` instead of the computed backoff.
pub async fn retry_with_backoff<F, Fut>(config: &RetryConfig, mut f: F) -> Result<(), OrchestratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), OrchestratorError>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_retryable() && attempt + 1 < config.max_attempts => {
                let delay = err.retry_after().unwrap_or_else(|| backoff_delay(config, attempt));
                debug!(attempt, ?delay, "retrying after transient error: {err}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let base = config.base_ms as f64 * 2f64.powi(attempt as i32);
    let jitter_span = base * config.jitter_frac;
    let jitter = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
    Duration::from_millis((base + jitter).max(0.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_ms: 1,
            jitter_frac: 0.0,
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_works() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&config(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_max_attempts() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&config(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(OrchestratorError::Transient("boom".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&config(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(OrchestratorError::Input("bad input".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
