//! Global sliding-window rate limiter shared by every worker, gating
//! calls into the LLM adapter to the provider's requests-per-minute
//! budget (`limits.rpm`).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;

struct Inner {
    timestamps: VecDeque<Instant>,
}

pub struct RateLimiter {
    inner: Mutex<Inner>,
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                timestamps: VecDeque::new(),
            }),
            limit,
            window,
        }
    }

    pub fn from_rpm(rpm: u32) -> Self {
        Self::new(rpm as usize, Duration::from_secs(60))
    }

    /// Blocks until a slot is free under the sliding window, then
    /// records the call.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut inner = self.inner.lock().await;
                let now = Instant::now();
                let window_start = now.checked_sub(self.window).unwrap_or(now);
                while inner.timestamps.front().is_some_and(|t| *t < window_start) {
                    inner.timestamps.pop_front();
                }

                if inner.timestamps.len() < self.limit {
                    inner.timestamps.push_back(now);
                    None
                } else {
                    let oldest = *inner.timestamps.front().expect("len >= limit > 0 implies non-empty");
                    Some(self.window.saturating_sub(now.duration_since(oldest)))
                }
            };

            match wait {
                None => return,
                Some(duration) => sleep(duration).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_calls_under_the_limit_without_waiting() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn blocks_once_the_window_is_full() {
        let limiter = RateLimiter::new(1, Duration::from_millis(50));
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
