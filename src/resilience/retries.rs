//! Retry logic.
//!
//! # Responsibilities
//! - Run an operation up to `max_attempts` times
//! - Sleep `attempt * backoff_step` between attempts, without blocking the runtime
//!
//! The same attempt count also bounds failovers across machines; see
//! `dispatch::Dispatcher`.

use std::future::Future;
use std::time::Duration;

use crate::config::ResilienceConfig;
use crate::resilience::backoff::calculate_backoff;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl From<&ResilienceConfig> for RetryPolicy {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            backoff_step: config.retry_backoff(),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt`, or `None` once the
    /// attempts are used up.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then(|| calculate_backoff(attempt, self.backoff_step))
    }

    /// Call `op` with the 1-based attempt number until it succeeds or the
    /// attempts run out. Returns the last error on exhaustion.
    pub async fn retry<F, Fut, T, E>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => match self.delay_after(attempt) {
                    Some(delay) => {
                        tracing::debug!(attempt, delay = ?delay, "Retrying after backoff");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => return Err(e),
                },
            }
        }
    }
}
