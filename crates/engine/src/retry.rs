//! Bounded optimistic retry with exponential backoff and jitter.
//!
//! Read-modify-write operations run inside [`with_retry`]. A stale version or
//! a backend hiccup re-runs the whole closure (re-reading fresh state); any
//! other error is returned immediately. When attempts run out the caller gets
//! [`CoreError::TransientStore`].

use std::future::Future;
use std::time::Duration;

use agency_core::error::CoreError;
use agency_core::repository::StoreError;
use rand::Rng;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Always at least 1.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(20),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (1-based). Attempt 0 has none.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32 - 1);
        let capped = base.min(self.max_delay.as_millis() as f64);
        let delay = if self.jitter {
            capped * (1.0 + rand::rng().random::<f64>() * 0.25)
        } else {
            capped
        };
        Duration::from_millis(delay as u64)
    }
}

/// Outcome of a single attempt that did not succeed.
#[derive(Debug)]
pub enum Attempt {
    /// Worth trying again against fresh state.
    Retry(String),
    Fail(CoreError),
}

impl From<CoreError> for Attempt {
    fn from(err: CoreError) -> Self {
        Attempt::Fail(err)
    }
}

impl From<StoreError> for Attempt {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::StaleVersion => Attempt::Retry("stale version".into()),
            StoreError::Backend(msg) => Attempt::Retry(msg),
            other => Attempt::Fail(other.into()),
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of attempts.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &'static str,
    mut operation: F,
) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Attempt>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(Attempt::Fail(err)) => return Err(err),
            Err(Attempt::Retry(reason)) if attempt >= max_attempts => {
                tracing::error!(
                    operation = operation_name,
                    attempts = attempt,
                    reason = %reason,
                    "Giving up after repeated store conflicts"
                );
                return Err(CoreError::TransientStore(format!(
                    "{operation_name} failed after {attempt} attempts: {reason}"
                )));
            }
            Err(Attempt::Retry(reason)) => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "Retrying store write"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
