//! Whole-pipeline retry
//!
//! Re-runs a fallible async operation with a fixed pause between attempts.
//! Only errors classified as transient by [`NetApplyError::is_retryable`]
//! trigger another attempt.

use crate::NetApplyError;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Fixed-delay retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least 1
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it succeeds, fails fatally or attempts run out.
    ///
    /// The closure receives the 1-based attempt number. The last error is
    /// returned once attempts are exhausted.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, NetApplyError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, NetApplyError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("Succeeded on attempt {}/{}", attempt, max_attempts);
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    warn!("Attempt {} failed with a permanent error: {}", attempt, e);
                    return Err(e);
                }
                Err(e) if attempt >= max_attempts => {
                    warn!("Giving up after {} attempts: {}", attempt, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{} failed: {}, retrying in {:?}",
                        attempt, max_attempts, e, self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_succeeds_on_last_attempt() {
        let calls = AtomicU32::new(0);
        let result = policy(3)
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(NetApplyError::LinkNotFound("fa:16:3e:00:00:01".into()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(4)
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(NetApplyError::command(format!("attempt {attempt}"), "busy")) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(result.unwrap_err().to_string(), "attempt 4 failed: busy");
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(5)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(NetApplyError::Decode("not json".into())) }
            })
            .await;

        assert!(matches!(result, Err(NetApplyError::Decode(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_attempts_runs_once() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_between_attempts() {
        let start = tokio::time::Instant::now();
        let _: Result<(), _> = RetryPolicy::new(3, Duration::from_secs(5))
            .run(|_| async { Err(NetApplyError::Datasource("unreachable".into())) })
            .await;
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }
}
