use std::future::Future;
use std::time::Duration;

use indexer_config::shared::RetryConfig;
use tracing::{error, info, warn};

use crate::error::EtlResult;
use crate::retry::{RetryDirective, build_error_handling_policy};

/// Capped exponential backoff around an async operation.
///
/// The delay before retry `n` (zero based) is `min(initial_delay * backoff_factor^n,
/// max_delay)`. Errors classified as [`RetryDirective::Timed`] are retried without an attempt
/// limit; every other error is returned immediately.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if self.initial_delay.is_zero() {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(exponent);
        let max_delay_ms = self.max_delay.as_millis() as f64;

        Duration::from_millis(delay_ms.min(max_delay_ms) as u64)
    }

    /// Runs `operation` until it succeeds or fails with a non retriable error.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> EtlResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EtlResult<T>>,
    {
        let mut attempt: u32 = 0;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(attempts = attempt + 1, "operation succeeded after retrying");
                    }

                    return Ok(value);
                }
                Err(err) => {
                    let policy = build_error_handling_policy(&err);
                    if policy.retry_directive() == RetryDirective::NoRetry {
                        error!(
                            error = %err,
                            solution = policy.solution().unwrap_or_default(),
                            "operation failed with a non-retriable error"
                        );
                        return Err(err);
                    }

                    let delay = self.delay_for_attempt(attempt);
                    attempt = attempt.saturating_add(1);
                    warn!(
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "operation failed, retrying after backoff"
                    );

                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            initial_delay: config.initial_delay(),
            backoff_factor: config.backoff_factor,
            max_delay: config.max_delay(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::{ErrorKind, EtlError};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn delays_grow_exponentially_up_to_the_cap() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(7), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));

        let result = fast_policy()
            .run(|| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                        Err(EtlError::from((
                            ErrorKind::DestinationThrottled,
                            "Too many requests",
                        )))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn permanent_errors_are_returned_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));

        let result: EtlResult<()> = fast_policy()
            .run(|| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(EtlError::from((ErrorKind::ValidationError, "Bad row")))
                }
            })
            .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::ValidationError);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
