//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::cancel::FetchCancel;
use crate::error::{FetchError, FetchResult};

/// Attempt cap and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubled after each further one.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay slept after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay.saturating_mul(1_u32 << exponent)
    }
}

/// Source of backoff delays.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `delay`.
    async fn sleep(&self, delay: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Run `operation` until it succeeds, fails permanently, or the policy is
/// exhausted. The last error is returned on exhaustion.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    sleeper: &dyn Sleeper,
    cancel: &FetchCancel,
    label: &str,
    mut operation: F,
) -> FetchResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = FetchResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    request = label,
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "request failed; retrying"
                );
                tokio::select! {
                    () = sleeper.sleep(delay) => {}
                    () = cancel.cancelled() => return Err(FetchError::Cancelled),
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default, Clone)]
    struct RecordingSleeper {
        delays: Arc<Mutex<Vec<Duration>>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, delay: Duration) {
            self.delays.lock().expect("delay lock").push(delay);
        }
    }

    fn status_error() -> FetchError {
        FetchError::Status {
            url: "http://x/".to_string(),
            status: 503,
        }
    }

    #[test]
    fn delays_double_from_the_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn exhausted_attempts_sleep_between_each() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0;
        let result: FetchResult<()> = with_retry(
            RetryPolicy::default(),
            &sleeper,
            &FetchCancel::new(),
            "test",
            |_| {
                calls += 1;
                async { Err(status_error()) }
            },
        )
        .await;

        assert!(matches!(result, Err(FetchError::Status { status: 503, .. })));
        assert_eq!(calls, 3);
        assert_eq!(
            *sleeper.delays.lock().expect("delay lock"),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test]
    async fn recovers_on_a_later_attempt() {
        let sleeper = RecordingSleeper::default();
        let result = with_retry(
            RetryPolicy::default(),
            &sleeper,
            &FetchCancel::new(),
            "test",
            |attempt| async move {
                if attempt < 2 {
                    Err(status_error())
                } else {
                    Ok(attempt)
                }
            },
        )
        .await;
        assert_eq!(result.ok(), Some(2));
        assert_eq!(sleeper.delays.lock().expect("delay lock").len(), 1);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let sleeper = RecordingSleeper::default();
        let mut calls = 0;
        let result: FetchResult<()> = with_retry(
            RetryPolicy::default(),
            &sleeper,
            &FetchCancel::new(),
            "test",
            |_| {
                calls += 1;
                async { Err(FetchError::Cancelled) }
            },
        )
        .await;
        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert_eq!(calls, 1);
        assert!(sleeper.delays.lock().expect("delay lock").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_backoff_sleep() {
        let cancel = FetchCancel::new();
        let trip = cancel.clone();
        let mut calls = 0;
        let result: FetchResult<()> = with_retry(
            RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_secs(3600),
            },
            &TokioSleeper,
            &cancel,
            "test",
            |_| {
                calls += 1;
                trip.cancel();
                async { Err(status_error()) }
            },
        )
        .await;
        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert_eq!(calls, 1);
    }
}
