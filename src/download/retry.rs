//! Retry with exponential backoff for transient download failures.
//!
//! Attempts are numbered from 0. After a failed attempt `n` that is
//! retryable, and if another attempt is allowed, the task sleeps
//! `base_delay * 2^n` (1s, 2s, 4s, ... with the default base) and tries
//! again. Anything that is not [`ErrorKind::Transient`] ends the loop at once.
//!
//! With `max_attempts = 3` a persistently failing target therefore waits
//! `1 + 2 = 3` seconds in total before it is reported as failed.
//!
//! [`ErrorKind::Transient`]: crate::error::ErrorKind::Transient

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::{DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES};
use crate::error::DownloadError;

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BACKOFF_BASE)
    }
}

impl RetryPolicy {
    /// `max_attempts` includes the first attempt and is raised to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff after failed attempt `attempt` (0-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Total time spent sleeping before a target that never succeeds is
    /// given up on: `base * (2^0 + 2^1 + ... + 2^(max_attempts-2))`.
    #[must_use]
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.delay_for(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Runs `attempt_fn` until it succeeds, fails with a non-retryable error,
/// or the policy runs out of attempts.
///
/// On success returns the value together with the number of attempts used.
/// The backoff sleep is cut short with [`DownloadError::Cancelled`] when
/// `cancel` fires.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    url: &str,
    mut attempt_fn: F,
) -> Result<(T, u32), DownloadError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, DownloadError>>,
{
    let mut attempt = 0;
    loop {
        let error = match attempt_fn(attempt).await {
            Ok(value) => return Ok((value, attempt + 1)),
            Err(error) => error,
        };

        let is_last = attempt + 1 >= policy.max_attempts();
        if !error.is_retryable() {
            return Err(error);
        }
        if is_last {
            warn!(
                url,
                attempts = policy.max_attempts(),
                error = %error,
                "giving up after retries"
            );
            return Err(error);
        }

        let delay = policy.delay_for(attempt);
        warn!(
            url,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "attempt failed, retrying"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                return Err(DownloadError::Cancelled { url: url.to_string() });
            }
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    const URL: &str = "http://x.test/a.jpg";

    fn transient() -> DownloadError {
        DownloadError::Incomplete {
            url: URL.to_string(),
            written: 1,
            expected: 2,
        }
    }

    #[test]
    fn test_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn test_total_backoff() {
        assert_eq!(RetryPolicy::default().total_backoff(), Duration::from_secs(3));
        assert_eq!(
            RetryPolicy::new(5, Duration::from_secs(1)).total_backoff(),
            Duration::from_secs(1 + 2 + 4 + 8)
        );
        assert_eq!(
            RetryPolicy::new(1, Duration::from_secs(1)).total_backoff(),
            Duration::ZERO
        );
    }

    #[test]
    fn test_zero_attempts_raised_to_one() {
        assert_eq!(RetryPolicy::new(0, Duration::from_secs(1)).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt_after_three_seconds() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result = retry_with_backoff(&policy, &CancellationToken::new(), URL, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(transient())
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        let (value, attempts) = result.unwrap();
        assert_eq!(value, "done");
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(3100), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_failure_stops_at_max() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<((), u32), _> =
            retry_with_backoff(&policy, &CancellationToken::new(), URL, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;

        assert!(matches!(result, Err(DownloadError::Incomplete { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= policy.total_backoff());
        assert!(elapsed < policy.total_backoff() + Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unretryable_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<((), u32), _> =
            retry_with_backoff(&RetryPolicy::default(), &CancellationToken::new(), URL, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(DownloadError::HttpStatus {
                        url: URL.to_string(),
                        status: 404,
                    })
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(DownloadError::HttpStatus { status: 404, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let result: Result<((), u32), _> =
            retry_with_backoff(&RetryPolicy::default(), &cancel, URL, |_| {
                // Cancel while the first failure is being handled
                trigger.cancel();
                async { Err(transient()) }
            })
            .await;

        assert!(matches!(result, Err(DownloadError::Cancelled { .. })));
    }
}
