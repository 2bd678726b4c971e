use std::future::Future;
use std::time::Duration;

use crossgrant_spec::Retryable;
use rand::Rng;
use tracing::warn;

/// Bounded exponential backoff applied to every remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Policy that never waits between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self::new(max_retries, Duration::ZERO, Duration::ZERO)
    }

    /// Upper bound of the wait before retry number `retry` (1-based).
    pub fn backoff_ceiling(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Wait before retry number `retry`: half the ceiling plus random jitter
    /// over the other half.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let ceiling = self.backoff_ceiling(retry);
        let half = ceiling / 2;
        let spread = (ceiling - half).as_millis() as u64;
        if spread == 0 {
            return ceiling;
        }
        half + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// retry budget is spent. The last error is returned unchanged.
    pub async fn run<F, Fut, T, E>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut retry = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() || retry >= self.max_retries => return Err(err),
                Err(err) => {
                    retry += 1;
                    let delay = self.delay_for(retry);
                    warn!(
                        operation,
                        attempt = retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossgrant_spec::{Error, RemoteError, Service};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn throttled() -> Error {
        RemoteError::transient(Service::Bucket, "get_bucket_policy", "SlowDown").into()
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), Duration::from_millis(1000));
        assert_eq!(policy.backoff_ceiling(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_ceiling(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_ceiling(4), Duration::from_millis(800));
        assert_eq!(policy.backoff_ceiling(5), Duration::from_millis(1000));
        assert_eq!(policy.backoff_ceiling(40), Duration::from_millis(1000));

        for retry in 1..8 {
            let delay = policy.delay_for(retry);
            let ceiling = policy.backoff_ceiling(retry);
            assert!(delay >= ceiling / 2 && delay <= ceiling, "{delay:?} vs {ceiling:?}");
        }
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = &AtomicU32::new(0);
        let result = RetryPolicy::immediate(3)
            .run("op", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(throttled())
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn budget_exhaustion_returns_the_last_error() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), Error> = RetryPolicy::immediate(2)
            .run("op", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(throttled())
            })
            .await;

        assert_eq!(result, Err(throttled()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_fail_on_first_attempt() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), Error> = RetryPolicy::immediate(5)
            .run("op", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::MalformedPolicy("eof".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_attempts() {
        let policy = RetryPolicy::new(1, Duration::from_secs(4), Duration::from_secs(4));
        let started = tokio::time::Instant::now();
        let calls = &AtomicU32::new(0);
        let _ = policy
            .run("op", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(throttled())
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }
}
