//! Retry policy with linear backoff and jitter
//!
//! Every outbound call goes through a single [`RetryPolicy`]. The policy asks
//! the error whether it is worth retrying, waits `base_delay * attempt` plus a
//! random jitter, and gives up after `max_attempts`.

use log::{debug, warn};
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Errors that know whether a retry could help
pub trait RetryableError {
    /// True for transient failures (network errors, timeouts, 5xx)
    fn is_retryable(&self) -> bool;
}

/// Retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay unit, multiplied by the attempt number
    pub base_delay: Duration,
    /// Upper bound of the random jitter added to each delay
    pub max_jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_jitter: Duration::from_millis(250),
        }
    }
}

/// Shared retry strategy: classify, delay, attempt
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Attempts actually made, never less than one
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }

    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let linear = self.config.base_delay.saturating_mul(attempt);
        let jitter_ms = self.config.max_jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return linear;
        }
        let jitter = rand::rng().random_range(0..=jitter_ms);
        linear + Duration::from_millis(jitter)
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    ///
    /// The closure receives the 1-based attempt number. The last error is
    /// returned unchanged once the policy gives up.
    pub async fn execute<T, E, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, E>
    where
        E: RetryableError + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1;

        loop {
            match call(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}/{}", operation, attempt, max_attempts);
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {} - retrying in {}ms",
                        operation,
                        attempt,
                        max_attempts,
                        err,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        warn!(
                            "{} failed after {} attempts: {}",
                            operation, max_attempts, err
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        transient: bool,
    }

    impl Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (transient: {})", self.transient)
        }
    }

    impl RetryableError for TestError {
        fn is_retryable(&self) -> bool {
            self.transient
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_jitter: Duration::ZERO,
        })
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let policy = fast_policy(3);
        let attempts = AtomicU32::new(0);
        let counter = &attempts;

        let result: Result<&str, TestError> = policy
            .execute("test", |_| async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(TestError { transient: true })
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let policy = fast_policy(4);
        let attempts = AtomicU32::new(0);
        let counter = &attempts;

        let result: Result<(), TestError> = policy
            .execute("test", |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TestError { transient: true })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let policy = fast_policy(5);
        let attempts = AtomicU32::new(0);
        let counter = &attempts;

        let result: Result<(), TestError> = policy
            .execute("test", |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TestError { transient: false })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_number_is_passed_through() {
        let policy = fast_policy(3);
        let seen = std::sync::Mutex::new(Vec::new());

        let _: Result<(), TestError> = policy
            .execute("test", |attempt| {
                seen.lock().unwrap().push(attempt);
                async { Err(TestError { transient: true }) }
            })
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_delay_grows_linearly() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_jitter: Duration::ZERO,
        });

        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_jitter: Duration::from_millis(100),
        });

        for _ in 0..50 {
            let delay = policy.delay_for(2);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(1100));
        }
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        });
        assert_eq!(policy.max_attempts(), 1);
    }
}
