//! Exponential-backoff retry for remote operations.

use std::time::Duration;

use tracing::{debug, warn};

/// Error classification hook used by [`RetryPolicy::execute`].
///
/// Retryable errors are rate limiting, server-side failures, and
/// transport-level problems; everything else fails on first sight.
pub trait RetryableError: std::error::Error {
    fn is_retryable(&self) -> bool;
}

impl RetryableError for repofleet_github::GithubError {
    fn is_retryable(&self) -> bool {
        repofleet_github::GithubError::is_retryable(self)
    }
}

impl RetryableError for repofleet_tailscale::TailscaleError {
    fn is_retryable(&self) -> bool {
        repofleet_tailscale::TailscaleError::is_retryable(self)
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first (1 = no retries).
    pub max_attempts: u32,
    /// Base of the exponential backoff schedule, in seconds.
    pub base_delay_secs: f64,
    /// Cap on the exponential component, in seconds.
    pub max_delay_secs: f64,
    /// Add up to one second of uniform jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 2.0,
            max_delay_secs: 60.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt count and backoff base.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay_secs: f64) -> Self {
        Self {
            max_attempts,
            base_delay_secs,
            ..Default::default()
        }
    }

    /// Policy with no delays, for tests.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_secs: 0.0,
            max_delay_secs: 0.0,
            jitter: false,
        }
    }

    /// Delay before retrying after the given 0-indexed failed attempt.
    ///
    /// The schedule is `min(base^attempt, cap)` plus up to one second of
    /// uniform jitter.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_secs
            .powi(attempt as i32)
            .min(self.max_delay_secs);
        let jitter = if self.jitter {
            rand::random::<f64>()
        } else {
            0.0
        };
        Duration::from_secs_f64(exponential + jitter)
    }

    /// Run `operation` until it succeeds, a fatal error occurs, or the
    /// attempt budget is exhausted.
    ///
    /// On exhaustion the last error is returned to the caller unchanged.
    pub async fn execute<F, Fut, T, E>(&self, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: RetryableError,
    {
        let mut attempt: u32 = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !error.is_retryable() {
                        return Err(error);
                    }
                    if attempt + 1 >= self.max_attempts {
                        warn!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            error = %error,
                            "Retries exhausted"
                        );
                        return Err(error);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_secs = delay.as_secs_f64(),
                        error = %error,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
