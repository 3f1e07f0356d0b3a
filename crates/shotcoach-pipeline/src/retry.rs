//! Retry utilities with exponential backoff and jitter.
//!
//! Wraps pipeline stages and other flaky operations; only errors the caller
//! marks retryable are attempted again.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial one).
    pub max_retries: u32,
    /// Base delay for exponential backoff (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
    /// Fractional jitter applied to each delay, e.g. 0.2 for +/-20%.
    pub jitter: f64,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Backoff delay for an attempt: `min(base * 2^attempt, cap)` plus jitter.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let capped = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        if self.jitter <= 0.0 {
            return capped;
        }
        let spread = rand::rng().random_range(-self.jitter..=self.jitter);
        let jittered = capped.as_secs_f64() * (1.0 + spread);
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Execute an async operation with exponential-backoff retries.
///
/// `is_retryable` decides whether a given error is worth another attempt;
/// non-retryable errors propagate immediately.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation: F,
    is_retryable: impl Fn(&E) -> bool,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) && attempt + 1 < config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                attempt += 1;
                debug!(
                    operation = %config.operation_name,
                    attempt,
                    ?delay,
                    error = %e,
                    "retryable error, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if attempt > 0 {
                    warn!(
                        operation = %config.operation_name,
                        attempts = attempt + 1,
                        error = %e,
                        "giving up"
                    );
                }
                return Err(e);
            }
        }
    }
}
