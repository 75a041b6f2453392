//! Retry and timeout wrappers for connector calls.
//!
//! Connector calls cross a network boundary, so every call gets a bounded
//! timeout, and transient failures (timeouts, outages) may be retried with
//! exponential backoff. `NotFound` is never retried.

use crate::traits::{ConnectorError, ConnectorResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (beyond the initial call).
    pub max_retries: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No retries: fail on the first error.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Calculates the delay for a given attempt number (0-indexed).
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay = base_delay.min(self.max_delay.as_millis() as f64);

        let final_delay = if self.jitter {
            // Up to 25% jitter to avoid thundering herds
            let jitter_factor = 1.0 + (rand_jitter() * 0.25);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay as u64)
    }
}

/// Simple pseudo-random jitter factor (0.0 to 1.0).
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

/// Runs a single connector call under a bounded timeout.
///
/// An elapsed timeout is reported as `ConnectorError::Timeout` carrying the
/// configured bound in seconds.
pub async fn call_with_timeout<T, Fut>(timeout: Duration, fut: Fut) -> ConnectorResult<T>
where
    Fut: Future<Output = ConnectorResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(ConnectorError::Timeout(timeout.as_secs())),
    }
}

/// Runs a connector call with a per-call timeout and bounded retries.
///
/// The operation closure is invoked once per attempt. Retries apply only to
/// errors classified as retryable; the final error is returned once the
/// budget is exhausted.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    timeout: Duration,
    operation: &str,
    mut call: F,
) -> ConnectorResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ConnectorResult<T>>,
{
    let mut attempt = 0u32;
    loop {
        match call_with_timeout(timeout, call()).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation, attempt, "connector call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && attempt < config.max_retries => {
                let delay = config.calculate_delay(attempt);
                warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient connector error, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
