//! Bounded retry with exponential backoff, and the timeout wrapper every
//! external capability call goes through.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use intake_contracts::error::{IntakeError, IntakeResult};

/// Upper bound on the backoff exponent so long policies cannot overflow.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// How many times to try an operation and how long to wait between tries.
///
/// The delay after failed attempt `n` (1-based) is `base_delay · 2^(n-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Backoff to wait after `attempt` has failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Whether another attempt should follow `attempt` failing with `err`.
    pub fn should_retry(&self, attempt: u32, err: &IntakeError) -> bool {
        attempt < self.max_attempts.max(1) && err.is_retryable()
    }
}

/// Run `fut` with a deadline. Expiry becomes a retryable
/// [`IntakeError::Timeout`] naming `operation`.
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> IntakeResult<T>
where
    F: Future<Output = IntakeResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(IntakeError::Timeout {
            operation: operation.to_string(),
            after_ms: limit.as_millis() as u64,
        }),
    }
}

/// Call `call` under `limit` until it succeeds, fails with a non-retryable
/// error, or `policy` runs out of attempts. The last error is returned.
pub async fn call_with_retry<T, F, Fut>(
    operation: &str,
    limit: Duration,
    policy: &RetryPolicy,
    mut call: F,
) -> IntakeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = IntakeResult<T>>,
{
    let mut attempt = 1;
    loop {
        match with_timeout(operation, limit, call()).await {
            Ok(value) => return Ok(value),
            Err(err) if policy.should_retry(attempt, &err) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "capability call failed; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
