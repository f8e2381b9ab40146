//! Bounded retry with exponential backoff.
//!
//! Wraps delivery with the guaranteed-delivery discipline: retryable
//! failures are attempted again after a growing delay, permanent failures
//! and exhausted budgets surface as [`EngineError::Delivery`] so the
//! caller can dead-letter the message.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tapline_types::api::RetryPolicy;
use tapline_types::error::{EngineError, Result};

/// Backoff never sleeps longer than this, regardless of attempt count.
const MAX_DELAY: Duration = Duration::from_millis(30_000);

#[derive(Debug, Clone, Copy)]
pub struct RetryHandler {
    /// Attempts after the first.
    max_retries: u32,
    base_delay: Duration,
    exponential: bool,
}

impl RetryHandler {
    #[must_use]
    pub fn new(max_retries: u32, base_delay: Duration, exponential: bool) -> Self {
        Self { max_retries, base_delay, exponential }
    }

    #[must_use]
    pub fn from_policy(policy: &RetryPolicy) -> Self {
        Self::new(
            policy.max_retries,
            Duration::from_millis(policy.base_delay_ms),
            policy.exponential_backoff,
        )
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retrying after failed attempt `attempt` (0-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return self.base_delay.min(MAX_DELAY);
        }
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(MAX_DELAY, |d| d.min(MAX_DELAY))
    }

    /// Run `op` until it succeeds, fails permanently, or the attempt
    /// budget is spent.
    ///
    /// # Errors
    ///
    /// [`EngineError::Delivery`] wrapping the last attempt's error, or
    /// [`EngineError::Cancelled`] when cancellation fires during a
    /// backoff sleep.
    pub async fn execute<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled("delivery cancelled".to_string()));
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let attempts = attempt + 1;
                    if !e.is_retryable() || attempts >= self.max_attempts() {
                        if e.is_retryable() {
                            tracing::warn!(attempts, error = %e, "Retry budget exhausted");
                        } else {
                            tracing::warn!(attempts, error = %e, "Permanent failure, not retrying");
                        }
                        return Err(EngineError::Delivery { attempts, last_error: Box::new(e) });
                    }

                    let delay = self.delay_for(attempt);
                    tracing::info!(
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, backing off"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => {
                            return Err(EngineError::Cancelled(
                                "delivery cancelled during backoff".to_string(),
                            ));
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt = attempts;
                }
            }
        }
    }
}

impl Default for RetryHandler {
    fn default() -> Self {
        Self::from_policy(&RetryPolicy::default())
    }
}
