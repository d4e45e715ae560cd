//! Bounded retries with exponential backoff.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::MonitorError;
use crate::models::constants::{
    DEFAULT_CHECK_ATTEMPTS, DEFAULT_CHECK_BASE_DELAY, DEFAULT_CHECK_MAX_DELAY,
};

/// How many times to attempt an operation and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_CHECK_ATTEMPTS,
            base_delay: DEFAULT_CHECK_BASE_DELAY,
            max_delay: DEFAULT_CHECK_MAX_DELAY,
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.max_attempts == 0 {
            return Err(MonitorError::Validation(
                "retry policy needs at least one attempt".into(),
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(MonitorError::Validation(format!(
                "retry base delay {:?} exceeds max delay {:?}",
                self.base_delay, self.max_delay
            )));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(MonitorError::Validation(format!(
                "retry backoff factor must be >= 1, got {}",
                self.backoff_factor
            )));
        }
        Ok(())
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// Formula: min(base_delay * backoff_factor^(attempt-1), max_delay)
    ///
    /// With base=2s, factor=2, max=8s:
    /// - Attempt 1: 2s
    /// - Attempt 2: 4s
    /// - Attempt 3+: 8s (capped)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let multiplier = self.backoff_factor.powi(exponent);
        let delay_secs = self.base_delay.as_secs_f64() * multiplier;

        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs)
    }
}

type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

/// Runs an operation until it succeeds, hits a fatal error, or runs out of attempts.
#[derive(Clone)]
pub struct RetryExecutor {
    sleeper: Sleeper,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor").finish_non_exhaustive()
    }
}

impl RetryExecutor {
    pub fn new() -> Self {
        Self {
            sleeper: Arc::new(thread::sleep),
        }
    }

    /// Use a custom sleep function, e.g. to record delays in tests.
    pub fn with_sleeper(sleeper: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        Self {
            sleeper: Arc::new(sleeper),
        }
    }

    /// Invoke `operation` according to `policy`.
    ///
    /// The closure receives the 1-based attempt number. Fatal errors are returned
    /// as-is without further attempts; a retryable error on the final attempt is
    /// wrapped in [`MonitorError::RetriesExhausted`].
    pub fn execute<T, F>(
        &self,
        context: &str,
        policy: &RetryPolicy,
        mut operation: F,
    ) -> Result<T, MonitorError>
    where
        F: FnMut(u32) -> Result<T, MonitorError>,
    {
        policy.validate()?;

        let mut attempt = 1;
        loop {
            match operation(attempt) {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(context, attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => {
                    tracing::error!(
                        context,
                        attempt,
                        category = %err.kind(),
                        error = %err,
                        "fatal error, not retrying"
                    );
                    return Err(err);
                }
                Err(err) if attempt >= policy.max_attempts => {
                    tracing::error!(
                        context,
                        attempt,
                        category = %err.kind(),
                        error = %err,
                        "attempts exhausted"
                    );
                    return Err(MonitorError::RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        context,
                        attempt,
                        max_attempts = policy.max_attempts,
                        category = %err.kind(),
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "attempt failed, backing off"
                    );
                    (self.sleeper)(delay);
                    attempt += 1;
                }
            }
        }
    }
}
