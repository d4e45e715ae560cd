//! Failure handling around the check and notification paths.
//!
//! - [`RetryExecutor`] retries transient failures with exponential backoff
//! - [`CircuitBreaker`] stops calling a notifier that keeps failing
//! - [`DeferredQueue`] holds alerts that could not be delivered yet

mod circuit_breaker;
mod deferred_queue;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStatus};
pub use deferred_queue::{
    DeferredQueue, DrainReport, QueueConfig, QueueEntry, QueueFull, QueueStatus,
};
pub use retry::{RetryExecutor, RetryPolicy};
