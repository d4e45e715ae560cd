//! Error taxonomy shared by every component.
//!
//! Each error carries an [`ErrorKind`] that doubles as the log category and the
//! classification used by retry and queue logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Category of a [`MonitorError`].
///
/// Handling strategy differs per kind:
/// - Transient failures (Network, Timeout) are retried with backoff
/// - Validation failures abort immediately
/// - Notify failures go through the circuit breaker and deferred queue
/// - LockTimeout skips the tick
/// - Persistence failures are logged and buffered
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Validation,
    Network,
    Timeout,
    Notify,
    CircuitOpen,
    LockTimeout,
    Persistence,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Notify => "notify",
            ErrorKind::CircuitOpen => "circuit-open",
            ErrorKind::LockTimeout => "lock-timeout",
            ErrorKind::Persistence => "persistence",
        };
        f.write_str(label)
    }
}

/// Domain error raised by the monitoring core and its capabilities.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MonitorError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("timed out: {0}")]
    Timeout(String),

    /// Delivery failure reported by a notifier. `permanent` failures are never retried.
    #[error("notification failed: {message}")]
    Notify { message: String, permanent: bool },

    #[error("circuit open, next attempt allowed at {retry_at}")]
    CircuitOpen { retry_at: DateTime<Utc> },

    #[error("state lock not acquired within {0:?}")]
    LockTimeout(Duration),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("{source} (gave up after {attempts} attempts)")]
    RetriesExhausted {
        attempts: u32,
        source: Box<MonitorError>,
    },
}

impl MonitorError {
    pub fn notify(message: impl Into<String>) -> Self {
        MonitorError::Notify {
            message: message.into(),
            permanent: false,
        }
    }

    pub fn notify_permanent(message: impl Into<String>) -> Self {
        MonitorError::Notify {
            message: message.into(),
            permanent: true,
        }
    }

    pub fn persistence(context: &str, err: impl fmt::Display) -> Self {
        MonitorError::Persistence(format!("{context}: {err}"))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MonitorError::Validation(_) => ErrorKind::Validation,
            MonitorError::Network(_) => ErrorKind::Network,
            MonitorError::Timeout(_) => ErrorKind::Timeout,
            MonitorError::Notify { .. } => ErrorKind::Notify,
            MonitorError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            MonitorError::LockTimeout(_) => ErrorKind::LockTimeout,
            MonitorError::Persistence(_) => ErrorKind::Persistence,
            MonitorError::RetriesExhausted { source, .. } => source.kind(),
        }
    }

    /// Whether another attempt of the same operation could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            MonitorError::Network(_) | MonitorError::Timeout(_) => true,
            MonitorError::Notify { permanent, .. } => !permanent,
            _ => false,
        }
    }

    /// Whether the failure should remove a queued notification for good.
    pub fn is_permanent(&self) -> bool {
        match self {
            MonitorError::Validation(_) => true,
            MonitorError::Notify { permanent, .. } => *permanent,
            MonitorError::RetriesExhausted { source, .. } => source.is_permanent(),
            _ => false,
        }
    }

    /// Attempts consumed before this error surfaced, if it came from a retry loop.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            MonitorError::RetriesExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

/// Text of a panic payload caught with `catch_unwind`.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Serializable error entry attached to tick results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&MonitorError> for TickError {
    fn from(err: &MonitorError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<MonitorError> for TickError {
    fn from(err: MonitorError) -> Self {
        TickError::from(&err)
    }
}
