//! Circuit breaker guarding the notifier.
//!
//! States:
//! - Closed: calls pass through, failures are counted
//! - Open: calls are rejected without reaching the notifier
//! - HalfOpen: a single probe call decides between Closed and Open again

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::MonitorError;
use crate::models::constants::{DEFAULT_CIRCUIT_COOLDOWN, DEFAULT_CIRCUIT_THRESHOLD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_CIRCUIT_THRESHOLD,
            cooldown: DEFAULT_CIRCUIT_COOLDOWN,
        }
    }
}

/// Snapshot exposed to the status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitStatus {
    pub state: CircuitState,
    pub failure_count: u32,
    pub opened_at: Option<DateTime<Utc>>,
    /// When the next call will be let through; `None` unless the circuit is open
    pub next_attempt_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    opened_at_wall: Option<DateTime<Utc>>,
    probe_in_flight: bool,
}

impl Inner {
    fn closed() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            opened_at: None,
            opened_at_wall: None,
            probe_in_flight: false,
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.opened_at_wall = Some(Utc::now());
        self.probe_in_flight = false;
    }

    fn cooldown_elapsed(&self, cooldown: Duration) -> bool {
        self.opened_at
            .map(|at| at.elapsed() >= cooldown)
            .unwrap_or(true)
    }

    fn retry_at(&self, cooldown: Duration) -> DateTime<Utc> {
        let remaining = self
            .opened_at
            .map(|at| cooldown.saturating_sub(at.elapsed()))
            .unwrap_or(Duration::ZERO);
        Utc::now() + chrono::Duration::from_std(remaining).unwrap_or(chrono::Duration::zero())
    }
}

/// What a caller is allowed to do after asking the breaker for permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permit {
    Pass,
    Probe,
}

/// Fail-fast guard in front of a flaky dependency.
///
/// All transitions happen under one mutex; the guarded call itself runs
/// outside it so a slow notifier never blocks `status()`.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::closed()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `operation` if the circuit allows it.
    ///
    /// Returns [`MonitorError::CircuitOpen`] without calling `operation` while the
    /// circuit is open (or while a half-open probe is already in flight). The
    /// operation's own error is propagated and counted as a failure.
    pub fn execute<T, F>(&self, operation: F) -> Result<T, MonitorError>
    where
        F: FnOnce() -> Result<T, MonitorError>,
    {
        let permit = self.acquire_permit()?;

        match operation() {
            Ok(value) => {
                self.record_success(permit);
                Ok(value)
            }
            Err(err) => {
                self.record_failure(permit, &err);
                Err(err)
            }
        }
    }

    fn acquire_permit(&self) -> Result<Permit, MonitorError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit::Pass),
            CircuitState::Open => {
                if inner.cooldown_elapsed(self.config.cooldown) {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    tracing::info!("circuit breaker half-open, allowing probe call");
                    Ok(Permit::Probe)
                } else {
                    let retry_at = inner.retry_at(self.config.cooldown);
                    tracing::debug!(%retry_at, "circuit breaker open, rejecting call");
                    Err(MonitorError::CircuitOpen { retry_at })
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(MonitorError::CircuitOpen {
                        retry_at: Utc::now(),
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(Permit::Probe)
                }
            }
        }
    }

    fn record_success(&self, permit: Permit) {
        let mut inner = self.lock();
        match permit {
            Permit::Probe => {
                *inner = Inner::closed();
                tracing::info!("circuit breaker closed after successful probe");
            }
            Permit::Pass => {
                if inner.state == CircuitState::Closed {
                    inner.failure_count = 0;
                }
            }
        }
    }

    fn record_failure(&self, permit: Permit, err: &MonitorError) {
        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);

        match permit {
            Permit::Probe => {
                inner.open();
                tracing::warn!(
                    failure_count = inner.failure_count,
                    category = %err.kind(),
                    error = %err,
                    "circuit breaker reopened after failed probe"
                );
            }
            Permit::Pass => {
                if inner.state == CircuitState::Closed
                    && inner.failure_count >= self.config.failure_threshold
                {
                    inner.open();
                    tracing::warn!(
                        failure_count = inner.failure_count,
                        threshold = self.config.failure_threshold,
                        cooldown_secs = self.config.cooldown.as_secs(),
                        category = %err.kind(),
                        error = %err,
                        "circuit breaker opened"
                    );
                } else {
                    tracing::debug!(
                        failure_count = inner.failure_count,
                        threshold = self.config.failure_threshold,
                        "circuit breaker recorded failure"
                    );
                }
            }
        }
    }

    pub fn status(&self) -> CircuitStatus {
        let inner = self.lock();
        let next_attempt_at = match inner.state {
            CircuitState::Open => Some(inner.retry_at(self.config.cooldown)),
            _ => None,
        };
        CircuitStatus {
            state: inner.state,
            failure_count: inner.failure_count,
            opened_at: inner.opened_at_wall,
            next_attempt_at,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Force the circuit closed, e.g. after an operator fixed the notifier.
    pub fn reset(&self) {
        *self.lock() = Inner::closed();
        tracing::info!("circuit breaker reset to closed");
    }
}
