//! Orchestrator composition and shutdown accounting

use chrono::NaiveTime;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::capability::{Checker, Notifier};
use crate::health::{probes, Criticality, HealthAggregator};
use crate::models::constants::{
    DEFAULT_LOCK_TIMEOUT, DEFAULT_PROBE_TIMEOUT, DEFAULT_RETENTION_DAYS, DEFAULT_SHUTDOWN_GRACE,
    STALE_CHECK_FACTOR,
};
use crate::resilience::{CircuitBreaker, DeferredQueue, RetryExecutor, RetryPolicy};
use crate::store::{CheckLog, LogLifecycleManager, StateStore};

/// Resolved settings for the orchestrator and its scheduler loops
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub target: String,
    pub check_retry: RetryPolicy,
    pub lock_timeout: Duration,
    pub alert_on_first_check: bool,
    pub shutdown_grace: Duration,
    pub min_interval: Duration,
    pub max_interval: Duration,
    /// Local time of day after which the daily summary becomes due
    pub summary_time: NaiveTime,
    pub queue_drain_interval: Duration,
    pub maintenance_interval: Duration,
    pub probe_timeout: Duration,
    pub retention_days: u32,
}

impl OrchestratorConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            check_retry: RetryPolicy::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            alert_on_first_check: true,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            min_interval: Duration::from_secs(300),
            max_interval: Duration::from_secs(600),
            summary_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap_or(NaiveTime::MIN),
            queue_drain_interval: Duration::from_secs(60),
            maintenance_interval: Duration::from_secs(24 * 60 * 60),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }

    /// A check older than this is considered stale by the freshness probe.
    pub fn freshness_window(&self) -> Duration {
        self.max_interval.saturating_mul(STALE_CHECK_FACTOR)
    }
}

/// Collaborators handed to [`Orchestrator::new`], constructed at startup.
pub struct Components {
    pub state: Arc<StateStore>,
    pub checker: Arc<dyn Checker>,
    pub notifier: Arc<dyn Notifier>,
    pub breaker: Arc<CircuitBreaker>,
    pub queue: Arc<DeferredQueue>,
    pub check_log: Arc<CheckLog>,
    pub health: Arc<HealthAggregator>,
    pub lifecycle: Arc<LogLifecycleManager>,
}

/// Composes the resilience components into the check and summary state machines.
///
/// Shared by the scheduler loops through an `Arc`; every operation takes `&self`.
pub struct Orchestrator {
    pub(super) config: OrchestratorConfig,
    pub(super) state: Arc<StateStore>,
    pub(super) checker: Arc<dyn Checker>,
    pub(super) notifier: Arc<dyn Notifier>,
    pub(super) breaker: Arc<CircuitBreaker>,
    pub(super) queue: Arc<DeferredQueue>,
    pub(super) check_log: Arc<CheckLog>,
    pub(super) health: Arc<HealthAggregator>,
    pub(super) lifecycle: Arc<LogLifecycleManager>,
    pub(super) retry: RetryExecutor,
    pub(super) status_path: Option<PathBuf>,
    /// Serializes summary-ticks against each other
    pub(super) summary_lock: Mutex<()>,
    accepting: AtomicBool,
    in_flight: Mutex<usize>,
    idle: Condvar,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("target", &self.config.target)
            .field("accepting", &self.accepting.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Counts a running operation until dropped.
pub(super) struct InFlight<'a> {
    orchestrator: &'a Orchestrator,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut count = self.orchestrator.lock_in_flight();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.orchestrator.idle.notify_all();
        }
    }
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, components: Components) -> Self {
        Self {
            config,
            state: components.state,
            checker: components.checker,
            notifier: components.notifier,
            breaker: components.breaker,
            queue: components.queue,
            check_log: components.check_log,
            health: components.health,
            lifecycle: components.lifecycle,
            retry: RetryExecutor::new(),
            status_path: None,
            summary_lock: Mutex::new(()),
            accepting: AtomicBool::new(true),
            in_flight: Mutex::new(0),
            idle: Condvar::new(),
        }
    }

    /// Replace the retry executor (tests inject one that does not sleep).
    pub fn with_retry_executor(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    /// Write a status snapshot to `path` after every tick and maintenance pass.
    pub fn with_status_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.status_path = Some(path.into());
        self
    }

    /// Register the probes every deployment has: work-dir persistence (core),
    /// circuit state, queue pressure and check freshness.
    pub fn register_builtin_probes(&self, work_dir: &Path) {
        self.health.register_check(
            "persistence",
            Criticality::Core,
            probes::persistence(work_dir.to_path_buf()),
        );
        self.health.register_check(
            "circuit-breaker",
            Criticality::NonCore,
            probes::circuit(Arc::clone(&self.breaker)),
        );
        self.health.register_check(
            "deferred-queue",
            Criticality::NonCore,
            probes::queue(Arc::clone(&self.queue)),
        );
        self.health.register_check(
            "check-freshness",
            Criticality::NonCore,
            probes::freshness(Arc::clone(&self.state), self.config.freshness_window()),
        );
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn state(&self) -> &Arc<StateStore> {
        &self.state
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn queue(&self) -> &Arc<DeferredQueue> {
        &self.queue
    }

    pub fn check_log(&self) -> &Arc<CheckLog> {
        &self.check_log
    }

    pub fn health(&self) -> &Arc<HealthAggregator> {
        &self.health
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, usize> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a starting operation, or `None` once shutdown has begun.
    pub(super) fn begin(&self, operation: &str) -> Option<InFlight<'_>> {
        let mut count = self.lock_in_flight();
        if !self.accepting.load(Ordering::Acquire) {
            tracing::debug!(operation, "shutting down, operation refused");
            return None;
        }
        *count += 1;
        Some(InFlight { orchestrator: self })
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn in_flight(&self) -> usize {
        *self.lock_in_flight()
    }

    /// Refuse new operations, then wait up to `grace` for running ones.
    ///
    /// Returns `true` if nothing was left running when it returned.
    pub fn shutdown(&self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        let mut count = self.lock_in_flight();
        self.accepting.store(false, Ordering::Release);
        tracing::info!(in_flight = *count, grace_ms = grace.as_millis() as u64, "shutting down");

        while *count > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::error!(in_flight = *count, "grace period elapsed with work in flight");
                return false;
            }
            let (guard, _) = self
                .idle
                .wait_timeout(count, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            count = guard;
        }
        tracing::info!("shutdown complete");
        true
    }
}
