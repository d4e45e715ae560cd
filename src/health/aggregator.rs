//! Runs registered probes concurrently and folds them into one report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{panic_message, MonitorError};

/// A single health check. Returns a short detail string when healthy.
pub trait HealthProbe: Send + Sync {
    fn check(&self) -> Result<String, MonitorError>;
}

impl<F> HealthProbe for F
where
    F: Fn() -> Result<String, MonitorError> + Send + Sync,
{
    fn check(&self) -> Result<String, MonitorError> {
        self()
    }
}

/// Whether a failing probe makes the whole system unhealthy or only degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Criticality {
    Core,
    NonCore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for OverallHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallHealth::Healthy => write!(f, "healthy"),
            OverallHealth::Degraded => write!(f, "degraded"),
            OverallHealth::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub status: ProbeStatus,
    pub detail: String,
    pub duration_ms: u64,
    pub criticality: Criticality,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub checked_at: DateTime<Utc>,
    pub overall: OverallHealth,
    pub probes: BTreeMap<String, ProbeResult>,
}

impl HealthReport {
    pub fn from_probes(probes: BTreeMap<String, ProbeResult>) -> Self {
        Self {
            checked_at: Utc::now(),
            overall: overall_status(probes.values()),
            probes,
        }
    }
}

/// Healthy iff every probe passes; unhealthy if any core probe fails;
/// degraded otherwise.
pub fn overall_status<'a>(results: impl IntoIterator<Item = &'a ProbeResult>) -> OverallHealth {
    let mut overall = OverallHealth::Healthy;
    for result in results {
        if result.status == ProbeStatus::Healthy {
            continue;
        }
        match result.criticality {
            Criticality::Core => return OverallHealth::Unhealthy,
            Criticality::NonCore => overall = OverallHealth::Degraded,
        }
    }
    overall
}

struct Registered {
    name: String,
    criticality: Criticality,
    probe: Arc<dyn HealthProbe>,
}

#[derive(Default)]
pub struct HealthAggregator {
    probes: RwLock<Vec<Registered>>,
    last_report: Mutex<Option<HealthReport>>,
}

impl std::fmt::Debug for HealthAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthAggregator")
            .field("probes", &self.probe_names())
            .finish()
    }
}

impl HealthAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a probe under `name`, replacing any probe with the same name.
    pub fn register_check(
        &self,
        name: impl Into<String>,
        criticality: Criticality,
        probe: impl HealthProbe + 'static,
    ) {
        let name = name.into();
        let mut probes = self.probes.write().unwrap_or_else(PoisonError::into_inner);
        probes.retain(|p| p.name != name);
        probes.push(Registered {
            name,
            criticality,
            probe: Arc::new(probe),
        });
    }

    pub fn probe_names(&self) -> Vec<String> {
        self.probes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|p| p.name.clone())
            .collect()
    }

    /// Run every probe on its own thread, each bounded by `per_probe_timeout`.
    ///
    /// A probe that errors, panics, or misses the deadline is reported unhealthy
    /// with the captured reason. A timed-out probe thread is left to finish on
    /// its own; its late result is discarded.
    pub fn run_checks(&self, per_probe_timeout: Duration) -> HealthReport {
        let probes: Vec<(String, Criticality, Arc<dyn HealthProbe>)> = self
            .probes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|p| (p.name.clone(), p.criticality, Arc::clone(&p.probe)))
            .collect();

        let (tx, rx) = mpsc::channel();
        let started = Instant::now();

        for (index, (name, _, probe)) in probes.iter().enumerate() {
            let tx = tx.clone();
            let probe = Arc::clone(probe);
            let spawned = thread::Builder::new()
                .name(format!("probe-{name}"))
                .spawn(move || {
                    let begin = Instant::now();
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| probe.check()))
                        .unwrap_or_else(|payload| Err(panic_error(payload)));
                    let _ = tx.send((index, outcome, begin.elapsed()));
                });
            if let Err(e) = spawned {
                tracing::error!(probe = %name, error = %e, "failed to spawn probe thread");
            }
        }
        drop(tx);

        let mut outcomes: Vec<Option<(Result<String, MonitorError>, Duration)>> =
            vec![None; probes.len()];
        let deadline = started + per_probe_timeout;
        let mut pending = probes.len();

        while pending > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((index, outcome, elapsed)) => {
                    outcomes[index] = Some((outcome, elapsed));
                    pending -= 1;
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let mut results = BTreeMap::new();
        for ((name, criticality, _), outcome) in probes.into_iter().zip(outcomes) {
            let result = match outcome {
                Some((Ok(detail), elapsed)) => ProbeResult {
                    status: ProbeStatus::Healthy,
                    detail,
                    duration_ms: elapsed.as_millis() as u64,
                    criticality,
                },
                Some((Err(err), elapsed)) => ProbeResult {
                    status: ProbeStatus::Unhealthy,
                    detail: err.to_string(),
                    duration_ms: elapsed.as_millis() as u64,
                    criticality,
                },
                None => ProbeResult {
                    status: ProbeStatus::Unhealthy,
                    detail: format!("probe timed out after {}ms", per_probe_timeout.as_millis()),
                    duration_ms: per_probe_timeout.as_millis() as u64,
                    criticality,
                },
            };

            if result.status == ProbeStatus::Unhealthy {
                tracing::warn!(
                    probe = %name,
                    criticality = ?criticality,
                    detail = %result.detail,
                    "health probe failed"
                );
            }
            results.insert(name, result);
        }

        let report = HealthReport::from_probes(results);
        tracing::info!(
            overall = %report.overall,
            probes = report.probes.len(),
            "health checks complete"
        );
        *self.last_report.lock().unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
        report
    }

    /// Report from the most recent [`run_checks`](Self::run_checks), if any.
    pub fn last_report(&self) -> Option<HealthReport> {
        self.last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn panic_error(payload: Box<dyn std::any::Any + Send>) -> MonitorError {
    MonitorError::Validation(format!("probe panicked: {}", panic_message(payload.as_ref())))
}
