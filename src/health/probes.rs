//! Probes registered by the orchestrator at startup.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::MonitorError;
use crate::models::constants::QUEUE_PRESSURE_THRESHOLD;
use crate::resilience::{CircuitBreaker, CircuitState, DeferredQueue};
use crate::store::StateStore;

/// Core probe: the work directory accepts writes.
pub fn persistence(work_dir: PathBuf) -> impl Fn() -> Result<String, MonitorError> + Send + Sync {
    move || {
        let probe = work_dir.join(".health-probe");
        fs::write(&probe, Utc::now().to_rfc3339())
            .and_then(|_| fs::remove_file(&probe))
            .map_err(|e| MonitorError::persistence(&work_dir.display().to_string(), e))?;
        Ok(format!("{} writable", work_dir.display()))
    }
}

/// Unhealthy while the notifier circuit is open.
pub fn circuit(
    breaker: Arc<CircuitBreaker>,
) -> impl Fn() -> Result<String, MonitorError> + Send + Sync {
    move || {
        let status = breaker.status();
        match status.state {
            CircuitState::Open => Err(MonitorError::CircuitOpen {
                retry_at: status.next_attempt_at.unwrap_or_else(Utc::now),
            }),
            state => Ok(format!("{state}, {} recent failures", status.failure_count)),
        }
    }
}

/// Unhealthy once the deferred queue nears capacity.
pub fn queue(queue: Arc<DeferredQueue>) -> impl Fn() -> Result<String, MonitorError> + Send + Sync {
    move || {
        let depth = queue.len();
        let capacity = queue.capacity();
        let detail = format!("{depth}/{capacity} deferred");
        if capacity > 0 && depth as f64 >= capacity as f64 * QUEUE_PRESSURE_THRESHOLD {
            Err(MonitorError::notify(format!("queue under pressure: {detail}")))
        } else {
            Ok(detail)
        }
    }
}

/// Unhealthy when the last check is older than `max_age` (or never ran after
/// `max_age` of uptime).
pub fn freshness(
    state: Arc<StateStore>,
    max_age: Duration,
) -> impl Fn() -> Result<String, MonitorError> + Send + Sync {
    let started = Utc::now();
    move || {
        let max_age_chrono = chrono::Duration::from_std(max_age)
            .map_err(|e| MonitorError::Validation(format!("freshness window: {e}")))?;
        let now = Utc::now();
        match state.read().last_check_timestamp {
            Some(at) if now - at <= max_age_chrono => {
                Ok(format!("last check {}s ago", (now - at).num_seconds()))
            }
            Some(at) => Err(MonitorError::Timeout(format!(
                "last check at {} is older than {}s",
                at.to_rfc3339(),
                max_age.as_secs()
            ))),
            None if now - started <= max_age_chrono => Ok("no check yet".to_string()),
            None => Err(MonitorError::Timeout(format!(
                "no check completed within {}s of startup",
                max_age.as_secs()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertContext, AvailabilityStatus, CheckOutcome};
    use crate::resilience::{CircuitBreakerConfig, QueueConfig};
    use tempfile::TempDir;

    #[test]
    fn test_persistence_probe() {
        let tmp = TempDir::new().unwrap();
        assert!(persistence(tmp.path().to_path_buf())().is_ok());
        assert!(persistence(tmp.path().join("missing"))().is_err());
    }

    #[test]
    fn test_circuit_probe_follows_state() {
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            cooldown: Duration::from_secs(60),
        }));
        let probe = circuit(Arc::clone(&breaker));
        assert!(probe().is_ok());

        let _ = breaker.execute(|| -> Result<(), MonitorError> { Err(MonitorError::notify("down")) });
        assert!(matches!(probe(), Err(MonitorError::CircuitOpen { .. })));
    }

    #[test]
    fn test_queue_probe_pressure() {
        let q = Arc::new(DeferredQueue::new(QueueConfig {
            max_capacity: 5,
            ..QueueConfig::default()
        }));
        let probe = queue(Arc::clone(&q));
        assert_eq!(probe().unwrap(), "0/5 deferred");

        for _ in 0..4 {
            q.enqueue(AlertContext {
                target: "t".into(),
                previous_status: AvailabilityStatus::Unavailable,
                new_status: AvailabilityStatus::Available,
                observed_at: Utc::now(),
            })
            .unwrap();
        }
        assert!(probe().is_err());
    }

    #[test]
    fn test_freshness_probe() {
        let store = Arc::new(StateStore::in_memory());
        let probe = freshness(Arc::clone(&store), Duration::from_secs(60));
        assert_eq!(probe().unwrap(), "no check yet");

        store.update(|s| s.observed(&CheckOutcome::now(AvailabilityStatus::Available)));
        assert!(probe().is_ok());

        let stale = CheckOutcome {
            status: AvailabilityStatus::Available,
            timestamp: Utc::now() - chrono::Duration::minutes(5),
        };
        store.update(|s| s.observed(&stale));
        assert!(probe().is_err());
    }
}
