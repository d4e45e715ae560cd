//! Check-tick: lock, observe, record, alert.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{guarded, Orchestrator};
use crate::error::{MonitorError, TickError};
use crate::models::{AlertContext, AvailabilityStatus, CheckRecord, MonitoringState};

/// Result of one check-tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickOutcome {
    /// The tick did not run (lock timeout or shutdown)
    pub skipped: bool,
    /// The checker produced an observation
    pub success: bool,
    pub previous_status: Option<AvailabilityStatus>,
    pub observed_status: Option<AvailabilityStatus>,
    pub alert_sent: bool,
    /// An eligible alert was not delivered now and went to the deferred queue
    pub was_blocked: bool,
    pub errors: Vec<TickError>,
}

impl TickOutcome {
    fn skipped(err: Option<&MonitorError>) -> Self {
        Self {
            skipped: true,
            errors: err.map(TickError::from).into_iter().collect(),
            ..Self::default()
        }
    }
}

impl Orchestrator {
    /// Run one check-tick.
    ///
    /// 1. Take the state lock (bounded); on timeout count a soft failure and
    ///    return a skipped outcome
    /// 2. Read the previous status
    /// 3. Run the checker through the retry executor
    /// 4. Update state and append the check record
    /// 5. Decide alert eligibility
    /// 6. Deliver through the circuit breaker, deferring on any failure
    /// 7. Release the lock (guard drop) and return the outcome
    pub fn check_tick(&self) -> TickOutcome {
        let Some(_in_flight) = self.begin("check-tick") else {
            return TickOutcome::skipped(None);
        };

        let guard = match self.state.acquire_lock(self.config.lock_timeout) {
            Ok(guard) => guard,
            Err(err) => {
                let skipped_ticks = self.state.record_skipped_tick();
                tracing::warn!(
                    category = %err.kind(),
                    error = %err,
                    skipped_ticks,
                    "check-tick skipped"
                );
                self.write_status_snapshot();
                return TickOutcome::skipped(Some(&err));
            }
        };

        let previous = self.state.read().last_observed_status;
        let mut outcome = TickOutcome {
            previous_status: Some(previous),
            ..TickOutcome::default()
        };

        let target = self.config.target.as_str();
        let checked = self
            .retry
            .execute("check", &self.config.check_retry, |_attempt| {
                guarded("checker", || self.checker.check(target))
            });

        match checked {
            Ok(observation) => {
                self.state.update(|s| s.observed(&observation));
                self.record(CheckRecord::observed(&observation), &mut outcome);
                outcome.success = true;
                outcome.observed_status = Some(observation.status);

                tracing::info!(
                    resource = %target,
                    previous = %previous,
                    status = %observation.status,
                    "check complete"
                );

                if MonitoringState::is_alert_eligible(
                    previous,
                    observation.status,
                    self.config.alert_on_first_check,
                ) {
                    let context = AlertContext {
                        target: target.to_string(),
                        previous_status: previous,
                        new_status: observation.status,
                        observed_at: observation.timestamp,
                    };
                    self.deliver_alert(context, &mut outcome);
                }
            }
            Err(err) => {
                let now = Utc::now();
                let state = self.state.update(|s| s.check_failed(now));
                tracing::error!(
                    resource = %target,
                    category = %err.kind(),
                    attempts = err.attempts().unwrap_or(1),
                    consecutive_failures = state.consecutive_failure_count,
                    error = %err,
                    "check failed"
                );
                self.record(CheckRecord::failed(now, &err), &mut outcome);
                outcome.errors.push(TickError::from(&err));
            }
        }

        drop(guard);
        self.write_status_snapshot();
        outcome
    }

    fn record(&self, record: CheckRecord, outcome: &mut TickOutcome) {
        if let Err(err) = self.check_log.append(record) {
            // Buffered by the check log; surfaced in the outcome only
            outcome.errors.push(TickError::from(&err));
        }
    }

    /// Send `context` through the breaker; anything short of delivery defers it.
    fn deliver_alert(&self, context: AlertContext, outcome: &mut TickOutcome) {
        let sent = self
            .breaker
            .execute(|| guarded("notifier", || self.notifier.send_alert(&context)));

        let err = match sent {
            Ok(receipt) => {
                outcome.alert_sent = true;
                tracing::info!(
                    resource = %context.target,
                    message_id = %receipt.message_id,
                    "alert delivered"
                );
                return;
            }
            Err(err) => err,
        };

        outcome.was_blocked = true;
        outcome.errors.push(TickError::from(&err));
        if !matches!(err, MonitorError::CircuitOpen { .. }) {
            self.state.update(|s| s.error_recorded(Utc::now()));
        }
        tracing::warn!(
            resource = %context.target,
            category = %err.kind(),
            error = %err,
            "alert not delivered, deferring"
        );

        if let Err(full) = self.queue.enqueue(context) {
            outcome
                .errors
                .push(TickError::from(&MonitorError::notify(full.to_string())));
        }
    }
}
