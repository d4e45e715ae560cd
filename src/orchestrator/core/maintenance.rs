//! Deferred queue drain and the periodic maintenance pass

use serde::{Deserialize, Serialize};

use super::Orchestrator;
use crate::health::HealthReport;
use crate::resilience::DrainReport;
use crate::store::MaintenanceReport;

/// Result of one maintenance pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceOutcome {
    pub logs: MaintenanceReport,
    pub health: HealthReport,
}

impl Orchestrator {
    /// One pass over the deferred queue, delivering through the circuit breaker.
    ///
    /// An open circuit pauses the pass without charging any entry an attempt.
    pub fn drain_queue(&self) -> DrainReport {
        let Some(_in_flight) = self.begin("queue-drain") else {
            return DrainReport::default();
        };

        let report = self.queue.process_due(|context| {
            self.breaker
                .execute(|| super::guarded("notifier", || self.notifier.send_alert(context)))
        });

        if report.attempted > 0 || report.deferred > 0 {
            tracing::info!(
                attempted = report.attempted,
                delivered = report.delivered,
                rescheduled = report.rescheduled,
                dropped = report.dropped,
                deferred = report.deferred,
                remaining = self.queue.len(),
                "deferred queue pass complete"
            );
            self.write_status_snapshot();
        }
        report
    }

    /// Rotate and prune logs, then run every health probe.
    pub fn run_maintenance(&self) -> Option<MaintenanceOutcome> {
        let _in_flight = self.begin("maintenance")?;

        let logs = self.lifecycle.run_maintenance(self.config.retention_days);
        for error in &logs.errors {
            tracing::warn!(%error, "log maintenance step failed");
        }
        let health = self.health.run_checks(self.config.probe_timeout);

        tracing::info!(
            rotated = logs.rotated.len(),
            removed = logs.removed.len(),
            overall = %health.overall,
            "maintenance pass complete"
        );
        self.write_status_snapshot();
        Some(MaintenanceOutcome { logs, health })
    }
}
