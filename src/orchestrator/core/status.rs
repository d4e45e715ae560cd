//! Operational status report and its on-disk snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::Orchestrator;
use crate::error::MonitorError;
use crate::fs::{read_json, write_json};
use crate::health::HealthReport;
use crate::models::MonitoringState;
use crate::resilience::{CircuitStatus, QueueStatus};

/// Combined operational view for the `status` command and external tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub target: String,
    pub state: MonitoringState,
    pub circuit: CircuitStatus,
    pub queue: QueueStatus,
    /// Last health report; `None` until the first maintenance pass
    pub health: Option<HealthReport>,
    pub state_persist_failures: u64,
    /// Check-ticks skipped because the state lock was busy
    #[serde(default)]
    pub skipped_ticks: u64,
    pub buffered_check_records: usize,
}

impl StatusReport {
    /// Last snapshot written by a running instance, if any.
    pub fn load(path: &Path) -> Result<Option<Self>, MonitorError> {
        read_json(path)
    }
}

impl Orchestrator {
    pub fn status(&self) -> StatusReport {
        StatusReport {
            generated_at: Utc::now(),
            target: self.config.target.clone(),
            state: self.state.read(),
            circuit: self.breaker.status(),
            queue: self.queue.status(),
            health: self.health.last_report(),
            state_persist_failures: self.state.persist_failures(),
            skipped_ticks: self.state.skipped_ticks(),
            buffered_check_records: self.check_log.pending_len(),
        }
    }

    pub(super) fn write_status_snapshot(&self) {
        let Some(path) = &self.status_path else {
            return;
        };
        if let Err(err) = write_json(path, &self.status()) {
            tracing::warn!(category = %err.kind(), error = %err, "failed to write status snapshot");
        }
    }
}
