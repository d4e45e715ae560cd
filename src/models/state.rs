//! Monitoring state and its pure transition functions.
//!
//! The state is only ever replaced through [`crate::store::StateStore::update`],
//! which takes one of the transitions below (or a closure built from them).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::status::{AvailabilityStatus, CheckOutcome};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonitoringState {
    pub last_observed_status: AvailabilityStatus,
    pub last_check_timestamp: Option<DateTime<Utc>>,
    /// Set while a check-tick holds the state lock
    #[serde(default)]
    pub in_progress: bool,
    /// Checks in a row that ended in an error
    pub consecutive_failure_count: u32,
    pub error_count: u64,
    pub last_error_timestamp: Option<DateTime<Utc>>,
    pub daily_summary_sent_for_date: Option<NaiveDate>,
}

impl MonitoringState {
    pub fn with_in_progress(&self, in_progress: bool) -> Self {
        Self {
            in_progress,
            ..self.clone()
        }
    }

    /// Record a successful observation.
    pub fn observed(&self, outcome: &CheckOutcome) -> Self {
        Self {
            last_observed_status: outcome.status,
            last_check_timestamp: Some(outcome.timestamp),
            consecutive_failure_count: 0,
            ..self.clone()
        }
    }

    /// Record a check that failed after all retries. The last observed status is kept.
    pub fn check_failed(&self, at: DateTime<Utc>) -> Self {
        Self {
            last_check_timestamp: Some(at),
            consecutive_failure_count: self.consecutive_failure_count.saturating_add(1),
            error_count: self.error_count.saturating_add(1),
            last_error_timestamp: Some(at),
            ..self.clone()
        }
    }

    /// Record an error outside the check itself (delivery, persistence).
    pub fn error_recorded(&self, at: DateTime<Utc>) -> Self {
        Self {
            error_count: self.error_count.saturating_add(1),
            last_error_timestamp: Some(at),
            ..self.clone()
        }
    }

    pub fn summary_sent(&self, date: NaiveDate) -> Self {
        Self {
            daily_summary_sent_for_date: Some(date),
            ..self.clone()
        }
    }

    pub fn summary_pending_for(&self, date: NaiveDate) -> bool {
        self.daily_summary_sent_for_date != Some(date)
    }

    /// Whether moving from `previous` to `new` warrants an alert.
    ///
    /// Alerts fire only on a transition into `Available`. A previous status of
    /// `Unknown` (first check) is eligible only when `alert_on_first_check` is set.
    pub fn is_alert_eligible(
        previous: AvailabilityStatus,
        new: AvailabilityStatus,
        alert_on_first_check: bool,
    ) -> bool {
        if new != AvailabilityStatus::Available {
            return false;
        }
        match previous {
            AvailabilityStatus::Available => false,
            AvailabilityStatus::Unavailable => true,
            AvailabilityStatus::Unknown => alert_on_first_check,
        }
    }
}
