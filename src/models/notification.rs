//! Alert and summary payloads handed to notifiers

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::status::AvailabilityStatus;

/// Payload of an availability alert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertContext {
    pub target: String,
    pub previous_status: AvailabilityStatus,
    pub new_status: AvailabilityStatus,
    pub observed_at: DateTime<Utc>,
}

impl AlertContext {
    pub fn subject(&self) -> String {
        format!("{} is now {}", self.target, self.new_status)
    }

    pub fn body(&self) -> String {
        format!(
            "{} changed from {} to {} at {}",
            self.target,
            self.previous_status,
            self.new_status,
            self.observed_at.to_rfc3339()
        )
    }
}

/// Daily statistics sent by the summary-tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryStats {
    pub target: String,
    pub date: NaiveDate,
    pub total_checks: usize,
    pub available_checks: usize,
    pub unavailable_checks: usize,
    pub failed_checks: usize,
    pub last_status: AvailabilityStatus,
    pub last_check_at: Option<DateTime<Utc>>,
    pub pending_alerts: usize,
}

impl SummaryStats {
    pub fn subject(&self) -> String {
        format!("Daily summary for {} ({})", self.target, self.date)
    }

    pub fn body(&self) -> String {
        format!(
            "{} checks: {} available, {} unavailable, {} failed. Last status: {}. Pending alerts: {}.",
            self.total_checks,
            self.available_checks,
            self.unavailable_checks,
            self.failed_checks,
            self.last_status,
            self.pending_alerts
        )
    }
}

/// Acknowledgement returned by a notifier after delivery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub message_id: String,
}
