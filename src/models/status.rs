//! Availability observations and check records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::MonitorError;

/// Last known availability of the watched resource.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AvailabilityStatus {
    /// No successful observation yet (or the last check errored)
    #[default]
    Unknown,
    Unavailable,
    Available,
}

impl fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvailabilityStatus::Unknown => write!(f, "unknown"),
            AvailabilityStatus::Unavailable => write!(f, "unavailable"),
            AvailabilityStatus::Available => write!(f, "available"),
        }
    }
}

/// Result returned by a [`crate::capability::Checker`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckOutcome {
    pub status: AvailabilityStatus,
    pub timestamp: DateTime<Utc>,
}

impl CheckOutcome {
    pub fn now(status: AvailabilityStatus) -> Self {
        Self {
            status,
            timestamp: Utc::now(),
        }
    }
}

/// One entry of the append-only check log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckRecord {
    pub timestamp: DateTime<Utc>,
    pub status: AvailabilityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckRecord {
    pub fn observed(outcome: &CheckOutcome) -> Self {
        Self {
            timestamp: outcome.timestamp,
            status: outcome.status,
            error: None,
        }
    }

    pub fn failed(timestamp: DateTime<Utc>, err: &MonitorError) -> Self {
        Self {
            timestamp,
            status: AvailabilityStatus::Unknown,
            error: Some(err.to_string()),
        }
    }
}
