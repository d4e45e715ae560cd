//! Capabilities consumed by the orchestrator as black boxes.
//!
//! Implementations classify their own failures into [`MonitorError`] kinds; the
//! resilience layer decides what to do with them.

mod checker;
mod notifier;

pub use checker::HttpChecker;
pub use notifier::{DesktopNotifier, WebhookNotifier};

use crate::error::MonitorError;
use crate::models::{AlertContext, CheckOutcome, DeliveryReceipt, SummaryStats};

/// Observes the availability of a target.
pub trait Checker: Send + Sync {
    fn check(&self, target: &str) -> Result<CheckOutcome, MonitorError>;
}

/// Delivers alerts and daily summaries to an operator.
pub trait Notifier: Send + Sync {
    fn send_alert(&self, context: &AlertContext) -> Result<DeliveryReceipt, MonitorError>;
    fn send_summary(&self, stats: &SummaryStats) -> Result<DeliveryReceipt, MonitorError>;
}
