//! Core orchestrator composing the resilience layer
//!
//! The orchestrator owns no state of its own besides shutdown bookkeeping. It:
//! - Runs the check-tick: lock, check with retry, record, alert through the breaker
//! - Runs the summary-tick, idempotent per calendar date
//! - Drains the deferred queue through the same breaker
//! - Drives log maintenance and health probes
//!
//! Every operation catches domain errors and returns a result value; nothing
//! here panics or propagates an error to the caller.

use std::panic::{self, AssertUnwindSafe};

use crate::error::{panic_message, MonitorError};

mod check_tick;
mod maintenance;
mod orchestrator;
mod status;
mod summary_tick;

pub use check_tick::TickOutcome;
pub use maintenance::MaintenanceOutcome;
pub use orchestrator::{Components, Orchestrator, OrchestratorConfig};
pub use status::StatusReport;
pub use summary_tick::SummaryOutcome;

/// Run a capability call, turning a panic into an error so a misbehaving
/// checker or notifier cannot take down a scheduler loop.
pub(super) fn guarded<T>(
    capability: &str,
    call: impl FnOnce() -> Result<T, MonitorError>,
) -> Result<T, MonitorError> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        tracing::error!(capability, %message, "capability panicked");
        Err(MonitorError::Validation(format!("{capability} panicked: {message}")))
    })
}
