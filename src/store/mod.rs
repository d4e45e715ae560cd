//! State ownership and on-disk records.

mod check_log;
mod lifecycle;
mod state_store;

pub use check_log::CheckLog;
pub use lifecycle::{LogLifecycleManager, MaintenanceReport, ManagedLog};
pub use state_store::{StateStore, TickGuard};
