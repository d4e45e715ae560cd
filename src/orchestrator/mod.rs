pub mod core;
pub mod scheduler;

pub use core::{
    Components, MaintenanceOutcome, Orchestrator, OrchestratorConfig, StatusReport,
    SummaryOutcome, TickOutcome,
};
pub use scheduler::{Runtime, ShutdownSignal};
