//! Maintain command - log rotation, retention and a health pass

use anyhow::{bail, Result};
use colored::Colorize;
use std::sync::Arc;

use super::common::build_orchestrator;
use super::status::{health_label, probe_label};
use crate::config::AppConfig;
use crate::store::ManagedLog;

/// Rotate and prune logs, then run the health probes once.
pub fn execute(config: &AppConfig, app_log: Option<Arc<ManagedLog>>) -> Result<()> {
    let orchestrator = build_orchestrator(config, app_log)?;
    let Some(outcome) = orchestrator.run_maintenance() else {
        bail!("maintenance refused: orchestrator is shutting down");
    };

    println!("{}", "Maintenance".bold());
    println!("  Rotated: {}", outcome.logs.rotated.len());
    for path in &outcome.logs.rotated {
        println!("    {}", path.display());
    }
    println!("  Removed: {}", outcome.logs.removed.len());
    for path in &outcome.logs.removed {
        println!("    {}", path.display());
    }
    for error in &outcome.logs.errors {
        println!("  {} {error}", "Error:".red());
    }

    println!("\n{} {}", "Health:".bold(), health_label(outcome.health.overall));
    for (name, probe) in &outcome.health.probes {
        println!("  {:<18} {} {}", name, probe_label(probe.status), probe.detail.dimmed());
    }
    Ok(())
}
