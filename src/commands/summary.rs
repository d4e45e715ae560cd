//! Summary command - sends today's daily summary
//! Usage: watchkeep summary [--force]

use anyhow::Result;
use chrono::Local;
use colored::Colorize;

use super::common::build_orchestrator;
use crate::config::AppConfig;

/// Run a summary-tick for today. Without `force` it only runs once the
/// configured summary time has passed.
pub fn execute(config: &AppConfig, force: bool) -> Result<()> {
    let orchestrator = build_orchestrator(config, None)?;
    let summary_time = orchestrator.config().summary_time;

    if !force && Local::now().time() < summary_time {
        println!(
            "{} summary is not due before {} (use --force to send now)",
            "Skipped:".yellow(),
            summary_time.format("%H:%M")
        );
        return Ok(());
    }

    let outcome = orchestrator.summary_tick();
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
