//! Check command - one check-tick, outcome printed as JSON

use anyhow::Result;

use super::common::build_orchestrator;
use crate::config::AppConfig;

/// Run a single check-tick and print its outcome as JSON.
pub fn execute(config: &AppConfig) -> Result<()> {
    let orchestrator = build_orchestrator(config, None)?;
    let outcome = orchestrator.check_tick();
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
