//! Drain command - retries deferred notifications that are due
//! Usage: watchkeep drain [--now]

use anyhow::Result;

use super::common::build_orchestrator;
use crate::config::AppConfig;

/// Run one pass over the deferred queue. With `now`, entries are made due
/// immediately instead of waiting for their backoff.
pub fn execute(config: &AppConfig, now: bool) -> Result<()> {
    let orchestrator = build_orchestrator(config, None)?;
    if now {
        orchestrator.queue().expedite();
    }
    let report = orchestrator.drain_queue();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
