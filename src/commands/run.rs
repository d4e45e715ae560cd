//! Run command - foreground scheduler until Ctrl-C

use anyhow::{bail, Context, Result};
use std::sync::Arc;

use super::common::build_orchestrator;
use crate::config::AppConfig;
use crate::orchestrator::{Runtime, ShutdownSignal};
use crate::store::ManagedLog;

/// Run every scheduler loop in the foreground until Ctrl-C.
pub fn execute(config: &AppConfig, app_log: Option<Arc<ManagedLog>>) -> Result<()> {
    let orchestrator = Arc::new(build_orchestrator(config, app_log)?);
    let grace = orchestrator.config().shutdown_grace;

    let signal = Arc::new(ShutdownSignal::new());
    let handler_signal = Arc::clone(&signal);
    ctrlc::set_handler(move || {
        tracing::info!("interrupt received");
        handler_signal.trigger();
    })
    .context("Failed to set Ctrl+C handler")?;

    let runtime = Runtime::start(orchestrator, signal).context("Failed to start scheduler")?;
    println!("Watching {} (Ctrl-C to stop)", config.target.url);
    runtime.wait();

    if !runtime.shutdown(grace) {
        bail!(
            "shutdown grace period of {}s elapsed with a tick still in flight",
            grace.as_secs()
        );
    }
    Ok(())
}
