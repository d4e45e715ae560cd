//! Status command - colored view of the last status snapshot
//! Usage: watchkeep status [--json]

use anyhow::Result;
use colored::{ColoredString, Colorize};

use super::common::{build_orchestrator, status_path};
use crate::config::AppConfig;
use crate::health::{OverallHealth, ProbeStatus};
use crate::models::AvailabilityStatus;
use crate::orchestrator::StatusReport;
use crate::resilience::CircuitState;

pub(super) fn availability_label(status: AvailabilityStatus) -> ColoredString {
    match status {
        AvailabilityStatus::Available => status.to_string().green(),
        AvailabilityStatus::Unavailable => status.to_string().red(),
        AvailabilityStatus::Unknown => status.to_string().yellow(),
    }
}

pub(super) fn health_label(health: OverallHealth) -> ColoredString {
    match health {
        OverallHealth::Healthy => health.to_string().green(),
        OverallHealth::Degraded => health.to_string().yellow(),
        OverallHealth::Unhealthy => health.to_string().red().bold(),
    }
}

pub(super) fn probe_label(status: ProbeStatus) -> ColoredString {
    match status {
        ProbeStatus::Healthy => "ok".green(),
        ProbeStatus::Unhealthy => "FAIL".red(),
    }
}

fn circuit_label(state: CircuitState) -> ColoredString {
    match state {
        CircuitState::Closed => state.to_string().green(),
        CircuitState::HalfOpen => state.to_string().yellow(),
        CircuitState::Open => state.to_string().red(),
    }
}

fn or_never<T: std::fmt::Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "never".to_string())
}

/// Print the last status snapshot, or one built from persisted state when no
/// instance has written a snapshot yet.
pub fn execute(config: &AppConfig, json: bool) -> Result<()> {
    let report = match StatusReport::load(&status_path(config))? {
        Some(report) => report,
        None => build_orchestrator(config, None)?.status(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "watchkeep status".bold().blue());
    println!("{}", "=".repeat(50));
    println!("  Target:     {}", report.target);
    println!("  Generated:  {}", report.generated_at.to_rfc3339());

    let state = &report.state;
    println!("\n{}", "Monitoring".bold());
    println!("  Status:       {}", availability_label(state.last_observed_status));
    println!("  Last check:   {}", or_never(state.last_check_timestamp));
    println!("  In progress:  {}", state.in_progress);
    println!(
        "  Failures:     {} consecutive, {} total errors",
        state.consecutive_failure_count, state.error_count
    );
    println!("  Last error:   {}", or_never(state.last_error_timestamp));
    if report.skipped_ticks > 0 {
        println!(
            "  Skipped:      {} ticks (state lock busy)",
            report.skipped_ticks.to_string().yellow()
        );
    }
    println!("  Summary sent: {}", or_never(state.daily_summary_sent_for_date));

    let circuit = &report.circuit;
    println!("\n{}", "Notifier circuit".bold());
    println!("  State:        {}", circuit_label(circuit.state));
    println!("  Failures:     {}", circuit.failure_count);
    if let Some(next) = circuit.next_attempt_at {
        println!("  Next attempt: {}", next.to_rfc3339());
    }

    let queue = &report.queue;
    println!("\n{}", "Deferred queue".bold());
    println!("  Depth:        {}/{}", queue.depth, queue.capacity);
    println!("  Oldest:       {}", or_never(queue.oldest_enqueued_at));
    println!("  Next due:     {}", or_never(queue.next_due_at));
    println!("  Rejected:     {}", queue.rejected_total);
    println!("  Dropped:      {}", queue.dropped_total);

    if report.state_persist_failures > 0 || report.buffered_check_records > 0 {
        println!("\n{}", "Persistence".bold());
        println!("  State write failures:   {}", report.state_persist_failures);
        println!("  Buffered check records: {}", report.buffered_check_records);
    }

    match &report.health {
        Some(health) => {
            println!("\n{} {}", "Health:".bold(), health_label(health.overall));
            for (name, probe) in &health.probes {
                println!(
                    "  {:<18} {} {} ({}ms)",
                    name,
                    probe_label(probe.status),
                    probe.detail.dimmed(),
                    probe.duration_ms
                );
            }
        }
        None => println!("\n{} {}", "Health:".bold(), "not checked yet".dimmed()),
    }

    println!();
    Ok(())
}
