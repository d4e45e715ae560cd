use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use watchkeep::commands::{check, common, drain, history, maintain, run, status, summary};
use watchkeep::logging::init_logging;

#[derive(Parser)]
#[command(name = "watchkeep")]
#[command(about = "Watch a resource's availability and alert when it comes back", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config.toml (default: <config dir>/watchkeep/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "watchkeep=trace" (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all scheduler loops in the foreground until Ctrl-C
    Run,

    /// Run one check-tick and print the outcome
    Check,

    /// Send today's daily summary
    Summary {
        /// Send even if the configured summary time has not passed yet
        #[arg(long)]
        force: bool,
    },

    /// Retry deferred notifications that are due
    Drain {
        /// Treat every queued notification as due now
        #[arg(long)]
        now: bool,
    },

    /// Rotate and prune logs, then run health probes
    Maintain,

    /// Show monitoring state, circuit, queue and health
    Status {
        /// Print the raw report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show recorded check results
    History {
        /// Only records at or after this RFC 3339 timestamp
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = common::load_config(cli.config.as_deref())?;
    let app_log = common::app_log(&config);
    init_logging(
        &config.logs.level,
        cli.log_level.as_deref(),
        Some(app_log.clone()),
    )?;

    let result = match cli.command {
        Commands::Run => run::execute(&config, Some(app_log)),
        Commands::Check => check::execute(&config),
        Commands::Summary { force } => summary::execute(&config, force),
        Commands::Drain { now } => drain::execute(&config, now),
        Commands::Maintain => maintain::execute(&config, Some(app_log)),
        Commands::Status { json } => status::execute(&config, json),
        Commands::History { since, json } => history::execute(&config, since, json),
    };

    if let Err(e) = &result {
        tracing::error!(error = %format!("{e:#}"), "command failed");
    }
    result
}
