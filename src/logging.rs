//! Tracing setup: human-readable stderr plus the rotating application log.

use std::io;
use std::sync::Arc;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::store::ManagedLog;

/// `io::Write` adapter that appends each formatted event to a [`ManagedLog`],
/// so application log lines are serialized against rotation.
#[derive(Debug, Clone)]
pub struct LogWriter {
    log: Arc<ManagedLog>,
}

impl LogWriter {
    pub fn new(log: Arc<ManagedLog>) -> Self {
        Self { log }
    }
}

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.log.append(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Filter from `RUST_LOG`, falling back to `level`.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber. An explicit `level_override` (from the CLI)
/// wins over `RUST_LOG`.
///
/// Returns an error if a subscriber is already installed.
pub fn init_logging(
    default_level: &str,
    level_override: Option<&str>,
    app_log: Option<Arc<ManagedLog>>,
) -> anyhow::Result<()> {
    let filter = match level_override {
        Some(level) => EnvFilter::try_new(level)?,
        None => build_filter(default_level),
    };

    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .compact();

    let file_layer = app_log.map(|log| {
        let writer = LogWriter::new(log);
        fmt::layer()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_target(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()?;
    Ok(())
}
