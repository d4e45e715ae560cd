//! Defaults and well-known file names

use std::time::Duration;

/// Default number of attempts for a single availability check.
pub const DEFAULT_CHECK_ATTEMPTS: u32 = 3;

/// Delay before the second check attempt; doubles per attempt.
pub const DEFAULT_CHECK_BASE_DELAY: Duration = Duration::from_secs(2);

/// Upper bound on the delay between check attempts.
pub const DEFAULT_CHECK_MAX_DELAY: Duration = Duration::from_secs(8);

/// How long a check-tick waits for the state lock before it is skipped.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Consecutive notifier failures that open the circuit.
pub const DEFAULT_CIRCUIT_THRESHOLD: u32 = 5;

/// How long an open circuit rejects calls before allowing a probe.
pub const DEFAULT_CIRCUIT_COOLDOWN: Duration = Duration::from_secs(300);

/// Maximum number of undelivered notifications held for redelivery.
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// Failed redeliveries after which a queued notification is dropped.
pub const DEFAULT_MAX_REDELIVERIES: u32 = 5;

/// Queue depth (as a fraction of capacity) reported as unhealthy.
pub const QUEUE_PRESSURE_THRESHOLD: f64 = 0.8;

/// Active log size that triggers rotation.
pub const DEFAULT_ROTATE_BYTES: u64 = 10 * 1024 * 1024;

/// Age after which rotated archives are deleted.
pub const DEFAULT_RETENTION_DAYS: u32 = 14;

/// Grace period for in-flight ticks during shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Per-probe deadline for health checks.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A check older than this multiple of the max interval is considered stale.
pub const STALE_CHECK_FACTOR: u32 = 3;

/// File names inside the work directory.
pub mod files {
    pub const STATE: &str = "state.json";
    pub const QUEUE: &str = "queue.json";
    pub const STATUS: &str = "status.json";
    pub const LOG_DIR: &str = "logs";
    pub const CHECK_LOG: &str = "checks.log";
    pub const APP_LOG: &str = "watchkeep.log";
}
