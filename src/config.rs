//! `config.toml` loading and validation.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration apart from the target, which must be set.

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::constants::{
    files, DEFAULT_CHECK_ATTEMPTS, DEFAULT_CHECK_BASE_DELAY, DEFAULT_CHECK_MAX_DELAY,
    DEFAULT_CIRCUIT_COOLDOWN, DEFAULT_CIRCUIT_THRESHOLD, DEFAULT_LOCK_TIMEOUT,
    DEFAULT_MAX_REDELIVERIES, DEFAULT_PROBE_TIMEOUT, DEFAULT_QUEUE_CAPACITY, DEFAULT_RETENTION_DAYS,
    DEFAULT_ROTATE_BYTES, DEFAULT_SHUTDOWN_GRACE,
};
use crate::orchestrator::OrchestratorConfig;
use crate::resilience::{CircuitBreakerConfig, QueueConfig, RetryPolicy};

/// Environment variable that overrides `notify.credential`.
pub const CREDENTIAL_ENV: &str = "WATCHKEEP_CREDENTIAL";

const SUMMARY_TIME_FORMAT: &str = "%H:%M";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub target: TargetConfig,
    pub notify: NotifyConfig,
    pub schedule: ScheduleConfig,
    pub retry: RetryConfig,
    pub circuit: CircuitConfig,
    pub queue: QueueSection,
    pub logs: LogsConfig,
    pub health: HealthConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetConfig {
    pub url: String,
    /// Body substring that marks a 2xx page as unavailable
    pub unavailable_marker: Option<String>,
    pub timeout_secs: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            unavailable_marker: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    #[default]
    Desktop,
    Webhook,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifyConfig {
    pub kind: NotifierKind,
    pub url: Option<String>,
    pub credential: Option<String>,
    pub sender: String,
    pub recipient: String,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::Desktop,
            url: None,
            credential: None,
            sender: "watchkeep".to_string(),
            recipient: String::new(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleConfig {
    pub min_interval_secs: u64,
    pub max_interval_secs: u64,
    /// Local time of day ("HH:MM") after which the daily summary is sent
    pub summary_time: String,
    pub queue_drain_interval_secs: u64,
    pub maintenance_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: 300,
            max_interval_secs: 600,
            summary_time: "20:00".to_string(),
            queue_drain_interval_secs: 60,
            maintenance_interval_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_CHECK_ATTEMPTS,
            base_delay_secs: DEFAULT_CHECK_BASE_DELAY.as_secs(),
            max_delay_secs: DEFAULT_CHECK_MAX_DELAY.as_secs(),
            backoff_factor: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitConfig {
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_CIRCUIT_THRESHOLD,
            cooldown_secs: DEFAULT_CIRCUIT_COOLDOWN.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueSection {
    pub max_capacity: usize,
    pub max_redeliveries: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_QUEUE_CAPACITY,
            max_redeliveries: DEFAULT_MAX_REDELIVERIES,
            base_delay_secs: 60,
            max_delay_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogsConfig {
    pub level: String,
    pub rotate_bytes: u64,
    pub retention_days: u32,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            rotate_bytes: DEFAULT_ROTATE_BYTES,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    pub probe_timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// State, queue and logs live here; defaults to the platform data dir
    pub work_dir: Option<PathBuf>,
    pub lock_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    /// Alert when the very first observation is Available
    pub alert_on_first_check: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT.as_secs(),
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE.as_secs(),
            alert_on_first_check: true,
        }
    }
}

impl AppConfig {
    /// `<config_dir>/watchkeep/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("watchkeep").join("config.toml"))
    }

    /// Read and parse `path`, then apply environment overrides.
    ///
    /// A missing file yields the defaults; the result is not validated.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Self::from_toml(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(&mut self) {
        if let Ok(credential) = std::env::var(CREDENTIAL_ENV) {
            if !credential.is_empty() {
                self.notify.credential = Some(credential);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.target.url.trim().is_empty() {
            bail!("target.url must be set");
        }
        if self.schedule.min_interval_secs == 0 {
            bail!("schedule.min_interval_secs must be at least 1");
        }
        if self.schedule.min_interval_secs > self.schedule.max_interval_secs {
            bail!(
                "schedule.min_interval_secs ({}) exceeds schedule.max_interval_secs ({})",
                self.schedule.min_interval_secs,
                self.schedule.max_interval_secs
            );
        }
        if self.schedule.queue_drain_interval_secs == 0 {
            bail!("schedule.queue_drain_interval_secs must be at least 1");
        }
        if self.schedule.maintenance_interval_secs == 0 {
            bail!("schedule.maintenance_interval_secs must be at least 1");
        }
        self.summary_time()?;
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.retry.base_delay_secs > self.retry.max_delay_secs {
            bail!("retry.base_delay_secs exceeds retry.max_delay_secs");
        }
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor < 1.0 {
            bail!("retry.backoff_factor must be a finite number >= 1.0");
        }
        if self.circuit.failure_threshold == 0 {
            bail!("circuit.failure_threshold must be at least 1");
        }
        if self.queue.max_capacity == 0 {
            bail!("queue.max_capacity must be at least 1");
        }
        if self.queue.base_delay_secs > self.queue.max_delay_secs {
            bail!("queue.base_delay_secs exceeds queue.max_delay_secs");
        }
        if self.notify.kind == NotifierKind::Webhook
            && self.notify.url.as_deref().map_or(true, |u| u.trim().is_empty())
        {
            bail!("notify.url is required for the webhook notifier");
        }
        Ok(())
    }

    pub fn summary_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.schedule.summary_time, SUMMARY_TIME_FORMAT).with_context(
            || {
                format!(
                    "schedule.summary_time '{}' is not HH:MM",
                    self.schedule.summary_time
                )
            },
        )
    }

    pub fn work_dir(&self) -> PathBuf {
        self.runtime.work_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("watchkeep")
        })
    }

    pub fn log_dir(&self) -> PathBuf {
        self.work_dir().join(files::LOG_DIR)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_secs(self.retry.base_delay_secs),
            max_delay: Duration::from_secs(self.retry.max_delay_secs),
            backoff_factor: self.retry.backoff_factor,
        }
    }

    pub fn circuit_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit.failure_threshold,
            cooldown: Duration::from_secs(self.circuit.cooldown_secs),
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_capacity: self.queue.max_capacity,
            max_redeliveries: self.queue.max_redeliveries,
            base_delay: Duration::from_secs(self.queue.base_delay_secs),
            max_delay: Duration::from_secs(self.queue.max_delay_secs),
        }
    }

    pub fn orchestrator_config(&self) -> Result<OrchestratorConfig> {
        Ok(OrchestratorConfig {
            target: self.target.url.clone(),
            check_retry: self.retry_policy(),
            lock_timeout: Duration::from_secs(self.runtime.lock_timeout_secs),
            alert_on_first_check: self.runtime.alert_on_first_check,
            shutdown_grace: Duration::from_secs(self.runtime.shutdown_grace_secs),
            min_interval: Duration::from_secs(self.schedule.min_interval_secs),
            max_interval: Duration::from_secs(self.schedule.max_interval_secs),
            summary_time: self.summary_time()?,
            queue_drain_interval: Duration::from_secs(self.schedule.queue_drain_interval_secs),
            maintenance_interval: Duration::from_secs(self.schedule.maintenance_interval_secs),
            probe_timeout: Duration::from_secs(self.health.probe_timeout_secs),
            retention_days: self.logs.retention_days,
        })
    }
}
