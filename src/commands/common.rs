//! Wiring shared by the subcommands: config resolution and orchestrator assembly.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::capability::{Checker, DesktopNotifier, HttpChecker, Notifier, WebhookNotifier};
use crate::config::{AppConfig, NotifierKind};
use crate::health::HealthAggregator;
use crate::models::constants::files;
use crate::orchestrator::{Components, Orchestrator};
use crate::resilience::{CircuitBreaker, DeferredQueue};
use crate::store::{CheckLog, LogLifecycleManager, ManagedLog, StateStore};

/// Config from `path`, or from the default location when not given.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => AppConfig::default_path().unwrap_or_else(|| PathBuf::from("config.toml")),
    };
    AppConfig::load(&path)
}

pub fn app_log(config: &AppConfig) -> Arc<ManagedLog> {
    Arc::new(ManagedLog::new(config.log_dir().join(files::APP_LOG)))
}

pub fn check_log(config: &AppConfig) -> Arc<ManagedLog> {
    Arc::new(ManagedLog::new(config.log_dir().join(files::CHECK_LOG)))
}

pub fn status_path(config: &AppConfig) -> PathBuf {
    config.work_dir().join(files::STATUS)
}

fn build_notifier(config: &AppConfig) -> Result<Arc<dyn Notifier>> {
    let notify = &config.notify;
    Ok(match notify.kind {
        NotifierKind::Desktop => Arc::new(DesktopNotifier::new()),
        NotifierKind::Webhook => {
            let url = notify
                .url
                .as_deref()
                .context("notify.url is required for the webhook notifier")?;
            Arc::new(WebhookNotifier::new(
                url,
                notify.credential.clone(),
                notify.sender.clone(),
                notify.recipient.clone(),
                Duration::from_secs(notify.timeout_secs),
            )?)
        }
    })
}

/// Validate `config` and construct the orchestrator with file-backed state.
///
/// `app_log`, when given, is registered for rotation alongside the check log.
pub fn build_orchestrator(
    config: &AppConfig,
    app_log: Option<Arc<ManagedLog>>,
) -> Result<Orchestrator> {
    config.validate()?;

    let work_dir = config.work_dir();
    std::fs::create_dir_all(&work_dir)
        .with_context(|| format!("Failed to create work directory {}", work_dir.display()))?;

    let state = Arc::new(
        StateStore::open(&work_dir.join(files::STATE)).context("Failed to load monitoring state")?,
    );
    let queue = Arc::new(
        DeferredQueue::open(config.queue_config(), &work_dir.join(files::QUEUE))
            .context("Failed to load deferred queue")?,
    );

    let check_log_file = check_log(config);
    let lifecycle = Arc::new(LogLifecycleManager::new(config.logs.rotate_bytes));
    lifecycle.manage(Arc::clone(&check_log_file));
    if let Some(app_log) = app_log {
        lifecycle.manage(app_log);
    }

    let checker: Arc<dyn Checker> = Arc::new(HttpChecker::new(
        Duration::from_secs(config.target.timeout_secs),
        config.target.unavailable_marker.clone(),
    )?);

    let components = Components {
        state,
        checker,
        notifier: build_notifier(config)?,
        breaker: Arc::new(CircuitBreaker::new(config.circuit_config())),
        queue,
        check_log: Arc::new(CheckLog::new(check_log_file)),
        health: Arc::new(HealthAggregator::new()),
        lifecycle,
    };

    let orchestrator = Orchestrator::new(config.orchestrator_config()?, components)
        .with_status_path(work_dir.join(files::STATUS));
    orchestrator.register_builtin_probes(&work_dir);
    Ok(orchestrator)
}
