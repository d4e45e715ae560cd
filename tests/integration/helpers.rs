//! Shared fakes and harness for orchestrator integration tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use watchkeep::capability::{Checker, Notifier};
use watchkeep::error::MonitorError;
use watchkeep::health::HealthAggregator;
use watchkeep::models::{
    AlertContext, AvailabilityStatus, CheckOutcome, DeliveryReceipt, SummaryStats,
};
use watchkeep::orchestrator::{Components, Orchestrator, OrchestratorConfig};
use watchkeep::resilience::{
    CircuitBreaker, CircuitBreakerConfig, DeferredQueue, QueueConfig, RetryExecutor, RetryPolicy,
};
use watchkeep::store::{CheckLog, LogLifecycleManager, ManagedLog, StateStore};

/// Checker that replays a script, then repeats `fallback`.
pub struct ScriptedChecker {
    script: Mutex<VecDeque<Result<AvailabilityStatus, MonitorError>>>,
    fallback: AvailabilityStatus,
    delay: Duration,
    panic_message: Option<&'static str>,
    calls: AtomicUsize,
}

impl ScriptedChecker {
    pub fn new(
        script: impl IntoIterator<Item = Result<AvailabilityStatus, MonitorError>>,
        fallback: AvailabilityStatus,
    ) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            delay: Duration::ZERO,
            panic_message: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always answers `status`.
    pub fn steady(status: AvailabilityStatus) -> Self {
        Self::new([], status)
    }

    /// Sleep before answering, to keep a tick in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Panic on every call instead of answering.
    pub fn panicking(mut self, message: &'static str) -> Self {
        self.panic_message = Some(message);
        self
    }

    pub fn push(&self, next: Result<AvailabilityStatus, MonitorError>) {
        self.script.lock().unwrap().push_back(next);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Checker for ScriptedChecker {
    fn check(&self, _target: &str) -> Result<CheckOutcome, MonitorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if let Some(message) = self.panic_message {
            panic!("{message}");
        }
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(self.fallback));
        next.map(CheckOutcome::now)
    }
}

/// Notifier that records every call and fails while a failure is set.
#[derive(Default)]
pub struct FakeNotifier {
    failure: Mutex<Option<MonitorError>>,
    alert_calls: AtomicUsize,
    summary_calls: AtomicUsize,
    delivered: Mutex<Vec<AlertContext>>,
    summaries: Mutex<Vec<SummaryStats>>,
}

impl FakeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(err: MonitorError) -> Self {
        let notifier = Self::default();
        notifier.fail_with(err);
        notifier
    }

    pub fn fail_with(&self, err: MonitorError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    /// Every `send_alert` invocation, successful or not.
    pub fn alert_calls(&self) -> usize {
        self.alert_calls.load(Ordering::SeqCst)
    }

    pub fn summary_calls(&self) -> usize {
        self.summary_calls.load(Ordering::SeqCst)
    }

    pub fn delivered(&self) -> Vec<AlertContext> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn summaries(&self) -> Vec<SummaryStats> {
        self.summaries.lock().unwrap().clone()
    }

    fn outcome(&self) -> Result<DeliveryReceipt, MonitorError> {
        match self.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(DeliveryReceipt {
                message_id: format!("msg-{}", self.alert_calls() + self.summary_calls()),
            }),
        }
    }
}

impl Notifier for FakeNotifier {
    fn send_alert(&self, context: &AlertContext) -> Result<DeliveryReceipt, MonitorError> {
        self.alert_calls.fetch_add(1, Ordering::SeqCst);
        let receipt = self.outcome()?;
        self.delivered.lock().unwrap().push(context.clone());
        Ok(receipt)
    }

    fn send_summary(&self, stats: &SummaryStats) -> Result<DeliveryReceipt, MonitorError> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        let receipt = self.outcome()?;
        self.summaries.lock().unwrap().push(stats.clone());
        Ok(receipt)
    }
}

/// Knobs for [`Harness::build`].
pub struct Options {
    pub alert_on_first_check: bool,
    pub circuit: CircuitBreakerConfig,
    pub queue: QueueConfig,
    pub lock_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            alert_on_first_check: true,
            circuit: CircuitBreakerConfig {
                failure_threshold: 5,
                cooldown: Duration::from_secs(60),
            },
            queue: QueueConfig {
                // Deferred entries are due immediately so drains can run back to back
                base_delay: Duration::ZERO,
                ..QueueConfig::default()
            },
            lock_timeout: Duration::from_millis(50),
        }
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub orchestrator: Arc<Orchestrator>,
    pub checker: Arc<ScriptedChecker>,
    pub notifier: Arc<FakeNotifier>,
}

impl Harness {
    pub fn new(checker: ScriptedChecker, notifier: FakeNotifier) -> Self {
        Self::build(checker, notifier, Options::default())
    }

    pub fn build(checker: ScriptedChecker, notifier: FakeNotifier, options: Options) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let checker = Arc::new(checker);
        let notifier = Arc::new(notifier);

        let check_log_file = Arc::new(ManagedLog::new(dir.path().join("logs").join("checks.log")));
        let lifecycle = Arc::new(LogLifecycleManager::new(1024 * 1024));
        lifecycle.manage(Arc::clone(&check_log_file));

        let components = Components {
            state: Arc::new(StateStore::open(&dir.path().join("state.json")).unwrap()),
            checker: Arc::clone(&checker) as Arc<dyn Checker>,
            notifier: Arc::clone(&notifier) as Arc<dyn Notifier>,
            breaker: Arc::new(CircuitBreaker::new(options.circuit)),
            queue: Arc::new(
                DeferredQueue::open(options.queue, &dir.path().join("queue.json")).unwrap(),
            ),
            check_log: Arc::new(CheckLog::new(check_log_file)),
            health: Arc::new(HealthAggregator::new()),
            lifecycle,
        };

        let mut config = OrchestratorConfig::new("https://shop.example.com/item/42");
        config.check_retry = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(8),
            backoff_factor: 2.0,
        };
        config.lock_timeout = options.lock_timeout;
        config.alert_on_first_check = options.alert_on_first_check;
        config.min_interval = Duration::from_secs(3600);
        config.max_interval = Duration::from_secs(3600);
        config.queue_drain_interval = Duration::from_secs(3600);
        config.maintenance_interval = Duration::from_secs(3600);
        config.probe_timeout = Duration::from_secs(1);

        let orchestrator = Orchestrator::new(config, components)
            .with_retry_executor(RetryExecutor::with_sleeper(|_| {}))
            .with_status_path(dir.path().join("status.json"));
        orchestrator.register_builtin_probes(dir.path());

        Self {
            dir,
            orchestrator: Arc::new(orchestrator),
            checker,
            notifier,
        }
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}
