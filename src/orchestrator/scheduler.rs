//! Periodic loops driving the orchestrator
//!
//! Four named threads share one [`Orchestrator`]:
//! - check: every `[min_interval, max_interval]` (uniformly random per tick)
//! - summary: polls each minute, fires once the summary is due
//! - drain: every `queue_drain_interval`
//! - maintenance: at startup, then every `maintenance_interval`
//!
//! Each loop sleeps on a shared [`ShutdownSignal`], so a shutdown wakes all of
//! them immediately instead of waiting out the interval.

use chrono::Local;
use rand::Rng;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::Orchestrator;

const SUMMARY_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// One-shot flag that loops wait on between ticks.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    triggered: Mutex<bool>,
    changed: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.triggered.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn trigger(&self) {
        *self.lock() = true;
        self.changed.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.lock()
    }

    /// Sleep for `timeout` or until triggered. Returns `true` if triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut triggered = self.lock();
        while !*triggered {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (guard, _) = self
                .changed
                .wait_timeout(triggered, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            triggered = guard;
        }
        true
    }
}

/// Uniformly random duration in `[min, max]` (millisecond resolution).
pub fn pick_interval(min: Duration, max: Duration) -> Duration {
    let min_ms = min.as_millis() as u64;
    let max_ms = (max.as_millis() as u64).max(min_ms);
    Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
}

/// Running scheduler loops.
#[derive(Debug)]
pub struct Runtime {
    orchestrator: Arc<Orchestrator>,
    signal: Arc<ShutdownSignal>,
    handles: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Spawn every loop. `signal` may be shared with a Ctrl-C handler.
    pub fn start(orchestrator: Arc<Orchestrator>, signal: Arc<ShutdownSignal>) -> io::Result<Self> {
        let mut runtime = Self {
            orchestrator,
            signal,
            handles: Vec::with_capacity(4),
        };

        runtime.spawn("check", |orchestrator, signal| loop {
            let outcome = orchestrator.check_tick();
            if outcome.skipped && !orchestrator.is_accepting() {
                break;
            }
            let config = orchestrator.config();
            let next = pick_interval(config.min_interval, config.max_interval);
            tracing::debug!(next_check_secs = next.as_secs(), "next check scheduled");
            if signal.wait_timeout(next) {
                break;
            }
        })?;

        runtime.spawn("summary", |orchestrator, signal| loop {
            if orchestrator.summary_due(Local::now()) {
                orchestrator.summary_tick();
            }
            if signal.wait_timeout(SUMMARY_POLL_INTERVAL) {
                break;
            }
        })?;

        runtime.spawn("drain", |orchestrator, signal| {
            let interval = orchestrator.config().queue_drain_interval;
            while !signal.wait_timeout(interval) {
                orchestrator.drain_queue();
            }
        })?;

        runtime.spawn("maintenance", |orchestrator, signal| loop {
            orchestrator.run_maintenance();
            if signal.wait_timeout(orchestrator.config().maintenance_interval) {
                break;
            }
        })?;

        tracing::info!(
            resource = %runtime.orchestrator.config().target,
            loops = runtime.handles.len(),
            "scheduler started"
        );
        Ok(runtime)
    }

    fn spawn<F>(&mut self, name: &str, body: F) -> io::Result<()>
    where
        F: FnOnce(Arc<Orchestrator>, Arc<ShutdownSignal>) + Send + 'static,
    {
        let orchestrator = Arc::clone(&self.orchestrator);
        let signal = Arc::clone(&self.signal);
        let spawned = thread::Builder::new()
            .name(format!("watchkeep-{name}"))
            .spawn(move || body(orchestrator, signal));
        match spawned {
            Ok(handle) => {
                self.handles.push(handle);
                Ok(())
            }
            Err(e) => {
                // Loops already running must not outlive a failed start
                self.signal.trigger();
                Err(e)
            }
        }
    }

    pub fn signal(&self) -> &Arc<ShutdownSignal> {
        &self.signal
    }

    /// Block until the shutdown signal fires.
    pub fn wait(&self) {
        while !self.signal.wait_timeout(Duration::from_secs(3600)) {}
    }

    /// Stop all loops, waiting up to `grace` for in-flight ticks.
    ///
    /// Returns `false` if the grace period elapsed with work still running;
    /// those threads are left detached for the caller's hard-kill timeout.
    pub fn shutdown(self, grace: Duration) -> bool {
        self.signal.trigger();
        let drained = self.orchestrator.shutdown(grace);
        if drained {
            for handle in self.handles {
                if handle.join().is_err() {
                    tracing::error!("scheduler loop panicked");
                }
            }
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_interval_within_bounds() {
        let min = Duration::from_secs(5);
        let max = Duration::from_secs(10);
        for _ in 0..200 {
            let picked = pick_interval(min, max);
            assert!(picked >= min && picked <= max);
        }
        assert_eq!(pick_interval(max, max), max);
        assert_eq!(pick_interval(max, min), max);
    }

    #[test]
    fn test_signal_wakes_waiter() {
        let signal = Arc::new(ShutdownSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.wait_timeout(Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(20));
        signal.trigger();
        assert!(waiter.join().unwrap());
        assert!(signal.is_triggered());
    }

    #[test]
    fn test_signal_times_out() {
        let signal = ShutdownSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
    }
}
