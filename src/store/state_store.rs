//! Single-writer owner of [`MonitoringState`].
//!
//! Two locks are involved:
//! - the tick lock, taken by a check-tick for its whole duration via
//!   [`StateStore::acquire_lock`] and released when the [`TickGuard`] drops;
//! - an internal `RwLock` that makes every [`StateStore::update`] atomic, so the
//!   summary-tick can record its date while a check-tick is running.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::error::MonitorError;
use crate::fs::{read_json_or_quarantine, write_json};
use crate::models::MonitoringState;

#[derive(Debug)]
pub struct StateStore {
    state: RwLock<MonitoringState>,
    tick_held: Mutex<bool>,
    released: Condvar,
    path: Option<PathBuf>,
    persist_failures: AtomicU64,
    skipped_ticks: AtomicU64,
}

/// Proof that the caller holds the tick lock.
///
/// Dropping the guard clears `in_progress` and releases the lock, on every exit
/// path including early returns and panics.
#[must_use = "the tick lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct TickGuard<'a> {
    store: &'a StateStore,
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.store.update(|s| s.with_in_progress(false));
        let mut held = self.store.lock_tick();
        *held = false;
        self.store.released.notify_one();
    }
}

impl StateStore {
    pub fn in_memory() -> Self {
        Self::with_state(MonitoringState::default(), None)
    }

    /// Load persisted state from `path` (or start fresh when absent).
    ///
    /// A persisted `in_progress` flag is stale by definition and is cleared. A
    /// file that does not parse is moved aside and the state starts fresh.
    pub fn open(path: &Path) -> Result<Self, MonitorError> {
        let state = read_json_or_quarantine::<MonitoringState>(path)?
            .map(|s| s.with_in_progress(false))
            .unwrap_or_default();
        Ok(Self::with_state(state, Some(path.to_path_buf())))
    }

    fn with_state(state: MonitoringState, path: Option<PathBuf>) -> Self {
        Self {
            state: RwLock::new(state),
            tick_held: Mutex::new(false),
            released: Condvar::new(),
            path,
            persist_failures: AtomicU64::new(0),
            skipped_ticks: AtomicU64::new(0),
        }
    }

    fn lock_tick(&self) -> MutexGuard<'_, bool> {
        self.tick_held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait up to `timeout` for the tick lock.
    ///
    /// On success `in_progress` is set until the returned guard is dropped.
    pub fn acquire_lock(&self, timeout: Duration) -> Result<TickGuard<'_>, MonitorError> {
        let deadline = Instant::now() + timeout;
        let mut held = self.lock_tick();

        while *held {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(MonitorError::LockTimeout(timeout));
            }
            let (guard, _) = self
                .released
                .wait_timeout(held, remaining)
                .unwrap_or_else(PoisonError::into_inner);
            held = guard;
        }

        *held = true;
        drop(held);

        self.update(|s| s.with_in_progress(true));
        Ok(TickGuard { store: self })
    }

    pub fn is_locked(&self) -> bool {
        *self.lock_tick()
    }

    /// Immutable snapshot; does not need the tick lock.
    pub fn read(&self) -> MonitoringState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Atomically replace the state with `mutator(current)` and persist it.
    ///
    /// A persistence failure is logged and counted; the in-memory state stays
    /// authoritative and is written again on the next update.
    pub fn update<F>(&self, mutator: F) -> MonitoringState
    where
        F: FnOnce(&MonitoringState) -> MonitoringState,
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let next = mutator(&state);
        *state = next.clone();

        if let Some(path) = &self.path {
            if let Err(e) = write_json(path, &next) {
                self.persist_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    category = %e.kind(),
                    error = %e,
                    "failed to persist monitoring state, keeping it in memory"
                );
            }
        }
        next
    }

    pub fn persist_failures(&self) -> u64 {
        self.persist_failures.load(Ordering::Relaxed)
    }

    /// Count a tick that gave up waiting for the lock. Returns the new total.
    pub fn record_skipped_tick(&self) -> u64 {
        self.skipped_ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Ticks skipped on lock contention since startup.
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped_ticks.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AvailabilityStatus, CheckOutcome};
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_guard_sets_and_clears_in_progress() {
        let store = StateStore::in_memory();
        {
            let _guard = store.acquire_lock(Duration::from_millis(10)).unwrap();
            assert!(store.read().in_progress);
            assert!(store.is_locked());
        }
        assert!(!store.read().in_progress);
        assert!(!store.is_locked());
    }

    #[test]
    fn test_second_acquire_times_out() {
        let store = StateStore::in_memory();
        let _guard = store.acquire_lock(Duration::from_millis(10)).unwrap();

        let result = store.acquire_lock(Duration::from_millis(30));
        assert!(matches!(result, Err(MonitorError::LockTimeout(_))));
    }

    #[test]
    fn test_waiter_gets_lock_after_release() {
        let store = Arc::new(StateStore::in_memory());
        let guard = store.acquire_lock(Duration::from_millis(10)).unwrap();

        let waiter = {
            let store = Arc::clone(&store);
            thread::spawn(move || store.acquire_lock(Duration::from_secs(2)).is_ok())
        };

        thread::sleep(Duration::from_millis(50));
        drop(guard);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_lock_released_on_panic() {
        let store = Arc::new(StateStore::in_memory());
        let panicking = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let _guard = store.acquire_lock(Duration::from_millis(10)).unwrap();
                panic!("checker blew up");
            })
        };
        assert!(panicking.join().is_err());

        assert!(!store.read().in_progress);
        assert!(store.acquire_lock(Duration::from_millis(10)).is_ok());
    }

    #[test]
    fn test_update_is_atomic_across_threads() {
        let store = Arc::new(StateStore::in_memory());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..100 {
                        store.update(|s| s.error_recorded(chrono::Utc::now()));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.read().error_count, 800);
    }

    #[test]
    fn test_persisted_state_reloads_without_in_progress() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");

        {
            let store = StateStore::open(&path).unwrap();
            let _guard = store.acquire_lock(Duration::from_millis(10)).unwrap();
            store.update(|s| s.observed(&CheckOutcome::now(AvailabilityStatus::Available)));
            // Simulate a crash: the guard is leaked, in_progress stays true on disk
            std::mem::forget(_guard);
        }

        let reopened = StateStore::open(&path).unwrap();
        let state = reopened.read();
        assert_eq!(state.last_observed_status, AvailabilityStatus::Available);
        assert!(!state.in_progress);
    }

    #[test]
    fn test_truncated_state_file_starts_fresh() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.json");
        std::fs::write(&path, "{\n  \"last_observed_status\": \"avail").unwrap();

        let store = StateStore::open(&path).unwrap();
        assert_eq!(store.read(), MonitoringState::default());
        assert!(tmp.path().join("state.json.corrupt").exists());

        store.update(|s| s.error_recorded(chrono::Utc::now()));
        let reopened = StateStore::open(&path).unwrap();
        assert_eq!(reopened.read().error_count, 1);
    }

    #[test]
    fn test_persist_failure_keeps_memory_state() {
        let tmp = TempDir::new().unwrap();
        // A directory where the state file should be makes every write fail
        let path = tmp.path().join("state.json");
        std::fs::create_dir(&path).unwrap();

        let store = StateStore::with_state(MonitoringState::default(), Some(path));
        let next = store.update(|s| s.error_recorded(chrono::Utc::now()));
        assert_eq!(next.error_count, 1);
        assert_eq!(store.read().error_count, 1);
        assert_eq!(store.persist_failures(), 1);
    }
}
