//! Bounded holding area for alerts that could not be delivered immediately.
//!
//! Entries are appended by the check-tick and drained by a separate loop via
//! [`DeferredQueue::process_due`]. Delivery runs without holding the queue
//! mutex, so a slow notifier never blocks `enqueue`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::retry::RetryPolicy;
use crate::error::MonitorError;
use crate::fs::{read_json_or_quarantine, write_json};
use crate::models::constants::{DEFAULT_MAX_REDELIVERIES, DEFAULT_QUEUE_CAPACITY};
use crate::models::{AlertContext, DeliveryReceipt};

#[derive(Debug, Clone, PartialEq)]
pub struct QueueConfig {
    pub max_capacity: usize,
    /// Failed redeliveries after which an entry is dropped
    pub max_redeliveries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_QUEUE_CAPACITY,
            max_redeliveries: DEFAULT_MAX_REDELIVERIES,
            base_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(3600),
        }
    }
}

impl QueueConfig {
    fn backoff(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_redeliveries.max(1),
            base_delay: self.base_delay,
            max_delay: self.max_delay.max(self.base_delay),
            backoff_factor: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub payload: AlertContext,
    pub enqueued_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub next_attempt_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueueEntry {
    fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at <= now
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("deferred queue full ({capacity} entries), notification rejected")]
pub struct QueueFull {
    pub capacity: usize,
}

/// Outcome of one [`DeferredQueue::process_due`] pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrainReport {
    pub attempted: usize,
    pub delivered: usize,
    pub rescheduled: usize,
    pub dropped: usize,
    /// Due entries left untouched because the circuit was open
    pub deferred: usize,
    /// Another drain was already running
    pub busy: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub depth: usize,
    pub capacity: usize,
    pub oldest_enqueued_at: Option<DateTime<Utc>>,
    pub next_due_at: Option<DateTime<Utc>>,
    pub rejected_total: u64,
    pub dropped_total: u64,
}

enum Delivery {
    Delivered,
    Retry(MonitorError),
    Drop(MonitorError),
}

/// Marks a drain pass as running; cleared on drop, including when `deliver` panics.
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        (!flag.swap(true, Ordering::AcqRel)).then_some(Self(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct DeferredQueue {
    config: QueueConfig,
    entries: Mutex<VecDeque<QueueEntry>>,
    draining: AtomicBool,
    rejected_total: AtomicU64,
    dropped_total: AtomicU64,
    path: Option<PathBuf>,
}

impl DeferredQueue {
    /// In-memory queue, nothing is persisted.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            rejected_total: AtomicU64::new(0),
            dropped_total: AtomicU64::new(0),
            path: None,
        }
    }

    /// Queue backed by a JSON file; previously persisted entries are reloaded.
    pub fn open(config: QueueConfig, path: &Path) -> Result<Self, MonitorError> {
        let mut queue = Self::new(config);
        queue.path = Some(path.to_path_buf());

        let stored: Vec<QueueEntry> = read_json_or_quarantine(path)?.unwrap_or_default();
        {
            let mut entries = queue.lock();
            for entry in stored {
                if entries.len() >= queue.config.max_capacity {
                    queue.rejected_total.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        id = %entry.id,
                        resource = %entry.payload.target,
                        capacity = queue.config.max_capacity,
                        "persisted notification exceeds queue capacity, rejected"
                    );
                    continue;
                }
                entries.push_back(entry);
            }
            if !entries.is_empty() {
                tracing::info!(depth = entries.len(), "reloaded deferred notifications");
            }
        }
        Ok(queue)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueueEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, entries: &VecDeque<QueueEntry>) {
        let Some(path) = &self.path else {
            return;
        };
        let snapshot: Vec<&QueueEntry> = entries.iter().collect();
        if let Err(e) = write_json(path, &snapshot) {
            tracing::warn!(
                category = %e.kind(),
                error = %e,
                "failed to persist deferred queue, keeping it in memory"
            );
        }
    }

    /// Append a notification for later redelivery.
    ///
    /// At capacity the new entry is rejected; older entries are never evicted.
    pub fn enqueue(&self, payload: AlertContext) -> Result<Uuid, QueueFull> {
        let mut entries = self.lock();

        if entries.len() >= self.config.max_capacity {
            self.rejected_total.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                resource = %payload.target,
                capacity = self.config.max_capacity,
                status = %payload.new_status,
                "deferred queue full, rejecting notification"
            );
            return Err(QueueFull {
                capacity: self.config.max_capacity,
            });
        }

        let now = Utc::now();
        let entry = QueueEntry {
            id: Uuid::new_v4(),
            payload,
            enqueued_at: now,
            attempt_count: 0,
            next_attempt_at: now + to_chrono(self.config.base_delay),
            last_error: None,
        };
        let id = entry.id;
        tracing::info!(
            %id,
            depth = entries.len() + 1,
            next_attempt_at = %entry.next_attempt_at,
            "notification deferred"
        );
        entries.push_back(entry);
        self.persist(&entries);
        Ok(id)
    }

    /// Attempt delivery of every entry whose `next_attempt_at` has passed.
    ///
    /// Success removes the entry; a retryable failure increments `attempt_count`
    /// and reschedules with backoff; a permanent failure, or reaching
    /// `max_redeliveries`, drops the entry with an error log. A `CircuitOpen`
    /// rejection ends the pass without charging any attempt.
    pub fn process_due<F>(&self, mut deliver: F) -> DrainReport
    where
        F: FnMut(&AlertContext) -> Result<DeliveryReceipt, MonitorError>,
    {
        let Some(_draining) = DrainGuard::claim(&self.draining) else {
            return DrainReport {
                busy: true,
                ..DrainReport::default()
            };
        };

        let mut report = DrainReport::default();
        let now = Utc::now();
        let mut due: Vec<QueueEntry> = self
            .lock()
            .iter()
            .filter(|e| e.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|e| e.next_attempt_at);

        let mut results = Vec::with_capacity(due.len());
        for (index, entry) in due.iter().enumerate() {
            report.attempted += 1;
            match deliver(&entry.payload) {
                Ok(receipt) => {
                    tracing::info!(
                        id = %entry.id,
                        message_id = %receipt.message_id,
                        attempt = entry.attempt_count + 1,
                        "deferred notification delivered"
                    );
                    results.push((entry.id, Delivery::Delivered));
                }
                Err(MonitorError::CircuitOpen { retry_at }) => {
                    report.attempted -= 1;
                    report.deferred = due.len() - index;
                    tracing::debug!(%retry_at, deferred = report.deferred, "circuit open, pausing drain");
                    break;
                }
                Err(err) if err.is_permanent() => results.push((entry.id, Delivery::Drop(err))),
                Err(err) => results.push((entry.id, Delivery::Retry(err))),
            }
        }

        if !results.is_empty() {
            let mut entries = self.lock();
            for (id, outcome) in results {
                self.apply(&mut entries, id, outcome, &mut report);
            }
            self.persist(&entries);
        }
        report
    }

    fn apply(
        &self,
        entries: &mut VecDeque<QueueEntry>,
        id: Uuid,
        outcome: Delivery,
        report: &mut DrainReport,
    ) {
        let Some(pos) = entries.iter().position(|e| e.id == id) else {
            return;
        };

        match outcome {
            Delivery::Delivered => {
                entries.remove(pos);
                report.delivered += 1;
            }
            Delivery::Drop(err) => {
                if let Some(entry) = entries.remove(pos) {
                    self.drop_entry(&entry, &err, report);
                }
            }
            Delivery::Retry(err) => {
                let entry = &mut entries[pos];
                entry.attempt_count += 1;
                entry.last_error = Some(err.to_string());

                if entry.attempt_count >= self.config.max_redeliveries {
                    if let Some(entry) = entries.remove(pos) {
                        self.drop_entry(&entry, &err, report);
                    }
                    return;
                }

                let delay = self.config.backoff().delay_for(entry.attempt_count);
                entry.next_attempt_at = Utc::now() + to_chrono(delay);
                report.rescheduled += 1;
                tracing::warn!(
                    id = %entry.id,
                    attempt = entry.attempt_count,
                    max_redeliveries = self.config.max_redeliveries,
                    category = %err.kind(),
                    error = %err,
                    next_attempt_at = %entry.next_attempt_at,
                    "redelivery failed, rescheduled"
                );
            }
        }
    }

    fn drop_entry(&self, entry: &QueueEntry, err: &MonitorError, report: &mut DrainReport) {
        report.dropped += 1;
        self.dropped_total.fetch_add(1, Ordering::Relaxed);
        tracing::error!(
            id = %entry.id,
            resource = %entry.payload.target,
            attempts = entry.attempt_count,
            enqueued_at = %entry.enqueued_at,
            category = %err.kind(),
            error = %err,
            "deferred notification permanently failed, dropped"
        );
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.config.max_capacity
    }

    pub fn entries(&self) -> Vec<QueueEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn status(&self) -> QueueStatus {
        let entries = self.lock();
        QueueStatus {
            depth: entries.len(),
            capacity: self.config.max_capacity,
            oldest_enqueued_at: entries.iter().map(|e| e.enqueued_at).min(),
            next_due_at: entries.iter().map(|e| e.next_attempt_at).min(),
            rejected_total: self.rejected_total.load(Ordering::Relaxed),
            dropped_total: self.dropped_total.load(Ordering::Relaxed),
        }
    }

    /// Make every entry due now (operator-triggered flush).
    pub fn expedite(&self) {
        let now = Utc::now();
        let mut entries = self.lock();
        for entry in entries.iter_mut() {
            entry.next_attempt_at = now;
        }
        self.persist(&entries);
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(3650))
}
