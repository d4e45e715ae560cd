//! Append-only record stream of check results (JSON Lines).

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::lifecycle::ManagedLog;
use crate::error::MonitorError;
use crate::models::CheckRecord;

/// Records buffered in memory while the log file is not writable.
const PENDING_LIMIT: usize = 1_000;

#[derive(Debug)]
pub struct CheckLog {
    log: Arc<ManagedLog>,
    pending: Mutex<Vec<CheckRecord>>,
}

impl CheckLog {
    pub fn new(log: Arc<ManagedLog>) -> Self {
        Self {
            log,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// The underlying file, for registration with the lifecycle manager.
    pub fn managed_log(&self) -> Arc<ManagedLog> {
        Arc::clone(&self.log)
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<CheckRecord>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record. Records that failed to write earlier are flushed first.
    ///
    /// On failure the record is buffered and a `Persistence` error returned.
    pub fn append(&self, record: CheckRecord) -> Result<(), MonitorError> {
        let mut pending = self.lock_pending();
        pending.push(record);

        let mut batch = String::new();
        for record in pending.iter() {
            let line = serde_json::to_string(record)
                .map_err(|e| MonitorError::persistence("serialize check record", e))?;
            batch.push_str(&line);
            batch.push('\n');
        }

        match self.log.append(batch.as_bytes()) {
            Ok(()) => {
                if pending.len() > 1 {
                    tracing::info!(flushed = pending.len() - 1, "flushed buffered check records");
                }
                pending.clear();
                Ok(())
            }
            Err(e) => {
                if pending.len() > PENDING_LIMIT {
                    let excess = pending.len() - PENDING_LIMIT;
                    pending.drain(..excess);
                    tracing::warn!(discarded = excess, "check record buffer full, oldest discarded");
                }
                tracing::warn!(
                    buffered = pending.len(),
                    error = %e,
                    "check log append failed, buffering record"
                );
                Err(MonitorError::persistence(
                    &format!("append {}", self.log.path().display()),
                    e,
                ))
            }
        }
    }

    /// Every record: rotated archives, then the active file, then anything buffered.
    pub fn get_all(&self) -> Result<Vec<CheckRecord>, MonitorError> {
        let content = self.log.read_all()?;
        let mut records: Vec<CheckRecord> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping malformed check record");
                    None
                }
            })
            .collect();
        records.extend(self.lock_pending().iter().cloned());
        Ok(records)
    }

    /// Records with `since <= timestamp`.
    pub fn get_since(&self, since: DateTime<Utc>) -> Result<Vec<CheckRecord>, MonitorError> {
        Ok(self
            .get_all()?
            .into_iter()
            .filter(|r| r.timestamp >= since)
            .collect())
    }

    pub fn pending_len(&self) -> usize {
        self.lock_pending().len()
    }
}
