//! Rotation and retention for on-disk log files.
//!
//! Every file that can be rotated is a [`ManagedLog`]. Appends and rotation
//! take the same per-file mutex, so a rename never races a write and no line
//! is split across the archive and the fresh file.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::MonitorError;

const ARCHIVE_TIMESTAMP: &str = "%Y%m%dT%H%M%S";

/// An append-only file that may be rotated into timestamped archives.
#[derive(Debug)]
pub struct ManagedLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ManagedLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `bytes` to the active file as one write.
    pub fn append(&self, bytes: &[u8]) -> io::Result<()> {
        let _guard = self.lock();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(bytes)?;
        file.flush()
    }

    pub fn size(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Contents of all archives (oldest first) followed by the active file.
    ///
    /// Read under the write lock so a concurrent rotation cannot hide or
    /// duplicate lines.
    pub fn read_all(&self) -> Result<String, MonitorError> {
        let _guard = self.lock();
        let mut content = String::new();
        for archive in self.archives()? {
            content.push_str(&read_if_exists(&archive)?);
        }
        content.push_str(&read_if_exists(&self.path)?);
        Ok(content)
    }

    /// Rename the active file to a timestamped archive if it is larger than
    /// `threshold` bytes. The next append recreates the active file.
    ///
    /// Nothing is logged while the lock is held: the application log itself is
    /// a `ManagedLog` and its writer takes the same lock.
    pub fn rotate_if_larger(&self, threshold: u64) -> Result<Option<PathBuf>, MonitorError> {
        let (archive, size) = {
            let _guard = self.lock();

            let size = self.size();
            if size <= threshold {
                return Ok(None);
            }

            let archive = self.next_archive_path(Utc::now());
            fs::rename(&self.path, &archive).map_err(|e| {
                MonitorError::persistence(&format!("rotate {}", self.path.display()), e)
            })?;
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|e| {
                    MonitorError::persistence(&format!("reopen {}", self.path.display()), e)
                })?;
            (archive, size)
        };

        tracing::info!(
            log = %self.path.display(),
            archive = %archive.display(),
            size_bytes = size,
            "rotated log file"
        );
        Ok(Some(archive))
    }

    fn stem_and_ext(&self) -> (String, String) {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "log".to_string());
        let ext = self
            .path
            .extension()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "log".to_string());
        (stem, ext)
    }

    fn next_archive_path(&self, now: DateTime<Utc>) -> PathBuf {
        let (stem, ext) = self.stem_and_ext();
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let stamp = now.format(ARCHIVE_TIMESTAMP);

        let mut candidate = dir.join(format!("{stem}-{stamp}.{ext}"));
        let mut suffix = 1;
        while candidate.exists() {
            candidate = dir.join(format!("{stem}-{stamp}-{suffix}.{ext}"));
            suffix += 1;
        }
        candidate
    }

    /// Files beside the active log matching `<stem>-*.<ext>`, in any order.
    fn archive_candidates(&self) -> Result<Vec<PathBuf>, MonitorError> {
        let (stem, ext) = self.stem_and_ext();
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let pattern = format!(
            "{}/{}-*.{}",
            glob::Pattern::escape(&dir.to_string_lossy()),
            glob::Pattern::escape(&stem),
            glob::Pattern::escape(&ext)
        );

        let paths = glob::glob(&pattern)
            .map_err(|e| MonitorError::persistence("archive pattern", e))?;
        Ok(paths.filter_map(Result::ok).collect())
    }

    /// Archives of this log (names written by rotation), oldest first.
    pub fn archives(&self) -> Result<Vec<PathBuf>, MonitorError> {
        let (stem, ext) = self.stem_and_ext();
        let mut archives: Vec<(NaiveDateTime, u32, PathBuf)> = self
            .archive_candidates()?
            .into_iter()
            .filter_map(|path| {
                let (stamp, suffix) = parse_archive_name(&path, &stem, &ext)?;
                Some((stamp, suffix, path))
            })
            .collect();
        archives.sort();
        Ok(archives.into_iter().map(|(_, _, path)| path).collect())
    }

    /// When `archive` was rotated: the timestamp in its name, else its mtime.
    fn archive_age(&self, archive: &Path) -> Option<NaiveDateTime> {
        let (stem, ext) = self.stem_and_ext();
        if let Some((stamp, _)) = parse_archive_name(archive, &stem, &ext) {
            return Some(stamp);
        }
        match fs::metadata(archive).and_then(|m| m.modified()) {
            Ok(modified) => Some(DateTime::<Utc>::from(modified).naive_utc()),
            Err(e) => {
                tracing::warn!(archive = %archive.display(), error = %e, "archive age unknown, kept");
                None
            }
        }
    }
}

/// Extract the rotation timestamp and collision suffix from an archive name
/// like `checks-20260314T091500-2.log`.
fn parse_archive_name(path: &Path, stem: &str, ext: &str) -> Option<(NaiveDateTime, u32)> {
    let name = path.file_name()?.to_str()?;
    let rest = name.strip_prefix(stem)?.strip_prefix('-')?;
    let rest = rest.strip_suffix(ext)?.strip_suffix('.')?;

    let (stamp, suffix) = match rest.split_once('-') {
        Some((stamp, suffix)) => (stamp, suffix.parse().ok()?),
        None => (rest, 0),
    };
    let parsed = NaiveDateTime::parse_from_str(stamp, ARCHIVE_TIMESTAMP).ok()?;
    Some((parsed, suffix))
}

fn read_if_exists(path: &Path) -> Result<String, MonitorError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(MonitorError::persistence(&path.display().to_string(), e)),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub rotated: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub errors: Vec<String>,
}

/// Rotates managed logs past a size threshold and prunes old archives.
#[derive(Debug)]
pub struct LogLifecycleManager {
    logs: Mutex<Vec<Arc<ManagedLog>>>,
    rotate_bytes: u64,
}

impl LogLifecycleManager {
    pub fn new(rotate_bytes: u64) -> Self {
        Self {
            logs: Mutex::new(Vec::new()),
            rotate_bytes,
        }
    }

    pub fn manage(&self, log: Arc<ManagedLog>) {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(log);
    }

    fn managed(&self) -> Vec<Arc<ManagedLog>> {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rotate every managed log whose size exceeds the threshold.
    ///
    /// Returns the archives created; a failure on one log does not stop the rest.
    pub fn rotate(&self) -> Result<Vec<PathBuf>, MonitorError> {
        let mut rotated = Vec::new();
        let mut first_error = None;

        for log in self.managed() {
            match log.rotate_if_larger(self.rotate_bytes) {
                Ok(Some(archive)) => rotated.push(archive),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(log = %log.path().display(), error = %e, "rotation failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if rotated.is_empty() => Err(e),
            _ => Ok(rotated),
        }
    }

    /// Delete archives older than `retention_days`.
    ///
    /// Age comes from the archive name, which records when it was rotated, or
    /// from the file's mtime for `<stem>-*.<ext>` files not named by rotation.
    /// A failure on one file does not stop the rest; the error is returned only
    /// when nothing could be removed.
    pub fn cleanup(&self, retention_days: u32) -> Result<Vec<PathBuf>, MonitorError> {
        let (removed, errors) = self.prune(retention_days);
        match errors.into_iter().next() {
            Some(e) if removed.is_empty() => Err(e),
            _ => Ok(removed),
        }
    }

    fn prune(&self, retention_days: u32) -> (Vec<PathBuf>, Vec<MonitorError>) {
        let cutoff = Utc::now().naive_utc() - ChronoDuration::days(i64::from(retention_days));
        let mut removed = Vec::new();
        let mut errors = Vec::new();

        for log in self.managed() {
            let candidates = match log.archive_candidates() {
                Ok(candidates) => candidates,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            for archive in candidates {
                let Some(rotated_at) = log.archive_age(&archive) else {
                    continue;
                };
                if rotated_at >= cutoff {
                    continue;
                }
                match fs::remove_file(&archive) {
                    Ok(()) => removed.push(archive),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!(archive = %archive.display(), error = %e, "archive removal failed");
                        errors.push(MonitorError::persistence(
                            &format!("remove {}", archive.display()),
                            e,
                        ));
                    }
                }
            }
        }

        if !removed.is_empty() {
            tracing::info!(removed = removed.len(), retention_days, "pruned old log archives");
        }
        (removed, errors)
    }

    /// Daily pass: rotate, then prune.
    pub fn run_maintenance(&self, retention_days: u32) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();
        match self.rotate() {
            Ok(rotated) => report.rotated = rotated,
            Err(e) => report.errors.push(e.to_string()),
        }
        let (removed, errors) = self.prune(retention_days);
        report.removed = removed;
        report
            .errors
            .extend(errors.into_iter().map(|e| e.to_string()));
        report
    }
}
