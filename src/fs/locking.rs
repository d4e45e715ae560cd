//! Crash-safe JSON persistence for state files
//!
//! Writes go to a temporary sibling and are renamed over the target, so a
//! process killed mid-write leaves either the old or the new document on disk,
//! never a truncated one. Writers serialize on an `fs2` advisory lock held on
//! a `<file>.lock` sidecar; readers need no lock because the rename is atomic.
//!
//! Advisory locks are cooperative - all writers must go through [`write_json`]
//! for the locking to be effective.

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::MonitorError;

/// Read and deserialize a JSON file.
///
/// Returns `Ok(None)` when the file does not exist yet or is empty.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, MonitorError> {
    let Some(content) = read_content(path)? else {
        return Ok(None);
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| MonitorError::persistence(&format!("parse {}", path.display()), e))
}

/// Like [`read_json`], but a file that does not parse is renamed to
/// `<file>.corrupt` and treated as absent.
///
/// I/O errors other than a missing file are still returned.
pub fn read_json_or_quarantine<T: DeserializeOwned>(
    path: &Path,
) -> Result<Option<T>, MonitorError> {
    let Some(content) = read_content(path)? else {
        return Ok(None);
    };
    match serde_json::from_str(&content) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            let err = MonitorError::persistence(&format!("parse {}", path.display()), e);
            let aside = sibling(path, ".corrupt");
            fs::rename(path, &aside).map_err(|e| {
                MonitorError::persistence(&format!("move aside {}", path.display()), e)
            })?;
            tracing::error!(
                category = %err.kind(),
                error = %err,
                moved_to = %aside.display(),
                "unreadable state file moved aside, starting fresh"
            );
            Ok(None)
        }
    }
}

/// Serialize a value as pretty JSON and atomically replace `path` with it.
///
/// The sequence is: lock sidecar → write temp sibling → fsync → rename.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), MonitorError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| MonitorError::persistence(&display(dir), e))?;

    let content = serde_json::to_string_pretty(value)
        .map_err(|e| MonitorError::persistence("serialize", e))?;

    let lock_path = sibling(path, ".lock");
    let lock = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| MonitorError::persistence(&display(&lock_path), e))?;
    lock.lock_exclusive()
        .map_err(|e| MonitorError::persistence(&format!("exclusive lock {}", lock_path.display()), e))?;

    let mut temp = tempfile::Builder::new()
        .prefix(".watchkeep-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| MonitorError::persistence(&format!("temp file in {}", dir.display()), e))?;
    temp.write_all(content.as_bytes())
        .and_then(|()| temp.flush())
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| MonitorError::persistence(&display(temp.path()), e))?;
    temp.persist(path)
        .map_err(|e| MonitorError::persistence(&format!("replace {}", path.display()), e.error))?;
    drop(lock);
    Ok(())
}

fn read_content(path: &Path) -> Result<Option<String>, MonitorError> {
    match fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(None),
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(MonitorError::persistence(&display(path), e)),
    }
}

/// `path` with `suffix` appended to its file name, e.g. `state.json.lock`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
