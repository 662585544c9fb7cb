//! Snapshot history for a build directory.
//!
//! A snapshot is an immutable copy of the build's resolved config and pinned
//! blueprint version under `snapshots/<timestamp>[-label]/`. Rotation keeps
//! the newest `keep` entries by modification time and removes the rest.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::error::{CleanupFailure, CoreError, Result};
use crate::workspace::{CONFIG_FILENAME, SNAPSHOTS_DIR, VERSION_POINTER_FILENAME};

/// Retention applied after every snapshot-creating action unless configured.
pub const DEFAULT_RETENTION: usize = 100;

const MAX_NAME_ATTEMPTS: usize = 1000;

/// UTC stamp used for snapshot and log names, e.g. `20250102-030405Z`.
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d-%H%M%SZ").to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationReport {
    pub retained: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

/// Keep the `keep` most recently modified snapshot entries, delete the rest.
///
/// Ties on modification time are broken by name, newest name first, so the
/// outcome does not depend on directory listing order. Every deletion is
/// attempted; failures are collected and returned together.
pub fn rotate(build_dir: &Path, keep: usize) -> Result<RotationReport> {
    rotate_with(build_dir, keep, remove_entry)
}

/// [`rotate`] with a caller-supplied removal step.
pub fn rotate_with<F>(build_dir: &Path, keep: usize, mut remove: F) -> Result<RotationReport>
where
    F: FnMut(&Path) -> io::Result<()>,
{
    let root = build_dir.join(SNAPSHOTS_DIR);
    let listing = fs::read_dir(&root).map_err(|e| CoreError::io(&root, e))?;

    let mut entries: Vec<(SystemTime, String, PathBuf)> = Vec::new();
    for entry in listing {
        let entry = entry.map_err(|e| CoreError::io(&root, e))?;
        let path = entry.path();
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .map_err(|e| CoreError::io(&path, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        entries.push((modified, name, path));
    }

    entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    let mut report = RotationReport {
        retained: Vec::new(),
        removed: Vec::new(),
    };
    let mut failures = Vec::new();

    for (idx, (_, _, path)) in entries.into_iter().enumerate() {
        if idx < keep {
            report.retained.push(path);
            continue;
        }
        match remove(&path) {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Removed snapshot");
                report.removed.push(path);
            }
            Err(source) => {
                tracing::warn!(path = %path.display(), error = %source, "Failed to remove snapshot");
                failures.push(CleanupFailure { path, source });
            }
        }
    }

    if !failures.is_empty() {
        return Err(CoreError::SnapshotCleanup { failures });
    }

    tracing::info!(
        build = %build_dir.display(),
        kept = report.retained.len(),
        removed = report.removed.len(),
        "Rotated snapshots"
    );
    Ok(report)
}

fn remove_entry(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Validate a user-supplied snapshot label.
pub fn validate_label(label: &str) -> Result<()> {
    let bad = label.is_empty()
        || label == "."
        || label == ".."
        || label.contains('/')
        || label.contains('\\')
        || label.chars().any(char::is_control);
    if bad {
        return Err(CoreError::config(format!("invalid snapshot label '{label}'")));
    }
    Ok(())
}

/// Create a fresh snapshot directory, suffixing `.1`, `.2`, ... when the
/// same label was already used within the same second. Existing snapshots
/// are never reused.
fn claim_snapshot_dir(root: &Path, base: &str) -> Result<PathBuf> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            base.to_string()
        } else {
            format!("{base}.{attempt}")
        };
        let candidate = root.join(name);
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(CoreError::io(&candidate, e)),
        }
    }
    Err(CoreError::io(
        root.join(base),
        io::Error::new(io::ErrorKind::AlreadyExists, "no free snapshot name"),
    ))
}

/// Copy the build's current config and version pointer into a new snapshot.
pub fn create_snapshot(build_dir: &Path, label: &str, now: DateTime<Utc>) -> Result<PathBuf> {
    validate_label(label)?;

    let root = build_dir.join(SNAPSHOTS_DIR);
    fs::create_dir_all(&root).map_err(|e| CoreError::io(&root, e))?;
    let snap_dir = claim_snapshot_dir(&root, &format!("{}-{}", timestamp(now), label))?;

    for file in [CONFIG_FILENAME, VERSION_POINTER_FILENAME] {
        let src = build_dir.join(file);
        let dst = snap_dir.join(file);
        if let Err(e) = fs::copy(&src, &dst) {
            // Never leave a half-written snapshot for rotation to count.
            let _ = fs::remove_dir_all(&snap_dir);
            return Err(CoreError::io(&src, e));
        }
    }

    tracing::info!(snapshot = %snap_dir.display(), "Created snapshot");
    Ok(snap_dir)
}
