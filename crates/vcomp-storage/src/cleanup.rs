//! Temp file deletion and age-based sweeps.

use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::in_flight::InFlightPaths;

/// Placeholder kept in otherwise empty storage roots.
const KEEP_FILE: &str = ".gitkeep";

/// Delete a file. A missing file is not an error.
///
/// Returns `true` if a file was removed.
pub async fn delete_file(path: &Path) -> StorageResult<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Deleted file");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::delete_failed(path, e)),
    }
}

/// Delete a directory tree. A missing directory is not an error.
pub async fn delete_dir(path: &Path) -> StorageResult<bool> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Deleted directory");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StorageError::delete_failed(path, e)),
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Dir,
}

/// Delete regular files under `root` whose mtime is older than `max_age`,
/// except those in `in_flight`.
pub async fn sweep_temp_files(
    root: &Path,
    max_age: Duration,
    in_flight: &InFlightPaths,
) -> StorageResult<SweepReport> {
    sweep_older_than(root, max_age, SystemTime::now(), EntryKind::File, in_flight).await
}

/// Delete working directories under `root` whose mtime is older than
/// `max_age`, except those in `in_flight`.
pub async fn sweep_video_dirs(
    root: &Path,
    max_age: Duration,
    in_flight: &InFlightPaths,
) -> StorageResult<SweepReport> {
    sweep_older_than(root, max_age, SystemTime::now(), EntryKind::Dir, in_flight).await
}

/// Individual deletion failures are logged and counted, never returned.
async fn sweep_older_than(
    root: &Path,
    max_age: Duration,
    now: SystemTime,
    kind: EntryKind,
    in_flight: &InFlightPaths,
) -> StorageResult<SweepReport> {
    let mut report = SweepReport::default();

    let mut entries = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(report),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name() == KEEP_FILE {
            continue;
        }
        let path = entry.path();
        if in_flight.contains(&path) {
            debug!(path = %path.display(), "Skipping in-flight entry");
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to stat entry");
                report.failed += 1;
                continue;
            }
        };

        let matches_kind = match kind {
            EntryKind::File => metadata.is_file(),
            EntryKind::Dir => metadata.is_dir(),
        };
        if !matches_kind {
            continue;
        }

        let Ok(modified) = metadata.modified() else {
            continue;
        };
        // Clock skew (mtime in the future) counts as fresh
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        if age <= max_age {
            continue;
        }

        let result = match kind {
            EntryKind::File => delete_file(&path).await,
            EntryKind::Dir => delete_dir(&path).await,
        };
        match result {
            Ok(true) => report.deleted += 1,
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "Cleanup deletion failed");
                report.failed += 1;
            }
        }
    }

    if report.deleted > 0 || report.failed > 0 {
        info!(
            root = %root.display(),
            deleted = report.deleted,
            failed = report.failed,
            "Sweep finished"
        );
    }

    Ok(report)
}
