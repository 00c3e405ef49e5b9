//! Periodic age-based cleanup of temp files and working directories.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use vcomp_storage::{sweep_temp_files, sweep_video_dirs, InFlightPaths, StorageLayout, SweepReport};

use crate::config::CleanupConfig;
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepKind {
    /// Orphaned downloads under the temp root
    TempFiles,
    /// Whole working directories under the HLS root
    VideoDirs,
}

impl SweepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepKind::TempFiles => "temp_files",
            SweepKind::VideoDirs => "video_dirs",
        }
    }
}

/// Run one sweep, leaving `in_flight` paths alone. Failures are logged and
/// reported as an empty sweep.
pub async fn sweep_once(
    kind: SweepKind,
    root: &Path,
    max_age: Duration,
    in_flight: &InFlightPaths,
) -> SweepReport {
    let result = match kind {
        SweepKind::TempFiles => sweep_temp_files(root, max_age, in_flight).await,
        SweepKind::VideoDirs => sweep_video_dirs(root, max_age, in_flight).await,
    };

    match result {
        Ok(report) => {
            if report.deleted > 0 {
                metrics::record_cleanup_deleted(kind.as_str(), report.deleted);
            }
            report
        }
        Err(e) => {
            warn!(kind = kind.as_str(), root = %root.display(), error = %e, "Sweep failed");
            SweepReport::default()
        }
    }
}

/// Sweep every `period` until shutdown. The first sweep runs after one period.
pub async fn run_sweeper(
    kind: SweepKind,
    root: PathBuf,
    max_age: Duration,
    period: Duration,
    in_flight: InFlightPaths,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(
        kind = kind.as_str(),
        root = %root.display(),
        max_age_secs = max_age.as_secs(),
        period_secs = period.as_secs(),
        "Starting sweeper"
    );

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                sweep_once(kind, &root, max_age, &in_flight).await;
            }
        }
    }

    debug!(kind = kind.as_str(), "Sweeper stopped");
}

/// Spawn the temp-file sweeper, plus the working-directory sweeper when a
/// retention is configured. Both skip paths the running job holds.
pub fn spawn_sweepers(
    layout: &StorageLayout,
    cleanup: &CleanupConfig,
    in_flight: &InFlightPaths,
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let mut handles = vec![tokio::spawn(run_sweeper(
        SweepKind::TempFiles,
        layout.temp_root().to_path_buf(),
        cleanup.temp_max_age,
        cleanup.temp_sweep_interval,
        in_flight.clone(),
        shutdown.clone(),
    ))];

    match cleanup.video_retention {
        Some(retention) => handles.push(tokio::spawn(run_sweeper(
            SweepKind::VideoDirs,
            layout.hls_root().to_path_buf(),
            retention,
            cleanup.video_sweep_interval,
            in_flight.clone(),
            shutdown.clone(),
        ))),
        None => info!("Working directory retention disabled"),
    }

    handles
}
