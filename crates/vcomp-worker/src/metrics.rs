//! Worker metrics.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{WorkerError, WorkerResult};

/// Install the Prometheus recorder with an HTTP listener on `addr`.
///
/// Must run inside the tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter on {addr}: {e}")))
}

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "vcomp_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vcomp_jobs_failed_total";
    pub const JOB_DURATION_SECONDS: &str = "vcomp_job_duration_seconds";

    pub const DOWNLOAD_DURATION_SECONDS: &str = "vcomp_download_duration_seconds";
    pub const DOWNLOAD_BYTES_TOTAL: &str = "vcomp_download_bytes_total";
    pub const ENCODE_DURATION_SECONDS: &str = "vcomp_encode_duration_seconds";

    pub const TICKS_SKIPPED_TOTAL: &str = "vcomp_ticks_skipped_total";
    pub const CLEANUP_DELETED_TOTAL: &str = "vcomp_cleanup_deleted_total";
}

pub fn record_job_completed(duration_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "completed").record(duration_secs);
}

/// `kind` is the failure category, e.g. `encoding`.
pub fn record_job_failed(kind: &str, duration_secs: f64) {
    counter!(names::JOBS_FAILED_TOTAL, "kind" => kind.to_string()).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "outcome" => "failed").record(duration_secs);
}

pub fn record_download(bytes: u64, duration_secs: f64) {
    counter!(names::DOWNLOAD_BYTES_TOTAL).increment(bytes);
    histogram!(names::DOWNLOAD_DURATION_SECONDS).record(duration_secs);
}

pub fn record_encode_duration(tier: &str, duration_secs: f64) {
    histogram!(names::ENCODE_DURATION_SECONDS, "tier" => tier.to_string()).record(duration_secs);
}

pub fn record_tick_skipped() {
    counter!(names::TICKS_SKIPPED_TOTAL).increment(1);
}

pub fn record_cleanup_deleted(kind: &str, count: usize) {
    counter!(names::CLEANUP_DELETED_TOTAL, "kind" => kind.to_string()).increment(count as u64);
}
