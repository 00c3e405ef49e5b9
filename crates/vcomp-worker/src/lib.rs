//! Polling HLS transcoding worker.
//!
//! This crate provides:
//! - Interval scheduling with at most one job in flight
//! - The per-job pipeline: claim, validate, download, transcode, complete
//! - Monotonic progress reporting to the job registry
//! - Periodic sweeps of stale temp files and working directories

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod progress;
pub mod progress_plan;
pub mod scheduler;
pub mod sweeper;
pub mod transcoder;

#[cfg(test)]
mod testing;

pub use config::{CleanupConfig, WorkerConfig};
pub use error::{ErrorKind, WorkerError, WorkerResult};
pub use logging::{init_tracing, JobLogger};
pub use pipeline::{JobOutcome, JobPipeline};
pub use progress::{ProgressSink, ProgressTracker};
pub use progress_plan::{ProgressPlan, ProgressRange};
pub use scheduler::{Scheduler, SchedulerStats, TickHandler};
pub use sweeper::{spawn_sweepers, SweepKind};
pub use transcoder::{FfmpegEncoder, MediaEncoder, TranscodeOrchestrator};
