//! Local filesystem storage for the compression worker.
//!
//! This crate provides:
//! - Deterministic per-job paths for HLS output and temp downloads
//! - Public URL construction for produced artifacts
//! - Temp file deletion and age-based sweeps that skip in-flight paths

pub mod cleanup;
pub mod error;
pub mod in_flight;
pub mod layout;

pub use cleanup::{delete_dir, delete_file, sweep_temp_files, sweep_video_dirs, SweepReport};
pub use error::{StorageError, StorageResult};
pub use in_flight::{InFlightGuard, InFlightPaths};
pub use layout::{StorageConfig, StorageLayout};
