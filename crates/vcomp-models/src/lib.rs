//! Shared data models for the video compression worker.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs as stored in the job registry
//! - Job status and processing step labels
//! - Quality tiers and their encoding profiles
//! - HLS encoding defaults

pub mod encoding;
pub mod job;
pub mod job_status;
pub mod quality;
pub mod step;
pub mod utils;

// Re-export common types
pub use encoding::HlsEncodingConfig;
pub use job::{ContentId, ContentIdError, Job, JobId, JobOutputs};
pub use job_status::{JobStatus, ParseJobStatusError};
pub use quality::{QualityLadder, QualityProfile, QualityTier};
pub use step::ProcessingStep;
pub use utils::{truncate_error_message, MAX_ERROR_MESSAGE_CHARS};
