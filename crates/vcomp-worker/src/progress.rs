//! Step and progress reporting for a claimed job.

use std::sync::Arc;

use async_trait::async_trait;

use vcomp_models::{JobId, ProcessingStep};
use vcomp_registry::JobStore;

use crate::error::WorkerResult;
use crate::logging::JobLogger;

/// Receives `(step, progress)` updates while a job runs.
#[async_trait]
pub trait ProgressSink: Send {
    async fn report(&mut self, step: ProcessingStep, progress: u8) -> WorkerResult<()>;
}

/// Writes step and progress to the registry, never letting progress go down.
///
/// A report that changes neither the step nor the progress is not written.
pub struct ProgressTracker {
    store: Arc<dyn JobStore>,
    job_id: JobId,
    logger: JobLogger,
    step: ProcessingStep,
    written_step: ProcessingStep,
    written_progress: u8,
}

impl ProgressTracker {
    /// Tracker for a job that was just claimed (initializing, 0).
    pub fn after_claim(store: Arc<dyn JobStore>, job_id: JobId, logger: JobLogger) -> Self {
        Self {
            store,
            job_id,
            logger,
            step: ProcessingStep::Initializing,
            written_step: ProcessingStep::Initializing,
            written_progress: 0,
        }
    }

    /// Step most recently entered, written or not.
    pub fn current_step(&self) -> ProcessingStep {
        self.step
    }

    pub fn progress(&self) -> u8 {
        self.written_progress
    }
}

#[async_trait]
impl ProgressSink for ProgressTracker {
    async fn report(&mut self, step: ProcessingStep, progress: u8) -> WorkerResult<()> {
        self.step = step;

        let progress = progress.min(100).max(self.written_progress);
        if step == self.written_step && progress == self.written_progress {
            return Ok(());
        }

        self.store.advance(&self.job_id, &step, progress).await?;
        self.written_step = step;
        self.written_progress = progress;
        self.logger.log_progress(&step.label(), progress);
        Ok(())
    }
}
