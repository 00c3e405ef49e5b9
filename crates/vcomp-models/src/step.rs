//! Pipeline step labels written to the registry.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::quality::QualityTier;

/// Current pipeline phase of a job.
///
/// Advisory only: shown to observers, never used for control decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessingStep {
    Initializing,
    Validating,
    Downloading,
    CreatingPoster,
    Compressing(QualityTier),
    Finalizing,
    Completed,
}

impl ProcessingStep {
    /// Registry label, e.g. `compressing_high`.
    pub fn label(&self) -> String {
        match self {
            ProcessingStep::Compressing(tier) => format!("compressing_{}", tier.as_str()),
            other => other.static_label().to_string(),
        }
    }

    fn static_label(&self) -> &'static str {
        match self {
            ProcessingStep::Initializing => "initializing",
            ProcessingStep::Validating => "validating",
            ProcessingStep::Downloading => "downloading",
            ProcessingStep::CreatingPoster => "creating_poster",
            ProcessingStep::Compressing(_) => "compressing",
            ProcessingStep::Finalizing => "finalizing",
            ProcessingStep::Completed => "completed",
        }
    }
}

impl fmt::Display for ProcessingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
