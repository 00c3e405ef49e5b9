//! HLS rendition commands.

use std::path::{Path, PathBuf};

use vcomp_models::{HlsEncodingConfig, QualityProfile, QualityTier};

use crate::command::FfmpegCommand;

/// Output locations of one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlsRendition {
    pub tier: QualityTier,
    /// Tier media playlist
    pub playlist: PathBuf,
    /// `segment%03d.ts` pattern inside the tier directory
    pub segment_pattern: PathBuf,
}

/// Build the FFmpeg command producing one segmented rendition.
pub fn rendition_command(
    source: impl AsRef<Path>,
    rendition: &HlsRendition,
    profile: &QualityProfile,
    config: &HlsEncodingConfig,
) -> FfmpegCommand {
    FfmpegCommand::new(source, &rendition.playlist)
        .output_args(config.to_ffmpeg_args(profile))
        .output_arg("-hls_segment_filename")
        .output_arg(rendition.segment_pattern.to_string_lossy())
}
