//! Poster frame extraction.

use std::path::Path;

use vcomp_models::encoding::{POSTER_JPEG_QUALITY, POSTER_SCALE_FILTER, POSTER_SEEK_FRACTION};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;

/// Seek offset for the poster: a fixed fraction into the stream.
pub fn poster_seek_secs(duration_secs: f64) -> f64 {
    if duration_secs.is_finite() && duration_secs > 0.0 {
        duration_secs * POSTER_SEEK_FRACTION
    } else {
        0.0
    }
}

/// Build the poster extraction command.
pub fn poster_command(
    source: impl AsRef<Path>,
    output: impl AsRef<Path>,
    duration_secs: f64,
) -> FfmpegCommand {
    FfmpegCommand::new(source, output)
        .seek(poster_seek_secs(duration_secs))
        .single_frame()
        .video_filter(POSTER_SCALE_FILTER)
        .output_arg("-q:v")
        .output_arg(POSTER_JPEG_QUALITY.to_string())
}

/// Extract one JPEG frame from `source` into `output`.
pub async fn extract_poster(
    runner: &FfmpegRunner,
    source: impl AsRef<Path>,
    output: impl AsRef<Path>,
    duration_secs: f64,
) -> MediaResult<()> {
    let cmd = poster_command(source, output, duration_secs);
    runner.run(&cmd).await
}
