//! FFmpeg CLI wrapper and HTTP source I/O.
//!
//! This crate provides:
//! - FFmpeg command building and execution with a progress event channel
//! - FFprobe source inspection
//! - Poster frame extraction and HLS rendition commands
//! - Master playlist rendering
//! - Remote source validation and streamed download

pub mod command;
pub mod download;
pub mod error;
pub mod hls;
pub mod manifest;
pub mod poster;
pub mod probe;
pub mod progress;
pub mod validate;

pub use command::{
    check_ffmpeg, check_ffprobe, EncoderEvent, EncoderSession, FfmpegCommand, FfmpegRunner,
};
pub use download::{DownloadOutcome, Downloader};
pub use error::{MediaError, MediaResult};
pub use hls::{rendition_command, HlsRendition};
pub use manifest::{render_master_playlist, write_master_playlist};
pub use poster::{extract_poster, poster_command, poster_seek_secs};
pub use probe::{probe_source, SourceInfo};
pub use progress::FfmpegProgress;
pub use validate::{SourceValidator, ValidatedSource, ALLOWED_EXTENSIONS, ALLOWED_MIME_TYPES};
