//! HLS encoding configuration.

use serde::{Deserialize, Serialize};

use crate::quality::QualityProfile;

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// H.264 profile and level, chosen for broad player compatibility
pub const DEFAULT_H264_PROFILE: &str = "high";
pub const DEFAULT_H264_LEVEL: &str = "4.0";
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
pub const DEFAULT_AUDIO_CHANNELS: u8 = 2;
pub const DEFAULT_AUDIO_SAMPLE_RATE: u32 = 48_000;
/// Default HLS segment duration in seconds
pub const DEFAULT_SEGMENT_DURATION: u32 = 10;

/// File name of each tier's media playlist
pub const TIER_PLAYLIST_FILE: &str = "playlist.m3u8";
/// Segment file name pattern inside a tier directory
pub const SEGMENT_PATTERN: &str = "segment%03d.ts";

/// Poster frame settings
pub const POSTER_SCALE_FILTER: &str = "scale=1280:720:force_original_aspect_ratio=decrease";
pub const POSTER_JPEG_QUALITY: u8 = 2;
/// Relative seek position for the poster frame
pub const POSTER_SEEK_FRACTION: f64 = 0.1;

/// Settings shared by every HLS rendition.
///
/// Tier specific values (height, CRF, bitrate) come from [`QualityProfile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HlsEncodingConfig {
    #[serde(default = "default_video_codec")]
    pub codec: String,

    #[serde(default = "default_preset")]
    pub preset: String,

    #[serde(default = "default_profile")]
    pub h264_profile: String,

    #[serde(default = "default_level")]
    pub h264_level: String,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    #[serde(default = "default_audio_channels")]
    pub audio_channels: u8,

    #[serde(default = "default_audio_sample_rate")]
    pub audio_sample_rate: u32,

    /// Target segment length in seconds
    #[serde(default = "default_segment_duration")]
    pub segment_duration: u32,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_profile() -> String {
    DEFAULT_H264_PROFILE.to_string()
}
fn default_level() -> String {
    DEFAULT_H264_LEVEL.to_string()
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}
fn default_audio_channels() -> u8 {
    DEFAULT_AUDIO_CHANNELS
}
fn default_audio_sample_rate() -> u32 {
    DEFAULT_AUDIO_SAMPLE_RATE
}
fn default_segment_duration() -> u32 {
    DEFAULT_SEGMENT_DURATION
}

impl Default for HlsEncodingConfig {
    fn default() -> Self {
        Self {
            codec: default_video_codec(),
            preset: default_preset(),
            h264_profile: default_profile(),
            h264_level: default_level(),
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            audio_channels: DEFAULT_AUDIO_CHANNELS,
            audio_sample_rate: DEFAULT_AUDIO_SAMPLE_RATE,
            segment_duration: DEFAULT_SEGMENT_DURATION,
        }
    }
}

impl HlsEncodingConfig {
    pub fn with_audio_bitrate(mut self, bitrate: impl Into<String>) -> Self {
        self.audio_bitrate = bitrate.into();
        self
    }

    pub fn with_segment_duration(mut self, seconds: u32) -> Self {
        self.segment_duration = seconds.max(1);
        self
    }

    /// FFmpeg output arguments for one rendition.
    ///
    /// Stops before the segment filename and output playlist, which depend on
    /// where the rendition is written.
    pub fn to_ffmpeg_args(&self, profile: &QualityProfile) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-crf".to_string(),
            profile.crf.to_string(),
            "-preset".to_string(),
            self.preset.clone(),
            "-profile:v".to_string(),
            self.h264_profile.clone(),
            "-level".to_string(),
            self.h264_level.clone(),
            "-vf".to_string(),
            format!("scale=-2:{}", profile.height),
        ];

        // Cap the CRF encode at the tier bitrate
        if let Some(bufsize) = profile.buffer_size() {
            args.extend_from_slice(&[
                "-maxrate".to_string(),
                profile.video_bitrate.clone(),
                "-bufsize".to_string(),
                bufsize,
            ]);
        }

        args.extend_from_slice(&[
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            "-ac".to_string(),
            self.audio_channels.to_string(),
            "-ar".to_string(),
            self.audio_sample_rate.to_string(),
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            self.segment_duration.to_string(),
            "-hls_playlist_type".to_string(),
            "vod".to_string(),
            "-hls_segment_type".to_string(),
            "mpegts".to_string(),
        ]);

        args
    }
}
