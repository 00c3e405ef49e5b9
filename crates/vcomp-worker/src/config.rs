//! Worker configuration.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use vcomp_media::download::{DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_MAX_REDIRECTS};
use vcomp_media::validate::DEFAULT_VALIDATION_TIMEOUT_SECS;
use vcomp_models::encoding::{DEFAULT_AUDIO_BITRATE, DEFAULT_SEGMENT_DURATION};
use vcomp_models::{HlsEncodingConfig, QualityLadder, QualityProfile, QualityTier};
use vcomp_storage::StorageConfig;

const DEFAULT_POLL_INTERVAL_MS: u64 = 120_000;
const DEFAULT_TEMP_MAX_AGE_MS: u64 = 3_600_000;
const DEFAULT_TEMP_SWEEP_INTERVAL_MS: u64 = 3_600_000;
const DEFAULT_VIDEO_RETENTION_DAYS: u64 = 30;
const DEFAULT_VIDEO_SWEEP_INTERVAL_MS: u64 = 86_400_000;

const SECS_PER_DAY: u64 = 86_400;

/// Age-based cleanup settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupConfig {
    /// Temp files older than this are swept
    pub temp_max_age: Duration,
    pub temp_sweep_interval: Duration,
    /// Working directories older than this are swept; `None` disables the sweep
    pub video_retention: Option<Duration>,
    pub video_sweep_interval: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            temp_max_age: Duration::from_millis(DEFAULT_TEMP_MAX_AGE_MS),
            temp_sweep_interval: Duration::from_millis(DEFAULT_TEMP_SWEEP_INTERVAL_MS),
            video_retention: retention_from_days(DEFAULT_VIDEO_RETENTION_DAYS),
            video_sweep_interval: Duration::from_millis(DEFAULT_VIDEO_SWEEP_INTERVAL_MS),
        }
    }
}

fn retention_from_days(days: u64) -> Option<Duration> {
    (days > 0).then(|| Duration::from_secs(days.saturating_mul(SECS_PER_DAY)))
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Time between scheduler ticks
    pub poll_interval: Duration,
    pub storage: StorageConfig,
    pub ladder: QualityLadder,
    pub encoding: HlsEncodingConfig,
    pub cleanup: CleanupConfig,
    pub download_timeout_secs: u64,
    /// Redirect hop bound for both the source probe and the download
    pub max_redirects: usize,
    pub validation_timeout_secs: u64,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Kill an ffmpeg run after this many seconds; unbounded when unset
    pub encode_timeout_secs: Option<u64>,
    /// Prometheus listener; no exporter when unset
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            storage: StorageConfig::default(),
            ladder: QualityLadder::default(),
            encoding: HlsEncodingConfig::default(),
            cleanup: CleanupConfig::default(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            validation_timeout_secs: DEFAULT_VALIDATION_TIMEOUT_SECS,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            encode_timeout_secs: None,
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_env() -> Self {
        let encoding = HlsEncodingConfig::default()
            .with_audio_bitrate(env_string("AUDIO_BITRATE").unwrap_or_else(|| DEFAULT_AUDIO_BITRATE.to_string()))
            .with_segment_duration(env_parse("SEGMENT_DURATION").unwrap_or(DEFAULT_SEGMENT_DURATION));

        let cleanup = CleanupConfig {
            temp_max_age: env_millis("CLEANUP_TEMP_AFTER", DEFAULT_TEMP_MAX_AGE_MS),
            temp_sweep_interval: env_millis("CLEANUP_INTERVAL", DEFAULT_TEMP_SWEEP_INTERVAL_MS),
            video_retention: retention_from_days(
                env_parse("VIDEO_RETENTION_DAYS").unwrap_or(DEFAULT_VIDEO_RETENTION_DAYS),
            ),
            video_sweep_interval: env_millis("VIDEO_SWEEP_INTERVAL", DEFAULT_VIDEO_SWEEP_INTERVAL_MS),
        };

        Self {
            poll_interval: env_millis("WORKER_INTERVAL", DEFAULT_POLL_INTERVAL_MS),
            storage: StorageConfig::from_env(),
            ladder: ladder_from_env(),
            encoding,
            cleanup,
            download_timeout_secs: env_parse("DOWNLOAD_TIMEOUT_SECS")
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            max_redirects: env_parse("DOWNLOAD_MAX_REDIRECTS").unwrap_or(DEFAULT_MAX_REDIRECTS),
            validation_timeout_secs: env_parse("VALIDATION_TIMEOUT_SECS")
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_VALIDATION_TIMEOUT_SECS),
            ffmpeg_path: env_string("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
            ffprobe_path: env_string("FFPROBE_PATH").unwrap_or_else(|| "ffprobe".to_string()),
            encode_timeout_secs: env_parse("ENCODE_TIMEOUT_SECS").filter(|s| *s > 0),
            metrics_addr: env_parse("METRICS_ADDR"),
        }
    }
}

/// Tier table with `{TIER}_RESOLUTION`, `{TIER}_QUALITY_CRF`, `{TIER}_BITRATE`,
/// `{TIER}_BANDWIDTH` and `{TIER}_FRAME_SIZE` applied per field.
fn ladder_from_env() -> QualityLadder {
    QualityLadder::with_overrides(QualityTier::ALL.iter().map(|tier| {
        let prefix = tier.env_prefix();
        let mut profile = QualityProfile::default_for(*tier);

        if let Some(height) = env_parse::<u32>(&format!("{prefix}_RESOLUTION")).filter(|h| *h > 0) {
            profile.height = height;
        }
        if let Some(crf) = env_parse::<u8>(&format!("{prefix}_QUALITY_CRF")).filter(|c| *c <= 51) {
            profile.crf = crf;
        }
        if let Some(bitrate) = env_string(&format!("{prefix}_BITRATE")) {
            profile.video_bitrate = bitrate;
        }
        if let Some(bandwidth) = env_parse::<u64>(&format!("{prefix}_BANDWIDTH")).filter(|b| *b > 0) {
            profile.bandwidth = bandwidth;
        }
        if let Some((w, h)) = env_string(&format!("{prefix}_FRAME_SIZE"))
            .as_deref()
            .and_then(QualityProfile::parse_frame_size)
        {
            profile.frame_width = w;
            profile.frame_height = h;
        }

        profile
    }))
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env_string(name).and_then(|s| s.parse().ok())
}

fn env_millis(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_parse::<u64>(name).filter(|ms| *ms > 0).unwrap_or(default_ms))
}
