//! Per-job path layout and public URLs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;
use vcomp_models::encoding::{SEGMENT_PATTERN, TIER_PLAYLIST_FILE};
use vcomp_models::{ContentId, JobOutputs, QualityTier};

use crate::error::{StorageError, StorageResult};

pub const DEFAULT_HLS_PATH: &str = "./storage/hls";
pub const DEFAULT_TEMP_PATH: &str = "./storage/temp";
pub const DEFAULT_PUBLIC_HLS_URL: &str = "http://localhost:5000/storage/hls";

pub const POSTER_FILE: &str = "poster.jpg";
pub const MASTER_PLAYLIST_FILE: &str = "master.m3u8";
const TEMP_FILE_SUFFIX: &str = "_original.mp4";

/// Storage roots and public base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Root of per-job working directories
    pub hls_root: PathBuf,
    /// Root of temp downloads
    pub temp_root: PathBuf,
    /// Base URL under which `hls_root` is served
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            hls_root: PathBuf::from(DEFAULT_HLS_PATH),
            temp_root: PathBuf::from(DEFAULT_TEMP_PATH),
            public_base_url: DEFAULT_PUBLIC_HLS_URL.to_string(),
        }
    }
}

impl StorageConfig {
    /// Create config from environment variables, defaulting anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            hls_root: std::env::var("HLS_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.hls_root),
            temp_root: std::env::var("TEMP_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_root),
            public_base_url: std::env::var("PUBLIC_HLS_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.public_base_url),
        }
    }
}

/// Deterministic paths for one worker's output and temp storage.
///
/// Path and URL methods are pure; only the `ensure_*` methods touch the
/// filesystem.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    config: StorageConfig,
}

impl StorageLayout {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn hls_root(&self) -> &Path {
        &self.config.hls_root
    }

    pub fn temp_root(&self) -> &Path {
        &self.config.temp_root
    }

    /// Validate a raw content id before any path is derived from it.
    pub fn content_id(&self, raw: &str) -> StorageResult<ContentId> {
        Ok(ContentId::parse(raw)?)
    }

    pub fn video_dir(&self, content_id: &ContentId) -> PathBuf {
        self.config.hls_root.join(content_id.as_str())
    }

    pub fn tier_dir(&self, content_id: &ContentId, tier: QualityTier) -> PathBuf {
        self.video_dir(content_id).join(tier.as_str())
    }

    pub fn poster_path(&self, content_id: &ContentId) -> PathBuf {
        self.video_dir(content_id).join(POSTER_FILE)
    }

    pub fn master_playlist_path(&self, content_id: &ContentId) -> PathBuf {
        self.video_dir(content_id).join(MASTER_PLAYLIST_FILE)
    }

    pub fn tier_playlist_path(&self, content_id: &ContentId, tier: QualityTier) -> PathBuf {
        self.tier_dir(content_id, tier).join(TIER_PLAYLIST_FILE)
    }

    pub fn tier_segment_pattern(&self, content_id: &ContentId, tier: QualityTier) -> PathBuf {
        self.tier_dir(content_id, tier).join(SEGMENT_PATTERN)
    }

    /// `{temp_root}/{content_id}_original.mp4`
    pub fn temp_file_path(&self, content_id: &ContentId) -> PathBuf {
        self.config
            .temp_root
            .join(format!("{}{}", content_id.as_str(), TEMP_FILE_SUFFIX))
    }

    /// Relative path of a tier playlist inside the working directory.
    pub fn tier_playlist_rel(tier: QualityTier) -> String {
        format!("{}/{}", tier.as_str(), TIER_PLAYLIST_FILE)
    }

    /// `{base}/{content_id}/{relative_path}`. No existence check.
    pub fn public_url(&self, content_id: &ContentId, relative_path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.public_base_url.trim_end_matches('/'),
            content_id.as_str(),
            relative_path.trim_start_matches('/')
        )
    }

    /// Public URLs for everything a completed job publishes.
    pub fn published_outputs(&self, content_id: &ContentId) -> JobOutputs {
        let quality_urls: BTreeMap<_, _> = QualityTier::ALL
            .iter()
            .map(|t| (*t, self.public_url(content_id, &Self::tier_playlist_rel(*t))))
            .collect();

        JobOutputs {
            poster_url: self.public_url(content_id, POSTER_FILE),
            master_playlist_url: self.public_url(content_id, MASTER_PLAYLIST_FILE),
            quality_urls,
        }
    }

    /// Create both storage roots. Safe to call repeatedly.
    pub async fn ensure_roots(&self) -> StorageResult<()> {
        create_dir(&self.config.hls_root).await?;
        create_dir(&self.config.temp_root).await
    }

    /// Create the working directory and every tier subdirectory.
    ///
    /// Safe to call repeatedly; returns the working directory. The directory's
    /// mtime is reset to now, since retention sweeps age it by that mtime and
    /// rewriting files inside it does not update it.
    pub async fn ensure_video_dir(&self, content_id: &ContentId) -> StorageResult<PathBuf> {
        let dir = self.video_dir(content_id);
        for tier in QualityTier::ALL {
            create_dir(&self.tier_dir(content_id, tier)).await?;
        }
        touch_dir(&dir).await?;
        debug!(path = %dir.display(), "Working directory ready");
        Ok(dir)
    }
}

async fn create_dir(path: &Path) -> StorageResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| StorageError::create_dir_failed(path, e))
}

async fn touch_dir(path: &Path) -> StorageResult<()> {
    let dir = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || std::fs::File::open(&dir)?.set_modified(SystemTime::now()))
        .await
        .map_err(std::io::Error::other)?;
    Ok(result?)
}
