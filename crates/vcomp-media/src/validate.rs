//! Lightweight remote check of a source URL before committing resources.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::download::http_client;
use crate::error::{error_chain, MediaError, MediaResult};

pub const DEFAULT_VALIDATION_TIMEOUT_SECS: u64 = 10;

/// Accepted container extensions.
pub const ALLOWED_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm", "flv"];

/// Accepted declared content types (substring match).
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "video/mp4",
    "video/quicktime",
    "video/x-msvideo",
    "video/x-matroska",
    "video/webm",
    "video/x-flv",
];

/// What the probe learned about an accepted source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSource {
    pub extension: Option<String>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

/// Checks a source URL with a HEAD request.
#[derive(Debug, Clone)]
pub struct SourceValidator {
    client: Client,
}

impl SourceValidator {
    pub fn new(timeout_secs: u64, max_redirects: usize) -> MediaResult<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(timeout_secs), max_redirects)?,
        })
    }

    /// Accept when the URL extension or the declared content type is a known
    /// video format. A failed probe rejects.
    pub async fn validate(&self, source_url: &str) -> MediaResult<ValidatedSource> {
        let url = Url::parse(source_url)
            .map_err(|e| MediaError::InvalidUrl(format!("{source_url}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(MediaError::InvalidUrl(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }

        let extension = url_extension(&url);

        let response = self
            .client
            .head(url.clone())
            .send()
            .await
            .map_err(|e| MediaError::source_unreachable(error_chain(&e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::source_unreachable(format!(
                "probe returned HTTP {status}"
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_ascii_lowercase());
        let content_length = response.content_length();

        let extension_ok = extension
            .as_deref()
            .is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext));
        let content_type_ok = content_type
            .as_deref()
            .is_some_and(|ct| ALLOWED_MIME_TYPES.iter().any(|m| ct.contains(m)));

        debug!(
            extension = ?extension,
            content_type = ?content_type,
            extension_ok,
            content_type_ok,
            "Source probe finished"
        );

        if !extension_ok && !content_type_ok {
            return Err(MediaError::unsupported_format(format!(
                "extension {}, content type {}; allowed: {}",
                extension.as_deref().unwrap_or("<none>"),
                content_type.as_deref().unwrap_or("<none>"),
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }

        info!(url = %url, "Source accepted");
        Ok(ValidatedSource {
            extension,
            content_type,
            content_length,
        })
    }
}

/// Lowercased extension of the last path segment; query and fragment excluded.
fn url_extension(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.next_back()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
