//! Streamed source download.

use std::path::Path;
use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::redirect::Policy;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{error_chain, MediaError, MediaResult};

pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_REDIRECTS: usize = 5;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("vcomp-worker/", env!("CARGO_PKG_VERSION"));

/// HTTP client with a total request timeout and bounded redirects.
pub(crate) fn http_client(timeout: Duration, max_redirects: usize) -> MediaResult<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .redirect(Policy::limited(max_redirects))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| MediaError::internal(format!("failed to build HTTP client: {e}")))
}

/// Result of a finished download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub bytes: u64,
    /// Declared `Content-Length`, when the server sent one
    pub content_length: Option<u64>,
    pub elapsed: Duration,
}

/// Streams remote sources to local files.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    timeout_secs: u64,
}

impl Downloader {
    pub fn new(timeout_secs: u64, max_redirects: usize) -> MediaResult<Self> {
        Ok(Self {
            client: http_client(Duration::from_secs(timeout_secs), max_redirects)?,
            timeout_secs,
        })
    }

    /// Download `url` into `dest`.
    ///
    /// `on_progress` receives whole percentages of the declared length, once
    /// per change; it is never called when the length is unknown. A partial
    /// file is left in place on error.
    pub async fn download<F>(&self, url: &str, dest: &Path, mut on_progress: F) -> MediaResult<DownloadOutcome>
    where
        F: FnMut(u8) + Send,
    {
        let started = Instant::now();
        debug!(url = %url, dest = %dest.display(), "Starting download");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::download_failed(format!(
                "server responded with HTTP {status}"
            )));
        }

        let content_length = response.content_length().filter(|len| *len > 0);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(dest).await?;

        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut last_percent: Option<u8> = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.transport_error(e))?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;

            if let Some(total) = content_length {
                let percent = (downloaded.saturating_mul(100) / total).min(100) as u8;
                if last_percent != Some(percent) {
                    last_percent = Some(percent);
                    on_progress(percent);
                }
            }
        }

        file.flush().await?;

        let outcome = DownloadOutcome {
            bytes: downloaded,
            content_length,
            elapsed: started.elapsed(),
        };
        info!(
            bytes = outcome.bytes,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Download complete"
        );
        Ok(outcome)
    }

    fn transport_error(&self, e: reqwest::Error) -> MediaError {
        if e.is_timeout() {
            MediaError::DownloadTimeout(self.timeout_secs)
        } else if e.is_redirect() {
            MediaError::download_failed(format!("too many redirects: {}", error_chain(&e)))
        } else {
            MediaError::download_failed(error_chain(&e))
        }
    }
}
