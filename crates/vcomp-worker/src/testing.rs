//! In-memory fakes for the job store and the encoder.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use vcomp_media::{EncoderEvent, EncoderSession, FfmpegProgress, HlsRendition, MediaError, MediaResult, SourceInfo};
use vcomp_models::{HlsEncodingConfig, Job, JobId, JobOutputs, ProcessingStep, QualityProfile, QualityTier};
use vcomp_registry::{JobStore, RegistryError, RegistryResult};

/// One registry write, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Claim(String),
    Advance(String, u8),
    Complete(JobOutputs),
    Fail { message: String, step: String },
}

#[derive(Default)]
pub struct FakeStore {
    pending: Mutex<Vec<Job>>,
    writes: Mutex<Vec<Write>>,
    fetches: AtomicUsize,
    fail_advance_from: Option<u8>,
}

impl FakeStore {
    pub fn with_pending(jobs: Vec<Job>) -> Self {
        Self {
            pending: Mutex::new(jobs),
            ..Self::default()
        }
    }

    /// `advance` fails once progress reaches `progress`.
    pub fn failing_advance_from(mut self, progress: u8) -> Self {
        self.fail_advance_from = Some(progress);
        self
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Progress values in write order, claim counting as 0 and completion as 100.
    pub fn progress_values(&self) -> Vec<u8> {
        self.writes()
            .iter()
            .filter_map(|w| match w {
                Write::Claim(_) => Some(0),
                Write::Advance(_, p) => Some(*p),
                Write::Complete(_) => Some(100),
                Write::Fail { .. } => None,
            })
            .collect()
    }

    fn record(&self, write: Write) {
        self.writes.lock().unwrap().push(write);
    }
}

#[async_trait]
impl JobStore for FakeStore {
    async fn fetch_oldest_pending(&self, limit: usize) -> RegistryResult<Vec<Job>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let pending = self.pending.lock().unwrap();
        Ok(pending.iter().take(limit).cloned().collect())
    }

    async fn get(&self, id: &JobId) -> RegistryResult<Option<Job>> {
        let pending = self.pending.lock().unwrap();
        Ok(pending.iter().find(|j| &j.id == id).cloned())
    }

    async fn claim(&self, id: &JobId) -> RegistryResult<()> {
        self.pending.lock().unwrap().retain(|j| &j.id != id);
        self.record(Write::Claim(id.to_string()));
        Ok(())
    }

    async fn advance(&self, _id: &JobId, step: &ProcessingStep, progress: u8) -> RegistryResult<()> {
        if self.fail_advance_from.is_some_and(|from| progress >= from) {
            return Err(RegistryError::from_http_status(503, "registry unavailable"));
        }
        self.record(Write::Advance(step.label(), progress));
        Ok(())
    }

    async fn complete(&self, _id: &JobId, outputs: &JobOutputs) -> RegistryResult<()> {
        self.record(Write::Complete(outputs.clone()));
        Ok(())
    }

    async fn fail(&self, _id: &JobId, message: &str, step: Option<&ProcessingStep>) -> RegistryResult<()> {
        self.record(Write::Fail {
            message: message.to_string(),
            step: step.map_or_else(|| "unknown".to_string(), ProcessingStep::label),
        });
        Ok(())
    }
}

/// Encoder that writes placeholder files and reports 50% then 100% per tier.
pub struct FakeEncoder {
    duration_secs: f64,
    fail_tier: Option<QualityTier>,
    fail_probe: bool,
    started: Mutex<Vec<QualityTier>>,
}

impl FakeEncoder {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            fail_tier: None,
            fail_probe: false,
            started: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_tier(mut self, tier: QualityTier) -> Self {
        self.fail_tier = Some(tier);
        self
    }

    pub fn failing_probe(mut self) -> Self {
        self.fail_probe = true;
        self
    }

    pub fn started(&self) -> Vec<QualityTier> {
        self.started.lock().unwrap().clone()
    }

    fn progress_at(&self, fraction: f64) -> FfmpegProgress {
        FfmpegProgress {
            out_time_ms: (self.duration_secs * fraction * 1000.0) as i64,
            ..FfmpegProgress::default()
        }
    }
}

#[async_trait]
impl crate::transcoder::MediaEncoder for FakeEncoder {
    async fn probe(&self, _source: &Path) -> MediaResult<SourceInfo> {
        if self.fail_probe {
            return Err(MediaError::InvalidVideo("no streams".to_string()));
        }
        Ok(SourceInfo {
            duration: self.duration_secs,
            width: 1920,
            height: 1080,
            fps: 30.0,
            codec: "h264".to_string(),
            has_audio: true,
        })
    }

    async fn extract_poster(&self, _source: &Path, output: &Path, _duration_secs: f64) -> MediaResult<()> {
        tokio::fs::write(output, b"jpeg").await?;
        Ok(())
    }

    fn start_rendition(
        &self,
        _source: &Path,
        rendition: &HlsRendition,
        _profile: &QualityProfile,
        _encoding: &HlsEncodingConfig,
    ) -> MediaResult<EncoderSession> {
        self.started.lock().unwrap().push(rendition.tier);
        let (tx, rx) = mpsc::channel(8);

        if self.fail_tier == Some(rendition.tier) {
            let _ = tx.try_send(EncoderEvent::Progress(self.progress_at(0.25)));
            let _ = tx.try_send(EncoderEvent::Finished(Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some("Conversion failed!".to_string()),
                Some(1),
            ))));
        } else {
            std::fs::write(&rendition.playlist, "#EXTM3U\n")?;
            let _ = tx.try_send(EncoderEvent::Progress(self.progress_at(0.5)));
            let done = FfmpegProgress {
                is_complete: true,
                ..self.progress_at(1.0)
            };
            let _ = tx.try_send(EncoderEvent::Progress(done));
            let _ = tx.try_send(EncoderEvent::Finished(Ok(())));
        }

        Ok(EncoderSession::new(rx))
    }
}
