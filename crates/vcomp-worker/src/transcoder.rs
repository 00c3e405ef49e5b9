//! Poster, HLS tiers and master manifest for one downloaded source.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use vcomp_media::{
    extract_poster, probe_source, rendition_command, write_master_playlist, EncoderEvent,
    EncoderSession, FfmpegRunner, HlsRendition, MediaError, MediaResult, SourceInfo,
};
use vcomp_models::{ContentId, HlsEncodingConfig, JobOutputs, ProcessingStep, QualityLadder, QualityProfile};
use vcomp_storage::StorageLayout;

use crate::error::WorkerResult;
use crate::metrics;
use crate::progress::ProgressSink;
use crate::progress_plan::ProgressPlan;

/// The encoding engine.
#[async_trait]
pub trait MediaEncoder: Send + Sync {
    async fn probe(&self, source: &Path) -> MediaResult<SourceInfo>;

    async fn extract_poster(&self, source: &Path, output: &Path, duration_secs: f64) -> MediaResult<()>;

    /// Start one rendition; progress and the outcome arrive on the session.
    fn start_rendition(
        &self,
        source: &Path,
        rendition: &HlsRendition,
        profile: &QualityProfile,
        encoding: &HlsEncodingConfig,
    ) -> MediaResult<EncoderSession>;
}

/// [`MediaEncoder`] running the `ffmpeg` and `ffprobe` binaries.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    runner: FfmpegRunner,
    ffprobe: String,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            runner: FfmpegRunner::new(ffmpeg),
            ffprobe: ffprobe.into(),
        }
    }

    /// Bound every ffmpeg run; `None` leaves runs unbounded.
    pub fn with_timeout(mut self, secs: Option<u64>) -> Self {
        if let Some(secs) = secs {
            self.runner = self.runner.with_timeout(secs);
        }
        self
    }
}

#[async_trait]
impl MediaEncoder for FfmpegEncoder {
    async fn probe(&self, source: &Path) -> MediaResult<SourceInfo> {
        probe_source(&self.ffprobe, source).await
    }

    async fn extract_poster(&self, source: &Path, output: &Path, duration_secs: f64) -> MediaResult<()> {
        extract_poster(&self.runner, source, output, duration_secs).await
    }

    fn start_rendition(
        &self,
        source: &Path,
        rendition: &HlsRendition,
        profile: &QualityProfile,
        encoding: &HlsEncodingConfig,
    ) -> MediaResult<EncoderSession> {
        self.runner
            .spawn(&rendition_command(source, rendition, profile, encoding))
    }
}

/// Runs poster extraction, every tier in ladder order, then the master manifest.
pub struct TranscodeOrchestrator {
    encoder: Arc<dyn MediaEncoder>,
    layout: StorageLayout,
    ladder: QualityLadder,
    encoding: HlsEncodingConfig,
    plan: ProgressPlan,
}

impl TranscodeOrchestrator {
    pub fn new(
        encoder: Arc<dyn MediaEncoder>,
        layout: StorageLayout,
        ladder: QualityLadder,
        encoding: HlsEncodingConfig,
    ) -> Self {
        let plan = ProgressPlan::for_ladder(&ladder);
        Self {
            encoder,
            layout,
            ladder,
            encoding,
            plan,
        }
    }

    pub fn plan(&self) -> &ProgressPlan {
        &self.plan
    }

    /// Produce every artifact for `content_id` from `source`.
    ///
    /// The first failing tier aborts the run. Tiers already written stay on
    /// disk; the master manifest is only written once all tiers succeed.
    pub async fn transcode(
        &self,
        source: &Path,
        content_id: &ContentId,
        sink: &mut dyn ProgressSink,
    ) -> WorkerResult<JobOutputs> {
        sink.report(ProcessingStep::CreatingPoster, self.plan.poster())
            .await?;
        self.layout.ensure_video_dir(content_id).await?;

        let duration_secs = match self.encoder.probe(source).await {
            Ok(info) => {
                info!(
                    duration = info.duration,
                    width = info.width,
                    height = info.height,
                    codec = %info.codec,
                    "Source probed"
                );
                info.duration
            }
            Err(e) => {
                // Percentages stay at each tier's start until it finishes.
                warn!(error = %e, "Source probe failed, continuing without duration");
                0.0
            }
        };

        let poster = self.layout.poster_path(content_id);
        self.encoder
            .extract_poster(source, &poster, duration_secs)
            .await?;

        let duration_ms = (duration_secs * 1000.0).round() as i64;
        for profile in self.ladder.iter() {
            self.encode_tier(source, content_id, profile, duration_ms, sink)
                .await?;
        }

        sink.report(ProcessingStep::Finalizing, self.plan.finalizing())
            .await?;
        write_master_playlist(self.layout.master_playlist_path(content_id), &self.ladder).await?;

        Ok(self.layout.published_outputs(content_id))
    }

    async fn encode_tier(
        &self,
        source: &Path,
        content_id: &ContentId,
        profile: &QualityProfile,
        duration_ms: i64,
        sink: &mut dyn ProgressSink,
    ) -> WorkerResult<()> {
        let tier = profile.tier;
        let step = ProcessingStep::Compressing(tier);
        let range = self.plan.tier(tier);
        sink.report(step, range.start).await?;

        let rendition = HlsRendition {
            tier,
            playlist: self.layout.tier_playlist_path(content_id, tier),
            segment_pattern: self.layout.tier_segment_pattern(content_id, tier),
        };

        info!(tier = %tier, height = profile.height, crf = profile.crf, "Encoding tier");
        let started = Instant::now();
        let mut session = self
            .encoder
            .start_rendition(source, &rendition, profile, &self.encoding)?;

        let mut last_percent = None;
        loop {
            match session.next_event().await {
                Some(EncoderEvent::Progress(progress)) => {
                    let percent = progress.percent(duration_ms);
                    if last_percent != Some(percent) {
                        last_percent = Some(percent);
                        sink.report(step, range.scale(percent)).await?;
                    }
                }
                Some(EncoderEvent::Finished(result)) => {
                    result?;
                    break;
                }
                None => {
                    return Err(MediaError::internal("encoder exited without reporting a result").into());
                }
            }
        }

        let elapsed = started.elapsed().as_secs_f64();
        metrics::record_encode_duration(tier.as_str(), elapsed);
        info!(tier = %tier, elapsed_secs = elapsed, "Tier encoded");

        sink.report(step, range.end).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use vcomp_models::QualityTier;
    use vcomp_storage::StorageConfig;

    use crate::testing::FakeEncoder;

    /// Records every report without writing anywhere.
    #[derive(Default)]
    struct RecordingSink {
        reports: Vec<(ProcessingStep, u8)>,
    }

    #[async_trait]
    impl ProgressSink for RecordingSink {
        async fn report(&mut self, step: ProcessingStep, progress: u8) -> WorkerResult<()> {
            self.reports.push((step, progress));
            Ok(())
        }
    }

    fn orchestrator(dir: &TempDir, encoder: Arc<FakeEncoder>) -> TranscodeOrchestrator {
        let layout = StorageLayout::new(StorageConfig {
            hls_root: dir.path().join("hls"),
            temp_root: dir.path().join("temp"),
            public_base_url: "https://cdn.example.com/hls".to_string(),
        });
        TranscodeOrchestrator::new(
            encoder,
            layout,
            QualityLadder::default(),
            HlsEncodingConfig::default(),
        )
    }

    fn source(dir: &TempDir) -> PathBuf {
        dir.path().join("temp").join("post-1_original.mp4")
    }

    #[tokio::test]
    async fn test_progress_walks_the_plan() {
        let dir = TempDir::new().unwrap();
        let encoder = Arc::new(FakeEncoder::new(20.0));
        let orchestrator = orchestrator(&dir, encoder.clone());
        let content_id = ContentId::parse("post-1").unwrap();
        let mut sink = RecordingSink::default();

        let outputs = orchestrator
            .transcode(&source(&dir), &content_id, &mut sink)
            .await
            .unwrap();

        assert!(outputs.is_complete());
        assert_eq!(encoder.started(), QualityTier::ALL.to_vec());
        assert_eq!(
            outputs.master_playlist_url,
            "https://cdn.example.com/hls/post-1/master.m3u8"
        );

        let values: Vec<u8> = sink.reports.iter().map(|(_, p)| *p).collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]), "{values:?}");
        assert_eq!(sink.reports.first(), Some(&(ProcessingStep::CreatingPoster, 5)));
        assert_eq!(sink.reports.last(), Some(&(ProcessingStep::Finalizing, 95)));

        // Tier boundaries are reported as each tier starts and ends.
        for (step, value) in [
            (ProcessingStep::Compressing(QualityTier::High), 10),
            (ProcessingStep::Compressing(QualityTier::High), 38),
            (ProcessingStep::Compressing(QualityTier::Medium), 67),
            (ProcessingStep::Compressing(QualityTier::Low), 95),
        ] {
            assert!(sink.reports.contains(&(step, value)), "missing {step} {value}");
        }

        let hls = dir.path().join("hls").join("post-1");
        assert!(hls.join("poster.jpg").exists());
        let master = tokio::fs::read_to_string(hls.join("master.m3u8")).await.unwrap();
        assert!(master.starts_with("#EXTM3U\n#EXT-X-VERSION:3\n"));
        assert!(master.ends_with("low/playlist.m3u8"));
    }

    #[tokio::test]
    async fn test_failed_tier_aborts_without_manifest() {
        let dir = TempDir::new().unwrap();
        let encoder = Arc::new(FakeEncoder::new(20.0).failing_tier(QualityTier::Medium));
        let orchestrator = orchestrator(&dir, encoder.clone());
        let content_id = ContentId::parse("post-1").unwrap();
        let mut sink = RecordingSink::default();

        let err = orchestrator
            .transcode(&source(&dir), &content_id, &mut sink)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Conversion failed!"));
        assert_eq!(encoder.started(), vec![QualityTier::High, QualityTier::Medium]);
        assert_eq!(
            sink.reports.last().map(|(step, _)| *step),
            Some(ProcessingStep::Compressing(QualityTier::Medium))
        );
        assert!(sink.reports.iter().all(|(_, p)| *p < 67));

        let hls = dir.path().join("hls").join("post-1");
        assert!(hls.join("high").join("playlist.m3u8").exists());
        assert!(!hls.join("master.m3u8").exists());
    }

    #[tokio::test]
    async fn test_probe_failure_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let orchestrator = orchestrator(&dir, Arc::new(FakeEncoder::new(20.0).failing_probe()));
        let content_id = ContentId::parse("post-1").unwrap();
        let mut sink = RecordingSink::default();

        let outputs = orchestrator
            .transcode(&source(&dir), &content_id, &mut sink)
            .await
            .unwrap();

        assert!(outputs.is_complete());
    }
}
