//! One job attempt: claim, validate, download, transcode, complete.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Instrument};

use vcomp_media::{Downloader, SourceValidator};
use vcomp_models::{ContentId, Job, JobOutputs, ProcessingStep};
use vcomp_registry::JobStore;
use vcomp_storage::{delete_file, InFlightGuard, InFlightPaths, StorageLayout};

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::logging::JobLogger;
use crate::metrics;
use crate::progress::{ProgressSink, ProgressTracker};
use crate::scheduler::TickHandler;
use crate::transcoder::{FfmpegEncoder, MediaEncoder, TranscodeOrchestrator};

/// How a processed job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(JobOutputs),
    /// The job was marked failed in the registry.
    Failed { step: ProcessingStep, message: String },
}

/// Downloaded source owned by one attempt.
///
/// Tracked as in flight so the temp sweep skips it. `remove` is the normal
/// path; `Drop` only covers unwinding and cancellation.
struct TempFile {
    path: PathBuf,
    removed: bool,
    _in_flight: InFlightGuard,
}

impl TempFile {
    fn new(path: PathBuf, in_flight: &InFlightPaths) -> Self {
        Self {
            _in_flight: in_flight.track(path.clone()),
            path,
            removed: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn remove(mut self) {
        match delete_file(&self.path).await {
            Ok(true) => debug!(path = %self.path.display(), "Temp file removed"),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Failed to remove temp file"),
        }
        self.removed = true;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Processes registry jobs one at a time.
pub struct JobPipeline {
    store: Arc<dyn JobStore>,
    layout: StorageLayout,
    validator: SourceValidator,
    downloader: Downloader,
    orchestrator: TranscodeOrchestrator,
    in_flight: InFlightPaths,
}

impl JobPipeline {
    /// Pipeline encoding with the configured `ffmpeg`/`ffprobe` binaries.
    pub fn from_config(config: &WorkerConfig, store: Arc<dyn JobStore>) -> WorkerResult<Self> {
        let encoder = FfmpegEncoder::new(config.ffmpeg_path.as_str(), config.ffprobe_path.as_str())
            .with_timeout(config.encode_timeout_secs);
        Self::with_encoder(config, store, Arc::new(encoder))
    }

    pub fn with_encoder(
        config: &WorkerConfig,
        store: Arc<dyn JobStore>,
        encoder: Arc<dyn MediaEncoder>,
    ) -> WorkerResult<Self> {
        let layout = StorageLayout::new(config.storage.clone());
        let orchestrator = TranscodeOrchestrator::new(
            encoder,
            layout.clone(),
            config.ladder.clone(),
            config.encoding.clone(),
        );

        Ok(Self {
            store,
            layout,
            validator: SourceValidator::new(config.validation_timeout_secs, config.max_redirects)?,
            downloader: Downloader::new(config.download_timeout_secs, config.max_redirects)?,
            orchestrator,
            in_flight: InFlightPaths::new(),
        })
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Paths of the running attempt; share with the sweepers.
    pub fn in_flight(&self) -> &InFlightPaths {
        &self.in_flight
    }

    /// Process the oldest pending job, if any.
    pub async fn poll_once(&self) -> WorkerResult<Option<JobOutcome>> {
        let Some(job) = self.store.fetch_oldest_pending(1).await?.into_iter().next() else {
            debug!("No pending jobs");
            return Ok(None);
        };

        self.process(&job).await.map(Some)
    }

    /// Run one attempt of `job` to a terminal state.
    ///
    /// Job failures are written to the registry and returned as
    /// [`JobOutcome::Failed`]. An `Err` means a registry call failed and the
    /// job was left as the last successful write put it.
    pub async fn process(&self, job: &Job) -> WorkerResult<JobOutcome> {
        let logger = JobLogger::new(&job.id, &job.content_id);
        let span = logger.create_span();
        self.process_claimed(job, logger).instrument(span).await
    }

    async fn process_claimed(&self, job: &Job, logger: JobLogger) -> WorkerResult<JobOutcome> {
        let started = Instant::now();
        logger.log_start(&job.source_url);

        self.store.claim(&job.id).await?;
        let mut tracker = ProgressTracker::after_claim(self.store.clone(), job.id.clone(), logger.clone());

        let result = self.run(job, &mut tracker).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(outputs) => {
                metrics::record_job_completed(elapsed);
                logger.log_completion(&outputs.master_playlist_url);
                Ok(JobOutcome::Completed(outputs))
            }
            Err(e) => {
                let step = tracker.current_step();
                let message = e.to_string();
                logger.log_error(&step.label(), &message);
                metrics::record_job_failed(e.kind().as_str(), elapsed);

                if e.is_registry_error() {
                    return Err(e);
                }

                self.store.fail(&job.id, &message, Some(&step)).await?;
                Ok(JobOutcome::Failed { step, message })
            }
        }
    }

    async fn run(&self, job: &Job, tracker: &mut ProgressTracker) -> WorkerResult<JobOutputs> {
        tracker.report(ProcessingStep::Validating, 0).await?;
        let content_id = self.layout.content_id(&job.content_id)?;
        self.validator.validate(&job.source_url).await?;

        let _working_dir = self.in_flight.track(self.layout.video_dir(&content_id));
        let temp = TempFile::new(self.layout.temp_file_path(&content_id), &self.in_flight);
        let result = self
            .download_and_transcode(&job.source_url, &content_id, temp.path(), tracker)
            .await;
        temp.remove().await;
        let outputs = result?;

        self.store.complete(&job.id, &outputs).await?;
        Ok(outputs)
    }

    async fn download_and_transcode(
        &self,
        url: &str,
        content_id: &ContentId,
        temp: &Path,
        tracker: &mut ProgressTracker,
    ) -> WorkerResult<JobOutputs> {
        self.download(url, temp, tracker).await?;
        self.orchestrator.transcode(temp, content_id, tracker).await
    }

    /// Stream the source to `dest`, writing coarse download progress.
    async fn download(&self, url: &str, dest: &Path, tracker: &mut ProgressTracker) -> WorkerResult<()> {
        tracker.report(ProcessingStep::Downloading, 0).await?;
        let plan = self.orchestrator.plan();

        let (tx, mut rx) = watch::channel(0u8);
        let download = self.downloader.download(url, dest, move |percent| {
            let _ = tx.send(percent);
        });
        tokio::pin!(download);

        let outcome = loop {
            tokio::select! {
                biased;
                result = &mut download => break result?,
                changed = rx.changed() => match changed {
                    Ok(()) => {
                        let percent = *rx.borrow_and_update();
                        tracker
                            .report(ProcessingStep::Downloading, plan.download(percent))
                            .await?;
                    }
                    Err(_) => break (&mut download).await?,
                },
            }
        };

        metrics::record_download(outcome.bytes, outcome.elapsed.as_secs_f64());
        info!(
            bytes = outcome.bytes,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "Source downloaded"
        );
        Ok(())
    }
}

#[async_trait]
impl TickHandler for JobPipeline {
    async fn on_tick(&self) {
        match self.poll_once().await {
            Ok(_) => {}
            Err(e) => error!(error = %e, kind = %e.kind(), "Job attempt aborted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Mutex, OnceLock};
    use std::time::{Duration, SystemTime};

    use vcomp_media::{EncoderSession, HlsRendition, MediaResult, SourceInfo};
    use vcomp_models::{HlsEncodingConfig, JobId, QualityProfile, QualityTier};
    use vcomp_storage::{StorageConfig, SweepReport};

    use crate::sweeper::{sweep_once, SweepKind};
    use crate::testing::{FakeEncoder, FakeStore, Write};

    const HOUR: Duration = Duration::from_secs(3600);
    const DAY: Duration = Duration::from_secs(86_400);

    fn backdate(path: &Path, age: Duration) {
        std::fs::File::open(path)
            .unwrap()
            .set_modified(SystemTime::now() - age)
            .unwrap();
    }

    /// Ages the job's source and working directory past both retention
    /// limits, then runs both sweeps while the job is still encoding.
    struct SweepingEncoder {
        inner: FakeEncoder,
        layout: StorageLayout,
        in_flight: OnceLock<InFlightPaths>,
        reports: Mutex<Vec<SweepReport>>,
        source_survived: AtomicBool,
    }

    impl SweepingEncoder {
        fn new(layout: StorageLayout) -> Self {
            Self {
                inner: FakeEncoder::new(30.0),
                layout,
                in_flight: OnceLock::new(),
                reports: Mutex::new(Vec::new()),
                source_survived: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl MediaEncoder for SweepingEncoder {
        async fn probe(&self, source: &Path) -> MediaResult<SourceInfo> {
            let video_dir = self.layout.hls_root().join("post-1");
            backdate(source, 2 * HOUR);
            backdate(&video_dir, 40 * DAY);

            let in_flight = self.in_flight.get().cloned().unwrap_or_default();
            let temp = sweep_once(SweepKind::TempFiles, self.layout.temp_root(), HOUR, &in_flight).await;
            let dirs = sweep_once(SweepKind::VideoDirs, self.layout.hls_root(), 30 * DAY, &in_flight).await;
            self.reports.lock().unwrap().extend([temp, dirs]);
            self.source_survived
                .store(source.exists() && video_dir.exists(), Ordering::SeqCst);

            self.inner.probe(source).await
        }

        async fn extract_poster(&self, source: &Path, output: &Path, duration_secs: f64) -> MediaResult<()> {
            self.inner.extract_poster(source, output, duration_secs).await
        }

        fn start_rendition(
            &self,
            source: &Path,
            rendition: &HlsRendition,
            profile: &QualityProfile,
            encoding: &HlsEncodingConfig,
        ) -> MediaResult<EncoderSession> {
            self.inner.start_rendition(source, rendition, profile, encoding)
        }
    }

    fn config(dir: &TempDir) -> WorkerConfig {
        WorkerConfig {
            storage: StorageConfig {
                hls_root: dir.path().join("hls"),
                temp_root: dir.path().join("temp"),
                public_base_url: "https://cdn.example.com/hls".to_string(),
            },
            download_timeout_secs: 5,
            validation_timeout_secs: 5,
            ..WorkerConfig::default()
        }
    }

    fn pipeline(dir: &TempDir, store: &Arc<FakeStore>, encoder: FakeEncoder) -> JobPipeline {
        JobPipeline::with_encoder(&config(dir), store.clone(), Arc::new(encoder)).unwrap()
    }

    async fn mount_source(server: &MockServer, route: &str, content_type: &str) {
        Mock::given(method("HEAD"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Type", content_type))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", content_type)
                    .set_body_bytes(vec![7u8; 64 * 1024]),
            )
            .mount(server)
            .await;
    }

    fn job(server: &MockServer, route: &str) -> Job {
        Job::pending(JobId::new("job-1"), "post-1", format!("{}{}", server.uri(), route))
    }

    fn temp_file(dir: &TempDir) -> PathBuf {
        dir.path().join("temp").join("post-1_original.mp4")
    }

    #[tokio::test]
    async fn test_successful_job_completes_with_all_outputs() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        mount_source(&server, "/clip.mp4", "video/mp4").await;

        let store = Arc::new(FakeStore::default());
        let outcome = pipeline(&dir, &store, FakeEncoder::new(30.0))
            .process(&job(&server, "/clip.mp4"))
            .await
            .unwrap();

        let outputs = match outcome {
            JobOutcome::Completed(outputs) => outputs,
            other => panic!("expected completion, got {other:?}"),
        };
        assert!(outputs.is_complete());

        let writes = store.writes();
        assert_eq!(writes.first(), Some(&Write::Claim("job-1".into())));
        assert_eq!(writes.last(), Some(&Write::Complete(outputs)));
        assert!(!writes.iter().any(|w| matches!(w, Write::Fail { .. })));
        assert!(writes.contains(&Write::Advance("downloading".into(), 0)));
        assert!(writes.contains(&Write::Advance("finalizing".into(), 95)));

        let progress = store.progress_values();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{progress:?}");

        assert!(!temp_file(&dir).exists());
        assert!(dir.path().join("hls/post-1/master.m3u8").exists());
    }

    #[tokio::test]
    async fn test_encoder_failure_marks_job_failed() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        mount_source(&server, "/clip.mp4", "video/mp4").await;

        let store = Arc::new(FakeStore::default());
        let encoder = FakeEncoder::new(30.0).failing_tier(QualityTier::Medium);
        let outcome = pipeline(&dir, &store, encoder)
            .process(&job(&server, "/clip.mp4"))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            JobOutcome::Failed { step: ProcessingStep::Compressing(QualityTier::Medium), .. }
        ));

        let writes = store.writes();
        let Some(Write::Fail { message, step }) = writes.last() else {
            panic!("expected a fail write last, got {writes:?}");
        };
        assert_eq!(step, "compressing_medium");
        assert!(message.contains("Conversion failed!"));
        assert!(!writes.iter().any(|w| matches!(w, Write::Complete(_))));

        assert!(!temp_file(&dir).exists());
        assert!(!dir.path().join("hls/post-1/master.m3u8").exists());
    }

    #[tokio::test]
    async fn test_unsupported_source_fails_before_download() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/notes.txt"))
            .respond_with(ResponseTemplate::new(200).insert_header("Content-Type", "text/plain"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let store = Arc::new(FakeStore::default());
        let outcome = pipeline(&dir, &store, FakeEncoder::new(30.0))
            .process(&job(&server, "/notes.txt"))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            JobOutcome::Failed { step: ProcessingStep::Validating, .. }
        ));
        assert!(matches!(
            store.writes().last(),
            Some(Write::Fail { step, message }) if step == "validating" && message.contains("Unsupported video format")
        ));
        assert!(!temp_file(&dir).exists());
    }

    #[tokio::test]
    async fn test_download_error_is_recorded_at_downloading_step() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/clip.mp4"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = Arc::new(FakeStore::default());
        let outcome = pipeline(&dir, &store, FakeEncoder::new(30.0))
            .process(&job(&server, "/clip.mp4"))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            JobOutcome::Failed { step: ProcessingStep::Downloading, .. }
        ));
        assert!(!temp_file(&dir).exists());
    }

    #[tokio::test]
    async fn test_unsafe_content_id_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FakeStore::default());
        let job = Job::pending(JobId::new("job-1"), "../escape", "http://127.0.0.1:9/a.mp4");

        let outcome = pipeline(&dir, &store, FakeEncoder::new(30.0))
            .process(&job)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            JobOutcome::Failed { step: ProcessingStep::Validating, .. }
        ));
        assert!(!dir.path().join("escape").exists());
    }

    #[tokio::test]
    async fn test_registry_failure_skips_fail_write_but_cleans_up() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        mount_source(&server, "/clip.mp4", "video/mp4").await;

        // Downloads write at most 5; the first tier starts at 10.
        let store = Arc::new(FakeStore::default().failing_advance_from(10));
        let err = pipeline(&dir, &store, FakeEncoder::new(30.0))
            .process(&job(&server, "/clip.mp4"))
            .await
            .unwrap_err();

        assert!(err.is_registry_error());
        assert!(!store.writes().iter().any(|w| matches!(w, Write::Fail { .. })));
        assert!(!temp_file(&dir).exists());
    }

    #[tokio::test]
    async fn test_sweeps_during_a_job_leave_its_files_alone() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        mount_source(&server, "/clip.mp4", "video/mp4").await;

        let config = config(&dir);
        let store = Arc::new(FakeStore::default());
        let encoder = Arc::new(SweepingEncoder::new(StorageLayout::new(config.storage.clone())));
        let pipeline = JobPipeline::with_encoder(&config, store.clone(), encoder.clone()).unwrap();
        encoder.in_flight.set(pipeline.in_flight().clone()).unwrap();

        let outcome = pipeline.process(&job(&server, "/clip.mp4")).await.unwrap();

        assert!(matches!(outcome, JobOutcome::Completed(_)));
        assert!(encoder.source_survived.load(Ordering::SeqCst));
        assert_eq!(
            *encoder.reports.lock().unwrap(),
            vec![SweepReport::default(), SweepReport::default()]
        );
        assert!(pipeline.in_flight().is_empty());
        assert!(!temp_file(&dir).exists());
    }

    #[tokio::test]
    async fn test_requeued_job_refreshes_an_expired_working_dir() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        mount_source(&server, "/clip.mp4", "video/mp4").await;

        // Output of an earlier attempt; rewriting it leaves the dir mtime alone
        let video_dir = dir.path().join("hls/post-1");
        for tier in QualityTier::ALL {
            std::fs::create_dir_all(video_dir.join(tier.as_str())).unwrap();
        }
        std::fs::write(video_dir.join("poster.jpg"), "jpeg").unwrap();
        std::fs::write(video_dir.join("master.m3u8"), "#EXTM3U").unwrap();
        backdate(&video_dir, 40 * DAY);

        let store = Arc::new(FakeStore::default());
        let outcome = pipeline(&dir, &store, FakeEncoder::new(30.0))
            .process(&job(&server, "/clip.mp4"))
            .await
            .unwrap();
        assert!(matches!(outcome, JobOutcome::Completed(_)));

        let report = sweep_once(
            SweepKind::VideoDirs,
            &dir.path().join("hls"),
            30 * DAY,
            &InFlightPaths::new(),
        )
        .await;

        assert_eq!(report, SweepReport::default());
        assert!(video_dir.join("master.m3u8").exists());
    }

    #[tokio::test]
    async fn test_poll_once_without_pending_jobs_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FakeStore::default());

        let outcome = pipeline(&dir, &store, FakeEncoder::new(30.0))
            .poll_once()
            .await
            .unwrap();

        assert!(outcome.is_none());
        assert_eq!(store.fetches(), 1);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_poll_once_processes_oldest_pending_job() {
        let dir = TempDir::new().unwrap();
        let server = MockServer::start().await;
        mount_source(&server, "/clip.mp4", "video/mp4").await;

        let store = Arc::new(FakeStore::with_pending(vec![job(&server, "/clip.mp4")]));
        let pipeline = pipeline(&dir, &store, FakeEncoder::new(30.0));

        assert!(matches!(
            pipeline.poll_once().await.unwrap(),
            Some(JobOutcome::Completed(_))
        ));
        assert!(pipeline.poll_once().await.unwrap().is_none());
    }
}
