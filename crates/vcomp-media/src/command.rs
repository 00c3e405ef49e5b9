//! FFmpeg command builder and runner.

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// Capacity of the per-run event channel. Progress events beyond it are dropped.
const EVENT_CHANNEL_CAPACITY: usize = 32;
/// Non-progress stderr lines kept for error reporting.
const STDERR_TAIL_LINES: usize = 20;

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Arguments placed before -i
    input_args: Vec<String>,
    /// Arguments placed after -i
    output_args: Vec<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Seek before opening the input.
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Write exactly one video frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-frames:v").output_arg("1")
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Machine-readable progress on stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Event emitted by a running encoder.
#[derive(Debug)]
pub enum EncoderEvent {
    /// Periodic progress report. May be dropped under back-pressure.
    Progress(FfmpegProgress),
    /// Terminal outcome; always the last event of a run.
    Finished(MediaResult<()>),
}

/// Handle to one running FFmpeg process.
#[derive(Debug)]
pub struct EncoderSession {
    events: mpsc::Receiver<EncoderEvent>,
}

impl EncoderSession {
    /// Wrap an event stream produced by something other than [`FfmpegRunner`].
    pub fn new(events: mpsc::Receiver<EncoderEvent>) -> Self {
        Self { events }
    }

    /// Next event, or `None` once the run is over and drained.
    pub async fn next_event(&mut self) -> Option<EncoderEvent> {
        self.events.recv().await
    }

    /// Wait for the terminal event, discarding progress.
    pub async fn wait(mut self) -> MediaResult<()> {
        while let Some(event) = self.events.recv().await {
            if let EncoderEvent::Finished(result) = event {
                return result;
            }
        }
        Err(MediaError::internal("encoder exited without reporting a result"))
    }
}

/// Runner for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    binary: String,
    timeout_secs: Option<u64>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegRunner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout_secs: None,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Run a command to completion.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.spawn(cmd)?.wait().await
    }

    /// Start a command and return its event stream.
    ///
    /// Progress events are sent with `try_send` so a slow consumer never
    /// stalls the encoder; the terminal [`EncoderEvent::Finished`] is always
    /// delivered.
    pub fn spawn(&self, cmd: &FfmpegCommand) -> MediaResult<EncoderSession> {
        let args = cmd.build_args();
        debug!("Running FFmpeg: {} {}", self.binary, args.join(" "));

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => MediaError::FfmpegNotFound(self.binary.clone()),
                _ => MediaError::Io(e),
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let timeout_secs = self.timeout_secs;

        tokio::spawn(async move {
            let reader = tokio::spawn(read_stderr(stderr, tx.clone()));

            let status = wait_for_completion(&mut child, timeout_secs).await;
            let tail = reader.await.unwrap_or_default();

            let result = match status {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => Err(MediaError::ffmpeg_failed(
                    "FFmpeg exited with non-zero status",
                    (!tail.is_empty()).then(|| tail.join("\n")),
                    status.code(),
                )),
                Err(e) => Err(e),
            };

            // Receiver may already be gone; nothing left to report to.
            let _ = tx.send(EncoderEvent::Finished(result)).await;
        });

        Ok(EncoderSession { events: rx })
    }
}

/// Wait for the child, killing it if the timeout elapses.
async fn wait_for_completion(child: &mut Child, timeout_secs: Option<u64>) -> MediaResult<ExitStatus> {
    let Some(secs) = timeout_secs else {
        return Ok(child.wait().await?);
    };

    match tokio::time::timeout(Duration::from_secs(secs), child.wait()).await {
        Ok(status) => Ok(status?),
        Err(_) => {
            warn!("FFmpeg timed out after {} seconds, killing process", secs);
            let _ = child.kill().await;
            Err(MediaError::Timeout(secs))
        }
    }
}

/// Forward progress reports and collect the tail of everything else.
async fn read_stderr<R>(stderr: R, tx: mpsc::Sender<EncoderEvent>) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    let mut current = FfmpegProgress::default();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    // Byte-wise so a non-UTF-8 line never stops the pipe from draining
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to read FFmpeg stderr: {}", e);
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf);

        if is_progress_field(&line) {
            if let Some(progress) = parse_progress_line(&line, &mut current) {
                let _ = tx.try_send(EncoderEvent::Progress(progress));
            }
            continue;
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line.to_string());
    }

    tail.into()
}

/// `key=value` lines written by `-progress`.
fn is_progress_field(line: &str) -> bool {
    match line.trim().split_once('=') {
        Some((key, value)) => {
            !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// Fold one `-progress` line into `current`.
///
/// Returns a snapshot when a report block ends (`progress=continue|end`).
fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;

    match key {
        "out_time_us" => {
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        // Despite the name, FFmpeg reports microseconds here too
        "out_time_ms" => {
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "out_time" => {
            current.out_time = value.to_string();
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                current.fps = fps;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return Some(current.clone());
        }
        _ => {}
    }

    None
}

/// Resolve the FFmpeg binary.
pub fn check_ffmpeg(binary: &str) -> MediaResult<PathBuf> {
    which::which(binary).map_err(|_| MediaError::FfmpegNotFound(binary.to_string()))
}

/// Resolve the FFprobe binary.
pub fn check_ffprobe(binary: &str) -> MediaResult<PathBuf> {
    which::which(binary).map_err(|_| MediaError::FfprobeNotFound(binary.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "poster.jpg")
            .seek(12.5)
            .single_frame()
            .video_filter("scale=1280:720");

        let args = cmd.build_args();
        assert_eq!(&args[..6], ["-y", "-v", "error", "-progress", "pipe:2", "-ss"]);
        assert_eq!(args[6], "12.500");
        assert_eq!(args[7], "-i");
        assert_eq!(args[8], "input.mp4");
        assert_eq!(
            &args[9..],
            ["-frames:v", "1", "-vf", "scale=1280:720", "poster.jpg"]
        );
    }

    #[test]
    fn test_progress_parsing() {
        let mut progress = FfmpegProgress::default();

        assert!(parse_progress_line("out_time_us=5000000", &mut progress).is_none());
        assert_eq!(progress.out_time_ms, 5000);

        parse_progress_line("speed=1.5x", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        parse_progress_line("speed=N/A", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        let result = parse_progress_line("progress=end", &mut progress);
        assert!(result.is_some());
        assert!(progress.is_complete);
    }

    #[test]
    fn test_progress_field_detection() {
        assert!(is_progress_field("out_time=00:00:01.000000"));
        assert!(is_progress_field("stream_0_0_q=28.0"));
        assert!(is_progress_field("bitrate=N/A"));
        assert!(!is_progress_field("Error opening input: No such file or directory"));
        assert!(!is_progress_field("[libx264 @ 0x1] crf=23 is fine"));
    }

    #[tokio::test]
    async fn test_read_stderr_forwards_progress_and_keeps_tail() {
        let stderr: &[u8] = b"frame=10\nout_time_us=2000000\nprogress=continue\n\
            [hls @ 0x55] Opening 'segment000.ts' for writing\n\
            Conversion failed!\n\
            out_time_us=4000000\nprogress=end\n";
        let (tx, mut rx) = mpsc::channel(8);

        let tail = read_stderr(stderr, tx).await;

        assert_eq!(
            tail,
            vec![
                "[hls @ 0x55] Opening 'segment000.ts' for writing".to_string(),
                "Conversion failed!".to_string(),
            ]
        );

        let mut reports = Vec::new();
        while let Some(EncoderEvent::Progress(p)) = rx.recv().await {
            reports.push(p);
        }
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].out_time_ms, 2000);
        assert_eq!(reports[0].frame, 10);
        assert!(reports[1].is_complete);
    }

    #[tokio::test]
    async fn test_read_stderr_continues_past_invalid_utf8() {
        let stderr: &[u8] = b"[mp4 @ 0x1] title=\xff\xfe broken\n\
            out_time_us=1000000\nprogress=continue\n\
            Conversion failed!\n";
        let (tx, mut rx) = mpsc::channel(8);

        let tail = read_stderr(stderr, tx).await;

        assert_eq!(tail.len(), 2);
        assert!(tail[0].starts_with("[mp4 @ 0x1] title="));
        assert_eq!(tail[1], "Conversion failed!");
        assert!(matches!(
            rx.recv().await,
            Some(EncoderEvent::Progress(p)) if p.out_time_ms == 1000
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_reports_not_found() {
        let runner = FfmpegRunner::new("definitely-not-an-ffmpeg-binary");
        let cmd = FfmpegCommand::new("in.mp4", "out.mp4");
        let err = runner.run(&cmd).await.unwrap_err();
        assert!(matches!(err, MediaError::FfmpegNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_the_process() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("slow-ffmpeg");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runner = FfmpegRunner::new(script.to_string_lossy()).with_timeout(1);
        let started = std::time::Instant::now();
        let err = runner
            .run(&FfmpegCommand::new("in.mp4", "out.mp4"))
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::Timeout(1)), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_session_wait_without_finish_is_internal_error() {
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        let session = EncoderSession { events: rx };
        assert!(matches!(session.wait().await, Err(MediaError::Internal(_))));
    }
}
