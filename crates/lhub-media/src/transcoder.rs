//! Transcoding engine: one external process per stage.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

use lhub_models::encoding::FALLBACK_FRAME_RATE;
use lhub_models::EncodingConfig;

use crate::background::BackgroundTreatment;
use crate::command::{
    resolve_tool, FfmpegCommand, ProcessInvocation, ProcessOutput, ProcessRunner,
    TokioProcessRunner,
};
use crate::error::{MediaError, MediaResult};
use crate::filters;
use crate::probe::{self, MediaInfo};

/// Default per-process timeout.
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(600);

/// File name prefix and pattern for sampled frames.
pub const FRAME_PREFIX: &str = "frame-";
const FRAME_PATTERN: &str = "frame-%03d.jpg";

/// Wraps FFmpeg/FFprobe behind a [`ProcessRunner`].
#[derive(Clone)]
pub struct Transcoder {
    runner: Arc<dyn ProcessRunner>,
    encoding: EncodingConfig,
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for Transcoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcoder")
            .field("encoding", &self.encoding)
            .field("ffmpeg", &self.ffmpeg)
            .field("ffprobe", &self.ffprobe)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Transcoder {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            runner,
            encoding: EncodingConfig::default(),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            timeout: Some(DEFAULT_PROCESS_TIMEOUT),
        }
    }

    /// Transcoder running the system binaries through `tokio::process`.
    pub fn system() -> Self {
        Self::new(Arc::new(TokioProcessRunner::new()))
    }

    pub fn with_tool_paths(mut self, ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self.ffprobe = ffprobe.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve the configured FFmpeg and FFprobe binaries.
    pub fn check_tools(&self) -> MediaResult<()> {
        let ffmpeg = resolve_tool(&self.ffmpeg)?;
        let ffprobe = resolve_tool(&self.ffprobe)?;
        debug!("Using {} and {}", ffmpeg.display(), ffprobe.display());
        Ok(())
    }

    /// Re-encode to the delivery codec and container with fast-start layout.
    pub async fn normalize(&self, input: &Path, output: &Path) -> MediaResult<()> {
        ensure_input(input)?;

        let cmd = self.delivery_encode(FfmpegCommand::new(input, output));
        self.run_ffmpeg(cmd, output).await?;

        info!("Normalized {} -> {}", input.display(), output.display());
        Ok(())
    }

    /// Apply the configured background policy; output keeps the delivery codec.
    pub async fn apply_background(
        &self,
        input: &Path,
        output: &Path,
        treatment: &BackgroundTreatment,
    ) -> MediaResult<()> {
        ensure_input(input)?;

        match treatment {
            BackgroundTreatment::Passthrough => {
                if let Err(e) = fs::copy(input, output).await {
                    remove_partial(output).await;
                    return Err(e.into());
                }
            }
            BackgroundTreatment::ChromaKey {
                key_color,
                similarity,
                blend,
                fill_color,
            } => {
                let graph = filters::chroma_key_composite(key_color, *similarity, *blend, fill_color);
                let cmd = FfmpegCommand::new(input, output)
                    .filter_complex(graph)
                    .map("[out]")
                    .map("0:a?");
                self.run_ffmpeg(self.delivery_encode(cmd), output).await?;
            }
        }

        debug!(
            "Background treatment {} applied: {}",
            treatment.as_str(),
            output.display()
        );
        Ok(())
    }

    /// Capture one representative still.
    ///
    /// With a known duration the frame is taken at the midpoint; otherwise
    /// FFmpeg's representative-frame filter picks one near the start.
    pub async fn extract_thumbnail(
        &self,
        input: &Path,
        output: &Path,
        duration: Option<f64>,
    ) -> MediaResult<()> {
        ensure_input(input)?;

        let cmd = match duration.filter(|d| *d > 0.0) {
            Some(d) => FfmpegCommand::new(input, output)
                .seek(d / 2.0)
                .video_filter(filters::thumbnail_scale()),
            None => FfmpegCommand::new(input, output)
                .video_filter(filters::representative_thumbnail()),
        }
        .frames(1)
        .image_quality(2);

        self.run_ffmpeg(cmd, output).await
    }

    /// Sample up to `count` frames evenly across the video into `output_dir`.
    ///
    /// Frames are named `frame-001.jpg`, `frame-002.jpg`, ... and returned in
    /// temporal order. Unknown duration falls back to a fixed 1 fps rate.
    pub async fn extract_frames(
        &self,
        input: &Path,
        output_dir: &Path,
        count: u32,
        duration: Option<f64>,
    ) -> MediaResult<Vec<PathBuf>> {
        ensure_input(input)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let rate = sampling_rate(count, duration);
        let pattern = output_dir.join(FRAME_PATTERN);
        let cmd = FfmpegCommand::new(input, &pattern)
            .video_filter(filters::frame_sampling(rate))
            .frames(count)
            .image_quality(2);

        let invocation = cmd.into_invocation(&self.ffmpeg, self.timeout);
        if let Err(e) = self.run_checked(&invocation).await {
            for frame in list_frames(output_dir).await.unwrap_or_default() {
                remove_partial(&frame).await;
            }
            return Err(e);
        }

        let mut frames = list_frames(output_dir).await?;
        frames.truncate(count as usize);

        debug!(
            "Extracted {} frames at {:.3} fps from {}",
            frames.len(),
            rate,
            input.display()
        );
        Ok(frames)
    }

    /// Query container metadata.
    pub async fn probe(&self, input: &Path) -> MediaResult<MediaInfo> {
        ensure_input(input)?;

        let invocation = ProcessInvocation::new(&self.ffprobe)
            .args(probe::probe_args(&input.to_string_lossy()))
            .timeout(self.timeout);
        let output = self.run_checked(&invocation).await?;

        probe::parse_probe_output(output.stdout.as_bytes())
    }

    fn delivery_encode(&self, cmd: FfmpegCommand) -> FfmpegCommand {
        let cmd = cmd
            .video_codec(&self.encoding.codec)
            .preset(&self.encoding.preset)
            .crf(self.encoding.crf)
            .audio_codec(&self.encoding.audio_codec)
            .output_args(["-pix_fmt", "yuv420p"]);
        let cmd = if self.encoding.faststart {
            cmd.faststart()
        } else {
            cmd
        };
        cmd.format(&self.encoding.container)
    }

    /// Run FFmpeg for a single output file; the output is removed on any
    /// failure and must exist on success.
    async fn run_ffmpeg(&self, cmd: FfmpegCommand, output: &Path) -> MediaResult<()> {
        let invocation = cmd.into_invocation(&self.ffmpeg, self.timeout);

        if let Err(e) = self.run_checked(&invocation).await {
            remove_partial(output).await;
            return Err(e);
        }

        match fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => {
                remove_partial(output).await;
                Err(MediaError::process_failed(
                    invocation.tool_name(),
                    format!("no output written to {}", output.display()),
                    None,
                    Some(0),
                ))
            }
        }
    }

    async fn run_checked(&self, invocation: &ProcessInvocation) -> MediaResult<ProcessOutput> {
        let output = self.runner.run(invocation).await?;
        if output.is_success() {
            return Ok(output);
        }

        let tool = invocation.tool_name();
        warn!(
            exit_code = ?output.exit_code,
            stderr = %output.stderr.trim(),
            "{} exited with non-zero status",
            tool
        );
        Err(MediaError::process_failed(
            tool,
            "exited with non-zero status",
            Some(output.stderr),
            output.exit_code,
        ))
    }
}

/// Frames per second needed to spread `count` samples over `duration`.
pub fn sampling_rate(count: u32, duration: Option<f64>) -> f64 {
    match duration.filter(|d| d.is_finite() && *d > 0.0) {
        Some(d) => count as f64 / d,
        None => FALLBACK_FRAME_RATE,
    }
}

fn ensure_input(input: &Path) -> MediaResult<()> {
    if input.is_file() {
        Ok(())
    } else {
        Err(MediaError::FileNotFound(input.to_path_buf()))
    }
}

async fn remove_partial(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}

/// Sampled frames in `dir`, sorted by name (which is temporal order).
async fn list_frames(dir: &Path) -> MediaResult<Vec<PathBuf>> {
    let mut frames = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(FRAME_PREFIX) && name.ends_with(".jpg") {
            frames.push(entry.path());
        }
    }
    frames.sort();
    Ok(frames)
}
