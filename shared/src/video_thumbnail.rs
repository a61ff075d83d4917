use crate::config::VideoConfig;
use crate::error::DerivativeError;
use crate::types::{Artifact, OutputFormat};
use async_trait::async_trait;
use image::ImageFormat;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Lines of decoder stderr kept for the log on failure
const STDERR_TAIL_LINES: usize = 5;

/// Pulls a single still frame out of a video.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Returns JPEG bytes of the frame at `offset_secs`, scaled to fit `max_width` x `max_height`.
    async fn extract_frame(
        &self,
        video: &[u8],
        offset_secs: f64,
        max_width: u32,
        max_height: u32,
    ) -> Result<Vec<u8>, DerivativeError>;
}

/// Extracts frames by running `ffmpeg` against a temp copy of the source.
#[derive(Debug, Clone)]
pub struct FfmpegFrameExtractor {
    ffmpeg_path: String,
    timeout: Duration,
}

impl FfmpegFrameExtractor {
    pub fn new(ffmpeg_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            timeout,
        }
    }

    pub fn from_config(cfg: &VideoConfig) -> Self {
        Self::new(cfg.ffmpeg_path.clone(), cfg.timeout)
    }

    /// One ffmpeg run. `Ok(None)` means ffmpeg succeeded but produced no frame
    /// (offset past the end of the stream).
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        offset_secs: f64,
        max_width: u32,
        max_height: u32,
    ) -> Result<Option<Vec<u8>>, DerivativeError> {
        let offset = format!("{:.3}", offset_secs);
        let scale = format!(
            "scale=w={}:h={}:force_original_aspect_ratio=decrease",
            max_width, max_height
        );

        let child = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-ss", &offset, "-i"])
            .arg(input)
            .args(["-frames:v", "1", "-vf", &scale, "-f", "image2", "-c:v", "mjpeg", "-q:v", "3"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DerivativeError::TransformFailed(format!("ffmpeg spawn error: {}", e)))?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let result = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                DerivativeError::TransformFailed(format!("ffmpeg timed out after {:?}", self.timeout))
            })?
            .map_err(|e| DerivativeError::TransformFailed(format!("ffmpeg wait error: {}", e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(STDERR_TAIL_LINES).collect();
            tracing::error!(status = %result.status, stderr = ?tail, "ffmpeg frame extraction failed");
            return Err(DerivativeError::TransformFailed(format!(
                "ffmpeg exited with {}",
                result.status
            )));
        }

        match tokio::fs::read(output).await {
            Ok(bytes) if !bytes.is_empty() => Ok(Some(bytes)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DerivativeError::TransformFailed(format!(
                "Failed to read extracted frame: {}",
                e
            ))),
        }
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract_frame(
        &self,
        video: &[u8],
        offset_secs: f64,
        max_width: u32,
        max_height: u32,
    ) -> Result<Vec<u8>, DerivativeError> {
        // Removed when `workdir` drops, on every return path below.
        let workdir = tempfile::Builder::new()
            .prefix("frame-")
            .tempdir()
            .map_err(|e| DerivativeError::TransformFailed(format!("Failed to create temp dir: {}", e)))?;
        let input = workdir.path().join("source");
        let output = workdir.path().join("frame.jpg");

        tokio::fs::write(&input, video)
            .await
            .map_err(|e| DerivativeError::TransformFailed(format!("Failed to stage video: {}", e)))?;

        if let Some(frame) = self.run(&input, &output, offset_secs, max_width, max_height).await? {
            return Ok(frame);
        }

        // Clip shorter than the offset: take the first frame instead.
        if offset_secs > 0.0 {
            tracing::info!(offset_secs, "No frame at offset, retrying at start of stream");
            if let Some(frame) = self.run(&input, &output, 0.0, max_width, max_height).await? {
                return Ok(frame);
            }
        }

        Err(DerivativeError::TransformFailed(
            "Source contains no decodable video frame".to_string(),
        ))
    }
}

/// Produce the JPEG thumbnail artifact for a video source.
pub async fn thumbnail(
    video: &[u8],
    extractor: &dyn FrameExtractor,
    cfg: &VideoConfig,
) -> Result<Artifact, DerivativeError> {
    let frame = extractor
        .extract_frame(video, cfg.frame_offset_secs, cfg.max_width, cfg.max_height)
        .await?;

    match image::guess_format(&frame) {
        Ok(ImageFormat::Jpeg) => Ok(Artifact::new(frame, OutputFormat::Jpeg.content_type())),
        other => Err(DerivativeError::TransformFailed(format!(
            "Frame extractor returned non-JPEG output: {:?}",
            other
        ))),
    }
}
