//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use lhub_media::background::{DEFAULT_FILL_COLOR, DEFAULT_KEY_COLOR};
use lhub_media::{BackgroundTreatment, DEFAULT_PROCESS_TIMEOUT};
use lhub_models::upload::{DEFAULT_ALLOWED_VIDEO_TYPES, DEFAULT_MAX_UPLOAD_BYTES};
use lhub_models::UploadPolicy;

pub const DEFAULT_STAGING_DIR: &str = "/tmp/uploads";
pub const DEFAULT_POSE_FRAME_COUNT: u32 = 12;
pub const DEFAULT_VIDEO_FOLDER: &str = "librashub/signs";
pub const DEFAULT_THUMBNAIL_FOLDER: &str = "librashub/thumbnails";

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root under which per-job staging directories are created
    pub staging_dir: PathBuf,
    pub upload_policy: UploadPolicy,
    /// Gate publication on the pose verdict
    pub pose_validation: bool,
    /// Frames sampled for pose validation
    pub pose_frame_count: u32,
    pub background: BackgroundTreatment,
    pub video_folder: String,
    pub thumbnail_folder: String,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Per external process; `None` waits indefinitely
    pub process_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
            upload_policy: UploadPolicy::default(),
            pose_validation: false,
            pose_frame_count: DEFAULT_POSE_FRAME_COUNT,
            background: BackgroundTreatment::Passthrough,
            video_folder: DEFAULT_VIDEO_FOLDER.to_string(),
            thumbnail_folder: DEFAULT_THUMBNAIL_FOLDER.to_string(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            process_timeout: Some(DEFAULT_PROCESS_TIMEOUT),
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let allowed_types = std::env::var("ALLOWED_VIDEO_TYPES")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|t| t.trim().to_ascii_lowercase())
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|types| !types.is_empty())
            .unwrap_or_else(|| {
                DEFAULT_ALLOWED_VIDEO_TYPES
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            });

        Self {
            staging_dir: std::env::var("STAGING_DIR")
                .or_else(|_| std::env::var("TEMP_UPLOAD_DIR"))
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_STAGING_DIR)),
            upload_policy: UploadPolicy {
                allowed_types,
                max_bytes: std::env::var("MAX_FILE_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            },
            pose_validation: std::env::var("POSE_VALIDATION_ENABLED")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            pose_frame_count: std::env::var("POSE_FRAME_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_POSE_FRAME_COUNT),
            background: background_from_env(),
            video_folder: std::env::var("VIDEO_FOLDER")
                .unwrap_or_else(|_| DEFAULT_VIDEO_FOLDER.to_string()),
            thumbnail_folder: std::env::var("THUMBNAIL_FOLDER")
                .unwrap_or_else(|_| DEFAULT_THUMBNAIL_FOLDER.to_string()),
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffmpeg")),
            ffprobe_path: std::env::var("FFPROBE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffprobe")),
            process_timeout: match std::env::var("FFMPEG_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
            {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => Some(DEFAULT_PROCESS_TIMEOUT),
            },
        }
    }
}

fn background_from_env() -> BackgroundTreatment {
    let policy = std::env::var("BACKGROUND_TREATMENT").unwrap_or_default();
    if policy.is_empty() {
        return BackgroundTreatment::Passthrough;
    }

    match policy.parse::<BackgroundTreatment>() {
        Ok(BackgroundTreatment::ChromaKey { .. }) => BackgroundTreatment::chroma_key(
            std::env::var("CHROMA_KEY_COLOR").unwrap_or_else(|_| DEFAULT_KEY_COLOR.to_string()),
            std::env::var("BACKGROUND_FILL_COLOR")
                .unwrap_or_else(|_| DEFAULT_FILL_COLOR.to_string()),
        ),
        Ok(treatment) => treatment,
        Err(e) => {
            warn!("{}, falling back to passthrough", e);
            BackgroundTreatment::Passthrough
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.staging_dir, PathBuf::from("/tmp/uploads"));
        assert_eq!(config.upload_policy.max_bytes, 100 * 1024 * 1024);
        assert!(!config.pose_validation);
        assert_eq!(config.pose_frame_count, 12);
        assert_eq!(config.background, BackgroundTreatment::Passthrough);
        assert_eq!(config.process_timeout, Some(Duration::from_secs(600)));
    }
}
