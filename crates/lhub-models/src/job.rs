//! Upload job identity and the pipeline stage machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for an upload job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An accepted upload, owned by the orchestrator for the lifetime of the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    pub id: JobId,
    /// Declared content type of the video part
    pub mimetype: String,
    /// Filename as submitted by the client (unsanitized)
    pub original_filename: String,
    /// Declared size in bytes, when the caller knows it up front
    pub declared_size: Option<u64>,
    /// Job-scoped staging directory
    pub staging_dir: PathBuf,
    pub received_at: DateTime<Utc>,
}

/// Stage of a sign ingest job.
///
/// Stages advance strictly in declaration order. `FramesExtracted` and
/// `PoseScored` are only visited when pose validation is enabled, and
/// `Failed` is reachable from every non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Received,
    Staged,
    Normalized,
    BackgroundTreated,
    ThumbnailReady,
    FramesExtracted,
    PoseScored,
    Published,
    Persisted,
    CleanedUp,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Received => "received",
            PipelineStage::Staged => "staged",
            PipelineStage::Normalized => "normalized",
            PipelineStage::BackgroundTreated => "background_treated",
            PipelineStage::ThumbnailReady => "thumbnail_ready",
            PipelineStage::FramesExtracted => "frames_extracted",
            PipelineStage::PoseScored => "pose_scored",
            PipelineStage::Published => "published",
            PipelineStage::Persisted => "persisted",
            PipelineStage::CleanedUp => "cleaned_up",
            PipelineStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::CleanedUp | PipelineStage::Failed)
    }

    /// The stage that must follow this one on the success path.
    pub fn next(&self, pose_validation: bool) -> Option<PipelineStage> {
        use PipelineStage::*;
        match self {
            Received => Some(Staged),
            Staged => Some(Normalized),
            Normalized => Some(BackgroundTreated),
            BackgroundTreated => Some(ThumbnailReady),
            ThumbnailReady if pose_validation => Some(FramesExtracted),
            ThumbnailReady => Some(Published),
            FramesExtracted => Some(PoseScored),
            PoseScored => Some(Published),
            Published => Some(Persisted),
            Persisted => Some(CleanedUp),
            CleanedUp | Failed => None,
        }
    }

    /// Whether `to` is a legal transition from this stage.
    pub fn can_transition_to(&self, to: PipelineStage, pose_validation: bool) -> bool {
        if self.is_terminal() {
            return false;
        }
        if to == PipelineStage::Failed {
            return true;
        }
        self.next(pose_validation) == Some(to)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
