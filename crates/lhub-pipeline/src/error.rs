//! Pipeline error taxonomy.

use thiserror::Error;

use lhub_media::MediaError;
use lhub_models::{PipelineStage, PoseAnalysis, ValidationError};
use lhub_pose::PoseError;
use lhub_storage::StorageError;

use crate::sink::SinkError;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Message returned when the signer is not framed from the waist up.
pub const POSE_REJECTED_MESSAGE: &str =
    "Video validation failed: Person must be visible from waist up";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Staging failed: {0}")]
    Staging(String),

    #[error("Transcode failed: {0}")]
    Transcode(#[from] MediaError),

    #[error("Pose detection failed: {0}")]
    PoseDetection(#[from] PoseError),

    #[error("{}", POSE_REJECTED_MESSAGE)]
    PoseRejected { analysis: PoseAnalysis },

    #[error("Publication failed: {0}")]
    Publication(#[from] StorageError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] SinkError),

    #[error("Invalid stage transition: {from} -> {to}")]
    InvalidTransition {
        from: PipelineStage,
        to: PipelineStage,
    },
}

impl PipelineError {
    pub fn staging(msg: impl Into<String>) -> Self {
        Self::Staging(msg.into())
    }

    pub fn publication(msg: impl Into<String>) -> Self {
        Self::Publication(StorageError::upload_failed(msg))
    }

    /// Errors whose message may be shown to the caller verbatim.
    pub fn is_caller_visible(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::PoseRejected { .. })
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Staging(_) => "staging",
            Self::Transcode(_) => "transcode",
            Self::PoseDetection(_) => "pose_detection",
            Self::PoseRejected { .. } => "pose_rejected",
            Self::Publication(_) => "publication",
            Self::Persistence(_) => "persistence",
            Self::InvalidTransition { .. } => "internal",
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        Self::Staging(e.to_string())
    }
}
