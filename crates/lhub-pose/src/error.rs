//! Error types for pose estimation.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for pose operations.
pub type PoseResult<T> = Result<T, PoseError>;

#[derive(Debug, Error)]
pub enum PoseError {
    #[error("Pose model not found: {0}")]
    ModelNotFound(PathBuf),

    #[error("Pose model failed to load: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Image decode failed for {path}: {message}")]
    ImageDecode { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PoseError {
    pub fn model_load(message: impl Into<String>) -> Self {
        Self::ModelLoad(message.into())
    }

    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether the model itself is unusable, as opposed to a single bad frame.
    pub fn is_model_failure(&self) -> bool {
        matches!(self, Self::ModelNotFound(_) | Self::ModelLoad(_))
    }
}
