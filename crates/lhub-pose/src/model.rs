//! Landmark model seam and its configuration.

use image::RgbImage;
use std::path::PathBuf;
use std::sync::Arc;

use lhub_models::Landmark;

use crate::error::PoseResult;

/// Default model location, relative to the working directory.
pub const DEFAULT_MODEL_PATH: &str = "models/pose/pose_landmark_full.onnx";

/// Body landmarks in the BlazePose topology (auxiliary points excluded).
pub const BODY_LANDMARK_COUNT: usize = 33;

/// Runs landmark inference on a decoded image.
///
/// Returns `Ok(None)` when no person is present. Landmark coordinates are
/// normalized to the input image.
pub trait LandmarkModel: Send + Sync {
    fn infer(&self, image: &RgbImage) -> PoseResult<Option<Vec<Landmark>>>;
}

/// Produces the model on first use. Called at most once per estimator.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> PoseResult<Arc<dyn LandmarkModel>>;
}

/// Pose model configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseModelConfig {
    pub model_path: PathBuf,
    /// Square input edge in pixels
    pub input_size: u32,
    /// Output holding `[x, y, z, visibility, presence]` per landmark
    pub landmarks_output: String,
    /// Output holding the person-presence score
    pub presence_output: String,
    pub presence_threshold: f32,
    pub intra_threads: usize,
}

impl Default for PoseModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            input_size: 256,
            landmarks_output: "Identity".to_string(),
            presence_output: "Identity_1".to_string(),
            presence_threshold: 0.5,
            intra_threads: 1,
        }
    }
}

impl PoseModelConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model_path: std::env::var("POSE_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            input_size: std::env::var("POSE_MODEL_INPUT_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.input_size),
            landmarks_output: std::env::var("POSE_MODEL_LANDMARKS_OUTPUT")
                .unwrap_or(defaults.landmarks_output),
            presence_output: std::env::var("POSE_MODEL_PRESENCE_OUTPUT")
                .unwrap_or(defaults.presence_output),
            presence_threshold: std::env::var("POSE_PRESENCE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.presence_threshold),
            intra_threads: std::env::var("POSE_MODEL_THREADS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.intra_threads),
        }
    }
}
