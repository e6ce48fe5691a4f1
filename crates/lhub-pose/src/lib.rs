//! Body landmark estimation for sign videos.
//!
//! A [`PoseEstimator`] owns a lazily loaded [`LandmarkModel`] (ONNX Runtime
//! in production) and turns raw landmarks into per-frame estimates and a
//! majority-vote verdict over sampled frames.

pub mod error;
pub mod estimator;
pub mod heuristics;
pub mod model;
pub mod onnx;

pub use error::{PoseError, PoseResult};
pub use estimator::{FrameAnalysis, PoseEstimator};
pub use model::{LandmarkModel, ModelLoader, PoseModelConfig};
pub use onnx::{OrtModelLoader, OrtPoseLandmarker};
