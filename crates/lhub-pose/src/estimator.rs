//! Pose estimator with a lazily loaded, process-wide model handle.

use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use lhub_models::{PoseEstimate, VideoValidity};

use crate::error::{PoseError, PoseResult};
use crate::heuristics::{self, ValidityTally};
use crate::model::{LandmarkModel, ModelLoader};

/// Per-frame results plus the aggregate verdict.
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    /// One entry per input frame; `None` where detection failed
    pub estimates: Vec<Option<PoseEstimate>>,
    pub validity: VideoValidity,
}

impl FrameAnalysis {
    /// Estimate for the middle sampled frame, if it succeeded.
    pub fn middle(&self) -> Option<&PoseEstimate> {
        if self.estimates.is_empty() {
            return None;
        }
        self.estimates[self.estimates.len() / 2].as_ref()
    }
}

/// Owns the landmark model; jobs borrow it for the duration of a detection.
pub struct PoseEstimator {
    loader: Arc<dyn ModelLoader>,
    model: OnceCell<Arc<dyn LandmarkModel>>,
}

impl PoseEstimator {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            model: OnceCell::new(),
        }
    }

    /// Estimator around an already-loaded model.
    pub fn with_model(model: Arc<dyn LandmarkModel>) -> Self {
        struct Preloaded(Arc<dyn LandmarkModel>);
        impl ModelLoader for Preloaded {
            fn load(&self) -> PoseResult<Arc<dyn LandmarkModel>> {
                Ok(self.0.clone())
            }
        }
        Self::new(Arc::new(Preloaded(model)))
    }

    pub fn is_initialized(&self) -> bool {
        self.model.initialized()
    }

    /// Load the model once; concurrent callers wait for the same load.
    /// A failed load is not cached.
    pub async fn initialize(&self) -> PoseResult<Arc<dyn LandmarkModel>> {
        let model = self
            .model
            .get_or_try_init(|| async {
                let loader = self.loader.clone();
                let model = tokio::task::spawn_blocking(move || loader.load())
                    .await
                    .map_err(|e| PoseError::internal(format!("model load task: {e}")))??;
                info!("Pose model initialized");
                Ok::<_, PoseError>(model)
            })
            .await?;
        Ok(model.clone())
    }

    /// Decode an image and estimate the pose in it.
    ///
    /// No person found is a zero-confidence invalid estimate, not an error.
    pub async fn detect_pose(&self, image_path: &Path) -> PoseResult<PoseEstimate> {
        let model = self.initialize().await?;
        let path = image_path.to_path_buf();

        let landmarks = tokio::task::spawn_blocking(move || {
            let image = decode_image(&path)?;
            model.infer(&image)
        })
        .await
        .map_err(|e| PoseError::internal(format!("inference task: {e}")))??;

        Ok(heuristics::estimate(landmarks))
    }

    /// Score every frame and aggregate into a video verdict.
    pub async fn analyze_frames(&self, frame_paths: &[PathBuf]) -> PoseResult<VideoValidity> {
        Ok(self.analyze_frames_detailed(frame_paths).await?.validity)
    }

    /// Like [`analyze_frames`](Self::analyze_frames), keeping per-frame estimates.
    ///
    /// Per-frame failures are logged and counted as invalid. Only a model
    /// that cannot be loaded fails the batch.
    pub async fn analyze_frames_detailed(&self, frame_paths: &[PathBuf]) -> PoseResult<FrameAnalysis> {
        if !frame_paths.is_empty() {
            self.initialize().await?;
        }

        let mut tally = ValidityTally::new();
        let mut estimates = Vec::with_capacity(frame_paths.len());

        for (i, path) in frame_paths.iter().enumerate() {
            match self.detect_pose(path).await {
                Ok(estimate) => {
                    debug!(
                        frame = i + 1,
                        valid = estimate.is_valid,
                        confidence = estimate.confidence,
                        upper_body = estimate.has_upper_body,
                        "Frame analyzed"
                    );
                    tally.record(&estimate);
                    estimates.push(Some(estimate));
                }
                Err(e) => {
                    warn!(frame = i + 1, path = %path.display(), "Pose detection failed: {}", e);
                    tally.record_failure();
                    estimates.push(None);
                }
            }
        }

        let validity = tally.finish();
        info!(
            frames = validity.frames_analyzed,
            valid = validity.valid_frames,
            ratio = validity.valid_ratio,
            confidence = validity.average_confidence,
            is_valid = validity.is_valid,
            "Video pose analysis complete"
        );

        Ok(FrameAnalysis { estimates, validity })
    }
}

fn decode_image(path: &Path) -> PoseResult<RgbImage> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| PoseError::ImageDecode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}
