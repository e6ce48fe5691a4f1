//! ONNX Runtime wrapper for the BlazePose landmark model.

use image::imageops::{self, FilterType};
use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use lhub_models::Landmark;

use crate::error::{PoseError, PoseResult};
use crate::model::{LandmarkModel, ModelLoader, PoseModelConfig, BODY_LANDMARK_COUNT};

/// Values per landmark in the model output: x, y, z, visibility, presence.
const LANDMARK_STRIDE: usize = 5;

/// Aspect-preserving fit of a frame into the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub size: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, size: u32) -> Self {
        let scale = size as f32 / width.max(height).max(1) as f32;
        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, size);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, size);
        Self {
            size,
            scaled_width,
            scaled_height,
            pad_x: (size - scaled_width) / 2,
            pad_y: (size - scaled_height) / 2,
        }
    }

    /// Model-input pixel coordinate to frame-normalized coordinate.
    pub fn to_frame(&self, x_px: f32, y_px: f32) -> (f32, f32) {
        (
            (x_px - self.pad_x as f32) / self.scaled_width as f32,
            (y_px - self.pad_y as f32) / self.scaled_height as f32,
        )
    }

    fn apply(&self, image: &RgbImage) -> RgbImage {
        let resized = imageops::resize(image, self.scaled_width, self.scaled_height, FilterType::Triangle);
        let mut canvas = RgbImage::new(self.size, self.size);
        imageops::overlay(&mut canvas, &resized, self.pad_x as i64, self.pad_y as i64);
        canvas
    }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Landmark model backed by an ONNX Runtime session.
pub struct OrtPoseLandmarker {
    session: Mutex<Session>,
    config: PoseModelConfig,
}

impl OrtPoseLandmarker {
    pub fn load(config: &PoseModelConfig) -> PoseResult<Self> {
        if !config.model_path.exists() {
            return Err(PoseError::ModelNotFound(config.model_path.clone()));
        }

        let model_bytes = std::fs::read(&config.model_path)
            .map_err(|e| PoseError::model_load(format!("ORT read model file: {e}")))?;

        let session = Session::builder()
            .map_err(|e| PoseError::model_load(format!("ORT session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| PoseError::model_load(format!("ORT opt level: {e}")))?
            .with_intra_threads(config.intra_threads)
            .map_err(|e| PoseError::model_load(format!("ORT threads: {e}")))?
            .commit_from_memory(model_bytes.as_slice())
            .map_err(|e| PoseError::model_load(format!("ORT load model: {e}")))?;

        info!(path = %config.model_path.display(), "Pose landmark model loaded");

        Ok(Self {
            session: Mutex::new(session),
            config: config.clone(),
        })
    }

    /// RGB image to a `[1, size, size, 3]` tensor in `[0, 1]`.
    fn to_tensor(&self, image: &RgbImage, letterbox: &Letterbox) -> PoseResult<Value> {
        let canvas = letterbox.apply(image);
        let size = letterbox.size as usize;

        let data: Vec<f32> = canvas.as_raw().iter().map(|&v| v as f32 / 255.0).collect();

        let shape = vec![1usize, size, size, 3];
        Tensor::from_array((shape, data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| PoseError::inference(format!("ORT tensor: {e}")))
    }
}

impl LandmarkModel for OrtPoseLandmarker {
    fn infer(&self, image: &RgbImage) -> PoseResult<Option<Vec<Landmark>>> {
        let letterbox = Letterbox::fit(image.width(), image.height(), self.config.input_size);
        let tensor = self.to_tensor(image, &letterbox)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| PoseError::inference("ORT session poisoned"))?;

        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| PoseError::inference(format!("ORT run failed: {e}")))?;

        let presence = outputs
            .get(self.config.presence_output.as_str())
            .ok_or_else(|| PoseError::inference("ORT returned no presence output"))?;
        let (_, presence) = presence
            .try_extract_tensor::<f32>()
            .map_err(|e| PoseError::inference(format!("ORT extract presence: {e}")))?;
        let score = presence.first().copied().unwrap_or(0.0);
        if score < self.config.presence_threshold {
            debug!(score, "No person detected");
            return Ok(None);
        }

        let landmarks = outputs
            .get(self.config.landmarks_output.as_str())
            .ok_or_else(|| PoseError::inference("ORT returned no landmark output"))?;
        let (_, data) = landmarks
            .try_extract_tensor::<f32>()
            .map_err(|e| PoseError::inference(format!("ORT extract landmarks: {e}")))?;

        decode_landmarks(data, &letterbox).map(Some)
    }
}

/// Decode the flat landmark output into frame-normalized body landmarks.
///
/// Visibility arrives as a logit.
pub fn decode_landmarks(data: &[f32], letterbox: &Letterbox) -> PoseResult<Vec<Landmark>> {
    let points = data.len() / LANDMARK_STRIDE;
    if points < BODY_LANDMARK_COUNT {
        return Err(PoseError::inference(format!(
            "Unexpected landmark output length: {}",
            data.len()
        )));
    }

    let size = letterbox.size as f32;
    Ok(data
        .chunks_exact(LANDMARK_STRIDE)
        .take(BODY_LANDMARK_COUNT)
        .map(|p| {
            let (x, y) = letterbox.to_frame(p[0], p[1]);
            Landmark::new(x, y, p[2] / size, sigmoid(p[3]))
        })
        .collect())
}

/// Loads [`OrtPoseLandmarker`] from a [`PoseModelConfig`].
#[derive(Debug, Clone)]
pub struct OrtModelLoader {
    config: PoseModelConfig,
}

impl OrtModelLoader {
    pub fn new(config: PoseModelConfig) -> Self {
        Self { config }
    }
}

impl ModelLoader for OrtModelLoader {
    fn load(&self) -> PoseResult<Arc<dyn LandmarkModel>> {
        Ok(Arc::new(OrtPoseLandmarker::load(&self.config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_landscape() {
        let lb = Letterbox::fit(640, 480, 256);
        assert_eq!(lb.scaled_width, 256);
        assert_eq!(lb.scaled_height, 192);
        assert_eq!(lb.pad_x, 0);
        assert_eq!(lb.pad_y, 32);

        let (x, y) = lb.to_frame(128.0, 128.0);
        assert!((x - 0.5).abs() < 1e-6);
        assert!((y - 0.5).abs() < 1e-6);

        // Inside the padding band maps outside the frame.
        let (_, y) = lb.to_frame(10.0, 10.0);
        assert!(y < 0.0);
    }

    #[test]
    fn test_letterbox_apply_size() {
        let lb = Letterbox::fit(100, 300, 64);
        let out = lb.apply(&RgbImage::new(100, 300));
        assert_eq!(out.dimensions(), (64, 64));
        assert!(lb.pad_x > 0);
    }

    #[test]
    fn test_decode_landmarks() {
        let lb = Letterbox::fit(256, 256, 256);
        let mut data = vec![0.0f32; 39 * LANDMARK_STRIDE];
        data[0] = 128.0;
        data[1] = 64.0;
        data[2] = 25.6;
        data[3] = 0.0;

        let landmarks = decode_landmarks(&data, &lb).unwrap();
        assert_eq!(landmarks.len(), BODY_LANDMARK_COUNT);
        assert!((landmarks[0].x - 0.5).abs() < 1e-6);
        assert!((landmarks[0].y - 0.25).abs() < 1e-6);
        assert!((landmarks[0].z - 0.1).abs() < 1e-6);
        assert!((landmarks[0].visibility - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_decode_rejects_short_output() {
        let lb = Letterbox::fit(256, 256, 256);
        assert!(decode_landmarks(&[0.0; 10], &lb).is_err());
    }

    #[test]
    fn test_missing_model_file() {
        let config = PoseModelConfig {
            model_path: "/nonexistent/pose.onnx".into(),
            ..Default::default()
        };
        assert!(matches!(
            OrtPoseLandmarker::load(&config),
            Err(PoseError::ModelNotFound(_))
        ));
    }
}
