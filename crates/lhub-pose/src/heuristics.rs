//! Framing heuristics and video-level aggregation.

use lhub_models::{Landmark, PoseEstimate, VideoValidity};

/// Nose, shoulders, elbows, wrists and hips in BlazePose indexing.
pub const UPPER_BODY_INDICES: [usize; 9] = [11, 12, 13, 14, 15, 16, 0, 23, 24];

/// Fraction of [`UPPER_BODY_INDICES`] that must lie inside the frame.
pub const UPPER_BODY_MIN_RATIO: f32 = 0.35;

/// A frame is valid only when confidence is strictly above this.
pub const FRAME_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Minimum (inclusive) fraction of valid frames for a video to pass.
pub const VIDEO_VALID_RATIO: f32 = 0.5;

/// Whether the signer is framed from roughly the waist up.
///
/// Landmarks missing from the slice count as not visible.
pub fn has_upper_body(landmarks: &[Landmark]) -> bool {
    let visible = UPPER_BODY_INDICES
        .iter()
        .filter_map(|&i| landmarks.get(i))
        .filter(|lm| lm.is_in_frame())
        .count();

    visible as f32 >= UPPER_BODY_INDICES.len() as f32 * UPPER_BODY_MIN_RATIO
}

/// Mean visibility over every detected landmark.
pub fn confidence(landmarks: &[Landmark]) -> f32 {
    if landmarks.is_empty() {
        return 0.0;
    }
    landmarks.iter().map(|lm| lm.visibility).sum::<f32>() / landmarks.len() as f32
}

/// Build the per-frame estimate from raw model output.
pub fn estimate(landmarks: Option<Vec<Landmark>>) -> PoseEstimate {
    let landmarks = match landmarks {
        Some(l) if !l.is_empty() => l,
        _ => return PoseEstimate::no_person(),
    };

    let has_upper_body = has_upper_body(&landmarks);
    let confidence = confidence(&landmarks);

    PoseEstimate {
        is_valid: has_upper_body && confidence > FRAME_CONFIDENCE_THRESHOLD,
        has_upper_body,
        confidence,
        landmarks,
    }
}

/// Running tally over a batch of frames.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ValidityTally {
    pub frames_analyzed: usize,
    pub valid_frames: usize,
    confidence_sum: f32,
}

impl ValidityTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, estimate: &PoseEstimate) {
        self.frames_analyzed += 1;
        self.confidence_sum += estimate.confidence;
        if estimate.is_valid {
            self.valid_frames += 1;
        }
    }

    /// A frame whose detection failed: counted, invalid, zero confidence.
    pub fn record_failure(&mut self) {
        self.frames_analyzed += 1;
    }

    pub fn finish(&self) -> VideoValidity {
        aggregate(self.valid_frames, self.frames_analyzed, self.confidence_sum)
    }
}

/// Video verdict from frame counts. Zero frames is never valid.
pub fn aggregate(valid_frames: usize, frames_analyzed: usize, confidence_sum: f32) -> VideoValidity {
    if frames_analyzed == 0 {
        return VideoValidity {
            frames_analyzed: 0,
            valid_frames: 0,
            valid_ratio: 0.0,
            average_confidence: 0.0,
            is_valid: false,
        };
    }

    let valid_ratio = valid_frames as f32 / frames_analyzed as f32;
    VideoValidity {
        frames_analyzed,
        valid_frames,
        valid_ratio,
        average_confidence: confidence_sum / frames_analyzed as f32,
        is_valid: valid_ratio >= VIDEO_VALID_RATIO,
    }
}
