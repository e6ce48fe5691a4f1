//! Pose landmarks, per-frame estimates and video-level validity.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Skeleton edges between body landmarks (BlazePose 33-point topology).
pub const POSE_CONNECTIONS: &[[usize; 2]] = &[
    // Face
    [0, 1],
    [1, 2],
    [2, 3],
    [3, 7],
    [0, 4],
    [4, 5],
    [5, 6],
    [6, 8],
    // Mouth
    [9, 10],
    // Shoulders
    [11, 12],
    // Left arm
    [11, 13],
    [13, 15],
    // Right arm
    [12, 14],
    [14, 16],
    // Torso
    [11, 23],
    [12, 24],
    // Hips
    [23, 24],
    // Left leg
    [23, 25],
    [25, 27],
    // Right leg
    [24, 26],
    [26, 28],
];

/// Single estimated body point.
///
/// `x`/`y` are normalized to the frame (inside the frame when in `(0, 1)`),
/// `z` is depth relative to the hips, `visibility` is in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self { x, y, z, visibility }
    }

    /// Strictly inside the frame on both axes.
    pub fn is_in_frame(&self) -> bool {
        self.x > 0.0 && self.x < 1.0 && self.y > 0.0 && self.y < 1.0
    }
}

/// Per-frame pose estimate. Immutable once computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoseEstimate {
    pub landmarks: Vec<Landmark>,
    pub has_upper_body: bool,
    /// Mean visibility across all detected landmarks
    pub confidence: f32,
    pub is_valid: bool,
}

impl PoseEstimate {
    /// Estimate for a frame in which no person was found.
    pub fn no_person() -> Self {
        Self {
            landmarks: Vec::new(),
            has_upper_body: false,
            confidence: 0.0,
            is_valid: false,
        }
    }

    pub fn person_detected(&self) -> bool {
        !self.landmarks.is_empty()
    }

    /// Structured keypoint payload stored alongside a sign.
    pub fn keypoints(&self) -> Option<PoseKeypoints> {
        if !self.person_detected() {
            return None;
        }

        Some(PoseKeypoints {
            pose: self
                .landmarks
                .iter()
                .enumerate()
                .map(|(id, lm)| PoseKeypoint {
                    id,
                    x: lm.x,
                    y: lm.y,
                    z: lm.z,
                    visibility: lm.visibility,
                })
                .collect(),
            connections: POSE_CONNECTIONS.to_vec(),
        })
    }
}

/// Indexed landmark inside a keypoint payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PoseKeypoint {
    pub id: usize,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

/// Keypoints plus skeleton, as persisted with a sign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PoseKeypoints {
    pub pose: Vec<PoseKeypoint>,
    pub connections: Vec<[usize; 2]>,
}

/// Aggregate verdict over a video's sampled frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoValidity {
    pub frames_analyzed: usize,
    pub valid_frames: usize,
    /// `valid_frames / frames_analyzed`, 0 when nothing was analyzed
    pub valid_ratio: f32,
    pub average_confidence: f32,
    pub is_valid: bool,
}
