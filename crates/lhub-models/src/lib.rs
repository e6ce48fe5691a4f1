//! Shared data models for the LibrasHub sign ingest pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Upload jobs and the pipeline stage machine
//! - Staged artifacts and their roles
//! - Pose landmarks, per-frame estimates and video-level validity
//! - Sign records, published assets and intake form metadata
//! - Encoding constants shared by the transcoder

pub mod artifact;
pub mod encoding;
pub mod job;
pub mod pose;
pub mod sign;
pub mod upload;

// Re-export common types
pub use artifact::{ArtifactRole, StagedArtifact};
pub use encoding::EncodingConfig;
pub use job::{JobId, PipelineStage, UploadJob};
pub use pose::{Landmark, PoseEstimate, PoseKeypoint, PoseKeypoints, VideoValidity};
pub use sign::{AssetRole, PoseAnalysis, PublishedAsset, SignForm, SignRecord};
pub use upload::{UploadMeta, UploadPolicy, ValidationError, DEFAULT_ALLOWED_VIDEO_TYPES};
