//! Sign records, published assets and intake form metadata.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::pose::VideoValidity;
use crate::upload::ValidationError;

/// Gloss used when the form leaves it blank.
pub const DEFAULT_GLOSS: &str = "Untitled";
/// Category used when the form leaves it blank.
pub const DEFAULT_CATEGORY: &str = "outros";

/// Form metadata submitted alongside the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, JsonSchema)]
pub struct SignForm {
    #[validate(length(min = 1, max = 120))]
    pub gloss: String,

    #[validate(length(max = 2000))]
    pub description: String,

    #[validate(length(min = 1, max = 40))]
    pub category: String,

    /// Keypoints captured by the client during recording, stored verbatim
    /// when server-side pose validation is disabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_keypoints: Option<serde_json::Value>,
}

impl SignForm {
    /// Build a form from raw multipart fields, applying defaults for blanks.
    pub fn from_fields(
        gloss: Option<String>,
        description: Option<String>,
        category: Option<String>,
    ) -> Self {
        fn non_blank(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            gloss: non_blank(gloss).unwrap_or_else(|| DEFAULT_GLOSS.to_string()),
            description: non_blank(description).unwrap_or_default(),
            category: non_blank(category).unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            client_keypoints: None,
        }
    }

    /// Field length checks, reported as an intake [`ValidationError`].
    pub fn check(&self) -> Result<(), ValidationError> {
        self.validate().map_err(|errors| {
            let field = errors
                .field_errors()
                .keys()
                .next()
                .map(|k| k.to_string())
                .unwrap_or_else(|| "form".to_string());
            ValidationError::invalid_field(field, errors.to_string())
        })
    }

    /// Attach client recording metadata (`{"keypoints": [...], ...}`).
    pub fn with_client_metadata(mut self, metadata: &serde_json::Value) -> Self {
        self.client_keypoints = metadata
            .get("keypoints")
            .filter(|k| !k.is_null())
            .cloned();
        self
    }
}

/// Role of a published asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AssetRole {
    Video,
    Thumbnail,
}

impl fmt::Display for AssetRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetRole::Video => f.write_str("video"),
            AssetRole::Thumbnail => f.write_str("thumbnail"),
        }
    }
}

/// An asset uploaded to durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PublishedAsset {
    pub role: AssetRole,
    /// Canonical, publicly resolvable URL
    pub url: String,
}

/// Persisted output of a successful job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignRecord {
    pub id: Uuid,
    pub gloss: String,
    pub description: String,
    pub category: String,
    pub video_url: String,
    pub thumb_url: String,
    pub keypoints: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SignRecord {
    /// Assemble a record from the form and the published assets.
    pub fn new(
        form: SignForm,
        video: &PublishedAsset,
        thumbnail: &PublishedAsset,
        keypoints: Option<serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            gloss: form.gloss,
            description: form.description,
            category: form.category,
            video_url: video.url.clone(),
            thumb_url: thumbnail.url.clone(),
            keypoints,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Pose summary returned to the caller when validation ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoseAnalysis {
    pub is_valid: bool,
    pub confidence: f32,
    /// Upper-body heuristic on the representative (middle) frame
    pub has_upper_body: bool,
    pub valid_frames: usize,
    pub frames_analyzed: usize,
}

impl PoseAnalysis {
    pub fn new(validity: &VideoValidity, has_upper_body: bool) -> Self {
        Self {
            is_valid: validity.is_valid,
            confidence: validity.average_confidence,
            has_upper_body,
            valid_frames: validity.valid_frames,
            frames_analyzed: validity.frames_analyzed,
        }
    }
}
