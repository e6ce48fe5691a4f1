//! Intake rules applied before anything is staged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Video containers accepted at intake.
pub const DEFAULT_ALLOWED_VIDEO_TYPES: &[&str] = &[
    "video/mp4",
    "video/webm",
    "video/quicktime",
    "video/x-msvideo",
];

/// Default upload ceiling (100 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Rejections raised before a job is staged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No file uploaded")]
    MissingFile,

    #[error("Invalid file type. Only video files are allowed.")]
    UnsupportedMimeType(String),

    #[error("File too large: {size} bytes exceeds limit of {max} bytes")]
    TooLarge { size: u64, max: u64 },

    #[error("Invalid field {field}: {message}")]
    InvalidField { field: String, message: String },
}

impl ValidationError {
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Declared properties of the uploaded video part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMeta {
    pub mimetype: String,
    pub filename: String,
    /// Known only when the transport declares it up front
    pub declared_size: Option<u64>,
}

impl UploadMeta {
    pub fn new(mimetype: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            mimetype: mimetype.into(),
            filename: filename.into(),
            declared_size: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.declared_size = Some(size);
        self
    }
}

/// Allow-list and size ceiling for incoming videos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPolicy {
    pub allowed_types: Vec<String>,
    pub max_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_types: DEFAULT_ALLOWED_VIDEO_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl UploadPolicy {
    /// Whether `mimetype` is on the allow-list. Parameters such as
    /// `; codecs=vp9` are ignored.
    pub fn accepts_type(&self, mimetype: &str) -> bool {
        let essence = mimetype
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.allowed_types.iter().any(|t| t.eq_ignore_ascii_case(&essence))
    }

    /// Check the declared metadata. A missing declared size is accepted here
    /// and enforced while streaming.
    pub fn validate(&self, meta: &UploadMeta) -> Result<(), ValidationError> {
        if !self.accepts_type(&meta.mimetype) {
            return Err(ValidationError::UnsupportedMimeType(meta.mimetype.clone()));
        }

        match meta.declared_size {
            Some(size) if size > self.max_bytes => Err(ValidationError::TooLarge {
                size,
                max: self.max_bytes,
            }),
            _ => Ok(()),
        }
    }
}
