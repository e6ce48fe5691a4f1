//! Background treatment policies.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::MediaError;

pub const DEFAULT_KEY_COLOR: &str = "0x00FF00";
pub const DEFAULT_FILL_COLOR: &str = "0xF5F5F5";
pub const DEFAULT_KEY_SIMILARITY: f32 = 0.15;
pub const DEFAULT_KEY_BLEND: f32 = 0.1;

/// How the background of a normalized video is treated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum BackgroundTreatment {
    /// Identity: the normalized file is copied unchanged.
    #[default]
    Passthrough,
    /// Key out a uniform backdrop and composite over `fill_color`.
    ChromaKey {
        key_color: String,
        similarity: f32,
        blend: f32,
        fill_color: String,
    },
}

impl BackgroundTreatment {
    pub fn chroma_key(key_color: impl Into<String>, fill_color: impl Into<String>) -> Self {
        Self::ChromaKey {
            key_color: key_color.into(),
            similarity: DEFAULT_KEY_SIMILARITY,
            blend: DEFAULT_KEY_BLEND,
            fill_color: fill_color.into(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::ChromaKey { .. } => "chroma_key",
        }
    }
}

impl FromStr for BackgroundTreatment {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passthrough" | "copy" | "none" => Ok(Self::Passthrough),
            "chroma_key" | "chromakey" => {
                Ok(Self::chroma_key(DEFAULT_KEY_COLOR, DEFAULT_FILL_COLOR))
            }
            other => Err(MediaError::internal(format!(
                "unknown background treatment: {}",
                other
            ))),
        }
    }
}
