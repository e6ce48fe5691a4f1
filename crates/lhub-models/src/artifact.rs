//! Staged artifacts produced inside a job's staging directory.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Role of an intermediate file within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "role", content = "index")]
pub enum ArtifactRole {
    /// The upload exactly as received
    Raw,
    /// Re-encoded to the delivery codec/container
    Normalized,
    /// Output of the background treatment stage
    BackgroundTreated,
    /// Representative still image
    Thumbnail,
    /// Sampled frame for pose validation (1-based, temporal order)
    Frame(u32),
}

impl ArtifactRole {
    /// File stem used when allocating a path for this role.
    pub fn file_stem(&self) -> String {
        match self {
            ArtifactRole::Raw => "raw".to_string(),
            ArtifactRole::Normalized => "normalized".to_string(),
            ArtifactRole::BackgroundTreated => "background".to_string(),
            ArtifactRole::Thumbnail => "thumb".to_string(),
            ArtifactRole::Frame(n) => format!("frame-{:03}", n),
        }
    }
}

impl fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactRole::Raw => f.write_str("raw"),
            ArtifactRole::Normalized => f.write_str("normalized"),
            ArtifactRole::BackgroundTreated => f.write_str("background-treated"),
            ArtifactRole::Thumbnail => f.write_str("thumbnail"),
            ArtifactRole::Frame(n) => write!(f, "frame[{}]", n),
        }
    }
}

/// A completed file in a job's staging directory.
///
/// Only stages that finished successfully hand out a `StagedArtifact`;
/// later stages consume it by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedArtifact {
    pub role: ArtifactRole,
    pub path: PathBuf,
    /// Size on disk when the artifact was committed
    pub size_bytes: u64,
}

impl StagedArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }
}
