//! The publication seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{StorageError, StorageResult};

/// Kind of asset being published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Video,
    Image,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Video => "video",
            ResourceKind::Image => "image",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and as what an asset is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOptions {
    pub resource_kind: ResourceKind,
    /// Slash-separated folder, e.g. `librashub/signs`
    pub folder: String,
    /// Identifier within the folder, without extension
    pub public_id: String,
}

impl PublishOptions {
    pub fn new(resource_kind: ResourceKind, folder: impl Into<String>, public_id: impl Into<String>) -> Self {
        Self {
            resource_kind,
            folder: folder.into(),
            public_id: public_id.into(),
        }
    }

    /// `folder/public_id`, rejecting empty or traversing segments.
    pub fn qualified_id(&self) -> StorageResult<String> {
        let folder = self.folder.trim_matches('/');
        let id = self.public_id.trim_matches('/');
        if id.is_empty() {
            return Err(StorageError::invalid_key("empty public id"));
        }
        let qualified = if folder.is_empty() {
            id.to_string()
        } else {
            format!("{}/{}", folder, id)
        };
        if qualified.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
            return Err(StorageError::invalid_key(qualified));
        }
        Ok(qualified)
    }
}

/// Uploads a finished local file and returns its canonical public URL.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, path: &Path, options: &PublishOptions) -> StorageResult<String>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// MIME type for a published file.
pub fn content_type_for(path: &Path, kind: ResourceKind) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match (kind, ext.as_str()) {
        (_, "mp4") => "video/mp4",
        (_, "webm") => "video/webm",
        (_, "mov") => "video/quicktime",
        (_, "jpg") | (_, "jpeg") => "image/jpeg",
        (_, "png") => "image/png",
        (ResourceKind::Video, _) => "video/mp4",
        (ResourceKind::Image, _) => "image/jpeg",
    }
}
