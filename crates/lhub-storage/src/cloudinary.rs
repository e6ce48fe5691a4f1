//! Cloudinary publisher using the signed upload API.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{StorageError, StorageResult};
use crate::publisher::{content_type_for, PublishOptions, Publisher};

pub const DEFAULT_API_BASE: &str = "https://api.cloudinary.com";

/// Cloudinary account configuration.
#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Overridable for tests and regional endpoints
    pub api_base: String,
    pub timeout: Duration,
}

impl CloudinaryConfig {
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            cloud_name: std::env::var("CLOUDINARY_CLOUD_NAME")
                .map_err(|_| StorageError::config_error("CLOUDINARY_CLOUD_NAME not set"))?,
            api_key: std::env::var("CLOUDINARY_API_KEY")
                .map_err(|_| StorageError::config_error("CLOUDINARY_API_KEY not set"))?,
            api_secret: std::env::var("CLOUDINARY_API_SECRET")
                .map_err(|_| StorageError::config_error("CLOUDINARY_API_SECRET not set"))?,
            api_base: std::env::var("CLOUDINARY_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            timeout: Duration::from_secs(
                std::env::var("CLOUDINARY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
        })
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Signature over the signed parameters: sorted `k=v` pairs joined by `&`,
/// followed by the API secret, hashed with SHA-256.
pub fn sign_params(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Publishes to Cloudinary and returns the asset's `secure_url`.
#[derive(Clone)]
pub struct CloudinaryPublisher {
    http: reqwest::Client,
    config: CloudinaryConfig,
}

impl CloudinaryPublisher {
    pub fn new(config: CloudinaryConfig) -> StorageResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> StorageResult<Self> {
        Self::new(CloudinaryConfig::from_env()?)
    }

    fn upload_url(&self, options: &PublishOptions) -> String {
        format!(
            "{}/v1_1/{}/{}/upload",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name,
            options.resource_kind
        )
    }
}

#[async_trait]
impl Publisher for CloudinaryPublisher {
    async fn publish(&self, path: &Path, options: &PublishOptions) -> StorageResult<String> {
        // Validates the folder/id pair.
        options.qualified_id()?;

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let folder = options.folder.trim_matches('/').to_string();
        let params = [
            ("folder", folder.clone()),
            ("public_id", options.public_id.clone()),
            ("timestamp", timestamp.clone()),
        ];
        let signature = sign_params(&params, &self.config.api_secret);

        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(content_type_for(path, options.resource_kind))?;

        let form = Form::new()
            .part("file", part)
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", folder)
            .text("public_id", options.public_id.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let url = self.upload_url(options);
        debug!("Uploading {} to {}", path.display(), url);

        let response = self.http.post(&url).multipart(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            warn!(status = status.as_u16(), "Cloudinary rejected upload: {}", message);
            return Err(StorageError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: UploadResponse = serde_json::from_str(&body)?;
        let secure_url = parsed
            .secure_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| StorageError::upload_failed("response missing secure_url"))?;

        info!("Uploaded {} to {}", path.display(), secure_url);
        Ok(secure_url)
    }

    fn name(&self) -> &'static str {
        "cloudinary"
    }
}
