//! API configuration.

use std::path::PathBuf;

pub const DEFAULT_SIGN_RECORDS_PATH: &str = "data/signs.jsonl";

/// Multipart framing allowance on top of the video size ceiling.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Which backend receives published assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherKind {
    Cloudinary,
    R2,
}

impl PublisherKind {
    fn from_env_value(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "r2" | "s3" => PublisherKind::R2,
            _ => PublisherKind::Cloudinary,
        }
    }
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    /// Environment (development/production)
    pub environment: String,
    /// JSON lines file receiving sign records
    pub sign_records_path: PathBuf,
    pub metrics_enabled: bool,
    pub publisher: PublisherKind,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3333,
            cors_origins: vec!["*".to_string()],
            environment: "development".to_string(),
            sign_records_path: PathBuf::from(DEFAULT_SIGN_RECORDS_PATH),
            metrics_enabled: true,
            publisher: PublisherKind::Cloudinary,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3333),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            sign_records_path: std::env::var("SIGN_RECORDS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_SIGN_RECORDS_PATH)),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
            publisher: std::env::var("PUBLISHER")
                .map(|v| PublisherKind::from_env_value(&v))
                .unwrap_or(PublisherKind::Cloudinary),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }

    /// Request body ceiling for a given video size limit.
    pub fn body_limit(max_upload_bytes: u64) -> usize {
        usize::try_from(max_upload_bytes)
            .unwrap_or(usize::MAX)
            .saturating_add(FORM_OVERHEAD_BYTES)
    }
}
