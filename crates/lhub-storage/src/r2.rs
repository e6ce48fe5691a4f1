//! Cloudflare R2 publisher (S3 API).

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use std::path::Path;
use tracing::{debug, info};
use url::Url;

use crate::error::{StorageError, StorageResult};
use crate::publisher::{content_type_for, PublishOptions, Publisher};

/// Configuration for R2 client.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
    /// Public origin serving the bucket (custom domain or r2.dev)
    pub public_base_url: String,
}

impl R2Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let config = Self {
            endpoint_url: std::env::var("R2_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("R2_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("R2_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("R2_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("R2_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("R2_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("R2_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("R2_BUCKET_NAME not set"))?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
            public_base_url: std::env::var("R2_PUBLIC_BASE_URL")
                .map_err(|_| StorageError::config_error("R2_PUBLIC_BASE_URL not set"))?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StorageResult<()> {
        Url::parse(&self.public_base_url)
            .map_err(|e| StorageError::config_error(format!("R2_PUBLIC_BASE_URL: {e}")))?;
        Ok(())
    }
}

/// Object key for a published file: `folder/public_id.ext`.
pub fn object_key(path: &Path, options: &PublishOptions) -> StorageResult<String> {
    let qualified = options.qualified_id()?;
    Ok(match path.extension() {
        Some(ext) => format!("{}.{}", qualified, ext.to_string_lossy().to_ascii_lowercase()),
        None => qualified,
    })
}

/// Public URL of `key` under `base`.
pub fn public_url(base: &str, key: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), key)
}

/// Publishes to an R2 bucket served from a public origin.
#[derive(Clone)]
pub struct R2Publisher {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl R2Publisher {
    pub fn new(config: R2Config) -> StorageResult<Self> {
        config.validate()?;

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            public_base_url: config.public_base_url,
        })
    }

    pub fn from_env() -> StorageResult<Self> {
        Self::new(R2Config::from_env()?)
    }
}

#[async_trait]
impl Publisher for R2Publisher {
    async fn publish(&self, path: &Path, options: &PublishOptions) -> StorageResult<String> {
        let key = object_key(path, options)?;
        let content_type = content_type_for(path, options.resource_kind);
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        let url = public_url(&self.public_base_url, &key);
        info!("Uploaded {} to {}", path.display(), url);
        Ok(url)
    }

    fn name(&self) -> &'static str {
        "r2"
    }
}
