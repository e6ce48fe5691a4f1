//! Destinations for finished sign records.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use lhub_models::SignRecord;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record rejected: {0}")]
    Rejected(String),
}

/// Accepts a finished record. Never retried by the pipeline.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn persist(&self, record: &SignRecord) -> Result<(), SinkError>;
}

/// In-process sink.
#[derive(Debug, Default)]
pub struct MemoryRecordSink {
    records: Mutex<Vec<SignRecord>>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<SignRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordSink for MemoryRecordSink {
    async fn persist(&self, record: &SignRecord) -> Result<(), SinkError> {
        self.records
            .lock()
            .map_err(|_| SinkError::Rejected("record store poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}

/// Append-only JSON lines file, one record per line.
#[derive(Debug)]
pub struct JsonlRecordSink {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonlRecordSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back.
    pub async fn read_all(&self) -> Result<Vec<SignRecord>, SinkError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(SinkError::from))
            .collect()
    }
}

#[async_trait]
impl RecordSink for JsonlRecordSink {
    async fn persist(&self, record: &SignRecord) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(id = %record.id, path = %self.path.display(), "Sign record appended");
        Ok(())
    }
}
