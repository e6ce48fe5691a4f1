//! Sign ingest pipeline for LibrasHub.
//!
//! Stages an upload, normalizes it with FFmpeg, applies the background
//! treatment, extracts a thumbnail, optionally gates on pose validity,
//! publishes the results and hands a [`SignRecord`](lhub_models::SignRecord)
//! to a [`RecordSink`].

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod sink;
pub mod staging;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult, POSE_REJECTED_MESSAGE};
pub use logging::JobLogger;
pub use pipeline::{SignOutcome, SignPipeline, SignUpload};
pub use sink::{JsonlRecordSink, MemoryRecordSink, RecordSink, SinkError};
pub use staging::{CleanupReport, JobWorkspace, ManifestEntry, StagingStore};
