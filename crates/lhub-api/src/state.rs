//! Application state.

use std::sync::Arc;
use tracing::info;

use lhub_media::Transcoder;
use lhub_pipeline::{JsonlRecordSink, PipelineConfig, SignPipeline};
use lhub_pose::{OrtModelLoader, PoseEstimator, PoseModelConfig};
use lhub_storage::{CloudinaryPublisher, Publisher, R2Publisher};

use crate::config::{ApiConfig, PublisherKind};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: SignPipeline,
}

impl AppState {
    pub fn new(config: ApiConfig, pipeline: SignPipeline) -> Self {
        Self { config, pipeline }
    }

    /// Wire the production pipeline from the environment.
    pub fn from_env(config: ApiConfig) -> anyhow::Result<Self> {
        let pipeline_config = PipelineConfig::from_env();

        let transcoder = Transcoder::system()
            .with_tool_paths(&pipeline_config.ffmpeg_path, &pipeline_config.ffprobe_path)
            .with_timeout(pipeline_config.process_timeout);

        let pose = Arc::new(PoseEstimator::new(Arc::new(OrtModelLoader::new(
            PoseModelConfig::from_env(),
        ))));

        let publisher: Arc<dyn Publisher> = match config.publisher {
            PublisherKind::Cloudinary => Arc::new(CloudinaryPublisher::from_env()?),
            PublisherKind::R2 => Arc::new(R2Publisher::from_env()?),
        };
        info!(
            publisher = publisher.name(),
            pose_validation = pipeline_config.pose_validation,
            background = pipeline_config.background.as_str(),
            "Pipeline configured"
        );

        let sink = Arc::new(JsonlRecordSink::new(&config.sign_records_path));
        let pipeline = SignPipeline::new(pipeline_config, transcoder, pose, publisher, sink);

        Ok(Self::new(config, pipeline))
    }
}
