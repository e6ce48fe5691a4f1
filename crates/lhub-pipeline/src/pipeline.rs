//! Sign ingest orchestration.
//!
//! A job moves through [`PipelineStage`]s strictly in order. Whatever the
//! outcome, the job's staging workspace is cleaned up before the result is
//! returned.

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncRead;
use tracing::{error, info, Instrument};

use lhub_media::Transcoder;
use lhub_models::{
    ArtifactRole, AssetRole, JobId, PipelineStage, PoseAnalysis, PublishedAsset, SignForm,
    SignRecord, StagedArtifact, UploadJob, UploadMeta,
};
use lhub_pose::PoseEstimator;
use lhub_storage::{PublishOptions, Publisher, ResourceKind};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::sink::RecordSink;
use crate::staging::{JobWorkspace, StagingStore};

/// One intake request.
pub struct SignUpload {
    pub meta: UploadMeta,
    pub form: SignForm,
    pub body: Box<dyn AsyncRead + Send + Unpin>,
}

impl SignUpload {
    pub fn new(meta: UploadMeta, form: SignForm, body: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            meta,
            form,
            body: Box::new(body),
        }
    }
}

/// Result of an accepted job.
#[derive(Debug, Clone)]
pub struct SignOutcome {
    pub job_id: JobId,
    pub record: SignRecord,
    /// Present when pose validation ran
    pub pose_analysis: Option<PoseAnalysis>,
    /// Stages visited, in order
    pub stages: Vec<PipelineStage>,
}

/// Enforces the stage order and reports each transition.
struct StageTracker {
    current: PipelineStage,
    pose_validation: bool,
    entered_at: Instant,
    visited: Vec<PipelineStage>,
    logger: JobLogger,
}

impl StageTracker {
    fn new(logger: JobLogger, pose_validation: bool) -> Self {
        Self {
            current: PipelineStage::Received,
            pose_validation,
            entered_at: Instant::now(),
            visited: vec![PipelineStage::Received],
            logger,
        }
    }

    fn advance(&mut self, to: PipelineStage) -> PipelineResult<()> {
        if !self.current.can_transition_to(to, self.pose_validation) {
            return Err(PipelineError::InvalidTransition {
                from: self.current,
                to,
            });
        }

        let elapsed = self.entered_at.elapsed();
        metrics::record_stage_duration(to, elapsed.as_secs_f64());
        self.logger.log_stage(to, elapsed.as_millis() as u64);

        self.current = to;
        self.entered_at = Instant::now();
        self.visited.push(to);
        Ok(())
    }

    fn fail(&mut self) {
        if !self.current.is_terminal() {
            self.current = PipelineStage::Failed;
            self.visited.push(PipelineStage::Failed);
        }
    }
}

/// Runs sign uploads from intake to a persisted record.
#[derive(Clone)]
pub struct SignPipeline {
    config: Arc<PipelineConfig>,
    staging: StagingStore,
    transcoder: Transcoder,
    pose: Arc<PoseEstimator>,
    publisher: Arc<dyn Publisher>,
    sink: Arc<dyn RecordSink>,
}

impl SignPipeline {
    pub fn new(
        config: PipelineConfig,
        transcoder: Transcoder,
        pose: Arc<PoseEstimator>,
        publisher: Arc<dyn Publisher>,
        sink: Arc<dyn RecordSink>,
    ) -> Self {
        Self {
            staging: StagingStore::new(&config.staging_dir),
            config: Arc::new(config),
            transcoder,
            pose,
            publisher,
            sink,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn staging(&self) -> &StagingStore {
        &self.staging
    }

    pub fn transcoder(&self) -> &Transcoder {
        &self.transcoder
    }

    pub fn pose_estimator(&self) -> &Arc<PoseEstimator> {
        &self.pose
    }

    /// Run one upload to completion.
    ///
    /// Intake validation happens before anything touches the disk. Once a
    /// workspace exists, it is cleaned up on every path out of this function.
    pub async fn process(&self, upload: SignUpload) -> PipelineResult<SignOutcome> {
        let SignUpload { meta, form, mut body } = upload;

        if let Err(e) = self
            .config
            .upload_policy
            .validate(&meta)
            .and_then(|_| form.check())
        {
            info!(mimetype = %meta.mimetype, "Upload rejected: {}", e);
            metrics::record_job_outcome("validation");
            return Err(e.into());
        }

        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "sign_ingest");
        let span = logger.create_span();

        async move {
            logger.log_start(&format!("{} ({})", meta.filename, meta.mimetype));
            let mut tracker = StageTracker::new(logger.clone(), self.config.pose_validation);

            let mut workspace = match self.staging.workspace(&job_id).await {
                Ok(ws) => ws,
                Err(e) => {
                    tracker.fail();
                    logger.log_error(&e.to_string());
                    metrics::record_job_outcome(e.kind());
                    return Err(e);
                }
            };

            let job = UploadJob {
                id: job_id.clone(),
                mimetype: meta.mimetype,
                original_filename: meta.filename,
                declared_size: meta.declared_size,
                staging_dir: workspace.dir().to_path_buf(),
                received_at: Utc::now(),
            };

            let result = self
                .run_stages(&job, form, body.as_mut(), &mut workspace, &mut tracker)
                .await;

            let report = workspace.cleanup().await;
            metrics::record_cleanup(&report);
            if !report.is_complete() {
                logger.log_warning(&format!(
                    "Staging cleanup incomplete: {} failures",
                    report.failed.len()
                ));
            }

            match result {
                Ok((record, pose_analysis)) => {
                    tracker.advance(PipelineStage::CleanedUp)?;
                    metrics::record_job_outcome("accepted");
                    logger.log_completion(&format!("Sign {} ({}) published", record.id, record.gloss));
                    Ok(SignOutcome {
                        job_id,
                        record,
                        pose_analysis,
                        stages: tracker.visited,
                    })
                }
                Err(e) => {
                    tracker.fail();
                    if e.is_caller_visible() {
                        logger.log_warning(&e.to_string());
                    } else {
                        logger.log_error(&e.to_string());
                    }
                    metrics::record_job_outcome(e.kind());
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        job: &UploadJob,
        form: SignForm,
        body: &mut (dyn AsyncRead + Send + Unpin),
        ws: &mut JobWorkspace,
        tracker: &mut StageTracker,
    ) -> PipelineResult<(SignRecord, Option<PoseAnalysis>)> {
        let extension = crate::staging::raw_extension(&job.original_filename, &job.mimetype);
        let raw = ws
            .stage(body, &extension, self.config.upload_policy.max_bytes)
            .await?;
        tracker.advance(PipelineStage::Staged)?;

        let pending = ws.derive(ArtifactRole::Normalized, "mp4");
        self.transcoder.normalize(&raw.path, pending.path()).await?;
        let normalized = ws.commit(pending).await?;
        tracker.advance(PipelineStage::Normalized)?;

        let duration = match self.transcoder.probe(&normalized.path).await {
            Ok(info) => info.duration,
            Err(e) => {
                tracker
                    .logger
                    .log_warning(&format!("Probe failed, using fixed-rate sampling: {}", e));
                None
            }
        };

        let pending = ws.derive(ArtifactRole::BackgroundTreated, "mp4");
        self.transcoder
            .apply_background(&normalized.path, pending.path(), &self.config.background)
            .await?;
        let treated = ws.commit(pending).await?;
        tracker.advance(PipelineStage::BackgroundTreated)?;

        let pending = ws.derive(ArtifactRole::Thumbnail, "jpg");
        self.transcoder
            .extract_thumbnail(&treated.path, pending.path(), duration)
            .await?;
        let thumbnail = ws.commit(pending).await?;
        tracker.advance(PipelineStage::ThumbnailReady)?;

        let (pose_analysis, keypoints) = if self.config.pose_validation {
            let (analysis, keypoints) = self.validate_pose(&treated, duration, ws, tracker).await?;
            (Some(analysis), keypoints)
        } else {
            (None, form.client_keypoints.clone())
        };

        let (video, thumb) = self.publish(&job.id, &treated, &thumbnail).await?;
        tracker.advance(PipelineStage::Published)?;

        let record = SignRecord::new(form, &video, &thumb, keypoints);
        if let Err(e) = self.sink.persist(&record).await {
            error!(
                job_id = %job.id,
                video_url = %video.url,
                thumb_url = %thumb.url,
                "Record not persisted; published assets left in place"
            );
            return Err(e.into());
        }
        tracker.advance(PipelineStage::Persisted)?;

        Ok((record, pose_analysis))
    }

    /// Sample frames, score them, and gate the job on the verdict.
    async fn validate_pose(
        &self,
        video: &StagedArtifact,
        duration: Option<f64>,
        ws: &mut JobWorkspace,
        tracker: &mut StageTracker,
    ) -> PipelineResult<(PoseAnalysis, Option<serde_json::Value>)> {
        let count = self.config.pose_frame_count;
        for i in 1..=count {
            ws.derive(ArtifactRole::Frame(i), "jpg");
        }

        let dir = ws.dir().to_path_buf();
        let frames = self
            .transcoder
            .extract_frames(&video.path, &dir, count, duration)
            .await?;
        let frames: Vec<_> = ws
            .register_frames(&frames)
            .await?
            .into_iter()
            .map(|a| a.path)
            .collect();
        tracker.advance(PipelineStage::FramesExtracted)?;

        let detailed = self.pose.analyze_frames_detailed(&frames).await?;
        let validity = &detailed.validity;
        metrics::record_pose_frames(
            validity.valid_frames,
            validity.frames_analyzed - validity.valid_frames,
        );

        let representative = detailed.middle();
        let analysis = PoseAnalysis::new(
            validity,
            representative.map(|e| e.has_upper_body).unwrap_or(false),
        );
        tracker.advance(PipelineStage::PoseScored)?;

        info!(
            valid_frames = analysis.valid_frames,
            frames_analyzed = analysis.frames_analyzed,
            confidence = analysis.confidence,
            "Pose verdict: {}",
            if analysis.is_valid { "accepted" } else { "rejected" }
        );

        if !analysis.is_valid {
            return Err(PipelineError::PoseRejected { analysis });
        }

        let keypoints = representative
            .and_then(|e| e.keypoints())
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| PipelineError::staging(format!("serialize keypoints: {e}")))?;

        Ok((analysis, keypoints))
    }

    async fn publish(
        &self,
        job_id: &JobId,
        video: &StagedArtifact,
        thumbnail: &StagedArtifact,
    ) -> PipelineResult<(PublishedAsset, PublishedAsset)> {
        let stamp = Utc::now().timestamp_millis();

        let video_url = self
            .publish_one(
                &video.path,
                PublishOptions::new(
                    ResourceKind::Video,
                    &self.config.video_folder,
                    format!("sign-{}-{}", job_id, stamp),
                ),
            )
            .await?;
        let thumb_url = self
            .publish_one(
                &thumbnail.path,
                PublishOptions::new(
                    ResourceKind::Image,
                    &self.config.thumbnail_folder,
                    format!("thumb-{}-{}", job_id, stamp),
                ),
            )
            .await?;

        if video_url == thumb_url {
            return Err(PipelineError::publication(format!(
                "{} returned the same URL for video and thumbnail",
                self.publisher.name()
            )));
        }

        Ok((
            PublishedAsset {
                role: AssetRole::Video,
                url: video_url,
            },
            PublishedAsset {
                role: AssetRole::Thumbnail,
                url: thumb_url,
            },
        ))
    }

    async fn publish_one(&self, path: &Path, options: PublishOptions) -> PipelineResult<String> {
        let url = self.publisher.publish(path, &options).await?;
        if url.trim().is_empty() {
            return Err(PipelineError::publication(format!(
                "{} returned an empty URL for {}",
                self.publisher.name(),
                options.public_id
            )));
        }
        info!(
            publisher = self.publisher.name(),
            kind = options.resource_kind.as_str(),
            "Published {}",
            url
        );
        Ok(url)
    }
}
