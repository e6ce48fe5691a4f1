//! End-to-end pipeline scenarios against fake collaborators.

use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use lhub_media::{MediaError, MediaResult, ProcessInvocation, ProcessOutput, ProcessRunner, Transcoder};
use lhub_models::{Landmark, PipelineStage, SignForm, SignRecord, UploadMeta, ValidationError};
use lhub_pipeline::{
    MemoryRecordSink, PipelineConfig, PipelineError, RecordSink, SignPipeline, SignUpload, SinkError,
};
use lhub_pose::{LandmarkModel, ModelLoader, PoseEstimator, PoseResult};
use lhub_storage::{PublishOptions, Publisher, StorageError, StorageResult};

const PROBE_JSON: &str = r#"{
    "format": {"duration": "3.000000", "bit_rate": "850000", "nb_streams": 2},
    "streams": [
        {"codec_type": "video", "width": 640, "height": 480, "avg_frame_rate": "30/1"},
        {"codec_type": "audio"}
    ]
}"#;

type FailWhen = Box<dyn Fn(&ProcessInvocation) -> bool + Send + Sync>;

/// Stands in for FFmpeg/FFprobe: writes plausible outputs, fails on demand,
/// and snapshots the job directory at the moment of failure.
struct FakeRunner {
    fail_when: FailWhen,
    calls: Mutex<Vec<ProcessInvocation>>,
    snapshot: Mutex<Vec<PathBuf>>,
}

impl FakeRunner {
    fn ok() -> Self {
        Self::failing_when(|_| false)
    }

    fn failing_when(pred: impl Fn(&ProcessInvocation) -> bool + Send + Sync + 'static) -> Self {
        Self {
            fail_when: Box::new(pred),
            calls: Mutex::new(Vec::new()),
            snapshot: Mutex::new(Vec::new()),
        }
    }

    fn snapshot(&self) -> Vec<PathBuf> {
        self.snapshot.lock().unwrap().clone()
    }

    fn calls(&self) -> Vec<ProcessInvocation> {
        self.calls.lock().unwrap().clone()
    }
}

fn output_of(invocation: &ProcessInvocation) -> PathBuf {
    PathBuf::from(invocation.last_arg().unwrap())
}

fn frame_count(invocation: &ProcessInvocation) -> u32 {
    invocation
        .args
        .iter()
        .position(|a| a == "-frames:v")
        .and_then(|i| invocation.args.get(i + 1))
        .and_then(|n| n.parse().ok())
        .unwrap_or(1)
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(&self, invocation: &ProcessInvocation) -> MediaResult<ProcessOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        let is_probe = invocation.tool_name() == "ffprobe";

        if (self.fail_when)(invocation) {
            if !is_probe {
                let out = output_of(invocation);
                if !out.to_string_lossy().contains("%03d") {
                    std::fs::write(&out, b"partial").unwrap();
                }
                let dir = out.parent().unwrap();
                *self.snapshot.lock().unwrap() = std::fs::read_dir(dir)
                    .unwrap()
                    .map(|e| e.unwrap().path())
                    .collect();
            }
            return Ok(ProcessOutput::failure(1, "Invalid data found when processing input"));
        }

        if is_probe {
            return Ok(ProcessOutput {
                exit_code: Some(0),
                stdout: PROBE_JSON.to_string(),
                stderr: String::new(),
            });
        }

        let out = output_of(invocation);
        if out.to_string_lossy().contains("%03d") {
            let dir = out.parent().unwrap();
            for i in 1..=frame_count(invocation) {
                image::RgbImage::from_pixel(16, 16, image::Rgb([120, 120, 120]))
                    .save(dir.join(format!("frame-{:03}.jpg", i)))
                    .unwrap();
            }
        } else {
            std::fs::write(&out, b"encoded").unwrap();
        }
        Ok(ProcessOutput::success())
    }
}

/// Model that either sees a well-framed signer or nobody.
struct FakeModel {
    person: bool,
}

impl LandmarkModel for FakeModel {
    fn infer(&self, _image: &image::RgbImage) -> PoseResult<Option<Vec<Landmark>>> {
        if !self.person {
            return Ok(None);
        }
        Ok(Some(
            (0..33).map(|_| Landmark::new(0.5, 0.4, -0.1, 0.9)).collect(),
        ))
    }
}

struct CountingLoader {
    person: bool,
    loads: AtomicUsize,
}

impl ModelLoader for CountingLoader {
    fn load(&self) -> PoseResult<Arc<dyn LandmarkModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeModel { person: self.person }))
    }
}

#[derive(Default)]
struct FakePublisher {
    fail: bool,
    published: Mutex<Vec<PublishOptions>>,
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(&self, path: &Path, options: &PublishOptions) -> StorageResult<String> {
        assert!(path.exists(), "published file must exist at upload time");
        if self.fail {
            return Err(StorageError::Rejected {
                status: 401,
                message: "Invalid API key".to_string(),
            });
        }
        self.published.lock().unwrap().push(options.clone());
        Ok(format!(
            "https://cdn.test/{}.{}",
            options.qualified_id()?,
            path.extension().unwrap().to_string_lossy()
        ))
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

struct FailingSink;

#[async_trait]
impl RecordSink for FailingSink {
    async fn persist(&self, _record: &SignRecord) -> Result<(), SinkError> {
        Err(SinkError::Rejected("connection refused".to_string()))
    }
}

struct Harness {
    staging: TempDir,
    runner: Arc<FakeRunner>,
    publisher: Arc<FakePublisher>,
    sink: Arc<MemoryRecordSink>,
    loader: Arc<CountingLoader>,
}

impl Harness {
    fn new(runner: FakeRunner) -> Self {
        Self {
            staging: TempDir::new().unwrap(),
            runner: Arc::new(runner),
            publisher: Arc::new(FakePublisher::default()),
            sink: Arc::new(MemoryRecordSink::new()),
            loader: Arc::new(CountingLoader {
                person: true,
                loads: AtomicUsize::new(0),
            }),
        }
    }

    fn config(&self) -> PipelineConfig {
        PipelineConfig {
            staging_dir: self.staging.path().join("uploads"),
            ..PipelineConfig::default()
        }
    }

    fn pipeline(&self, config: PipelineConfig) -> SignPipeline {
        self.pipeline_with_sink(config, self.sink.clone())
    }

    fn pipeline_with_sink(&self, config: PipelineConfig, sink: Arc<dyn RecordSink>) -> SignPipeline {
        SignPipeline::new(
            config,
            Transcoder::new(self.runner.clone()),
            Arc::new(PoseEstimator::new(self.loader.clone())),
            self.publisher.clone(),
            sink,
        )
    }

    fn staging_entries(&self) -> usize {
        match std::fs::read_dir(self.staging.path().join("uploads")) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

fn mp4_upload(gloss: &str, category: &str) -> SignUpload {
    SignUpload::new(
        UploadMeta::new("video/mp4", "casa.mp4"),
        SignForm::from_fields(Some(gloss.into()), Some("Sinal de casa".into()), Some(category.into())),
        std::io::Cursor::new(vec![0u8; 4096]),
    )
}

#[tokio::test]
async fn accepted_upload_is_published_and_persisted() {
    let harness = Harness::new(FakeRunner::ok());
    let pipeline = harness.pipeline(harness.config());

    let outcome = pipeline.process(mp4_upload("CASA", "noun")).await.unwrap();

    let record = &outcome.record;
    assert_eq!(record.gloss, "CASA");
    assert_eq!(record.category, "noun");
    assert!(!record.video_url.is_empty());
    assert!(!record.thumb_url.is_empty());
    assert_ne!(record.video_url, record.thumb_url);
    assert!(record.video_url.contains("librashub/signs/sign-"));
    assert!(record.thumb_url.contains("librashub/thumbnails/thumb-"));
    assert!(record.keypoints.is_none());
    assert!(outcome.pose_analysis.is_none());

    assert_eq!(
        outcome.stages,
        vec![
            PipelineStage::Received,
            PipelineStage::Staged,
            PipelineStage::Normalized,
            PipelineStage::BackgroundTreated,
            PipelineStage::ThumbnailReady,
            PipelineStage::Published,
            PipelineStage::Persisted,
            PipelineStage::CleanedUp,
        ]
    );

    assert_eq!(harness.sink.records(), vec![record.clone()]);
    assert_eq!(harness.staging_entries(), 0);
    assert_eq!(harness.loader.loads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn thumbnail_is_taken_at_probed_midpoint() {
    let harness = Harness::new(FakeRunner::ok());
    harness
        .pipeline(harness.config())
        .process(mp4_upload("CASA", "noun"))
        .await
        .unwrap();

    let thumb = harness
        .runner
        .calls()
        .into_iter()
        .find(|c| output_of(c).to_string_lossy().ends_with("thumb.jpg"))
        .unwrap();
    let seek = thumb.args.iter().position(|a| a == "-ss").unwrap();
    assert_eq!(thumb.args[seek + 1], "1.500");
}

#[tokio::test]
async fn probe_failure_is_advisory() {
    let harness = Harness::new(FakeRunner::failing_when(|inv| inv.tool_name() == "ffprobe"));
    let outcome = harness
        .pipeline(harness.config())
        .process(mp4_upload("CASA", "noun"))
        .await
        .unwrap();
    assert_eq!(outcome.record.gloss, "CASA");

    let thumb = harness
        .runner
        .calls()
        .into_iter()
        .find(|c| output_of(c).to_string_lossy().ends_with("thumb.jpg"))
        .unwrap();
    assert!(!thumb.args.contains(&"-ss".to_string()));
    assert!(thumb.args.iter().any(|a| a.starts_with("thumbnail")));
}

#[tokio::test]
async fn non_video_is_rejected_before_staging() {
    let harness = Harness::new(FakeRunner::ok());
    let pipeline = harness.pipeline(harness.config());

    let upload = SignUpload::new(
        UploadMeta::new("application/pdf", "doc.pdf"),
        SignForm::from_fields(Some("CASA".into()), None, None),
        std::io::Cursor::new(b"%PDF-1.7".to_vec()),
    );
    let err = pipeline.process(upload).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Validation(ValidationError::UnsupportedMimeType(_))
    ));
    assert!(err.is_caller_visible());
    assert_eq!(err.to_string(), "Invalid file type. Only video files are allowed.");
    assert!(!harness.staging.path().join("uploads").exists());
    assert!(harness.runner.calls().is_empty());
}

#[tokio::test]
async fn failed_transcode_removes_every_artifact() {
    let harness = Harness::new(FakeRunner::failing_when(|inv| {
        output_of(inv).to_string_lossy().ends_with("normalized.mp4")
    }));
    let pipeline = harness.pipeline(harness.config());

    let err = pipeline.process(mp4_upload("CASA", "noun")).await.unwrap_err();

    assert!(matches!(err, PipelineError::Transcode(MediaError::ProcessFailed { .. })));
    assert!(!err.is_caller_visible());

    let before = harness.runner.snapshot();
    assert!(before.iter().any(|p| p.ends_with("raw.mp4")));
    assert!(before.iter().any(|p| p.ends_with("normalized.mp4")));
    assert!(before.iter().all(|p| !p.exists()));

    assert_eq!(harness.staging_entries(), 0);
    assert!(harness.sink.is_empty());
    assert!(harness.publisher.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_thumbnail_removes_earlier_stages() {
    let harness = Harness::new(FakeRunner::failing_when(|inv| {
        output_of(inv).to_string_lossy().ends_with("thumb.jpg")
    }));
    let err = harness
        .pipeline(harness.config())
        .process(mp4_upload("CASA", "noun"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "transcode");
    let before = harness.runner.snapshot();
    assert_eq!(before.len(), 4);
    assert!(before.iter().all(|p| !p.exists()));
    assert_eq!(harness.staging_entries(), 0);
}

#[tokio::test]
async fn oversize_stream_is_rejected_and_cleaned() {
    let harness = Harness::new(FakeRunner::ok());
    let mut config = harness.config();
    config.upload_policy.max_bytes = 1024;

    let err = harness
        .pipeline(config)
        .process(mp4_upload("CASA", "noun"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Validation(ValidationError::TooLarge { max: 1024, .. })
    ));
    assert_eq!(harness.staging_entries(), 0);
    assert!(harness.runner.calls().is_empty());
}

#[tokio::test]
async fn well_framed_signer_passes_pose_gate() {
    let harness = Harness::new(FakeRunner::ok());
    let mut config = harness.config();
    config.pose_validation = true;
    config.pose_frame_count = 4;

    let outcome = harness.pipeline(config).process(mp4_upload("CASA", "noun")).await.unwrap();

    let analysis = outcome.pose_analysis.unwrap();
    assert!(analysis.is_valid);
    assert!(analysis.has_upper_body);
    assert_eq!(analysis.frames_analyzed, 4);
    assert_eq!(analysis.valid_frames, 4);

    let keypoints = outcome.record.keypoints.unwrap();
    assert_eq!(keypoints["pose"].as_array().unwrap().len(), 33);
    assert!(keypoints["connections"].as_array().is_some());

    assert!(outcome.stages.contains(&PipelineStage::FramesExtracted));
    assert!(outcome.stages.contains(&PipelineStage::PoseScored));
    assert_eq!(harness.staging_entries(), 0);
}

#[tokio::test]
async fn missing_signer_is_rejected_without_publishing() {
    let mut harness = Harness::new(FakeRunner::ok());
    harness.loader = Arc::new(CountingLoader {
        person: false,
        loads: AtomicUsize::new(0),
    });
    let mut config = harness.config();
    config.pose_validation = true;
    config.pose_frame_count = 4;

    let err = harness
        .pipeline(config)
        .process(mp4_upload("CASA", "noun"))
        .await
        .unwrap_err();

    match &err {
        PipelineError::PoseRejected { analysis } => {
            assert!(!analysis.is_valid);
            assert_eq!(analysis.valid_frames, 0);
            assert_eq!(analysis.frames_analyzed, 4);
        }
        other => panic!("expected pose rejection, got {other:?}"),
    }
    assert!(err.is_caller_visible());
    assert_eq!(
        err.to_string(),
        "Video validation failed: Person must be visible from waist up"
    );
    assert!(harness.publisher.published.lock().unwrap().is_empty());
    assert!(harness.sink.is_empty());
    assert_eq!(harness.staging_entries(), 0);
}

#[tokio::test]
async fn client_keypoints_kept_when_pose_validation_disabled() {
    let harness = Harness::new(FakeRunner::ok());
    let form = SignForm::from_fields(Some("CASA".into()), None, None)
        .with_client_metadata(&json!({"keypoints": [{"x": 0.1}], "duration": 3}));
    let upload = SignUpload::new(
        UploadMeta::new("video/webm;codecs=vp9", "blob"),
        form,
        std::io::Cursor::new(vec![1u8; 512]),
    );

    let outcome = harness.pipeline(harness.config()).process(upload).await.unwrap();
    assert_eq!(outcome.record.keypoints, Some(json!([{"x": 0.1}])));
    assert_eq!(outcome.record.category, "outros");

    let normalize = &harness.runner.calls()[0];
    assert!(normalize.args.iter().any(|a| a.ends_with("raw.webm")));
}

#[tokio::test]
async fn publication_failure_cleans_up() {
    let mut harness = Harness::new(FakeRunner::ok());
    harness.publisher = Arc::new(FakePublisher {
        fail: true,
        ..Default::default()
    });

    let err = harness
        .pipeline(harness.config())
        .process(mp4_upload("CASA", "noun"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "publication");
    assert!(!err.is_caller_visible());
    assert!(harness.sink.is_empty());
    assert_eq!(harness.staging_entries(), 0);
}

#[tokio::test]
async fn persistence_failure_still_cleans_up() {
    let harness = Harness::new(FakeRunner::ok());
    let pipeline = harness.pipeline_with_sink(harness.config(), Arc::new(FailingSink));

    let err = pipeline.process(mp4_upload("CASA", "noun")).await.unwrap_err();

    assert!(matches!(err, PipelineError::Persistence(_)));
    // Published assets are not retracted.
    assert_eq!(harness.publisher.published.lock().unwrap().len(), 2);
    assert_eq!(harness.staging_entries(), 0);
}

#[tokio::test]
async fn concurrent_jobs_share_one_model_load() {
    let harness = Harness::new(FakeRunner::ok());
    let mut config = harness.config();
    config.pose_validation = true;
    config.pose_frame_count = 3;
    let pipeline = harness.pipeline(config);

    let (a, b, c) = tokio::join!(
        pipeline.process(mp4_upload("CASA", "noun")),
        pipeline.process(mp4_upload("ESCOLA", "noun")),
        pipeline.process(mp4_upload("AMIGO", "noun")),
    );

    let records = [a.unwrap().record, b.unwrap().record, c.unwrap().record];
    assert_ne!(records[0].video_url, records[1].video_url);
    assert_ne!(records[1].video_url, records[2].video_url);
    assert_eq!(harness.loader.loads.load(Ordering::SeqCst), 1);
    assert_eq!(harness.sink.len(), 3);
    assert_eq!(harness.staging_entries(), 0);
}
