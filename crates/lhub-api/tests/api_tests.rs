//! API integration tests.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use lhub_api::{create_router, ApiConfig, AppState};
use lhub_media::{MediaResult, ProcessInvocation, ProcessOutput, ProcessRunner, Transcoder};
use lhub_models::Landmark;
use lhub_pipeline::{MemoryRecordSink, PipelineConfig, SignPipeline};
use lhub_pose::{LandmarkModel, PoseEstimator, PoseResult};
use lhub_storage::{PublishOptions, Publisher, StorageResult};

const BOUNDARY: &str = "----lhub-test-boundary";

/// Writes a stand-in file for every FFmpeg call; FFprobe reports nothing.
struct StubRunner {
    fail_ffmpeg: bool,
}

#[async_trait]
impl ProcessRunner for StubRunner {
    async fn run(&self, invocation: &ProcessInvocation) -> MediaResult<ProcessOutput> {
        if invocation.tool_name() == "ffprobe" {
            return Ok(ProcessOutput::failure(1, "no probe in tests"));
        }
        if self.fail_ffmpeg {
            return Ok(ProcessOutput::failure(1, "Invalid data found when processing input"));
        }
        std::fs::write(invocation.last_arg().unwrap(), b"encoded").unwrap();
        Ok(ProcessOutput::success())
    }
}

struct NoModel;

impl LandmarkModel for NoModel {
    fn infer(&self, _image: &image::RgbImage) -> PoseResult<Option<Vec<Landmark>>> {
        Ok(None)
    }
}

struct StubPublisher;

#[async_trait]
impl Publisher for StubPublisher {
    async fn publish(&self, _path: &Path, options: &PublishOptions) -> StorageResult<String> {
        Ok(format!("https://cdn.test/{}", options.qualified_id()?))
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

struct TestApp {
    router: Router,
    staging: TempDir,
    sink: Arc<MemoryRecordSink>,
}

fn test_app(fail_ffmpeg: bool) -> TestApp {
    test_app_with_limit(fail_ffmpeg, None)
}

fn test_app_with_limit(fail_ffmpeg: bool, max_bytes: Option<u64>) -> TestApp {
    let staging = TempDir::new().unwrap();
    let sink = Arc::new(MemoryRecordSink::new());
    let mut config = PipelineConfig {
        staging_dir: staging.path().join("uploads"),
        ..PipelineConfig::default()
    };
    if let Some(max) = max_bytes {
        config.upload_policy.max_bytes = max;
    }
    let pipeline = SignPipeline::new(
        config,
        Transcoder::new(Arc::new(StubRunner { fail_ffmpeg })),
        Arc::new(PoseEstimator::with_model(Arc::new(NoModel))),
        Arc::new(StubPublisher),
        sink.clone(),
    );
    let router = create_router(AppState::new(ApiConfig::default(), pipeline), None);

    TestApp {
        router,
        staging,
        sink,
    }
}

fn multipart_body(file: Option<(&str, &str, &[u8])>, fields: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some((filename, content_type, data)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn post_signs(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/signs")
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app(false);

    let response = app
        .router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["pose_model_loaded"], false);
}

#[tokio::test]
async fn test_metrics_route_absent_when_disabled() {
    let app = test_app(false);

    let response = app
        .router
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_sign() {
    let app = test_app(false);
    let body = multipart_body(
        Some(("casa.mp4", "video/mp4", &[0u8; 2048][..])),
        &[("gloss", "CASA"), ("description", "Sinal de casa"), ("category", "noun")],
    );

    let response = app.router.oneshot(post_signs(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    let sign = &body["sign"];
    assert_eq!(sign["gloss"], "CASA");
    assert_eq!(sign["category"], "noun");
    assert!(sign["id"].is_string());
    assert!(sign["videoUrl"].as_str().unwrap().starts_with("https://cdn.test/librashub/signs/"));
    assert!(sign["thumbUrl"].as_str().unwrap().starts_with("https://cdn.test/librashub/thumbnails/"));
    assert!(sign["keypoints"].is_null());
    assert!(sign["poseAnalysis"].is_null());

    assert_eq!(app.sink.len(), 1);
    assert_eq!(std::fs::read_dir(app.staging.path().join("uploads")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_blank_fields_get_defaults() {
    let app = test_app(false);
    let body = multipart_body(Some(("sign.webm", "video/webm", &[1u8; 512][..])), &[("gloss", "  ")]);

    let response = app.router.oneshot(post_signs(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;
    assert_eq!(body["sign"]["gloss"], "Untitled");
    assert_eq!(body["sign"]["category"], "outros");
    assert_eq!(body["sign"]["description"], "");
}

#[tokio::test]
async fn test_rejects_non_video() {
    let app = test_app(false);
    let body = multipart_body(Some(("doc.pdf", "application/pdf", &b"%PDF-1.7"[..])), &[("gloss", "CASA")]);

    let response = app.router.oneshot(post_signs(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Invalid file type. Only video files are allowed.");
    assert!(!app.staging.path().join("uploads").exists());
    assert!(app.sink.is_empty());
}

#[tokio::test]
async fn test_missing_file() {
    let app = test_app(false);
    let body = multipart_body(None, &[("gloss", "CASA")]);

    let response = app.router.oneshot(post_signs(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["message"], "No file uploaded");
}

#[tokio::test]
async fn test_processing_failure_is_generic() {
    let app = test_app(true);
    let body = multipart_body(Some(("casa.mp4", "video/mp4", &[0u8; 2048][..])), &[("gloss", "CASA")]);

    let response = app.router.oneshot(post_signs(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["message"], "Error processing video");
    assert!(app.sink.is_empty());
    assert_eq!(std::fs::read_dir(app.staging.path().join("uploads")).unwrap().count(), 0);
}

#[tokio::test]
async fn test_invalid_metadata_is_bad_request() {
    let app = test_app(false);
    let body = multipart_body(
        Some(("casa.mp4", "video/mp4", &[0u8; 64][..])),
        &[("gloss", "CASA"), ("metadata", "{not json")],
    );

    let response = app.router.oneshot(post_signs(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversize_file_part_is_payload_too_large() {
    let app = test_app_with_limit(false, Some(1024));
    let body = multipart_body(Some(("casa.mp4", "video/mp4", &[0u8; 2048][..])), &[("gloss", "CASA")]);

    let response = app.router.oneshot(post_signs(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = json_body(response).await;
    assert_eq!(body["message"], "File too large: 2048 bytes exceeds limit of 1024 bytes");
    assert!(!app.staging.path().join("uploads").exists());
    assert!(app.sink.is_empty());
}

#[tokio::test]
async fn test_body_over_route_limit_is_payload_too_large() {
    let app = test_app_with_limit(false, Some(1024));
    let oversized = vec![0u8; ApiConfig::body_limit(1024) + 1];
    let body = multipart_body(Some(("casa.mp4", "video/mp4", &oversized[..])), &[("gloss", "CASA")]);
    let request = Request::builder()
        .method("POST")
        .uri("/signs")
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .header("content-length", body.len())
        .body(Body::from(body))
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(!app.staging.path().join("uploads").exists());
    assert!(app.sink.is_empty());
}
