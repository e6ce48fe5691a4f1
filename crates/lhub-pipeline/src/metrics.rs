//! Pipeline metrics, recorded through the `metrics` facade.

use metrics::{counter, histogram};

use lhub_models::PipelineStage;

use crate::staging::CleanupReport;

/// Metric names as constants for consistency.
pub mod names {
    pub const SIGN_JOBS_TOTAL: &str = "lhub_sign_jobs_total";
    pub const STAGE_DURATION_SECONDS: &str = "lhub_stage_duration_seconds";
    pub const POSE_FRAMES_TOTAL: &str = "lhub_pose_frames_total";
    pub const CLEANUP_FAILURES_TOTAL: &str = "lhub_cleanup_failures_total";
}

/// Record a finished job: `accepted`, or the error kind.
pub fn record_job_outcome(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::SIGN_JOBS_TOTAL, &labels).increment(1);
}

/// Record time spent reaching `stage` from its predecessor.
pub fn record_stage_duration(stage: PipelineStage, duration_secs: f64) {
    let labels = [("stage", stage.as_str().to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_pose_frames(valid: usize, invalid: usize) {
    counter!(names::POSE_FRAMES_TOTAL, "verdict" => "valid").increment(valid as u64);
    counter!(names::POSE_FRAMES_TOTAL, "verdict" => "invalid").increment(invalid as u64);
}

pub fn record_cleanup(report: &CleanupReport) {
    if !report.failed.is_empty() {
        counter!(names::CLEANUP_FAILURES_TOTAL).increment(report.failed.len() as u64);
    }
}
