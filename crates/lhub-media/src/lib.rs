//! FFmpeg CLI wrapper for sign video transcoding.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - A [`ProcessRunner`] seam over external process execution with timeouts
//! - Normalization, background treatment, thumbnail and frame sampling
//! - FFprobe metadata parsing

pub mod background;
pub mod command;
pub mod error;
pub mod filters;
pub mod probe;
pub mod transcoder;

pub use background::BackgroundTreatment;
pub use command::{
    resolve_tool, FfmpegCommand, ProcessInvocation, ProcessOutput, ProcessRunner,
    TokioProcessRunner,
};
pub use error::{MediaError, MediaResult};
pub use probe::{parse_probe_output, MediaInfo};
pub use transcoder::{sampling_rate, Transcoder, DEFAULT_PROCESS_TIMEOUT, FRAME_PREFIX};
