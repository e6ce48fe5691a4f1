//! FFprobe media information.

use serde::{Deserialize, Serialize};

use crate::error::MediaResult;

/// Container-level facts used to drive sampling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Duration in seconds, when the container reports one
    pub duration: Option<f64>,
    /// Bitrate in bits/second
    pub bitrate: Option<u64>,
    pub stream_count: usize,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Frame rate (fps)
    pub fps: Option<f64>,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    bit_rate: Option<String>,
    nb_streams: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Arguments for a JSON probe of `path`.
pub fn probe_args(path: &str) -> Vec<String> {
    [
        "-v",
        "quiet",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
        path,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Parse `ffprobe -print_format json` output.
///
/// Browser-recorded WebM files often carry no duration; that is reported as
/// `None` rather than an error.
pub fn parse_probe_output(stdout: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let format = probe.format.as_ref();
    let duration = format
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);
    let bitrate = format
        .and_then(|f| f.bit_rate.as_deref())
        .and_then(|b| b.parse::<u64>().ok());
    let stream_count = format
        .and_then(|f| f.nb_streams)
        .unwrap_or(probe.streams.len());

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    Ok(MediaInfo {
        duration,
        bitrate,
        stream_count,
        width: video.and_then(|v| v.width),
        height: video.and_then(|v| v.height),
        fps: video
            .and_then(|v| v.avg_frame_rate.as_deref().or(v.r_frame_rate.as_deref()))
            .and_then(parse_frame_rate),
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}
