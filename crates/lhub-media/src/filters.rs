//! FFmpeg filter graphs used by the sign pipeline.

use lhub_models::encoding::{FRAME_HEIGHT, FRAME_WIDTH, THUMBNAIL_HEIGHT, THUMBNAIL_WIDTH};

/// Fit into `width`x`height`, preserving aspect ratio with letterbox padding.
pub fn fit_and_pad(width: u32, height: u32) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
        w = width,
        h = height
    )
}

/// Thumbnail geometry.
pub fn thumbnail_scale() -> String {
    fit_and_pad(THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT)
}

/// Thumbnail when the seek position is unknown: FFmpeg picks the most
/// representative frame of the first batch.
pub fn representative_thumbnail() -> String {
    format!("thumbnail,{}", thumbnail_scale())
}

/// Evenly spaced sampling at `rate` frames per second.
pub fn frame_sampling(rate: f64) -> String {
    format!("fps={},{}", format_rate(rate), fit_and_pad(FRAME_WIDTH, FRAME_HEIGHT))
}

fn format_rate(rate: f64) -> String {
    let s = format!("{:.6}", rate);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Key out a uniform backdrop and composite over a solid fill.
///
/// The fill is painted with `drawbox` over a copy of the input so it always
/// matches the source geometry. Output label is `[out]`.
pub fn chroma_key_composite(key_color: &str, similarity: f32, blend: f32, fill_color: &str) -> String {
    format!(
        concat!(
            "[0:v]split=2[bgsrc][fgsrc];",
            "[bgsrc]drawbox=x=0:y=0:w=iw:h=ih:color={fill}:t=fill[bg];",
            "[fgsrc]chromakey={key}:{sim:.3}:{blend:.3}[fg];",
            "[bg][fg]overlay=format=auto,format=yuv420p[out]"
        ),
        fill = fill_color,
        key = key_color,
        sim = similarity,
        blend = blend,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_sampling_rate_formatting() {
        assert!(frame_sampling(1.0).starts_with("fps=1,"));
        assert!(frame_sampling(4.0).starts_with("fps=4,"));
        assert!(frame_sampling(0.25).starts_with("fps=0.25,"));
        assert!(frame_sampling(12.0 / 7.0).starts_with("fps=1.714286,"));
    }

    #[test]
    fn test_thumbnail_filters() {
        assert!(thumbnail_scale().contains("scale=640:480"));
        assert!(representative_thumbnail().starts_with("thumbnail,"));
    }

    #[test]
    fn test_chroma_key_graph() {
        let graph = chroma_key_composite("0x00FF00", 0.15, 0.1, "0xF5F5F5");
        assert!(graph.contains("chromakey=0x00FF00:0.150:0.100"));
        assert!(graph.contains("color=0xF5F5F5"));
        assert!(graph.ends_with("[out]"));
    }
}
