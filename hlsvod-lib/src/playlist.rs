//! Segment planning and playlist generation.
//!
//! Segment boundaries are the keyframe timestamps of the video stream:
//! segment `i` (1-indexed) spans `[times[i-1], times[i])`. Both functions
//! here are pure; the same metadata always yields byte-identical output.

use regex::Regex;

use crate::error::{Result, VodError};

/// Nominal segment duration in seconds, used for the target-duration header.
/// This is a fixed constant, not the actual maximum segment duration.
pub const SEGMENT_DURATION: f64 = 4.75;

/// Build the segment filename for a 1-indexed segment.
pub fn segment_name(prefix: &str, index: usize) -> String {
    format!("{}-{:05}.ts", prefix, index)
}

/// Parse a segment filename back into its 1-indexed segment number.
pub fn parse_segment_name(prefix: &str, name: &str) -> Option<usize> {
    let re = Regex::new(&format!(r"^{}-(\d{{5}})\.ts$", regex::escape(prefix))).unwrap();
    re.captures(name).and_then(|c| c[1].parse().ok())
}

/// Validate keyframe timestamps as segment boundaries.
///
/// The sequence must hold at least two values and be strictly increasing,
/// so that every derived segment duration is positive and the boundary
/// list is gapless.
pub(crate) fn plan_segments(keyframe_times: &[f64]) -> Result<Vec<f64>> {
    if keyframe_times.len() < 2 {
        return Err(VodError::Probe(
            "not enough keyframe timestamps to plan segments".to_string(),
        ));
    }
    for pair in keyframe_times.windows(2) {
        if pair[1] <= pair[0] {
            return Err(VodError::Probe(format!(
                "keyframe timestamps not strictly increasing: {} -> {}",
                pair[0], pair[1]
            )));
        }
    }
    Ok(keyframe_times.to_vec())
}

/// Generate the VOD playlist for the given segment boundary times.
///
/// `segment_duration` is the nominal target duration written into the
/// header; the per-segment `#EXTINF` durations come from the boundaries.
pub fn generate_playlist(segment_times: &[f64], segment_duration: f64, prefix: &str) -> String {
    let mut lines = vec![
        "#EXTM3U".to_string(),
        "#EXT-X-VERSION:4".to_string(),
        "#EXT-X-PLAYLIST-TYPE:VOD".to_string(),
        "#EXT-X-MEDIA-SEQUENCE:0".to_string(),
        format!("#EXT-X-TARGETDURATION:{:.2}", segment_duration),
    ];

    for i in 1..segment_times.len() {
        lines.push(format!(
            "#EXTINF:{:.3}, no desc",
            segment_times[i] - segment_times[i - 1]
        ));
        lines.push(segment_name(prefix, i));
    }

    lines.push("#EXT-X-ENDLIST".to_string());
    lines.join("\n")
}
