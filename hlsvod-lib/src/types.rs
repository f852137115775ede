//! Probe result types.
//!
//! A `ProbeMetadata` is produced once per manager lifetime (or loaded from
//! the metadata cache) and is read-only after initialization completes.

use serde::{Deserialize, Serialize};

/// Stream metadata extracted from a media file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeMetadata {
    /// Total duration of the media in seconds
    pub duration: f64,
    /// Video stream descriptor, if the file has one
    pub video: Option<VideoMetadata>,
    /// Audio stream descriptor, if the file has one
    pub audio: Option<AudioMetadata>,
}

/// Video stream descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Width of the video in pixels
    pub width: u32,
    /// Height of the video in pixels
    pub height: u32,
    /// Duration of the video stream in seconds
    pub duration: f64,
    /// Keyframe presentation timestamps in seconds, strictly increasing,
    /// starting at 0. `None` when the fast container probe could not
    /// extract them and the full packet scan has not run yet.
    pub keyframe_times: Option<Vec<f64>>,
}

/// Audio stream descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioMetadata {
    /// Duration of the audio stream in seconds
    pub duration: f64,
    /// Codec name as reported by the prober
    pub codec_name: Option<String>,
}
