//! Manager configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Video encode profile for produced segments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoProfile {
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Video bitrate in kbit/s
    pub bitrate_kbps: u32,
}

impl Default for VideoProfile {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            bitrate_kbps: 4200,
        }
    }
}

/// Audio encode profile for produced segments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioProfile {
    /// Audio bitrate in kbit/s
    pub bitrate_kbps: u32,
}

impl Default for AudioProfile {
    fn default() -> Self {
        Self { bitrate_kbps: 128 }
    }
}

/// Per-media configuration consumed by the manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Absolute path of the source media file
    pub media_path: PathBuf,

    /// Path to the ffprobe binary
    pub ffprobe_binary: PathBuf,

    /// Path to the ffmpeg binary
    pub ffmpeg_binary: PathBuf,

    /// Directory where produced segments are written
    pub transcode_dir: PathBuf,

    /// Filename prefix for produced segments
    pub segment_prefix: String,

    /// Segments behind the most recently requested one kept by `cleanup()`
    pub segment_buffer_min: usize,

    /// Segments ahead of the most recently requested one kept by `cleanup()`,
    /// and the largest run a single executor invocation may produce
    pub segment_buffer_max: usize,

    /// Video encode profile
    pub video_profile: VideoProfile,

    /// Audio encode profile
    pub audio_profile: AudioProfile,

    /// Whether probe results are cached on disk
    pub cache: bool,

    /// Shared cache directory; `None` selects co-located caching
    pub cache_dir: Option<PathBuf>,
}

impl Config {
    /// Create a configuration with default binaries, profiles and buffers.
    pub fn new(
        media_path: impl Into<PathBuf>,
        transcode_dir: impl Into<PathBuf>,
        segment_prefix: impl Into<String>,
    ) -> Self {
        Self {
            media_path: media_path.into(),
            ffprobe_binary: PathBuf::from("ffprobe"),
            ffmpeg_binary: PathBuf::from("ffmpeg"),
            transcode_dir: transcode_dir.into(),
            segment_prefix: segment_prefix.into(),
            segment_buffer_min: 3,
            segment_buffer_max: 5,
            video_profile: VideoProfile::default(),
            audio_profile: AudioProfile::default(),
            cache: false,
            cache_dir: None,
        }
    }
}
