//! Server configuration

use hlsvod_lib::{AudioProfile, VideoProfile};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Directory media paths are resolved under
    pub media_root: PathBuf,

    /// Directory transcoded segments are written to, one subdirectory per media file
    pub transcode_root: PathBuf,

    /// Filename prefix for produced segments
    pub segment_prefix: String,

    /// Path to the ffprobe binary
    pub ffprobe_binary: PathBuf,

    /// Path to the ffmpeg binary
    pub ffmpeg_binary: PathBuf,

    /// Whether probe metadata is cached on disk
    pub cache_enabled: bool,

    /// Shared metadata cache directory; `None` caches next to the media file
    pub cache_dir: Option<PathBuf>,

    /// Video encode profile
    pub video_profile: VideoProfile,

    /// Audio encode profile
    pub audio_profile: AudioProfile,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_enabled: true,
            media_root: PathBuf::from("."),
            transcode_root: std::env::temp_dir().join("hlsvod"),
            segment_prefix: "segment".to_string(),
            ffprobe_binary: PathBuf::from("ffprobe"),
            ffmpeg_binary: PathBuf::from("ffmpeg"),
            cache_enabled: true,
            cache_dir: None,
            video_profile: VideoProfile::default(),
            audio_profile: AudioProfile::default(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string for binding
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_addr(), "0.0.0.0:8080");
        assert!(config.cache_enabled);
    }
}
