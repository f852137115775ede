//! Configuration file support
//!
//! Loads server configuration from TOML files. Every setting is optional
//! and falls back to the built-in default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::ServerConfig;
use crate::error::ServerError;
use hlsvod_lib::{AudioProfile, VideoProfile};

/// Configuration file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Server settings
    pub server: Option<ServerSettings>,
    /// Media settings
    pub media: Option<MediaSettings>,
    /// Encode settings
    pub encode: Option<EncodeSettings>,
    /// Metadata cache settings
    pub cache: Option<CacheSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to
    pub host: Option<String>,
    /// Port to listen on
    pub port: Option<u16>,
    /// Enable CORS
    pub cors_enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaSettings {
    /// Directory media paths are resolved under
    pub root: Option<PathBuf>,
    /// Directory transcoded segments are written to
    pub transcode_dir: Option<PathBuf>,
    /// Segment filename prefix
    pub segment_prefix: Option<String>,
    /// Path to the ffprobe binary
    pub ffprobe_binary: Option<PathBuf>,
    /// Path to the ffmpeg binary
    pub ffmpeg_binary: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncodeSettings {
    /// Output width in pixels
    pub width: Option<u32>,
    /// Output height in pixels
    pub height: Option<u32>,
    /// Video bitrate in kbit/s
    pub video_bitrate_kbps: Option<u32>,
    /// Audio bitrate in kbit/s
    pub audio_bitrate_kbps: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Whether probe metadata is cached on disk
    pub enabled: Option<bool>,
    /// Shared metadata cache directory
    pub dir: Option<PathBuf>,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Convert to a ServerConfig, filling gaps with defaults
    pub fn into_server_config(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        let server = self.server.unwrap_or_default();
        let media = self.media.unwrap_or_default();
        let encode = self.encode.unwrap_or_default();
        let cache = self.cache.unwrap_or_default();

        let default_video = VideoProfile::default();
        let default_audio = AudioProfile::default();

        ServerConfig {
            host: server.host.unwrap_or(defaults.host),
            port: server.port.unwrap_or(defaults.port),
            cors_enabled: server.cors_enabled.unwrap_or(defaults.cors_enabled),
            media_root: media.root.unwrap_or(defaults.media_root),
            transcode_root: media.transcode_dir.unwrap_or(defaults.transcode_root),
            segment_prefix: media.segment_prefix.unwrap_or(defaults.segment_prefix),
            ffprobe_binary: media.ffprobe_binary.unwrap_or(defaults.ffprobe_binary),
            ffmpeg_binary: media.ffmpeg_binary.unwrap_or(defaults.ffmpeg_binary),
            cache_enabled: cache.enabled.unwrap_or(defaults.cache_enabled),
            cache_dir: cache.dir,
            video_profile: VideoProfile {
                width: encode.width.unwrap_or(default_video.width),
                height: encode.height.unwrap_or(default_video.height),
                bitrate_kbps: encode
                    .video_bitrate_kbps
                    .unwrap_or(default_video.bitrate_kbps),
            },
            audio_profile: AudioProfile {
                bitrate_kbps: encode
                    .audio_bitrate_kbps
                    .unwrap_or(default_audio.bitrate_kbps),
            },
        }
    }
}
