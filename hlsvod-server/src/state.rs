//! Application state management
//!
//! One `Manager` per media file, created lazily on the first request for
//! that file and kept in a concurrent map.

use std::path::Component;
use std::sync::Arc;

use dashmap::DashMap;
use hlsvod_lib::{Config, Manager, ManagerEvents, VodError};

use crate::config::ServerConfig;
use crate::error::ServerError;

/// Application state shared across all handlers
pub struct AppState {
    /// Active managers (relative media path -> manager)
    pub managers: DashMap<String, Manager>,

    /// Server configuration
    pub config: ServerConfig,
}

/// Observer wiring manager lifecycle transitions into the server log
struct LogEvents {
    media: String,
}

impl ManagerEvents for LogEvents {
    fn on_start(&self) {
        tracing::info!(media = %self.media, "transcode ready");
    }

    fn on_stop(&self, err: Option<&VodError>) {
        match err {
            Some(err) => tracing::warn!(media = %self.media, error = %err, "transcode stopped"),
            None => tracing::info!(media = %self.media, "transcode stopped"),
        }
    }
}

impl AppState {
    /// Create a new AppState with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self {
            managers: DashMap::new(),
            config,
        }
    }

    /// Get the manager for a media file, creating and starting it on the
    /// first request.
    pub fn manager_for(&self, rel_path: &str) -> crate::error::Result<Manager> {
        if let Some(manager) = self.managers.get(rel_path) {
            return Ok(manager.clone());
        }

        let media_path = self.resolve_media(rel_path)?;

        let mut config = Config::new(
            media_path,
            self.config.transcode_root.join(rel_path.replace('/', "_")),
            self.config.segment_prefix.clone(),
        );
        config.ffprobe_binary = self.config.ffprobe_binary.clone();
        config.ffmpeg_binary = self.config.ffmpeg_binary.clone();
        config.cache = self.config.cache_enabled;
        config.cache_dir = self.config.cache_dir.clone();
        config.video_profile = self.config.video_profile.clone();
        config.audio_profile = self.config.audio_profile.clone();

        let manager = Manager::builder(config)
            .events(Arc::new(LogEvents {
                media: rel_path.to_string(),
            }))
            .build();

        let manager = self
            .managers
            .entry(rel_path.to_string())
            .or_insert(manager)
            .clone();

        // a concurrent request may have won the insert and started it
        match manager.start() {
            Ok(()) | Err(VodError::AlreadyRunning) => {}
            Err(err) => return Err(err.into()),
        }
        Ok(manager)
    }

    /// Stop and drop the manager for a media file.
    pub fn remove_manager(&self, rel_path: &str) -> Option<Manager> {
        self.managers.remove(rel_path).map(|(_, manager)| {
            manager.stop();
            manager
        })
    }

    /// Run the segment window cleanup on every active manager.
    pub fn cleanup_managers(&self) {
        for entry in self.managers.iter() {
            entry.value().cleanup();
        }
    }

    /// Resolve a relative request path under the media root, rejecting
    /// traversal outside it.
    fn resolve_media(&self, rel_path: &str) -> crate::error::Result<std::path::PathBuf> {
        let rel = std::path::Path::new(rel_path);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(ServerError::MediaNotFound(rel_path.to_string()));
        }

        let media_path = self.config.media_root.join(rel);
        if !media_path.is_file() {
            return Err(ServerError::MediaNotFound(rel_path.to_string()));
        }
        Ok(media_path)
    }
}
