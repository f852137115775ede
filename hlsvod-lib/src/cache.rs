//! Metadata cache policy.
//!
//! Probe results are expensive (the keyframe scan decodes packet headers
//! for the whole file), so they are serialized to disk keyed by media
//! identity. The cache is advisory: any read, decode or write failure
//! falls back to a fresh probe and is never surfaced to a request.
//!
//! Two backends exist: a global one in a shared cache directory, keyed by
//! a SHA-256 of the media path, and a local one co-located with the
//! source file. The global backend is selected when a cache directory is
//! configured.

use std::path::PathBuf;

use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::{Result, VodError};
use crate::types::ProbeMetadata;

/// Suffix for co-located cache files
const LOCAL_CACHE_SUFFIX: &str = ".hlsvod-cache";

/// Resolve the cache file path for the given configuration.
pub(crate) fn cache_file_path(config: &Config) -> PathBuf {
    match &config.cache_dir {
        Some(dir) if !dir.as_os_str().is_empty() => {
            let mut hasher = Sha256::new();
            hasher.update(config.media_path.to_string_lossy().as_bytes());
            dir.join(format!("{:x}", hasher.finalize()))
        }
        _ => {
            let mut file = config.media_path.as_os_str().to_os_string();
            file.push(LOCAL_CACHE_SUFFIX);
            PathBuf::from(file)
        }
    }
}

/// Load cached metadata.
///
/// Returns `None` when there is no usable entry: a missing file is
/// silent, corruption and read errors are logged and replaced.
pub(crate) async fn load(config: &Config) -> Option<ProbeMetadata> {
    let path = cache_file_path(config);

    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            tracing::warn!(
                cache = %path.display(),
                error = %err,
                "metadata cache read failed, replacing"
            );
            return None;
        }
    };

    match serde_json::from_slice(&data) {
        Ok(metadata) => Some(metadata),
        Err(err) => {
            tracing::warn!(
                cache = %path.display(),
                error = %err,
                "metadata cache decode failed, replacing"
            );
            None
        }
    }
}

/// Serialize fresh metadata into the configured cache backend.
pub(crate) async fn store(config: &Config, metadata: &ProbeMetadata) -> Result<()> {
    let path = cache_file_path(config);
    let data = serde_json::to_vec(metadata).map_err(|e| VodError::Cache(e.to_string()))?;
    tokio::fs::write(&path, data)
        .await
        .map_err(|e| VodError::Cache(format!("write {}: {}", path.display(), e)))
}
