//! Request handlers
//!
//! The VOD endpoint maps `/<media path>/index.m3u8` to the manager's
//! playlist and `/<media path>/<prefix>-NNNNN.ts` to on-demand segment
//! production. Error-to-status mapping lives on `ServerError`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::ServerError;
use crate::state::AppState;

/// Playlist file name within a media path
const PLAYLIST_NAME: &str = "index.m3u8";

/// Health check endpoint
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Version information endpoint
pub async fn version_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "online",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// VOD endpoint: playlist or segment, mapped to `/vod/{*path}`
pub async fn vod_request(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response, ServerError> {
    let (media_rel, leaf) = path
        .rsplit_once('/')
        .ok_or_else(|| ServerError::MediaNotFound(path.clone()))?;

    if leaf == PLAYLIST_NAME {
        let manager = state.manager_for(media_rel)?;
        let playlist = manager.serve_playlist().await?;

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/vnd.apple.mpegurl"),
        );
        return Ok((headers, playlist).into_response());
    }

    if let Some(index) = hlsvod_lib::parse_segment_name(&state.config.segment_prefix, leaf) {
        let manager = state.manager_for(media_rel)?;
        let bytes = manager.serve_segment(index).await?;

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("video/mp2t"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        return Ok((headers, bytes).into_response());
    }

    Err(ServerError::MediaNotFound(path))
}

/// List of active streams
#[derive(Debug, Serialize)]
pub struct StreamListResponse {
    pub count: usize,
    pub streams: Vec<StreamInfo>,
}

#[derive(Debug, Serialize)]
pub struct StreamInfo {
    pub path: String,
    pub ready: bool,
}

/// List active streams
/// GET /streams
pub async fn list_streams(State(state): State<Arc<AppState>>) -> Json<StreamListResponse> {
    let streams: Vec<StreamInfo> = state
        .managers
        .iter()
        .map(|entry| StreamInfo {
            path: entry.key().clone(),
            ready: entry.value().is_ready(),
        })
        .collect();

    Json(StreamListResponse {
        count: streams.len(),
        streams,
    })
}

/// Stop a stream and drop its manager
/// DELETE /streams/{*path}
pub async fn delete_stream(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<StatusCode, ServerError> {
    state
        .remove_manager(&path)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(ServerError::MediaNotFound(path))
}
