//! Server-specific error types

use axum::http::StatusCode;
use hlsvod_lib::VodError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("media not found: {0}")]
    MediaNotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Vod(#[from] VodError),
}

impl ServerError {
    /// Map an error to its HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::MediaNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Vod(VodError::SegmentNotFound(_)) => StatusCode::NOT_FOUND,
            ServerError::Vod(VodError::NotReadyTimeout) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}
