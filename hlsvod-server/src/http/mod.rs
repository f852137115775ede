//! HTTP routing

pub mod handlers;

use std::sync::Arc;

use axum::routing::{delete, get};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors_enabled = state.config.cors_enabled;

    let router = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/version", get(handlers::version_check))
        .route("/streams", get(handlers::list_streams))
        .route("/streams/{*path}", delete(handlers::delete_stream))
        .route("/vod/{*path}", get(handlers::vod_request))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors_enabled {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}
