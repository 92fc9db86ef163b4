pub mod browse;
pub mod index;
pub mod media;
pub mod playback;
pub mod requests;
pub mod stats;

use axum::{
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};

use crate::state::{AppState, HealthResponse};

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/browse", get(browse::browse_root))
        .route("/api/browse/*path", get(browse::browse_path))
        .route("/api/search", get(browse::search))
        .route("/api/stats", get(stats::get_stats))
        .route("/api/index/status", get(index::get_status))
        .route("/api/audio/key/:key", get(media::stream_audio))
        .route("/api/audio/key/:key/thumbnail", get(media::audio_thumbnail))
        .route("/api/audio/key/:key/meta", get(media::audio_meta))
        .route("/api/folder/key/:key/poster", get(media::folder_poster))
        .route("/api/playback/record", post(playback::record))
        .route("/api/playback/recent", get(playback::recent))
        .route("/api/playback/popular", get(playback::popular))
        .route("/api/playback/new", get(playback::recently_added))
        .route(
            "/api/requests",
            get(requests::list_requests).post(requests::create_request),
        )
        .route(
            "/api/requests/:id",
            patch(requests::update_request).delete(requests::delete_request),
        )
        .route("/api/requests/:id/status", patch(requests::update_status))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}
