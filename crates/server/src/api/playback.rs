use axum::{
    extract::State,
    http::StatusCode,
    Json,
};

use crate::state::{AppState, JsonResult, RecordPlayRequest, SuccessResponse, TracksResponse};
use crate::utils::{json_error, library_error};

const TRACK_LIMIT: i64 = 10;

pub async fn record(
    State(state): State<AppState>,
    Json(body): Json<RecordPlayRequest>,
) -> JsonResult<SuccessResponse> {
    let share_key = body.share_key.trim();
    if share_key.is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "shareKey is required"));
    }
    state
        .library
        .playback()
        .record_play(share_key)
        .map_err(|err| library_error(err, "Failed to record play"))?;
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn recent(State(state): State<AppState>) -> JsonResult<TracksResponse> {
    let tracks = state
        .library
        .playback()
        .recently_played(TRACK_LIMIT)
        .map_err(|err| library_error(err, "Failed to fetch recent tracks"))?;
    Ok(Json(TracksResponse { tracks }))
}

pub async fn popular(State(state): State<AppState>) -> JsonResult<TracksResponse> {
    let tracks = state
        .library
        .playback()
        .popular(TRACK_LIMIT)
        .map_err(|err| library_error(err, "Failed to fetch popular tracks"))?;
    Ok(Json(TracksResponse { tracks }))
}

pub async fn recently_added(State(state): State<AppState>) -> JsonResult<TracksResponse> {
    let tracks = state
        .library
        .playback()
        .recently_added(TRACK_LIMIT)
        .map_err(|err| library_error(err, "Failed to fetch new tracks"))?;
    Ok(Json(TracksResponse { tracks }))
}
