use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    Json,
};
use common::{RequestsByStatus, SourceRequest};

use crate::state::{
    AppState, CreateRequestBody, ErrorResponse, JsonResult, SuccessResponse, UpdateRequestBody,
    UpdateStatusBody,
};
use crate::utils::{json_error, library_error};

pub async fn list_requests(State(state): State<AppState>) -> JsonResult<RequestsByStatus> {
    state
        .library
        .requests()
        .list_grouped()
        .map(Json)
        .map_err(|err| library_error(err, "Failed to fetch requests"))
}

pub async fn create_request(
    State(state): State<AppState>,
    Json(body): Json<CreateRequestBody>,
) -> Result<(StatusCode, Json<SourceRequest>), (StatusCode, Json<ErrorResponse>)> {
    if body.title.trim().is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "Title is required"));
    }
    if body.submitted_url.trim().is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "Submitted URL is required"));
    }
    let request = state
        .library
        .requests()
        .create(
            &body.title,
            &body.submitted_url,
            non_empty(body.image_url.as_deref()),
            &body.tags,
        )
        .map_err(|err| library_error(err, "Failed to create request"))?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn update_request(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(body): Json<UpdateRequestBody>,
) -> JsonResult<SuccessResponse> {
    let id = parse_id(&id)?;
    if body.title.trim().is_empty() {
        return Err(json_error(StatusCode::BAD_REQUEST, "Title is required"));
    }
    state
        .library
        .requests()
        .update(id, &body.title, non_empty(body.image_url.as_deref()), &body.tags)
        .map_err(|err| library_error(err, "Failed to update request"))?;
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn update_status(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(body): Json<UpdateStatusBody>,
) -> JsonResult<SuccessResponse> {
    let id = parse_id(&id)?;
    state
        .library
        .requests()
        .update_status(id, &body.status, non_empty(body.folder_share_key.as_deref()))
        .map_err(|err| library_error(err, "Failed to update request status"))?;
    Ok(Json(SuccessResponse { success: true }))
}

pub async fn delete_request(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> JsonResult<SuccessResponse> {
    let id = parse_id(&id)?;
    state
        .library
        .requests()
        .delete(id)
        .map_err(|err| library_error(err, "Failed to delete request"))?;
    Ok(Json(SuccessResponse { success: true }))
}

fn parse_id(raw: &str) -> Result<i64, (StatusCode, Json<ErrorResponse>)> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| json_error(StatusCode::BAD_REQUEST, "Invalid request ID"))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
