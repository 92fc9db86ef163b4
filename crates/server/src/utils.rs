use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use library::LibraryError;
use tracing::error;

use crate::state::ErrorResponse;

pub fn json_error(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn json_error_response(status: StatusCode, message: impl Into<String>) -> Response {
    json_error(status, message).into_response()
}

/// Logs the underlying failure and hides it behind `message`, except for the
/// caller-facing variants that map onto 4xx responses.
pub fn library_error(err: LibraryError, message: &str) -> (StatusCode, Json<ErrorResponse>) {
    match err {
        LibraryError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "Not found"),
        LibraryError::InvalidStatus(_) => json_error(StatusCode::BAD_REQUEST, "Invalid status"),
        LibraryError::InvalidInput(detail) => json_error(StatusCode::BAD_REQUEST, detail),
        other => {
            error!("{}: {}", message, other);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, message)
        }
    }
}
