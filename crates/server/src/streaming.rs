use std::io::SeekFrom;
use std::path::Path;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::range::{parse_range_header, unsatisfied_range, RangeError};
use crate::utils::json_error_response;

pub const AUDIO_CACHE_CONTROL: &str = "public, max-age=3600";
pub const IMAGE_CACHE_CONTROL: &str = "public, max-age=86400";

/// Stored MIME type when known, otherwise a guess from the extension.
pub fn content_type_for(path: &Path, stored: Option<&str>) -> String {
    match stored.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => value.to_string(),
        None => mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string(),
    }
}

/// Streams `path`, honouring a single byte range from `headers`.
pub async fn serve_file(
    path: &Path,
    content_type: &str,
    cache_control: &'static str,
    headers: &HeaderMap,
) -> Response {
    let mut file = match tokio::fs::File::open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return json_error_response(StatusCode::NOT_FOUND, "File not found");
        }
        Err(err) => {
            warn!("Failed to open {}: {}", path.display(), err);
            return json_error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file");
        }
    };
    let size = match file.metadata().await {
        Ok(meta) if meta.is_file() => meta.len(),
        Ok(_) => return json_error_response(StatusCode::NOT_FOUND, "File not found"),
        Err(err) => {
            warn!("Failed to stat {}: {}", path.display(), err);
            return json_error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file");
        }
    };

    let requested = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .map(|value| parse_range_header(value, size));

    let mut response = match requested {
        Some(Ok(range)) => {
            if let Err(err) = file.seek(SeekFrom::Start(range.start)).await {
                warn!("Failed to seek {}: {}", path.display(), err);
                return json_error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read file");
            }
            let body = Body::from_stream(ReaderStream::new(file.take(range.len())));
            let mut response = Response::new(body);
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            insert_header(&mut response, header::CONTENT_RANGE, &range.content_range(size));
            insert_header(&mut response, header::CONTENT_LENGTH, &range.len().to_string());
            response
        }
        Some(Err(RangeError::Unsatisfiable)) => {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
            insert_header(&mut response, header::CONTENT_RANGE, &unsatisfied_range(size));
            response
        }
        Some(Err(RangeError::Invalid)) | None => {
            let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
            insert_header(&mut response, header::CONTENT_LENGTH, &size.to_string());
            response
        }
    };

    insert_header(&mut response, header::CONTENT_TYPE, content_type);
    response
        .headers_mut()
        .insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(cache_control));
    response
}

fn insert_header(response: &mut Response, name: header::HeaderName, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        response.headers_mut().insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    fn range(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[tokio::test]
    async fn serves_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mp3");
        std::fs::write(&path, b"0123456789").unwrap();

        let response = serve_file(&path, "audio/mpeg", AUDIO_CACHE_CONTROL, &HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
        assert_eq!(response.headers()[header::CACHE_CONTROL], AUDIO_CACHE_CONTROL);
        assert_eq!(body_bytes(response).await, b"0123456789");
    }

    #[tokio::test]
    async fn serves_partial_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mp3");
        std::fs::write(&path, b"0123456789").unwrap();

        let response = serve_file(&path, "audio/mpeg", AUDIO_CACHE_CONTROL, &range("bytes=2-5")).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 2-5/10");
        assert_eq!(body_bytes(response).await, b"2345");
    }

    #[tokio::test]
    async fn unsatisfiable_range_is_416() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.mp3");
        std::fs::write(&path, b"0123456789").unwrap();

        let response = serve_file(&path, "audio/mpeg", AUDIO_CACHE_CONTROL, &range("bytes=50-")).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */10");
    }

    #[tokio::test]
    async fn missing_file_is_404() {
        let dir = TempDir::new().unwrap();
        let response = serve_file(
            &dir.path().join("nope.mp3"),
            "audio/mpeg",
            AUDIO_CACHE_CONTROL,
            &HeaderMap::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn content_type_prefers_stored_value() {
        assert_eq!(content_type_for(Path::new("a.jpg"), None), "image/jpeg");
        assert_eq!(content_type_for(Path::new("a.m4a"), Some("audio/mp4")), "audio/mp4");
        assert_eq!(content_type_for(Path::new("a.bin"), Some(" ")), "application/octet-stream");
    }
}
