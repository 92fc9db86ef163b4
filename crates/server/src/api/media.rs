use axum::{
    extract::{Path as AxumPath, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::{join_virtual, AudioFileRecord, FolderRecord};

use crate::state::{AppState, AudioMetaResponse};
use crate::streaming::{content_type_for, serve_file, AUDIO_CACHE_CONTROL, IMAGE_CACHE_CONTROL};
use crate::utils::{json_error_response, library_error};

pub async fn stream_audio(
    State(state): State<AppState>,
    AxumPath(key): AxumPath<String>,
    headers: HeaderMap,
) -> Response {
    let audio = match lookup_audio(&state, &key) {
        Ok(audio) => audio,
        Err(response) => return response,
    };
    if audio.deleted {
        return json_error_response(StatusCode::GONE, "Audio file has been removed");
    }
    let Some(path) = state.library.resolve(&audio.path) else {
        return json_error_response(StatusCode::NOT_FOUND, "Audio file not found");
    };
    let content_type = content_type_for(&path, Some(&audio.mime_type));
    serve_file(&path, &content_type, AUDIO_CACHE_CONTROL, &headers).await
}

pub async fn audio_thumbnail(
    State(state): State<AppState>,
    AxumPath(key): AxumPath<String>,
    headers: HeaderMap,
) -> Response {
    let audio = match lookup_audio(&state, &key) {
        Ok(audio) => audio,
        Err(response) => return response,
    };
    let Some(thumbnail) = audio.thumbnail.as_deref() else {
        return json_error_response(StatusCode::NOT_FOUND, "No thumbnail");
    };
    let virtual_path = join_virtual(&audio.parent_path, thumbnail);
    serve_image(&state, &virtual_path, &headers).await
}

pub async fn audio_meta(State(state): State<AppState>, AxumPath(key): AxumPath<String>) -> Response {
    match lookup_audio(&state, &key) {
        Ok(audio) => Json(AudioMetaResponse {
            thumbnail: audio.thumbnail.is_some(),
            title: audio.title,
            artist: audio.artist,
            upload_date: audio.upload_date,
            webpage_url: audio.webpage_url,
            description: audio.description,
            parent_path: audio.parent_path,
            deleted: audio.deleted,
        })
        .into_response(),
        Err(response) => response,
    }
}

pub async fn folder_poster(
    State(state): State<AppState>,
    AxumPath(key): AxumPath<String>,
    headers: HeaderMap,
) -> Response {
    let folder = match lookup_folder(&state, &key) {
        Ok(folder) => folder,
        Err(response) => return response,
    };
    let Some(poster) = folder.poster_image.as_deref() else {
        return json_error_response(StatusCode::NOT_FOUND, "No poster");
    };
    let virtual_path = join_virtual(&folder.path, poster);
    serve_image(&state, &virtual_path, &headers).await
}

async fn serve_image(state: &AppState, virtual_path: &str, headers: &HeaderMap) -> Response {
    let Some(path) = state.library.resolve(virtual_path) else {
        return json_error_response(StatusCode::NOT_FOUND, "Image not found");
    };
    let content_type = content_type_for(&path, None);
    serve_file(&path, &content_type, IMAGE_CACHE_CONTROL, headers).await
}

fn lookup_audio(state: &AppState, key: &str) -> Result<AudioFileRecord, Response> {
    match state.library.store().audio_by_share_key(key) {
        Ok(Some(audio)) => Ok(audio),
        Ok(None) => Err(json_error_response(StatusCode::NOT_FOUND, "Audio file not found")),
        Err(err) => Err(library_error(err, "Failed to look up audio file").into_response()),
    }
}

fn lookup_folder(state: &AppState, key: &str) -> Result<FolderRecord, Response> {
    match state.library.store().folder_by_share_key(key) {
        Ok(Some(folder)) => Ok(folder),
        Ok(None) => Err(json_error_response(StatusCode::NOT_FOUND, "Folder not found")),
        Err(err) => Err(library_error(err, "Failed to look up folder").into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{app, body_bytes, write, TestApp};
    use axum::http::{header, HeaderValue};

    fn audio_key(app: &TestApp, path: &str) -> String {
        app.state
            .library
            .store()
            .get_audio_file(path)
            .unwrap()
            .unwrap()
            .share_key
            .unwrap()
    }

    #[tokio::test]
    async fn streams_audio_with_ranges() {
        let app = app(|music| write(&music.join("a.mp3"), b"0123456789"));
        let key = audio_key(&app, "music/a.mp3");

        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, HeaderValue::from_static("bytes=0-3"));
        let response = stream_audio(State(app.state.clone()), AxumPath(key), headers).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
        assert_eq!(response.headers()[header::CACHE_CONTROL], AUDIO_CACHE_CONTROL);
        assert_eq!(body_bytes(response).await, b"0123");
    }

    #[tokio::test]
    async fn unknown_and_deleted_audio() {
        let app = app(|music| write(&music.join("a.mp3"), b"abc"));
        let response = stream_audio(
            State(app.state.clone()),
            AxumPath("missing".to_string()),
            HeaderMap::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let key = audio_key(&app, "music/a.mp3");
        std::fs::remove_file(app.state.library.resolve("music/a.mp3").unwrap()).unwrap();
        app.state.library.rebuild_index().unwrap();
        let response =
            stream_audio(State(app.state.clone()), AxumPath(key.clone()), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::GONE);

        let response = audio_meta(State(app.state.clone()), AxumPath(key)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let meta: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(meta["deleted"], true);
        assert_eq!(meta["parentPath"], "music");
    }

    #[tokio::test]
    async fn serves_thumbnail_and_poster() {
        let app = app(|music| {
            write(&music.join("show/ep.mp3"), b"abc");
            write(&music.join("show/ep.jpg"), b"thumb");
            write(&music.join("show/poster.jpg"), b"poster");
            write(&music.join("other/x.mp3"), b"x");
        });
        let key = audio_key(&app, "music/show/ep.mp3");
        let response =
            audio_thumbnail(State(app.state.clone()), AxumPath(key.clone()), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], IMAGE_CACHE_CONTROL);
        assert_eq!(body_bytes(response).await, b"thumb");

        let meta = audio_meta(State(app.state.clone()), AxumPath(key)).await;
        let meta: serde_json::Value = serde_json::from_slice(&body_bytes(meta).await).unwrap();
        assert_eq!(meta["thumbnail"], true);

        let folder_key = app
            .state
            .library
            .store()
            .get_folder("music/show")
            .unwrap()
            .unwrap()
            .share_key
            .unwrap();
        let response =
            folder_poster(State(app.state.clone()), AxumPath(folder_key), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(body_bytes(response).await, b"poster");
    }

    #[tokio::test]
    async fn missing_images_are_404() {
        let app = app(|music| write(&music.join("plain/a.mp3"), b"abc"));
        let key = audio_key(&app, "music/plain/a.mp3");
        let response = audio_thumbnail(State(app.state.clone()), AxumPath(key), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = folder_poster(
            State(app.state.clone()),
            AxumPath("nope".to_string()),
            HeaderMap::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
