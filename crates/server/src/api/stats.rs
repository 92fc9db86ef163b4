use axum::{extract::State, http::StatusCode, Json};
use library::LibraryError;
use tracing::error;

use crate::state::{AppState, JsonResult, StatsResponse};
use crate::utils::{json_error, library_error};

pub async fn get_stats(State(state): State<AppState>) -> JsonResult<StatsResponse> {
    let library = state.library.clone();
    let result = tokio::task::spawn_blocking(move || {
        let audio = library.audio_stats()?;
        let sources = library.sources_stats()?;
        Ok::<_, LibraryError>(StatsResponse { audio, sources })
    })
    .await;

    match result {
        Ok(Ok(stats)) => Ok(Json(stats)),
        Ok(Err(err)) => Err(library_error(err, "Failed to fetch stats")),
        Err(err) => {
            error!("Stats task failed: {}", err);
            Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to fetch stats",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::app;

    #[tokio::test]
    async fn empty_library_has_zero_totals() {
        let app = app(|_| {});
        let Json(stats) = get_stats(State(app.state.clone())).await.unwrap();
        assert_eq!(stats.audio.total, 0);
        assert!(stats.audio.days.is_empty());
        assert_eq!(stats.sources.total, 0);
    }
}
