use axum::{
    extract::{Path as AxumPath, Query, State},
    Json,
};
use common::{DirectoryContents, ItemKind};
use library::LibraryError;
use tracing::debug;

use crate::state::{AppState, JsonResult, SearchQuery, SearchResponse};
use crate::utils::library_error;

const MAX_AUTO_DESCEND: usize = 20;
const MIN_QUERY_LEN: usize = 2;

pub async fn browse_root(State(state): State<AppState>) -> JsonResult<DirectoryContents> {
    browse(&state, "")
}

pub async fn browse_path(
    State(state): State<AppState>,
    AxumPath(path): AxumPath<String>,
) -> JsonResult<DirectoryContents> {
    browse(&state, &path)
}

/// Lists `path`, then keeps descending while the listing is a single folder.
fn browse(state: &AppState, path: &str) -> JsonResult<DirectoryContents> {
    let mut contents =
        cached_listing(state, path).map_err(|err| library_error(err, "Error reading directory"))?;
    for _ in 0..MAX_AUTO_DESCEND {
        let next = match contents.items.as_slice() {
            [only] if only.kind == ItemKind::Folder => only.path.clone(),
            _ => break,
        };
        match cached_listing(state, &next) {
            Ok(listing) => contents = listing,
            Err(err) => {
                debug!("Stopping auto-descend at {}: {}", next, err);
                break;
            }
        }
    }
    Ok(Json(contents))
}

fn cached_listing(state: &AppState, path: &str) -> Result<DirectoryContents, LibraryError> {
    let key = path.trim_matches('/');
    state
        .cache
        .get_or_load(key, || state.library.browse_directory(key))
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> JsonResult<SearchResponse> {
    let query = params.q.unwrap_or_default().trim().to_string();
    let limit = match params.limit {
        Some(limit) if limit > 0 => limit,
        _ => library::DEFAULT_SEARCH_LIMIT,
    };
    let offset = params.offset.unwrap_or(0).max(0);

    if query.chars().count() < MIN_QUERY_LEN {
        return Ok(Json(SearchResponse {
            results: Vec::new(),
            query,
            count: 0,
            total: 0,
            offset,
            limit,
        }));
    }

    let page = state
        .library
        .search(&query, limit, offset)
        .map_err(|err| library_error(err, "Search failed"))?;
    Ok(Json(SearchResponse {
        count: page.results.len(),
        total: page.total,
        results: page.results,
        query,
        offset,
        limit,
    }))
}
