use std::sync::Arc;

use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use common::{AudioStats, PlaybackResult, RequestTag, SearchResult, SourcesStats};
use library::{BrowseCache, IndexReport, Library, LockHolder};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub library: Library,
    pub cache: Arc<BrowseCache>,
    pub index_status: Arc<RwLock<IndexStatus>>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(library: Library, config: ServerConfig) -> Self {
        Self {
            cache: Arc::new(BrowseCache::new(config.cache_ttl())),
            library,
            index_status: Arc::new(RwLock::new(IndexStatus::Idle)),
            config: Arc::new(config),
        }
    }
}

/// Last known state of the indexer as seen by this process.
#[derive(Clone, Debug)]
pub enum IndexStatus {
    Idle,
    Running { started: DateTime<Utc> },
    Completed { finished: DateTime<Utc>, report: IndexReport },
    Skipped { at: DateTime<Utc>, holder: Option<LockHolder> },
    Failed { at: DateTime<Utc>, message: String },
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub query: String,
    pub count: usize,
    pub total: usize,
    pub offset: i64,
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub audio: AudioStats,
    pub sources: SourcesStats,
}

#[derive(Debug, Serialize)]
pub struct TracksResponse {
    pub tracks: Vec<PlaybackResult>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioMetaResponse {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub upload_date: Option<String>,
    pub webpage_url: Option<String>,
    pub description: Option<String>,
    pub parent_path: String,
    pub thumbnail: bool,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct IndexStatusResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<IndexReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder: Option<LockHolder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPlayRequest {
    #[serde(default)]
    pub share_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestBody {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub submitted_url: String,
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<RequestTag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequestBody {
    #[serde(default)]
    pub title: String,
    pub image_url: Option<String>,
    #[serde(default)]
    pub tags: Vec<RequestTag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusBody {
    pub status: String,
    pub folder_share_key: Option<String>,
}

pub type JsonResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;
