use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A configured physical directory exposed under a stable slug.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Root {
    pub path: PathBuf,
    pub display_name: String,
    pub slug: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FolderRecord {
    pub id: i64,
    pub path: String,
    pub parent_path: String,
    pub folder_name: String,
    pub name: String,
    pub original_url: Option<String>,
    pub url_broken: bool,
    pub item_count: i64,
    pub directory_size: Option<String>,
    pub poster_image: Option<String>,
    pub modified_at: String,
    pub share_key: Option<String>,
    pub indexed_at: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AudioFileRecord {
    pub id: i64,
    pub path: String,
    pub parent_path: String,
    pub filename: String,
    pub size: i64,
    pub mime_type: String,
    pub modified_at: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub upload_date: Option<String>,
    pub webpage_url: Option<String>,
    pub description: Option<String>,
    pub downloaded_at: Option<String>,
    pub source_path: Option<String>,
    pub thumbnail: Option<String>,
    pub share_key: Option<String>,
    pub deleted: bool,
    pub indexed_at: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Folder,
    Audio,
}

/// Folder overrides surfaced in browse listings. Field names follow the
/// `folder.json` sidecar convention.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FolderMetadata {
    pub folder_name: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub url_broken: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub items: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory_size: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileSystemItem {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    pub modified_at: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<FolderMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_key: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryContents {
    pub items: Vec<FileSystemItem>,
    pub current_path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: i64,
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webpage_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_key: Option<String>,
}

/// One page of search hits plus the unpaginated match count.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchPage {
    pub results: Vec<SearchResult>,
    pub total: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackResult {
    pub path: String,
    pub filename: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub parent_path: Option<String>,
    pub parent_folder_name: Option<String>,
    pub audio_image: Option<String>,
    pub poster_image: Option<String>,
    pub share_key: Option<String>,
    pub play_count: i64,
    pub last_played: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioDayStat {
    pub date: String,
    pub count: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioStats {
    pub total: i64,
    pub days: Vec<AudioDayStat>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceDayStat {
    pub date: String,
    pub count: i64,
    pub sources: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourcesStats {
    pub total: i64,
    pub days: Vec<SourceDayStat>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Requested,
    Downloading,
    Indexing,
    Added,
    Rejected,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 5] = [
        RequestStatus::Requested,
        RequestStatus::Downloading,
        RequestStatus::Indexing,
        RequestStatus::Added,
        RequestStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Requested => "requested",
            RequestStatus::Downloading => "downloading",
            RequestStatus::Indexing => "indexing",
            RequestStatus::Added => "added",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value.trim())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestTag {
    pub name: String,
    pub color: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceRequest {
    pub id: i64,
    pub submitted_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub status: RequestStatus,
    pub tags: Vec<RequestTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_share_key: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestsByStatus {
    pub requested: Vec<SourceRequest>,
    pub downloading: Vec<SourceRequest>,
    pub indexing: Vec<SourceRequest>,
    pub added: Vec<SourceRequest>,
    pub rejected: Vec<SourceRequest>,
}

impl RequestsByStatus {
    pub fn bucket_mut(&mut self, status: RequestStatus) -> &mut Vec<SourceRequest> {
        match status {
            RequestStatus::Requested => &mut self.requested,
            RequestStatus::Downloading => &mut self.downloading,
            RequestStatus::Indexing => &mut self.indexing,
            RequestStatus::Added => &mut self.added,
            RequestStatus::Rejected => &mut self.rejected,
        }
    }
}

/// Virtual path with its last segment removed; empty at root level.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

pub fn join_virtual(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Splits `slug/rel/path` into the slug and the (possibly empty) remainder.
pub fn split_virtual(path: &str) -> (&str, &str) {
    let path = path.trim_matches('/');
    match path.split_once('/') {
        Some((slug, rest)) => (slug, rest),
        None => (path, ""),
    }
}

pub fn join_relpath(root: &Path, relpath: &str) -> PathBuf {
    let mut out = PathBuf::from(root);
    for part in relpath.split('/') {
        if part.is_empty() {
            continue;
        }
        out.push(part);
    }
    out
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}
