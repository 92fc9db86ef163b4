use std::fs;

use common::{
    AudioFileRecord, DirectoryContents, FileSystemItem, FolderMetadata, FolderRecord, ItemKind,
    SearchPage, SearchResult,
};
use rusqlite::{params, Row};

use crate::error::LibraryError;
use crate::roots::RootRegistry;
use crate::store::{audio_from_row, folder_from_row, iso_millis, Store, AUDIO_COLUMNS, FOLDER_COLUMNS};

pub const DEFAULT_SEARCH_LIMIT: i64 = 50;

const SEARCH_ROWS: &str = "
    SELECT id, name, path, 'folder', parent_path,
           NULL, NULL, NULL, NULL, NULL, NULL,
           original_url, item_count, directory_size, poster_image, modified_at, share_key
    FROM folders
    WHERE name LIKE ?1 OR folder_name LIKE ?1
    UNION ALL
    SELECT id, COALESCE(NULLIF(title, ''), filename), path, 'audio', parent_path,
           size, mime_type, title, meta_artist, description, webpage_url,
           NULL, NULL, NULL, NULL, modified_at, share_key
    FROM audio_files
    WHERE deleted = 0
      AND (filename LIKE ?1 OR title LIKE ?1 OR meta_artist LIKE ?1 OR description LIKE ?1)
    LIMIT ?2 OFFSET ?3";

const SEARCH_TOTAL: &str = "
    SELECT (
        SELECT COUNT(*) FROM folders WHERE name LIKE ?1 OR folder_name LIKE ?1
    ) + (
        SELECT COUNT(*) FROM audio_files
        WHERE deleted = 0
          AND (filename LIKE ?1 OR title LIKE ?1 OR meta_artist LIKE ?1 OR description LIKE ?1)
    )";

/// Lists one directory: folders by name, then live audio newest first.
/// The empty path lists the configured roots.
pub fn browse_directory(
    store: &Store,
    roots: &RootRegistry,
    path: &str,
) -> Result<DirectoryContents, LibraryError> {
    let path = path.trim_matches('/');
    if path.is_empty() {
        return Ok(DirectoryContents {
            items: root_items(roots),
            current_path: String::new(),
        });
    }

    let conn = store.conn()?;
    let mut items = Vec::new();

    let sql = format!(
        "SELECT {} FROM folders WHERE parent_path = ?1 ORDER BY name ASC",
        FOLDER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let folders = stmt.query_map(params![path], folder_from_row)?;
    for folder in folders {
        items.push(folder_item(folder?));
    }

    let sql = format!(
        "SELECT {} FROM audio_files WHERE parent_path = ?1 AND deleted = 0 ORDER BY modified_at DESC",
        AUDIO_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let audio = stmt.query_map(params![path], audio_from_row)?;
    for file in audio {
        items.push(audio_item(file?));
    }

    Ok(DirectoryContents {
        items,
        current_path: path.to_string(),
    })
}

fn root_items(roots: &RootRegistry) -> Vec<FileSystemItem> {
    let mut items: Vec<FileSystemItem> = roots
        .roots()
        .iter()
        .filter_map(|root| {
            let meta = fs::metadata(&root.path).ok()?;
            let modified = meta.modified().ok()?;
            Some(FileSystemItem {
                name: root.display_name.clone(),
                path: root.slug.clone(),
                size: None,
                modified_at: iso_millis(modified),
                kind: ItemKind::Folder,
                mime_type: None,
                metadata: None,
                poster_image: None,
                share_key: None,
            })
        })
        .collect();
    items.sort_by(|a, b| a.name.cmp(&b.name));
    items
}

pub(crate) fn folder_item(folder: FolderRecord) -> FileSystemItem {
    let has_metadata = folder.original_url.is_some()
        || folder.url_broken
        || folder.item_count > 0
        || folder.directory_size.is_some();
    let metadata = has_metadata.then(|| FolderMetadata {
        folder_name: folder.folder_name.clone(),
        name: folder.name.clone(),
        original_url: folder.original_url.clone(),
        url_broken: folder.url_broken,
        items: folder.item_count,
        directory_size: folder.directory_size.clone(),
    });
    FileSystemItem {
        name: folder.name,
        path: folder.path,
        size: None,
        modified_at: folder.modified_at,
        kind: ItemKind::Folder,
        mime_type: None,
        metadata,
        poster_image: folder.poster_image,
        share_key: folder.share_key,
    }
}

pub(crate) fn audio_item(audio: AudioFileRecord) -> FileSystemItem {
    FileSystemItem {
        name: audio.filename,
        path: audio.path,
        size: Some(audio.size),
        modified_at: audio.modified_at,
        kind: ItemKind::Audio,
        mime_type: Some(audio.mime_type),
        metadata: None,
        poster_image: None,
        share_key: audio.share_key,
    }
}

/// Substring search over folder names and live audio text fields.
/// `total` counts every match regardless of the page window.
pub fn search(
    store: &Store,
    query: &str,
    limit: i64,
    offset: i64,
) -> Result<SearchPage, LibraryError> {
    let limit = if limit <= 0 { DEFAULT_SEARCH_LIMIT } else { limit };
    let offset = offset.max(0);
    let pattern = format!("%{}%", query);

    let conn = store.conn()?;
    let total: i64 = conn.query_row(SEARCH_TOTAL, params![pattern], |row| row.get(0))?;

    let mut stmt = conn.prepare(SEARCH_ROWS)?;
    let rows = stmt.query_map(params![pattern, limit, offset], search_result_from_row)?;
    let mut results = Vec::new();
    for row in rows {
        results.push(row?);
    }

    Ok(SearchPage {
        results,
        total: total.max(0) as usize,
    })
}

fn search_result_from_row(row: &Row<'_>) -> Result<SearchResult, rusqlite::Error> {
    let kind: String = row.get(3)?;
    Ok(SearchResult {
        id: row.get(0)?,
        name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        path: row.get(2)?,
        kind: if kind == "folder" {
            ItemKind::Folder
        } else {
            ItemKind::Audio
        },
        parent_path: row.get(4)?,
        size: row.get(5)?,
        mime_type: row.get(6)?,
        title: row.get(7)?,
        artist: row.get(8)?,
        description: row.get(9)?,
        webpage_url: row.get(10)?,
        original_url: row.get(11)?,
        item_count: row.get(12)?,
        directory_size: row.get(13)?,
        poster_image: row.get(14)?,
        modified_at: row.get(15)?,
        share_key: row.get(16)?,
    })
}
