use chrono::Utc;
use common::{RequestStatus, RequestTag, RequestsByStatus, SourceRequest};
use rusqlite::{params, Row};
use tracing::warn;

use crate::error::LibraryError;
use crate::store::{iso_seconds, Store};

const REQUEST_COLUMNS: &str = "id, submitted_url, canonical_id, title, image_url, status, tags, \
     folder_share_key, created_at, updated_at";

/// User-submitted requests to add an external source to the archive.
#[derive(Clone)]
pub struct RequestStore {
    store: Store,
}

impl RequestStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Every request bucketed by status, newest first within a bucket.
    pub fn list_grouped(&self) -> Result<RequestsByStatus, LibraryError> {
        let conn = self.store.conn()?;
        let sql = format!(
            "SELECT {} FROM source_requests ORDER BY created_at DESC, id DESC",
            REQUEST_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], request_from_row)?;

        let mut grouped = RequestsByStatus::default();
        for row in rows {
            let (request, raw_status) = row?;
            match request {
                Some(request) => grouped.bucket_mut(request.status).push(request),
                None => warn!("Skipping source request with unknown status {:?}", raw_status),
            }
        }
        Ok(grouped)
    }

    pub fn create(
        &self,
        title: &str,
        submitted_url: &str,
        image_url: Option<&str>,
        tags: &[RequestTag],
    ) -> Result<SourceRequest, LibraryError> {
        let title = title.trim();
        let submitted_url = submitted_url.trim();
        if title.is_empty() || submitted_url.is_empty() {
            return Err(LibraryError::InvalidInput(
                "title and url are required".to_string(),
            ));
        }
        let tags_json = serde_json::to_string(tags)?;
        let now = iso_seconds(Utc::now());
        let conn = self.store.conn()?;
        conn.execute(
            "INSERT INTO source_requests (submitted_url, title, image_url, status, tags, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                submitted_url,
                title,
                image_url,
                RequestStatus::Requested.as_str(),
                tags_json,
                now
            ],
        )?;
        Ok(SourceRequest {
            id: conn.last_insert_rowid(),
            submitted_url: submitted_url.to_string(),
            canonical_id: None,
            title: title.to_string(),
            image_url: image_url.map(str::to_string),
            status: RequestStatus::Requested,
            tags: tags.to_vec(),
            folder_share_key: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    pub fn update(
        &self,
        id: i64,
        title: &str,
        image_url: Option<&str>,
        tags: &[RequestTag],
    ) -> Result<(), LibraryError> {
        let tags_json = serde_json::to_string(tags)?;
        let conn = self.store.conn()?;
        let changed = conn.execute(
            "UPDATE source_requests SET title = ?1, image_url = ?2, tags = ?3, updated_at = ?4
             WHERE id = ?5",
            params![title.trim(), image_url, tags_json, iso_seconds(Utc::now()), id],
        )?;
        ensure_changed(changed, id)
    }

    pub fn update_status(
        &self,
        id: i64,
        status: &str,
        folder_share_key: Option<&str>,
    ) -> Result<(), LibraryError> {
        let status = RequestStatus::parse(status)
            .ok_or_else(|| LibraryError::InvalidStatus(status.to_string()))?;
        let conn = self.store.conn()?;
        let changed = conn.execute(
            "UPDATE source_requests SET status = ?1, folder_share_key = ?2, updated_at = ?3
             WHERE id = ?4",
            params![status.as_str(), folder_share_key, iso_seconds(Utc::now()), id],
        )?;
        ensure_changed(changed, id)
    }

    pub fn delete(&self, id: i64) -> Result<(), LibraryError> {
        let conn = self.store.conn()?;
        let changed = conn.execute("DELETE FROM source_requests WHERE id = ?1", params![id])?;
        ensure_changed(changed, id)
    }
}

fn ensure_changed(changed: usize, id: i64) -> Result<(), LibraryError> {
    if changed == 0 {
        return Err(LibraryError::NotFound(format!("source request {}", id)));
    }
    Ok(())
}

fn request_from_row(row: &Row<'_>) -> Result<(Option<SourceRequest>, String), rusqlite::Error> {
    let raw_status: String = row.get(5)?;
    let Some(status) = RequestStatus::parse(&raw_status) else {
        return Ok((None, raw_status));
    };
    let tags = row
        .get::<_, Option<String>>(6)?
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();
    let request = SourceRequest {
        id: row.get(0)?,
        submitted_url: row.get(1)?,
        canonical_id: row.get(2)?,
        title: row.get(3)?,
        image_url: row.get(4)?,
        status,
        tags,
        folder_share_key: row.get(7)?,
        created_at: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
        updated_at: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
    };
    Ok((Some(request), raw_status))
}
