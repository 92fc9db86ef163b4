//! Pooled SQLite store shared by the indexer and the query side.

mod schema;

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use common::{AudioFileRecord, FolderRecord};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, Error as SqliteError, OptionalExtension, Row};
use tracing::warn;

use crate::error::LibraryError;

pub use schema::SCHEMA;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

const POOL_SIZE: u32 = 8;

pub(crate) const FOLDER_COLUMNS: &str = "id, path, parent_path, folder_name, name, original_url, \
     url_broken, item_count, directory_size, poster_image, modified_at, share_key, indexed_at";

pub(crate) const AUDIO_COLUMNS: &str = "id, path, parent_path, filename, size, mime_type, \
     modified_at, title, meta_artist, upload_date, webpage_url, description, downloaded_at, \
     source_path, thumbnail, share_key, deleted, indexed_at";

#[derive(Clone)]
pub struct Store {
    pool: DbPool,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, LibraryError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let manager = SqliteConnectionManager::file(path)
            .with_init(|conn| conn.execute_batch(schema::CONNECTION_PRAGMAS));
        let pool = Pool::builder().max_size(POOL_SIZE).build(manager)?;
        let store = Self { pool };
        let conn = store.conn()?;
        migrate(&conn)?;
        Ok(store)
    }

    pub fn conn(&self) -> Result<DbConn, LibraryError> {
        Ok(self.pool.get()?)
    }

    pub fn get_folder(&self, path: &str) -> Result<Option<FolderRecord>, LibraryError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM folders WHERE path = ?1", FOLDER_COLUMNS);
        let folder = conn
            .query_row(&sql, params![path], folder_from_row)
            .optional()?;
        Ok(folder)
    }

    pub fn get_audio_file(&self, path: &str) -> Result<Option<AudioFileRecord>, LibraryError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM audio_files WHERE path = ?1", AUDIO_COLUMNS);
        let audio = conn
            .query_row(&sql, params![path], audio_from_row)
            .optional()?;
        Ok(audio)
    }

    pub fn folder_by_share_key(&self, key: &str) -> Result<Option<FolderRecord>, LibraryError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM folders WHERE share_key = ?1", FOLDER_COLUMNS);
        let folder = conn
            .query_row(&sql, params![key], folder_from_row)
            .optional()?;
        Ok(folder)
    }

    pub fn audio_by_share_key(&self, key: &str) -> Result<Option<AudioFileRecord>, LibraryError> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM audio_files WHERE share_key = ?1", AUDIO_COLUMNS);
        let audio = conn
            .query_row(&sql, params![key], audio_from_row)
            .optional()?;
        Ok(audio)
    }

    pub fn counts(&self) -> Result<StoreCounts, LibraryError> {
        let conn = self.conn()?;
        let (folders, audio_files, deleted_audio_files) = conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM folders),
                (SELECT COUNT(*) FROM audio_files WHERE deleted = 0),
                (SELECT COUNT(*) FROM audio_files WHERE deleted = 1)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(StoreCounts {
            folders,
            audio_files,
            deleted_audio_files,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct StoreCounts {
    pub folders: i64,
    pub audio_files: i64,
    pub deleted_audio_files: i64,
}

fn migrate(conn: &Connection) -> Result<(), LibraryError> {
    conn.execute_batch(schema::SCHEMA)?;
    for statement in schema::ALTERATIONS {
        if let Err(err) = conn.execute(statement, []) {
            tolerate_duplicate_column(err)?;
        }
    }
    if let Err(err) = conn.execute_batch(schema::LATE_INDEXES) {
        warn!("Failed to create share key indexes: {}", err);
    }
    Ok(())
}

fn tolerate_duplicate_column(err: SqliteError) -> Result<(), LibraryError> {
    match err {
        SqliteError::SqliteFailure(_, Some(message)) if message.contains("duplicate column") => {
            Ok(())
        }
        other => Err(other.into()),
    }
}

pub(crate) fn folder_from_row(row: &Row<'_>) -> Result<FolderRecord, SqliteError> {
    Ok(FolderRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        parent_path: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        folder_name: row.get(3)?,
        name: row.get(4)?,
        original_url: row.get(5)?,
        url_broken: row.get::<_, Option<i64>>(6)?.unwrap_or(0) == 1,
        item_count: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
        directory_size: row.get(8)?,
        poster_image: row.get(9)?,
        modified_at: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
        share_key: row.get(11)?,
        indexed_at: row.get(12)?,
    })
}

pub(crate) fn audio_from_row(row: &Row<'_>) -> Result<AudioFileRecord, SqliteError> {
    Ok(AudioFileRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        parent_path: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        filename: row.get(3)?,
        size: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
        mime_type: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        modified_at: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
        title: row.get(7)?,
        artist: row.get(8)?,
        upload_date: row.get(9)?,
        webpage_url: row.get(10)?,
        description: row.get(11)?,
        downloaded_at: row.get(12)?,
        source_path: row.get(13)?,
        thumbnail: row.get(14)?,
        share_key: row.get(15)?,
        deleted: row.get::<_, Option<i64>>(16)?.unwrap_or(0) == 1,
        indexed_at: row.get(17)?,
    })
}

/// Reconciliation timestamp. Microsecond precision keeps back-to-back runs
/// distinguishable; the fixed width keeps lexical order chronological.
pub(crate) fn sql_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

pub(crate) fn iso_millis(at: SystemTime) -> String {
    DateTime::<Utc>::from(at)
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

pub(crate) fn iso_seconds(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
