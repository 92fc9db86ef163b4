use common::PlaybackResult;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::LibraryError;
use crate::store::Store;

const PLAY_AGGREGATE: &str = "
    SELECT af.path, af.filename, af.title, af.meta_artist, af.parent_path,
           f.name, af.thumbnail, f.poster_image, af.share_key,
           COUNT(*) AS play_count, MAX(pe.played_at) AS last_played
    FROM play_events pe
    JOIN audio_files af ON af.id = pe.audio_file_id
    LEFT JOIN folders f ON f.path = af.parent_path
    GROUP BY pe.audio_file_id";

const RECENTLY_ADDED: &str = "
    SELECT af.path, af.filename, af.title, af.meta_artist, af.parent_path,
           f.name, af.thumbnail, f.poster_image, af.share_key,
           0, NULL
    FROM audio_files af
    LEFT JOIN folders f ON f.path = af.parent_path
    WHERE af.downloaded_at IS NOT NULL AND af.deleted = 0
    ORDER BY af.downloaded_at DESC
    LIMIT ?1";

/// Play history and the listening aggregates derived from it.
#[derive(Clone)]
pub struct PlaybackStore {
    store: Store,
}

impl PlaybackStore {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Records a play for the audio file behind `share_key`. Unknown keys and
    /// repeat plays within five minutes are ignored.
    pub fn record_play(&self, share_key: &str) -> Result<(), LibraryError> {
        let conn = self.store.conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM audio_files WHERE share_key = ?1",
                params![share_key],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        match id {
            Some(id) => insert_play(&conn, id),
            None => Ok(()),
        }
    }

    pub fn record_play_by_path(&self, path: &str) -> Result<(), LibraryError> {
        let conn = self.store.conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM audio_files WHERE path = ?1",
                params![path],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        match id {
            Some(id) => insert_play(&conn, id),
            None => Ok(()),
        }
    }

    pub fn recently_played(&self, limit: i64) -> Result<Vec<PlaybackResult>, LibraryError> {
        let sql = format!("{} ORDER BY last_played DESC LIMIT ?1", PLAY_AGGREGATE);
        self.collect(&sql, limit)
    }

    pub fn popular(&self, limit: i64) -> Result<Vec<PlaybackResult>, LibraryError> {
        let sql = format!(
            "{} ORDER BY play_count DESC, last_played DESC LIMIT ?1",
            PLAY_AGGREGATE
        );
        self.collect(&sql, limit)
    }

    pub fn recently_added(&self, limit: i64) -> Result<Vec<PlaybackResult>, LibraryError> {
        self.collect(RECENTLY_ADDED, limit)
    }

    fn collect(&self, sql: &str, limit: i64) -> Result<Vec<PlaybackResult>, LibraryError> {
        let conn = self.store.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![limit], playback_from_row)?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

fn insert_play(conn: &Connection, audio_file_id: i64) -> Result<(), LibraryError> {
    let recent: i64 = conn.query_row(
        "SELECT COUNT(*) FROM play_events
         WHERE audio_file_id = ?1 AND played_at > datetime('now', '-5 minutes')",
        params![audio_file_id],
        |row| row.get(0),
    )?;
    if recent > 0 {
        debug!("Ignoring repeat play of audio file {}", audio_file_id);
        return Ok(());
    }
    conn.execute(
        "INSERT INTO play_events (audio_file_id) VALUES (?1)",
        params![audio_file_id],
    )?;
    Ok(())
}

fn playback_from_row(row: &Row<'_>) -> Result<PlaybackResult, rusqlite::Error> {
    Ok(PlaybackResult {
        path: row.get(0)?,
        filename: row.get(1)?,
        title: row.get(2)?,
        artist: row.get(3)?,
        parent_path: row.get(4)?,
        parent_folder_name: row.get(5)?,
        audio_image: row.get(6)?,
        poster_image: row.get(7)?,
        share_key: row.get(8)?,
        play_count: row.get(9)?,
        last_played: row.get(10)?,
    })
}
