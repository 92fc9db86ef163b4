//! SQLite schema for the audio index.
//!
//! `folders` and `audio_files` are keyed by virtual path; `share_key` is the
//! secondary, externally shared identity. Play events reference audio rows by
//! id so they survive path churn as long as the row is only soft-deleted.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS folders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    parent_path TEXT,
    folder_name TEXT NOT NULL,
    name TEXT NOT NULL,
    original_url TEXT,
    url_broken INTEGER DEFAULT 0,
    item_count INTEGER,
    directory_size TEXT,
    poster_image TEXT,
    modified_at TEXT,
    indexed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS audio_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    parent_path TEXT,
    filename TEXT NOT NULL,
    size INTEGER,
    mime_type TEXT,
    modified_at TEXT,
    title TEXT,
    meta_artist TEXT,
    upload_date TEXT,
    webpage_url TEXT,
    description TEXT,
    indexed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_folders_path ON folders(path);
CREATE INDEX IF NOT EXISTS idx_folders_parent_path ON folders(parent_path);
CREATE INDEX IF NOT EXISTS idx_folders_search ON folders(name, folder_name);

CREATE INDEX IF NOT EXISTS idx_audio_files_path ON audio_files(path);
CREATE INDEX IF NOT EXISTS idx_audio_files_parent_path ON audio_files(parent_path);
CREATE INDEX IF NOT EXISTS idx_audio_files_search ON audio_files(filename, title, meta_artist, description);

CREATE TABLE IF NOT EXISTS play_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    audio_file_id INTEGER NOT NULL REFERENCES audio_files(id),
    played_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_play_events_audio_file_id ON play_events(audio_file_id);
CREATE INDEX IF NOT EXISTS idx_play_events_played_at ON play_events(played_at);

CREATE TABLE IF NOT EXISTS source_requests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    submitted_url TEXT NOT NULL,
    canonical_id TEXT,
    title TEXT NOT NULL,
    image_url TEXT,
    status TEXT NOT NULL DEFAULT 'requested',
    tags TEXT DEFAULT '[]',
    folder_share_key TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_source_requests_status ON source_requests(status);
"#;

/// Columns added after the first release. Re-running them on an upgraded
/// database fails with "duplicate column", which is expected.
pub const ALTERATIONS: &[&str] = &[
    "ALTER TABLE audio_files ADD COLUMN downloaded_at TEXT",
    "ALTER TABLE audio_files ADD COLUMN source_path TEXT",
    "ALTER TABLE audio_files ADD COLUMN thumbnail TEXT",
    "ALTER TABLE audio_files ADD COLUMN share_key TEXT",
    "ALTER TABLE audio_files ADD COLUMN deleted INTEGER DEFAULT 0",
    "ALTER TABLE folders ADD COLUMN share_key TEXT",
];

pub const LATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_audio_files_downloaded_at ON audio_files(downloaded_at);
CREATE INDEX IF NOT EXISTS idx_audio_files_source_path ON audio_files(source_path);
CREATE UNIQUE INDEX IF NOT EXISTS idx_audio_files_share_key ON audio_files(share_key);
CREATE UNIQUE INDEX IF NOT EXISTS idx_folders_share_key ON folders(share_key);
"#;

pub const CONNECTION_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
PRAGMA foreign_keys = ON;
"#;
