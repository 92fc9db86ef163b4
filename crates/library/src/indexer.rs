use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use base64::prelude::*;
use chrono::Utc;
use common::{join_virtual, parent_path, Root};
use rusqlite::{params, Connection, ErrorCode, Transaction};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::LibraryError;
use crate::lock::{try_acquire, LockAttempt, LockHolder, ReindexLockGuard};
use crate::media::{audio_mime_type, base_name, find_poster, find_thumbnail};
use crate::roots::RootRegistry;
use crate::sidecar::{read_audio_sidecar, read_folder_sidecars, FolderMetadataSidecar};
use crate::store::{iso_millis, non_empty, sql_timestamp, Store};

const SHARE_KEY_BYTES: usize = 6;
const SHARE_KEY_ATTEMPTS: usize = 5;

const UPSERT_FOLDER: &str = "
    INSERT INTO folders
        (path, parent_path, folder_name, name, original_url, url_broken,
         item_count, directory_size, poster_image, modified_at, share_key, indexed_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8, ?9, ?10, ?11)
    ON CONFLICT(path) DO UPDATE SET
        parent_path = excluded.parent_path,
        folder_name = excluded.folder_name,
        name = excluded.name,
        original_url = excluded.original_url,
        url_broken = excluded.url_broken,
        directory_size = excluded.directory_size,
        poster_image = excluded.poster_image,
        modified_at = excluded.modified_at,
        share_key = COALESCE(folders.share_key, excluded.share_key),
        indexed_at = excluded.indexed_at";

const UPSERT_AUDIO: &str = "
    INSERT INTO audio_files
        (path, parent_path, filename, size, mime_type, modified_at,
         title, meta_artist, upload_date, webpage_url, description,
         downloaded_at, source_path, thumbnail, share_key, deleted, indexed_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, 0, ?16)
    ON CONFLICT(path) DO UPDATE SET
        parent_path = excluded.parent_path,
        filename = excluded.filename,
        size = excluded.size,
        mime_type = excluded.mime_type,
        modified_at = excluded.modified_at,
        title = excluded.title,
        meta_artist = excluded.meta_artist,
        upload_date = excluded.upload_date,
        webpage_url = excluded.webpage_url,
        description = excluded.description,
        downloaded_at = excluded.downloaded_at,
        source_path = excluded.source_path,
        thumbnail = excluded.thumbnail,
        share_key = COALESCE(audio_files.share_key, excluded.share_key),
        deleted = 0,
        indexed_at = excluded.indexed_at";

const RECOUNT_ITEMS: &str = "
    UPDATE folders SET item_count = (
        SELECT COUNT(*) FROM folders f2 WHERE f2.parent_path = folders.path
    ) + (
        SELECT COUNT(*) FROM audio_files WHERE parent_path = folders.path AND deleted = 0
    )";

#[derive(Clone, Debug)]
pub struct IndexOptions {
    pub lock_path: PathBuf,
    /// A holder whose heartbeat is older than this is reported as stale.
    pub lock_stale_after: Duration,
}

#[derive(Debug)]
pub enum IndexOutcome {
    Completed(IndexReport),
    Skipped { holder: Option<LockHolder> },
}

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct IndexReport {
    pub folders: usize,
    pub audio_files: usize,
    pub skipped_entries: usize,
    pub failed_writes: usize,
    pub failed_subtrees: usize,
    pub removed_folders: usize,
    pub deleted_audio_files: usize,
    pub elapsed_ms: u64,
}

/// Walks every root and reconciles the store with what is on disk.
///
/// Only one rebuild runs at a time across processes; a caller that loses
/// the lock gets `Skipped` without waiting.
pub fn rebuild_index(
    store: &Store,
    roots: &RootRegistry,
    options: &IndexOptions,
) -> Result<IndexOutcome, LibraryError> {
    let mut guard = match try_acquire(&options.lock_path)? {
        LockAttempt::Acquired(guard) => guard,
        LockAttempt::Busy(holder) => {
            report_busy(holder.as_ref(), options.lock_stale_after);
            return Ok(IndexOutcome::Skipped { holder });
        }
    };

    info!("Starting index rebuild...");
    let started = Instant::now();
    let watermark = sql_timestamp(Utc::now());
    let mut conn = store.conn()?;

    let mut walk = Walk {
        conn: &mut *conn,
        guard: &mut guard,
        report: IndexReport::default(),
        unvisited: Vec::new(),
    };
    for root in roots.roots() {
        walk.index_root(root);
    }
    let unvisited = walk.unvisited;
    let mut report = walk.report;

    // Rows under a directory that could not be read are kept as they are.
    for dir in &unvisited {
        match keep_subtree(&conn, dir, &watermark) {
            Ok(kept) if kept > 0 => info!("Keeping {} records under unreadable {}", kept, dir),
            Ok(_) => {}
            Err(err) => warn!("Failed to keep records under {}: {}", dir, err),
        }
    }

    match conn.execute(
        "DELETE FROM folders WHERE indexed_at < ?1 OR indexed_at IS NULL",
        params![watermark],
    ) {
        Ok(removed) => report.removed_folders = removed,
        Err(err) => warn!("Failed to clean up stale folders: {}", err),
    }
    match conn.execute(
        "UPDATE audio_files SET deleted = 1
         WHERE (indexed_at < ?1 OR indexed_at IS NULL) AND deleted = 0",
        params![watermark],
    ) {
        Ok(deleted) => report.deleted_audio_files = deleted,
        Err(err) => warn!("Failed to mark stale audio files deleted: {}", err),
    }
    if let Err(err) = conn.execute(RECOUNT_ITEMS, []) {
        warn!("Failed to update folder item counts: {}", err);
    }

    report.elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        "Index rebuild completed in {:?}: {} folders, {} audio files, {} removed folders, {} deleted audio files",
        started.elapsed(),
        report.folders,
        report.audio_files,
        report.removed_folders,
        report.deleted_audio_files
    );
    drop(guard);
    Ok(IndexOutcome::Completed(report))
}

/// Refreshes `indexed_at` on every record below `dir` so the stale passes
/// leave them alone. Returns the number of rows touched.
fn keep_subtree(conn: &Connection, dir: &str, watermark: &str) -> Result<usize, LibraryError> {
    let prefix = format!("{}/", dir);
    let prefix_len = prefix.chars().count() as i64;
    let mut kept = 0;
    for table in ["folders", "audio_files"] {
        let sql = format!(
            "UPDATE {} SET indexed_at = ?1
             WHERE substr(path, 1, ?3) = ?2 AND (indexed_at < ?1 OR indexed_at IS NULL)",
            table
        );
        kept += conn.execute(&sql, params![watermark, prefix, prefix_len])?;
    }
    Ok(kept)
}

fn report_busy(holder: Option<&LockHolder>, stale_after: Duration) {
    match holder {
        Some(holder) if holder.is_stale(Utc::now(), stale_after) => warn!(
            "Reindex already in progress, skipping; holder pid {} has not reported progress since {}",
            holder.pid, holder.heartbeat_at
        ),
        Some(holder) => info!(
            "Reindex already in progress, skipping (pid {}, started {})",
            holder.pid, holder.acquired_at
        ),
        None => info!("Reindex already in progress, skipping"),
    }
}

pub fn generate_share_key() -> String {
    let bytes: [u8; SHARE_KEY_BYTES] = rand::random();
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

struct FolderRow {
    path: String,
    parent_path: String,
    folder_name: String,
    name: String,
    original_url: Option<String>,
    url_broken: bool,
    directory_size: Option<String>,
    poster_image: Option<String>,
    modified_at: String,
}

struct AudioRow {
    path: String,
    parent_path: String,
    filename: String,
    size: i64,
    mime_type: &'static str,
    modified_at: String,
    title: Option<String>,
    artist: Option<String>,
    upload_date: Option<String>,
    webpage_url: Option<String>,
    description: Option<String>,
    downloaded_at: Option<String>,
    source_path: Option<String>,
    thumbnail: Option<String>,
}

struct Subdir {
    path: PathBuf,
    virtual_path: String,
    source_path: Option<String>,
}

struct Walk<'a> {
    conn: &'a mut Connection,
    guard: &'a mut ReindexLockGuard,
    report: IndexReport,
    unvisited: Vec<String>,
}

impl Walk<'_> {
    fn index_root(&mut self, root: &Root) {
        info!("Indexing directory: {} ({})", root.display_name, root.slug);
        let modified = fs::metadata(&root.path)
            .and_then(|meta| meta.modified())
            .unwrap_or_else(|_| SystemTime::now());
        let row = FolderRow {
            path: root.slug.clone(),
            parent_path: String::new(),
            folder_name: root.display_name.clone(),
            name: root.display_name.clone(),
            original_url: None,
            url_broken: false,
            directory_size: None,
            poster_image: None,
            modified_at: iso_millis(modified),
        };
        match upsert_folder(self.conn, &row) {
            Ok(()) => self.report.folders += 1,
            Err(err) => {
                self.report.failed_writes += 1;
                warn!("Failed to index root folder {}: {}", root.slug, err);
            }
        }
        self.walk(&root.path, &root.slug, None);
    }

    fn walk(&mut self, dir: &Path, virtual_dir: &str, source_path: Option<&str>) {
        match self.index_directory(dir, virtual_dir, source_path) {
            Ok(subdirs) => {
                self.guard.heartbeat();
                for sub in subdirs {
                    self.walk(&sub.path, &sub.virtual_path, sub.source_path.as_deref());
                }
            }
            Err(err) => {
                self.report.failed_subtrees += 1;
                self.unvisited.push(virtual_dir.to_string());
                warn!("Failed to index {} ({}): {}", virtual_dir, dir.display(), err);
            }
        }
    }

    /// Upserts the direct children of `dir` in one transaction and returns
    /// the subdirectories still to visit.
    fn index_directory(
        &mut self,
        dir: &Path,
        virtual_dir: &str,
        source_path: Option<&str>,
    ) -> Result<Vec<Subdir>, LibraryError> {
        let entries = fs::read_dir(dir)?;
        let sidecars = read_folder_sidecars(dir);
        let mut subdirs = Vec::new();
        let tx = self.conn.transaction()?;

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    self.report.skipped_entries += 1;
                    warn!("Skipping entry in {}: {}", dir.display(), err);
                    continue;
                }
            };
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    self.report.skipped_entries += 1;
                    warn!("Skipping non UTF-8 name {:?} in {}", raw, dir.display());
                    continue;
                }
            };
            let entry_path = entry.path();
            let meta = match fs::symlink_metadata(&entry_path) {
                Ok(meta) => meta,
                Err(err) => {
                    self.report.skipped_entries += 1;
                    warn!("Skipping {}: {}", entry_path.display(), err);
                    continue;
                }
            };

            if meta.is_dir() {
                if name.starts_with('.') {
                    continue;
                }
                let virtual_path = join_virtual(virtual_dir, &name);
                let modified_at = modified_iso(&meta);
                let row = folder_row(
                    &virtual_path,
                    &name,
                    modified_at,
                    sidecars.get(&name),
                    find_poster(&entry_path),
                );
                let child_source = match row.original_url {
                    Some(_) => Some(virtual_path.clone()),
                    None => source_path.map(str::to_string),
                };
                match upsert_folder(&tx, &row) {
                    Ok(()) => self.report.folders += 1,
                    Err(err) => {
                        self.report.failed_writes += 1;
                        warn!("Failed to index folder {}: {}", virtual_path, err);
                    }
                }
                subdirs.push(Subdir {
                    path: entry_path,
                    virtual_path,
                    source_path: child_source,
                });
                continue;
            }

            let Some(mime_type) = audio_mime_type(&name) else {
                continue;
            };
            // Symlinked audio files are indexed with their target's size.
            let meta = if meta.file_type().is_symlink() {
                match fs::metadata(&entry_path) {
                    Ok(target) if target.is_file() => target,
                    Ok(_) => continue,
                    Err(err) => {
                        self.report.skipped_entries += 1;
                        warn!("Skipping {}: {}", entry_path.display(), err);
                        continue;
                    }
                }
            } else {
                meta
            };
            let row = audio_row(dir, virtual_dir, &name, mime_type, &meta, source_path);
            match upsert_audio(&tx, &row) {
                Ok(()) => self.report.audio_files += 1,
                Err(err) => {
                    self.report.failed_writes += 1;
                    warn!("Failed to index audio {}: {}", row.path, err);
                }
            }
        }

        tx.commit()?;
        debug!("Indexed {} ({} subdirectories)", virtual_dir, subdirs.len());
        Ok(subdirs)
    }
}

fn modified_iso(meta: &fs::Metadata) -> String {
    iso_millis(meta.modified().unwrap_or_else(|_| SystemTime::now()))
}

fn folder_row(
    virtual_path: &str,
    name: &str,
    modified_at: String,
    sidecar: Option<&FolderMetadataSidecar>,
    poster_image: Option<String>,
) -> FolderRow {
    let mut row = FolderRow {
        path: virtual_path.to_string(),
        parent_path: parent_path(virtual_path).to_string(),
        folder_name: name.to_string(),
        name: name.to_string(),
        original_url: None,
        url_broken: false,
        directory_size: None,
        poster_image,
        modified_at,
    };
    if let Some(meta) = sidecar {
        if !meta.name.trim().is_empty() {
            row.name = meta.name.clone();
        }
        row.original_url = non_empty(meta.original_url.clone());
        row.url_broken = meta.url_broken;
        row.directory_size = non_empty(meta.directory_size.clone());
    }
    row
}

fn audio_row(
    dir: &Path,
    virtual_dir: &str,
    name: &str,
    mime_type: &'static str,
    meta: &fs::Metadata,
    source_path: Option<&str>,
) -> AudioRow {
    let base = base_name(name);
    let path = join_virtual(virtual_dir, name);
    let mut row = AudioRow {
        parent_path: parent_path(&path).to_string(),
        path,
        filename: name.to_string(),
        size: meta.len() as i64,
        mime_type,
        modified_at: modified_iso(meta),
        title: None,
        artist: None,
        upload_date: None,
        webpage_url: None,
        description: None,
        downloaded_at: None,
        source_path: source_path.map(str::to_string),
        thumbnail: find_thumbnail(dir, base),
    };
    if let Some(info) = read_audio_sidecar(dir, base) {
        row.downloaded_at = info.downloaded_at();
        row.title = non_empty(info.title);
        row.artist = non_empty(info.meta_artist);
        row.upload_date = non_empty(info.upload_date);
        row.webpage_url = non_empty(info.webpage_url);
        row.description = non_empty(info.description);
    }
    row
}

fn upsert_folder(conn: &Connection, row: &FolderRow) -> Result<(), rusqlite::Error> {
    with_share_key(|share_key| {
        conn.execute(
            UPSERT_FOLDER,
            params![
                row.path,
                row.parent_path,
                row.folder_name,
                row.name,
                row.original_url,
                row.url_broken,
                row.directory_size,
                row.poster_image,
                row.modified_at,
                share_key,
                sql_timestamp(Utc::now()),
            ],
        )
    })
}

fn upsert_audio(tx: &Transaction<'_>, row: &AudioRow) -> Result<(), rusqlite::Error> {
    with_share_key(|share_key| {
        tx.execute(
            UPSERT_AUDIO,
            params![
                row.path,
                row.parent_path,
                row.filename,
                row.size,
                row.mime_type,
                row.modified_at,
                row.title,
                row.artist,
                row.upload_date,
                row.webpage_url,
                row.description,
                row.downloaded_at,
                row.source_path,
                row.thumbnail,
                share_key,
                sql_timestamp(Utc::now()),
            ],
        )
    })
}

/// Runs `write` with a fresh candidate key, retrying when the candidate
/// collides with an existing share key.
fn with_share_key<F>(mut write: F) -> Result<(), rusqlite::Error>
where
    F: FnMut(&str) -> Result<usize, rusqlite::Error>,
{
    let mut attempt = 1;
    loop {
        let key = generate_share_key();
        match write(&key) {
            Ok(_) => return Ok(()),
            Err(err) if attempt < SHARE_KEY_ATTEMPTS && is_share_key_conflict(&err) => {
                debug!("Share key collision on attempt {}; retrying", attempt);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn is_share_key_conflict(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(code, Some(message)) => {
            code.code == ErrorCode::ConstraintViolation && message.contains("share_key")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::lock_path_for;
    use crate::store::{audio_from_row, folder_from_row, AUDIO_COLUMNS, FOLDER_COLUMNS};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        music: PathBuf,
        store: Store,
        roots: RootRegistry,
        options: IndexOptions,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let music = dir.path().join("music");
        fs::create_dir_all(&music).unwrap();
        let db_path = dir.path().join("index.db");
        let store = Store::open(&db_path).unwrap();
        let roots = RootRegistry::parse_with_base(
            &format!("{}:Music", music.display()),
            dir.path(),
        );
        let options = IndexOptions {
            lock_path: lock_path_for(&db_path),
            lock_stale_after: Duration::from_secs(3600),
        };
        Fixture {
            _dir: dir,
            music,
            store,
            roots,
            options,
        }
    }

    fn write(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn run(fx: &Fixture) -> IndexReport {
        match rebuild_index(&fx.store, &fx.roots, &fx.options).unwrap() {
            IndexOutcome::Completed(report) => report,
            IndexOutcome::Skipped { .. } => panic!("rebuild unexpectedly skipped"),
        }
    }

    #[test]
    fn share_key_is_eight_url_safe_chars() {
        let key = generate_share_key();
        assert_eq!(key.len(), 8);
        assert!(key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn indexes_tree_with_sidecars() {
        let fx = fixture();
        write(
            &fx.music.join("folder.json"),
            r#"[{"folder_name":"rock","name":"Rock Hits","original_url":"https://example.com/rock"}]"#,
        );
        write(&fx.music.join("rock/cover.jpg"), "img");
        write(&fx.music.join("rock/live/track.mp3"), "abc");
        write(
            &fx.music.join("rock/live/track.info.json"),
            r#"{"title":"X","meta_artist":"Band","epoch":1700000000}"#,
        );
        write(&fx.music.join("rock/live/track-thumb.jpg"), "img");
        write(&fx.music.join("rock/notes.txt"), "ignored");
        write(&fx.music.join(".hidden/secret.mp3"), "abc");

        let report = run(&fx);
        assert_eq!(report.audio_files, 1);

        let root = fx.store.get_folder("music").unwrap().unwrap();
        assert_eq!(root.parent_path, "");
        assert_eq!(root.folder_name, "Music");
        assert_eq!(root.name, "Music");

        let rock = fx.store.get_folder("music/rock").unwrap().unwrap();
        assert_eq!(rock.name, "Rock Hits");
        assert_eq!(rock.folder_name, "rock");
        assert_eq!(rock.parent_path, "music");
        assert_eq!(rock.poster_image.as_deref(), Some("cover.jpg"));
        assert_eq!(rock.item_count, 1);

        let track = fx
            .store
            .get_audio_file("music/rock/live/track.mp3")
            .unwrap()
            .unwrap();
        assert_eq!(track.parent_path, "music/rock/live");
        assert_eq!(track.size, 3);
        assert_eq!(track.mime_type, "audio/mpeg");
        assert_eq!(track.title.as_deref(), Some("X"));
        assert_eq!(track.artist.as_deref(), Some("Band"));
        assert_eq!(track.downloaded_at.as_deref(), Some("2023-11-14T22:13:20Z"));
        assert_eq!(track.source_path.as_deref(), Some("music/rock"));
        assert_eq!(track.thumbnail.as_deref(), Some("track-thumb.jpg"));
        assert!(!track.deleted);

        assert!(fx.store.get_folder("music/.hidden").unwrap().is_none());
        assert!(fx
            .store
            .get_audio_file("music/.hidden/secret.mp3")
            .unwrap()
            .is_none());
    }

    #[test]
    fn source_path_is_nearest_labelled_ancestor() {
        let fx = fixture();
        write(
            &fx.music.join("folder.json"),
            r#"[{"folder_name":"a","name":"A","original_url":"https://a"}]"#,
        );
        write(
            &fx.music.join("a/folder.json"),
            r#"[{"folder_name":"b","name":"B","original_url":"https://b"}]"#,
        );
        write(&fx.music.join("a/one.mp3"), "1");
        write(&fx.music.join("a/b/c/two.mp3"), "2");
        write(&fx.music.join("plain/three.mp3"), "3");
        run(&fx);

        let source = |path: &str| {
            fx.store
                .get_audio_file(path)
                .unwrap()
                .unwrap()
                .source_path
        };
        assert_eq!(source("music/a/one.mp3").as_deref(), Some("music/a"));
        assert_eq!(source("music/a/b/c/two.mp3").as_deref(), Some("music/a/b"));
        assert_eq!(source("music/plain/three.mp3"), None);
    }

    /// Every folder and audio row with `indexed_at` blanked, ordered by path.
    fn snapshot(store: &Store) -> (Vec<common::FolderRecord>, Vec<common::AudioFileRecord>) {
        let conn = store.conn().unwrap();
        let sql = format!("SELECT {} FROM folders ORDER BY path", FOLDER_COLUMNS);
        let mut stmt = conn.prepare(&sql).unwrap();
        let folders = stmt
            .query_map([], folder_from_row)
            .unwrap()
            .map(|row| {
                let mut folder = row.unwrap();
                folder.indexed_at = None;
                folder
            })
            .collect();
        let sql = format!("SELECT {} FROM audio_files ORDER BY path", AUDIO_COLUMNS);
        let mut stmt = conn.prepare(&sql).unwrap();
        let audio = stmt
            .query_map([], audio_from_row)
            .unwrap()
            .map(|row| {
                let mut audio = row.unwrap();
                audio.indexed_at = None;
                audio
            })
            .collect();
        (folders, audio)
    }

    #[test]
    fn reindex_is_idempotent_and_keeps_share_keys() {
        let fx = fixture();
        write(
            &fx.music.join("folder.json"),
            r#"[{"folder_name":"pop","name":"Pop","original_url":"https://pop"}]"#,
        );
        write(&fx.music.join("pop/poster.jpg"), "img");
        write(&fx.music.join("pop/song.mp3"), "abc");
        write(&fx.music.join("pop/song.info.json"), r#"{"title":"Song","epoch":1700000000}"#);
        write(&fx.music.join("pop/other.ogg"), "abcd");
        write(&fx.music.join("pop/deep/x.flac"), "x");
        run(&fx);
        let first = snapshot(&fx.store);

        run(&fx);
        let second = snapshot(&fx.store);

        assert_eq!(first.0.len(), 3);
        assert_eq!(first.1.len(), 3);
        assert_eq!(first, second);
        assert!(first.0.iter().all(|folder| folder.share_key.is_some()));
        assert!(first.1.iter().all(|audio| audio.share_key.is_some()));
    }

    #[test]
    fn vanished_audio_is_tombstoned_and_keeps_history() {
        let fx = fixture();
        write(&fx.music.join("pop/song.mp3"), "abc");
        run(&fx);
        let before = fx.store.get_audio_file("music/pop/song.mp3").unwrap().unwrap();
        {
            let conn = fx.store.conn().unwrap();
            conn.execute(
                "INSERT INTO play_events (audio_file_id) VALUES (?1)",
                params![before.id],
            )
            .unwrap();
        }

        fs::remove_file(fx.music.join("pop/song.mp3")).unwrap();
        let report = run(&fx);
        assert_eq!(report.deleted_audio_files, 1);

        let after = fx.store.get_audio_file("music/pop/song.mp3").unwrap().unwrap();
        assert!(after.deleted);
        assert_eq!(after.share_key, before.share_key);
        let conn = fx.store.conn().unwrap();
        let joined: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM play_events pe JOIN audio_files af ON af.id = pe.audio_file_id
                 WHERE af.path = ?1",
                params!["music/pop/song.mp3"],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(joined, 1);

        let pop = fx.store.get_folder("music/pop").unwrap().unwrap();
        assert_eq!(pop.item_count, 0);
    }

    #[test]
    fn reappearing_audio_is_undeleted() {
        let fx = fixture();
        let song = fx.music.join("song.mp3");
        write(&song, "abc");
        run(&fx);
        let key = fx.store.get_audio_file("music/song.mp3").unwrap().unwrap().share_key;
        fs::remove_file(&song).unwrap();
        run(&fx);
        write(&song, "abcdef");
        run(&fx);
        let audio = fx.store.get_audio_file("music/song.mp3").unwrap().unwrap();
        assert!(!audio.deleted);
        assert_eq!(audio.size, 6);
        assert_eq!(audio.share_key, key);
    }

    #[test]
    fn vanished_folder_is_removed() {
        let fx = fixture();
        write(&fx.music.join("old/song.mp3"), "abc");
        write(&fx.music.join("keep/song.mp3"), "abc");
        run(&fx);
        assert!(fx.store.get_folder("music/old").unwrap().is_some());

        fs::remove_dir_all(fx.music.join("old")).unwrap();
        let report = run(&fx);
        assert_eq!(report.removed_folders, 1);
        assert!(fx.store.get_folder("music/old").unwrap().is_none());
        assert!(fx.store.get_folder("music/keep").unwrap().is_some());
        let root = fx.store.get_folder("music").unwrap().unwrap();
        assert_eq!(root.item_count, 1);
    }

    #[test]
    fn held_lock_skips_without_writing() {
        let fx = fixture();
        write(&fx.music.join("song.mp3"), "abc");
        run(&fx);
        let before = fx.store.get_audio_file("music/song.mp3").unwrap().unwrap();

        let held = match try_acquire(&fx.options.lock_path).unwrap() {
            LockAttempt::Acquired(guard) => guard,
            LockAttempt::Busy(_) => panic!("lock should be free"),
        };
        write(&fx.music.join("new.mp3"), "abc");
        let outcome = std::thread::scope(|scope| {
            scope
                .spawn(|| rebuild_index(&fx.store, &fx.roots, &fx.options).unwrap())
                .join()
                .unwrap()
        });
        match outcome {
            IndexOutcome::Skipped { holder } => {
                assert_eq!(holder.map(|h| h.pid), Some(std::process::id()));
            }
            IndexOutcome::Completed(_) => panic!("second rebuild must not run"),
        }
        let after = fx.store.get_audio_file("music/song.mp3").unwrap().unwrap();
        assert_eq!(before.indexed_at, after.indexed_at);
        assert!(fx.store.get_audio_file("music/new.mp3").unwrap().is_none());

        drop(held);
        let report = run(&fx);
        assert_eq!(report.audio_files, 2);
        assert!(fx.store.get_audio_file("music/new.mp3").unwrap().is_some());
    }

    #[test]
    fn unreadable_root_is_not_fatal() {
        let fx = fixture();
        let roots = RootRegistry::parse_with_base(
            &format!("{}:Music,/definitely/missing:Gone", fx.music.display()),
            Path::new("/"),
        );
        write(&fx.music.join("a.mp3"), "abc");
        let outcome = rebuild_index(&fx.store, &roots, &fx.options).unwrap();
        let IndexOutcome::Completed(report) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(report.failed_subtrees, 1);
        assert!(fx.store.get_audio_file("music/a.mp3").unwrap().is_some());
    }

    #[test]
    fn offline_root_keeps_its_records() {
        let fx = fixture();
        write(&fx.music.join("show/season/ep.mp3"), "abc");
        run(&fx);
        let (folders_before, audio_before) = snapshot(&fx.store);

        let away = fx.music.with_file_name("music-away");
        fs::rename(&fx.music, &away).unwrap();
        let report = run(&fx);
        assert_eq!(report.failed_subtrees, 1);
        assert_eq!(report.removed_folders, 0);
        assert_eq!(report.deleted_audio_files, 0);

        let ep = fx
            .store
            .get_audio_file("music/show/season/ep.mp3")
            .unwrap()
            .unwrap();
        assert!(!ep.deleted);
        let (folders_after, audio_after) = snapshot(&fx.store);
        assert_eq!(audio_before, audio_after);
        let keys = |folders: &[common::FolderRecord]| -> Vec<(String, Option<String>)> {
            folders
                .iter()
                .map(|f| (f.path.clone(), f.share_key.clone()))
                .collect()
        };
        assert_eq!(keys(&folders_before), keys(&folders_after));

        fs::rename(&away, &fx.music).unwrap();
        fs::remove_file(fx.music.join("show/season/ep.mp3")).unwrap();
        let report = run(&fx);
        assert_eq!(report.failed_subtrees, 0);
        assert_eq!(report.deleted_audio_files, 1);
    }

    #[test]
    fn unreadable_subtree_does_not_shield_lookalike_siblings() {
        let fx = fixture();
        write(&fx.music.join("show/ep.mp3"), "abc");
        write(&fx.music.join("showcase/clip.mp3"), "abc");
        run(&fx);

        let conn = fx.store.conn().unwrap();
        let watermark = sql_timestamp(Utc::now());
        let kept = keep_subtree(&conn, "music/show", &watermark).unwrap();
        assert_eq!(kept, 1);
        let stale: Vec<String> = conn
            .prepare("SELECT path FROM audio_files WHERE indexed_at < ?1")
            .unwrap()
            .query_map(params![watermark], |row| row.get(0))
            .unwrap()
            .map(|row| row.unwrap())
            .collect();
        assert_eq!(stale, ["music/showcase/clip.mp3"]);
    }
}
