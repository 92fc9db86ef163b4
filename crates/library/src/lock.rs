//! Cross-process single-flight lock for reindexing.
//!
//! The lock itself is an advisory `fs2` file lock, so the kernel drops it
//! when the holding process exits. A JSON sidecar next to the lock file
//! records who holds it and when it last made progress, which lets a losing
//! contender report a holder that has stopped heartbeating.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const HEARTBEAT_EVERY: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum LockError {
    Create(io::Error),
    Acquire(io::Error),
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockError::Create(err) => write!(f, "failed to create lock file: {}", err),
            LockError::Acquire(err) => write!(f, "failed to acquire lock: {}", err),
        }
    }
}

impl std::error::Error for LockError {}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockHolder {
    pub pid: u32,
    pub exe: Option<String>,
    pub acquired_at: DateTime<Utc>,
    pub heartbeat_at: DateTime<Utc>,
}

impl LockHolder {
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        match chrono::Duration::from_std(stale_after) {
            Ok(limit) => now.signed_duration_since(self.heartbeat_at) > limit,
            Err(_) => false,
        }
    }
}

pub enum LockAttempt {
    Acquired(ReindexLockGuard),
    Busy(Option<LockHolder>),
}

/// Holds the reindex lock until dropped.
pub struct ReindexLockGuard {
    _file: File,
    lock_path: PathBuf,
    sidecar_path: PathBuf,
    holder: LockHolder,
    last_beat: Instant,
}

impl ReindexLockGuard {
    /// Refreshes the sidecar heartbeat, at most once every few seconds.
    pub fn heartbeat(&mut self) {
        if self.last_beat.elapsed() < HEARTBEAT_EVERY {
            return;
        }
        self.last_beat = Instant::now();
        self.holder.heartbeat_at = Utc::now();
        write_sidecar(&self.sidecar_path, &self.holder);
    }
}

impl Drop for ReindexLockGuard {
    fn drop(&mut self) {
        debug!("Releasing reindex lock: {}", self.lock_path.display());
        if let Err(err) = fs::remove_file(&self.sidecar_path) {
            debug!(
                "Failed to remove lock sidecar {}: {}",
                self.sidecar_path.display(),
                err
            );
        }
    }
}

impl std::fmt::Debug for ReindexLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReindexLockGuard")
            .field("lock_path", &self.lock_path)
            .field("holder", &self.holder)
            .finish()
    }
}

/// `/data/index.db` → `/data/index.db.reindex.lock`
pub fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_os_string();
    name.push(".reindex.lock");
    PathBuf::from(name)
}

fn sidecar_path_for(lock_path: &Path) -> PathBuf {
    let mut name = lock_path.as_os_str().to_os_string();
    name.push(".json");
    PathBuf::from(name)
}

/// Non-blocking attempt. A held lock is not an error: the caller gets
/// `Busy` with whatever the sidecar says about the current holder.
pub fn try_acquire(lock_path: &Path) -> Result<LockAttempt, LockError> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .map_err(LockError::Create)?;

    let sidecar_path = sidecar_path_for(lock_path);
    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => {
            let now = Utc::now();
            let holder = LockHolder {
                pid: std::process::id(),
                exe: std::env::current_exe()
                    .ok()
                    .map(|p| p.display().to_string()),
                acquired_at: now,
                heartbeat_at: now,
            };
            write_sidecar(&sidecar_path, &holder);
            debug!("Acquired reindex lock: {}", lock_path.display());
            Ok(LockAttempt::Acquired(ReindexLockGuard {
                _file: file,
                lock_path: lock_path.to_path_buf(),
                sidecar_path,
                holder,
                last_beat: Instant::now(),
            }))
        }
        Err(err) if is_contended(&err) => Ok(LockAttempt::Busy(read_sidecar(&sidecar_path))),
        Err(err) => Err(LockError::Acquire(err)),
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn write_sidecar(path: &Path, holder: &LockHolder) {
    let result = serde_json::to_vec_pretty(holder)
        .map_err(io::Error::other)
        .and_then(|payload| fs::write(path, payload));
    if let Err(err) = result {
        warn!("Failed to write lock sidecar {}: {}", path.display(), err);
    }
}

fn read_sidecar(path: &Path) -> Option<LockHolder> {
    let data = fs::read(path).ok()?;
    serde_json::from_slice(&data).ok()
}
