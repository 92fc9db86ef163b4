use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use common::{AudioStats, DirectoryContents, SearchPage, SourcesStats};

mod cache;
mod error;
mod indexer;
mod lock;
mod media;
mod playback;
mod query;
mod requests;
mod roots;
mod sidecar;
mod stats;
mod store;

pub use cache::BrowseCache;
pub use error::LibraryError;
pub use indexer::{generate_share_key, IndexOptions, IndexOutcome, IndexReport};
pub use lock::{lock_path_for, LockError, LockHolder};
pub use media::audio_mime_type;
pub use playback::PlaybackStore;
pub use query::DEFAULT_SEARCH_LIMIT;
pub use requests::RequestStore;
pub use roots::{slugify, RootRegistry};
pub use store::{Store, StoreCounts};

const DEFAULT_LOCK_STALE_AFTER: Duration = Duration::from_secs(3600);

/// The indexed audio archive: root registry, metadata store and the
/// operations built on top of them.
#[derive(Clone)]
pub struct Library {
    store: Store,
    roots: Arc<RootRegistry>,
    index_options: IndexOptions,
}

impl Library {
    pub fn open(db_path: &Path, roots: RootRegistry) -> Result<Self, LibraryError> {
        let store = Store::open(db_path)?;
        Ok(Self {
            index_options: IndexOptions {
                lock_path: lock_path_for(db_path),
                lock_stale_after: DEFAULT_LOCK_STALE_AFTER,
            },
            store,
            roots: Arc::new(roots),
        })
    }

    pub fn with_lock_stale_after(mut self, stale_after: Duration) -> Self {
        self.index_options.lock_stale_after = stale_after;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn roots(&self) -> &RootRegistry {
        &self.roots
    }

    pub fn resolve(&self, virtual_path: &str) -> Option<PathBuf> {
        self.roots.resolve(virtual_path)
    }

    /// Blocking; runs the full walk on the calling thread.
    pub fn rebuild_index(&self) -> Result<IndexOutcome, LibraryError> {
        indexer::rebuild_index(&self.store, &self.roots, &self.index_options)
    }

    pub fn browse_directory(&self, path: &str) -> Result<DirectoryContents, LibraryError> {
        query::browse_directory(&self.store, &self.roots, path)
    }

    pub fn search(&self, query: &str, limit: i64, offset: i64) -> Result<SearchPage, LibraryError> {
        query::search(&self.store, query, limit, offset)
    }

    pub fn audio_stats(&self) -> Result<AudioStats, LibraryError> {
        stats::audio_stats(&self.store)
    }

    pub fn sources_stats(&self) -> Result<SourcesStats, LibraryError> {
        stats::sources_stats(&self.store)
    }

    pub fn playback(&self) -> PlaybackStore {
        PlaybackStore::new(self.store.clone())
    }

    pub fn requests(&self) -> RequestStore {
        RequestStore::new(self.store.clone())
    }

    pub fn counts(&self) -> Result<StoreCounts, LibraryError> {
        self.store.counts()
    }
}
