use std::collections::HashMap;
use std::time::{Duration, Instant};

use common::DirectoryContents;
use parking_lot::RwLock;
use tracing::debug;

const SWEEP_PROBABILITY: f64 = 0.01;

struct CachedListing {
    contents: DirectoryContents,
    expires_at: Instant,
}

/// TTL cache of directory listings keyed by virtual path.
pub struct BrowseCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedListing>>,
}

impl BrowseCache {
    /// A zero TTL disables caching.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub fn get(&self, path: &str) -> Option<DirectoryContents> {
        if !self.is_enabled() {
            return None;
        }
        let entries = self.entries.read();
        let entry = entries.get(path)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.contents.clone())
    }

    pub fn insert(&self, path: &str, contents: DirectoryContents) {
        if !self.is_enabled() {
            return;
        }
        let now = Instant::now();
        let mut entries = self.entries.write();
        entries.insert(
            path.to_string(),
            CachedListing {
                contents,
                expires_at: now + self.ttl,
            },
        );
        if rand::random::<f64>() < SWEEP_PROBABILITY {
            sweep(&mut entries, now);
        }
    }

    /// Returns the cached listing or computes, stores and returns a fresh one.
    pub fn get_or_load<E, F>(&self, path: &str, load: F) -> Result<DirectoryContents, E>
    where
        F: FnOnce() -> Result<DirectoryContents, E>,
    {
        if let Some(hit) = self.get(path) {
            return Ok(hit);
        }
        let contents = load()?;
        self.insert(path, contents.clone());
        Ok(contents)
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        debug!("Clearing {} cached listings", entries.len());
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sweep(entries: &mut HashMap<String, CachedListing>, now: Instant) {
    entries.retain(|_, entry| entry.expires_at > now);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(path: &str) -> DirectoryContents {
        DirectoryContents {
            items: Vec::new(),
            current_path: path.to_string(),
        }
    }

    #[test]
    fn hit_until_ttl_elapses() {
        let cache = BrowseCache::new(Duration::from_millis(50));
        cache.insert("music", listing("music"));
        assert_eq!(cache.get("music"), Some(listing("music")));
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(cache.get("music"), None);
    }

    #[test]
    fn zero_ttl_disables_cache() {
        let cache = BrowseCache::new(Duration::ZERO);
        let mut loads = 0;
        for _ in 0..2 {
            cache
                .get_or_load::<(), _>("music", || {
                    loads += 1;
                    Ok(listing("music"))
                })
                .unwrap();
        }
        assert_eq!(loads, 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn get_or_load_caches_and_clear_drops() {
        let cache = BrowseCache::new(Duration::from_secs(60));
        let mut loads = 0;
        for _ in 0..3 {
            cache
                .get_or_load::<(), _>("music", || {
                    loads += 1;
                    Ok(listing("music"))
                })
                .unwrap();
        }
        assert_eq!(loads, 1);
        cache.clear();
        assert!(cache.get("music").is_none());
    }

    #[test]
    fn load_errors_are_not_cached() {
        let cache = BrowseCache::new(Duration::from_secs(60));
        let result = cache.get_or_load("music", || Err("boom"));
        assert_eq!(result, Err("boom"));
        assert!(cache.is_empty());
    }
}
