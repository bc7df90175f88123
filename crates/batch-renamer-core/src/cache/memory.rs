//! Tier 1: bounded in-memory LRU.

use super::CachedRecord;
use crate::model::EntryKind;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::trace;

type Key = (String, EntryKind);

pub struct MemoryTier {
    entries: Mutex<LruCache<Key, CachedRecord>>,
    evictions: AtomicU64,
}

impl MemoryTier {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            evictions: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<Key, CachedRecord>> {
        // A panic while holding the lock leaves the map structurally intact.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lookup that marks the entry most-recently-used.
    pub fn get(&self, path: &str, kind: EntryKind) -> Option<CachedRecord> {
        self.lock().get(&(path.to_string(), kind)).cloned()
    }

    pub fn put(&self, path: &str, record: CachedRecord) {
        let key = (path.to_string(), record.entry.kind());
        if let Some((evicted, _)) = self.lock().push(key.clone(), record) {
            if evicted != key {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                trace!("Evicted {} ({}) from memory tier", evicted.0, evicted.1.as_str());
            }
        }
    }

    pub fn remove(&self, path: &str, kind: EntryKind) -> Option<CachedRecord> {
        self.lock().pop(&(path.to_string(), kind))
    }

    /// Remove the entry only if it still carries `source_mtime`.
    pub fn remove_if_stale(&self, path: &str, kind: EntryKind, source_mtime: i64) {
        let mut entries = self.lock();
        let key = (path.to_string(), kind);
        if entries
            .peek(&key)
            .is_some_and(|r| r.source_mtime == source_mtime)
        {
            entries.pop(&key);
        }
    }

    pub fn remove_path(&self, path: &str) {
        let mut entries = self.lock();
        for kind in EntryKind::all() {
            entries.pop(&(path.to_string(), kind));
        }
    }

    /// Move every kind stored under `old` to `new`, replacing what `new` had.
    pub fn remap(&self, old: &str, new: &str) -> usize {
        let mut entries = self.lock();
        let mut moved = 0;
        for kind in EntryKind::all() {
            entries.pop(&(new.to_string(), kind));
            if let Some(record) = entries.pop(&(old.to_string(), kind)) {
                entries.put((new.to_string(), kind), record);
                moved += 1;
            }
        }
        moved
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CacheEntry, HashAlgorithm, HashEntry};

    fn record(value: &str) -> CachedRecord {
        CachedRecord {
            entry: CacheEntry::Hash(HashEntry {
                algorithm: HashAlgorithm::Xxh64,
                value: value.to_string(),
                computed_at: 0,
                source_mtime: 7,
                source_size: 1,
            }),
            source_mtime: 7,
        }
    }

    #[test]
    fn test_lru_eviction_order() {
        let tier = MemoryTier::new(2);
        let kind = EntryKind::Hash(HashAlgorithm::Xxh64);
        tier.put("/a", record("a"));
        tier.put("/b", record("b"));
        // Touch /a so /b becomes least recently used.
        assert!(tier.get("/a", kind).is_some());
        tier.put("/c", record("c"));

        assert!(tier.get("/a", kind).is_some());
        assert!(tier.get("/b", kind).is_none());
        assert!(tier.get("/c", kind).is_some());
        assert_eq!(tier.evictions(), 1);
    }

    #[test]
    fn test_replacing_a_key_is_not_an_eviction() {
        let tier = MemoryTier::new(2);
        tier.put("/a", record("1"));
        tier.put("/a", record("2"));
        assert_eq!(tier.evictions(), 0);
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_remap_moves_and_replaces() {
        let tier = MemoryTier::new(8);
        let kind = EntryKind::Hash(HashAlgorithm::Xxh64);
        tier.put("/old", record("moved"));
        tier.put("/new", record("replaced"));

        assert_eq!(tier.remap("/old", "/new"), 1);
        assert!(tier.get("/old", kind).is_none());
        let moved = tier.get("/new", kind).unwrap();
        assert_eq!(moved, record("moved"));
    }

    #[test]
    fn test_remove_if_stale_keeps_fresh_entry() {
        let tier = MemoryTier::new(4);
        let kind = EntryKind::Hash(HashAlgorithm::Xxh64);
        tier.put("/a", record("a"));
        tier.remove_if_stale("/a", kind, 99);
        assert!(tier.get("/a", kind).is_some());
        tier.remove_if_stale("/a", kind, 7);
        assert!(tier.get("/a", kind).is_none());
    }
}
