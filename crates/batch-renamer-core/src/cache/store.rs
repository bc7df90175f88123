use super::disk::DiskTier;
use super::memory::MemoryTier;
use super::CachedRecord;
use crate::model::{CacheEntry, EntryKind, HashAlgorithm, HashEntry, MetadataEntry};
use crate::paths;
use crate::storage::{Database, Schema};
use std::hash::Hasher as _;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, trace, warn};
use twox_hash::XxHash64;

const LOCK_STRIPES: usize = 64;

/// Per-path serialization of cache mutations. Paths hash onto a fixed set of
/// stripes; two paths sharing a stripe simply serialize with each other.
struct PathLocks {
    stripes: Vec<Mutex<()>>,
}

impl PathLocks {
    fn new() -> Self {
        Self {
            stripes: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn index(&self, key: &str) -> usize {
        let mut hasher = XxHash64::with_seed(0);
        hasher.write(key.as_bytes());
        (hasher.finish() % self.stripes.len() as u64) as usize
    }

    fn lock_index(&self, index: usize) -> MutexGuard<'_, ()> {
        self.stripes[index].lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        self.lock_index(self.index(key))
    }

    /// Lock the stripes of both keys in index order.
    fn lock_pair(&self, a: &str, b: &str) -> (MutexGuard<'_, ()>, Option<MutexGuard<'_, ()>>) {
        let (ia, ib) = (self.index(a), self.index(b));
        if ia == ib {
            return (self.lock_index(ia), None);
        }
        let (first, second) = if ia < ib { (ia, ib) } else { (ib, ia) };
        let g1 = self.lock_index(first);
        let g2 = self.lock_index(second);
        (g1, Some(g2))
    }
}

/// Counters for display; reset when the process restarts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale: u64,
    pub evictions: u64,
    pub memory_entries: usize,
    pub disk_entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Two-tier metadata and hash cache keyed by normalized absolute path.
///
/// Lookups are validated against the file's current mtime, so an entry for a
/// file changed behind our back reads as a miss. The cache is advisory: every
/// internal failure is logged and degrades to "not cached".
pub struct PersistentCacheStore {
    memory: MemoryTier,
    disk: Option<DiskTier>,
    locks: PathLocks,
    hits: AtomicU64,
    misses: AtomicU64,
    stale: AtomicU64,
}

impl PersistentCacheStore {
    /// Open the durable tier at `db_path`. A corrupt file is moved aside; if
    /// no database can be opened the store runs memory-only.
    pub fn open(db_path: &str, capacity: usize) -> Self {
        let disk = Database::open_or_recover(db_path, Schema::Cache).map(DiskTier::new);
        match &disk {
            Some(_) => debug!("Using '{}' for file cache", db_path),
            None => warn!("File cache running without persistence"),
        }
        Self::with_tiers(MemoryTier::new(capacity), disk)
    }

    /// Store whose second tier is an in-memory SQLite database.
    pub fn in_memory(capacity: usize) -> Self {
        let disk = match Database::open_in_memory(Schema::Cache) {
            Ok(db) => Some(DiskTier::new(db)),
            Err(e) => {
                warn!("In-memory cache database unavailable: {}", e);
                None
            }
        };
        Self::with_tiers(MemoryTier::new(capacity), disk)
    }

    fn with_tiers(memory: MemoryTier, disk: Option<DiskTier>) -> Self {
        Self {
            memory,
            disk,
            locks: PathLocks::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale: AtomicU64::new(0),
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.disk.is_some()
    }

    pub fn get(&self, path: &Path, kind: EntryKind) -> Option<CacheEntry> {
        let key = paths::path_key(path);

        let record = match self.memory.get(&key, kind) {
            Some(record) => Some(record),
            None => self.load_from_disk(&key, kind),
        };

        let Some(record) = record else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        if paths::current_mtime(Path::new(&key)) != Some(record.source_mtime) {
            trace!("Stale {} entry for {}", kind.as_str(), key);
            self.drop_stale(&key, kind, record.source_mtime);
            self.stale.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(record.entry)
    }

    fn load_from_disk(&self, key: &str, kind: EntryKind) -> Option<CachedRecord> {
        let disk = self.disk.as_ref()?;
        let _guard = self.locks.lock(key);
        match disk.get(key, kind) {
            Ok(Some(record)) => {
                self.memory.put(key, record.clone());
                Some(record)
            }
            Ok(None) => None,
            Err(e) => {
                error!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    fn drop_stale(&self, key: &str, kind: EntryKind, source_mtime: i64) {
        let _guard = self.locks.lock(key);
        self.memory.remove_if_stale(key, kind, source_mtime);
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.remove_if_stale(key, kind, source_mtime) {
                error!("Cache cleanup failed for {}: {}", key, e);
            }
        }
    }

    /// Write-through to both tiers. Metadata entries are stamped with the
    /// file's current mtime; hash entries carry the mtime observed before
    /// hashing.
    pub fn set(&self, path: &Path, entry: CacheEntry) {
        let key = paths::path_key(path);
        let source_mtime = match &entry {
            CacheEntry::Hash(h) => h.source_mtime,
            CacheEntry::Metadata(_) => match paths::current_mtime(Path::new(&key)) {
                Some(mtime) => mtime,
                None => {
                    debug!("Not caching metadata for missing file {}", key);
                    return;
                }
            },
        };
        let record = CachedRecord {
            entry,
            source_mtime,
        };

        let _guard = self.locks.lock(&key);
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.put(&key, &record) {
                error!("Cache write failed for {}: {}", key, e);
            }
        }
        self.memory.put(&key, record);
    }

    /// Move every entry of `old_path` to `new_path`. Must only be called after
    /// the filesystem rename has succeeded.
    pub fn remap(&self, old_path: &Path, new_path: &Path) {
        let old = paths::path_key(old_path);
        let new = paths::path_key(new_path);
        if old == new {
            return;
        }

        let _guards = self.locks.lock_pair(&old, &new);
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.remap(&old, &new) {
                error!("Cache remap {} -> {} failed: {}", old, new, e);
                for key in [&old, &new] {
                    if let Err(e) = disk.remove_path(key) {
                        error!("Cache cleanup after failed remap failed for {}: {}", key, e);
                    }
                }
            }
        }
        let moved = self.memory.remap(&old, &new);
        trace!("Remapped cache {} -> {} ({} in memory)", old, new, moved);
    }

    pub fn invalidate(&self, path: &Path) {
        let key = paths::path_key(path);
        let _guard = self.locks.lock(&key);
        self.memory.remove_path(&key);
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.remove_path(&key) {
                error!("Cache invalidate failed for {}: {}", key, e);
            }
        }
    }

    pub fn clear(&self) {
        self.memory.clear();
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.clear() {
                error!("Cache clear failed: {}", e);
            }
        }
        info!("File cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let disk_entries = match &self.disk {
            Some(disk) => disk.count().unwrap_or_else(|e| {
                error!("Error counting cache entries: {}", e);
                0
            }),
            None => 0,
        };
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            evictions: self.memory.evictions(),
            memory_entries: self.memory.len(),
            disk_entries,
        }
    }

    pub fn get_metadata(&self, path: &Path) -> Option<MetadataEntry> {
        match self.get(path, EntryKind::Metadata)? {
            CacheEntry::Metadata(m) => Some(m),
            CacheEntry::Hash(_) => None,
        }
    }

    pub fn set_metadata(&self, path: &Path, entry: MetadataEntry) {
        self.set(path, CacheEntry::Metadata(entry));
    }

    pub fn get_hash(&self, path: &Path, algorithm: HashAlgorithm) -> Option<HashEntry> {
        match self.get(path, EntryKind::Hash(algorithm))? {
            CacheEntry::Hash(h) => Some(h),
            CacheEntry::Metadata(_) => None,
        }
    }

    pub fn set_hash(&self, path: &Path, entry: HashEntry) {
        self.set(path, CacheEntry::Hash(entry));
    }

    #[cfg(test)]
    pub(crate) fn disk(&self) -> Option<&DiskTier> {
        self.disk.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;

    fn hash_entry_for(path: &Path, value: &str) -> HashEntry {
        let meta = fs::metadata(path).unwrap();
        HashEntry {
            algorithm: HashAlgorithm::Xxh64,
            value: value.to_string(),
            computed_at: 1,
            source_mtime: paths::modified_nanos(&meta),
            source_size: meta.len(),
        }
    }

    fn metadata_entry(title: &str) -> MetadataEntry {
        let mut fields = BTreeMap::new();
        fields.insert("title".to_string(), title.to_string());
        MetadataEntry::new(fields, false)
    }

    #[test]
    fn test_set_then_get_both_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "content").unwrap();

        let store = PersistentCacheStore::in_memory(16);
        store.set_hash(&file, hash_entry_for(&file, "abc"));
        store.set_metadata(&file, metadata_entry("hello"));

        assert_eq!(store.get_hash(&file, HashAlgorithm::Xxh64).unwrap().value, "abc");
        assert!(store.get_hash(&file, HashAlgorithm::Blake3).is_none());
        assert_eq!(store.get_metadata(&file).unwrap().get("title"), Some("hello"));

        let stats = store.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.disk_entries, 2);
    }

    #[test]
    fn test_key_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "content").unwrap();

        let store = PersistentCacheStore::in_memory(16);
        store.set_hash(&file, hash_entry_for(&file, "abc"));
        let dotted = dir.path().join(".").join("sub").join("..").join("a.txt");
        assert!(store.get_hash(&dotted, HashAlgorithm::Xxh64).is_some());
    }

    #[test]
    fn test_external_modification_reads_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "content").unwrap();

        let store = PersistentCacheStore::in_memory(16);
        let mut entry = hash_entry_for(&file, "abc");
        entry.source_mtime -= 1_000_000_000;
        store.set_hash(&file, entry);

        assert!(store.get_hash(&file, HashAlgorithm::Xxh64).is_none());
        let stats = store.stats();
        assert_eq!(stats.stale, 1);
        assert_eq!(stats.disk_entries, 0);
    }

    #[test]
    fn test_corrupt_payload_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, "content").unwrap();

        // Capacity 1 so the entry only survives on disk.
        let store = PersistentCacheStore::in_memory(1);
        store.set_hash(&file, hash_entry_for(&file, "abc"));
        let other = dir.path().join("b.txt");
        fs::write(&other, "other").unwrap();
        store.set_hash(&other, hash_entry_for(&other, "def"));

        let key = paths::path_key(&file);
        store
            .disk()
            .unwrap()
            .corrupt_payload(&key, EntryKind::Hash(HashAlgorithm::Xxh64));

        assert!(store.get_hash(&file, HashAlgorithm::Xxh64).is_none());
        assert_eq!(store.stats().disk_entries, 1);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();

        let store = PersistentCacheStore::in_memory(16);
        store.set_hash(&a, hash_entry_for(&a, "1"));
        store.set_metadata(&a, metadata_entry("a"));
        store.set_hash(&b, hash_entry_for(&b, "2"));

        store.invalidate(&a);
        assert!(store.get_hash(&a, HashAlgorithm::Xxh64).is_none());
        assert!(store.get_metadata(&a).is_none());
        assert!(store.get_hash(&b, HashAlgorithm::Xxh64).is_some());

        store.clear();
        let stats = store.stats();
        assert_eq!(stats.memory_entries, 0);
        assert_eq!(stats.disk_entries, 0);
    }

    #[test]
    fn test_failed_disk_remap_leaves_no_rows_behind() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();

        let store = PersistentCacheStore::in_memory(16);
        store.set_hash(&a, hash_entry_for(&a, "1"));
        store.set_hash(&b, hash_entry_for(&b, "2"));
        let disk = store.disk().unwrap();
        assert_eq!(disk.count().unwrap(), 2);

        disk.block_updates();
        store.remap(&a, &b);

        assert_eq!(disk.count().unwrap(), 0);
        assert_eq!(store.stats().memory_entries, 1);
    }

    #[test]
    fn test_metadata_for_missing_file_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentCacheStore::in_memory(16);
        store.set_metadata(&dir.path().join("missing.txt"), metadata_entry("x"));
        assert_eq!(store.stats().disk_entries, 0);
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..CacheStats::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
