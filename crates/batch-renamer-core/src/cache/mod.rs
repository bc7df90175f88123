mod disk;
mod memory;
mod store;

pub use store::{CacheStats, PersistentCacheStore};

use crate::model::CacheEntry;

/// A cache entry plus the file mtime it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRecord {
    pub entry: CacheEntry,
    pub source_mtime: i64,
}
