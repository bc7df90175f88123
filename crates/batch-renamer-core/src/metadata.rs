use crate::cache::PersistentCacheStore;
use crate::model::MetadataEntry;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{trace, warn};

/// Source of per-file key/value metadata. The extraction backend (an
/// external tool, a media library) stays behind this trait.
pub trait MetadataReader: Send + Sync {
    /// `extended` asks for the slow, complete field set.
    fn read(&self, path: &Path, extended: bool) -> io::Result<BTreeMap<String, String>>;
}

/// Filesystem-level fields only: name parts, size and timestamps.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsMetadataReader;

impl MetadataReader for FsMetadataReader {
    fn read(&self, path: &Path, extended: bool) -> io::Result<BTreeMap<String, String>> {
        let metadata = fs::metadata(path)?;
        let mut fields = BTreeMap::new();

        if let Some(name) = path.file_name() {
            fields.insert("file_name".to_string(), name.to_string_lossy().into_owned());
        }
        if let Some(stem) = path.file_stem() {
            fields.insert("stem".to_string(), stem.to_string_lossy().into_owned());
        }
        if let Some(ext) = path.extension() {
            fields.insert("extension".to_string(), ext.to_string_lossy().into_owned());
        }
        fields.insert("size".to_string(), metadata.len().to_string());

        if let Ok(modified) = metadata.modified() {
            let modified: DateTime<Utc> = modified.into();
            fields.insert("modified".to_string(), modified.to_rfc3339());
            fields.insert("modified_date".to_string(), modified.format("%Y-%m-%d").to_string());
        }

        if extended {
            if let Ok(created) = metadata.created() {
                let created: DateTime<Utc> = created.into();
                fields.insert("created".to_string(), created.to_rfc3339());
                fields.insert("created_date".to_string(), created.format("%Y-%m-%d").to_string());
            }
            if let Ok(accessed) = metadata.accessed() {
                let accessed: DateTime<Utc> = accessed.into();
                fields.insert("accessed".to_string(), accessed.to_rfc3339());
            }
            fields.insert("readonly".to_string(), metadata.permissions().readonly().to_string());
        }

        Ok(fields)
    }
}

/// Cached metadata for `path`, reading through `reader` on a miss. A cached
/// basic entry does not satisfy a request for extended metadata.
pub fn load_metadata(
    cache: &PersistentCacheStore,
    reader: &dyn MetadataReader,
    path: &Path,
    extended: bool,
) -> Option<MetadataEntry> {
    if let Some(entry) = cache.get_metadata(path) {
        if entry.is_extended || !extended {
            trace!("Metadata for {} served from cache", path.display());
            return Some(entry);
        }
    }

    match reader.read(path, extended) {
        Ok(fields) => {
            let entry = MetadataEntry::new(fields, extended);
            cache.set_metadata(path, entry.clone());
            Some(entry)
        }
        Err(e) => {
            warn!("Could not read metadata for {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingReader {
        calls: AtomicUsize,
    }

    impl MetadataReader for CountingReader {
        fn read(&self, path: &Path, extended: bool) -> io::Result<BTreeMap<String, String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            FsMetadataReader.read(path, extended)
        }
    }

    #[test]
    fn test_fs_reader_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.JPG");
        fs::write(&path, "12345").unwrap();

        let basic = FsMetadataReader.read(&path, false).unwrap();
        assert_eq!(basic.get("stem").map(String::as_str), Some("photo"));
        assert_eq!(basic.get("extension").map(String::as_str), Some("JPG"));
        assert_eq!(basic.get("size").map(String::as_str), Some("5"));
        assert!(basic.contains_key("modified_date"));
        assert!(!basic.contains_key("readonly"));

        let extended = FsMetadataReader.read(&path, true).unwrap();
        assert!(extended.contains_key("readonly"));
    }

    #[test]
    fn test_load_metadata_reads_once_then_upgrades() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "a").unwrap();

        let cache = PersistentCacheStore::in_memory(16);
        let reader = CountingReader {
            calls: AtomicUsize::new(0),
        };

        let first = load_metadata(&cache, &reader, &path, false).unwrap();
        let second = load_metadata(&cache, &reader, &path, false).unwrap();
        assert_eq!(first, second);
        assert_eq!(reader.calls.load(Ordering::SeqCst), 1);

        let extended = load_metadata(&cache, &reader, &path, true).unwrap();
        assert!(extended.is_extended);
        assert_eq!(reader.calls.load(Ordering::SeqCst), 2);

        // Extended entry also satisfies basic requests.
        load_metadata(&cache, &reader, &path, false).unwrap();
        assert_eq!(reader.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_load_metadata_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = PersistentCacheStore::in_memory(16);
        assert!(load_metadata(&cache, &FsMetadataReader, &dir.path().join("x"), false).is_none());
    }
}
