use crate::error::ItemError;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataStatus {
    #[default]
    None,
    Partial,
    Full,
}

/// A file in the working set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size: u64,
    /// Nanoseconds since the unix epoch.
    pub modified: i64,
    pub checked: bool,
    pub metadata_status: MetadataStatus,
}

impl FileEntry {
    pub fn from_path(path: &Path) -> io::Result<FileEntry> {
        let metadata = fs::metadata(path)?;
        Ok(FileEntry::from_metadata(path, &metadata))
    }

    pub fn from_metadata(path: &Path, metadata: &fs::Metadata) -> FileEntry {
        FileEntry {
            path: paths::normalize_path(path),
            size: metadata.len(),
            modified: paths::modified_nanos(metadata),
            checked: true,
            metadata_status: MetadataStatus::None,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub fields: BTreeMap<String, String>,
    pub is_extended: bool,
    /// Set when fields were edited in the application and not yet written back.
    pub modified: bool,
    /// Milliseconds since the unix epoch.
    pub timestamp: i64,
}

impl MetadataEntry {
    pub fn new(fields: BTreeMap<String, String>, is_extended: bool) -> Self {
        Self {
            fields,
            is_extended,
            modified: false,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Xxh64,
    Blake3,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 2] = [HashAlgorithm::Xxh64, HashAlgorithm::Blake3];

    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Xxh64 => "xxh64",
            HashAlgorithm::Blake3 => "blake3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xxh64" | "xxhash" => Ok(HashAlgorithm::Xxh64),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(format!("unknown hash algorithm '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashEntry {
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest.
    pub value: String,
    /// Milliseconds since the unix epoch.
    pub computed_at: i64,
    /// File mtime (ns) observed before hashing.
    pub source_mtime: i64,
    pub source_size: u64,
}

/// Kind discriminator of a cache entry; one entry per kind per path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Metadata,
    Hash(HashAlgorithm),
}

impl EntryKind {
    pub fn all() -> impl Iterator<Item = EntryKind> {
        std::iter::once(EntryKind::Metadata)
            .chain(HashAlgorithm::ALL.into_iter().map(EntryKind::Hash))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Metadata => "metadata",
            EntryKind::Hash(HashAlgorithm::Xxh64) => "hash:xxh64",
            EntryKind::Hash(HashAlgorithm::Blake3) => "hash:blake3",
        }
    }

    pub fn parse(s: &str) -> Option<EntryKind> {
        EntryKind::all().find(|kind| kind.as_str() == s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheEntry {
    Metadata(MetadataEntry),
    Hash(HashEntry),
}

impl CacheEntry {
    pub fn kind(&self) -> EntryKind {
        match self {
            CacheEntry::Metadata(_) => EntryKind::Metadata,
            CacheEntry::Hash(h) => EntryKind::Hash(h.algorithm),
        }
    }

    pub fn is_extended(&self) -> bool {
        match self {
            CacheEntry::Metadata(m) => m.is_extended,
            CacheEntry::Hash(_) => false,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            CacheEntry::Metadata(m) => m.timestamp,
            CacheEntry::Hash(h) => h.computed_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictDecision {
    Skip,
    Overwrite,
    RenameWithSuffix,
    SkipAll,
    Cancel,
}

/// Result of a single batch item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Renamed,
    Overwritten,
    RenamedWithSuffix,
    Unchanged,
    Skipped,
    Failed(ItemError),
    /// Not dispatched because the batch was cancelled.
    Cancelled,
}

impl ItemOutcome {
    /// True when the file now lives at the item's final target.
    pub fn is_applied(&self) -> bool {
        matches!(
            self,
            ItemOutcome::Renamed | ItemOutcome::Overwritten | ItemOutcome::RenamedWithSuffix
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ItemOutcome::Failed(_))
    }

    pub fn label(&self) -> String {
        match self {
            ItemOutcome::Renamed => "renamed".to_string(),
            ItemOutcome::Overwritten => "overwritten".to_string(),
            ItemOutcome::RenamedWithSuffix => "renamed_with_suffix".to_string(),
            ItemOutcome::Unchanged => "unchanged".to_string(),
            ItemOutcome::Skipped => "skipped".to_string(),
            ItemOutcome::Failed(e) => format!("failed: {}", e),
            ItemOutcome::Cancelled => "cancelled".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemResult {
    pub index: usize,
    pub source: PathBuf,
    /// Final target; differs from the planned one after a suffix rename.
    pub target: PathBuf,
    pub outcome: ItemOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Completed,
    PartiallyFailed,
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Completed => "completed",
            BatchStatus::PartiallyFailed => "partially_failed",
            BatchStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> BatchStatus {
        match s {
            "partially_failed" => BatchStatus::PartiallyFailed,
            "cancelled" => BatchStatus::Cancelled,
            _ => BatchStatus::Completed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    /// History id, present when at least one rename was applied and recorded.
    pub batch_id: Option<i64>,
    pub status: BatchStatus,
    pub items: Vec<ItemResult>,
}

impl BatchResult {
    pub fn applied_count(&self) -> usize {
        self.items.iter().filter(|i| i.outcome.is_applied()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.items.iter().filter(|i| i.outcome.is_failure()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::Skipped))
            .count()
    }
}

/// One row of a recorded batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRecord {
    pub old_path: PathBuf,
    pub new_path: PathBuf,
    /// Milliseconds since the unix epoch.
    pub timestamp: i64,
    pub outcome: String,
}

impl RenameRecord {
    pub fn is_applied(&self) -> bool {
        matches!(
            self.outcome.as_str(),
            "renamed" | "overwritten" | "renamed_with_suffix"
        )
    }
}

#[derive(Debug, Clone)]
pub struct RenameOperation {
    pub batch_id: i64,
    pub created_at: String,
    pub status: BatchStatus,
    pub undone_at: Option<String>,
    pub records: Vec<RenameRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoOutcome {
    Restored,
    Failed(ItemError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoItemResult {
    /// Where the file was moved by the batch.
    pub from: PathBuf,
    /// Original location being restored.
    pub to: PathBuf,
    pub outcome: UndoOutcome,
}

#[derive(Debug, Clone)]
pub struct UndoResult {
    pub batch_id: i64,
    pub items: Vec<UndoItemResult>,
}

impl UndoResult {
    pub fn restored_count(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.outcome == UndoOutcome::Restored)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.items.len() - self.restored_count()
    }
}
