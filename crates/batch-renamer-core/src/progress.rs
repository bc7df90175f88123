use crate::model::{BatchResult, UndoResult};
use std::path::Path;

/// Snapshot of a running hash batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HashProgress {
    pub files_done: usize,
    pub total_files: usize,
    /// Bytes actually read from disk; cache hits contribute nothing.
    pub bytes_processed: u64,
    pub cache_hits: usize,
}

/// Snapshot of a running rename or undo batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenameProgress {
    pub items_done: usize,
    pub total_items: usize,
    /// Total size of the files moved so far.
    pub bytes_processed: u64,
}

/// Trait for reporting rename and hash progress.
///
/// CLI implements with indicatif bars. All methods have default no-op
/// implementations.
///
/// Rename and undo callbacks run on the thread that called
/// `RenameEngine::execute` / `RenameEngine::undo`. Hash callbacks run on the
/// hash pool's worker threads, outside any internal lock.
pub trait ProgressReporter: Send + Sync {
    fn on_rename_start(&self, _total: usize) {}
    fn on_rename_progress(&self, _current: &Path, _progress: RenameProgress) {}
    fn on_rename_complete(&self, _result: &BatchResult) {}
    fn on_undo_complete(&self, _result: &UndoResult) {}
    fn on_hash_start(&self, _total_files: usize) {}
    fn on_hash_progress(&self, _current: &Path, _progress: HashProgress) {}
    fn on_hash_complete(&self, _progress: HashProgress, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
