use super::conflict::{suffixed_target, ConflictResolver, FileInfo};
use super::plan::{PlanEntry, PlanStatus, RenamePlan};
use super::transform::{Pipeline, TransformContext};
use super::validate::NameLimits;
use crate::cache::PersistentCacheStore;
use crate::config::AppConfig;
use crate::error::{Error, ItemError};
use crate::hasher::{digest, ParallelHashWorker};
use crate::metadata::{self, FsMetadataReader, MetadataReader};
use crate::model::{
    BatchResult, BatchStatus, ConflictDecision, FileEntry, HashAlgorithm, HashEntry, ItemOutcome,
    ItemResult, MetadataEntry, RenameRecord, UndoItemResult, UndoOutcome, UndoResult,
};
use crate::paths;
use crate::progress::{ProgressReporter, RenameProgress, SilentReporter};
use crate::storage::RenameHistoryStore;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    PreviewBuilding,
    PreviewReady,
    Executing,
    Completed,
    PartiallyFailed,
    Cancelled,
}

impl From<BatchStatus> for EngineState {
    fn from(status: BatchStatus) -> Self {
        match status {
            BatchStatus::Completed => EngineState::Completed,
            BatchStatus::PartiallyFailed => EngineState::PartiallyFailed,
            BatchStatus::Cancelled => EngineState::Cancelled,
        }
    }
}

/// Builds rename plans, applies them to the filesystem, keeps the cache in
/// step and records every batch for undo.
///
/// Execution is sequential on the calling thread; only hashing for preview
/// fans out, through the shared [`ParallelHashWorker`] when one is attached.
pub struct RenameEngine {
    cache: Arc<PersistentCacheStore>,
    history: Arc<RenameHistoryStore>,
    reader: Arc<dyn MetadataReader>,
    hasher: Option<Arc<ParallelHashWorker>>,
    limits: NameLimits,
    chunk_size: usize,
    cancel_token: Arc<AtomicBool>,
    state: Mutex<EngineState>,
}

impl RenameEngine {
    pub fn new(
        cache: Arc<PersistentCacheStore>,
        history: Arc<RenameHistoryStore>,
        config: &AppConfig,
    ) -> Self {
        Self {
            cache,
            history,
            reader: Arc::new(FsMetadataReader),
            hasher: None,
            limits: config.name_limits(),
            chunk_size: config.hash_chunk_size,
            cancel_token: Arc::new(AtomicBool::new(false)),
            state: Mutex::new(EngineState::Idle),
        }
    }

    pub fn with_reader(mut self, reader: Arc<dyn MetadataReader>) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_hash_worker(mut self, hasher: Arc<ParallelHashWorker>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    pub fn state(&self) -> EngineState {
        *self.lock_state()
    }

    /// Set to stop `execute` before its next item. Cleared when a batch
    /// starts.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        self.cancel_token.clone()
    }

    pub fn cache(&self) -> &Arc<PersistentCacheStore> {
        &self.cache
    }

    pub fn history(&self) -> &Arc<RenameHistoryStore> {
        &self.history
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: EngineState) {
        *self.lock_state() = state;
    }

    /// Move to `next` unless a batch is running.
    fn enter(&self, next: EngineState) -> Result<(), Error> {
        let mut state = self.lock_state();
        if *state == EngineState::Executing {
            return Err(Error::Busy);
        }
        *state = next;
        Ok(())
    }

    /// Run `pipeline` over `files` and validate the resulting names. The
    /// filesystem is only read.
    pub fn build_preview(&self, files: &[FileEntry], pipeline: &Pipeline) -> Result<RenamePlan, Error> {
        self.enter(EngineState::PreviewBuilding)?;
        let started = Instant::now();

        let metadata: Vec<Option<MetadataEntry>> = if pipeline.needs_metadata() {
            let extended = pipeline.needs_extended_metadata();
            files
                .iter()
                .map(|f| metadata::load_metadata(&self.cache, self.reader.as_ref(), &f.path, extended))
                .collect()
        } else {
            vec![None; files.len()]
        };

        let mut hashes: HashMap<&Path, Vec<HashEntry>> = HashMap::new();
        for algorithm in pipeline.hash_algorithms() {
            for (path, entry) in self.preview_hashes(files, algorithm) {
                hashes.entry(path).or_default().push(entry);
            }
        }

        let names: Vec<(PathBuf, String)> = files
            .iter()
            .enumerate()
            .map(|(index, file)| {
                let ctx = TransformContext {
                    file,
                    index,
                    total: files.len(),
                    metadata: metadata[index].as_ref(),
                    hashes: hashes.get(file.path.as_path()).map(Vec::as_slice).unwrap_or(&[]),
                };
                (file.path.clone(), pipeline.apply(&ctx).to_file_name())
            })
            .collect();

        let plan = RenamePlan::from_names(names, self.limits);
        debug!(
            "Preview of {} files built in {:.2}s ({} batch conflicts)",
            plan.len(),
            started.elapsed().as_secs_f64(),
            plan.batch_conflicts().len()
        );
        self.set_state(EngineState::PreviewReady);
        Ok(plan)
    }

    fn preview_hashes<'a>(
        &self,
        files: &'a [FileEntry],
        algorithm: HashAlgorithm,
    ) -> Vec<(&'a Path, HashEntry)> {
        match &self.hasher {
            Some(hasher) => {
                let paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
                let batch = hasher.checksums(&paths, algorithm, &SilentReporter);
                let by_path: HashMap<PathBuf, HashEntry> = batch
                    .results
                    .into_iter()
                    .map(|h| (h.path, h.entry))
                    .collect();
                files
                    .iter()
                    .filter_map(|f| by_path.get(&f.path).map(|h| (f.path.as_path(), h.clone())))
                    .collect()
            }
            None => files
                .iter()
                .filter_map(|f| {
                    if let Some(entry) = self.cache.get_hash(&f.path, algorithm) {
                        return Some((f.path.as_path(), entry));
                    }
                    match digest::hash_file(&f.path, algorithm, self.chunk_size) {
                        Ok(entry) => {
                            self.cache.set_hash(&f.path, entry.clone());
                            Some((f.path.as_path(), entry))
                        }
                        Err(e) => {
                            warn!("Could not hash {}: {}", f.path.display(), e);
                            None
                        }
                    }
                })
                .collect(),
        }
    }

    /// Apply `plan` in order. Every item gets an outcome; a failing item
    /// never stops the ones after it. Refuses to start while two entries
    /// share a target.
    pub fn execute(
        &self,
        plan: &RenamePlan,
        resolver: &mut ConflictResolver,
        reporter: &dyn ProgressReporter,
    ) -> Result<BatchResult, Error> {
        {
            let mut state = self.lock_state();
            if *state == EngineState::Executing {
                return Err(Error::Busy);
            }
            plan.check_batch_conflicts()?;
            *state = EngineState::Executing;
        }
        resolver.reset();
        self.cancel_token.store(false, Ordering::SeqCst);

        let total = plan.len();
        info!("Executing rename batch of {} items", total);
        reporter.on_rename_start(total);

        let mut items: Vec<ItemResult> = Vec::with_capacity(total);
        let mut progress = RenameProgress {
            total_items: total,
            ..RenameProgress::default()
        };
        let mut cancelled = false;
        for (index, entry) in plan.entries().iter().enumerate() {
            if !cancelled && self.cancel_token.load(Ordering::SeqCst) {
                info!("Rename batch cancelled before item {}", index);
                cancelled = true;
            }
            let size = file_size(&entry.source);
            let (target, outcome) = if cancelled {
                (entry.target.clone(), ItemOutcome::Cancelled)
            } else {
                self.apply_entry(entry, resolver)
            };
            if outcome == ItemOutcome::Cancelled {
                cancelled = true;
            }
            progress.items_done = index + 1;
            if outcome.is_applied() {
                progress.bytes_processed += size;
            }
            reporter.on_rename_progress(&entry.source, progress);
            items.push(ItemResult {
                index,
                source: entry.source.clone(),
                target,
                outcome,
            });
        }

        let status = if cancelled {
            BatchStatus::Cancelled
        } else if items.iter().any(|i| i.outcome.is_failure()) {
            BatchStatus::PartiallyFailed
        } else {
            BatchStatus::Completed
        };

        let mut result = BatchResult {
            batch_id: None,
            status,
            items,
        };
        if result.applied_count() > 0 {
            result.batch_id = self.record(&result);
        }

        info!(
            "Rename batch {}: {} applied, {} skipped, {} failed",
            status.as_str(),
            result.applied_count(),
            result.skipped_count(),
            result.failed_count()
        );
        self.set_state(status.into());
        reporter.on_rename_complete(&result);
        Ok(result)
    }

    fn apply_entry(
        &self,
        entry: &PlanEntry,
        resolver: &mut ConflictResolver,
    ) -> (PathBuf, ItemOutcome) {
        match &entry.status {
            PlanStatus::Unchanged => return (entry.target.clone(), ItemOutcome::Unchanged),
            PlanStatus::Invalid(e) => {
                return (
                    entry.target.clone(),
                    ItemOutcome::Failed(ItemError::Validation(e.clone())),
                )
            }
            _ => {}
        }

        if fs::symlink_metadata(&entry.source).is_err() {
            return (
                entry.target.clone(),
                ItemOutcome::Failed(ItemError::SourceMissing(entry.source.clone())),
            );
        }

        let mut target = entry.target.clone();
        let mut applied = ItemOutcome::Renamed;

        // Existence is re-checked here; the plan's view may be out of date.
        if fs::symlink_metadata(&target).is_ok() && !paths::is_same_file(&entry.source, &target) {
            match resolver.resolve(&entry.source, &target, FileInfo::read(&target)) {
                ConflictDecision::Skip | ConflictDecision::SkipAll => {
                    debug!("Skipping {}: target exists", entry.source.display());
                    return (target, ItemOutcome::Skipped);
                }
                ConflictDecision::Cancel => return (target, ItemOutcome::Cancelled),
                ConflictDecision::Overwrite => applied = ItemOutcome::Overwritten,
                ConflictDecision::RenameWithSuffix => {
                    target = suffixed_target(&target);
                    applied = ItemOutcome::RenamedWithSuffix;
                }
            }
        }

        match fs::rename(&entry.source, &target) {
            Ok(()) => {
                self.cache.remap(&entry.source, &target);
                debug!("Renamed {} -> {}", entry.source.display(), target.display());
                (target, applied)
            }
            Err(e) => {
                warn!(
                    "Failed to rename {} -> {}: {}",
                    entry.source.display(),
                    target.display(),
                    e
                );
                (target, ItemOutcome::Failed(ItemError::from_io(&e)))
            }
        }
    }

    fn record(&self, result: &BatchResult) -> Option<i64> {
        let now = chrono::Utc::now().timestamp_millis();
        let records: Vec<RenameRecord> = result
            .items
            .iter()
            .map(|item| RenameRecord {
                old_path: item.source.clone(),
                new_path: item.target.clone(),
                timestamp: now,
                outcome: item.outcome.label(),
            })
            .collect();
        match self.history.record(result.status, &records) {
            Ok(id) => Some(id),
            Err(e) => {
                error!("Failed to record rename batch in history: {}", e);
                None
            }
        }
    }

    /// Reverse the applied renames of `batch_id`, newest first. Items whose
    /// original location is taken or whose renamed file is gone fail on
    /// their own; the batch is marked undone either way.
    pub fn undo(&self, batch_id: i64, reporter: &dyn ProgressReporter) -> Result<UndoResult, Error> {
        self.enter(EngineState::Executing)?;
        let result = self.undo_batch(batch_id, reporter);
        self.set_state(EngineState::Idle);
        let result = result?;
        reporter.on_undo_complete(&result);
        Ok(result)
    }

    /// Undo the most recent batch not yet undone. `None` when there is
    /// nothing to undo.
    pub fn undo_last(&self, reporter: &dyn ProgressReporter) -> Result<Option<UndoResult>, Error> {
        match self.history.latest_undoable()? {
            Some(batch_id) => self.undo(batch_id, reporter).map(Some),
            None => Ok(None),
        }
    }

    fn undo_batch(&self, batch_id: i64, reporter: &dyn ProgressReporter) -> Result<UndoResult, Error> {
        let operation = self
            .history
            .get(batch_id)?
            .ok_or(Error::BatchNotFound(batch_id))?;
        if operation.undone_at.is_some() {
            return Err(Error::AlreadyUndone(batch_id));
        }

        let applied: Vec<&RenameRecord> = operation
            .records
            .iter()
            .rev()
            .filter(|r| r.is_applied())
            .collect();
        let total = applied.len();
        info!("Undoing batch {} ({} renames)", batch_id, total);
        reporter.on_rename_start(total);

        let mut items = Vec::with_capacity(total);
        let mut progress = RenameProgress {
            total_items: total,
            ..RenameProgress::default()
        };
        for (done, record) in applied.into_iter().enumerate() {
            let size = file_size(&record.new_path);
            let outcome = self.restore(&record.new_path, &record.old_path);
            if let UndoOutcome::Failed(e) = &outcome {
                warn!(
                    "Could not restore {} -> {}: {}",
                    record.new_path.display(),
                    record.old_path.display(),
                    e
                );
            }
            progress.items_done = done + 1;
            if outcome == UndoOutcome::Restored {
                progress.bytes_processed += size;
            }
            reporter.on_rename_progress(&record.old_path, progress);
            items.push(UndoItemResult {
                from: record.new_path.clone(),
                to: record.old_path.clone(),
                outcome,
            });
        }

        if let Err(e) = self.history.mark_undone(batch_id) {
            error!("Failed to mark batch {} as undone: {}", batch_id, e);
        }

        let result = UndoResult { batch_id, items };
        info!(
            "Undo of batch {}: {} restored, {} failed",
            batch_id,
            result.restored_count(),
            result.failed_count()
        );
        Ok(result)
    }

    fn restore(&self, from: &Path, to: &Path) -> UndoOutcome {
        if fs::symlink_metadata(from).is_err() {
            return UndoOutcome::Failed(ItemError::SourceMissing(from.to_path_buf()));
        }
        if fs::symlink_metadata(to).is_ok() && !paths::is_same_file(from, to) {
            return UndoOutcome::Failed(ItemError::TargetOccupied(to.to_path_buf()));
        }
        match fs::rename(from, to) {
            Ok(()) => {
                self.cache.remap(from, to);
                UndoOutcome::Restored
            }
            Err(e) => UndoOutcome::Failed(ItemError::from_io(&e)),
        }
    }
}

fn file_size(path: &Path) -> u64 {
    fs::symlink_metadata(path).map(|m| m.len()).unwrap_or(0)
}
