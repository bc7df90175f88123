use batch_renamer_core::{BatchResult, HashProgress, ProgressReporter, RenameProgress, UndoResult};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// - Rename / undo: bar over plan items, bytes moved and current file as message
/// - Hash: bar over files, bytes read as message
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.lock();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.lock().take() {
            pb.finish_and_clear();
        }
    }

    fn new_bar(total: usize, template: &str) -> ProgressBar {
        let pb = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸─")
            .tick_chars(TICK_CHARS);
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    /// Hide the active bar while `f` writes to the terminal.
    pub fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        let bar = self.lock().clone();
        match bar {
            Some(pb) => pb.suspend(f),
            None => f(),
        }
    }
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for CliReporter {
    fn on_rename_start(&self, total: usize) {
        self.set_bar(Self::new_bar(
            total,
            "  {spinner:.cyan} Renaming [{bar:30.cyan/dim}] {pos}/{len} {wide_msg}",
        ));
    }

    fn on_rename_progress(&self, current: &Path, progress: RenameProgress) {
        if let Some(pb) = self.lock().as_ref() {
            pb.set_position(progress.items_done as u64);
            let name = current
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            pb.set_message(format!(
                "{:.1} MB moved  {}",
                progress.bytes_processed as f64 / (1024.0 * 1024.0),
                name
            ));
        }
    }

    fn on_rename_complete(&self, result: &BatchResult) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Rename {}: {} renamed, {} skipped, {} failed",
            result.status.as_str(),
            result.applied_count(),
            result.skipped_count(),
            result.failed_count()
        );
    }

    fn on_undo_complete(&self, result: &UndoResult) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Undo of batch {}: {} restored, {} failed",
            result.batch_id,
            result.restored_count(),
            result.failed_count()
        );
    }

    fn on_hash_start(&self, total_files: usize) {
        self.set_bar(Self::new_bar(
            total_files,
            "  {spinner:.cyan} Hashing [{bar:30.cyan/dim}] {pos}/{len} files {msg} ({eta} remaining)",
        ));
    }

    fn on_hash_progress(&self, _current: &Path, progress: HashProgress) {
        if let Some(pb) = self.lock().as_ref() {
            pb.set_position(progress.files_done as u64);
            pb.set_message(format!(
                "{:.1} MB read",
                progress.bytes_processed as f64 / (1024.0 * 1024.0)
            ));
        }
    }

    fn on_hash_complete(&self, progress: HashProgress, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Hash complete: {} files ({} cached) in {:.2}s",
            progress.files_done, progress.cache_hits, duration_secs
        );
    }
}
