use super::digest;
use crate::cache::PersistentCacheStore;
use crate::config::AppConfig;
use crate::error::Error;
use crate::model::{HashAlgorithm, HashEntry};
use crate::paths;
use crate::progress::{HashProgress, ProgressReporter};
use crate::scanner;
use dashmap::DashMap;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHash {
    pub path: PathBuf,
    pub entry: HashEntry,
    /// Served from the cache without reading the file.
    pub cached: bool,
}

#[derive(Debug, Clone, Default)]
pub struct HashBatch {
    /// In input order; files that failed or were never dispatched are absent.
    pub results: Vec<FileHash>,
    pub errors: Vec<(PathBuf, String)>,
    pub cancelled: bool,
    pub progress: HashProgress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub hash: String,
    pub size: u64,
    pub paths: Vec<PathBuf>,
}

impl DuplicateGroup {
    pub fn wasted_bytes(&self) -> u64 {
        self.size * (self.paths.len() as u64 - 1)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DuplicateReport {
    /// Largest wasted space first.
    pub groups: Vec<DuplicateGroup>,
    pub errors: Vec<(PathBuf, String)>,
    pub cancelled: bool,
}

/// Outcome of comparing two folder trees by relative path.
#[derive(Debug, Clone, Default)]
pub struct FolderComparison {
    pub matches: Vec<PathBuf>,
    pub mismatches: Vec<PathBuf>,
    pub only_left: Vec<PathBuf>,
    pub only_right: Vec<PathBuf>,
    pub errors: Vec<(PathBuf, String)>,
    pub cancelled: bool,
}

/// Content hashing on a dedicated rayon pool, sharing the file cache with the
/// rename engine.
pub struct ParallelHashWorker {
    cache: Arc<PersistentCacheStore>,
    pool: rayon::ThreadPool,
    workers: usize,
    chunk_size: usize,
    cancel_token: Arc<AtomicBool>,
}

impl ParallelHashWorker {
    pub fn new(cache: Arc<PersistentCacheStore>, config: &AppConfig) -> Result<Self, Error> {
        Self::with_workers(cache, config.hash_worker_count(), config.hash_chunk_size)
    }

    pub fn with_workers(
        cache: Arc<PersistentCacheStore>,
        workers: usize,
        chunk_size: usize,
    ) -> Result<Self, Error> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("hash-worker-{}", i))
            .build()
            .map_err(|e| Error::Other(format!("Failed to build hash pool: {}", e)))?;
        debug!("Hash pool started with {} workers", workers);
        Ok(Self {
            cache,
            pool,
            workers,
            chunk_size,
            cancel_token: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Shared flag checked before each file is dispatched. Cleared at the
    /// start of every batch.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        self.cancel_token.clone()
    }

    /// Cache-aware hash of a single file on the calling thread.
    pub fn hash_file(&self, path: &Path, algorithm: HashAlgorithm) -> io::Result<FileHash> {
        self.hash_one(path, algorithm).map(|(hash, _)| hash)
    }

    /// Returns the hash and the number of bytes read from disk.
    fn hash_one(&self, path: &Path, algorithm: HashAlgorithm) -> io::Result<(FileHash, u64)> {
        if let Some(entry) = self.cache.get_hash(path, algorithm) {
            return Ok((
                FileHash {
                    path: path.to_path_buf(),
                    entry,
                    cached: true,
                },
                0,
            ));
        }

        let entry = digest::hash_file(path, algorithm, self.chunk_size)?;
        let bytes = entry.source_size;
        self.cache.set_hash(path, entry.clone());
        Ok((
            FileHash {
                path: path.to_path_buf(),
                entry,
                cached: false,
            },
            bytes,
        ))
    }

    /// Plain checksum calculation over `paths`.
    pub fn checksums(
        &self,
        paths: &[PathBuf],
        algorithm: HashAlgorithm,
        reporter: &dyn ProgressReporter,
    ) -> HashBatch {
        self.cancel_token.store(false, Ordering::SeqCst);
        let started = Instant::now();
        let tally = Mutex::new(HashProgress {
            total_files: paths.len(),
            ..HashProgress::default()
        });
        reporter.on_hash_start(paths.len());

        let outcomes: Vec<Option<io::Result<(FileHash, u64)>>> = self.pool.install(|| {
            paths
                .par_iter()
                .map(|path| {
                    if self.cancel_token.load(Ordering::SeqCst) {
                        return None;
                    }
                    let outcome = self.hash_one(path, algorithm);

                    let snapshot = {
                        let mut tally = tally.lock().unwrap_or_else(|e| e.into_inner());
                        tally.files_done += 1;
                        if let Ok((hash, bytes)) = &outcome {
                            tally.bytes_processed += bytes;
                            if hash.cached {
                                tally.cache_hits += 1;
                            }
                        }
                        *tally
                    };
                    reporter.on_hash_progress(path, snapshot);
                    Some(outcome)
                })
                .collect()
        });

        let mut batch = HashBatch::default();
        for (path, outcome) in paths.iter().zip(outcomes) {
            match outcome {
                Some(Ok((hash, _))) => batch.results.push(hash),
                Some(Err(e)) => {
                    error!("Error hashing '{}': {}", path.display(), e);
                    batch.errors.push((path.clone(), e.to_string()));
                }
                None => batch.cancelled = true,
            }
        }
        batch.progress = tally.into_inner().unwrap_or_else(|e| e.into_inner());

        let duration = started.elapsed().as_secs_f64();
        reporter.on_hash_complete(batch.progress, duration);
        info!(
            "Hashed {} files ({} cached, {} bytes read) in {:.2}s{}",
            batch.progress.files_done,
            batch.progress.cache_hits,
            batch.progress.bytes_processed,
            duration,
            if batch.cancelled { ", cancelled" } else { "" }
        );
        batch
    }

    /// Group files by content. Only sizes shared by more than one file are
    /// hashed; only groups with more than one member are returned. Empty files
    /// are ignored.
    pub fn find_duplicates(
        &self,
        paths: &[PathBuf],
        algorithm: HashAlgorithm,
        reporter: &dyn ProgressReporter,
    ) -> DuplicateReport {
        let size_to_files: DashMap<u64, Vec<PathBuf>> = DashMap::new();
        let mut report = DuplicateReport::default();
        let stat_errors: Mutex<Vec<(PathBuf, String)>> = Mutex::new(Vec::new());

        self.pool.install(|| {
            paths.par_iter().for_each(|path| match fs::metadata(path) {
                Ok(m) if m.is_file() && m.len() > 0 => {
                    size_to_files.entry(m.len()).or_default().push(path.clone());
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Error reading metadata for '{}': {}", path.display(), e);
                    stat_errors
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push((path.clone(), e.to_string()));
                }
            })
        });
        report
            .errors
            .extend(stat_errors.into_inner().unwrap_or_else(|e| e.into_inner()));

        let mut candidates: Vec<PathBuf> = size_to_files
            .iter()
            .filter(|entry| entry.value().len() > 1)
            .flat_map(|entry| entry.value().clone())
            .collect();
        candidates.sort();
        debug!(
            "{} of {} files share a size with another file",
            candidates.len(),
            paths.len()
        );

        let batch = self.checksums(&candidates, algorithm, reporter);
        report.errors.extend(batch.errors);
        report.cancelled = batch.cancelled;

        let by_content: DashMap<(u64, String), Vec<PathBuf>> = DashMap::new();
        for hash in batch.results {
            by_content
                .entry((hash.entry.source_size, hash.entry.value))
                .or_default()
                .push(hash.path);
        }

        report.groups = by_content
            .into_iter()
            .filter(|(_, paths)| paths.len() > 1)
            .map(|((size, hash), mut paths)| {
                paths.sort();
                DuplicateGroup { hash, size, paths }
            })
            .collect();
        report.groups.sort_by(|a, b| {
            b.wasted_bytes()
                .cmp(&a.wasted_bytes())
                .then_with(|| a.paths.cmp(&b.paths))
        });
        report
    }

    /// Compare two folder trees file-by-file using relative paths. Files
    /// present on both sides with different sizes are mismatches without
    /// being hashed.
    pub fn compare_folders(
        &self,
        left: &Path,
        right: &Path,
        algorithm: HashAlgorithm,
        ignore_patterns: &[String],
        reporter: &dyn ProgressReporter,
    ) -> Result<FolderComparison, Error> {
        let left = paths::normalize_path(left);
        let right = paths::normalize_path(right);
        let left_files = relative_index(&left, ignore_patterns)?;
        let right_files = relative_index(&right, ignore_patterns)?;

        let mut comparison = FolderComparison::default();
        let mut to_hash: Vec<PathBuf> = Vec::new();
        let mut pairs: Vec<(PathBuf, PathBuf, PathBuf)> = Vec::new();

        for (rel, (left_path, left_size)) in &left_files {
            match right_files.get(rel) {
                None => comparison.only_left.push(rel.clone()),
                Some((_, right_size)) if right_size != left_size => {
                    comparison.mismatches.push(rel.clone())
                }
                Some((right_path, _)) => {
                    to_hash.push(left_path.clone());
                    to_hash.push(right_path.clone());
                    pairs.push((rel.clone(), left_path.clone(), right_path.clone()));
                }
            }
        }
        comparison.only_right = right_files
            .keys()
            .filter(|rel| !left_files.contains_key(*rel))
            .cloned()
            .collect();

        let batch = self.checksums(&to_hash, algorithm, reporter);
        comparison.errors = batch.errors;
        comparison.cancelled = batch.cancelled;
        let hashes: BTreeMap<&Path, &str> = batch
            .results
            .iter()
            .map(|h| (h.path.as_path(), h.entry.value.as_str()))
            .collect();

        for (rel, left_path, right_path) in pairs {
            match (hashes.get(left_path.as_path()), hashes.get(right_path.as_path())) {
                (Some(l), Some(r)) if l == r => comparison.matches.push(rel),
                (Some(_), Some(_)) => comparison.mismatches.push(rel),
                _ => {}
            }
        }
        comparison.mismatches.sort();
        Ok(comparison)
    }
}

fn relative_index(
    root: &Path,
    ignore_patterns: &[String],
) -> Result<BTreeMap<PathBuf, (PathBuf, u64)>, Error> {
    let entries = scanner::scan_paths(&[root.to_path_buf()], ignore_patterns, true)?;
    let index = entries
        .into_iter()
        .filter_map(|entry| {
            paths::relative_to(&entry.path, root).map(|rel| (rel, (entry.path, entry.size)))
        })
        .collect();
    Ok(index)
}
