use crate::model::FileEntry;
use crate::paths;
use dashmap::DashMap;
use glob::Pattern;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::error;

/// Parallel traversal building the working set. Roots may be files or
/// directories; directories are descended when `recursive` is set, otherwise
/// only their direct children are taken. Symlinks are skipped, as is anything
/// matching an ignore glob.
pub fn scan_paths(
    roots: &[PathBuf],
    ignore_globs: &[String],
    recursive: bool,
) -> io::Result<Vec<FileEntry>> {
    let found: DashMap<PathBuf, FileEntry> = DashMap::new();

    let ignore_patterns: Vec<Pattern> = ignore_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect();

    roots.par_iter().try_for_each(|root| {
        let root = paths::normalize_path(root);
        let metadata = fs::symlink_metadata(&root).map_err(|err| {
            io::Error::new(
                err.kind(),
                format!("Error getting metadata for {}: {}", root.display(), err),
            )
        })?;
        if metadata.is_dir() {
            visit_dirs(&root, &found, &ignore_patterns, recursive)
        } else {
            if metadata.is_file() && !is_ignored(&root, &ignore_patterns) {
                found.insert(root.clone(), FileEntry::from_metadata(&root, &metadata));
            }
            Ok(())
        }
    })?;

    let mut entries: Vec<FileEntry> = found.into_iter().map(|(_, entry)| entry).collect();
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

fn is_ignored(path: &Path, ignore_patterns: &[Pattern]) -> bool {
    ignore_patterns
        .iter()
        .any(|pattern| pattern.matches_path(path))
}

fn visit_dirs(
    dir: &Path,
    found: &DashMap<PathBuf, FileEntry>,
    ignore_patterns: &[Pattern],
    recursive: bool,
) -> io::Result<()> {
    if is_ignored(dir, ignore_patterns) {
        return Ok(());
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            if err.kind() == io::ErrorKind::PermissionDenied {
                error!(
                    "Access denied reading directory {}: {}",
                    dir.display(),
                    err
                );
                return Ok(());
            } else {
                return Err(io::Error::new(
                    err.kind(),
                    format!("Error reading directory {}: {}", dir.display(), err),
                ));
            }
        }
    };

    entries.par_bridge().try_for_each(|entry_result| {
        let entry = entry_result.map_err(|err| {
            io::Error::new(
                err.kind(),
                format!(
                    "Error reading entry in directory {}: {}",
                    dir.display(),
                    err
                ),
            )
        })?;

        let path = entry.path();
        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(io::Error::new(
                    err.kind(),
                    format!(
                        "Error getting metadata for {}: {}",
                        path.display(),
                        err
                    ),
                ));
            }
        };

        if metadata.is_dir() {
            if recursive {
                visit_dirs(&path, found, ignore_patterns, recursive)?;
            }
        } else if metadata.is_file() && !is_ignored(&path, ignore_patterns) {
            found.insert(path.clone(), FileEntry::from_metadata(&path, &metadata));
        }
        Ok(())
    })?;

    Ok(())
}
