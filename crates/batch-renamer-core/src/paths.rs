use std::env;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Absolute, lexically normalized form of `path`. Cache keys and plan targets
/// all go through here so that `a/./b` and `a/b` name the same entry.
///
/// Does not touch the filesystem beyond reading the current directory, so it
/// works for paths that no longer exist (the old side of a rename).
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut result = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                result.pop();
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}

pub fn path_key(path: &Path) -> String {
    normalize_path(path).to_string_lossy().into_owned()
}

/// Key used to detect two targets naming the same file. Folds case on
/// platforms whose default filesystems are case-insensitive.
pub fn collision_key(path: &Path) -> String {
    let key = path.to_string_lossy();
    if cfg!(any(target_os = "windows", target_os = "macos")) {
        key.to_lowercase()
    } else {
        key.into_owned()
    }
}

pub fn modified_nanos(metadata: &fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// Current mtime of `path`, or `None` when it cannot be read.
pub fn current_mtime(path: &Path) -> Option<i64> {
    fs::metadata(path).ok().map(|m| modified_nanos(&m))
}

/// Whether `a` and `b` name the same directory entry on disk, e.g. a
/// case-only rename on a case-insensitive filesystem. Symlinks are not
/// followed: a link pointing at `a` is a different entry.
pub fn is_same_file(a: &Path, b: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        match (fs::symlink_metadata(a), fs::symlink_metadata(b)) {
            (Ok(ma), Ok(mb)) => ma.dev() == mb.dev() && ma.ino() == mb.ino(),
            _ => false,
        }
    }
    #[cfg(not(unix))]
    {
        let is_link = |p: &Path| {
            fs::symlink_metadata(p)
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false)
        };
        if is_link(a) != is_link(b) {
            return false;
        }
        match (fs::canonicalize(a), fs::canonicalize(b)) {
            (Ok(ca), Ok(cb)) => ca == cb,
            _ => false,
        }
    }
}

/// Path relative to `root`, used to pair files across two folder trees.
pub fn relative_to(path: &Path, root: &Path) -> Option<PathBuf> {
    path.strip_prefix(root).ok().map(|p| p.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_dots() {
        let base = if cfg!(windows) { "C:\\data" } else { "/data" };
        let path = Path::new(base).join("a").join(".").join("b").join("..").join("c.txt");
        assert_eq!(normalize_path(&path), Path::new(base).join("a").join("c.txt"));
    }

    #[test]
    fn test_normalize_makes_relative_absolute() {
        let normalized = normalize_path(Path::new("some/file.txt"));
        assert!(normalized.is_absolute());
        assert!(normalized.ends_with("some/file.txt"));
    }

    #[test]
    fn test_same_file_detection() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();
        assert!(is_same_file(&a, &a));
        assert!(!is_same_file(&a, &b));
        assert!(!is_same_file(&a, &dir.path().join("missing")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_to_file_is_not_the_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let link = dir.path().join("link.txt");
        fs::write(&a, "a").unwrap();
        std::os::unix::fs::symlink(&a, &link).unwrap();

        assert!(!is_same_file(&a, &link));
        assert!(is_same_file(&link, &link));
    }

    #[test]
    fn test_relative_to() {
        let root = Path::new("/x/left");
        assert_eq!(
            relative_to(Path::new("/x/left/sub/f.bin"), root),
            Some(PathBuf::from("sub/f.bin"))
        );
        assert_eq!(relative_to(Path::new("/y/f.bin"), root), None);
    }
}
