use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("{} plan entries target '{}'", sources.len(), target.display())]
    BatchConflict {
        target: PathBuf,
        sources: Vec<PathBuf>,
    },

    #[error("Rename batch {0} not found")]
    BatchNotFound(i64),

    #[error("Rename batch {0} has already been undone")]
    AlreadyUndone(i64),

    #[error("A rename batch is already executing")]
    Busy,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Why a proposed file name cannot be used. Scoped to a single plan entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name is empty")]
    Empty,

    #[error("name '{0}' is reserved")]
    ReservedName(String),

    #[error("name contains reserved character {0:?}")]
    ReservedCharacter(char),

    #[error("name contains a control character")]
    ControlCharacter,

    #[error("name ends with a space or a dot")]
    TrailingDotOrSpace,

    #[error("name is {len} bytes, limit is {max}")]
    NameTooLong { len: usize, max: usize },

    #[error("path is {len} bytes, limit is {max}")]
    PathTooLong { len: usize, max: usize },
}

/// Classification of a failed filesystem call, recorded per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsErrorKind {
    PermissionDenied,
    InUse,
    DiskFull,
    NotFound,
    Other,
}

impl FsErrorKind {
    pub fn classify(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => return FsErrorKind::PermissionDenied,
            io::ErrorKind::NotFound => return FsErrorKind::NotFound,
            _ => {}
        }
        match err.raw_os_error() {
            // ENOSPC / EDQUOT on unix, ERROR_DISK_FULL / ERROR_HANDLE_DISK_FULL on windows
            #[cfg(unix)]
            Some(28) | Some(122) => FsErrorKind::DiskFull,
            // ETXTBSY / EBUSY
            #[cfg(unix)]
            Some(26) | Some(16) => FsErrorKind::InUse,
            #[cfg(windows)]
            Some(112) | Some(39) => FsErrorKind::DiskFull,
            // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
            #[cfg(windows)]
            Some(32) | Some(33) => FsErrorKind::InUse,
            _ => FsErrorKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FsErrorKind::PermissionDenied => "permission_denied",
            FsErrorKind::InUse => "in_use",
            FsErrorKind::DiskFull => "disk_full",
            FsErrorKind::NotFound => "not_found",
            FsErrorKind::Other => "other",
        }
    }
}

/// Failure reason attached to a single batch or undo item.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    #[error("invalid name: {0}")]
    Validation(#[from] ValidationError),

    #[error("{message}")]
    Filesystem { kind: FsErrorKind, message: String },

    #[error("'{0}' is occupied by another file")]
    TargetOccupied(PathBuf),

    #[error("'{0}' no longer exists")]
    SourceMissing(PathBuf),
}

impl ItemError {
    pub fn from_io(err: &io::Error) -> Self {
        ItemError::Filesystem {
            kind: FsErrorKind::classify(err),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_kinds() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(FsErrorKind::classify(&denied), FsErrorKind::PermissionDenied);

        let missing = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert_eq!(FsErrorKind::classify(&missing), FsErrorKind::NotFound);

        #[cfg(unix)]
        {
            let full = io::Error::from_raw_os_error(28);
            assert_eq!(FsErrorKind::classify(&full), FsErrorKind::DiskFull);
        }
    }

    #[test]
    fn test_batch_conflict_message() {
        let err = Error::BatchConflict {
            target: PathBuf::from("/tmp/b.jpg"),
            sources: vec![PathBuf::from("/tmp/a.jpg"), PathBuf::from("/tmp/c.jpg")],
        };
        assert_eq!(err.to_string(), "2 plan entries target '/tmp/b.jpg'");
    }
}
