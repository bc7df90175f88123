pub mod cache;
pub mod config;
pub mod error;
pub mod hasher;
pub mod metadata;
pub mod model;
pub mod paths;
pub mod progress;
pub mod rename;
pub mod scanner;
pub mod storage;

pub use cache::{CacheStats, PersistentCacheStore};
pub use config::AppConfig;
pub use error::{Error, FsErrorKind, ItemError, ValidationError};
pub use hasher::ParallelHashWorker;
pub use metadata::{FsMetadataReader, MetadataReader};
pub use model::{
    BatchResult, BatchStatus, ConflictDecision, FileEntry, HashAlgorithm, ItemOutcome, UndoResult,
};
pub use progress::{HashProgress, ProgressReporter, RenameProgress, SilentReporter};
pub use rename::{ConflictResolver, Pipeline, RenameEngine, RenamePlan};
pub use storage::RenameHistoryStore;
