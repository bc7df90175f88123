pub mod digest;
pub mod worker;

pub use worker::{
    DuplicateGroup, DuplicateReport, FileHash, FolderComparison, HashBatch, ParallelHashWorker,
};
