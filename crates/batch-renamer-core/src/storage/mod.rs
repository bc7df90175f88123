pub mod history;
pub mod sqlite;

pub use history::{BatchSummary, RenameHistoryStore};
pub use sqlite::{Database, Schema};
