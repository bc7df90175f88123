//! Plan, execute and undo batch renames.

pub mod conflict;
pub mod engine;
pub mod plan;
pub mod transform;
pub mod validate;

pub use conflict::{ConflictInfo, ConflictPrompt, ConflictResolver, FileInfo, FixedPolicy, PromptResponse};
pub use engine::{EngineState, RenameEngine};
pub use plan::{BatchConflictGroup, PlanEntry, PlanStatus, RenamePlan};
pub use transform::{NameParts, NameTransform, Pipeline, TransformContext, TransformSpec};
pub use validate::{validate_file_name, validate_target, NameLimits};
