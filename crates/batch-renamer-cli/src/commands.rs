use batch_renamer_core::HashAlgorithm;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "batch-renamer", version)]
#[command(about = "Batch rename files with composable naming rules", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the rename plan without touching any file
    Preview(SelectionArgs),
    /// Build the rename plan and apply it
    Rename {
        #[command(flatten)]
        selection: SelectionArgs,
        /// What to do when a target name is already taken
        #[arg(long, value_enum, default_value_t = ConflictPolicy::Ask)]
        on_conflict: ConflictPolicy,
        /// Do not ask for confirmation before renaming
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Undo a rename batch (the most recent one by default)
    Undo {
        batch_id: Option<i64>,
    },
    /// List recorded rename batches, or show one batch in detail
    History {
        #[arg(long, default_value_t = 20)]
        limit: i64,
        #[arg(long)]
        batch: Option<i64>,
    },
    /// Delete all recorded rename batches
    ClearHistory,
    /// Print content checksums
    Hash {
        #[command(flatten)]
        files: FileArgs,
    },
    /// Find files with identical content
    Dupes {
        #[command(flatten)]
        files: FileArgs,
    },
    /// Compare two folder trees by relative path and content
    Compare {
        left: PathBuf,
        right: PathBuf,
        #[arg(short, long)]
        algorithm: Option<HashAlgorithm>,
    },
    /// Display file cache counters and entry counts
    CacheStats,
    /// Remove every cached metadata and hash entry
    ClearCache,
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct FileArgs {
    /// Files or directories
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
    #[arg(short, long)]
    pub recursive: bool,
    /// Defaults to the configured algorithm
    #[arg(short, long)]
    pub algorithm: Option<HashAlgorithm>,
}

/// Files to rename and the transforms to apply. Transforms from `--pipeline`
/// run first, then the inline options in the order listed here.
#[derive(Debug, Args)]
pub struct SelectionArgs {
    /// Files or directories to rename
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
    #[arg(short, long)]
    pub recursive: bool,
    /// TOML file with a `[[transforms]]` list
    #[arg(short, long)]
    pub pipeline: Option<PathBuf>,
    /// Replace the whole name (extension kept)
    #[arg(long)]
    pub set_name: Option<String>,
    /// Regex replacement applied to the name
    #[arg(long, num_args = 2, value_names = ["PATTERN", "REPLACEMENT"])]
    pub replace: Option<Vec<String>>,
    #[arg(long, value_enum)]
    pub case: Option<CaseArg>,
    #[arg(long)]
    pub prefix: Option<String>,
    #[arg(long)]
    pub suffix: Option<String>,
    /// Append a running number
    #[arg(long)]
    pub counter: bool,
    #[arg(long, default_value_t = 1)]
    pub counter_start: i64,
    #[arg(long, default_value_t = 3)]
    pub counter_padding: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConflictPolicy {
    Ask,
    Skip,
    Overwrite,
    Suffix,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CaseArg {
    Lower,
    Upper,
    Title,
}
