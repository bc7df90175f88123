mod commands;
mod logging;
mod pipeline;
mod progress;
mod prompt;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use batch_renamer_core::rename::PlanStatus;
use batch_renamer_core::{
    scanner, AppConfig, ConflictDecision, ConflictResolver, HashAlgorithm, ItemOutcome,
    ParallelHashWorker, PersistentCacheStore, RenameEngine, RenameHistoryStore, RenamePlan,
};
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands, ConflictPolicy, FileArgs, SelectionArgs};
use dotenv::dotenv;
use progress::CliReporter;
use prompt::{prompt_confirm, TerminalPrompt};
use tracing::{error, info};

struct Services {
    engine: RenameEngine,
    worker: Arc<ParallelHashWorker>,
}

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match batch_renamer_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let Some(command) = args.command else {
        let _ = Cli::command().print_long_help();
        return;
    };

    if let Err(err) = run(command, &config) {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn open_services(config: &AppConfig) -> Result<Services> {
    let cache = Arc::new(PersistentCacheStore::open(
        &config.cache_db_path,
        config.cache_capacity,
    ));
    let history = Arc::new(
        RenameHistoryStore::open(&config.history_db_path)
            .with_context(|| format!("Failed to open history at {}", config.history_db_path))?,
    );
    let worker = Arc::new(ParallelHashWorker::new(Arc::clone(&cache), config)?);
    let engine = RenameEngine::new(cache, history, config).with_hash_worker(Arc::clone(&worker));
    Ok(Services { engine, worker })
}

fn run(command: Commands, config: &AppConfig) -> Result<()> {
    if let Commands::PrintConfig = command {
        println!("Configuration: {:#?}", config);
        return Ok(());
    }

    let services = open_services(config)?;
    match command {
        Commands::Preview(selection) => run_preview(&services, config, &selection),
        Commands::Rename {
            selection,
            on_conflict,
            yes,
        } => run_rename(&services, config, &selection, on_conflict, yes),
        Commands::Undo { batch_id } => run_undo(&services, batch_id),
        Commands::History { limit, batch } => match batch {
            Some(batch_id) => show_batch(&services, batch_id),
            None => list_history(&services, limit),
        },
        Commands::ClearHistory => {
            if prompt_confirm("Delete all recorded rename batches?", Some(false))? {
                services.engine.history().clear()?;
                info!("Rename history cleared");
            }
            Ok(())
        }
        Commands::Hash { files } => run_hash(&services, config, &files),
        Commands::Dupes { files } => run_dupes(&services, config, &files),
        Commands::Compare {
            left,
            right,
            algorithm,
        } => run_compare(
            &services,
            config,
            &left,
            &right,
            algorithm.unwrap_or(config.hash_algorithm),
        ),
        Commands::CacheStats => {
            print_cache_stats(&services);
            Ok(())
        }
        Commands::ClearCache => {
            services.engine.cache().clear();
            info!("File cache cleared");
            Ok(())
        }
        Commands::PrintConfig => Ok(()),
    }
}

fn collect_files(
    config: &AppConfig,
    paths: &[PathBuf],
    recursive: bool,
) -> Result<Vec<batch_renamer_core::FileEntry>> {
    let files = scanner::scan_paths(paths, &config.ignore_patterns, recursive)
        .context("Failed to scan input paths")?;
    if files.is_empty() {
        bail!("No files found under the given paths");
    }
    info!("{} files selected", files.len());
    Ok(files)
}

fn build_plan(services: &Services, config: &AppConfig, selection: &SelectionArgs) -> Result<RenamePlan> {
    let pipeline = pipeline::build_pipeline(selection)?;
    let files = collect_files(config, &selection.paths, selection.recursive)?;
    let plan = services.engine.build_preview(&files, &pipeline)?;
    Ok(plan)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_plan(plan: &RenamePlan) {
    for (index, entry) in plan.entries().iter().enumerate() {
        let label = match &entry.status {
            PlanStatus::Ready => entry.status.label().green(),
            PlanStatus::Unchanged => entry.status.label().dimmed(),
            PlanStatus::FilesystemConflict => entry.status.label().yellow(),
            PlanStatus::Invalid(_) | PlanStatus::BatchConflict { .. } => entry.status.label().red(),
        };
        let detail = match &entry.status {
            PlanStatus::Invalid(reason) => format!("  ({})", reason),
            PlanStatus::BatchConflict { others } => format!(
                "  (also: {})",
                others
                    .iter()
                    .map(|i| (i + 1).to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            _ => String::new(),
        };
        println!(
            "{:>4}  {:<18} {} -> {}{}",
            index + 1,
            label,
            file_name(&entry.source),
            file_name(&entry.target).bold(),
            detail
        );
    }

    println!();
    println!(
        "{} ready, {} unchanged, {} existing targets, {} invalid, {} duplicate targets",
        plan.count(|s| *s == PlanStatus::Ready),
        plan.count(|s| *s == PlanStatus::Unchanged),
        plan.count(|s| *s == PlanStatus::FilesystemConflict),
        plan.count(|s| matches!(s, PlanStatus::Invalid(_))),
        plan.count(|s| matches!(s, PlanStatus::BatchConflict { .. })),
    );
}

fn run_preview(services: &Services, config: &AppConfig, selection: &SelectionArgs) -> Result<()> {
    let plan = build_plan(services, config, selection)?;
    print_plan(&plan);
    Ok(())
}

fn run_rename(
    services: &Services,
    config: &AppConfig,
    selection: &SelectionArgs,
    on_conflict: ConflictPolicy,
    yes: bool,
) -> Result<()> {
    let plan = build_plan(services, config, selection)?;
    print_plan(&plan);

    for group in plan.batch_conflicts() {
        error!(
            "{} files would be renamed to {}",
            group.entries.len(),
            group.target.display()
        );
    }
    plan.check_batch_conflicts()?;

    let pending = plan.count(|s| matches!(s, PlanStatus::Ready | PlanStatus::FilesystemConflict));
    if pending == 0 {
        info!("Nothing to rename");
        return Ok(());
    }
    if !yes && !prompt_confirm(&format!("Rename {} files?", pending), Some(false))? {
        return Ok(());
    }

    let reporter = Arc::new(CliReporter::new());
    let mut resolver = match on_conflict {
        ConflictPolicy::Ask => ConflictResolver::new(TerminalPrompt::new(Arc::clone(&reporter))),
        ConflictPolicy::Skip => ConflictResolver::fixed(ConflictDecision::Skip),
        ConflictPolicy::Overwrite => ConflictResolver::fixed(ConflictDecision::Overwrite),
        ConflictPolicy::Suffix => ConflictResolver::fixed(ConflictDecision::RenameWithSuffix),
        ConflictPolicy::Cancel => ConflictResolver::fixed(ConflictDecision::Cancel),
    };

    let result = services
        .engine
        .execute(&plan, &mut resolver, reporter.as_ref())?;

    for item in result.items.iter().filter(|i| i.outcome.is_failure()) {
        if let ItemOutcome::Failed(reason) = &item.outcome {
            println!(
                "  {} {}: {}",
                "✗".red(),
                item.source.display(),
                reason
            );
        }
    }
    for item in result
        .items
        .iter()
        .filter(|i| i.outcome == ItemOutcome::RenamedWithSuffix)
    {
        println!(
            "  {} {} -> {}",
            "↳".yellow(),
            file_name(&item.source),
            file_name(&item.target)
        );
    }

    match result.batch_id {
        Some(batch_id) => println!(
            "Batch {} recorded; undo with `batch-renamer undo {}`",
            batch_id.to_string().cyan(),
            batch_id
        ),
        None if result.applied_count() > 0 => {
            println!("{}", "Renames applied but the batch could not be recorded".red())
        }
        None => {}
    }
    Ok(())
}

fn run_undo(services: &Services, batch_id: Option<i64>) -> Result<()> {
    let reporter = CliReporter::new();
    let result = match batch_id {
        Some(batch_id) => services.engine.undo(batch_id, &reporter)?,
        None => match services.engine.undo_last(&reporter)? {
            Some(result) => result,
            None => {
                info!("No batch left to undo");
                return Ok(());
            }
        },
    };

    for item in &result.items {
        if let batch_renamer_core::model::UndoOutcome::Failed(reason) = &item.outcome {
            println!("  {} {}: {}", "✗".red(), item.from.display(), reason);
        }
    }
    Ok(())
}

fn list_history(services: &Services, limit: i64) -> Result<()> {
    let batches = services.engine.history().list(limit)?;
    if batches.is_empty() {
        println!("No rename batches recorded");
        return Ok(());
    }
    for batch in batches {
        let state = match &batch.undone_at {
            Some(at) => format!("undone {}", at).dimmed(),
            None => batch.status.as_str().normal(),
        };
        println!(
            "{:>6}  {}  {:>5}/{:<5} {}",
            batch.batch_id.to_string().cyan(),
            batch.created_at,
            batch.applied_count,
            batch.item_count,
            state
        );
    }
    Ok(())
}

fn show_batch(services: &Services, batch_id: i64) -> Result<()> {
    let Some(operation) = services.engine.history().get(batch_id)? else {
        bail!("Rename batch {} not found", batch_id);
    };
    println!(
        "Batch {} created {} ({})",
        operation.batch_id.to_string().cyan(),
        operation.created_at,
        operation.status.as_str()
    );
    if let Some(at) = &operation.undone_at {
        println!("Undone {}", at);
    }
    for record in &operation.records {
        println!(
            "  {:<20} {} -> {}",
            record.outcome,
            record.old_path.display(),
            record.new_path.display()
        );
    }
    Ok(())
}

fn expand_files(config: &AppConfig, files: &FileArgs) -> Result<Vec<PathBuf>> {
    Ok(collect_files(config, &files.paths, files.recursive)?
        .into_iter()
        .map(|f| f.path)
        .collect())
}

fn run_hash(services: &Services, config: &AppConfig, files: &FileArgs) -> Result<()> {
    let algorithm = files.algorithm.unwrap_or(config.hash_algorithm);
    let paths = expand_files(config, files)?;
    let reporter = CliReporter::new();
    let batch = services.worker.checksums(&paths, algorithm, &reporter);

    for hash in &batch.results {
        println!("{}  {}", hash.entry.value, hash.path.display());
    }
    for (path, reason) in &batch.errors {
        println!("  {} {}: {}", "✗".red(), path.display(), reason);
    }
    if batch.cancelled {
        println!("{}", "Cancelled".yellow());
    }
    Ok(())
}

fn run_dupes(services: &Services, config: &AppConfig, files: &FileArgs) -> Result<()> {
    let algorithm = files.algorithm.unwrap_or(config.hash_algorithm);
    let paths = expand_files(config, files)?;
    let reporter = CliReporter::new();
    let report = services.worker.find_duplicates(&paths, algorithm, &reporter);

    let mut wasted = 0;
    for group in &report.groups {
        wasted += group.wasted_bytes();
        println!(
            "{} ({} bytes x {})",
            group.hash.cyan(),
            group.size,
            group.paths.len()
        );
        for path in &group.paths {
            println!("    {}", path.display());
        }
    }
    for (path, reason) in &report.errors {
        println!("  {} {}: {}", "✗".red(), path.display(), reason);
    }
    info!(
        "{} duplicate groups, {} bytes wasted",
        report.groups.len().to_string().red(),
        wasted.to_string().red()
    );
    Ok(())
}

fn run_compare(
    services: &Services,
    config: &AppConfig,
    left: &Path,
    right: &Path,
    algorithm: HashAlgorithm,
) -> Result<()> {
    let reporter = CliReporter::new();
    let comparison = services.worker.compare_folders(
        left,
        right,
        algorithm,
        &config.ignore_patterns,
        &reporter,
    )?;

    for path in &comparison.mismatches {
        println!("{} {}", "≠".red(), path.display());
    }
    for path in &comparison.only_left {
        println!("{} {}", "<".yellow(), path.display());
    }
    for path in &comparison.only_right {
        println!("{} {}", ">".yellow(), path.display());
    }
    for (path, reason) in &comparison.errors {
        println!("  {} {}: {}", "✗".red(), path.display(), reason);
    }
    info!(
        "{} identical, {} different, {} only left, {} only right",
        comparison.matches.len().to_string().green(),
        comparison.mismatches.len().to_string().red(),
        comparison.only_left.len(),
        comparison.only_right.len()
    );
    Ok(())
}

fn print_cache_stats(services: &Services) {
    let cache = services.engine.cache();
    let stats = cache.stats();
    println!(
        "Cache ({}): {} in memory, {} on disk",
        if cache.is_persistent() {
            "persistent"
        } else {
            "memory only"
        },
        stats.memory_entries,
        stats.disk_entries
    );
    println!(
        "hits {}, misses {}, stale {}, evictions {}, hit rate {:.1}%",
        stats.hits,
        stats.misses,
        stats.stale,
        stats.evictions,
        stats.hit_rate() * 100.0
    );
}
