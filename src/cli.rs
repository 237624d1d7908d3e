//! Command-line front end.
//!
//! ```text
//! refile organize <SOURCE> <DEST> [--strategy date|type|smart] [--dry-run]
//! refile unorganize <TARGET> [--id ID] [--mode flatten|restore|selective] [--only PATH]...
//! refile history [--all]
//! ```

use crate::config::Config;
use crate::error::{OrganizeError, UnorganizeError};
use crate::events::EventBus;
use crate::history::OperationHistoryEntry;
use crate::organizer::{CancellationToken, OrganizationResult, PlannedMove};
use crate::output::{OutputFormatter, ProgressReporter};
use crate::service::Engine;
use crate::unorganize::{OperationSelector, UnorganizeMode, UnorganizeResult};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(
    name = "refile",
    version,
    about = "Organize files by date or type, and undo it later"
)]
pub struct Cli {
    /// Configuration file (default: ./.refilerc.toml, then ~/.config/refile/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Debug logging on stderr (REFILE_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Move files from SOURCE into an organized layout under DEST
    Organize {
        source: PathBuf,
        destination: PathBuf,
        /// date, type or smart (default from configuration)
        #[arg(short, long)]
        strategy: Option<String>,
        /// Show where files would go without moving anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Reverse a recorded organization
    Unorganize {
        /// Folder receiving flattened files
        target: PathBuf,
        /// Operation to reverse (default: the most recent)
        #[arg(long)]
        id: Option<String>,
        #[arg(long, value_enum, default_value_t = ModeArg::Flatten)]
        mode: ModeArg,
        /// With --mode selective: a file to reverse, by original or organized path
        #[arg(long = "only", value_name = "PATH")]
        only: Vec<PathBuf>,
    },
    /// List recorded operations
    History {
        /// Include operations that were already undone
        #[arg(long)]
        all: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Flatten,
    Restore,
    Selective,
}

impl ModeArg {
    pub fn into_mode(self, only: Vec<PathBuf>) -> UnorganizeMode {
        match self {
            ModeArg::Flatten => UnorganizeMode::Flatten,
            ModeArg::Restore => UnorganizeMode::Restore,
            ModeArg::Selective => UnorganizeMode::Selective(only),
        }
    }
}

/// Runs a parsed command line. Errors come back formatted for display.
pub fn run_cli(cli: Cli) -> Result<(), String> {
    let config = Config::load(cli.config.as_deref())
        .map_err(|e| format!("Error loading configuration: {}", e))?;
    let bus = Arc::new(EventBus::new());
    let engine = Engine::from_config(&config, Arc::clone(&bus))
        .map_err(|e| format!("Error initializing: {}", e))?;

    match cli.command {
        Command::Organize {
            source,
            destination,
            strategy,
            dry_run,
        } => {
            let strategy = strategy.unwrap_or_else(|| engine.default_strategy().to_string());
            if dry_run {
                organize_dry_run(&engine, &source, &destination, &strategy)
            } else {
                organize(&engine, bus, &source, &destination, &strategy)
            }
        }
        Command::Unorganize {
            target,
            id,
            mode,
            only,
        } => {
            if !only.is_empty() && mode != ModeArg::Selective {
                OutputFormatter::warning("--only is ignored unless --mode selective is given");
            }
            let selector = id.map_or(OperationSelector::Latest, OperationSelector::Id);
            unorganize(&engine, bus, &selector, &target, mode.into_mode(only))
        }
        Command::History { all } => {
            show_history(&engine, all);
            Ok(())
        }
    }
}

fn organize(
    engine: &Engine,
    bus: Arc<EventBus>,
    source: &Path,
    destination: &Path,
    strategy: &str,
) -> Result<(), String> {
    OutputFormatter::info(&format!(
        "Organizing {} into {} ({} strategy)",
        source.display(),
        destination.display(),
        strategy
    ));

    let reporter = ProgressReporter::attach(bus);
    let outcome = engine.organizer().run(source, destination, strategy);
    reporter.detach();

    match outcome {
        Ok(result) => {
            report_organization(&result);
            OutputFormatter::plain(&format!(
                "Run 'refile unorganize <TARGET> --id {}' to undo.",
                result.operation_id
            ));
            Ok(())
        }
        Err(OrganizeError::History { result, source }) => {
            report_organization(&result);
            Err(format!(
                "Files were moved but the history could not be saved, so this run cannot be undone: {}",
                source
            ))
        }
        Err(e) => Err(format!("Organization aborted: {}", e)),
    }
}

fn organize_dry_run(
    engine: &Engine,
    source: &Path,
    destination: &Path,
    strategy: &str,
) -> Result<(), String> {
    OutputFormatter::dry_run_notice(&format!(
        "Planning {} into {} ({} strategy)",
        source.display(),
        destination.display(),
        strategy
    ));

    let plan = engine
        .organizer()
        .preview(source, destination, strategy)
        .map_err(|e| format!("Dry run aborted: {}", e))?;
    if plan.is_empty() {
        OutputFormatter::plain("No files found to organize.");
        return Ok(());
    }

    let root = std::path::absolute(destination).unwrap_or_else(|_| destination.to_path_buf());
    let mut counts = BTreeMap::new();
    for PlannedMove {
        source: from,
        destination: to,
        error,
    } in &plan
    {
        let name = from.file_name().unwrap_or_default().to_string_lossy();
        match (to, error) {
            (Some(to), None) => {
                OutputFormatter::plain(&format!(" - {} → {}", name, relative_display(to, &root)));
                *counts.entry(top_folder(to, &root)).or_insert(0) += 1;
            }
            (_, Some(error)) => OutputFormatter::warning(&format!(" - {}: {}", name, error)),
            (None, None) => {}
        }
    }

    OutputFormatter::summary_table("Folder", &counts);
    OutputFormatter::success("Dry run complete. No files were modified.");
    Ok(())
}

fn report_organization(result: &OrganizationResult) {
    if result.cancelled {
        OutputFormatter::warning("Run was cancelled before all files were processed.");
    }
    for failed in result.failures() {
        let reason = failed
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_default();
        OutputFormatter::warning(&format!("{}: {}", failed.file_name(), reason));
    }

    let mut counts = BTreeMap::new();
    for landed in result
        .files
        .iter()
        .filter(|f| f.is_success())
        .filter_map(|f| f.organized_destination_path.as_deref())
    {
        *counts
            .entry(top_folder(landed, &result.destination_dir))
            .or_insert(0) += 1;
    }
    if !counts.is_empty() {
        OutputFormatter::summary_table("Folder", &counts);
    }

    let summary = format!(
        "Organized {} of {} files ({} failed) [{}]",
        result.succeeded, result.processed, result.failed, result.operation_id
    );
    if result.failed == 0 {
        OutputFormatter::success(&summary);
    } else {
        OutputFormatter::warning(&summary);
    }
}

fn unorganize(
    engine: &Engine,
    bus: Arc<EventBus>,
    selector: &OperationSelector,
    target: &Path,
    mode: UnorganizeMode,
) -> Result<(), String> {
    OutputFormatter::info(&format!(
        "Unorganizing into {} ({} mode)",
        target.display(),
        mode.name()
    ));

    let reporter = ProgressReporter::attach(bus);
    let outcome = engine
        .unorganizer()
        .unorganize(selector, target, mode, &CancellationToken::new());
    reporter.detach();

    match outcome {
        Ok(result) => {
            report_unorganize(&result);
            Ok(())
        }
        Err(UnorganizeError::History { result, source }) => {
            report_unorganize(&result);
            Err(format!(
                "Files were moved back but the history could not be updated: {}",
                source
            ))
        }
        Err(e) => Err(format!("Unorganize aborted: {}", e)),
    }
}

fn report_unorganize(result: &UnorganizeResult) {
    if result.already_undone {
        OutputFormatter::warning(&format!(
            "Operation {} was already undone; nothing to do.",
            result.source_operation_id
        ));
        return;
    }
    if result.cancelled {
        OutputFormatter::warning("Run was cancelled before all files were processed.");
    }

    if !result.skipped.is_empty() {
        OutputFormatter::header("Skipped");
        for skipped in &result.skipped {
            OutputFormatter::plain(&format!(
                " - {}: {}",
                file_name(&skipped.path),
                skipped.reason
            ));
        }
    }
    if !result.failed.is_empty() {
        OutputFormatter::header("Failed");
        for failed in &result.failed {
            OutputFormatter::error(&format!(" - {}: {}", file_name(&failed.path), failed.error));
        }
    }

    let restored = match result.mode {
        UnorganizeMode::Restore => result.reversed_count() - result.fell_back_count(),
        _ => 0,
    };
    let summary = format!(
        "Reversed {} files ({} restored in place, {} flattened), {} skipped, {} failed",
        result.reversed_count(),
        restored,
        result.reversed_count() - restored,
        result.skipped_count(),
        result.failed_count()
    );
    if result.failed.is_empty() {
        OutputFormatter::success(&summary);
    } else {
        OutputFormatter::warning(&summary);
    }
}

fn show_history(engine: &Engine, all: bool) {
    let entries: Vec<OperationHistoryEntry> = if all {
        engine.history().entries().into_iter().rev().collect()
    } else {
        engine.history().list_undoable()
    };

    if entries.is_empty() {
        OutputFormatter::plain("No recorded operations.");
        return;
    }

    OutputFormatter::header(if all { "ALL OPERATIONS" } else { "UNDOABLE OPERATIONS" });
    for entry in &entries {
        let run = &entry.result;
        let status = if entry.undone { " (undone)" } else { "" };
        OutputFormatter::plain(&format!(
            "{}  {}  {:<5}  {} ok / {} failed{}",
            run.operation_id,
            run.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            run.strategy_name,
            run.succeeded,
            run.failed,
            status
        ));
        OutputFormatter::plain(&format!(
            "    {} → {}",
            run.source_dir.display(),
            run.destination_dir.display()
        ));
    }
}

/// First folder below `root` that `path` sits in, e.g. `Images`.
fn top_folder(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .ok()
        .and_then(|rest| {
            let mut components = rest.components();
            let first = components.next()?;
            // A file directly under root has no folder.
            components.next()?;
            Some(first.as_os_str().to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| ".".to_string())
}

fn relative_display(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
