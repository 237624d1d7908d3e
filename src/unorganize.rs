//! Reversal of recorded organize runs.
//!
//! Three modes:
//! - **Flatten** moves every organized file straight into a target folder.
//! - **Restore** puts each file back at its original path, falling back to
//!   flatten for a file whose original folder is gone or whose original
//!   path is occupied.
//! - **Selective** flattens only the chosen files.
//!
//! Files are only ever moved, never deleted. Folders that held reversed
//! files are pruned afterwards if that left them empty.

use crate::config::Config;
use crate::conflict::ConflictResolver;
use crate::error::{FileErrorKind, UnorganizeError};
use crate::events::{Event, EventBus};
use crate::file_mover::{FileMover, FsFileMover, place_file};
use crate::history::{HistoryStore, OperationHistoryEntry};
use crate::logging::sanitize_path;
use crate::organizer::{CancellationToken, FileOperationRecord};
use crate::safety::PathSafetyValidator;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type UnorganizeOutcome = Result<UnorganizeResult, UnorganizeError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "paths", rename_all = "snake_case")]
pub enum UnorganizeMode {
    Flatten,
    Restore,
    /// Files to reverse, named by their original or organized path.
    Selective(Vec<PathBuf>),
}

impl UnorganizeMode {
    pub fn name(&self) -> &'static str {
        match self {
            UnorganizeMode::Flatten => "flatten",
            UnorganizeMode::Restore => "restore",
            UnorganizeMode::Selective(_) => "selective",
        }
    }
}

/// Which recorded run to reverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationSelector {
    /// The most recent run, whether or not it was already undone.
    Latest,
    Id(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The file was never moved by the run.
    OriginallyFailed,
    /// The organized file is no longer where the run put it.
    MissingAtDestination,
    /// Left out of a selective reversal.
    NotSelected,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::OriginallyFailed => "failed during organization",
            SkipReason::MissingAtDestination => "no longer at its organized location",
            SkipReason::NotSelected => "not selected",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReversedFile {
    pub from: PathBuf,
    pub to: PathBuf,
    /// Restore could not use the original path and flattened instead.
    pub fell_back: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: FileErrorKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnorganizeResult {
    pub operation_id: String,
    /// The organize run being reversed.
    pub source_operation_id: String,
    pub mode: UnorganizeMode,
    pub target_dir: PathBuf,
    pub reversed: Vec<ReversedFile>,
    pub skipped: Vec<SkippedFile>,
    pub failed: Vec<FailedFile>,
    /// The run had already been reversed; nothing was touched.
    pub already_undone: bool,
    pub cancelled: bool,
}

impl UnorganizeResult {
    fn new(source_operation_id: &str, mode: UnorganizeMode, target_dir: PathBuf) -> Self {
        Self {
            operation_id: format!("unorganize_{}", Uuid::new_v4()),
            source_operation_id: source_operation_id.to_string(),
            mode,
            target_dir,
            reversed: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            already_undone: false,
            cancelled: false,
        }
    }

    pub fn reversed_count(&self) -> usize {
        self.reversed.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn fell_back_count(&self) -> usize {
        self.reversed.iter().filter(|r| r.fell_back).count()
    }
}

enum Reversal {
    Moved(ReversedFile),
    Skipped(SkipReason),
    Failed(FileErrorKind),
}

pub struct UnorganizeEngine {
    history: Arc<HistoryStore>,
    bus: Arc<EventBus>,
    mover: Box<dyn FileMover>,
    validator: PathSafetyValidator,
    resolver: ConflictResolver,
    prune_empty_dirs: bool,
}

impl UnorganizeEngine {
    pub fn new(history: Arc<HistoryStore>, bus: Arc<EventBus>) -> Self {
        Self {
            history,
            bus,
            mover: Box::new(FsFileMover::new()),
            validator: PathSafetyValidator::default(),
            resolver: ConflictResolver::new(),
            prune_empty_dirs: true,
        }
    }

    pub fn from_config(config: &Config, history: Arc<HistoryStore>, bus: Arc<EventBus>) -> Self {
        Self::new(history, bus)
            .with_validator(PathSafetyValidator::from_config(&config.safety))
            .with_prune_empty_dirs(config.unorganize.prune_empty_dirs)
    }

    pub fn with_file_mover(mut self, mover: impl FileMover + 'static) -> Self {
        self.mover = Box::new(mover);
        self
    }

    pub fn with_validator(mut self, validator: PathSafetyValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_prune_empty_dirs(mut self, prune: bool) -> Self {
        self.prune_empty_dirs = prune;
        self
    }

    pub fn unorganize_latest(&self, target: &Path, mode: UnorganizeMode) -> UnorganizeOutcome {
        self.unorganize(&OperationSelector::Latest, target, mode, &CancellationToken::new())
    }

    pub fn unorganize_latest_with_cancel(
        &self,
        target: &Path,
        mode: UnorganizeMode,
        cancel: &CancellationToken,
    ) -> UnorganizeOutcome {
        self.unorganize(&OperationSelector::Latest, target, mode, cancel)
    }

    pub fn unorganize_by_operation_id(
        &self,
        operation_id: &str,
        target: &Path,
        mode: UnorganizeMode,
    ) -> UnorganizeOutcome {
        self.unorganize(
            &OperationSelector::Id(operation_id.to_string()),
            target,
            mode,
            &CancellationToken::new(),
        )
    }

    pub fn unorganize_by_operation_id_with_cancel(
        &self,
        operation_id: &str,
        target: &Path,
        mode: UnorganizeMode,
        cancel: &CancellationToken,
    ) -> UnorganizeOutcome {
        self.unorganize(
            &OperationSelector::Id(operation_id.to_string()),
            target,
            mode,
            cancel,
        )
    }

    pub fn unorganize(
        &self,
        selector: &OperationSelector,
        target: &Path,
        mode: UnorganizeMode,
        cancel: &CancellationToken,
    ) -> UnorganizeOutcome {
        let _session = self.history.exclusive();

        let entry = match selector {
            OperationSelector::Latest => self.history.latest().ok_or(UnorganizeError::NoHistory)?,
            OperationSelector::Id(id) => self
                .history
                .get(id)
                .ok_or_else(|| UnorganizeError::NotFound(id.clone()))?,
        };
        let target = std::path::absolute(target).unwrap_or_else(|_| target.to_path_buf());
        let mut result = UnorganizeResult::new(entry.operation_id(), mode.clone(), target.clone());

        if entry.undone {
            info!(operation_id = entry.operation_id(), "operation already undone; nothing to do");
            result.already_undone = true;
            return Ok(result);
        }
        self.prepare_target(&target)?;

        info!(
            operation_id = %result.operation_id,
            source_operation_id = entry.operation_id(),
            mode = mode.name(),
            target = %sanitize_path(&target),
            "unorganize started"
        );
        self.bus.publish(Event::UnorganizeStarted {
            operation_id: result.operation_id.clone(),
            source_operation_id: entry.operation_id().to_string(),
            target_dir: target.clone(),
            mode: mode.name().to_string(),
        });

        let selection = selection(&entry, &mode);
        let restore = mode == UnorganizeMode::Restore;
        let total = entry.result.files.len();

        for (index, record) in entry.result.files.iter().enumerate() {
            if cancel.is_cancelled() {
                result.cancelled = true;
                info!(operation_id = %result.operation_id, processed = index, "unorganize cancelled");
                break;
            }

            let file_name = record.file_name();
            let listed_path = record
                .organized_destination_path
                .clone()
                .unwrap_or_else(|| record.original_source_path.clone());

            let outcome = if selection.as_ref().is_some_and(|s| !is_selected(record, s)) {
                Reversal::Skipped(SkipReason::NotSelected)
            } else {
                self.reverse_file(record, &target, restore)
            };

            match outcome {
                Reversal::Moved(moved) => {
                    debug!(file = %file_name, fell_back = moved.fell_back, "file reversed");
                    result.reversed.push(moved);
                }
                Reversal::Skipped(reason) => {
                    debug!(file = %file_name, %reason, "file skipped");
                    let path = match reason {
                        SkipReason::OriginallyFailed => record.original_source_path.clone(),
                        _ => listed_path,
                    };
                    result.skipped.push(SkippedFile { path, reason });
                }
                Reversal::Failed(error) => {
                    warn!(file = %file_name, %error, "file not reversed");
                    self.bus.publish(Event::UnorganizeFileError {
                        operation_id: result.operation_id.clone(),
                        file_name: file_name.clone(),
                        error_kind: error.clone(),
                    });
                    result.failed.push(FailedFile {
                        path: listed_path,
                        error,
                    });
                }
            }

            self.bus.publish(Event::UnorganizeProgress {
                operation_id: result.operation_id.clone(),
                processed: index + 1,
                total,
                file_name,
            });
        }

        if self.prune_empty_dirs && !result.reversed.is_empty() {
            prune_emptied_dirs(
                result.reversed.iter().map(|file| file.from.as_path()),
                &entry.result.destination_dir,
                &target,
            );
        }

        let marked = if result.reversed.is_empty() {
            Ok(())
        } else {
            self.history.mark_undone(entry.operation_id())
        };
        if marked.is_ok() && !result.reversed.is_empty() {
            self.bus.publish(Event::HistoryUpdated {
                operation_id: entry.operation_id().to_string(),
            });
        }
        self.bus.publish(Event::UnorganizeCompleted {
            operation_id: result.operation_id.clone(),
            reversed: result.reversed_count(),
            skipped: result.skipped_count(),
            failed: result.failed_count(),
        });
        info!(
            operation_id = %result.operation_id,
            reversed = result.reversed_count(),
            skipped = result.skipped_count(),
            failed = result.failed_count(),
            "unorganize finished"
        );

        match marked {
            Ok(()) => Ok(result),
            Err(source) => Err(UnorganizeError::History {
                result: Box::new(result),
                source,
            }),
        }
    }

    fn prepare_target(&self, target: &Path) -> Result<(), UnorganizeError> {
        let invalid = |reason: String| UnorganizeError::InvalidTarget {
            path: target.to_path_buf(),
            reason,
        };

        self.validator
            .validate(target)
            .map_err(|reason| invalid(reason.to_string()))?;
        if target.exists() && !target.is_dir() {
            return Err(invalid("not a directory".to_string()));
        }
        fs::create_dir_all(target).map_err(|e| invalid(e.to_string()))
    }

    fn reverse_file(&self, record: &FileOperationRecord, target: &Path, restore: bool) -> Reversal {
        if !record.is_success() {
            return Reversal::Skipped(SkipReason::OriginallyFailed);
        }
        let Some(organized) = record.organized_destination_path.as_deref() else {
            return Reversal::Skipped(SkipReason::MissingAtDestination);
        };
        if organized.symlink_metadata().is_err() {
            return Reversal::Skipped(SkipReason::MissingAtDestination);
        }

        if restore {
            match self.restore_in_place(organized, &record.original_source_path) {
                Some(Ok(())) => {
                    return Reversal::Moved(ReversedFile {
                        from: organized.to_path_buf(),
                        to: record.original_source_path.clone(),
                        fell_back: false,
                    });
                }
                Some(Err(e)) => return Reversal::Failed(FileErrorKind::from_io(&e)),
                None => debug!(file = %record.file_name(), "original location unavailable; flattening"),
            }
        }

        let Some(name) = organized.file_name() else {
            return Reversal::Failed(FileErrorKind::SourceMissing);
        };
        match place_file(
            self.mover.as_ref(),
            &self.resolver,
            &self.validator,
            organized,
            &target.join(name),
        ) {
            Ok(to) => Reversal::Moved(ReversedFile {
                from: organized.to_path_buf(),
                to,
                fell_back: restore,
            }),
            Err((_, error)) => Reversal::Failed(error),
        }
    }

    /// Moves a file back to its exact original path. `None` means the
    /// original location cannot take it and the caller should flatten.
    fn restore_in_place(&self, organized: &Path, original: &Path) -> Option<io::Result<()>> {
        let parent_exists = original.parent().is_some_and(Path::is_dir);
        let occupied = original.symlink_metadata().is_ok();
        if !parent_exists || occupied || self.validator.validate(original).is_err() {
            return None;
        }

        match self.mover.move_file(organized, original) {
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => None,
            other => Some(other),
        }
    }
}

/// Records chosen by a selective reversal, or `None` to take every record.
fn selection(entry: &OperationHistoryEntry, mode: &UnorganizeMode) -> Option<HashSet<PathBuf>> {
    let UnorganizeMode::Selective(paths) = mode else {
        return None;
    };
    let wanted: HashSet<PathBuf> = paths
        .iter()
        .map(|p| std::path::absolute(p).unwrap_or_else(|_| p.clone()))
        .collect();

    let matched = entry.result.files.iter().any(|r| is_selected(r, &wanted));
    if !matched {
        debug!("selection matched no files; reversing the whole operation");
        return None;
    }
    Some(wanted)
}

fn is_selected(record: &FileOperationRecord, wanted: &HashSet<PathBuf>) -> bool {
    wanted.contains(&record.original_source_path)
        || record
            .organized_destination_path
            .as_ref()
            .is_some_and(|p| wanted.contains(p))
}

/// Removes the folders that held the reversed files once they are empty,
/// walking each one up towards `root`. `root` itself, anything on the way to
/// `keep`, and folders no reversed file came from are left alone.
fn prune_emptied_dirs<'a>(moved_from: impl Iterator<Item = &'a Path>, root: &Path, keep: &Path) {
    let mut candidates: BTreeSet<&Path> = BTreeSet::new();
    for file in moved_from {
        let mut dir = file.parent();
        while let Some(current) = dir
            && current != root
            && current.starts_with(root)
        {
            if !candidates.insert(current) {
                break;
            }
            dir = current.parent();
        }
    }

    let mut ordered: Vec<&Path> = candidates.into_iter().collect();
    ordered.sort_by_key(|dir| std::cmp::Reverse(dir.components().count()));

    for dir in ordered {
        if keep.starts_with(dir) {
            continue;
        }
        // Fails on non-empty directories, which is what we want.
        if fs::remove_dir(dir).is_ok() {
            debug!(dir = %dir.file_name().unwrap_or_default().to_string_lossy(), "removed empty directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organizer::OrganizationResult;
    use tempfile::TempDir;

    struct Setup {
        temp_dir: TempDir,
        history: Arc<HistoryStore>,
        bus: Arc<EventBus>,
    }

    impl Setup {
        fn new() -> Self {
            Self {
                temp_dir: TempDir::new().expect("Failed to create temp directory"),
                history: Arc::new(HistoryStore::in_memory(50)),
                bus: Arc::new(EventBus::new()),
            }
        }

        fn path(&self, relative: &str) -> PathBuf {
            self.temp_dir.path().join(relative)
        }

        fn engine(&self) -> UnorganizeEngine {
            UnorganizeEngine::new(Arc::clone(&self.history), Arc::clone(&self.bus))
        }

        /// Records a run whose files already sit at their organized paths.
        fn record_run(&self, moves: &[(&str, &str)], failed: &[&str]) -> String {
            let mut result = OrganizationResult::new("type", self.path("src"), self.path("dst"));
            fs::create_dir_all(self.path("src")).unwrap();
            for (original, organized) in moves {
                let organized = self.path(organized);
                fs::create_dir_all(organized.parent().unwrap()).unwrap();
                fs::write(&organized, original.as_bytes()).unwrap();
                result.record(FileOperationRecord::succeeded(self.path(original), organized));
            }
            for original in failed {
                fs::write(self.path(original), b"stayed").unwrap();
                result.record(FileOperationRecord::failed(
                    self.path(original),
                    None,
                    FileErrorKind::MetadataUnavailable,
                ));
            }
            result.finish(false);
            self.history.append(result).unwrap()
        }
    }

    #[test]
    fn test_flatten_dedups_names_and_prunes() {
        let s = Setup::new();
        s.record_run(
            &[
                ("src/a.jpg", "dst/Images/a.jpg"),
                ("src/sub/a.jpg", "dst/Photos/2020/01/a.jpg"),
            ],
            &[],
        );

        let result = s
            .engine()
            .unorganize_latest(&s.path("flat"), UnorganizeMode::Flatten)
            .expect("flatten");
        assert_eq!(result.reversed_count(), 2);
        assert!(s.path("flat/a.jpg").exists());
        assert!(s.path("flat/a_1.jpg").exists());
        assert!(s.path("dst").exists());
        assert!(!s.path("dst/Images").exists());
        assert!(!s.path("dst/Photos").exists());
        assert!(s.history.latest().unwrap().undone);
    }

    #[test]
    fn test_prune_leaves_untouched_empty_dirs() {
        let s = Setup::new();
        fs::create_dir_all(s.path("dst/MyEmptyProjectFolder")).unwrap();
        fs::create_dir_all(s.path("dst/Taxes/2025")).unwrap();
        fs::create_dir_all(s.path("dst/Images/Albums")).unwrap();
        s.record_run(&[("src/a.jpg", "dst/Images/a.jpg")], &[]);

        s.engine()
            .unorganize_latest(&s.path("flat"), UnorganizeMode::Flatten)
            .expect("flatten");

        assert!(s.path("flat/a.jpg").exists());
        assert!(s.path("dst/MyEmptyProjectFolder").is_dir());
        assert!(s.path("dst/Taxes/2025").is_dir());
        // Still holds an empty subfolder, so it is not empty itself.
        assert!(s.path("dst/Images/Albums").is_dir());
    }

    #[test]
    fn test_prune_stops_at_destination_root() {
        let s = Setup::new();
        s.record_run(&[("src/a.txt", "dst/Documents/2024/a.txt")], &[]);
        let target = s.path("dst/Documents/flat");

        s.engine()
            .unorganize_latest(&target, UnorganizeMode::Flatten)
            .expect("flatten");

        assert!(target.join("a.txt").exists());
        assert!(!s.path("dst/Documents/2024").exists());
        assert!(s.path("dst").is_dir());
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let s = Setup::new();
        s.record_run(&[("src/a.txt", "dst/Documents/a.txt")], &[]);
        let engine = s.engine();

        engine
            .unorganize_latest(&s.path("flat"), UnorganizeMode::Flatten)
            .unwrap();
        let again = engine
            .unorganize_latest(&s.path("flat"), UnorganizeMode::Flatten)
            .unwrap();
        assert!(again.already_undone);
        assert_eq!(again.reversed_count(), 0);
        assert!(s.path("flat/a.txt").exists());
    }

    #[test]
    fn test_restore_with_fallbacks() {
        let s = Setup::new();
        s.record_run(
            &[
                ("src/back.txt", "dst/Documents/back.txt"),
                ("src/gone_dir/orphan.txt", "dst/Documents/orphan.txt"),
                ("src/taken.txt", "dst/Documents/taken.txt"),
            ],
            &[],
        );
        fs::write(s.path("src/taken.txt"), b"newcomer").unwrap();

        let result = s
            .engine()
            .unorganize_latest(&s.path("fallback"), UnorganizeMode::Restore)
            .unwrap();

        assert_eq!(result.reversed_count(), 3);
        assert_eq!(result.fell_back_count(), 2);
        assert_eq!(fs::read(s.path("src/back.txt")).unwrap(), b"src/back.txt");
        assert!(s.path("fallback/orphan.txt").exists());
        assert!(s.path("fallback/taken.txt").exists());
        assert_eq!(fs::read(s.path("src/taken.txt")).unwrap(), b"newcomer");
    }

    #[test]
    fn test_skips_failed_and_missing_records() {
        let s = Setup::new();
        s.record_run(
            &[
                ("src/a.txt", "dst/Documents/a.txt"),
                ("src/b.txt", "dst/Documents/b.txt"),
            ],
            &["src/c.txt"],
        );
        fs::remove_file(s.path("dst/Documents/b.txt")).unwrap();

        let result = s
            .engine()
            .unorganize_latest(&s.path("flat"), UnorganizeMode::Flatten)
            .unwrap();
        assert_eq!(result.reversed_count(), 1);
        let reasons: Vec<SkipReason> = result.skipped.iter().map(|k| k.reason).collect();
        assert_eq!(
            reasons,
            vec![SkipReason::MissingAtDestination, SkipReason::OriginallyFailed]
        );
        assert_eq!(fs::read(s.path("src/c.txt")).unwrap(), b"stayed");
    }

    #[test]
    fn test_nothing_reversed_keeps_entry_undoable() {
        let s = Setup::new();
        let id = s.record_run(&[("src/a.txt", "dst/Documents/a.txt")], &[]);
        fs::remove_file(s.path("dst/Documents/a.txt")).unwrap();

        let result = s
            .engine()
            .unorganize_by_operation_id(&id, &s.path("flat"), UnorganizeMode::Flatten)
            .unwrap();
        assert_eq!(result.reversed_count(), 0);
        assert!(!s.history.get(&id).unwrap().undone);
    }

    #[test]
    fn test_selective_by_either_path() {
        let s = Setup::new();
        s.record_run(
            &[
                ("src/a.txt", "dst/Documents/a.txt"),
                ("src/b.txt", "dst/Documents/b.txt"),
                ("src/c.txt", "dst/Documents/c.txt"),
            ],
            &[],
        );

        let mode = UnorganizeMode::Selective(vec![s.path("src/a.txt"), s.path("dst/Documents/c.txt")]);
        let result = s.engine().unorganize_latest(&s.path("pick"), mode).unwrap();

        assert_eq!(result.reversed_count(), 2);
        assert!(s.path("pick/a.txt").exists());
        assert!(s.path("pick/c.txt").exists());
        assert!(s.path("dst/Documents/b.txt").exists());
        assert_eq!(result.skipped[0].reason, SkipReason::NotSelected);
        assert!(s.history.latest().unwrap().undone);
    }

    #[test]
    fn test_selective_without_matches_flattens_everything() {
        let s = Setup::new();
        s.record_run(
            &[
                ("src/a.txt", "dst/Documents/a.txt"),
                ("src/b.txt", "dst/Documents/b.txt"),
            ],
            &[],
        );
        let mode = UnorganizeMode::Selective(vec![s.path("src/unrelated.txt")]);
        let result = s.engine().unorganize_latest(&s.path("pick"), mode).unwrap();
        assert_eq!(result.reversed_count(), 2);
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn test_lookup_errors() {
        let s = Setup::new();
        let engine = s.engine();
        assert!(matches!(
            engine.unorganize_latest(&s.path("t"), UnorganizeMode::Flatten),
            Err(UnorganizeError::NoHistory)
        ));
        assert!(matches!(
            engine.unorganize_by_operation_id("organize_nope", &s.path("t"), UnorganizeMode::Flatten),
            Err(UnorganizeError::NotFound(id)) if id == "organize_nope"
        ));
    }

    #[test]
    fn test_invalid_target() {
        let s = Setup::new();
        s.record_run(&[("src/a.txt", "dst/Documents/a.txt")], &[]);
        fs::write(s.path("file_target"), b"x").unwrap();

        let engine = s.engine();
        assert!(matches!(
            engine.unorganize_latest(&s.path("file_target"), UnorganizeMode::Flatten),
            Err(UnorganizeError::InvalidTarget { .. })
        ));
        assert!(matches!(
            engine.unorganize_latest(Path::new("/etc/refile"), UnorganizeMode::Flatten),
            Err(UnorganizeError::InvalidTarget { .. })
        ));
        assert!(s.path("dst/Documents/a.txt").exists());
    }

    #[test]
    fn test_mode_serialization() {
        let json = serde_json::to_string(&UnorganizeMode::Selective(vec![PathBuf::from("/a")]))
            .unwrap();
        assert_eq!(json, r#"{"mode":"selective","paths":["/a"]}"#);
        assert_eq!(
            serde_json::to_string(&UnorganizeMode::Restore).unwrap(),
            r#"{"mode":"restore"}"#
        );
    }
}
