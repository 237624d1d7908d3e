//! The organize run: scan a source tree, place every file under the
//! destination according to a strategy, and record the run in history.
//!
//! A run either fails up front with a precondition error (nothing has been
//! touched) or processes every scanned file, recording per-file failures and
//! carrying on. Only a failure to record the finished run is reported as an
//! error after files have moved, and that error still carries the result.

use crate::config::Config;
use crate::conflict::ConflictResolver;
use crate::error::{ConfigError, FileErrorKind, OrganizeError, PreconditionError};
use crate::events::{Event, EventBus};
use crate::file_mover::{
    DiskSpaceChecker, FileMover, FsDiskSpaceChecker, FsFileMover, place_file,
};
use crate::history::HistoryStore;
use crate::logging::sanitize_path;
use crate::metadata::{FileRecord, FsMetadataProvider, MetadataProvider};
use crate::safety::PathSafetyValidator;
use crate::scan::Scanner;
use crate::strategy::Strategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// Free space required at the destination, relative to the bytes moved.
pub const DEFAULT_SPACE_MARGIN: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Succeeded,
    Failed,
}

/// Outcome for one file of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOperationRecord {
    pub original_source_path: PathBuf,
    /// Where the file landed, or where it was headed when the move failed.
    /// `None` if it failed before a destination was planned.
    pub organized_destination_path: Option<PathBuf>,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FileErrorKind>,
}

impl FileOperationRecord {
    pub fn succeeded(source: PathBuf, destination: PathBuf) -> Self {
        Self {
            original_source_path: source,
            organized_destination_path: Some(destination),
            status: FileStatus::Succeeded,
            error: None,
        }
    }

    pub fn failed(source: PathBuf, planned: Option<PathBuf>, error: FileErrorKind) -> Self {
        Self {
            original_source_path: source,
            organized_destination_path: planned,
            status: FileStatus::Failed,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FileStatus::Succeeded
    }

    pub fn file_name(&self) -> String {
        self.original_source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Everything known about one organize run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationResult {
    pub operation_id: String,
    pub strategy_name: String,
    pub source_dir: PathBuf,
    pub destination_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub files: Vec<FileOperationRecord>,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// The run was stopped before every scanned file was processed.
    #[serde(default)]
    pub cancelled: bool,
}

impl OrganizationResult {
    pub fn new(strategy_name: &str, source_dir: PathBuf, destination_dir: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            operation_id: format!("organize_{}", Uuid::new_v4()),
            strategy_name: strategy_name.to_string(),
            source_dir,
            destination_dir,
            started_at: now,
            finished_at: now,
            files: Vec::new(),
            processed: 0,
            succeeded: 0,
            failed: 0,
            cancelled: false,
        }
    }

    pub fn record(&mut self, record: FileOperationRecord) {
        self.processed += 1;
        if record.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.files.push(record);
    }

    pub fn finish(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
        self.finished_at = Utc::now();
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileOperationRecord> {
        self.files.iter().filter(|f| !f.is_success())
    }
}

/// One row of a dry run.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedMove {
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    /// Why the file would fail, if it would.
    pub error: Option<FileErrorKind>,
}

/// Cooperative stop signal, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Organizer {
    history: Arc<HistoryStore>,
    bus: Arc<EventBus>,
    metadata: Box<dyn MetadataProvider>,
    mover: Box<dyn FileMover>,
    space: Box<dyn DiskSpaceChecker>,
    validator: PathSafetyValidator,
    resolver: ConflictResolver,
    scanner: Scanner,
    space_margin: f64,
}

impl Organizer {
    /// Organizer with the filesystem defaults for every seam.
    pub fn new(history: Arc<HistoryStore>, bus: Arc<EventBus>) -> Self {
        Self {
            history,
            bus,
            metadata: Box::new(FsMetadataProvider::new()),
            mover: Box::new(FsFileMover::new()),
            space: Box::new(FsDiskSpaceChecker::new()),
            validator: PathSafetyValidator::default(),
            resolver: ConflictResolver::new(),
            scanner: Scanner::default(),
            space_margin: DEFAULT_SPACE_MARGIN,
        }
    }

    /// Organizer wired from configuration: filters, safety rules and margin.
    pub fn from_config(
        config: &Config,
        history: Arc<HistoryStore>,
        bus: Arc<EventBus>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(history, bus)
            .with_scanner(Scanner::new(config.compile_filters()?))
            .with_validator(PathSafetyValidator::from_config(&config.safety))
            .with_space_margin(config.organization.space_margin))
    }

    pub fn with_metadata_provider(mut self, provider: impl MetadataProvider + 'static) -> Self {
        self.metadata = Box::new(provider);
        self
    }

    pub fn with_file_mover(mut self, mover: impl FileMover + 'static) -> Self {
        self.mover = Box::new(mover);
        self
    }

    pub fn with_disk_space_checker(mut self, checker: impl DiskSpaceChecker + 'static) -> Self {
        self.space = Box::new(checker);
        self
    }

    pub fn with_validator(mut self, validator: PathSafetyValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_scanner(mut self, scanner: Scanner) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn with_space_margin(mut self, margin: f64) -> Self {
        self.space_margin = margin;
        self
    }

    pub fn run(
        &self,
        source: &Path,
        destination: &Path,
        strategy_name: &str,
    ) -> OrganizeResult<OrganizationResult> {
        self.run_with_cancel(source, destination, strategy_name, &CancellationToken::new())
    }

    pub fn run_with_cancel(
        &self,
        source: &Path,
        destination: &Path,
        strategy_name: &str,
        cancel: &CancellationToken,
    ) -> OrganizeResult<OrganizationResult> {
        let strategy = Strategy::from_name(strategy_name)?;
        let source = absolutize(source);
        let destination = absolutize(destination);
        self.check_directories(&source, &destination)?;

        let _session = self.history.exclusive();

        let files = self.scan(&source, &destination)?;
        self.check_space(&files, &destination)?;

        let mut result =
            OrganizationResult::new(strategy.name(), source.clone(), destination.clone());
        let operation_id = result.operation_id.clone();
        info!(
            operation_id = %operation_id,
            strategy = strategy.name(),
            files = files.len(),
            source = %sanitize_path(&source),
            "organization started"
        );
        self.bus.publish(Event::OrganizationStarted {
            operation_id: operation_id.clone(),
            source_dir: source.clone(),
            destination_dir: destination.clone(),
            strategy: strategy.name().to_string(),
        });

        let total = files.len();
        let mut cancelled = false;
        for file in &files {
            if cancel.is_cancelled() {
                cancelled = true;
                info!(operation_id = %operation_id, processed = result.processed, "organization cancelled");
                break;
            }

            let record = self.organize_file(file, strategy, &destination);
            let file_name = file.display_name();
            if let Some(kind) = &record.error {
                warn!(file = %file_name, error = %kind, "file not organized");
                self.bus.publish(Event::OrganizationFileError {
                    operation_id: operation_id.clone(),
                    file_name: file_name.clone(),
                    error_kind: kind.clone(),
                });
            }
            result.record(record);
            self.bus.publish(Event::OrganizationProgress {
                operation_id: operation_id.clone(),
                processed: result.processed,
                total,
                file_name,
            });
        }
        result.finish(cancelled);

        let recorded = self.history.append(result.clone());
        if recorded.is_ok() {
            self.bus.publish(Event::HistoryUpdated {
                operation_id: operation_id.clone(),
            });
        }
        self.bus.publish(Event::OrganizationCompleted {
            operation_id: operation_id.clone(),
            succeeded: result.succeeded,
            failed: result.failed,
        });
        info!(
            operation_id = %operation_id,
            succeeded = result.succeeded,
            failed = result.failed,
            "organization finished"
        );

        match recorded {
            Ok(_) => Ok(result),
            Err(source) => Err(OrganizeError::History {
                result: Box::new(result),
                source,
            }),
        }
    }

    /// Plans a run without moving anything or touching history.
    pub fn preview(
        &self,
        source: &Path,
        destination: &Path,
        strategy_name: &str,
    ) -> OrganizeResult<Vec<PlannedMove>> {
        let strategy = Strategy::from_name(strategy_name)?;
        let source = absolutize(source);
        let destination = absolutize(destination);
        self.check_directories(&source, &destination)?;

        let files = self.scan(&source, &destination)?;
        let mut claimed: HashSet<PathBuf> = HashSet::new();

        let plan = files
            .iter()
            .map(|file| {
                let metadata = match self.metadata.extract(file) {
                    Ok(metadata) => metadata,
                    Err(_) => {
                        return PlannedMove {
                            source: file.path.clone(),
                            destination: None,
                            error: Some(FileErrorKind::MetadataUnavailable),
                        };
                    }
                };
                let desired = strategy.plan(file, &metadata, &destination);
                let resolved = self.resolver.resolve_with(&desired, |p| {
                    claimed.contains(p) || p.symlink_metadata().is_ok()
                });
                let error = self
                    .validator
                    .validate(&resolved)
                    .err()
                    .map(FileErrorKind::UnsafeDestination);
                if error.is_none() {
                    claimed.insert(resolved.clone());
                }
                PlannedMove {
                    source: file.path.clone(),
                    destination: Some(resolved),
                    error,
                }
            })
            .collect();
        Ok(plan)
    }

    fn organize_file(
        &self,
        file: &FileRecord,
        strategy: Strategy,
        destination: &Path,
    ) -> FileOperationRecord {
        let metadata = match self.metadata.extract(file) {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!(file = %file.display_name(), "metadata extraction failed: {}", e);
                return FileOperationRecord::failed(
                    file.path.clone(),
                    None,
                    FileErrorKind::MetadataUnavailable,
                );
            }
        };

        let desired = strategy.plan(file, &metadata, destination);
        match place_file(
            self.mover.as_ref(),
            &self.resolver,
            &self.validator,
            &file.path,
            &desired,
        ) {
            Ok(landed) => {
                debug!(file = %file.display_name(), "organized");
                FileOperationRecord::succeeded(file.path.clone(), landed)
            }
            Err((planned, kind)) => {
                FileOperationRecord::failed(file.path.clone(), Some(planned), kind)
            }
        }
    }

    fn check_directories(&self, source: &Path, destination: &Path) -> Result<(), PreconditionError> {
        if !source.is_dir() {
            return Err(PreconditionError::SourceMissing(source.to_path_buf()));
        }
        fs::read_dir(source).map_err(|e| PreconditionError::SourceUnreadable {
            path: source.to_path_buf(),
            source: e,
        })?;

        if !destination.is_dir() {
            return Err(PreconditionError::DestinationMissing(destination.to_path_buf()));
        }
        self.validator
            .validate(destination)
            .map_err(PreconditionError::DestinationRejected)?;
        tempfile::tempfile_in(destination).map_err(|e| {
            PreconditionError::DestinationNotWritable {
                path: destination.to_path_buf(),
                source: e,
            }
        })?;
        Ok(())
    }

    fn scan(&self, source: &Path, destination: &Path) -> Result<Vec<FileRecord>, PreconditionError> {
        // A destination nested in the source must not be organized into itself.
        let skip = (destination != source && destination.starts_with(source)).then_some(destination);
        self.scanner
            .scan(source, skip)
            .map_err(|e| PreconditionError::SourceUnreadable {
                path: source.to_path_buf(),
                source: e,
            })
    }

    fn check_space(&self, files: &[FileRecord], destination: &Path) -> Result<(), PreconditionError> {
        let total: u64 = files.iter().map(|f| f.size).sum();
        let required = (total as f64 * self.space_margin).ceil() as u64;
        let available = self
            .space
            .free_bytes(destination)
            .map_err(PreconditionError::DiskSpaceUnavailable)?;

        if available < required {
            warn!(required, available, "not enough free space at destination");
            return Err(PreconditionError::InsufficientSpace {
                required,
                available,
            });
        }
        Ok(())
    }
}

fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
