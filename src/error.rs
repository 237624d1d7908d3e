//! Error types shared across the organization and reversal engine.
//!
//! Errors fall into two groups. Run-level errors (`ConfigError`,
//! `PreconditionError`, `HistoryError` and the wrappers built from them) are
//! returned to the caller as `Err`. Per-file problems are never returned;
//! they are recorded on the file's outcome as a [`FileErrorKind`], whose
//! `Display` output never contains a path.

use crate::organizer::OrganizationResult;
use crate::unorganize::UnorganizeResult;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("Invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },
    /// Strategy name outside the fixed `date` / `type` / `smart` table.
    #[error("Unknown organization strategy '{0}' (expected one of: date, type, smart)")]
    UnknownStrategy(String),
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// Why the safety validator refused a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    #[error("path is not absolute")]
    Relative,
    #[error("path contains a parent-directory segment")]
    Traversal,
    #[error("path exceeds the maximum length")]
    PathTooLong,
    #[error("path component exceeds the maximum length")]
    ComponentTooLong,
    #[error("file name contains a disallowed character")]
    DisallowedCharacter,
    #[error("file name is a reserved device name")]
    ReservedName,
    #[error("path is inside a protected system directory")]
    ProtectedDirectory,
    #[error("path could not be resolved")]
    Unresolvable,
}

/// Redacted reason a single file could not be processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FileErrorKind {
    #[error("source file missing")]
    SourceMissing,
    #[error("metadata unavailable")]
    MetadataUnavailable,
    #[error("unsafe destination: {0}")]
    UnsafeDestination(RejectionReason),
    /// Every conflict-free name probed was taken before the move landed.
    #[error("destination conflict")]
    DestinationConflict,
    /// Move failed; carries the I/O error kind name only.
    #[error("move failed: {0}")]
    MoveFailed(String),
}

impl FileErrorKind {
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::AlreadyExists => FileErrorKind::DestinationConflict,
            kind => FileErrorKind::MoveFailed(format!("{:?}", kind)),
        }
    }
}

/// Failure reported by a metadata provider for one file.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata source unreadable: {0}")]
    Unreadable(#[from] io::Error),
    #[error("{0}")]
    Other(String),
}

/// Whole-run failures detected before any file is moved.
#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("source directory does not exist or is not a directory: {}", .0.display())]
    SourceMissing(PathBuf),
    #[error("source directory is not readable: {}: {source}", .path.display())]
    SourceUnreadable { path: PathBuf, source: io::Error },
    #[error("destination directory does not exist or is not a directory: {}", .0.display())]
    DestinationMissing(PathBuf),
    #[error("destination directory is not writable: {}: {source}", .path.display())]
    DestinationNotWritable { path: PathBuf, source: io::Error },
    #[error("destination directory rejected: {0}")]
    DestinationRejected(RejectionReason),
    #[error("insufficient space at destination: {required} bytes required, {available} available")]
    InsufficientSpace { required: u64, available: u64 },
    #[error("could not determine free space at destination: {0}")]
    DiskSpaceUnavailable(#[source] io::Error),
}

/// Errors raised by the operation history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Failed to read history file {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("Failed to write history file {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("Failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Invalid history file format: {0}")]
    InvalidFormat(String),
    #[error("No operation with id {0}")]
    NotFound(String),
}

/// Errors surfaced by [`crate::organizer::Organizer::run`].
#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Precondition failed: {0}")]
    Precondition(#[from] PreconditionError),
    /// Files were moved but the run could not be recorded, so it has no undo
    /// path. The finished result is carried so the caller can still report it.
    #[error("Organization finished but history could not be saved: {source}")]
    History {
        result: Box<OrganizationResult>,
        source: HistoryError,
    },
}

/// Errors surfaced by [`crate::unorganize::UnorganizeEngine`].
#[derive(Debug, Error)]
pub enum UnorganizeError {
    #[error("No previous organization found to undo")]
    NoHistory,
    #[error("No operation with id {0}")]
    NotFound(String),
    #[error("Invalid target directory {}: {reason}", .path.display())]
    InvalidTarget { path: PathBuf, reason: String },
    #[error("Unorganize finished but history could not be updated: {source}")]
    History {
        result: Box<UnorganizeResult>,
        source: HistoryError,
    },
}

/// Errors raised while wiring the engine from configuration.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("Failed to start worker thread: {0}")]
    Worker(#[source] io::Error),
}

/// Failure of a request handled by the engine service.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Organize(#[from] OrganizeError),
    #[error(transparent)]
    Unorganize(#[from] UnorganizeError),
}
