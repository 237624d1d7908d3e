//! Bounded, persistent log of organization runs.
//!
//! The store keeps every entry in memory and writes the whole log through
//! its [`HistoryBackend`] on each mutation. A mutation whose write fails is
//! not applied, so memory and disk never disagree.

use crate::error::HistoryError;
use crate::organizer::OrganizationResult;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;
use tracing::{debug, info};

pub type HistoryResult<T> = Result<T, HistoryError>;

pub const DEFAULT_RETENTION_LIMIT: usize = 50;

/// One recorded run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationHistoryEntry {
    #[serde(flatten)]
    pub result: OrganizationResult,
    /// Set once the run has been reversed; undone entries are not reversed
    /// again.
    #[serde(default)]
    pub undone: bool,
}

impl OperationHistoryEntry {
    pub fn operation_id(&self) -> &str {
        &self.result.operation_id
    }
}

/// Where the log lives between processes.
pub trait HistoryBackend: Send {
    /// Returns the stored entries, oldest first. A backend with nothing
    /// stored yet returns an empty list.
    fn load(&self) -> HistoryResult<Vec<OperationHistoryEntry>>;
    /// Replaces the stored log.
    fn save(&self, entries: &[OperationHistoryEntry]) -> HistoryResult<()>;
}

/// Pretty-printed JSON array, replaced atomically via a sibling temp file.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(&self, source: std::io::Error) -> HistoryError {
        HistoryError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl HistoryBackend for JsonFileBackend {
    fn load(&self) -> HistoryResult<Vec<OperationHistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|source| HistoryError::Read {
            path: self.path.clone(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|e| HistoryError::InvalidFormat(e.to_string()))
    }

    fn save(&self, entries: &[OperationHistoryEntry]) -> HistoryResult<()> {
        let json = serde_json::to_string_pretty(entries)?;

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|e| self.write_error(e))?;

        let mut temp = NamedTempFile::new_in(parent).map_err(|e| self.write_error(e))?;
        temp.write_all(json.as_bytes())
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| self.write_error(e))?;
        temp.persist(&self.path)
            .map_err(|e| self.write_error(e.error))?;
        Ok(())
    }
}

/// Backend that keeps the log in memory. Clones share storage, so a test
/// can keep one handle to inspect what the store saved or to make writes
/// fail.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    saved: Arc<Mutex<Vec<OperationHistoryEntry>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<OperationHistoryEntry>) -> Self {
        Self {
            saved: Arc::new(Mutex::new(entries)),
            fail_writes: Arc::default(),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn saved(&self) -> Vec<OperationHistoryEntry> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl HistoryBackend for MemoryBackend {
    fn load(&self) -> HistoryResult<Vec<OperationHistoryEntry>> {
        Ok(self.saved())
    }

    fn save(&self, entries: &[OperationHistoryEntry]) -> HistoryResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(HistoryError::Write {
                path: PathBuf::from("<memory>"),
                source: std::io::Error::other("writes disabled"),
            });
        }
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = entries.to_vec();
        Ok(())
    }
}

struct State {
    backend: Box<dyn HistoryBackend>,
    entries: Vec<OperationHistoryEntry>,
}

pub struct HistoryStore {
    state: Mutex<State>,
    session: Mutex<()>,
    retention_limit: usize,
}

/// Held for the length of an organize or unorganize run.
pub struct HistorySession<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl HistoryStore {
    /// Loads the backend's log. Entries beyond `retention_limit` are dropped
    /// from the front on the next write.
    pub fn open<B>(backend: B, retention_limit: usize) -> HistoryResult<Self>
    where
        B: HistoryBackend + 'static,
    {
        let retention_limit = retention_limit.max(1);
        let mut entries = backend.load()?;
        if entries.len() > retention_limit {
            entries.drain(..entries.len() - retention_limit);
        }
        debug!(entries = entries.len(), "history loaded");
        Ok(Self {
            state: Mutex::new(State {
                backend: Box::new(backend),
                entries,
            }),
            session: Mutex::new(()),
            retention_limit,
        })
    }

    pub fn open_file(path: impl Into<PathBuf>, retention_limit: usize) -> HistoryResult<Self> {
        Self::open(JsonFileBackend::new(path), retention_limit)
    }

    pub fn in_memory(retention_limit: usize) -> Self {
        Self {
            state: Mutex::new(State {
                backend: Box::new(MemoryBackend::new()),
                entries: Vec::new(),
            }),
            session: Mutex::new(()),
            retention_limit: retention_limit.max(1),
        }
    }

    /// Blocks until no other run holds the store.
    pub fn exclusive(&self) -> HistorySession<'_> {
        HistorySession {
            _guard: self.session.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a finished run, evicting the oldest entries past the
    /// retention limit. Returns the run's operation id.
    pub fn append(&self, result: OrganizationResult) -> HistoryResult<String> {
        let mut state = self.state();
        let id = result.operation_id.clone();

        let mut next = state.entries.clone();
        next.push(OperationHistoryEntry {
            result,
            undone: false,
        });
        let evicted = next.len().saturating_sub(self.retention_limit);
        next.drain(..evicted);

        state.backend.save(&next)?;
        state.entries = next;
        info!(operation_id = %id, evicted, "operation recorded");
        Ok(id)
    }

    pub fn get(&self, operation_id: &str) -> Option<OperationHistoryEntry> {
        self.state()
            .entries
            .iter()
            .find(|e| e.operation_id() == operation_id)
            .cloned()
    }

    /// Most recently appended entry, undone or not.
    pub fn latest(&self) -> Option<OperationHistoryEntry> {
        self.state().entries.last().cloned()
    }

    /// Entries that can still be reversed, most recent first.
    pub fn list_undoable(&self) -> Vec<OperationHistoryEntry> {
        self.state()
            .entries
            .iter()
            .rev()
            .filter(|e| !e.undone)
            .cloned()
            .collect()
    }

    /// Flags an entry as reversed. Marking an already undone entry is a
    /// no-op and does not write.
    pub fn mark_undone(&self, operation_id: &str) -> HistoryResult<()> {
        let mut state = self.state();
        let index = state
            .entries
            .iter()
            .position(|e| e.operation_id() == operation_id)
            .ok_or_else(|| HistoryError::NotFound(operation_id.to_string()))?;
        if state.entries[index].undone {
            return Ok(());
        }

        let mut next = state.entries.clone();
        next[index].undone = true;
        state.backend.save(&next)?;
        state.entries = next;
        Ok(())
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Vec<OperationHistoryEntry> {
        self.state().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn retention_limit(&self) -> usize {
        self.retention_limit
    }
}
