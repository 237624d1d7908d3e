//! Source tree scanning.

use crate::config::CompiledFilters;
use crate::metadata::FileRecord;
use std::io;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Walks a source tree and snapshots every file the filters let through.
///
/// Entries are visited sorted by file name within each directory, so the
/// resulting order is stable across runs. Symlinks are never followed and
/// never collected.
#[derive(Debug, Clone)]
pub struct Scanner {
    filters: CompiledFilters,
}

impl Scanner {
    pub fn new(filters: CompiledFilters) -> Self {
        Self { filters }
    }

    /// Scans `root`, skipping the `skip` subtree if given (the destination,
    /// when it lives inside the source).
    ///
    /// # Errors
    ///
    /// Fails only when `root` itself cannot be read. Unreadable entries
    /// further down are logged and skipped.
    pub fn scan(&self, root: &Path, skip: Option<&Path>) -> io::Result<Vec<FileRecord>> {
        let include_hidden = self.filters.include_hidden();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || (skip.is_none_or(|s| entry.path() != s)
                        && (include_hidden || !is_hidden_dir(entry)))
            });

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(e
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other("source directory loop")));
                }
                Err(e) => {
                    warn!(depth = e.depth(), "skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            if !self.filters.should_include(relative) {
                debug!(file = %entry.file_name().to_string_lossy(), "filtered out");
                continue;
            }

            match FileRecord::from_path(entry.path()) {
                Ok(record) => files.push(record),
                Err(e) => warn!(
                    file = %entry.file_name().to_string_lossy(),
                    "skipping file that could not be read: {}",
                    e
                ),
            }
        }
        Ok(files)
    }
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(CompiledFilters::allow_all())
    }
}

fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name().to_string_lossy().starts_with('.')
}
