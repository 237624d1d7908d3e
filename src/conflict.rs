//! Collision-free destination naming.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Picks a free name next to the desired one: `photo.jpg`, `photo_1.jpg`,
/// `photo_2.jpg`, ...
///
/// The check happens at plan time, so a name can still be taken before the
/// move lands. Movers must refuse to overwrite and callers re-resolve on
/// `AlreadyExists`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Returns `desired` if nothing exists there, else the first free
    /// `stem_N.suffix` in the same directory.
    pub fn resolve(&self, desired: &Path) -> PathBuf {
        self.resolve_with(desired, path_taken)
    }

    /// Like [`resolve`](Self::resolve) with a caller-supplied occupancy test.
    /// Used by dry runs to also avoid names claimed by earlier planned moves.
    pub fn resolve_with<F>(&self, desired: &Path, mut is_taken: F) -> PathBuf
    where
        F: FnMut(&Path) -> bool,
    {
        if !is_taken(desired) {
            return desired.to_path_buf();
        }

        let (stem, suffix) = split_name(desired);
        let parent = desired.parent().unwrap_or(Path::new(""));

        let mut counter: u64 = 1;
        loop {
            let mut name = stem.clone();
            name.push(format!("_{}", counter));
            name.push(&suffix);
            let candidate = parent.join(name);
            if !is_taken(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Dangling symlinks count as taken.
fn path_taken(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// Splits a file name on its last dot. A leading dot does not start a
/// suffix, so `.bashrc` has no extension. Works on the raw name, so names
/// that are not valid UTF-8 keep their bytes.
fn split_name(path: &Path) -> (OsString, OsString) {
    let stem = path.file_stem().unwrap_or_default().to_os_string();
    let suffix = match path.extension() {
        Some(ext) => {
            let mut suffix = OsString::from(".");
            suffix.push(ext);
            suffix
        }
        None => OsString::new(),
    };
    (stem, suffix)
}
