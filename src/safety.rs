//! Destination path validation.
//!
//! Every path the engine is about to write to goes through
//! [`PathSafetyValidator::validate`] first. The validator is fail-closed: if
//! a path cannot be resolved it is rejected.

use crate::config::SafetySettings;
use crate::error::RejectionReason;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_MAX_PATH_LENGTH: usize = 4096;
pub const DEFAULT_MAX_COMPONENT_LENGTH: usize = 255;

/// System locations nothing is ever moved into.
pub const DEFAULT_PROTECTED_DIRECTORIES: &[&str] = &[
    "/system",
    "/usr/bin",
    "/usr/sbin",
    "/bin",
    "/sbin",
    "/etc",
    "/var/log",
    "/private/etc",
    "/private/var/log",
    "/boot",
    "/dev",
    "/proc",
    "/sys",
    "/run",
    r"C:\Windows",
    r"C:\Program Files",
    r"C:\Program Files (x86)",
    r"C:\ProgramData",
    r"C:\System Volume Information",
];

const DISALLOWED_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '\\'];

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

pub type SafetyResult = Result<(), RejectionReason>;

#[derive(Debug, Clone)]
pub struct PathSafetyValidator {
    /// Lower-cased components of each protected directory.
    protected: Vec<Vec<String>>,
    max_path_length: usize,
    max_component_length: usize,
}

impl PathSafetyValidator {
    pub fn new<I, S>(protected: I, max_path_length: usize, max_component_length: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            protected: protected
                .into_iter()
                .map(|dir| lowered_components(Path::new(dir.as_ref())))
                .filter(|components| !components.is_empty())
                .collect(),
            max_path_length,
            max_component_length,
        }
    }

    pub fn from_config(settings: &SafetySettings) -> Self {
        Self::new(
            &settings.protected_directories,
            settings.max_path_length,
            settings.max_component_length,
        )
    }

    /// Checks `path` and returns the first rule it breaks.
    pub fn validate(&self, path: &Path) -> SafetyResult {
        if !path.is_absolute() {
            return Err(RejectionReason::Relative);
        }
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(RejectionReason::Traversal);
        }
        if path.as_os_str().len() > self.max_path_length {
            return Err(RejectionReason::PathTooLong);
        }
        if path.components().any(|c| match c {
            Component::Normal(part) => part.len() > self.max_component_length,
            _ => false,
        }) {
            return Err(RejectionReason::ComponentTooLong);
        }
        if let Some(name) = path.file_name() {
            check_file_name(name)?;
        }

        if self.is_protected(path) {
            return Err(RejectionReason::ProtectedDirectory);
        }
        let resolved = resolve(path).map_err(|_| RejectionReason::Unresolvable)?;
        if self.is_protected(&resolved) {
            return Err(RejectionReason::ProtectedDirectory);
        }
        Ok(())
    }

    fn is_protected(&self, path: &Path) -> bool {
        let components = lowered_components(path);
        self.protected
            .iter()
            .any(|dir| components.starts_with(dir))
    }
}

impl Default for PathSafetyValidator {
    fn default() -> Self {
        Self::new(
            DEFAULT_PROTECTED_DIRECTORIES,
            DEFAULT_MAX_PATH_LENGTH,
            DEFAULT_MAX_COMPONENT_LENGTH,
        )
    }
}

fn check_file_name(name: &OsStr) -> SafetyResult {
    let name = name.to_string_lossy();
    if name
        .chars()
        .any(|c| c.is_control() || DISALLOWED_CHARS.contains(&c))
    {
        return Err(RejectionReason::DisallowedCharacter);
    }

    // `CON`, `con.txt` and `Con.tar.gz` are all the CON device on Windows.
    let stem = name.split('.').next().unwrap_or_default();
    if RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(stem)) {
        return Err(RejectionReason::ReservedName);
    }
    Ok(())
}

fn lowered_components(path: &Path) -> Vec<String> {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
        .collect()
}

/// Canonicalizes the deepest existing ancestor and re-appends the rest, so
/// paths that do not exist yet still resolve through symlinked parents.
fn resolve(path: &Path) -> io::Result<PathBuf> {
    let mut pending: Vec<OsString> = Vec::new();
    let mut current = path;

    loop {
        match fs::canonicalize(current) {
            Ok(mut resolved) => {
                resolved.extend(pending.iter().rev());
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let (Some(name), Some(parent)) = (current.file_name(), current.parent()) else {
                    return Err(e);
                };
                pending.push(name.to_os_string());
                current = parent;
            }
            Err(e) => return Err(e),
        }
    }
}
