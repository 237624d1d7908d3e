//! Placement strategies.
//!
//! A strategy maps a file, its metadata and a destination root to the path
//! the file *should* land at. It only composes paths; collision handling and
//! safety checks happen afterwards in the organizer.

use crate::category::{Category, CategoryTable};
use crate::error::ConfigError;
use crate::metadata::{FileRecord, MetadataRecord};
use chrono::{DateTime, Datelike, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Folder for files with no resolvable date.
pub const UNDATED_DIR: &str = "undated";
/// Smart strategy's folder for dated images.
pub const PHOTOS_DIR: &str = "Photos";
/// Smart strategy's year placeholder for undated documents.
pub const UNKNOWN_YEAR_DIR: &str = "unknown";

/// Lookup table from configured names to strategies.
const STRATEGY_TABLE: &[(&str, Strategy)] = &[
    ("date", Strategy::Date),
    ("type", Strategy::Type),
    ("smart", Strategy::Smart),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// `root/YYYY/MM`, or `root/undated`.
    Date,
    /// `root/<Category>`.
    Type,
    /// Dated photos by date, documents by year, the rest by type.
    Smart,
}

impl Strategy {
    /// Resolves a strategy by name, case-insensitively.
    ///
    /// ```
    /// use refile::strategy::Strategy;
    /// assert_eq!(Strategy::from_name("Smart").unwrap(), Strategy::Smart);
    /// assert!(Strategy::from_name("random").is_err());
    /// ```
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        let wanted = name.trim().to_lowercase();
        STRATEGY_TABLE
            .iter()
            .find(|(key, _)| *key == wanted)
            .map(|(_, strategy)| *strategy)
            .ok_or_else(|| ConfigError::UnknownStrategy(name.to_string()))
    }

    /// Canonical name, as stored in history.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Date => "date",
            Strategy::Type => "type",
            Strategy::Smart => "smart",
        }
    }

    /// Desired destination for `file` under `root`, file name included.
    pub fn plan(&self, file: &FileRecord, metadata: &MetadataRecord, root: &Path) -> PathBuf {
        let folder = match self {
            Strategy::Date => date_folder(root, resolve_date(file, metadata)),
            Strategy::Type => root.join(categorize(file, metadata).dir_name()),
            Strategy::Smart => smart_folder(file, metadata, root),
        };
        folder.join(file.file_name())
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// First of: embedded creation date, filesystem birth time, modification time.
pub fn resolve_date(file: &FileRecord, metadata: &MetadataRecord) -> Option<DateTime<Local>> {
    metadata.creation_date.or(file.created).or(file.modified)
}

fn categorize(file: &FileRecord, metadata: &MetadataRecord) -> Category {
    CategoryTable::standard().categorize(&file.extension, metadata.category.as_deref())
}

fn date_folder(root: &Path, date: Option<DateTime<Local>>) -> PathBuf {
    match date {
        Some(date) => year_month(root, &date),
        None => root.join(UNDATED_DIR),
    }
}

fn year_month(base: &Path, date: &DateTime<Local>) -> PathBuf {
    base.join(format!("{:04}", date.year()))
        .join(format!("{:02}", date.month()))
}

fn smart_folder(file: &FileRecord, metadata: &MetadataRecord, root: &Path) -> PathBuf {
    let category = categorize(file, metadata);
    let date = resolve_date(file, metadata);

    match (category, date) {
        (Category::Images, Some(date)) => year_month(&root.join(PHOTOS_DIR), &date),
        (Category::Documents, date) => {
            let year = date
                .map(|d| format!("{:04}", d.year()))
                .unwrap_or_else(|| UNKNOWN_YEAR_DIR.to_string());
            root.join(Category::Documents.dir_name()).join(year)
        }
        (category, _) => root.join(category.dir_name()),
    }
}
