//! File snapshots and the metadata provider seam.
//!
//! Format-specific parsers (EXIF, ID3, PDF properties) live behind the
//! [`MetadataProvider`] trait. The bundled [`FsMetadataProvider`] only sniffs
//! the content type with `infer`; it never fails for unreadable content and
//! leaves the optional fields empty instead.

use crate::error::MetadataError;
use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Bytes read from the head of a file for content sniffing.
const SNIFF_LEN: u64 = 8192;

/// Immutable snapshot of a file taken at scan time.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub size: u64,
    /// Birth time; `None` on filesystems that do not report it.
    pub created: Option<DateTime<Local>>,
    pub modified: Option<DateTime<Local>>,
    /// Lower-cased extension including the dot, or empty.
    pub extension: String,
}

impl FileRecord {
    /// Stats `path` and builds a record from its metadata.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        if path.file_name().is_none() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "file has no name component",
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
            size: meta.len(),
            created: meta.created().ok().map(DateTime::<Local>::from),
            modified: meta.modified().ok().map(DateTime::<Local>::from),
            extension: extension_of(path),
        })
    }

    pub fn file_name(&self) -> &OsStr {
        self.path.file_name().unwrap_or(OsStr::new("unnamed"))
    }

    /// File name for events and logs.
    pub fn display_name(&self) -> String {
        self.file_name().to_string_lossy().into_owned()
    }
}

/// Returns the lower-cased extension of `path` with its leading dot.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Normalized metadata for one file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataRecord {
    /// Creation date recorded inside the file (EXIF `DateTimeOriginal`,
    /// document properties), as opposed to the filesystem timestamp.
    pub creation_date: Option<DateTime<Local>>,
    /// Content-type hint: `image`, `video`, `audio`, `document` or `archive`.
    pub category: Option<String>,
    pub mime_type: Option<String>,
    /// Format-specific extras.
    pub fields: BTreeMap<String, String>,
}

pub trait MetadataProvider: Send + Sync {
    fn extract(&self, file: &FileRecord) -> Result<MetadataRecord, MetadataError>;
}

/// Content sniffing via `infer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsMetadataProvider;

impl FsMetadataProvider {
    pub fn new() -> Self {
        Self
    }

    fn read_head(path: &Path) -> io::Result<Vec<u8>> {
        let mut head = Vec::with_capacity(SNIFF_LEN as usize);
        File::open(path)?.take(SNIFF_LEN).read_to_end(&mut head)?;
        Ok(head)
    }
}

impl MetadataProvider for FsMetadataProvider {
    fn extract(&self, file: &FileRecord) -> Result<MetadataRecord, MetadataError> {
        let mut record = MetadataRecord::default();

        // Unreadable content degrades to an empty record.
        let Ok(head) = Self::read_head(&file.path) else {
            return Ok(record);
        };

        if let Some(kind) = infer::get(&head) {
            record.mime_type = Some(kind.mime_type().to_string());
            record.category = category_hint(kind.matcher_type()).map(str::to_string);
            record
                .fields
                .insert("detected_extension".to_string(), kind.extension().to_string());
        }

        Ok(record)
    }
}

fn category_hint(matcher: infer::MatcherType) -> Option<&'static str> {
    use infer::MatcherType;
    match matcher {
        MatcherType::Image => Some("image"),
        MatcherType::Video => Some("video"),
        MatcherType::Audio => Some("audio"),
        MatcherType::Archive => Some("archive"),
        MatcherType::Doc | MatcherType::Book | MatcherType::Text => Some("document"),
        _ => None,
    }
}
