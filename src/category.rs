//! Fixed extension to category table used by the Type and Smart strategies.
//!
//! # Examples
//!
//! ```
//! use refile::category::{Category, CategoryTable};
//!
//! let table = CategoryTable::standard();
//! assert_eq!(table.extension_to_category(".png"), Some(Category::Images));
//! assert_eq!(table.extension_to_category("PDF"), Some(Category::Documents));
//! assert_eq!(table.categorize(".xyz", None), Category::Other);
//! ```
use std::collections::HashMap;
use std::sync::LazyLock;

/// Broad file category, also the folder name a file lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Images,
    Documents,
    Videos,
    Audio,
    Archives,
    /// Anything the table does not map.
    Other,
}

impl Category {
    /// Folder name for this category.
    ///
    /// ```
    /// use refile::category::Category;
    /// assert_eq!(Category::Images.dir_name(), "Images");
    /// assert_eq!(Category::Other.dir_name(), "Other");
    /// ```
    pub fn dir_name(&self) -> &'static str {
        match self {
            Category::Images => "Images",
            Category::Documents => "Documents",
            Category::Videos => "Videos",
            Category::Audio => "Audio",
            Category::Archives => "Archives",
            Category::Other => "Other",
        }
    }

    /// Maps a metadata content-type hint (`image`, `video`, ...) to a category.
    pub fn from_hint(hint: &str) -> Option<Self> {
        let hint = hint.to_lowercase();
        if hint.contains("image") {
            Some(Category::Images)
        } else if hint.contains("video") {
            Some(Category::Videos)
        } else if hint.contains("audio") {
            Some(Category::Audio)
        } else if hint.contains("archive") {
            Some(Category::Archives)
        } else if hint.contains("document") || hint.contains("text") {
            Some(Category::Documents)
        } else {
            None
        }
    }
}

static STANDARD: LazyLock<CategoryTable> = LazyLock::new(CategoryTable::new);

const STANDARD_EXTENSIONS: &[(Category, &[&str])] = &[
    (
        Category::Images,
        &[
            "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "svg", "webp", "ico", "heic", "raw",
            "cr2", "nef", "orf", "arw", "dng",
        ],
    ),
    (
        Category::Documents,
        &[
            "pdf", "doc", "docx", "txt", "rtf", "odt", "xls", "xlsx", "ppt", "pptx", "csv", "md",
            "tex",
        ],
    ),
    (
        Category::Videos,
        &[
            "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "3gp", "ogv",
        ],
    ),
    (
        Category::Audio,
        &[
            "mp3", "wav", "flac", "aac", "ogg", "wma", "m4a", "opus", "aiff", "au",
        ],
    ),
    (
        Category::Archives,
        &["zip", "rar", "7z", "tar", "gz", "bz2", "xz", "tgz"],
    ),
];

/// Extension lookup table. Keys are stored lower-cased without the dot.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    extension_map: HashMap<String, Category>,
}

impl CategoryTable {
    pub fn new() -> Self {
        let mut table = Self {
            extension_map: HashMap::new(),
        };
        for (category, extensions) in STANDARD_EXTENSIONS {
            for ext in *extensions {
                table.add_extension_mapping(ext, *category);
            }
        }
        table
    }

    /// Shared instance of the standard table.
    pub fn standard() -> &'static CategoryTable {
        &STANDARD
    }

    pub fn add_extension_mapping(&mut self, ext: &str, category: Category) {
        self.extension_map.insert(normalize(ext), category);
    }

    /// Looks up an extension, with or without its leading dot.
    pub fn extension_to_category(&self, ext: &str) -> Option<Category> {
        self.extension_map.get(&normalize(ext)).copied()
    }

    /// Extension table first, then the metadata hint, then `Other`.
    pub fn categorize(&self, ext: &str, hint: Option<&str>) -> Category {
        self.extension_to_category(ext)
            .or_else(|| hint.and_then(Category::from_hint))
            .unwrap_or(Category::Other)
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(ext: &str) -> String {
    ext.trim_start_matches('.').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_names() {
        assert_eq!(Category::Documents.dir_name(), "Documents");
        assert_eq!(Category::Videos.dir_name(), "Videos");
        assert_eq!(Category::Audio.dir_name(), "Audio");
        assert_eq!(Category::Archives.dir_name(), "Archives");
    }

    #[test]
    fn test_extension_lookup_ignores_dot_and_case() {
        let table = CategoryTable::standard();
        assert_eq!(table.extension_to_category(".JPG"), Some(Category::Images));
        assert_eq!(table.extension_to_category("mkv"), Some(Category::Videos));
        assert_eq!(table.extension_to_category(".flac"), Some(Category::Audio));
        assert_eq!(table.extension_to_category(".7z"), Some(Category::Archives));
        assert_eq!(table.extension_to_category(".rs"), None);
    }

    #[test]
    fn test_categorize_prefers_extension_over_hint() {
        let table = CategoryTable::standard();
        assert_eq!(table.categorize(".pdf", Some("image")), Category::Documents);
    }

    #[test]
    fn test_categorize_falls_back_to_hint_then_other() {
        let table = CategoryTable::standard();
        assert_eq!(table.categorize("", Some("image")), Category::Images);
        assert_eq!(table.categorize(".bin", Some("font")), Category::Other);
        assert_eq!(table.categorize(".bin", None), Category::Other);
    }

    #[test]
    fn test_custom_mapping() {
        let mut table = CategoryTable::new();
        table.add_extension_mapping(".heif", Category::Images);
        assert_eq!(table.categorize(".heif", None), Category::Images);
    }
}
