//! TOML configuration.
//!
//! Looked up in this order, first hit wins:
//! 1. the path given with `--config`
//! 2. `.refilerc.toml` in the current directory
//! 3. `~/.config/refile/config.toml`
//! 4. built-in defaults
//!
//! Every section and every key is optional.
//!
//! ```toml
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = [".DS_Store", "Thumbs.db"]
//! patterns = ["*.part", "node_modules/**"]
//! extensions = ["tmp", "crdownload"]
//! regex = ['^~\$']
//!
//! [filters.include]
//! patterns = [".keep-me"]
//!
//! [organization]
//! default_strategy = "smart"
//! space_margin = 1.2
//!
//! [history]
//! path = "/var/tmp/refile-history.json"
//! retention_limit = 50
//!
//! [safety]
//! protected_directories = ["/etc", "/usr/bin"]
//! max_path_length = 4096
//! max_component_length = 255
//!
//! [unorganize]
//! prune_empty_dirs = true
//! ```

use crate::error::ConfigError;
use crate::history::DEFAULT_RETENTION_LIMIT;
use crate::organizer::DEFAULT_SPACE_MARGIN;
use crate::safety::{DEFAULT_MAX_COMPONENT_LENGTH, DEFAULT_MAX_PATH_LENGTH, DEFAULT_PROTECTED_DIRECTORIES};
use crate::strategy::Strategy;
use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub type ConfigResult<T> = Result<T, ConfigError>;

const LOCAL_CONFIG_FILE: &str = ".refilerc.toml";
const APP_DIR: &str = "refile";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub filters: FilterRules,
    pub organization: OrganizationSettings,
    pub history: HistorySettings,
    pub safety: SafetySettings,
    pub unorganize: UnorganizeSettings,
}

/// Which scanned files take part in a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterRules {
    /// Dotfiles and dot-directories are skipped unless this is set.
    #[serde(default)]
    pub enable_hidden_files: bool,
    #[serde(default)]
    pub exclude: ExcludeRules,
    /// Matches here win over every exclusion, including the hidden rule.
    #[serde(default)]
    pub include: IncludeRules,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact file names.
    #[serde(default)]
    pub filenames: Vec<String>,
    /// Globs matched against the path relative to the source directory.
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Extensions without the dot, case-insensitive.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Regexes matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeRules {
    #[serde(default)]
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizationSettings {
    /// Strategy used when none is given on the command line.
    pub default_strategy: String,
    /// Free space required at the destination, as a multiple of the bytes
    /// to be moved.
    pub space_margin: f64,
}

impl Default for OrganizationSettings {
    fn default() -> Self {
        Self {
            default_strategy: Strategy::Date.name().to_string(),
            space_margin: DEFAULT_SPACE_MARGIN,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// History file; defaults to `~/.config/refile/history.json`.
    pub path: Option<PathBuf>,
    pub retention_limit: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            path: None,
            retention_limit: DEFAULT_RETENTION_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetySettings {
    pub protected_directories: Vec<String>,
    pub max_path_length: usize,
    pub max_component_length: usize,
}

impl Default for SafetySettings {
    fn default() -> Self {
        Self {
            protected_directories: DEFAULT_PROTECTED_DIRECTORIES
                .iter()
                .map(|dir| dir.to_string())
                .collect(),
            max_path_length: DEFAULT_MAX_PATH_LENGTH,
            max_component_length: DEFAULT_MAX_COMPONENT_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnorganizeSettings {
    /// Remove directories left empty under the organized root.
    pub prune_empty_dirs: bool,
}

impl Default for UnorganizeSettings {
    fn default() -> Self {
        Self {
            prune_empty_dirs: true,
        }
    }
}

impl Config {
    /// Loads the first configuration found in the lookup order.
    ///
    /// # Errors
    ///
    /// An explicitly given file must exist and parse. Files found by the
    /// implicit lookup must parse.
    pub fn load(config_path: Option<&Path>) -> ConfigResult<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.is_file() {
            return Self::load_from_file(&local);
        }

        if let Some(dir) = app_config_dir() {
            let global = dir.join("config.toml");
            if global.is_file() {
                return Self::load_from_file(&global);
            }
        }

        Ok(Self::default())
    }

    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that parse but cannot be used.
    pub fn validate(&self) -> ConfigResult<()> {
        self.default_strategy()?;

        let margin = self.organization.space_margin;
        if !margin.is_finite() || margin < 1.0 {
            return Err(ConfigError::InvalidValue {
                key: "organization.space_margin",
                reason: format!("must be a number >= 1.0, got {}", margin),
            });
        }
        if self.history.retention_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "history.retention_limit",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.safety.max_path_length == 0 {
            return Err(ConfigError::InvalidValue {
                key: "safety.max_path_length",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.safety.max_component_length == 0 {
            return Err(ConfigError::InvalidValue {
                key: "safety.max_component_length",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn default_strategy(&self) -> ConfigResult<Strategy> {
        Strategy::from_name(&self.organization.default_strategy)
    }

    /// Configured history file, or the per-user default.
    pub fn history_path(&self) -> ConfigResult<PathBuf> {
        if let Some(path) = &self.history.path {
            return Ok(path.clone());
        }
        app_config_dir()
            .map(|dir| dir.join("history.json"))
            .ok_or(ConfigError::InvalidValue {
                key: "history.path",
                reason: "HOME is not set; configure an explicit history path".to_string(),
            })
    }

    pub fn compile_filters(&self) -> ConfigResult<CompiledFilters> {
        CompiledFilters::new(&self.filters)
    }
}

fn app_config_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config").join(APP_DIR))
}

/// Filter rules with every pattern parsed once up front.
#[derive(Debug, Clone)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

impl CompiledFilters {
    fn new(rules: &FilterRules) -> ConfigResult<Self> {
        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<ConfigResult<Vec<_>>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns: compile_globs(&rules.exclude.patterns)?,
            exclude_regexes,
            include_patterns: compile_globs(&rules.include.patterns)?,
        })
    }

    /// Filters that let everything through, hidden files included.
    pub fn allow_all() -> Self {
        Self {
            enable_hidden_files: true,
            exclude_filenames: HashSet::new(),
            exclude_extensions: HashSet::new(),
            exclude_patterns: Vec::new(),
            exclude_regexes: Vec::new(),
            include_patterns: Vec::new(),
        }
    }

    pub fn include_hidden(&self) -> bool {
        self.enable_hidden_files
    }

    /// Decides whether a file takes part in a run. `relative_path` is the
    /// path below the source directory.
    ///
    /// Include patterns are checked first and short-circuit. After that the
    /// hidden rule, exact names, extensions, globs and regexes each exclude.
    pub fn should_include(&self, relative_path: &Path) -> bool {
        if self
            .include_patterns
            .iter()
            .any(|p| p.matches_path(relative_path))
        {
            return true;
        }

        let name = relative_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let hidden = !self.enable_hidden_files && name.starts_with('.');
        let named = self.exclude_filenames.contains(&name);
        let by_extension = relative_path
            .extension()
            .is_some_and(|ext| {
                self.exclude_extensions
                    .contains(&ext.to_string_lossy().to_lowercase())
            });

        if hidden || named || by_extension {
            return false;
        }

        !(self
            .exclude_patterns
            .iter()
            .any(|p| p.matches_path(relative_path))
            || self.exclude_regexes.iter().any(|r| r.is_match(&name)))
    }
}

fn compile_globs(patterns: &[String]) -> ConfigResult<Vec<Pattern>> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn filters(toml: &str) -> CompiledFilters {
        Config::from_toml(toml)
            .expect("valid config")
            .compile_filters()
            .expect("valid filters")
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.filters.enable_hidden_files);
        assert_eq!(config.default_strategy().unwrap(), Strategy::Date);
        assert_eq!(config.organization.space_margin, 1.2);
        assert_eq!(config.history.retention_limit, 50);
        assert_eq!(config.safety.max_path_length, 4096);
        assert_eq!(config.safety.max_component_length, 255);
        assert!(config.safety.protected_directories.iter().any(|d| d == "/etc"));
        assert!(config.unorganize.prune_empty_dirs);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = Config::from_toml(
            r#"
            [organization]
            default_strategy = "Smart"

            [history]
            retention_limit = 5
            "#,
        )
        .expect("valid config");
        assert_eq!(config.default_strategy().unwrap(), Strategy::Smart);
        assert_eq!(config.organization.space_margin, 1.2);
        assert_eq!(config.history.retention_limit, 5);
        assert!(config.unorganize.prune_empty_dirs);
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            ("[organization]\ndefault_strategy = \"random\"", None),
            ("[organization]\nspace_margin = 0.5", Some("organization.space_margin")),
            ("[history]\nretention_limit = 0", Some("history.retention_limit")),
            ("[safety]\nmax_component_length = 0", Some("safety.max_component_length")),
        ];
        for (toml, key) in cases {
            match (Config::from_toml(toml), key) {
                (Err(ConfigError::UnknownStrategy(name)), None) => assert_eq!(name, "random"),
                (Err(ConfigError::InvalidValue { key: got, .. }), Some(want)) => {
                    assert_eq!(got, want)
                }
                (other, _) => panic!("unexpected result for {toml:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(
            Config::from_toml("[history\nretention_limit = 3"),
            Err(ConfigError::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_explicit_missing_file() {
        let result = Config::load(Some(Path::new("/no/such/refile.toml")));
        assert!(matches!(result, Err(ConfigError::ConfigNotFound(_))));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("refile.toml");
        fs::write(&path, "[history]\npath = \"/tmp/h.json\"\n").expect("Failed to write config");

        let config = Config::load(Some(&path)).expect("Failed to load config");
        assert_eq!(config.history_path().unwrap(), PathBuf::from("/tmp/h.json"));
    }

    #[test]
    fn test_hidden_files_skipped_unless_enabled() {
        let default = filters("");
        assert!(!default.should_include(Path::new(".DS_Store")));
        assert!(!default.include_hidden());
        assert!(default.should_include(Path::new("photo.jpg")));

        let enabled = filters("[filters]\nenable_hidden_files = true");
        assert!(enabled.should_include(Path::new(".DS_Store")));
    }

    #[test]
    fn test_exclusions() {
        let compiled = filters(
            r#"
            [filters]
            enable_hidden_files = true
            [filters.exclude]
            filenames = ["Thumbs.db"]
            extensions = [".crdownload", "tmp"]
            patterns = ["**/node_modules/**", "*.part"]
            regex = ['^~\$']
            "#,
        );

        for excluded in [
            "Thumbs.db",
            "movie.CRDOWNLOAD",
            "notes.tmp",
            "web/node_modules/pkg/index.js",
            "video.part",
            "~$report.docx",
        ] {
            assert!(!compiled.should_include(Path::new(excluded)), "{excluded}");
        }
        for kept in ["photo.jpg", "my_node_modules/index.js", "report.docx"] {
            assert!(compiled.should_include(Path::new(kept)), "{kept}");
        }
    }

    #[test]
    fn test_include_patterns_win() {
        let compiled = filters(
            r#"
            [filters.exclude]
            extensions = ["log"]
            [filters.include]
            patterns = [".keep", "keep/*.log"]
            "#,
        );
        assert!(compiled.should_include(Path::new(".keep")));
        assert!(!compiled.should_include(Path::new(".other")));
        assert!(compiled.should_include(Path::new("keep/app.log")));
        assert!(!compiled.should_include(Path::new("app.log")));
    }

    #[test]
    fn test_glob_respects_directory_boundaries() {
        let compiled = filters("[filters.exclude]\npatterns = [\"**/logs/**\"]");
        assert!(!compiled.should_include(Path::new("app/logs/a.txt")));
        assert!(compiled.should_include(Path::new("app/my_logs/a.txt")));
    }

    #[test]
    fn test_invalid_patterns() {
        let glob = Config::from_toml("[filters.exclude]\npatterns = [\"[unclosed\"]")
            .unwrap()
            .compile_filters();
        assert!(matches!(glob, Err(ConfigError::InvalidGlobPattern(_))));

        let regex = Config::from_toml("[filters.exclude]\nregex = [\"(open\"]")
            .unwrap()
            .compile_filters();
        assert!(matches!(regex, Err(ConfigError::InvalidRegexPattern { .. })));
    }

    #[test]
    fn test_allow_all() {
        let compiled = CompiledFilters::allow_all();
        assert!(compiled.include_hidden());
        assert!(compiled.should_include(Path::new(".hidden/file")));
    }
}
