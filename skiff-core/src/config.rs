//! Configuration for skiff

use crate::SkiffError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration as TOML
pub const DEFAULT_CONFIG: &str = r#"# Skiff Configuration

[indexer]
# Path to the vector/metadata store database
db_path = "~/.cache/skiff/index.db"
# Directories to index (absolute paths)
watch_dirs = []
# Index files whose basename starts with a dot
index_hidden_files = false
# Recurse into subdirectories
recursive = true
# Files above this size (MB) are skipped; 0 disables the cap
max_file_size_mb = 10
# Number of files processed between inter-batch sleeps
batch_size = 32
# Sleep between batches (milliseconds)
delay_between_batches_ms = 10
# Subscribe to filesystem change events after the initial scan
enable_fsevents = true
# Exclude patterns, matched against basename or full path
exclude_patterns = [
    "node_modules",
    ".git",
    ".svn",
    ".hg",
    "__pycache__",
    "*.pyc",
    "*.o",
    "*.a",
    "*.so",
    "*.dylib",
    ".DS_Store",
    "Thumbs.db",
    "*.log",
    "*.tmp",
    "*.swp",
]

[summary]
# API key for the completion provider (may also come from the environment)
api_key = ""
# Summary length: "brief", "standard", or "detailed"
default_level = "standard"
# Consult and populate the persistent summary cache
use_cache = true
# Path to the summary cache database
cache_path = "~/.cache/skiff/summaries.db"
# Cached summaries older than this are purged at open
max_cache_age_days = 30
# Files above this size (bytes) are rejected
max_file_size = 10485760
# Ask the model for key points alongside the summary
extract_key_points = false
# Include file metadata in the prompt
include_metadata = false

[duplicates]
# Similarity threshold for near-duplicate detection
similarity_threshold = 0.90
"#;

/// Summary length directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLevel {
    Brief,
    Standard,
    Detailed,
}

impl SummaryLevel {
    /// Integer form used by the cache schema
    pub fn as_int(self) -> i64 {
        match self {
            Self::Brief => 0,
            Self::Standard => 1,
            Self::Detailed => 2,
        }
    }

    pub fn from_int(val: i64) -> Option<Self> {
        match val {
            0 => Some(Self::Brief),
            1 => Some(Self::Standard),
            2 => Some(Self::Detailed),
            _ => None,
        }
    }
}

/// Skiff configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub duplicates: DuplicatesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default)]
    pub watch_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub index_hidden_files: bool,
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub delay_between_batches_ms: u64,
    #[serde(default = "default_true")]
    pub enable_fsevents: bool,
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_level")]
    pub default_level: SummaryLevel,
    #[serde(default = "default_true")]
    pub use_cache: bool,
    #[serde(default = "default_cache_path")]
    pub cache_path: String,
    #[serde(default = "default_cache_age_days")]
    pub max_cache_age_days: u32,
    #[serde(default = "default_max_summary_bytes")]
    pub max_file_size: u64,
    #[serde(default)]
    pub extract_key_points: bool,
    #[serde(default)]
    pub include_metadata: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicatesConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

// Default value functions
fn default_db_path() -> String {
    "~/.cache/skiff/index.db".to_string()
}
fn default_true() -> bool {
    true
}
fn default_max_file_size_mb() -> u64 {
    10
}
fn default_batch_size() -> usize {
    32
}
fn default_batch_delay_ms() -> u64 {
    10
}
fn default_exclude_patterns() -> Vec<String> {
    [
        "node_modules",
        ".git",
        ".svn",
        ".hg",
        "__pycache__",
        "*.pyc",
        "*.o",
        "*.a",
        "*.so",
        "*.dylib",
        ".DS_Store",
        "Thumbs.db",
        "*.log",
        "*.tmp",
        "*.swp",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_level() -> SummaryLevel {
    SummaryLevel::Standard
}
fn default_cache_path() -> String {
    "~/.cache/skiff/summaries.db".to_string()
}
fn default_cache_age_days() -> u32 {
    30
}
fn default_max_summary_bytes() -> u64 {
    10 * 1024 * 1024
}
fn default_similarity_threshold() -> f64 {
    0.90
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            watch_dirs: Vec::new(),
            index_hidden_files: false,
            recursive: true,
            max_file_size_mb: default_max_file_size_mb(),
            batch_size: default_batch_size(),
            delay_between_batches_ms: default_batch_delay_ms(),
            enable_fsevents: true,
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            default_level: default_level(),
            use_cache: true,
            cache_path: default_cache_path(),
            max_cache_age_days: default_cache_age_days(),
            max_file_size: default_max_summary_bytes(),
            extract_key_points: false,
            include_metadata: false,
        }
    }
}

impl Default for DuplicatesConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| SkiffError::ConfigParse(e.to_string()))
    }
}

impl IndexerConfig {
    /// Size cap in bytes; 0 disables the cap
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

/// Expand a leading `~` to the user's home directory.
///
/// Paths without a leading `~` pass through unchanged; if no home
/// directory can be resolved the `~` is kept literally.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_parses() {
        let config = Config::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.indexer.max_file_size_mb, 10);
        assert_eq!(config.indexer.batch_size, 32);
        assert_eq!(config.indexer.delay_between_batches_ms, 10);
        assert!(config.indexer.exclude_patterns.contains(&".git".to_string()));
        assert_eq!(config.summary.default_level, SummaryLevel::Standard);
        assert_eq!(config.summary.max_file_size, 10 * 1024 * 1024);
        assert!((config.duplicates.similarity_threshold - 0.90).abs() < 1e-9);
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert!(config.indexer.recursive);
        assert!(config.summary.use_cache);
        assert_eq!(config.summary.max_cache_age_days, 30);
    }

    #[test]
    fn test_level_roundtrip() {
        for level in [
            SummaryLevel::Brief,
            SummaryLevel::Standard,
            SummaryLevel::Detailed,
        ] {
            assert_eq!(SummaryLevel::from_int(level.as_int()), Some(level));
        }
        assert_eq!(SummaryLevel::from_int(9), None);
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_tilde("rel/path"), PathBuf::from("rel/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/x/y.db"), home.join("x/y.db"));
            assert_eq!(expand_tilde("~"), home);
        }

        // Resolution must not hinge on the HOME variable alone
        std::env::remove_var("HOME");
        let expanded = expand_tilde("~/x/cache.db");
        match dirs::home_dir() {
            Some(home) => assert_eq!(expanded, home.join("x/cache.db")),
            None => assert_eq!(expanded, PathBuf::from("~/x/cache.db")),
        }
    }
}
