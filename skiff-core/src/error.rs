//! Error types for skiff core operations

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SkiffError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("File too large: {} is {size} bytes (cap {cap})", .path.display())]
    TooLarge { path: PathBuf, size: u64, cap: u64 },

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("Glob pattern error: {0}")]
    GlobPattern(String),

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Indexer is already running")]
    AlreadyRunning,

    #[error("No vector store attached (call set_store before start)")]
    NoStore,

    #[error("Worker thread could not be spawned: {0}")]
    WorkerSpawn(String),

    #[error("A request is already in flight (join it before restarting)")]
    RequestInFlight,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
