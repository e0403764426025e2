//! Skiff Core - background subsystems for a graphical file browser
//!
//! This library provides the non-UI core of skiff: the indexing engine
//! that keeps a vector/metadata store in sync with watched directories,
//! the asynchronous filesystem operation queue, and the AI summarization
//! pipeline with its persistent content-addressed cache.

pub mod config;
pub mod entry;
pub mod error;
pub mod filter;
pub mod hash;
pub mod index;
pub mod ops;
pub mod search;
pub mod summary;

pub use config::{Config, IndexerConfig, SummaryConfig, SummaryLevel};
pub use entry::{DirectoryReader, DirectorySnapshot, FileEntry, SortKey, VcsStatus};
pub use error::SkiffError;
pub use filter::FilterPolicy;
pub use index::{
    ChangeEvent, ChangeKind, Embedder, Indexer, IndexerStats, IndexerStatus, VectorStore,
};
pub use ops::{
    OperationErrorKind, OperationKind, OperationQueue, OperationStatus, QueuedOperation,
};
pub use search::{
    SearchMode, SearchResult, SearchRouter, SemanticHit, SemanticOptions, SemanticSearch,
};
pub use summary::{
    AsyncSummaryRequest, CompletionProvider, CompletionResponse, FileType, HoverPhase,
    HoverSummary, StopReason, SummaryCache, SummaryPipeline, SummaryResult, SummaryStatus,
};

/// Result type alias for skiff operations
pub type Result<T> = std::result::Result<T, SkiffError>;
