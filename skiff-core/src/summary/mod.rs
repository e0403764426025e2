//! AI summarization: pipeline, persistent cache, async request wrapper,
//! and the hover-debounce state machine that drives them from the UI.

mod cache;
mod hover;
mod pipeline;
mod provider;
mod request;

pub use cache::SummaryCache;
pub use hover::{HoverPhase, HoverSummary};
pub use pipeline::{SummaryPipeline, CONTENT_CAP};
pub use provider::{CompletionProvider, CompletionResponse, HttpProvider, StopReason};
pub use request::{AsyncSummaryRequest, RequestState};

use crate::config::SummaryLevel;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Coarse content classification, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Text,
    Code,
    Document,
    Markdown,
    Data,
    Image,
    Unknown,
}

impl FileType {
    /// Classify by extension, case-insensitive. No content sniffing.
    pub fn detect(path: &Path) -> Self {
        let ext = match path.extension() {
            Some(e) => e.to_string_lossy().to_lowercase(),
            None => return FileType::Unknown,
        };
        match ext.as_str() {
            "txt" | "text" | "log" | "rst" | "org" | "ini" | "cfg" | "conf" => FileType::Text,
            "rs" | "py" | "js" | "ts" | "jsx" | "tsx" | "c" | "h" | "cpp" | "hpp" | "cc"
            | "java" | "go" | "rb" | "sh" | "bash" | "zsh" | "swift" | "kt" | "cs" | "php"
            | "lua" | "pl" | "scala" | "hs" | "ex" | "erl" | "zig" => FileType::Code,
            "md" | "markdown" => FileType::Markdown,
            "pdf" | "doc" | "docx" | "odt" | "rtf" | "tex" => FileType::Document,
            "json" | "xml" | "csv" | "tsv" | "yaml" | "yml" | "toml" | "sql" => FileType::Data,
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "svg" | "ico" | "tiff" | "heic" => {
                FileType::Image
            }
            _ => FileType::Unknown,
        }
    }
}

/// Outcome classification carried on every `SummaryResult`. Ordered by
/// severity so a batch can report its worst member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    Ok,
    UnsupportedType,
    TooLarge,
    FileNotFound,
    ApiError,
}

/// One summarization outcome: the text on success, status + diagnostic
/// otherwise. Failures are values, never panics.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryResult {
    pub path: PathBuf,
    pub summary_text: String,
    pub file_type: FileType,
    pub level: SummaryLevel,
    pub from_cache: bool,
    pub generation_ms: u64,
    pub tokens_used: u32,
    pub status: SummaryStatus,
    pub error_message: Option<String>,
}

impl SummaryResult {
    pub(crate) fn failure(
        path: &Path,
        file_type: FileType,
        level: SummaryLevel,
        status: SummaryStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.to_path_buf(),
            summary_text: String::new(),
            file_type,
            level,
            from_cache: false,
            generation_ms: 0,
            tokens_used: 0,
            status,
            error_message: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == SummaryStatus::Ok
    }
}

/// Whether hover may summarize this path: plain text, markdown, logs,
/// structured data, and code. Documents need extraction and images need
/// vision, so neither qualifies.
pub fn is_summarizable(path: &Path) -> bool {
    matches!(
        FileType::detect(path),
        FileType::Text | FileType::Code | FileType::Markdown | FileType::Data
    )
}
