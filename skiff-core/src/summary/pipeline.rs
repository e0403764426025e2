//! The summarization pipeline: validate, classify, consult the cache,
//! prompt the completion collaborator, record the outcome.

use super::{
    CompletionProvider, FileType, StopReason, SummaryCache, SummaryResult, SummaryStatus,
};
use crate::config::{SummaryConfig, SummaryLevel};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, warn};

/// Hard cap on content read into a prompt
pub const CONTENT_CAP: u64 = 512 * 1024;

/// Stateless orchestrator over the provider and the (optional) cache.
/// Failures come back as `SummaryResult` values with a non-ok status,
/// never as panics.
pub struct SummaryPipeline {
    config: SummaryConfig,
    provider: Arc<dyn CompletionProvider>,
    cache: Option<Arc<Mutex<SummaryCache>>>,
}

impl SummaryPipeline {
    pub fn new(config: SummaryConfig, provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            config,
            provider,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<Mutex<SummaryCache>>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &SummaryConfig {
        &self.config
    }

    /// Summarize the file at `path` at the configured level.
    pub fn summarize(&self, path: &Path) -> SummaryResult {
        self.summarize_at(path, self.config.default_level, self.config.extract_key_points)
    }

    fn summarize_at(&self, path: &Path, level: SummaryLevel, key_points: bool) -> SummaryResult {
        let file_type = FileType::detect(path);

        let meta = match fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            _ => {
                return SummaryResult::failure(
                    path,
                    file_type,
                    level,
                    SummaryStatus::FileNotFound,
                    format!("{} does not exist", path.display()),
                )
            }
        };
        if self.config.max_file_size > 0 && meta.len() > self.config.max_file_size {
            return SummaryResult::failure(
                path,
                file_type,
                level,
                SummaryStatus::TooLarge,
                format!("{} bytes exceeds cap", meta.len()),
            );
        }
        if matches!(file_type, FileType::Image | FileType::Unknown) {
            return SummaryResult::failure(
                path,
                file_type,
                level,
                SummaryStatus::UnsupportedType,
                format!("cannot summarize {file_type:?} content"),
            );
        }

        if self.config.use_cache {
            if let Some(hit) = self.cache_get(path) {
                debug!("cache hit for {}", path.display());
                return hit;
            }
        }

        if self.config.api_key.is_empty() {
            return SummaryResult::failure(
                path,
                file_type,
                level,
                SummaryStatus::ApiError,
                "no api key",
            );
        }

        let content = match read_capped(path, CONTENT_CAP) {
            Ok(text) => text,
            Err(e) => {
                return SummaryResult::failure(
                    path,
                    file_type,
                    level,
                    SummaryStatus::ApiError,
                    format!("read failed: {e}"),
                )
            }
        };

        let user = self.user_message(path, file_type, &content, Some(&meta));
        let result = self.complete(path, file_type, level, &system_prompt(file_type, level, key_points), &user);

        if result.is_ok() && self.config.use_cache {
            self.cache_put(&result);
        }
        result
    }

    /// Brief one-off summary; just the text, no cache write-back quirks.
    pub fn summarize_quick(&self, path: &Path) -> crate::Result<String> {
        let result = self.summarize_at(path, SummaryLevel::Brief, false);
        if result.is_ok() {
            Ok(result.summary_text)
        } else {
            Err(crate::SkiffError::Api(
                result
                    .error_message
                    .unwrap_or_else(|| format!("{:?}", result.status)),
            ))
        }
    }

    /// Summarize in-memory content. No file I/O, no cache.
    pub fn summarize_text(&self, content: &str, file_type: FileType) -> SummaryResult {
        let level = self.config.default_level;
        let path = Path::new("<memory>");
        if self.config.api_key.is_empty() {
            return SummaryResult::failure(path, file_type, level, SummaryStatus::ApiError, "no api key");
        }
        let capped = truncate_chars(content, CONTENT_CAP as usize);
        let user = self.user_message(path, file_type, capped, None);
        self.complete(
            path,
            file_type,
            level,
            &system_prompt(file_type, level, false),
            &user,
        )
    }

    /// Ask for at most `max_points` numbered key points.
    pub fn extract_key_points(&self, path: &Path, max_points: usize) -> SummaryResult {
        let file_type = FileType::detect(path);
        let level = self.config.default_level;
        if self.config.api_key.is_empty() {
            return SummaryResult::failure(path, file_type, level, SummaryStatus::ApiError, "no api key");
        }
        let content = match read_capped(path, CONTENT_CAP) {
            Ok(text) => text,
            Err(e) => {
                return SummaryResult::failure(
                    path,
                    file_type,
                    level,
                    SummaryStatus::FileNotFound,
                    format!("read failed: {e}"),
                )
            }
        };
        let system = format!(
            "You extract the key points from a file. Respond with at most \
             {max_points} numbered points, one line each, most important first."
        );
        let user = self.user_message(path, file_type, &content, None);
        self.complete(path, file_type, level, &system, &user)
    }

    /// Compare two files; each side is capped at half the content cap.
    pub fn compare(&self, path_a: &Path, path_b: &Path) -> SummaryResult {
        let level = self.config.default_level;
        let file_type = FileType::detect(path_a);
        if self.config.api_key.is_empty() {
            return SummaryResult::failure(path_a, file_type, level, SummaryStatus::ApiError, "no api key");
        }
        let half = CONTENT_CAP / 2;
        let content_a = match read_capped(path_a, half) {
            Ok(text) => text,
            Err(e) => {
                return SummaryResult::failure(
                    path_a,
                    file_type,
                    level,
                    SummaryStatus::FileNotFound,
                    format!("read failed: {e}"),
                )
            }
        };
        let content_b = match read_capped(path_b, half) {
            Ok(text) => text,
            Err(e) => {
                return SummaryResult::failure(
                    path_b,
                    FileType::detect(path_b),
                    level,
                    SummaryStatus::FileNotFound,
                    format!("read failed: {e}"),
                )
            }
        };
        let system = "You compare two files. Describe what each contains, then \
                      the significant differences between them, in one short paragraph each.";
        let user = format!(
            "File A ({}):\n{}\n\nFile B ({}):\n{}",
            path_a.display(),
            content_a,
            path_b.display(),
            content_b
        );
        self.complete(path_a, file_type, level, system, &user)
    }

    /// Drop any cached summary, then regenerate.
    pub fn summarize_force(&self, path: &Path) -> SummaryResult {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.lock().unwrap().invalidate(path) {
                warn!("cache invalidate failed for {}: {e}", path.display());
            }
        }
        self.summarize(path)
    }

    /// Sequential batch. The second element is the worst status seen.
    pub fn summarize_batch(&self, paths: &[&Path]) -> (Vec<SummaryResult>, SummaryStatus) {
        let mut worst = SummaryStatus::Ok;
        let results: Vec<SummaryResult> = paths
            .iter()
            .map(|path| {
                let result = self.summarize(path);
                worst = worst.max(result.status);
                result
            })
            .collect();
        (results, worst)
    }

    fn complete(
        &self,
        path: &Path,
        file_type: FileType,
        level: SummaryLevel,
        system: &str,
        user: &str,
    ) -> SummaryResult {
        let started = Instant::now();
        match self.provider.send(system, user) {
            Ok(response) if response.stop_reason != StopReason::Error => SummaryResult {
                path: path.to_path_buf(),
                summary_text: response.content,
                file_type,
                level,
                from_cache: false,
                generation_ms: started.elapsed().as_millis() as u64,
                tokens_used: response.input_tokens + response.output_tokens,
                status: SummaryStatus::Ok,
                error_message: None,
            },
            Ok(response) => {
                let mut result = SummaryResult::failure(
                    path,
                    file_type,
                    level,
                    SummaryStatus::ApiError,
                    format!("provider stop reason {:?}", response.stop_reason),
                );
                result.generation_ms = started.elapsed().as_millis() as u64;
                result
            }
            Err(e) => {
                let mut result = SummaryResult::failure(
                    path,
                    file_type,
                    level,
                    SummaryStatus::ApiError,
                    e.to_string(),
                );
                result.generation_ms = started.elapsed().as_millis() as u64;
                result
            }
        }
    }

    fn user_message(
        &self,
        path: &Path,
        file_type: FileType,
        content: &str,
        meta: Option<&fs::Metadata>,
    ) -> String {
        let mut message = String::new();
        if self.config.include_metadata {
            message.push_str(&format!("File: {}\nType: {file_type:?}\n", path.display()));
            if let Some(meta) = meta {
                message.push_str(&format!("Size: {} bytes\n", meta.len()));
            }
            message.push('\n');
        }
        message.push_str(content);
        message
    }

    fn cache_get(&self, path: &Path) -> Option<SummaryResult> {
        let cache = self.cache.as_ref()?;
        match cache.lock().unwrap().get(path) {
            Ok(hit) => hit,
            Err(e) => {
                warn!("cache lookup failed for {}: {e}", path.display());
                None
            }
        }
    }

    fn cache_put(&self, result: &SummaryResult) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.lock().unwrap().put(result) {
                warn!("cache write failed for {}: {e}", result.path.display());
            }
        }
    }
}

fn system_prompt(file_type: FileType, level: SummaryLevel, key_points: bool) -> String {
    let preface = match file_type {
        FileType::Code => "You summarize source code: what it implements and how it is organized.",
        FileType::Markdown | FileType::Document => {
            "You summarize a document: its topic, structure, and conclusions."
        }
        FileType::Data => "You summarize structured data: its shape, fields, and apparent purpose.",
        _ => "You summarize a plain-text file.",
    };
    let length = match level {
        SummaryLevel::Brief => "Respond in one or two sentences.",
        SummaryLevel::Standard => "Respond in a single paragraph.",
        SummaryLevel::Detailed => "Respond in several paragraphs covering all major parts.",
    };
    let mut prompt = format!("{preface} {length}");
    if key_points {
        prompt.push_str(" End with a short numbered list of key points.");
    }
    prompt
}

fn read_capped(path: &Path, cap: u64) -> std::io::Result<String> {
    let file = fs::File::open(path)?;
    let mut buf = Vec::new();
    file.take(cap).read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Truncate to at most `cap` bytes without splitting a char.
fn truncate_chars(text: &str, cap: usize) -> &str {
    if text.len() <= cap {
        return text;
    }
    let mut end = cap;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct MockProvider {
        reply: String,
        calls: AtomicUsize,
        fail: bool,
    }

    impl MockProvider {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                reply: String::new(),
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }
    }

    impl CompletionProvider for MockProvider {
        fn send(&self, _system: &str, _user: &str) -> crate::Result<super::super::CompletionResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(crate::SkiffError::Api("connection refused".to_string()));
            }
            Ok(super::super::CompletionResponse {
                content: self.reply.clone(),
                input_tokens: 50,
                output_tokens: 20,
                stop_reason: StopReason::Ok,
            })
        }
    }

    fn config() -> SummaryConfig {
        SummaryConfig {
            api_key: "test-key".to_string(),
            use_cache: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_summarize_missing_file() {
        let pipeline = SummaryPipeline::new(config(), Arc::new(MockProvider::new("x")));
        let result = pipeline.summarize(Path::new("/nonexistent/file.txt"));
        assert_eq!(result.status, SummaryStatus::FileNotFound);
    }

    #[test]
    fn test_summarize_rejects_images_and_unknowns() {
        let dir = TempDir::new().unwrap();
        let img = dir.path().join("photo.png");
        let blob = dir.path().join("blob.qqq");
        fs::write(&img, "not really a png").unwrap();
        fs::write(&blob, "???").unwrap();

        let pipeline = SummaryPipeline::new(config(), Arc::new(MockProvider::new("x")));
        assert_eq!(
            pipeline.summarize(&img).status,
            SummaryStatus::UnsupportedType
        );
        assert_eq!(
            pipeline.summarize(&blob).status,
            SummaryStatus::UnsupportedType
        );
    }

    #[test]
    fn test_summarize_too_large() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("big.txt");
        fs::write(&file, vec![b'a'; 100]).unwrap();

        let mut cfg = config();
        cfg.max_file_size = 50;
        let pipeline = SummaryPipeline::new(cfg, Arc::new(MockProvider::new("x")));
        assert_eq!(pipeline.summarize(&file).status, SummaryStatus::TooLarge);
    }

    #[test]
    fn test_summarize_requires_api_key() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("doc.txt");
        fs::write(&file, "content").unwrap();

        let mut cfg = config();
        cfg.api_key.clear();
        let pipeline = SummaryPipeline::new(cfg, Arc::new(MockProvider::new("x")));
        let result = pipeline.summarize(&file);
        assert_eq!(result.status, SummaryStatus::ApiError);
        assert_eq!(result.error_message.as_deref(), Some("no api key"));
    }

    #[test]
    fn test_summarize_success_populates_result() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("doc.txt");
        fs::write(&file, "some prose").unwrap();

        let pipeline = SummaryPipeline::new(config(), Arc::new(MockProvider::new("a summary")));
        let result = pipeline.summarize(&file);
        assert!(result.is_ok());
        assert_eq!(result.summary_text, "a summary");
        assert_eq!(result.tokens_used, 70);
        assert!(!result.from_cache);
        assert_eq!(result.file_type, FileType::Text);
    }

    #[test]
    fn test_cache_hit_skips_provider() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("doc.txt");
        fs::write(&file, "prose").unwrap();

        let mut cfg = config();
        cfg.use_cache = true;
        let provider = Arc::new(MockProvider::new("generated"));
        let cache = Arc::new(Mutex::new(SummaryCache::open_in_memory().unwrap()));
        let pipeline =
            SummaryPipeline::new(cfg, Arc::clone(&provider) as Arc<dyn CompletionProvider>)
                .with_cache(cache);

        let first = pipeline.summarize(&file);
        assert!(first.is_ok());
        assert!(!first.from_cache);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let second = pipeline.summarize(&file);
        assert!(second.from_cache);
        assert_eq!(second.summary_text, "generated");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_force_regenerates_despite_cache() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("doc.txt");
        fs::write(&file, "prose").unwrap();

        let mut cfg = config();
        cfg.use_cache = true;
        let provider = Arc::new(MockProvider::new("v"));
        let cache = Arc::new(Mutex::new(SummaryCache::open_in_memory().unwrap()));
        let pipeline =
            SummaryPipeline::new(cfg, Arc::clone(&provider) as Arc<dyn CompletionProvider>)
                .with_cache(cache);

        pipeline.summarize(&file);
        let forced = pipeline.summarize_force(&file);
        assert!(!forced.from_cache);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_provider_failure_is_api_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("doc.txt");
        fs::write(&file, "prose").unwrap();

        let pipeline = SummaryPipeline::new(config(), Arc::new(MockProvider::failing()));
        let result = pipeline.summarize(&file);
        assert_eq!(result.status, SummaryStatus::ApiError);
        assert!(result.error_message.unwrap().contains("connection refused"));
    }

    #[test]
    fn test_batch_reports_worst_status() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.txt");
        fs::write(&good, "ok").unwrap();
        let missing = dir.path().join("missing.txt");

        let pipeline = SummaryPipeline::new(config(), Arc::new(MockProvider::new("s")));
        let (results, worst) = pipeline.summarize_batch(&[&good, &missing]);
        assert_eq!(results.len(), 2);
        assert_eq!(worst, SummaryStatus::FileNotFound);
    }

    #[test]
    fn test_summarize_text_skips_filesystem() {
        let pipeline = SummaryPipeline::new(config(), Arc::new(MockProvider::new("about code")));
        let result = pipeline.summarize_text("fn main() {}", FileType::Code);
        assert!(result.is_ok());
        assert_eq!(result.summary_text, "about code");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let text = "aé"; // 'é' is two bytes starting at 1
        assert_eq!(truncate_chars(text, 2), "a");
        assert_eq!(truncate_chars(text, 3), "aé");
    }
}
