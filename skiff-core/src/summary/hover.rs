//! Hover-driven summaries: debounce, cache-first lookup, at most one
//! request in flight. Polled from the UI frame loop, never blocking.

use super::{
    is_summarizable, AsyncSummaryRequest, CompletionProvider, SummaryCache,
};
use crate::config::SummaryConfig;
use crate::entry::DirectorySnapshot;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoverPhase {
    Idle,
    Debouncing,
    Loading,
    Ready,
    Error,
}

/// State machine turning cursor movement over a file list into at most
/// one summary request. Every transition that abandons a running
/// request cancels and joins it before the machine moves on.
pub struct HoverSummary {
    phase: HoverPhase,
    hovered_index: Option<usize>,
    hover_started: Option<Instant>,
    debounce: Duration,
    summary_text: String,
    summary_path: PathBuf,
    summary_error: Option<String>,
    request: AsyncSummaryRequest,
    config: SummaryConfig,
    provider: Arc<dyn CompletionProvider>,
    cache: Option<Arc<Mutex<SummaryCache>>>,
}

impl HoverSummary {
    pub fn new(config: SummaryConfig, provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            phase: HoverPhase::Idle,
            hovered_index: None,
            hover_started: None,
            debounce: DEFAULT_DEBOUNCE,
            summary_text: String::new(),
            summary_path: PathBuf::new(),
            summary_error: None,
            request: AsyncSummaryRequest::new(),
            config,
            provider,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<Mutex<SummaryCache>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Override the debounce interval (tests use zero).
    pub fn set_debounce(&mut self, debounce: Duration) {
        self.debounce = debounce;
    }

    pub fn phase(&self) -> HoverPhase {
        self.phase
    }

    pub fn hovered_index(&self) -> Option<usize> {
        self.hovered_index
    }

    /// The summary text once `phase() == Ready`.
    pub fn text(&self) -> &str {
        &self.summary_text
    }

    pub fn error(&self) -> Option<&str> {
        self.summary_error.as_deref()
    }

    /// Feed a cursor position. `None` (or an out-of-range index, a
    /// directory, or a non-summarizable file) returns the machine to
    /// idle.
    pub fn hover(&mut self, index: Option<usize>, snapshot: &DirectorySnapshot) {
        let target = index.and_then(|i| snapshot.entries.get(i).map(|entry| (i, entry)));
        match target {
            Some((i, entry)) if !entry.is_directory && is_summarizable(&entry.path) => {
                if self.hovered_index == Some(i) && self.phase != HoverPhase::Idle {
                    return; // unchanged target, let the timer run
                }
                self.discard_in_flight();
                self.hovered_index = Some(i);
                self.summary_path = entry.path.clone();
                self.summary_text.clear();
                self.summary_error = None;
                self.hover_started = Some(Instant::now());
                self.phase = HoverPhase::Debouncing;
            }
            _ => {
                self.discard_in_flight();
                self.hovered_index = None;
                self.hover_started = None;
                self.phase = HoverPhase::Idle;
            }
        }
    }

    /// Advance the machine; called once per UI frame.
    pub fn tick(&mut self) {
        match self.phase {
            HoverPhase::Debouncing => {
                let Some(started) = self.hover_started else {
                    self.phase = HoverPhase::Idle;
                    return;
                };
                if started.elapsed() < self.debounce {
                    return;
                }
                // Cache hit needs no worker at all
                if let Some(text) = self.cache_lookup() {
                    debug!("hover cache hit for {}", self.summary_path.display());
                    self.summary_text = text;
                    self.phase = HoverPhase::Ready;
                    return;
                }
                let started = self.request.start(
                    &self.summary_path,
                    self.config.clone(),
                    Arc::clone(&self.provider),
                    self.cache.clone(),
                );
                match started {
                    Ok(()) => self.phase = HoverPhase::Loading,
                    Err(e) => {
                        self.summary_error = Some(e.to_string());
                        self.phase = HoverPhase::Error;
                    }
                }
            }
            HoverPhase::Loading => {
                if !self.request.is_complete() {
                    return;
                }
                self.request.join();
                match self.request.take_result() {
                    Some(result) if result.is_ok() => {
                        self.summary_text = result.summary_text;
                        self.phase = HoverPhase::Ready;
                    }
                    Some(result) => {
                        self.summary_error = result.error_message;
                        self.phase = HoverPhase::Error;
                    }
                    None => {
                        self.summary_error = Some("summary request discarded".to_string());
                        self.phase = HoverPhase::Error;
                    }
                }
            }
            _ => {}
        }
    }

    fn cache_lookup(&self) -> Option<String> {
        let cache = self.cache.as_ref()?;
        cache
            .lock()
            .unwrap()
            .get(&self.summary_path)
            .ok()
            .flatten()
            .map(|hit| hit.summary_text)
    }

    /// Cancel and join any running request before its state is reused.
    fn discard_in_flight(&mut self) {
        if self.phase == HoverPhase::Loading {
            self.request.cancel();
            self.request.join();
        }
    }
}
