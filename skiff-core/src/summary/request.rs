//! Single-shot background summary request.

use super::{CompletionProvider, SummaryCache, SummaryPipeline, SummaryResult};
use crate::config::SummaryConfig;
use crate::SkiffError;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::debug;

/// Flags and result slot shared with the consumer. The lock is exposed
/// so a UI can fold it into its own synchronization.
#[derive(Default)]
pub struct RequestState {
    pub result: Option<SummaryResult>,
    pub completed: bool,
    pub cancelled: bool,
    config: Option<SummaryConfig>,
}

/// Runs one `summarize` call on a detached worker. Exactly one request
/// may be outstanding per value; the consumer joins (`join`) before
/// starting the next.
pub struct AsyncSummaryRequest {
    state: Arc<Mutex<RequestState>>,
    handle: Option<JoinHandle<()>>,
}

impl Default for AsyncSummaryRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncSummaryRequest {
    pub fn new() -> Self {
        Self::with_shared(Arc::new(Mutex::new(RequestState::default())))
    }

    /// Attach an externally owned lock instead of creating one.
    pub fn with_shared(state: Arc<Mutex<RequestState>>) -> Self {
        Self {
            state,
            handle: None,
        }
    }

    /// Handle to the shared flags, for consumers that poll directly.
    pub fn shared(&self) -> Arc<Mutex<RequestState>> {
        Arc::clone(&self.state)
    }

    /// Spawn the worker. Fails when a previous request has not been
    /// joined yet.
    pub fn start(
        &mut self,
        path: &Path,
        config: SummaryConfig,
        provider: Arc<dyn CompletionProvider>,
        cache: Option<Arc<Mutex<SummaryCache>>>,
    ) -> crate::Result<()> {
        if self.handle.is_some() {
            return Err(SkiffError::RequestInFlight);
        }
        {
            let mut state = self.state.lock().unwrap();
            state.completed = false;
            state.cancelled = false;
            state.result = None;
            state.config = Some(config.clone());
        }

        let state = Arc::clone(&self.state);
        let path = path.to_path_buf();
        let handle = std::thread::Builder::new()
            .name("skiff-summary".to_string())
            .spawn(move || {
                let mut pipeline = SummaryPipeline::new(config, provider);
                if let Some(cache) = cache {
                    pipeline = pipeline.with_cache(cache);
                }
                let result = pipeline.summarize(&path);

                let mut state = state.lock().unwrap();
                if state.cancelled {
                    // Result discarded; completed stays false
                    debug!("summary request for {} was cancelled", path.display());
                } else {
                    state.result = Some(result);
                    state.completed = true;
                }
            })
            .map_err(|e| SkiffError::WorkerSpawn(e.to_string()))?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Mark the request cancelled. The worker keeps running; only its
    /// result is discarded.
    pub fn cancel(&self) {
        self.state.lock().unwrap().cancelled = true;
    }

    pub fn is_complete(&self) -> bool {
        self.state.lock().unwrap().completed
    }

    /// Completed and not cancelled: the result may be consumed.
    pub fn is_ready(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.completed && !state.cancelled
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Wait for the worker. Required before `start`ing again and before
    /// a cancelled request's memory is reused.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Take the result if ready.
    pub fn take_result(&self) -> Option<SummaryResult> {
        let mut state = self.state.lock().unwrap();
        if state.completed && !state.cancelled {
            state.result.take()
        } else {
            None
        }
    }

    /// Zero sensitive fields and reset flags. Call after `join`.
    pub fn cleanup(&mut self) {
        self.join();
        let mut state = self.state.lock().unwrap();
        if let Some(config) = &mut state.config {
            config.api_key.clear();
        }
        state.config = None;
        state.result = None;
        state.completed = false;
        state.cancelled = false;
    }
}

impl Drop for AsyncSummaryRequest {
    fn drop(&mut self) {
        self.join();
    }
}
