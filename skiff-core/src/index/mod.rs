//! Indexing engine: initial scan, work queue, worker thread, and
//! filesystem change-event dispatch.
//!
//! The engine keeps an external vector/metadata store consistent with
//! the configured watch directories. Collaborators (store, embedder,
//! change source) are attached through setters and shared by handle;
//! the indexer never owns them.

mod worker;

use crate::config::IndexerConfig;
use crate::entry::FileEntry;
use crate::filter::FilterPolicy;
use crate::SkiffError;
use crossbeam_channel::Receiver;
use serde::Serialize;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

/// Persistent key/value store over `path -> {size, mtime, file_type,
/// optional embedding}`. Implementations must be internally synchronized.
pub trait VectorStore: Send + Sync {
    /// True when the store holds an up-to-date entry (same mtime)
    fn is_indexed(&self, path: &Path, mtime: i64) -> bool;
    fn index(&self, entry: &FileEntry, embedding: Option<Vec<f32>>) -> crate::Result<()>;
    fn delete(&self, path: &Path) -> crate::Result<()>;
    fn delete_subtree(&self, prefix: &Path) -> crate::Result<()>;
}

/// Produces embedding vectors for text/code content.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> crate::Result<Vec<f32>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

/// A filesystem change delivered by the external change source.
/// Per-path ordering is preserved by the source.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexerStatus {
    Stopped,
    Running,
    Paused,
    Watching,
    Error,
}

/// Consistent snapshot of indexing progress.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexerStats {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_pending: usize,
    pub total_bytes: u64,
    pub elapsed_seconds: f64,
    pub avg_ms_per_file: f64,
    /// Fraction of known work completed, in [0, 1]
    pub progress: f64,
}

pub(crate) struct IndexerState {
    pub config: IndexerConfig,
    pub policy: FilterPolicy,
    pub status: IndexerStatus,
    pub queue: VecDeque<PathBuf>,
    pub thread_running: bool,
    pub initial_scan_complete: bool,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub total_bytes: u64,
    pub started_at: Option<Instant>,
    /// Run time accumulated over previous start/stop cycles
    pub elapsed_accum: f64,
    /// Accumulated per-item processing time
    pub busy_ms: f64,
    pub store: Option<Arc<dyn VectorStore>>,
    pub embedder: Option<Arc<dyn Embedder>>,
    pub change_rx: Option<Receiver<ChangeEvent>>,
}

pub(crate) struct Shared {
    pub state: Mutex<IndexerState>,
    pub cond: Condvar,
}

/// Long-running background indexer. One worker thread, cooperative
/// cancellation, advisory pause.
pub struct Indexer {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Indexer {
    pub fn new(config: IndexerConfig) -> crate::Result<Self> {
        let policy = policy_for(&config)?;
        let state = IndexerState {
            config,
            policy,
            status: IndexerStatus::Stopped,
            queue: VecDeque::new(),
            thread_running: false,
            initial_scan_complete: false,
            files_indexed: 0,
            files_skipped: 0,
            total_bytes: 0,
            started_at: None,
            elapsed_accum: 0.0,
            busy_ms: 0.0,
            store: None,
            embedder: None,
            change_rx: None,
        };
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                cond: Condvar::new(),
            }),
            handle: None,
        })
    }

    /// Attach the vector/metadata store. Required before `start`.
    pub fn set_store(&self, store: Arc<dyn VectorStore>) {
        self.shared.state.lock().unwrap().store = Some(store);
    }

    /// Attach (or detach) the embedding collaborator.
    pub fn set_embedder(&self, embedder: Option<Arc<dyn Embedder>>) {
        self.shared.state.lock().unwrap().embedder = embedder;
    }

    /// Attach the filesystem change-event source.
    pub fn set_change_source(&self, rx: Receiver<ChangeEvent>) {
        self.shared.state.lock().unwrap().change_rx = Some(rx);
    }

    /// Spawn the worker. Fails when already running or no store attached.
    pub fn start(&mut self) -> crate::Result<()> {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.thread_running {
                return Err(SkiffError::AlreadyRunning);
            }
            if state.store.is_none() {
                return Err(SkiffError::NoStore);
            }
            state.thread_running = true;
            state.initial_scan_complete = false;
            state.status = IndexerStatus::Running;
            state.started_at = Some(Instant::now());
        }

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("skiff-indexer".to_string())
            .spawn(move || worker::run(shared));

        match spawned {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                let mut state = self.shared.state.lock().unwrap();
                state.thread_running = false;
                state.status = IndexerStatus::Error;
                Err(SkiffError::WorkerSpawn(e.to_string()))
            }
        }
    }

    /// Request shutdown and join the worker. Idempotent.
    pub fn stop(&mut self) {
        {
            let mut state = self.shared.state.lock().unwrap();
            state.thread_running = false;
            self.shared.cond.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        let mut state = self.shared.state.lock().unwrap();
        if let Some(started) = state.started_at.take() {
            state.elapsed_accum += started.elapsed().as_secs_f64();
        }
        if state.status != IndexerStatus::Error {
            state.status = IndexerStatus::Stopped;
        }
    }

    /// Advisory pause; takes effect at the next dequeue.
    pub fn pause(&self) {
        let mut state = self.shared.state.lock().unwrap();
        if matches!(state.status, IndexerStatus::Running | IndexerStatus::Watching) {
            state.status = IndexerStatus::Paused;
            self.shared.cond.notify_all();
        }
    }

    pub fn resume(&self) {
        let mut state = self.shared.state.lock().unwrap();
        if state.status == IndexerStatus::Paused {
            state.status = IndexerStatus::Running;
            self.shared.cond.notify_all();
        }
    }

    pub fn status(&self) -> IndexerStatus {
        self.shared.state.lock().unwrap().status
    }

    /// True once the initial traversal of every watch dir has finished.
    pub fn is_scan_complete(&self) -> bool {
        self.shared.state.lock().unwrap().initial_scan_complete
    }

    pub fn add_watch_dir(&self, path: &Path) {
        let mut state = self.shared.state.lock().unwrap();
        if !state.config.watch_dirs.iter().any(|d| d == path) {
            state.config.watch_dirs.push(path.to_path_buf());
        }
    }

    pub fn remove_watch_dir(&self, path: &Path) {
        let mut state = self.shared.state.lock().unwrap();
        state.config.watch_dirs.retain(|d| d != path);
    }

    pub fn add_exclude_pattern(&self, pattern: &str) -> crate::Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        state.config.exclude_patterns.push(pattern.to_string());
        state.policy = policy_for(&state.config)?;
        Ok(())
    }

    /// Toggle change-event subscription at runtime. Fails when enabling
    /// without an attached change source.
    pub fn enable_watching(&self, flag: bool) -> crate::Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        if flag && state.change_rx.is_none() {
            return Err(SkiffError::Api("no change source attached".to_string()));
        }
        state.config.enable_fsevents = flag;
        if !flag && state.status == IndexerStatus::Watching {
            state.status = IndexerStatus::Running;
        }
        self.shared.cond.notify_all();
        Ok(())
    }

    /// Drop the store entry for `path` and queue it for reindexing.
    pub fn reindex_file(&self, path: &Path) -> crate::Result<()> {
        let store = {
            let state = self.shared.state.lock().unwrap();
            state.store.clone().ok_or(SkiffError::NoStore)?
        };
        store.delete(path)?;

        let mut state = self.shared.state.lock().unwrap();
        state.queue.push_back(path.to_path_buf());
        self.shared.cond.notify_all();
        Ok(())
    }

    /// Drop the subtree from the store and rescan it.
    pub fn reindex_directory(&self, path: &Path) -> crate::Result<()> {
        let (store, config) = {
            let state = self.shared.state.lock().unwrap();
            let store = state.store.clone().ok_or(SkiffError::NoStore)?;
            (store, state.config.clone())
        };
        store.delete_subtree(path)?;

        let policy = policy_for(&config)?;
        let found = worker::collect_eligible(path, &config, &policy);
        let mut state = self.shared.state.lock().unwrap();
        for file in found {
            state.queue.push_back(file);
        }
        self.shared.cond.notify_all();
        Ok(())
    }

    /// Snapshot current statistics under the lock.
    pub fn get_stats(&self) -> IndexerStats {
        let state = self.shared.state.lock().unwrap();
        let done = state.files_indexed + state.files_skipped;
        let total = done + state.queue.len();
        IndexerStats {
            files_indexed: state.files_indexed,
            files_skipped: state.files_skipped,
            files_pending: state.queue.len(),
            total_bytes: state.total_bytes,
            elapsed_seconds: state.elapsed_accum
                + state
                    .started_at
                    .map(|t| t.elapsed().as_secs_f64())
                    .unwrap_or(0.0),
            avg_ms_per_file: if state.files_indexed > 0 {
                state.busy_ms / state.files_indexed as f64
            } else {
                0.0
            },
            progress: if total > 0 { done as f64 / total as f64 } else { 1.0 },
        }
    }
}

impl Drop for Indexer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn policy_for(config: &IndexerConfig) -> crate::Result<FilterPolicy> {
    FilterPolicy::new(
        &config.exclude_patterns,
        config.index_hidden_files,
        config.max_file_size_bytes(),
    )
}
