//! Background queue for bulk filesystem mutations
//!
//! Jobs are enqueued as pending records in a bounded array, executed in
//! FIFO order by a single worker outside the queue lock, and pushed onto
//! a completion-history ring. The UI polls the queue state; nothing here
//! blocks the caller.

use serde::Serialize;
use std::collections::VecDeque;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Live-array capacity; enqueue returns None at the cap
pub const MAX_OPERATIONS: usize = 256;
/// Completion-history ring capacity
pub const HISTORY_CAP: usize = 64;

const WORKER_POLL: Duration = Duration::from_millis(10);
const COPY_BLOCK: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Copy,
    Move,
    Delete,
    Rename,
    CreateDir,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

/// Stable failure classification surfaced to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationErrorKind {
    NotFound,
    Permission,
    Exists,
    Invalid,
    DiskFull,
    Unknown,
}

/// One queued filesystem mutation and its full lifecycle record.
#[derive(Debug, Clone, Serialize)]
pub struct QueuedOperation {
    pub id: u64,
    pub kind: OperationKind,
    pub status: OperationStatus,
    pub source_path: PathBuf,
    /// Destination directory for copy/move; new basename for rename;
    /// full path for create_dir; unused for delete/duplicate
    pub dest_path: PathBuf,
    pub total_bytes: u64,
    pub processed_bytes: u64,
    pub progress_percent: f32,
    pub error_kind: Option<OperationErrorKind>,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub retryable: bool,
}

struct QueueState {
    operations: Vec<QueuedOperation>,
    history: VecDeque<QueuedOperation>,
    next_id: u64,
    paused: bool,
    processing: bool,
    current: Option<u64>,
    shutdown: bool,
}

struct OpsShared {
    state: Mutex<QueueState>,
}

/// The operation queue. Owns its worker thread and job buffers.
pub struct OperationQueue {
    shared: Arc<OpsShared>,
    handle: Option<JoinHandle<()>>,
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationQueue {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(OpsShared {
                state: Mutex::new(QueueState {
                    operations: Vec::new(),
                    history: VecDeque::new(),
                    next_id: 1,
                    paused: false,
                    processing: false,
                    current: None,
                    shutdown: false,
                }),
            }),
            handle: None,
        }
    }

    /// Spawn the worker. Fails only if the thread cannot be created.
    pub fn start(&mut self) -> crate::Result<()> {
        if self.handle.is_some() {
            return Err(crate::SkiffError::AlreadyRunning);
        }
        self.shared.state.lock().unwrap().shutdown = false;
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name("skiff-ops".to_string())
            .spawn(move || worker_loop(shared))
            .map_err(|e| crate::SkiffError::WorkerSpawn(e.to_string()))?;
        self.handle = Some(handle);
        Ok(())
    }

    /// Request shutdown and join. The in-flight job finishes first.
    pub fn stop(&mut self) {
        self.shared.state.lock().unwrap().shutdown = true;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    // ── Enqueue ─────────────────────────────────────────────────────

    /// Copy `source` into directory `dest_dir`. Returns the job id, or
    /// None when the queue is full.
    pub fn enqueue_copy(&self, source: &Path, dest_dir: &Path) -> Option<u64> {
        self.enqueue(OperationKind::Copy, source, dest_dir, walk_size(source))
    }

    /// Move `source` into directory `dest_dir`.
    pub fn enqueue_move(&self, source: &Path, dest_dir: &Path) -> Option<u64> {
        self.enqueue(OperationKind::Move, source, dest_dir, walk_size(source))
    }

    /// Delete `source` (recursively for directories).
    pub fn enqueue_delete(&self, source: &Path) -> Option<u64> {
        self.enqueue(OperationKind::Delete, source, Path::new(""), 0)
    }

    /// Rename `source` to `new_name` within its parent directory.
    pub fn enqueue_rename(&self, source: &Path, new_name: &str) -> Option<u64> {
        self.enqueue(OperationKind::Rename, source, Path::new(new_name), 0)
    }

    /// Create the directory at `path` (parent must exist).
    pub fn enqueue_create_dir(&self, path: &Path) -> Option<u64> {
        self.enqueue(OperationKind::CreateDir, Path::new(""), path, 0)
    }

    /// Copy `source` next to itself under an auto-suffixed name.
    pub fn enqueue_duplicate(&self, source: &Path) -> Option<u64> {
        self.enqueue(OperationKind::Duplicate, source, Path::new(""), walk_size(source))
    }

    fn enqueue(
        &self,
        kind: OperationKind,
        source: &Path,
        dest: &Path,
        total_bytes: u64,
    ) -> Option<u64> {
        let mut state = self.shared.state.lock().unwrap();
        if state.operations.len() >= MAX_OPERATIONS {
            warn!("operation queue full, rejecting {kind:?}");
            return None;
        }
        let id = state.next_id;
        state.next_id += 1;
        state.operations.push(QueuedOperation {
            id,
            kind,
            status: OperationStatus::Pending,
            source_path: source.to_path_buf(),
            dest_path: dest.to_path_buf(),
            total_bytes,
            processed_bytes: 0,
            progress_percent: 0.0,
            error_kind: None,
            error_message: None,
            created_at: now_secs(),
            started_at: None,
            completed_at: None,
            retryable: false,
        });
        debug!(id, ?kind, "enqueued operation");
        Some(id)
    }

    // ── Control ─────────────────────────────────────────────────────

    pub fn pause(&self) {
        self.shared.state.lock().unwrap().paused = true;
    }

    pub fn resume(&self) {
        self.shared.state.lock().unwrap().paused = false;
    }

    /// Cancel a pending job. In-progress jobs cannot be cancelled.
    pub fn cancel(&self, id: u64) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        if let Some(op) = state
            .operations
            .iter_mut()
            .find(|op| op.id == id && op.status == OperationStatus::Pending)
        {
            op.status = OperationStatus::Cancelled;
            op.completed_at = Some(now_secs());
            return true;
        }
        false
    }

    /// Cancel every pending job; returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut state = self.shared.state.lock().unwrap();
        let now = now_secs();
        let mut cancelled = 0;
        for op in &mut state.operations {
            if op.status == OperationStatus::Pending {
                op.status = OperationStatus::Cancelled;
                op.completed_at = Some(now);
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Reset a failed, retryable job to pending.
    pub fn retry(&self, id: u64) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        if let Some(op) = state
            .operations
            .iter_mut()
            .find(|op| op.id == id && op.status == OperationStatus::Failed && op.retryable)
        {
            op.status = OperationStatus::Pending;
            op.error_kind = None;
            op.error_message = None;
            op.processed_bytes = 0;
            op.progress_percent = 0.0;
            op.started_at = None;
            op.completed_at = None;
            return true;
        }
        false
    }

    /// Drop completed, failed, and cancelled jobs from the live array.
    pub fn clear_finished(&self) {
        let mut state = self.shared.state.lock().unwrap();
        state.operations.retain(|op| {
            matches!(
                op.status,
                OperationStatus::Pending | OperationStatus::InProgress
            )
        });
    }

    // ── Inspection ──────────────────────────────────────────────────

    pub fn get(&self, id: u64) -> Option<QueuedOperation> {
        let state = self.shared.state.lock().unwrap();
        state.operations.iter().find(|op| op.id == id).cloned()
    }

    /// The job currently being executed, if any.
    pub fn current(&self) -> Option<QueuedOperation> {
        let state = self.shared.state.lock().unwrap();
        let id = state.current?;
        state.operations.iter().find(|op| op.id == id).cloned()
    }

    pub fn pending_count(&self) -> usize {
        let state = self.shared.state.lock().unwrap();
        state
            .operations
            .iter()
            .filter(|op| op.status == OperationStatus::Pending)
            .count()
    }

    pub fn total_count(&self) -> usize {
        self.shared.state.lock().unwrap().operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_count() == 0
    }

    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().unwrap().paused
    }

    pub fn is_processing(&self) -> bool {
        self.shared.state.lock().unwrap().processing
    }

    /// Mean progress over the live array, in [0, 100]. 100 when empty.
    pub fn overall_progress(&self) -> f32 {
        let state = self.shared.state.lock().unwrap();
        if state.operations.is_empty() {
            return 100.0;
        }
        let sum: f32 = state
            .operations
            .iter()
            .map(|op| match op.status {
                OperationStatus::Completed | OperationStatus::Cancelled => 100.0,
                _ => op.progress_percent,
            })
            .sum();
        (sum / state.operations.len() as f32).clamp(0.0, 100.0)
    }

    /// Completion history, oldest first.
    pub fn history(&self) -> Vec<QueuedOperation> {
        let state = self.shared.state.lock().unwrap();
        state.history.iter().cloned().collect()
    }
}

impl Drop for OperationQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Worker ──────────────────────────────────────────────────────────

fn worker_loop(shared: Arc<OpsShared>) {
    info!("operation queue worker started");
    loop {
        let job = {
            let mut state = shared.state.lock().unwrap();
            if state.shutdown {
                break;
            }
            if state.paused {
                None
            } else {
                let now = now_secs();
                let next = state
                    .operations
                    .iter_mut()
                    .find(|op| op.status == OperationStatus::Pending);
                if let Some(op) = next {
                    op.status = OperationStatus::InProgress;
                    op.started_at = Some(now);
                    let snapshot = op.clone();
                    state.current = Some(snapshot.id);
                    state.processing = true;
                    Some(snapshot)
                } else {
                    None
                }
            }
        };

        match job {
            Some(op) => {
                // Execute outside the lock so enqueues never stall
                let outcome = execute(&shared, &op);

                let mut state = shared.state.lock().unwrap();
                if let Some(live) = state.operations.iter_mut().find(|o| o.id == op.id) {
                    live.completed_at = Some(now_secs());
                    match outcome {
                        Ok(()) => {
                            live.status = OperationStatus::Completed;
                            live.processed_bytes = live.total_bytes;
                            live.progress_percent = 100.0;
                        }
                        Err((kind, message)) => {
                            warn!(id = live.id, "operation failed: {message}");
                            live.status = OperationStatus::Failed;
                            live.error_kind = Some(kind);
                            live.error_message = Some(message);
                            live.retryable = true;
                        }
                    }
                    let record = live.clone();
                    if state.history.len() >= HISTORY_CAP {
                        state.history.pop_front();
                    }
                    state.history.push_back(record);
                }
                state.current = None;
                state.processing = false;
            }
            None => std::thread::sleep(WORKER_POLL),
        }
    }
    info!("operation queue worker exiting");
}

type OpOutcome = Result<(), (OperationErrorKind, String)>;

fn execute(shared: &Arc<OpsShared>, op: &QueuedOperation) -> OpOutcome {
    match op.kind {
        OperationKind::Copy => exec_copy(shared, op, &op.dest_path),
        OperationKind::Move => exec_move(shared, op),
        OperationKind::Delete => exec_delete(op),
        OperationKind::Rename => exec_rename(op),
        OperationKind::CreateDir => exec_create_dir(op),
        OperationKind::Duplicate => {
            let parent = op
                .source_path
                .parent()
                .ok_or((OperationErrorKind::Invalid, "source has no parent".to_string()))?
                .to_path_buf();
            exec_copy(shared, op, &parent)
        }
    }
}

fn exec_copy(shared: &Arc<OpsShared>, op: &QueuedOperation, dest_dir: &Path) -> OpOutcome {
    let name = source_name(&op.source_path)?;
    let dest = unique_dest_path(dest_dir, &name);
    let mut progress = ProgressSink {
        shared,
        id: op.id,
        total: op.total_bytes,
        processed: 0,
    };
    copy_recursive(&op.source_path, &dest, &mut progress).map_err(classify)
}

fn exec_move(shared: &Arc<OpsShared>, op: &QueuedOperation) -> OpOutcome {
    let name = source_name(&op.source_path)?;
    let dest = unique_dest_path(&op.dest_path, &name);

    // Same-device fast path; cross-device falls back to copy + unlink
    if fs::rename(&op.source_path, &dest).is_ok() {
        return Ok(());
    }
    let mut progress = ProgressSink {
        shared,
        id: op.id,
        total: op.total_bytes,
        processed: 0,
    };
    copy_recursive(&op.source_path, &dest, &mut progress).map_err(classify)?;
    remove_recursive(&op.source_path).map_err(classify)
}

fn exec_delete(op: &QueuedOperation) -> OpOutcome {
    remove_recursive(&op.source_path).map_err(classify)
}

fn exec_rename(op: &QueuedOperation) -> OpOutcome {
    let new_name = op.dest_path.to_string_lossy();
    if new_name.is_empty() || new_name.contains(std::path::MAIN_SEPARATOR) || new_name.contains('/')
    {
        return Err((
            OperationErrorKind::Invalid,
            format!("invalid name: {new_name}"),
        ));
    }
    let parent = op
        .source_path
        .parent()
        .ok_or((OperationErrorKind::Invalid, "source has no parent".to_string()))?;
    let dest = parent.join(new_name.as_ref());
    if dest.exists() {
        return Err((
            OperationErrorKind::Exists,
            format!("{} already exists", dest.display()),
        ));
    }
    fs::rename(&op.source_path, &dest).map_err(classify)
}

fn exec_create_dir(op: &QueuedOperation) -> OpOutcome {
    fs::create_dir(&op.dest_path).map_err(classify)
}

// ── Filesystem helpers ──────────────────────────────────────────────

struct ProgressSink<'a> {
    shared: &'a Arc<OpsShared>,
    id: u64,
    total: u64,
    processed: u64,
}

impl ProgressSink<'_> {
    fn add(&mut self, bytes: u64) {
        self.processed += bytes;
        let mut state = self.shared.state.lock().unwrap();
        if let Some(op) = state.operations.iter_mut().find(|o| o.id == self.id) {
            op.processed_bytes = self.processed;
            if self.total > 0 {
                op.progress_percent =
                    ((self.processed as f64 / self.total as f64) * 100.0).min(100.0) as f32;
            }
        }
    }
}

fn copy_recursive(src: &Path, dest: &Path, progress: &mut ProgressSink) -> std::io::Result<()> {
    let meta = fs::symlink_metadata(src)?;
    if meta.is_dir() {
        fs::create_dir_all(dest)?;
        for dirent in fs::read_dir(src)? {
            let dirent = dirent?;
            copy_recursive(&dirent.path(), &dest.join(dirent.file_name()), progress)?;
        }
        Ok(())
    } else {
        copy_file(src, dest, progress)
    }
}

fn copy_file(src: &Path, dest: &Path, progress: &mut ProgressSink) -> std::io::Result<()> {
    let mut reader = fs::File::open(src)?;
    let mut writer = fs::File::create(dest)?;
    let mut buf = vec![0u8; COPY_BLOCK];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
        progress.add(n as u64);
    }
    writer.flush()
}

fn remove_recursive(path: &Path) -> std::io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Total size of a file or directory tree; 0 when it cannot be walked,
/// in which case progress jumps from 0 to 100 on completion.
fn walk_size(path: &Path) -> u64 {
    fn inner(path: &Path) -> std::io::Result<u64> {
        let meta = fs::symlink_metadata(path)?;
        if !meta.is_dir() {
            return Ok(meta.len());
        }
        let mut sum = 0;
        for dirent in fs::read_dir(path)? {
            sum += inner(&dirent?.path())?;
        }
        Ok(sum)
    }
    inner(path).unwrap_or(0)
}

/// First free name in `dir`: `name`, then `name (1)`, `name (2)`, …
fn unique_dest_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string());
    let ext = path.extension().map(|e| e.to_string_lossy().to_string());

    for n in 1u32.. {
        let fname = match &ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = dir.join(fname);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!()
}

fn source_name(path: &Path) -> Result<String, (OperationErrorKind, String)> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or((
            OperationErrorKind::Invalid,
            format!("no basename: {}", path.display()),
        ))
}

fn classify(e: std::io::Error) -> (OperationErrorKind, String) {
    let kind = match e.kind() {
        ErrorKind::NotFound => OperationErrorKind::NotFound,
        ErrorKind::PermissionDenied => OperationErrorKind::Permission,
        ErrorKind::AlreadyExists => OperationErrorKind::Exists,
        ErrorKind::InvalidInput => OperationErrorKind::Invalid,
        ErrorKind::StorageFull => OperationErrorKind::DiskFull,
        _ => OperationErrorKind::Unknown,
    };
    (kind, e.to_string())
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
