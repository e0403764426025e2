//! Indexer worker thread: scan, drain, watch.

use super::{ChangeEvent, ChangeKind, IndexerStatus, Shared, VectorStore};
use crate::config::IndexerConfig;
use crate::entry::FileEntry;
use crate::filter::FilterPolicy;
use crate::summary::FileType;
use ignore::WalkBuilder;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Content read cap when producing embeddings
const EMBED_CONTENT_CAP: u64 = 32 * 1024;
/// Timed wait while idle so change events and stop requests wake us
const IDLE_WAIT: Duration = Duration::from_secs(1);
const PAUSE_POLL: Duration = Duration::from_millis(200);

pub(super) fn run(shared: Arc<Shared>) {
    let (store, embedder, change_rx, config) = {
        let state = shared.state.lock().unwrap();
        (
            state.store.clone(),
            state.embedder.clone(),
            state.change_rx.clone(),
            state.config.clone(),
        )
    };
    let Some(store) = store else {
        // start() refuses to spawn without a store
        return;
    };

    info!(watch_dirs = config.watch_dirs.len(), "indexer worker started");

    let policy = match super::policy_for(&config) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            warn!("indexer exclude patterns invalid: {e}");
            let mut state = shared.state.lock().unwrap();
            state.status = IndexerStatus::Error;
            state.thread_running = false;
            return;
        }
    };

    // Phase 1: initial scan enqueues every eligible file
    for root in &config.watch_dirs {
        if !scan_root(&shared, root, &config, &policy) {
            return; // stop requested mid-scan
        }
    }
    {
        let mut state = shared.state.lock().unwrap();
        state.initial_scan_complete = true;
        debug!(pending = state.queue.len(), "initial scan complete");
    }

    // Phase 2: drain the queue; once empty, watch for change events
    let mut since_sleep = 0usize;
    loop {
        if let Some(rx) = &change_rx {
            while let Ok(event) = rx.try_recv() {
                handle_event(&shared, store.as_ref(), event);
            }
        }

        let next = {
            let mut state = shared.state.lock().unwrap();
            if !state.thread_running {
                break;
            }
            if state.status == IndexerStatus::Paused {
                let (guard, _) = shared.cond.wait_timeout(state, PAUSE_POLL).unwrap();
                drop(guard);
                continue;
            }
            state.queue.pop_front()
        };

        match next {
            Some(path) => {
                process_one(&shared, store.as_ref(), embedder.as_deref(), &path);
                since_sleep += 1;
                if since_sleep >= config.batch_size.max(1) {
                    since_sleep = 0;
                    if config.delay_between_batches_ms > 0 {
                        std::thread::sleep(Duration::from_millis(config.delay_between_batches_ms));
                    }
                }
            }
            None => {
                {
                    let mut state = shared.state.lock().unwrap();
                    if !state.thread_running {
                        break;
                    }
                    if state.status == IndexerStatus::Running
                        && state.config.enable_fsevents
                        && state.change_rx.is_some()
                    {
                        state.status = IndexerStatus::Watching;
                        debug!("queue drained, watching for changes");
                    }
                }
                match &change_rx {
                    Some(rx) => {
                        if let Ok(event) = rx.recv_timeout(IDLE_WAIT) {
                            handle_event(&shared, store.as_ref(), event);
                        }
                    }
                    None => {
                        let state = shared.state.lock().unwrap();
                        if !state.thread_running {
                            break;
                        }
                        let _ = shared.cond.wait_timeout(state, IDLE_WAIT);
                    }
                }
            }
        }
    }

    info!("indexer worker exiting");
}

/// Traverse one watch root, enqueueing eligible files. Returns false
/// when stop was requested.
fn scan_root(
    shared: &Arc<Shared>,
    root: &Path,
    config: &IndexerConfig,
    policy: &Arc<FilterPolicy>,
) -> bool {
    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .hidden(false)
        .follow_links(false);
    if !config.recursive {
        builder.max_depth(Some(1));
    }
    // Excluded directories are pruned, not entered; each prune counts
    // as a single skip, not one per child
    let filter_policy = Arc::clone(policy);
    let filter_shared = Arc::clone(shared);
    builder.filter_entry(move |dirent| match dirent.file_type() {
        Some(ft) if ft.is_dir() => {
            if filter_policy.is_excluded(dirent.path()) {
                filter_shared.state.lock().unwrap().files_skipped += 1;
                false
            } else {
                true
            }
        }
        _ => true,
    });

    for result in builder.build() {
        // Yield to pause and stop at every iteration
        {
            let mut state = shared.state.lock().unwrap();
            if !state.thread_running {
                return false;
            }
            while state.status == IndexerStatus::Paused && state.thread_running {
                state = shared.cond.wait(state).unwrap();
            }
            if !state.thread_running {
                return false;
            }
        }

        let dirent = match result {
            Ok(d) => d,
            Err(_) => continue,
        };
        if dirent.file_type().map(|ft| ft.is_dir()).unwrap_or(true) {
            continue;
        }
        let path = dirent.path();
        let meta = match std::fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(_) => {
                bump_skip(shared);
                continue;
            }
        };
        if policy.should_index(path, &meta) {
            let mut state = shared.state.lock().unwrap();
            state.queue.push_back(path.to_path_buf());
            shared.cond.notify_all();
        } else {
            bump_skip(shared);
        }
    }
    true
}

/// Eligible files under `root`, for reindex_directory. No pause/stop
/// handling; runs on the calling thread.
pub(super) fn collect_eligible(
    root: &Path,
    config: &IndexerConfig,
    policy: &FilterPolicy,
) -> Vec<PathBuf> {
    let policy = Arc::new(policy.clone());
    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .hidden(false)
        .follow_links(false);
    if !config.recursive {
        builder.max_depth(Some(1));
    }
    let filter_policy = Arc::clone(&policy);
    builder.filter_entry(move |dirent| match dirent.file_type() {
        Some(ft) if ft.is_dir() => !filter_policy.is_excluded(dirent.path()),
        _ => true,
    });

    let mut files = Vec::new();
    for result in builder.build() {
        let Ok(dirent) = result else { continue };
        if dirent.file_type().map(|ft| ft.is_dir()).unwrap_or(true) {
            continue;
        }
        let path = dirent.path();
        if let Ok(meta) = std::fs::symlink_metadata(path) {
            if policy.should_index(path, &meta) {
                files.push(path.to_path_buf());
            }
        }
    }
    files
}

/// Index one dequeued path. Per-item failures bump the skip counter and
/// never kill the worker.
fn process_one(
    shared: &Arc<Shared>,
    store: &dyn VectorStore,
    embedder: Option<&dyn super::Embedder>,
    path: &Path,
) {
    let started = Instant::now();

    let meta = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) => {
            debug!("skip {}: {e}", path.display());
            bump_skip(shared);
            return;
        }
    };
    let eligible = {
        let state = shared.state.lock().unwrap();
        state.policy.should_index(path, &meta)
    };
    if !eligible {
        bump_skip(shared);
        return;
    }

    let entry = FileEntry::from_metadata(path, &meta);
    if store.is_indexed(path, entry.modified) {
        bump_skip(shared);
        return;
    }

    let mut embedding = None;
    if let Some(embedder) = embedder {
        if matches!(FileType::detect(path), FileType::Text | FileType::Code) {
            match read_capped(path, EMBED_CONTENT_CAP) {
                Ok(text) => match embedder.embed(&text) {
                    Ok(vector) => embedding = Some(vector),
                    Err(e) => warn!("embedding failed for {}: {e}", path.display()),
                },
                Err(e) => debug!("embed read failed for {}: {e}", path.display()),
            }
        }
    }

    match store.index(&entry, embedding) {
        Ok(()) => {
            let mut state = shared.state.lock().unwrap();
            state.files_indexed += 1;
            state.total_bytes += entry.size;
            state.busy_ms += started.elapsed().as_secs_f64() * 1000.0;
        }
        Err(e) => {
            warn!("store.index failed for {}: {e}", path.display());
            bump_skip(shared);
        }
    }
}

/// Apply one change event. Directories are ignored; their contents
/// arrive as their own events.
fn handle_event(shared: &Arc<Shared>, store: &dyn VectorStore, event: ChangeEvent) {
    if event.is_dir {
        return;
    }
    match event.kind {
        ChangeKind::Created | ChangeKind::Modified => enqueue_if_eligible(shared, &event.path),
        ChangeKind::Deleted => {
            if let Err(e) = store.delete(&event.path) {
                warn!("store.delete failed for {}: {e}", event.path.display());
            }
        }
        ChangeKind::Renamed => {
            if event.path.exists() {
                enqueue_if_eligible(shared, &event.path);
            } else if let Err(e) = store.delete(&event.path) {
                warn!("store.delete failed for {}: {e}", event.path.display());
            }
        }
    }
}

fn enqueue_if_eligible(shared: &Arc<Shared>, path: &Path) {
    let Ok(meta) = std::fs::symlink_metadata(path) else {
        return;
    };
    let mut state = shared.state.lock().unwrap();
    if state.policy.should_index(path, &meta) {
        state.queue.push_back(path.to_path_buf());
        shared.cond.notify_all();
    }
}

fn bump_skip(shared: &Arc<Shared>) {
    shared.state.lock().unwrap().files_skipped += 1;
}

fn read_capped(path: &Path, cap: u64) -> std::io::Result<String> {
    let file = std::fs::File::open(path)?;
    let mut buf = Vec::new();
    file.take(cap).read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
