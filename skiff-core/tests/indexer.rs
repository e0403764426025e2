//! End-to-end indexer scenarios against an in-memory store.

use crossbeam_channel::unbounded;
use skiff_core::index::{ChangeEvent, ChangeKind, Embedder, VectorStore};
use skiff_core::{FileEntry, Indexer, IndexerStatus, SkiffError};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[derive(Default)]
struct MemoryStore {
    rows: Mutex<HashMap<PathBuf, (i64, Option<Vec<f32>>)>>,
}

impl MemoryStore {
    fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.rows.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }

    fn contains(&self, path: &Path) -> bool {
        self.rows.lock().unwrap().contains_key(path)
    }

    fn embedding_of(&self, path: &Path) -> Option<Vec<f32>> {
        self.rows.lock().unwrap().get(path).and_then(|r| r.1.clone())
    }
}

impl VectorStore for MemoryStore {
    fn is_indexed(&self, path: &Path, mtime: i64) -> bool {
        self.rows
            .lock()
            .unwrap()
            .get(path)
            .map(|(stored, _)| *stored == mtime)
            .unwrap_or(false)
    }

    fn index(&self, entry: &FileEntry, embedding: Option<Vec<f32>>) -> skiff_core::Result<()> {
        self.rows
            .lock()
            .unwrap()
            .insert(entry.path.clone(), (entry.modified, embedding));
        Ok(())
    }

    fn delete(&self, path: &Path) -> skiff_core::Result<()> {
        self.rows.lock().unwrap().remove(path);
        Ok(())
    }

    fn delete_subtree(&self, prefix: &Path) -> skiff_core::Result<()> {
        self.rows
            .lock()
            .unwrap()
            .retain(|path, _| !path.starts_with(prefix));
        Ok(())
    }
}

struct UnitEmbedder;

impl Embedder for UnitEmbedder {
    fn embed(&self, _text: &str) -> skiff_core::Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }
}

fn config_for(root: &Path) -> skiff_core::IndexerConfig {
    skiff_core::IndexerConfig {
        watch_dirs: vec![root.to_path_buf()],
        delay_between_batches_ms: 0,
        ..Default::default()
    }
}

fn wait_until(deadline_secs: u64, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(deadline_secs);
    while !done() {
        assert!(Instant::now() < deadline, "timed out");
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn fixture() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("project");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("main.rs"), "fn main() {}").unwrap();
    fs::write(root.join("notes.txt"), "hello").unwrap();
    fs::write(root.join(".env"), "SECRET=1").unwrap();
    fs::create_dir(root.join(".git")).unwrap();
    fs::write(root.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
    fs::create_dir(root.join("node_modules")).unwrap();
    fs::write(root.join("node_modules/pkg.js"), "module.exports = {}").unwrap();
    (dir, root)
}

#[test]
fn test_initial_scan_indexes_only_eligible_files() {
    let (_dir, root) = fixture();
    let store = Arc::new(MemoryStore::default());

    let mut indexer = Indexer::new(config_for(&root)).unwrap();
    indexer.set_store(Arc::clone(&store) as Arc<dyn VectorStore>);
    indexer.start().unwrap();

    wait_until(10, || {
        indexer.is_scan_complete() && indexer.get_stats().files_pending == 0
    });
    indexer.stop();

    let stats = indexer.get_stats();
    assert_eq!(stats.files_indexed, 2);
    assert!(stats.files_skipped >= 1, "hidden file should be skipped");
    assert_eq!(
        store.paths(),
        vec![root.join("main.rs"), root.join("notes.txt")]
    );
    assert_eq!(indexer.status(), IndexerStatus::Stopped);
}

#[test]
fn test_pruned_directories_count_one_skip_each() {
    let (_dir, root) = fixture();
    let store = Arc::new(MemoryStore::default());

    let mut indexer = Indexer::new(config_for(&root)).unwrap();
    indexer.set_store(Arc::clone(&store) as Arc<dyn VectorStore>);
    indexer.start().unwrap();
    wait_until(10, || {
        indexer.is_scan_complete() && indexer.get_stats().files_pending == 0
    });
    indexer.stop();

    // One skip each for .env (hidden), .git and node_modules (pruned
    // directories); nothing inside a pruned directory is visited
    assert_eq!(indexer.get_stats().files_skipped, 3);
    assert!(!store.contains(&root.join(".git/HEAD")));
    assert!(!store.contains(&root.join("node_modules/pkg.js")));
}

#[test]
fn test_elapsed_frozen_after_stop() {
    let (_dir, root) = fixture();
    let mut indexer = Indexer::new(config_for(&root)).unwrap();
    indexer.set_store(Arc::new(MemoryStore::default()));
    indexer.start().unwrap();
    wait_until(10, || {
        indexer.is_scan_complete() && indexer.get_stats().files_pending == 0
    });
    indexer.stop();

    let first = indexer.get_stats().elapsed_seconds;
    std::thread::sleep(Duration::from_millis(50));
    let second = indexer.get_stats().elapsed_seconds;
    assert!(first > 0.0);
    assert_eq!(first, second);
}

#[test]
fn test_start_requires_store_and_rejects_double_start() {
    let (_dir, root) = fixture();
    let mut indexer = Indexer::new(config_for(&root)).unwrap();
    assert!(matches!(indexer.start(), Err(SkiffError::NoStore)));

    indexer.set_store(Arc::new(MemoryStore::default()));
    indexer.start().unwrap();
    assert!(matches!(indexer.start(), Err(SkiffError::AlreadyRunning)));
    indexer.stop();
    indexer.stop(); // idempotent
}

#[test]
fn test_change_events_update_the_store() {
    let (_dir, root) = fixture();
    let store = Arc::new(MemoryStore::default());
    let (tx, rx) = unbounded::<ChangeEvent>();

    let mut indexer = Indexer::new(config_for(&root)).unwrap();
    indexer.set_store(Arc::clone(&store) as Arc<dyn VectorStore>);
    indexer.set_change_source(rx);
    indexer.start().unwrap();
    wait_until(10, || {
        indexer.is_scan_complete() && indexer.get_stats().files_pending == 0
    });

    // Create: indexed once the event is delivered
    let new_file = root.join("added.txt");
    fs::write(&new_file, "late arrival").unwrap();
    tx.send(ChangeEvent {
        kind: ChangeKind::Created,
        path: new_file.clone(),
        is_dir: false,
    })
    .unwrap();
    wait_until(10, || store.contains(&new_file));
    // No rescan happened, the event alone grew the count
    assert_eq!(indexer.get_stats().files_indexed, 3);

    // Delete: dropped from the store
    let victim = root.join("notes.txt");
    fs::remove_file(&victim).unwrap();
    tx.send(ChangeEvent {
        kind: ChangeKind::Deleted,
        path: victim.clone(),
        is_dir: false,
    })
    .unwrap();
    wait_until(10, || !store.contains(&victim));

    // Rename where the path no longer exists behaves like a delete
    let gone = root.join("main.rs");
    fs::remove_file(&gone).unwrap();
    tx.send(ChangeEvent {
        kind: ChangeKind::Renamed,
        path: gone.clone(),
        is_dir: false,
    })
    .unwrap();
    wait_until(10, || !store.contains(&gone));

    // Events for excluded paths are ignored
    let excluded = root.join("node_modules/other.js");
    fs::write(&excluded, "x").unwrap();
    tx.send(ChangeEvent {
        kind: ChangeKind::Created,
        path: excluded.clone(),
        is_dir: false,
    })
    .unwrap();
    std::thread::sleep(Duration::from_millis(200));
    assert!(!store.contains(&excluded));

    indexer.stop();
}

#[test]
fn test_watching_status_after_drain() {
    let (_dir, root) = fixture();
    let (_tx, rx) = unbounded::<ChangeEvent>();

    let mut indexer = Indexer::new(config_for(&root)).unwrap();
    indexer.set_store(Arc::new(MemoryStore::default()));
    indexer.set_change_source(rx);
    indexer.start().unwrap();

    wait_until(10, || indexer.status() == IndexerStatus::Watching);
    indexer.stop();
}

#[test]
fn test_pause_blocks_and_resume_continues() {
    let (_dir, root) = fixture();
    let store = Arc::new(MemoryStore::default());

    let mut indexer = Indexer::new(config_for(&root)).unwrap();
    indexer.set_store(Arc::clone(&store) as Arc<dyn VectorStore>);
    indexer.start().unwrap();
    indexer.pause();
    assert_eq!(indexer.status(), IndexerStatus::Paused);

    indexer.resume();
    wait_until(10, || {
        indexer.is_scan_complete() && indexer.get_stats().files_pending == 0
    });
    indexer.stop();
    assert_eq!(indexer.get_stats().files_indexed, 2);
}

#[test]
fn test_embedder_runs_for_text_and_code_only() {
    let (_dir, root) = fixture();
    fs::write(root.join("archive.tar"), vec![0u8; 16]).unwrap();
    let store = Arc::new(MemoryStore::default());

    let mut indexer = Indexer::new(config_for(&root)).unwrap();
    indexer.set_store(Arc::clone(&store) as Arc<dyn VectorStore>);
    indexer.set_embedder(Some(Arc::new(UnitEmbedder)));
    indexer.start().unwrap();
    wait_until(10, || {
        indexer.is_scan_complete() && indexer.get_stats().files_pending == 0
    });
    indexer.stop();

    assert_eq!(
        store.embedding_of(&root.join("main.rs")),
        Some(vec![1.0, 0.0])
    );
    assert_eq!(
        store.embedding_of(&root.join("notes.txt")),
        Some(vec![1.0, 0.0])
    );
    // Unknown type still indexed, but without an embedding
    assert!(store.contains(&root.join("archive.tar")));
    assert_eq!(store.embedding_of(&root.join("archive.tar")), None);
}

#[test]
fn test_reindex_directory_rebuilds_subtree() {
    let (_dir, root) = fixture();
    let sub = root.join("docs");
    fs::create_dir(&sub).unwrap();
    fs::write(sub.join("guide.md"), "# guide").unwrap();
    let store = Arc::new(MemoryStore::default());

    let mut indexer = Indexer::new(config_for(&root)).unwrap();
    indexer.set_store(Arc::clone(&store) as Arc<dyn VectorStore>);
    indexer.start().unwrap();
    wait_until(10, || {
        indexer.is_scan_complete() && indexer.get_stats().files_pending == 0
    });
    assert!(store.contains(&sub.join("guide.md")));

    fs::write(sub.join("extra.md"), "# extra").unwrap();
    indexer.reindex_directory(&sub).unwrap();
    wait_until(10, || store.contains(&sub.join("extra.md")));
    assert!(store.contains(&sub.join("guide.md")));
    indexer.stop();
}

#[test]
fn test_reindex_file_restores_row() {
    let (_dir, root) = fixture();
    let store = Arc::new(MemoryStore::default());

    let mut indexer = Indexer::new(config_for(&root)).unwrap();
    indexer.set_store(Arc::clone(&store) as Arc<dyn VectorStore>);
    indexer.start().unwrap();
    wait_until(10, || {
        indexer.is_scan_complete() && indexer.get_stats().files_pending == 0
    });

    let skipped_before = indexer.get_stats().files_skipped;
    let target = root.join("main.rs");
    indexer.reindex_file(&target).unwrap();
    wait_until(10, || store.contains(&target));
    indexer.stop();

    let stats = indexer.get_stats();
    assert!(stats.files_skipped >= skipped_before);
    assert!(stats.progress > 0.99);
}
