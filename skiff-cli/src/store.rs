//! SQLite-backed `VectorStore` used by the `index` subcommand.

use rusqlite::{params, Connection, OptionalExtension};
use skiff_core::index::VectorStore;
use skiff_core::{FileEntry, SkiffError};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

/// File metadata plus optional embedding, one row per path. The
/// connection lives behind a mutex so the store satisfies the
/// `Send + Sync` collaborator contract.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &str) -> skiff_core::Result<Self> {
        let path = skiff_core::config::expand_tilde(db_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS files (
                path TEXT PRIMARY KEY,
                size INTEGER NOT NULL,
                modified INTEGER NOT NULL,
                extension TEXT NOT NULL,
                embedding BLOB
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn file_count(&self) -> skiff_core::Result<usize> {
        let conn = self.conn.lock().map_err(poisoned)?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl VectorStore for SqliteStore {
    fn is_indexed(&self, path: &Path, mtime: i64) -> bool {
        let Ok(conn) = self.conn.lock() else {
            return false;
        };
        let stored: Option<i64> = conn
            .query_row(
                "SELECT modified FROM files WHERE path = ?1",
                params![path.to_string_lossy()],
                |row| row.get(0),
            )
            .optional()
            .ok()
            .flatten();
        stored == Some(mtime)
    }

    fn index(&self, entry: &FileEntry, embedding: Option<Vec<f32>>) -> skiff_core::Result<()> {
        let blob = embedding.map(|vector| {
            let mut bytes = Vec::with_capacity(vector.len() * 4);
            for value in vector {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
            bytes
        });
        let conn = self.conn.lock().map_err(poisoned)?;
        conn.execute(
            "INSERT OR REPLACE INTO files (path, size, modified, extension, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.path.to_string_lossy(),
                entry.size,
                entry.modified,
                entry.extension,
                blob,
            ],
        )?;
        Ok(())
    }

    fn delete(&self, path: &Path) -> skiff_core::Result<()> {
        let conn = self.conn.lock().map_err(poisoned)?;
        conn.execute(
            "DELETE FROM files WHERE path = ?1",
            params![path.to_string_lossy()],
        )?;
        Ok(())
    }

    fn delete_subtree(&self, prefix: &Path) -> skiff_core::Result<()> {
        let prefix = prefix.to_string_lossy();
        let conn = self.conn.lock().map_err(poisoned)?;
        conn.execute(
            "DELETE FROM files WHERE path = ?1 OR path LIKE ?2",
            params![prefix, format!("{}/%", prefix.trim_end_matches('/'))],
        )?;
        Ok(())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> SkiffError {
    SkiffError::Api("store mutex poisoned".to_string())
}
