//! Persistent summary cache keyed by path, validated against content.

use super::{FileType, SummaryResult, SummaryStatus};
use crate::config::{expand_tilde, SummaryLevel};
use crate::hash::sha256_file;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const SCHEMA_VERSION: i32 = 1;

/// SQLite-backed cache of generated summaries. One row per path. A row
/// is served only when the file's mtime, size, and SHA-256 all still
/// match what was recorded at `put` time.
///
/// The handle is not internally synchronized; callers wrap it in a
/// mutex when sharing across threads.
pub struct SummaryCache {
    conn: Connection,
}

impl SummaryCache {
    /// Open (or create) the cache at `cache_path`, expanding a leading
    /// `~` and creating parent directories as needed.
    pub fn open(cache_path: &str) -> crate::Result<Self> {
        let path = expand_tilde(cache_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        Self::init(conn)
    }

    /// In-memory cache, used by tests and ephemeral sessions.
    pub fn open_in_memory() -> crate::Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> crate::Result<Self> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        // An old schema is just a cold cache; rebuild it
        let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if version != 0 && version != SCHEMA_VERSION {
            debug!("summary cache schema v{version}, rebuilding as v{SCHEMA_VERSION}");
            conn.execute_batch("DROP TABLE IF EXISTS summaries;")?;
        }

        conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS summaries (
                path TEXT PRIMARY KEY,
                hash TEXT NOT NULL,
                summary TEXT NOT NULL,
                level INTEGER NOT NULL,
                created INTEGER NOT NULL,
                file_modified INTEGER NOT NULL,
                file_size INTEGER NOT NULL
            );

            PRAGMA user_version = {SCHEMA_VERSION};
            "
        ))?;
        Ok(Self { conn })
    }

    /// Look up a summary for `path`. Returns None on miss or when the
    /// on-disk file no longer matches the recorded mtime, size, and
    /// hash. A stale row is left in place; `put` will replace it.
    pub fn get(&self, path: &Path) -> crate::Result<Option<SummaryResult>> {
        let key = path.to_string_lossy();
        let row: Option<(String, String, i64, i64, u64)> = self
            .conn
            .query_row(
                "SELECT hash, summary, level, file_modified, file_size
                 FROM summaries WHERE path = ?1",
                params![key],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((stored_hash, summary, level, file_modified, file_size)) = row else {
            return Ok(None);
        };

        let Ok(meta) = fs::metadata(path) else {
            return Ok(None);
        };
        if mtime_secs(&meta) != file_modified || meta.len() != file_size {
            debug!("cache stale (mtime/size) for {}", path.display());
            return Ok(None);
        }
        // mtime and size can match a rewritten file; the hash cannot
        if sha256_file(path)? != stored_hash {
            debug!("cache stale (hash) for {}", path.display());
            return Ok(None);
        }

        Ok(Some(SummaryResult {
            path: path.to_path_buf(),
            summary_text: summary,
            file_type: FileType::detect(path),
            level: SummaryLevel::from_int(level).unwrap_or(SummaryLevel::Standard),
            from_cache: true,
            generation_ms: 0,
            tokens_used: 0,
            status: SummaryStatus::Ok,
            error_message: None,
        }))
    }

    /// Store `result`, replacing any existing row for its path. The
    /// file is re-hashed and re-stat'd so the row matches the content
    /// that was actually summarized.
    pub fn put(&self, result: &SummaryResult) -> crate::Result<()> {
        let meta = fs::metadata(&result.path)?;
        let hash = sha256_file(&result.path)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO summaries
             (path, hash, summary, level, created, file_modified, file_size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                result.path.to_string_lossy(),
                hash,
                result.summary_text,
                result.level.as_int(),
                now_secs(),
                mtime_secs(&meta),
                meta.len(),
            ],
        )?;
        Ok(())
    }

    pub fn invalidate(&self, path: &Path) -> crate::Result<()> {
        self.conn.execute(
            "DELETE FROM summaries WHERE path = ?1",
            params![path.to_string_lossy()],
        )?;
        Ok(())
    }

    pub fn clear(&self) -> crate::Result<()> {
        self.conn.execute("DELETE FROM summaries", [])?;
        Ok(())
    }

    /// Delete rows older than `max_age_days`; returns how many went.
    pub fn purge_older_than(&self, max_age_days: u32) -> crate::Result<usize> {
        let cutoff = now_secs() - i64::from(max_age_days) * 86_400;
        let removed = self
            .conn
            .execute("DELETE FROM summaries WHERE created < ?1", params![cutoff])?;
        Ok(removed)
    }

    pub fn len(&self) -> crate::Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM summaries", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> crate::Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn mtime_secs(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
