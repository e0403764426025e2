//! File entries and directory snapshots

use serde::{Deserialize, Serialize};
use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Per-file version-control status, supplied by an external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsStatus {
    #[default]
    None,
    Untracked,
    Modified,
    Staged,
    Deleted,
    Renamed,
    Conflict,
    Ignored,
}

/// A single directory entry. Immutable within the snapshot that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub name: String,
    /// Lower-case suffix without the dot; empty when absent
    pub extension: String,
    pub is_directory: bool,
    pub is_hidden: bool,
    pub is_symlink: bool,
    pub size: u64,
    /// Seconds since the UNIX epoch
    pub modified: i64,
    pub created: i64,
    /// POSIX permission bits (0 where unavailable)
    pub permissions: u32,
    pub vcs_status: VcsStatus,
}

impl FileEntry {
    /// Build an entry from an lstat-style metadata call on `path`.
    pub fn from_path(path: &Path) -> crate::Result<Self> {
        let meta = std::fs::symlink_metadata(path)?;
        Ok(Self::from_metadata(path, &meta))
    }

    pub fn from_metadata(path: &Path, meta: &Metadata) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        Self {
            path: path.to_path_buf(),
            is_hidden: name.starts_with('.'),
            is_directory: meta.is_dir(),
            is_symlink: meta.file_type().is_symlink(),
            size: meta.len(),
            modified: system_time_secs(meta.modified().ok()),
            created: system_time_secs(meta.created().ok()),
            permissions: permission_bits(meta),
            vcs_status: VcsStatus::None,
            name,
            extension,
        }
    }
}

/// Sort orders for a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Size,
    Modified,
    /// Directories before files, then by name
    Type,
}

/// A consistent enumeration of one directory at a point in time.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    pub path: PathBuf,
    pub entries: Vec<FileEntry>,
    /// Human-readable message when a partial failure occurred
    pub error: Option<String>,
}

impl DirectorySnapshot {
    /// Sort entries in place. `Type` ignores `ascending` for the
    /// directory-first partition and applies it to the name tiebreak.
    pub fn sort(&mut self, by: SortKey, ascending: bool) {
        self.entries.sort_by(|a, b| {
            let ord = match by {
                SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
                SortKey::Size => a.size.cmp(&b.size),
                SortKey::Modified => a.modified.cmp(&b.modified),
                SortKey::Type => b
                    .is_directory
                    .cmp(&a.is_directory)
                    .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase())),
            };
            if ascending || by == SortKey::Type {
                ord
            } else {
                ord.reverse()
            }
        });
    }
}

/// Reads directories into flat snapshots.
pub struct DirectoryReader;

impl DirectoryReader {
    /// Enumerate `path`, skipping `.` and `..`. Entry order is whatever
    /// the OS returns. Entries whose metadata cannot be read are dropped
    /// and noted on the snapshot.
    pub fn read(path: &Path) -> crate::Result<DirectorySnapshot> {
        let read_dir = std::fs::read_dir(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => crate::SkiffError::FileNotFound(path.to_path_buf()),
            _ => crate::SkiffError::Io(e),
        })?;

        let mut snapshot = DirectorySnapshot {
            path: path.to_path_buf(),
            ..Default::default()
        };
        let mut failed = 0usize;

        for dirent in read_dir {
            let dirent = match dirent {
                Ok(d) => d,
                Err(_) => {
                    failed += 1;
                    continue;
                }
            };
            let entry_path = dirent.path();
            match std::fs::symlink_metadata(&entry_path) {
                Ok(meta) => snapshot
                    .entries
                    .push(FileEntry::from_metadata(&entry_path, &meta)),
                Err(_) => failed += 1,
            }
        }

        if failed > 0 {
            snapshot.error = Some(format!("{failed} entries could not be read"));
        }
        Ok(snapshot)
    }
}

fn system_time_secs(time: Option<SystemTime>) -> i64 {
    time.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(unix)]
fn permission_bits(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(_meta: &Metadata) -> u32 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn populate(dir: &TempDir) {
        fs::write(dir.path().join("b.txt"), "bb").unwrap();
        fs::write(dir.path().join("a.RS"), "aaaa").unwrap();
        fs::write(dir.path().join(".hidden"), "h").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
    }

    #[test]
    fn test_read_populates_entries() {
        let dir = TempDir::new().unwrap();
        populate(&dir);

        let snapshot = DirectoryReader::read(dir.path()).unwrap();
        assert_eq!(snapshot.entries.len(), 4);
        assert!(snapshot.error.is_none());

        let a = snapshot.entries.iter().find(|e| e.name == "a.RS").unwrap();
        assert_eq!(a.extension, "rs");
        assert_eq!(a.size, 4);
        assert!(!a.is_directory);
        assert!(a.modified > 0);
        assert_eq!(a.vcs_status, VcsStatus::None);

        let hidden = snapshot.entries.iter().find(|e| e.name == ".hidden").unwrap();
        assert!(hidden.is_hidden);

        let sub = snapshot.entries.iter().find(|e| e.name == "sub").unwrap();
        assert!(sub.is_directory);
    }

    #[test]
    fn test_read_missing_directory() {
        let dir = TempDir::new().unwrap();
        let err = DirectoryReader::read(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, crate::SkiffError::FileNotFound(_)));
    }

    #[test]
    fn test_sort_by_name_and_size() {
        let dir = TempDir::new().unwrap();
        populate(&dir);
        let mut snapshot = DirectoryReader::read(dir.path()).unwrap();

        snapshot.sort(SortKey::Name, true);
        let names: Vec<&str> = snapshot.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec![".hidden", "a.RS", "b.txt", "sub"]);

        snapshot.sort(SortKey::Size, false);
        let pos = |n: &str| snapshot.entries.iter().position(|e| e.name == n).unwrap();
        // 4 bytes before 2 bytes; directory sizes are platform noise
        assert!(pos("a.RS") < pos("b.txt"));
    }

    #[test]
    fn test_sort_by_type_puts_directories_first() {
        let dir = TempDir::new().unwrap();
        populate(&dir);
        let mut snapshot = DirectoryReader::read(dir.path()).unwrap();

        snapshot.sort(SortKey::Type, true);
        assert_eq!(snapshot.entries[0].name, "sub");
        assert!(snapshot.entries[1..].iter().all(|e| !e.is_directory));
    }
}
