//! Inclusion rules applied to candidate files before indexing

use crate::SkiffError;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::fs::Metadata;
use std::path::Path;

/// Evaluates whether a path should be indexed given exclude patterns and
/// size/visibility rules.
#[derive(Clone)]
pub struct FilterPolicy {
    include_hidden: bool,
    /// 0 disables the cap
    max_file_size_bytes: u64,
    /// Matched against the basename, separator-insensitive
    basename_set: GlobSet,
    /// Matched against the full path, `/` treated as a separator
    path_set: GlobSet,
}

impl FilterPolicy {
    pub fn new(
        exclude_patterns: &[String],
        include_hidden: bool,
        max_file_size_bytes: u64,
    ) -> crate::Result<Self> {
        let mut basename_builder = GlobSetBuilder::new();
        let mut path_builder = GlobSetBuilder::new();

        for pattern in exclude_patterns {
            let basename_glob = GlobBuilder::new(pattern)
                .build()
                .map_err(|e| SkiffError::GlobPattern(e.to_string()))?;
            basename_builder.add(basename_glob);

            let path_glob = GlobBuilder::new(pattern)
                .literal_separator(true)
                .build()
                .map_err(|e| SkiffError::GlobPattern(e.to_string()))?;
            path_builder.add(path_glob);
        }

        Ok(Self {
            include_hidden,
            max_file_size_bytes,
            basename_set: basename_builder
                .build()
                .map_err(|e| SkiffError::GlobPattern(e.to_string()))?,
            path_set: path_builder
                .build()
                .map_err(|e| SkiffError::GlobPattern(e.to_string()))?,
        })
    }

    /// Apply the inclusion rules in order: regular file, visibility,
    /// size cap, exclude globs (basename or full path).
    pub fn should_index(&self, path: &Path, meta: &Metadata) -> bool {
        if !meta.is_file() {
            return false;
        }

        let basename = match path.file_name() {
            Some(n) => n.to_string_lossy(),
            None => return false,
        };

        if !self.include_hidden && basename.starts_with('.') {
            return false;
        }

        if self.max_file_size_bytes > 0 && meta.len() > self.max_file_size_bytes {
            return false;
        }

        !self.is_excluded(path)
    }

    /// True when any path component or the full path matches an exclude
    /// glob. Checking every component makes a file inside an excluded
    /// directory excluded as well, which keeps change-event dispatch
    /// consistent with scan-time directory pruning.
    pub fn is_excluded(&self, path: &Path) -> bool {
        for component in path.components() {
            if self.basename_set.is_match(Path::new(component.as_os_str())) {
                return true;
            }
        }
        self.path_set.is_match(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn policy(patterns: &[&str], hidden: bool, cap: u64) -> FilterPolicy {
        let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        FilterPolicy::new(&patterns, hidden, cap).unwrap()
    }

    #[test]
    fn test_rejects_directories() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let meta = fs::metadata(&sub).unwrap();
        assert!(!policy(&[], true, 0).should_index(&sub, &meta));
    }

    #[test]
    fn test_hidden_toggle() {
        let dir = TempDir::new().unwrap();
        let hidden = dir.path().join(".env");
        fs::write(&hidden, "x").unwrap();
        let meta = fs::metadata(&hidden).unwrap();

        assert!(!policy(&[], false, 0).should_index(&hidden, &meta));
        assert!(policy(&[], true, 0).should_index(&hidden, &meta));
    }

    #[test]
    fn test_size_cap() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        fs::write(&path, vec![0u8; 2048]).unwrap();
        let meta = fs::metadata(&path).unwrap();

        assert!(!policy(&[], false, 1024).should_index(&path, &meta));
        // 0 disables the cap
        assert!(policy(&[], false, 0).should_index(&path, &meta));
    }

    #[test]
    fn test_basename_glob_patterns() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("build.log");
        let txt = dir.path().join("notes.txt");
        fs::write(&log, "x").unwrap();
        fs::write(&txt, "x").unwrap();

        let p = policy(&["*.log", "node_modules"], false, 0);
        assert!(!p.should_index(&log, &fs::metadata(&log).unwrap()));
        assert!(p.should_index(&txt, &fs::metadata(&txt).unwrap()));
        assert!(p.is_excluded(Path::new("/src/node_modules")));
        assert!(!p.is_excluded(Path::new("/src/node_modules_backup")));
    }

    #[test]
    fn test_glob_classes_and_question_mark() {
        let p = policy(&["file?.tmp", "[ab].rs"], true, 0);
        assert!(p.is_excluded(Path::new("file1.tmp")));
        assert!(!p.is_excluded(Path::new("file12.tmp")));
        assert!(p.is_excluded(Path::new("a.rs")));
        assert!(!p.is_excluded(Path::new("c.rs")));
    }

    #[test]
    fn test_full_path_glob_respects_separator() {
        let p = policy(&["/tmp/fx/*.log"], true, 0);
        assert!(p.is_excluded(Path::new("/tmp/fx/a.log")));
        assert!(!p.is_excluded(Path::new("/tmp/fx/sub/a.log")));
    }
}
