//! Demo file discovery
//!
//! Resolves the configured glob into the immutable set of files a run
//! iterates over.

use crate::{DemoBenchError, Result};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Files matched by a glob pattern at discovery time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    pattern: String,
    files: Vec<PathBuf>,
}

impl FileSet {
    /// Expand `pattern` into the regular files it matches
    ///
    /// The directory the pattern is rooted in must exist. Directories and
    /// other non-file matches are skipped. Matches come back in the order
    /// `glob` yields them.
    pub fn discover(pattern: &str) -> Result<Self> {
        let root = pattern_root(pattern);
        if !root.is_dir() {
            return Err(DemoBenchError::ConfigError(format!(
                "Demo directory does not exist: {}",
                root.display()
            )));
        }

        let mut files = Vec::new();
        for entry in glob::glob(pattern)? {
            let path = entry?;
            if path.is_file() {
                files.push(path);
            } else {
                debug!(path = %path.display(), "skipping non-file match");
            }
        }

        if files.is_empty() {
            warn!(pattern, "pattern matched no demo files");
        } else {
            info!(pattern, count = files.len(), "discovered demo files");
        }

        Ok(Self {
            pattern: pattern.to_string(),
            files,
        })
    }

    /// Build a file set from already known paths
    pub fn from_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            pattern: String::new(),
            files: paths.into_iter().map(Into::into).collect(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.files.iter()
    }
}

/// Directory made of the pattern's leading literal components
fn pattern_root(pattern: &str) -> PathBuf {
    let path = Path::new(pattern);
    let mut root = PathBuf::new();
    let mut has_wildcard = false;

    for component in path.components() {
        let is_wild = matches!(component, Component::Normal(part)
            if part.to_string_lossy().contains(['*', '?', '[']));
        if is_wild {
            has_wildcard = true;
            break;
        }
        root.push(component);
    }

    if !has_wildcard {
        root = path.parent().map(Path::to_path_buf).unwrap_or_default();
    }

    if root.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_pattern_root() {
        assert_eq!(pattern_root("demos/*.dem"), PathBuf::from("demos"));
        assert_eq!(pattern_root("/data/cs2/*"), PathBuf::from("/data/cs2"));
        assert_eq!(pattern_root("*.dem"), PathBuf::from("."));
        assert_eq!(pattern_root("demos/a.dem"), PathBuf::from("demos"));
        assert_eq!(pattern_root("demos/2024-*/x.dem"), PathBuf::from("demos"));
    }

    #[test]
    fn test_discover_matches_only_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.dem"), b"a").unwrap();
        fs::write(dir.path().join("b.dem"), b"b").unwrap();
        fs::write(dir.path().join("notes.txt"), b"c").unwrap();
        fs::create_dir(dir.path().join("sub.dem")).unwrap();
        fs::write(dir.path().join("sub.dem").join("nested.dem"), b"d").unwrap();

        let pattern = format!("{}/*.dem", dir.path().display());
        let files = FileSet::discover(&pattern).unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files.pattern(), pattern);
        assert!(files.iter().all(|p| p.extension().unwrap() == "dem"));
        assert!(files.iter().all(|p| p.parent() == Some(dir.path())));
    }

    #[test]
    fn test_discover_empty_directory() {
        let dir = tempdir().unwrap();
        let pattern = format!("{}/*", dir.path().display());
        let files = FileSet::discover(&pattern).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_discover_missing_directory() {
        let dir = tempdir().unwrap();
        let pattern = format!("{}/missing/*", dir.path().display());
        assert!(matches!(
            FileSet::discover(&pattern),
            Err(DemoBenchError::ConfigError(_))
        ));
    }

    #[test]
    fn test_discover_invalid_pattern() {
        let dir = tempdir().unwrap();
        let pattern = format!("{}/[", dir.path().display());
        assert!(matches!(
            FileSet::discover(&pattern),
            Err(DemoBenchError::PatternError(_))
        ));
    }

    #[test]
    fn test_from_paths() {
        let files = FileSet::from_paths(["a.dem", "b.dem"]);
        assert_eq!(files.paths(), &[PathBuf::from("a.dem"), PathBuf::from("b.dem")]);
        assert_eq!(files.pattern(), "");
    }
}
