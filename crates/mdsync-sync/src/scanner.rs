//! Filesystem walking and fingerprinting.
//!
//! A scan produces a complete [`Snapshot`] of the sync root or fails as a whole;
//! callers never observe a half-built snapshot. Unreadable entries below the root
//! are logged and recorded in [`Snapshot::skipped`] instead of failing the scan.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;

use crate::fingerprint::Fingerprint;
use crate::mapper::PathMapper;

/// Sync root could not be scanned.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScanError {
    #[error("sync root {} does not exist", .0.display())]
    Missing(PathBuf),
    #[error("sync root {} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("cannot read sync root {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },
}

impl ScanError {
    pub(crate) fn unreadable(path: &Path, err: io::Error) -> Self {
        Self::Unreadable {
            path: path.to_path_buf(),
            source: Arc::new(err),
        }
    }
}

/// State of the sync root at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Sync root the paths are under.
    pub root: PathBuf,
    /// Eligible files (absolute paths) and their fingerprints.
    pub files: BTreeMap<PathBuf, Fingerprint>,
    /// Names of first-level directories.
    pub collections: BTreeSet<String>,
    /// Files and directories that could not be read during this scan.
    pub skipped: BTreeSet<PathBuf>,
}

impl Snapshot {
    /// Path relative to the sync root.
    #[must_use]
    pub fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        path.strip_prefix(&self.root).ok()
    }

    /// Whether `path` was unreadable, or lies under an unreadable directory.
    #[must_use]
    pub fn is_skipped(&self, path: &Path) -> bool {
        self.skipped.iter().any(|s| path.starts_with(s))
    }

    /// Whether any eligible file sits directly under the root.
    #[must_use]
    pub fn has_root_files(&self) -> bool {
        self.files
            .keys()
            .any(|p| p.parent().is_some_and(|parent| parent == self.root))
    }
}

/// Walks the sync root and fingerprints eligible files.
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    mapper: PathMapper,
}

impl Scanner {
    /// Create a scanner for `root`, using `mapper` to decide which files are eligible.
    #[must_use]
    pub fn new(root: PathBuf, mapper: PathMapper) -> Self {
        Self { root, mapper }
    }

    /// Sync root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan the root. Blocking; run it off the async executor.
    pub fn scan(&self) -> Result<Snapshot, ScanError> {
        let meta = match fs::metadata(&self.root) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ScanError::Missing(self.root.clone()));
            }
            Err(e) => return Err(ScanError::unreadable(&self.root, e)),
        };
        if !meta.is_dir() {
            return Err(ScanError::NotADirectory(self.root.clone()));
        }
        let entries = fs::read_dir(&self.root).map_err(|e| ScanError::unreadable(&self.root, e))?;

        let mut snapshot = Snapshot {
            root: self.root.clone(),
            ..Snapshot::default()
        };
        let mut candidates = Vec::new();
        self.walk_entries(entries, true, &mut candidates, &mut snapshot);

        let fingerprinted: Vec<(PathBuf, io::Result<Fingerprint>)> = candidates
            .into_par_iter()
            .map(|path| {
                let fp = Fingerprint::of_file(&path);
                (path, fp)
            })
            .collect();

        for (path, result) in fingerprinted {
            match result {
                Ok(fp) => {
                    snapshot.files.insert(path, fp);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable file");
                    snapshot.skipped.insert(path);
                }
            }
        }

        tracing::debug!(
            files = snapshot.files.len(),
            collections = snapshot.collections.len(),
            skipped = snapshot.skipped.len(),
            "Scan complete"
        );
        Ok(snapshot)
    }

    fn walk_dir(&self, dir: &Path, candidates: &mut Vec<PathBuf>, snapshot: &mut Snapshot) {
        match fs::read_dir(dir) {
            Ok(entries) => self.walk_entries(entries, false, candidates, snapshot),
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "Skipping unreadable directory");
                snapshot.skipped.insert(dir.to_path_buf());
            }
        }
    }

    fn walk_entries(
        &self,
        entries: fs::ReadDir,
        top_level: bool,
        candidates: &mut Vec<PathBuf>,
        snapshot: &mut Snapshot,
    ) {
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable directory entry");
                    continue;
                }
            };

            // Skip hidden files/dirs
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }

            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping entry with unknown type");
                    snapshot.skipped.insert(path);
                    continue;
                }
            };

            if file_type.is_symlink() {
                tracing::debug!(path = %path.display(), "Skipping symlink");
            } else if file_type.is_dir() {
                if top_level {
                    snapshot.collections.insert(name);
                }
                self.walk_dir(&path, candidates, snapshot);
            } else if file_type.is_file() && self.mapper.is_eligible(&path) {
                candidates.push(path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn create_test_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn scanner(root: &Path) -> Scanner {
        Scanner::new(root.to_path_buf(), PathMapper::default())
    }

    #[test]
    fn test_scan_missing_root() {
        let temp_dir = create_test_dir();
        let root = temp_dir.path().join("nope");

        let err = scanner(&root).scan().unwrap_err();

        assert!(matches!(err, ScanError::Missing(p) if p == root));
    }

    #[test]
    fn test_scan_root_is_file() {
        let temp_dir = create_test_dir();
        let root = temp_dir.path().join("file.md");
        fs::write(&root, "x").unwrap();

        assert!(matches!(
            scanner(&root).scan(),
            Err(ScanError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_scan_empty_root() {
        let temp_dir = create_test_dir();

        let snapshot = scanner(temp_dir.path()).scan().unwrap();

        assert!(snapshot.files.is_empty());
        assert!(snapshot.collections.is_empty());
        assert!(!snapshot.has_root_files());
    }

    #[test]
    fn test_scan_files_and_collections() {
        let temp_dir = create_test_dir();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("A/deep")).unwrap();
        fs::create_dir_all(root.join("Empty")).unwrap();
        fs::write(root.join("A/index.md"), "# Welcome").unwrap();
        fs::write(root.join("A/deep/more.md"), "# More").unwrap();
        fs::write(root.join("top.md"), "# Top").unwrap();
        fs::write(root.join("A/image.png"), "png").unwrap();

        let snapshot = scanner(root).scan().unwrap();

        let files: Vec<PathBuf> = snapshot.files.keys().cloned().collect();
        assert_eq!(
            files,
            vec![
                root.join("A/deep/more.md"),
                root.join("A/index.md"),
                root.join("top.md"),
            ]
        );
        assert_eq!(
            snapshot.collections,
            BTreeSet::from(["A".to_owned(), "Empty".to_owned()])
        );
        assert_eq!(
            snapshot.files[&root.join("A/index.md")],
            Fingerprint::of(b"# Welcome")
        );
        assert!(snapshot.has_root_files());
    }

    #[test]
    fn test_scan_skips_hidden() {
        let temp_dir = create_test_dir();
        let root = temp_dir.path();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("A")).unwrap();
        fs::write(root.join(".git/notes.md"), "x").unwrap();
        fs::write(root.join("A/.draft.md"), "x").unwrap();
        fs::write(root.join("A/page.md"), "x").unwrap();

        let snapshot = scanner(root).scan().unwrap();

        assert_eq!(snapshot.files.len(), 1);
        assert!(snapshot.files.contains_key(&root.join("A/page.md")));
        assert_eq!(snapshot.collections, BTreeSet::from(["A".to_owned()]));
    }

    #[test]
    fn test_scan_extension_case_insensitive() {
        let temp_dir = create_test_dir();
        fs::write(temp_dir.path().join("UPPER.MD"), "x").unwrap();

        let snapshot = scanner(temp_dir.path()).scan().unwrap();

        assert_eq!(snapshot.files.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_skips_symlinks() {
        let temp_dir = create_test_dir();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("A")).unwrap();
        fs::write(root.join("A/page.md"), "x").unwrap();
        std::os::unix::fs::symlink(root.join("A"), root.join("Link")).unwrap();

        let snapshot = scanner(root).scan().unwrap();

        assert_eq!(snapshot.files.len(), 1);
        assert_eq!(snapshot.collections, BTreeSet::from(["A".to_owned()]));
    }

    #[test]
    fn test_is_skipped_covers_children() {
        let snapshot = Snapshot {
            root: PathBuf::from("/srv"),
            skipped: BTreeSet::from([PathBuf::from("/srv/A")]),
            ..Snapshot::default()
        };

        assert!(snapshot.is_skipped(Path::new("/srv/A/page.md")));
        assert!(!snapshot.is_skipped(Path::new("/srv/AB/page.md")));
    }

    #[test]
    fn test_relative() {
        let snapshot = Snapshot {
            root: PathBuf::from("/srv"),
            ..Snapshot::default()
        };
        assert_eq!(
            snapshot.relative(Path::new("/srv/A/x.md")),
            Some(Path::new("A/x.md"))
        );
        assert_eq!(snapshot.relative(Path::new("/other/x.md")), None);
    }
}
