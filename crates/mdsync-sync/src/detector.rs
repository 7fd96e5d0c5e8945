//! Change detection between the tracked state and a fresh snapshot.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::fingerprint::Fingerprint;
use crate::mapper::PathMapper;
use crate::scanner::Snapshot;

/// What the engine believes the store mirrors, as of the last cycle.
///
/// Never persisted; a fresh process starts empty and re-imports everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackedState {
    /// Absolute path to last recorded fingerprint.
    pub files: BTreeMap<PathBuf, Fingerprint>,
    /// First-level directory names.
    pub collections: BTreeSet<String>,
}

impl TrackedState {
    /// Whether nothing has been tracked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.collections.is_empty()
    }

    /// Tracked state after a successful cycle over `snapshot`.
    ///
    /// Entries that were tracked but unreadable during the scan keep their previous
    /// fingerprint, so a transient read error is neither a deletion nor a change.
    #[must_use]
    pub fn advance(&self, snapshot: &Snapshot) -> Self {
        let mut files = snapshot.files.clone();
        for (path, fp) in &self.files {
            if !files.contains_key(path) && snapshot.is_skipped(path) {
                files.insert(path.clone(), *fp);
            }
        }
        Self {
            files,
            collections: snapshot.collections.clone(),
        }
    }
}

/// Operations needed to bring the store in line with a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditScript {
    /// New files and files whose fingerprint changed.
    pub added_or_modified: Vec<PathBuf>,
    /// Tracked files that disappeared, excluding those covered by a collection removal.
    pub removed_files: Vec<PathBuf>,
    /// Tracked first-level directories that disappeared.
    pub removed_collections: Vec<String>,
}

impl EditScript {
    /// Whether the script has nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added_or_modified.is_empty()
            && self.removed_files.is_empty()
            && self.removed_collections.is_empty()
    }

    /// Total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.added_or_modified.len() + self.removed_files.len() + self.removed_collections.len()
    }
}

/// Diff the tracked state against a new snapshot.
///
/// A removed file whose first-level directory is itself removed is left to the
/// collection removal. A removed directory named like the root collection is not
/// reported as a collection removal while root files still exist, since both share one
/// store collection; its files are removed one by one instead.
///
/// Several files can map to one store key (nested index files, colliding slugs).
/// Removing one of them never deletes the key while another still produces it; the
/// remaining files are re-upserted instead so the stored document stays theirs.
#[must_use]
pub fn diff(prev: &TrackedState, current: &Snapshot, mapper: &PathMapper) -> EditScript {
    let mut added_or_modified: Vec<PathBuf> = current
        .files
        .iter()
        .filter(|(path, fp)| prev.files.get(*path) != Some(*fp))
        .map(|(path, _)| path.clone())
        .collect();

    let shares_root = current.has_root_files();
    let removed_collections: Vec<String> = prev
        .collections
        .difference(&current.collections)
        .filter(|name| !(shares_root && name.as_str() == mapper.root_collection_name()))
        .cloned()
        .collect();

    let removed: Vec<&PathBuf> = prev
        .files
        .keys()
        .filter(|path| !current.files.contains_key(*path) && !current.is_skipped(path))
        .filter(|path| {
            let base = current
                .relative(path)
                .and_then(|rel| PathMapper::base_dir(rel));
            !base.is_some_and(|dir| removed_collections.contains(&dir))
        })
        .collect();

    let mut removed_files = Vec::with_capacity(removed.len());
    if removed.is_empty() {
        return EditScript {
            added_or_modified,
            removed_files,
            removed_collections,
        };
    }

    // Store keys still produced by files on disk, including unreadable tracked ones.
    let mut holders: HashMap<(String, String), Vec<&PathBuf>> = HashMap::new();
    let still_present = current
        .files
        .keys()
        .chain(prev.files.keys().filter(|p| current.is_skipped(p)));
    for path in still_present {
        if let Some(key) = store_key(current, mapper, path) {
            holders.entry(key).or_default().push(path);
        }
    }

    for path in removed {
        let survivors = store_key(current, mapper, path).and_then(|key| holders.get(&key));
        match survivors {
            Some(paths) => {
                tracing::debug!(
                    path = %path.display(),
                    "Removed file shares its store key with a remaining file"
                );
                added_or_modified.extend(
                    paths
                        .iter()
                        .filter(|p| current.files.contains_key(**p))
                        .map(|p| (*p).clone()),
                );
            }
            None => removed_files.push(path.clone()),
        }
    }
    added_or_modified.sort();
    added_or_modified.dedup();

    EditScript {
        added_or_modified,
        removed_files,
        removed_collections,
    }
}

/// `(collection, url)` a path is stored under.
fn store_key(snapshot: &Snapshot, mapper: &PathMapper, path: &Path) -> Option<(String, String)> {
    let key = mapper.key(snapshot.relative(path)?);
    Some((key.collection, key.url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ROOT: &str = "/srv/content";

    fn path(rel: &str) -> PathBuf {
        Path::new(ROOT).join(rel)
    }

    fn snapshot(files: &[(&str, &[u8])], collections: &[&str]) -> Snapshot {
        Snapshot {
            root: PathBuf::from(ROOT),
            files: files
                .iter()
                .map(|(rel, bytes)| (path(rel), Fingerprint::of(bytes)))
                .collect(),
            collections: collections.iter().map(|c| (*c).to_owned()).collect(),
            skipped: BTreeSet::new(),
        }
    }

    fn tracked(snapshot: &Snapshot) -> TrackedState {
        TrackedState::default().advance(snapshot)
    }

    #[test]
    fn test_first_scan_adds_everything() {
        let current = snapshot(&[("A/index.md", b"1"), ("top.md", b"2")], &["A"]);

        let script = diff(&TrackedState::default(), &current, &PathMapper::default());

        assert_eq!(
            script.added_or_modified,
            vec![path("A/index.md"), path("top.md")]
        );
        assert!(script.removed_files.is_empty());
        assert!(script.removed_collections.is_empty());
    }

    #[test]
    fn test_unchanged_scan_is_empty() {
        let current = snapshot(&[("A/index.md", b"1")], &["A"]);
        let prev = tracked(&current);

        let script = diff(&prev, &current, &PathMapper::default());

        assert!(script.is_empty());
        assert_eq!(script.len(), 0);
    }

    #[test]
    fn test_modified_file_detected() {
        let prev = tracked(&snapshot(&[("A/notes.md", b"old")], &["A"]));
        let current = snapshot(&[("A/notes.md", b"new")], &["A"]);

        let script = diff(&prev, &current, &PathMapper::default());

        assert_eq!(script.added_or_modified, vec![path("A/notes.md")]);
        assert!(script.removed_files.is_empty());
    }

    #[test]
    fn test_removed_file_detected() {
        let prev = tracked(&snapshot(
            &[("A/index.md", b"1"), ("A/notes.md", b"2")],
            &["A"],
        ));
        let current = snapshot(&[("A/index.md", b"1")], &["A"]);

        let script = diff(&prev, &current, &PathMapper::default());

        assert_eq!(script.removed_files, vec![path("A/notes.md")]);
        assert!(script.added_or_modified.is_empty());
        assert!(script.removed_collections.is_empty());
    }

    #[test]
    fn test_removed_collection_supersedes_file_removals() {
        let prev = tracked(&snapshot(
            &[("A/index.md", b"1"), ("A/notes.md", b"2"), ("B/x.md", b"3")],
            &["A", "B"],
        ));
        let current = snapshot(&[("B/x.md", b"3")], &["B"]);

        let script = diff(&prev, &current, &PathMapper::default());

        assert_eq!(script.removed_collections, vec!["A".to_owned()]);
        assert!(script.removed_files.is_empty());
    }

    #[test]
    fn test_root_file_named_like_removed_dir_still_removed() {
        let prev = tracked(&snapshot(&[("A", b"1")], &["A"]));
        let current = snapshot(&[], &[]);

        let script = diff(&prev, &current, &PathMapper::default());

        assert_eq!(script.removed_collections, vec!["A".to_owned()]);
        assert_eq!(script.removed_files, vec![path("A")]);
    }

    #[test]
    fn test_directory_rename() {
        let prev = tracked(&snapshot(&[("Old/page.md", b"1")], &["Old"]));
        let current = snapshot(&[("New/page.md", b"1")], &["New"]);

        let script = diff(&prev, &current, &PathMapper::default());

        assert_eq!(script.removed_collections, vec!["Old".to_owned()]);
        assert_eq!(script.added_or_modified, vec![path("New/page.md")]);
        assert!(script.removed_files.is_empty());
    }

    #[test]
    fn test_skipped_file_not_removed_and_kept_tracked() {
        let prev = tracked(&snapshot(&[("A/locked.md", b"1")], &["A"]));
        let mut current = snapshot(&[], &["A"]);
        current.skipped.insert(path("A/locked.md"));

        let script = diff(&prev, &current, &PathMapper::default());
        assert!(script.is_empty());

        let next = prev.advance(&current);
        assert_eq!(next.files.get(&path("A/locked.md")), Some(&Fingerprint::of(b"1")));
    }

    #[test]
    fn test_root_named_dir_removal_with_root_files() {
        let prev = tracked(&snapshot(
            &[("top.md", b"1"), ("root/page.md", b"2")],
            &["root"],
        ));
        let current = snapshot(&[("top.md", b"1")], &[]);

        let script = diff(&prev, &current, &PathMapper::default());

        assert!(script.removed_collections.is_empty());
        assert_eq!(script.removed_files, vec![path("root/page.md")]);
    }

    #[test]
    fn test_advance_drops_removed_files() {
        let prev = tracked(&snapshot(&[("A/x.md", b"1"), ("A/y.md", b"2")], &["A"]));
        let current = snapshot(&[("A/x.md", b"1")], &["A"]);

        let next = prev.advance(&current);

        assert_eq!(next, tracked(&current));
        assert!(!next.is_empty());
    }

    #[test]
    fn test_removed_nested_index_keeps_shared_key() {
        let prev = tracked(&snapshot(
            &[("A/index.md", b"top"), ("A/deep/index.md", b"deep")],
            &["A"],
        ));
        let current = snapshot(&[("A/index.md", b"top")], &["A"]);

        let script = diff(&prev, &current, &PathMapper::default());

        assert!(script.removed_files.is_empty());
        assert_eq!(script.added_or_modified, vec![path("A/index.md")]);
    }

    #[test]
    fn test_removed_colliding_slug_reupserts_survivor() {
        let prev = tracked(&snapshot(&[("A/b c.md", b"1"), ("A/b-c.md", b"2")], &["A"]));
        let current = snapshot(&[("A/b-c.md", b"2")], &["A"]);

        let script = diff(&prev, &current, &PathMapper::default());

        assert!(script.removed_files.is_empty());
        assert_eq!(script.added_or_modified, vec![path("A/b-c.md")]);
    }

    #[test]
    fn test_removed_key_held_by_skipped_file_not_deleted() {
        let prev = tracked(&snapshot(&[("A/b c.md", b"1"), ("A/b-c.md", b"2")], &["A"]));
        let mut current = snapshot(&[], &["A"]);
        current.skipped.insert(path("A/b-c.md"));

        let script = diff(&prev, &current, &PathMapper::default());

        assert!(script.is_empty());
    }
}
