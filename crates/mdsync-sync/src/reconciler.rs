//! Applies edit scripts to the post store.
//!
//! Collection deletions run first, then file deletions, then upserts. Every store call
//! is bounded by the configured timeout, and a failing entry never aborts the rest of
//! the script.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mdsync_diagrams::{TextTransform, TransformContext};
use mdsync_store::{Post, PostStore, StoreError, UpsertOutcome};

use crate::detector::EditScript;
use crate::mapper::PathMapper;
use crate::scanner::Snapshot;

/// Outcome of applying an edit script (or a startup prune).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Posts inserted or updated.
    pub upserted: usize,
    /// Posts deleted one by one.
    pub deleted: usize,
    /// Collections bulk-deleted.
    pub collections_deleted: usize,
    /// Posts removed by bulk deletes.
    pub purged: u64,
    /// Files whose upsert or delete failed.
    pub failed_paths: Vec<PathBuf>,
    /// Directory names (un-namespaced) whose bulk delete failed.
    pub failed_collections: Vec<String>,
}

impl ReconcileReport {
    /// Number of stored posts changed.
    #[must_use]
    pub fn touched(&self) -> u64 {
        (self.upserted + self.deleted) as u64 + self.purged
    }

    /// Number of entries that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed_paths.len() + self.failed_collections.len()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: ReconcileReport) {
        self.upserted += other.upserted;
        self.deleted += other.deleted;
        self.collections_deleted += other.collections_deleted;
        self.purged += other.purged;
        self.failed_paths.extend(other.failed_paths);
        self.failed_collections.extend(other.failed_collections);
    }
}

/// Writes the effects of filesystem changes to a [`PostStore`].
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn PostStore>,
    transform: Arc<dyn TextTransform>,
    mapper: PathMapper,
    root: PathBuf,
    store_timeout: Duration,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("mapper", &self.mapper)
            .field("root", &self.root)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Create a reconciler for files under `root`.
    #[must_use]
    pub fn new(
        store: Arc<dyn PostStore>,
        transform: Arc<dyn TextTransform>,
        mapper: PathMapper,
        root: PathBuf,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            transform,
            mapper,
            root,
            store_timeout,
        }
    }

    /// Store the reconciler writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn PostStore> {
        &self.store
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::timeout()),
        }
    }

    /// Apply `script` in order: collection deletes, file deletes, upserts.
    pub async fn apply(&self, script: &EditScript) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for name in &script.removed_collections {
            let collection = self.mapper.collection_for_dir(name);
            match self.bounded(self.store.delete_many(&collection)).await {
                Ok(count) => {
                    tracing::info!(collection = %collection, posts = count, "Deleted collection");
                    report.collections_deleted += 1;
                    report.purged += count;
                }
                Err(e) => {
                    tracing::warn!(collection = %collection, error = %e, "Failed to delete collection");
                    report.failed_collections.push(name.clone());
                }
            }
        }

        for path in &script.removed_files {
            let Some(rel) = self.relative(path) else {
                report.failed_paths.push(path.clone());
                continue;
            };
            let key = self.mapper.key(rel);
            match self
                .bounded(self.store.delete_one(&key.collection, &key.url))
                .await
            {
                Ok(found) => {
                    tracing::debug!(collection = %key.collection, url = %key.url, found, "Deleted post");
                    report.deleted += usize::from(found);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to delete post");
                    report.failed_paths.push(path.clone());
                }
            }
        }

        for path in &script.added_or_modified {
            let post = match self.prepare(path).await {
                Ok(post) => post,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read document");
                    report.failed_paths.push(path.clone());
                    continue;
                }
            };
            match self.bounded(self.store.upsert(&post)).await {
                Ok(outcome) => {
                    tracing::debug!(
                        collection = %post.collection,
                        url = %post.url,
                        inserted = outcome == UpsertOutcome::Inserted,
                        "Upserted post"
                    );
                    report.upserted += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to upsert post");
                    report.failed_paths.push(path.clone());
                }
            }
        }

        report
    }

    /// Remove namespaced posts that no longer have a source file.
    ///
    /// Collections without a backing directory (or, for the root collection, without
    /// any root file) are bulk-deleted. In surviving collections, posts whose url no
    /// file maps to are deleted, unless part of the collection could not be read.
    ///
    /// Returns `None` when the store's collections could not be listed, so nothing
    /// was examined.
    pub async fn prune(&self, snapshot: &Snapshot) -> Option<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let collections = match self.bounded(self.store.list_collections()).await {
            Ok(collections) => collections,
            Err(e) => {
                tracing::warn!(error = %e, "Startup prune skipped: cannot list collections");
                return None;
            }
        };

        let (expected, incomplete) = self.expected_keys(snapshot);

        for collection in collections
            .iter()
            .filter(|c| self.mapper.is_namespaced(c))
        {
            let Some(urls) = expected.get(collection) else {
                if incomplete.contains(collection) {
                    continue;
                }
                match self.bounded(self.store.delete_many(collection)).await {
                    Ok(count) => {
                        tracing::info!(collection = %collection, posts = count, "Pruned orphaned collection");
                        report.collections_deleted += 1;
                        report.purged += count;
                    }
                    Err(e) => {
                        tracing::warn!(collection = %collection, error = %e, "Failed to prune collection");
                    }
                }
                continue;
            };
            if incomplete.contains(collection) {
                continue;
            }

            let posts = match self.bounded(self.store.list_by_collection(collection)).await {
                Ok(posts) => posts,
                Err(e) => {
                    tracing::warn!(collection = %collection, error = %e, "Failed to list collection for prune");
                    continue;
                }
            };
            for post in posts.iter().filter(|p| !urls.contains(&p.url)) {
                match self
                    .bounded(self.store.delete_one(collection, &post.url))
                    .await
                {
                    Ok(found) => {
                        tracing::info!(collection = %collection, url = %post.url, "Pruned orphaned post");
                        report.deleted += usize::from(found);
                    }
                    Err(e) => {
                        tracing::warn!(collection = %collection, url = %post.url, error = %e, "Failed to prune post");
                    }
                }
            }
        }

        Some(report)
    }

    /// Keys derivable from the snapshot, plus collections with unreadable parts.
    fn expected_keys(
        &self,
        snapshot: &Snapshot,
    ) -> (BTreeMap<String, BTreeSet<String>>, BTreeSet<String>) {
        let mut expected: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for name in &snapshot.collections {
            expected.entry(self.mapper.collection_for_dir(name)).or_default();
        }
        for path in snapshot.files.keys() {
            if let Some(rel) = snapshot.relative(path) {
                let key = self.mapper.key(rel);
                expected.entry(key.collection).or_default().insert(key.url);
            }
        }

        let mut incomplete = BTreeSet::new();
        for path in &snapshot.skipped {
            let Some(rel) = snapshot.relative(path) else {
                continue;
            };
            let collection = match PathMapper::base_dir(rel) {
                Some(dir) => self.mapper.collection_for_dir(&dir),
                None => {
                    let name = rel.to_string_lossy();
                    if snapshot.collections.contains(name.as_ref()) {
                        self.mapper.collection_for_dir(&name)
                    } else {
                        self.mapper.root_collection()
                    }
                }
            };
            incomplete.insert(collection);
        }

        (expected, incomplete)
    }

    fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        let rel = path.strip_prefix(&self.root).ok();
        if rel.is_none() {
            tracing::warn!(path = %path.display(), root = %self.root.display(), "Path outside sync root");
        }
        rel
    }

    /// Read a file and build its transformed post.
    async fn prepare(&self, path: &Path) -> io::Result<Post> {
        let rel = self
            .relative(path)
            .ok_or_else(|| io::Error::other("path outside sync root"))?
            .to_path_buf();
        let bytes = tokio::fs::read(path).await?;

        let mapper = self.mapper.clone();
        let transform = Arc::clone(&self.transform);
        let ctx = TransformContext::new(self.root.clone(), PathMapper::base_dir(&rel));

        tokio::task::spawn_blocking(move || {
            let content = String::from_utf8_lossy(&bytes);
            let mut post = mapper.document(&rel, &content);
            match transform.transform(&post.body, &ctx) {
                Ok(body) => post.body = body,
                Err(e) => {
                    tracing::warn!(path = %rel.display(), error = %e, "Transform failed, storing original body");
                }
            }
            post
        })
        .await
        .map_err(io::Error::other)
    }
}
