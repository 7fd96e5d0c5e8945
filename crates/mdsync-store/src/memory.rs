//! In-memory store implementation for testing.
//!
//! Provides [`MemoryStore`] for unit testing without a database. Every trait call is
//! recorded so tests can assert exactly which operations the sync engine issued.

use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::post::{Post, UpsertOutcome};
use crate::store::{ErrorStatus, PostStore, StoreError, StoreErrorKind};

/// A store operation as observed by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Upsert { collection: String, url: String },
    DeleteOne { collection: String, url: String },
    DeleteMany { collection: String },
    ListCollections,
    ListByCollection { collection: String },
    FindIndex { collection: String },
    FindByUrl { url: String },
}

impl StoreCall {
    /// Whether the call changes stored data.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Upsert { .. } | Self::DeleteOne { .. } | Self::DeleteMany { .. }
        )
    }
}

/// Mock store for testing.
///
/// # Example
///
/// ```ignore
/// use mdsync_store::{MemoryStore, Post, PostStore};
///
/// let store = MemoryStore::new()
///     .with_post(Post::new("content/guide", "intro", "Intro", "# Intro"))
///     .with_failing_url("broken");
///
/// store.upsert(&Post::new("content/guide", "broken", "Broken", "")).await.unwrap_err();
/// assert_eq!(store.calls().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    posts: RwLock<BTreeMap<(String, String), Post>>,
    calls: RwLock<Vec<StoreCall>>,
    failing_urls: RwLock<HashSet<String>>,
    failing_collections: RwLock<HashSet<String>>,
    failing_listing: AtomicBool,
    latency: RwLock<Option<Duration>>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a post without recording a call.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_post(self, post: Post) -> Self {
        self.posts
            .write()
            .unwrap()
            .insert((post.collection.clone(), post.url.clone()), post);
        self
    }

    /// Make writes to posts with this url fail.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_failing_url(self, url: impl Into<String>) -> Self {
        self.set_failing_url(url, true);
        self
    }

    /// Make bulk deletes of this collection fail.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_failing_collection(self, collection: impl Into<String>) -> Self {
        self.failing_collections
            .write()
            .unwrap()
            .insert(collection.into());
        self
    }

    /// Delay every call by `latency`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.write().unwrap() = Some(latency);
        self
    }

    /// Toggle write failures for a url after construction.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn set_failing_url(&self, url: impl Into<String>, failing: bool) {
        let mut urls = self.failing_urls.write().unwrap();
        let url = url.into();
        if failing {
            urls.insert(url);
        } else {
            urls.remove(&url);
        }
    }

    /// Toggle failures of `list_collections`.
    pub fn set_failing_listing(&self, failing: bool) {
        self.failing_listing.store(failing, Ordering::SeqCst);
    }

    /// Calls recorded so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.read().unwrap().clone()
    }

    /// Forget recorded calls.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    /// Snapshot of every stored post, ordered by `(collection, url)`.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn posts(&self) -> Vec<Post> {
        self.posts.read().unwrap().values().cloned().collect()
    }

    /// Look up a post by key without recording a call.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn get(&self, collection: &str, url: &str) -> Option<Post> {
        self.posts
            .read()
            .unwrap()
            .get(&(collection.to_owned(), url.to_owned()))
            .cloned()
    }

    async fn enter(&self, call: StoreCall) {
        let latency = *self.latency.read().unwrap();
        self.calls.write().unwrap().push(call);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_url(&self, collection: &str, url: &str) -> Result<(), StoreError> {
        if self.failing_urls.read().unwrap().contains(url) {
            return Err(injected_failure(collection));
        }
        Ok(())
    }
}

fn injected_failure(collection: &str) -> StoreError {
    StoreError::new(StoreErrorKind::Unavailable)
        .with_status(ErrorStatus::Temporary)
        .with_backend("Memory")
        .with_collection(collection)
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn upsert(&self, post: &Post) -> Result<UpsertOutcome, StoreError> {
        self.enter(StoreCall::Upsert {
            collection: post.collection.clone(),
            url: post.url.clone(),
        })
        .await;
        self.check_url(&post.collection, &post.url)?;

        let previous = self
            .posts
            .write()
            .unwrap()
            .insert((post.collection.clone(), post.url.clone()), post.clone());
        Ok(if previous.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    async fn delete_one(&self, collection: &str, url: &str) -> Result<bool, StoreError> {
        self.enter(StoreCall::DeleteOne {
            collection: collection.to_owned(),
            url: url.to_owned(),
        })
        .await;
        self.check_url(collection, url)?;

        Ok(self
            .posts
            .write()
            .unwrap()
            .remove(&(collection.to_owned(), url.to_owned()))
            .is_some())
    }

    async fn delete_many(&self, collection: &str) -> Result<u64, StoreError> {
        self.enter(StoreCall::DeleteMany {
            collection: collection.to_owned(),
        })
        .await;
        if self.failing_collections.read().unwrap().contains(collection) {
            return Err(injected_failure(collection));
        }

        let mut posts = self.posts.write().unwrap();
        let before = posts.len();
        posts.retain(|(c, _), _| c != collection);
        Ok((before - posts.len()) as u64)
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        self.enter(StoreCall::ListCollections).await;
        if self.failing_listing.load(Ordering::SeqCst) {
            return Err(injected_failure(""));
        }
        let mut names: Vec<String> = self
            .posts
            .read()
            .unwrap()
            .keys()
            .map(|(c, _)| c.clone())
            .collect();
        names.dedup();
        Ok(names)
    }

    async fn list_by_collection(&self, collection: &str) -> Result<Vec<Post>, StoreError> {
        self.enter(StoreCall::ListByCollection {
            collection: collection.to_owned(),
        })
        .await;
        let mut posts: Vec<Post> = self
            .posts
            .read()
            .unwrap()
            .values()
            .filter(|p| p.collection == collection)
            .cloned()
            .collect();
        posts.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.url.cmp(&b.url)));
        Ok(posts)
    }

    async fn find_index(&self, collection: &str) -> Result<Option<Post>, StoreError> {
        self.enter(StoreCall::FindIndex {
            collection: collection.to_owned(),
        })
        .await;
        Ok(self
            .posts
            .read()
            .unwrap()
            .values()
            .find(|p| p.collection == collection && p.is_index)
            .cloned())
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<Post>, StoreError> {
        self.enter(StoreCall::FindByUrl {
            url: url.to_owned(),
        })
        .await;
        Ok(self
            .posts
            .read()
            .unwrap()
            .values()
            .find(|p| p.url == url)
            .cloned())
    }
}
