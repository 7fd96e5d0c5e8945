//! Store trait and error types.
//!
//! Provides the core [`PostStore`] trait for persisting and querying posts,
//! along with [`StoreError`] for unified error handling across backends.

use async_trait::async_trait;

use crate::post::{Post, UpsertOutcome};

/// Semantic error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreErrorKind {
    /// Record does not exist.
    NotFound,
    /// Operation did not finish within its time budget.
    Timeout,
    /// Backend is temporarily unavailable (pool closed, database locked).
    Unavailable,
    /// Write rejected by a constraint.
    Conflict,
    /// Stored data could not be decoded.
    InvalidData,
    /// Other/unknown error category.
    Other,
}

/// Retry guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorStatus {
    /// Don't retry (constraint violation, corrupt row).
    #[default]
    Permanent,
    /// Retry immediately (timeout, connection reset).
    Temporary,
    /// Retry with backoff (backend unavailable).
    Persistent,
}

/// Store error with semantic kind and backend-specific source.
#[derive(Debug)]
pub struct StoreError {
    /// Semantic error category.
    pub kind: StoreErrorKind,
    /// Retry guidance.
    pub status: ErrorStatus,
    /// Collection context (if applicable).
    pub collection: Option<String>,
    /// Backend identifier (e.g., "Sqlite", "Memory").
    pub backend: Option<&'static str>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StoreError {
    /// Create a new store error.
    #[must_use]
    pub fn new(kind: StoreErrorKind) -> Self {
        Self {
            kind,
            status: ErrorStatus::Permanent,
            collection: None,
            backend: None,
            source: None,
        }
    }

    /// Attach collection context.
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Attach backend identifier.
    #[must_use]
    pub fn with_backend(mut self, backend: &'static str) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set retry status.
    #[must_use]
    pub fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = status;
        self
    }

    /// Attach the underlying error source.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Downcast the source error to a concrete type.
    #[must_use]
    pub fn downcast_source<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.as_ref()?.downcast_ref()
    }

    /// Create a timeout error for an operation that exceeded its budget.
    #[must_use]
    pub fn timeout() -> Self {
        Self::new(StoreErrorKind::Timeout).with_status(ErrorStatus::Temporary)
    }

    /// Whether retrying the operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.status != ErrorStatus::Permanent
    }

    /// Create a store error from an I/O error.
    #[must_use]
    pub fn io(err: std::io::Error) -> Self {
        let (kind, status) = match err.kind() {
            std::io::ErrorKind::NotFound => (StoreErrorKind::NotFound, ErrorStatus::Permanent),
            std::io::ErrorKind::TimedOut => (StoreErrorKind::Timeout, ErrorStatus::Temporary),
            std::io::ErrorKind::PermissionDenied => {
                (StoreErrorKind::Unavailable, ErrorStatus::Permanent)
            }
            _ => (StoreErrorKind::Other, ErrorStatus::Permanent),
        };
        Self::new(kind).with_status(status).with_source(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Format: "[Backend] Kind: message (collection: content/guide)"
        if let Some(backend) = self.backend {
            write!(f, "[{backend}] ")?;
        }

        let kind_str = match self.kind {
            StoreErrorKind::NotFound => "Not found",
            StoreErrorKind::Timeout => "Timeout",
            StoreErrorKind::Unavailable => "Unavailable",
            StoreErrorKind::Conflict => "Conflict",
            StoreErrorKind::InvalidData => "Invalid data",
            StoreErrorKind::Other => "Error",
        };

        write!(f, "{kind_str}")?;

        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }

        if let Some(collection) = &self.collection {
            write!(f, " (collection: {collection})")?;
        }

        Ok(())
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Persistent post store.
///
/// Implementations must be safe for concurrent use: the sync engine writes while
/// request handlers read. Writes are keyed by `(collection, url)` and the last
/// writer wins.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Insert the post, or replace the one with the same `(collection, url)`.
    async fn upsert(&self, post: &Post) -> Result<UpsertOutcome, StoreError>;

    /// Delete a single post.
    ///
    /// Returns `false` when no post matched; that is not an error.
    async fn delete_one(&self, collection: &str, url: &str) -> Result<bool, StoreError>;

    /// Delete every post of a collection, returning how many were removed.
    async fn delete_many(&self, collection: &str) -> Result<u64, StoreError>;

    /// Distinct collection names, sorted.
    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// Posts of a collection ordered by title.
    async fn list_by_collection(&self, collection: &str) -> Result<Vec<Post>, StoreError>;

    /// The landing page of a collection, if one is stored.
    async fn find_index(&self, collection: &str) -> Result<Option<Post>, StoreError>;

    /// The first post with the given url in any collection.
    async fn find_by_url(&self, url: &str) -> Result<Option<Post>, StoreError>;
}
