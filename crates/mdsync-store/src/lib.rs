//! Post store for mdsync.
//!
//! This crate provides the [`PostStore`] trait that the sync engine writes through and
//! the HTTP handlers read from. A store holds [`Post`] records keyed by
//! `(collection, url)`; a collection is nothing more than the distinct values of
//! `Post::collection`.
//!
//! # Architecture
//!
//! The crate provides:
//! - [`PostStore`] trait with upsert, single and bulk delete, and lookup queries
//! - [`StoreError`] carrying a semantic [`StoreErrorKind`] and retry [`ErrorStatus`]
//! - [`SqliteStore`] backed by `sqlx`
//! - [`MemoryStore`] for testing (behind `mock` feature flag)
//!
//! # Example
//!
//! ```ignore
//! use mdsync_store::{Post, PostStore, SqliteStore};
//!
//! let store = SqliteStore::in_memory().await?;
//! store.upsert(&Post::new("content/guide", "intro", "Intro", "# Intro")).await?;
//! let posts = store.list_by_collection("content/guide").await?;
//! ```

#[cfg(feature = "mock")]
mod memory;
mod post;
mod sqlite;
mod store;

#[cfg(feature = "mock")]
pub use memory::{MemoryStore, StoreCall};
pub use post::{Post, UpsertOutcome};
pub use sqlite::SqliteStore;
pub use store::{ErrorStatus, PostStore, StoreError, StoreErrorKind};
