//! `SQLite` post store.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::post::{Post, UpsertOutcome};
use crate::store::{ErrorStatus, PostStore, StoreError, StoreErrorKind};

const BACKEND: &str = "Sqlite";

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS posts (
    collection TEXT NOT NULL,
    url        TEXT NOT NULL,
    title      TEXT NOT NULL,
    body       TEXT NOT NULL,
    is_index   INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (collection, url)
);
CREATE INDEX IF NOT EXISTS idx_posts_url ON posts (url);
";

/// Post store backed by a `SQLite` database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database file at `path`.
    ///
    /// Parent directories are created and the schema is applied.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_parent_dir(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(from_sqlx)?;

        Self::with_pool(pool).await
    }

    /// Open a private in-memory database.
    ///
    /// The pool is pinned to one connection that never expires, since every new
    /// connection to `:memory:` would see an empty database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(from_sqlx)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(from_sqlx)?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(from_sqlx)?;
        tracing::debug!("Post schema ready");
        Ok(Self { pool })
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn create_parent_dir(dir: &Path) -> Result<(), StoreError> {
    std::fs::create_dir_all(dir).map_err(|e| StoreError::io(e).with_backend(BACKEND))
}

/// Map a `sqlx` error onto the store taxonomy.
fn from_sqlx(err: sqlx::Error) -> StoreError {
    let (kind, status) = match &err {
        sqlx::Error::RowNotFound => (StoreErrorKind::NotFound, ErrorStatus::Permanent),
        sqlx::Error::PoolTimedOut => (StoreErrorKind::Timeout, ErrorStatus::Temporary),
        sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
            (StoreErrorKind::Unavailable, ErrorStatus::Persistent)
        }
        sqlx::Error::Io(_) => (StoreErrorKind::Unavailable, ErrorStatus::Temporary),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            (StoreErrorKind::InvalidData, ErrorStatus::Permanent)
        }
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            (StoreErrorKind::Conflict, ErrorStatus::Permanent)
        }
        sqlx::Error::Database(_) => (StoreErrorKind::Unavailable, ErrorStatus::Temporary),
        _ => (StoreErrorKind::Other, ErrorStatus::Permanent),
    };
    StoreError::new(kind)
        .with_status(status)
        .with_backend(BACKEND)
        .with_source(err)
}

#[async_trait]
impl PostStore for SqliteStore {
    async fn upsert(&self, post: &Post) -> Result<UpsertOutcome, StoreError> {
        let with_context = |e: sqlx::Error| from_sqlx(e).with_collection(post.collection.as_str());
        let mut tx = self.pool.begin().await.map_err(with_context)?;

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM posts WHERE collection = ? AND url = ?")
                .bind(&post.collection)
                .bind(&post.url)
                .fetch_optional(&mut *tx)
                .await
                .map_err(with_context)?;

        sqlx::query(
            r"
            INSERT INTO posts (collection, url, title, body, is_index)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(collection, url) DO UPDATE SET
                title = excluded.title,
                body = excluded.body,
                is_index = excluded.is_index
            ",
        )
        .bind(&post.collection)
        .bind(&post.url)
        .bind(&post.title)
        .bind(&post.body)
        .bind(post.is_index)
        .execute(&mut *tx)
        .await
        .map_err(with_context)?;

        tx.commit().await.map_err(with_context)?;

        Ok(if exists.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    async fn delete_one(&self, collection: &str, url: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM posts WHERE collection = ? AND url = ?")
            .bind(collection)
            .bind(url)
            .execute(&self.pool)
            .await
            .map_err(|e| from_sqlx(e).with_collection(collection))?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_many(&self, collection: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM posts WHERE collection = ?")
            .bind(collection)
            .execute(&self.pool)
            .await
            .map_err(|e| from_sqlx(e).with_collection(collection))?;
        Ok(result.rows_affected())
    }

    async fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar("SELECT DISTINCT collection FROM posts ORDER BY collection")
            .fetch_all(&self.pool)
            .await
            .map_err(from_sqlx)
    }

    async fn list_by_collection(&self, collection: &str) -> Result<Vec<Post>, StoreError> {
        sqlx::query_as::<_, Post>(
            "SELECT title, body, url, collection, is_index FROM posts
             WHERE collection = ? ORDER BY title, url",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| from_sqlx(e).with_collection(collection))
    }

    async fn find_index(&self, collection: &str) -> Result<Option<Post>, StoreError> {
        sqlx::query_as::<_, Post>(
            "SELECT title, body, url, collection, is_index FROM posts
             WHERE collection = ? AND is_index = 1 ORDER BY url LIMIT 1",
        )
        .bind(collection)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| from_sqlx(e).with_collection(collection))
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<Post>, StoreError> {
        sqlx::query_as::<_, Post>(
            "SELECT title, body, url, collection, is_index FROM posts
             WHERE url = ? ORDER BY collection LIMIT 1",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(from_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_sqlite_store_is_send_sync() {
        assert_send_sync::<SqliteStore>();
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates() {
        let store = SqliteStore::in_memory().await.unwrap();
        let post = Post::new("content/guide", "intro", "Intro", "v1");

        assert_eq!(store.upsert(&post).await.unwrap(), UpsertOutcome::Inserted);

        let changed = Post::new("content/guide", "intro", "Intro", "v2");
        assert_eq!(store.upsert(&changed).await.unwrap(), UpsertOutcome::Updated);

        let posts = store.list_by_collection("content/guide").await.unwrap();
        assert_eq!(posts, vec![changed]);
    }

    #[tokio::test]
    async fn test_same_url_in_two_collections() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .upsert(&Post::new("content/a", "notes", "A notes", ""))
            .await
            .unwrap();
        store
            .upsert(&Post::new("content/b", "notes", "B notes", ""))
            .await
            .unwrap();

        assert_eq!(
            store.list_collections().await.unwrap(),
            vec!["content/a".to_owned(), "content/b".to_owned()]
        );
        let found = store.find_by_url("notes").await.unwrap().unwrap();
        assert_eq!(found.collection, "content/a");
    }

    #[tokio::test]
    async fn test_delete_one_missing_is_not_error() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .upsert(&Post::new("content/a", "notes", "Notes", ""))
            .await
            .unwrap();

        assert!(store.delete_one("content/a", "notes").await.unwrap());
        assert!(!store.delete_one("content/a", "notes").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_many() {
        let store = SqliteStore::in_memory().await.unwrap();
        for url in ["one", "two"] {
            store
                .upsert(&Post::new("content/a", url, url, ""))
                .await
                .unwrap();
        }
        store
            .upsert(&Post::new("content/b", "three", "three", ""))
            .await
            .unwrap();

        assert_eq!(store.delete_many("content/a").await.unwrap(), 2);
        assert_eq!(
            store.list_collections().await.unwrap(),
            vec!["content/b".to_owned()]
        );
        assert_eq!(store.delete_many("content/a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_by_collection_ordered_by_title() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .upsert(&Post::new("content/a", "z", "Beta", ""))
            .await
            .unwrap();
        store
            .upsert(&Post::new("content/a", "y", "Alpha", ""))
            .await
            .unwrap();

        let titles: Vec<String> = store
            .list_by_collection("content/a")
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["Alpha".to_owned(), "Beta".to_owned()]);
    }

    #[tokio::test]
    async fn test_find_index() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.find_index("content/a").await.unwrap().is_none());

        let index = Post::new("content/a", "content-a-index", "Welcome", "hi").into_index();
        store.upsert(&index).await.unwrap();
        store
            .upsert(&Post::new("content/a", "notes", "Notes", ""))
            .await
            .unwrap();

        assert_eq!(store.find_index("content/a").await.unwrap(), Some(index));
    }

    #[tokio::test]
    async fn test_open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("posts.db");

        let store = SqliteStore::open(&path).await.unwrap();
        store
            .upsert(&Post::new("content/a", "notes", "Notes", ""))
            .await
            .unwrap();
        store.close().await;

        assert!(path.exists());
        let reopened = SqliteStore::open(&path).await.unwrap();
        assert_eq!(reopened.list_by_collection("content/a").await.unwrap().len(), 1);
    }
}
