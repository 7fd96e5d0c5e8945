//! End-to-end cycles against the in-memory store.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mdsync_config::{FailurePolicy, SyncConfig};
use mdsync_diagrams::Passthrough;
use mdsync_store::{MemoryStore, Post, StoreCall};
use mdsync_sync::{BusMessage, NotificationBus, SyncEngine, SyncError, SyncScheduler};
use pretty_assertions::assert_eq;
use tokio::sync::watch;

fn config(root: &Path) -> SyncConfig {
    SyncConfig::with_root(root.to_path_buf())
}

fn engine_with(config: &SyncConfig, store: &Arc<MemoryStore>) -> SyncEngine {
    SyncEngine::new(
        config,
        Arc::clone(store) as Arc<dyn mdsync_store::PostStore>,
        Arc::new(Passthrough),
        Arc::new(NotificationBus::new(config.subscriber_capacity)),
    )
}

fn engine(root: &Path, store: &Arc<MemoryStore>) -> SyncEngine {
    engine_with(&config(root), store)
}

fn writes(store: &MemoryStore) -> Vec<StoreCall> {
    store.calls().into_iter().filter(StoreCall::is_write).collect()
}

fn keys(store: &MemoryStore) -> Vec<(String, String, bool)> {
    store
        .posts()
        .into_iter()
        .map(|p| (p.collection, p.url, p.is_index))
        .collect()
}

fn key(collection: &str, url: &str, is_index: bool) -> (String, String, bool) {
    (collection.to_owned(), url.to_owned(), is_index)
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[tokio::test]
async fn test_example_scenario() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let store = Arc::new(MemoryStore::new());
    let mut engine = engine(root, &store);
    write(root, "A/index.md", "# Welcome");
    write(root, "A/notes.md", "# Notes");

    engine.run_cycle().await.unwrap();

    assert_eq!(
        keys(&store),
        vec![
            key("content/A", "content-A-index", true),
            key("content/A", "notes", false),
        ]
    );
    assert_eq!(store.get("content/A", "notes").unwrap().title, "Notes");

    fs::remove_file(root.join("A/notes.md")).unwrap();
    store.clear_calls();
    engine.run_cycle().await.unwrap();

    assert_eq!(
        writes(&store),
        vec![StoreCall::DeleteOne {
            collection: "content/A".to_owned(),
            url: "notes".to_owned(),
        }]
    );
    assert_eq!(keys(&store), vec![key("content/A", "content-A-index", true)]);

    fs::remove_dir_all(root.join("A")).unwrap();
    store.clear_calls();
    let report = engine.run_cycle().await.unwrap();

    assert_eq!(
        writes(&store),
        vec![StoreCall::DeleteMany {
            collection: "content/A".to_owned(),
        }]
    );
    assert_eq!(report.changes.purged, 1);
    assert!(store.posts().is_empty());
}

#[tokio::test]
async fn test_unchanged_tree_makes_no_store_calls() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let store = Arc::new(MemoryStore::new());
    let mut engine = engine(root, &store);
    write(root, "A/index.md", "# Welcome");
    write(root, "top.md", "# Top");

    engine.run_cycle().await.unwrap();
    store.clear_calls();
    let report = engine.run_cycle().await.unwrap();

    assert!(store.calls().is_empty());
    assert_eq!(report.touched(), 0);
    assert_eq!(report.broadcast, None);
}

#[tokio::test]
async fn test_modified_file_is_upserted_once() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let store = Arc::new(MemoryStore::new());
    let mut engine = engine(root, &store);
    write(root, "A/page.md", "# First");
    engine.run_cycle().await.unwrap();

    write(root, "A/page.md", "# Second");
    store.clear_calls();
    engine.run_cycle().await.unwrap();

    assert_eq!(
        writes(&store),
        vec![StoreCall::Upsert {
            collection: "content/A".to_owned(),
            url: "page".to_owned(),
        }]
    );
    assert_eq!(store.get("content/A", "page").unwrap().title, "Second");
}

#[tokio::test]
async fn test_collection_removal_issues_single_bulk_delete() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let store = Arc::new(MemoryStore::new());
    let mut engine = engine(root, &store);
    write(root, "A/index.md", "# A");
    write(root, "A/one.md", "1");
    write(root, "A/nested/two.md", "2");
    write(root, "B/keep.md", "b");
    engine.run_cycle().await.unwrap();

    fs::remove_dir_all(root.join("A")).unwrap();
    store.clear_calls();
    engine.run_cycle().await.unwrap();

    let calls = writes(&store);
    assert_eq!(
        calls,
        vec![StoreCall::DeleteMany {
            collection: "content/A".to_owned(),
        }]
    );
    assert_eq!(keys(&store), vec![key("content/B", "keep", false)]);
}

#[tokio::test]
async fn test_index_rename_switches_url() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let store = Arc::new(MemoryStore::new());
    let mut engine = engine(root, &store);
    write(root, "Guide/intro.md", "# Intro");
    engine.run_cycle().await.unwrap();
    assert_eq!(keys(&store), vec![key("content/Guide", "intro", false)]);

    fs::rename(root.join("Guide/intro.md"), root.join("Guide/README.md")).unwrap();
    engine.run_cycle().await.unwrap();
    assert_eq!(
        keys(&store),
        vec![key("content/Guide", "content-Guide-index", true)]
    );

    fs::rename(root.join("Guide/README.md"), root.join("Guide/intro.md")).unwrap();
    engine.run_cycle().await.unwrap();
    assert_eq!(keys(&store), vec![key("content/Guide", "intro", false)]);
}

#[tokio::test]
async fn test_removing_nested_index_keeps_collection_index() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let store = Arc::new(MemoryStore::new());
    let mut engine = engine(root, &store);
    write(root, "A/index.md", "# Welcome");
    write(root, "A/deep/index.md", "# Deep");
    engine.run_cycle().await.unwrap();

    fs::remove_dir_all(root.join("A/deep")).unwrap();
    engine.run_cycle().await.unwrap();
    engine.run_cycle().await.unwrap();

    let index = store.get("content/A", "content-A-index").unwrap();
    assert_eq!(index.title, "Welcome");
    assert!(index.is_index);
}

#[tokio::test]
async fn test_removing_index_hands_key_to_nested_index() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let store = Arc::new(MemoryStore::new());
    let mut engine = engine(root, &store);
    write(root, "A/index.md", "# Welcome");
    write(root, "A/deep/index.md", "# Deep");
    engine.run_cycle().await.unwrap();

    fs::remove_file(root.join("A/index.md")).unwrap();
    store.clear_calls();
    engine.run_cycle().await.unwrap();

    assert_eq!(
        writes(&store),
        vec![StoreCall::Upsert {
            collection: "content/A".to_owned(),
            url: "content-A-index".to_owned(),
        }]
    );
    assert_eq!(store.get("content/A", "content-A-index").unwrap().title, "Deep");
}

#[tokio::test]
async fn test_removing_one_of_colliding_slugs_keeps_document() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let store = Arc::new(MemoryStore::new());
    let mut engine = engine(root, &store);
    write(root, "A/b c.md", "# Spaced");
    write(root, "A/b-c.md", "# Dashed");
    engine.run_cycle().await.unwrap();

    fs::remove_file(root.join("A/b c.md")).unwrap();
    engine.run_cycle().await.unwrap();
    engine.run_cycle().await.unwrap();

    assert_eq!(keys(&store), vec![key("content/A", "b-c", false)]);
    assert_eq!(store.get("content/A", "b-c").unwrap().title, "Dashed");
}

#[tokio::test]
async fn test_restart_converges_through_prune() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let store = Arc::new(
        MemoryStore::new().with_post(Post::new("uploads/manual", "kept", "Kept", "")),
    );
    write(root, "A/index.md", "# A");
    write(root, "A/old.md", "old");
    write(root, "B/x.md", "x");
    engine(root, &store).run_cycle().await.unwrap();

    // Changes while no process is running
    fs::remove_file(root.join("A/old.md")).unwrap();
    fs::remove_dir_all(root.join("B")).unwrap();
    write(root, "C/new.md", "new");

    let report = engine(root, &store).run_cycle().await.unwrap();

    assert_eq!(
        keys(&store),
        vec![
            key("content/A", "content-A-index", true),
            key("content/C", "new", false),
            key("uploads/manual", "kept", false),
        ]
    );
    assert_eq!(report.changes.collections_deleted, 1);
    assert_eq!(report.changes.deleted, 1);
}

#[tokio::test]
async fn test_prune_retried_after_listing_failure() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let store =
        Arc::new(MemoryStore::new().with_post(Post::new("content/Gone", "x", "X", "")));
    write(root, "A/page.md", "# Page");
    let mut engine = engine(root, &store);

    store.set_failing_listing(true);
    engine.run_cycle().await.unwrap();
    assert!(store.get("content/Gone", "x").is_some());

    store.set_failing_listing(false);
    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.changes.collections_deleted, 1);
    assert_eq!(keys(&store), vec![key("content/A", "page", false)]);

    store.clear_calls();
    engine.run_cycle().await.unwrap();
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_prune_disabled_leaves_orphans() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let store =
        Arc::new(MemoryStore::new().with_post(Post::new("content/Gone", "x", "X", "")));
    let mut config = config(root);
    config.prune_on_start = false;

    engine_with(&config, &store).run_cycle().await.unwrap();

    assert_eq!(keys(&store), vec![key("content/Gone", "x", false)]);
}

#[tokio::test]
async fn test_forget_policy_drops_failed_upsert() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let store = Arc::new(MemoryStore::new().with_failing_url("flaky"));
    let mut engine = engine(root, &store);
    write(root, "A/flaky.md", "x");

    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.failed(), 1);

    store.set_failing_url("flaky", false);
    store.clear_calls();
    engine.run_cycle().await.unwrap();

    assert!(writes(&store).is_empty());
    assert!(store.get("content/A", "flaky").is_none());
}

#[tokio::test]
async fn test_retry_policy_retries_failed_upsert() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let store = Arc::new(MemoryStore::new().with_failing_url("flaky"));
    let mut config = config(root);
    config.failure_policy = FailurePolicy::Retry;
    let mut engine = engine_with(&config, &store);
    write(root, "A/flaky.md", "x");

    engine.run_cycle().await.unwrap();
    store.set_failing_url("flaky", false);
    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.changes.upserted, 1);
    assert!(store.get("content/A", "flaky").is_some());
}

#[tokio::test]
async fn test_retry_policy_retries_failed_delete() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let store = Arc::new(MemoryStore::new());
    let mut config = config(root);
    config.failure_policy = FailurePolicy::Retry;
    let mut engine = engine_with(&config, &store);
    write(root, "A/index.md", "# A");
    write(root, "A/doomed.md", "x");
    engine.run_cycle().await.unwrap();

    fs::remove_file(root.join("A/doomed.md")).unwrap();
    store.set_failing_url("doomed", true);
    let report = engine.run_cycle().await.unwrap();
    assert_eq!(report.failed(), 1);

    store.set_failing_url("doomed", false);
    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.changes.deleted, 1);
    assert!(store.get("content/A", "doomed").is_none());
}

#[tokio::test]
async fn test_scan_error_then_recovery() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path().join("content");
    let store = Arc::new(MemoryStore::new());
    let mut engine = engine(&root, &store);

    let err = engine.run_cycle().await.unwrap_err();
    assert!(matches!(err, SyncError::Scan(_)));
    assert!(store.calls().is_empty());

    write(&root, "A/index.md", "# Back");
    engine.run_cycle().await.unwrap();

    assert_eq!(keys(&store), vec![key("content/A", "content-A-index", true)]);
}

#[tokio::test]
async fn test_reload_broadcast_after_changes() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let store = Arc::new(MemoryStore::new());
    let mut engine = engine(root, &store);
    let mut sub = engine.bus().subscribe();
    write(root, "top.md", "# Top");

    let report = engine.run_cycle().await.unwrap();

    assert_eq!(report.broadcast.map(|b| b.delivered), Some(1));
    assert_eq!(sub.recv().await, Some(BusMessage::Connected));
    assert_eq!(sub.recv().await, Some(BusMessage::Reload));
}

#[tokio::test]
async fn test_stalled_subscriber_never_blocks_cycles() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let store = Arc::new(MemoryStore::new());
    let mut config = config(root);
    config.subscriber_capacity = 1;
    let mut engine = engine_with(&config, &store);
    let _stalled = engine.bus().subscribe();
    let mut live = engine.bus().subscribe();
    assert_eq!(live.try_recv(), Some(BusMessage::Connected));

    for i in 0..3 {
        write(root, "page.md", &format!("# Version {i}"));
        let report = tokio::time::timeout(Duration::from_secs(5), engine.run_cycle())
            .await
            .unwrap()
            .unwrap();
        let outcome = report.broadcast.unwrap();
        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(live.try_recv(), Some(BusMessage::Reload));
    }
}

#[tokio::test]
async fn test_concurrent_triggers_coalesce_into_one_cycle() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write(root, "A/one.md", "1");
    write(root, "A/two.md", "2");
    let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(100)));
    let engine = engine(root, &store);
    let (_shutdown_tx, shutdown) = watch::channel(false);

    let (handle, _task) =
        SyncScheduler::spawn(engine, Some(Duration::from_secs(3600)), shutdown);
    // Let the immediate first cycle start
    tokio::time::sleep(Duration::from_millis(50)).await;

    let waiters: Vec<_> = (0..5)
        .map(|_| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.run_now().await })
        })
        .collect();

    let mut cycles = Vec::new();
    for waiter in waiters {
        cycles.push(waiter.await.unwrap().unwrap().cycle);
    }

    assert_eq!(cycles, vec![2; 5]);
}
