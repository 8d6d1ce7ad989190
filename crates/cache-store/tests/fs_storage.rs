use chrono::Duration as ChronoDuration;
use soulpilot_cache_store::{CacheErrKind, CacheStorage, FsCacheStorage, StoragePolicy};
use tempfile::tempdir;

#[tokio::test]
async fn root_is_created_lazily_on_first_put() {
    let tmp = tempdir().expect("temp dir");
    let root = tmp.path().join("cache");
    let store = FsCacheStorage::new(StoragePolicy::new(&root).with_namespace("agent"));

    assert!(!root.exists(), "construction must not touch the disk");
    assert!(store.get("missing").await.expect("get").is_none());
    assert!(!store.exists("missing").await.expect("exists"));
    assert!(!root.exists(), "reads must not create the root");

    store.put("fp-1", b"{\"ok\":true}").await.expect("put");
    assert!(root.join("agent").is_dir());
    assert_eq!(
        store.get("fp-1").await.expect("get"),
        Some(b"{\"ok\":true}".to_vec())
    );
    assert!(store.exists("fp-1").await.expect("exists"));
}

#[tokio::test]
async fn overwrite_leaves_no_temp_files() {
    let tmp = tempdir().expect("temp dir");
    let store = FsCacheStorage::new(StoragePolicy::new(tmp.path()));

    store.put("fp", b"first").await.expect("put first");
    store.put("fp", b"second").await.expect("put second");
    assert_eq!(store.get("fp").await.expect("get"), Some(b"second".to_vec()));

    let entries = store.entries().await.expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key, "fp");
    assert_eq!(entries[0].bytes, 6);

    let mut leftovers = Vec::new();
    let mut stack = vec![store.root()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(dir).expect("read dir") {
            let path = entry.expect("entry").path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().and_then(|e| e.to_str()) == Some("tmp") {
                leftovers.push(path);
            }
        }
    }
    assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
}

#[tokio::test]
async fn read_only_policy_rejects_writes() {
    let tmp = tempdir().expect("temp dir");
    let policy = StoragePolicy {
        read_only: true,
        ..StoragePolicy::new(tmp.path())
    };
    let store = FsCacheStorage::new(policy);
    let err = store.put("fp", b"x").await.expect_err("read-only");
    assert!(matches!(err.kind(), CacheErrKind::ReadOnly));
}

#[tokio::test]
async fn remove_and_prune() {
    let tmp = tempdir().expect("temp dir");
    let store = FsCacheStorage::new(StoragePolicy::new(tmp.path()));
    store.put("a", b"1").await.expect("put a");
    store.put("b", b"2").await.expect("put b");

    assert!(store.remove("a").await.expect("remove"));
    assert!(!store.remove("a").await.expect("remove twice"));

    // Nothing is older than an hour yet.
    assert_eq!(
        store
            .prune_older_than(ChronoDuration::hours(1))
            .await
            .expect("prune"),
        0
    );
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(
        store
            .prune_older_than(ChronoDuration::milliseconds(1))
            .await
            .expect("prune"),
        1
    );
    assert!(store.entries().await.expect("entries").is_empty());
}

#[tokio::test]
async fn prune_clears_abandoned_temp_files() {
    let tmp = tempdir().expect("temp dir");
    let store = FsCacheStorage::new(StoragePolicy::new(tmp.path()));
    store.put("kept", b"1").await.expect("put");

    let entry = soulpilot_cache_store::fs::layout::entry_path(&store.root(), "kept");
    let abandoned = entry.with_extension("5e1f0c.tmp");
    std::fs::write(&abandoned, b"partial").expect("write temp");

    assert_eq!(
        store
            .prune_older_than(ChronoDuration::hours(1))
            .await
            .expect("prune"),
        0
    );
    assert!(abandoned.exists(), "a fresh temp file may still be in use");

    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    store.put("fresh", b"2").await.expect("put fresh");
    store
        .prune_older_than(ChronoDuration::milliseconds(150))
        .await
        .expect("prune");
    assert!(!abandoned.exists());
    assert_eq!(store.get("fresh").await.expect("get"), Some(b"2".to_vec()));
    assert!(store.get("kept").await.expect("get").is_none());
}
