//! Sync pass behaviour: change detection, retries and counters

use std::sync::Arc;

use bytes::Bytes;
use chrono::{Duration, Utc};

use tokio_util::sync::CancellationToken;

use bucketsync_store::MemoryObjectStore;
use bucketsync_sync::{SyncCoordinator, SyncError, SyncOptions};

use crate::common::{coordinator, key, limiter, options, write_files, CancelAfterWrites};

/// Paths `f000.json` .. `f099.json`, of which only the first `existing` are on disk
fn hundred_paths(dir: &std::path::Path, existing: usize) -> Vec<String> {
    write_files(dir, existing);
    (0..100).map(key).collect()
}

#[tokio::test]
async fn test_second_run_skips_everything() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), 10);
    let store = Arc::new(MemoryObjectStore::new());
    let coordinator = coordinator(&store, options());

    let first = coordinator.sync_directory(dir.path()).await.unwrap();
    assert_eq!(first.stats.scheduled, 10);
    assert_eq!(first.stats.success, 10);
    assert_eq!(store.len(), 10);

    let second = coordinator.sync_directory(dir.path()).await.unwrap();
    assert_eq!(second.stats.scheduled, 10);
    assert_eq!(second.stats.skipped, second.stats.scheduled);
    assert_eq!(second.stats.success, 0);
    assert_eq!(store.put_count(), 10);
}

#[tokio::test]
async fn test_retries_when_failures_at_limit() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), 100);
    let store = Arc::new(MemoryObjectStore::new());
    for i in 0..25 {
        store.fail_puts(&key(i), 1);
    }

    let summary = coordinator(&store, options()).sync_directory(dir.path()).await.unwrap();

    assert_eq!(summary.stats.retried, 25);
    assert_eq!(summary.stats.error, 25);
    assert_eq!(summary.stats.success, 100);
    assert_eq!(summary.stats.scheduled, 125);
    assert!(summary.stats.is_balanced());
    assert_eq!(store.len(), 100);
}

#[tokio::test]
async fn test_excessive_failures_abort_retries() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), 100);
    let store = Arc::new(MemoryObjectStore::new());
    for i in 0..26 {
        store.fail_puts(&key(i), 1);
    }

    let err = coordinator(&store, options()).sync_directory(dir.path()).await.unwrap_err();

    match err {
        SyncError::ExcessiveFailures { percent, stats } => {
            assert!(percent > 25.0 && percent < 26.5, "percent {percent}");
            assert_eq!(stats.retried, 0);
            assert_eq!(stats.error, 26);
            assert_eq!(stats.success, 74);
            assert!(stats.is_balanced());
        }
        other => panic!("unexpected error: {other}"),
    }
    // One attempt per file, nothing resubmitted
    assert_eq!(store.put_count(), 100);
    assert_eq!(store.len(), 74);
}

#[tokio::test]
async fn test_local_failures_count_toward_limit() {
    let dir = tempfile::tempdir().unwrap();
    let paths = hundred_paths(dir.path(), 80);
    let store = Arc::new(MemoryObjectStore::new());
    for i in 0..6 {
        store.fail_puts(&key(i), 1);
    }

    // 20 missing files and 6 failed PUTs: 26 of 100
    let err = coordinator(&store, options())
        .sync_files(&paths, dir.path())
        .await
        .unwrap_err();

    match err {
        SyncError::ExcessiveFailures { percent, stats } => {
            assert!(percent > 25.9 && percent < 26.1, "percent {percent}");
            assert_eq!(stats.retried, 0);
            assert_eq!(stats.error, 26);
            assert_eq!(stats.success, 74);
            assert!(stats.is_balanced());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.put_count(), 80);
    assert_eq!(store.len(), 74);
}

#[tokio::test]
async fn test_mixed_failures_at_limit_retry_remote_only() {
    let dir = tempfile::tempdir().unwrap();
    let paths = hundred_paths(dir.path(), 80);
    let store = Arc::new(MemoryObjectStore::new());
    for i in 0..5 {
        store.fail_puts(&key(i), 1);
    }

    let summary = coordinator(&store, options())
        .sync_files(&paths, dir.path())
        .await
        .unwrap();

    // Only the PUT failures are worth a second attempt
    assert_eq!(summary.stats.retried, 5);
    assert_eq!(summary.stats.error, 25);
    assert_eq!(summary.stats.success, 80);
    assert_eq!(summary.stats.scheduled, 105);
    assert!(summary.stats.is_balanced());
    assert_eq!(store.put_count(), 85);
    assert_eq!(store.len(), 80);
}

#[tokio::test]
async fn test_cancellation_stops_new_uploads() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), 40);
    let store = Arc::new(MemoryObjectStore::new());
    let cancel = CancellationToken::new();
    let workers = options().workers as u64;
    let coordinator = SyncCoordinator::new(
        CancelAfterWrites::new(&store, &cancel, 3),
        limiter(),
        options(),
        cancel.clone(),
    );

    let summary = coordinator.sync_directory(dir.path()).await.unwrap();

    assert!(summary.cancelled);
    let puts = store.put_count();
    // Only tasks already past the start check may still finish
    assert!(puts >= 3 && puts <= 3 + workers, "puts {puts}");
    assert_eq!(summary.stats.success, puts);
    assert_eq!(summary.stats.error, 0);
    assert_eq!(summary.stats.retried, 0);
    assert!(summary.stats.completed < 40);
    assert!(summary.stats.is_balanced());

    // Nothing uploads once the pass has returned
    tokio::task::yield_now().await;
    assert_eq!(store.put_count(), puts);
    assert_eq!(store.len() as u64, puts);
}

#[tokio::test]
async fn test_task_is_retried_at_most_once() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), 10);
    let store = Arc::new(MemoryObjectStore::new());
    store.fail_puts(&key(3), 5);

    let summary = coordinator(&store, options()).sync_directory(dir.path()).await.unwrap();

    assert_eq!(summary.stats.retried, 1);
    assert_eq!(summary.stats.error, 2);
    assert_eq!(summary.stats.success, 9);
    assert_eq!(summary.stats.scheduled, 11);
    assert!(summary.stats.is_balanced());
    // First attempt, one retry, never a third
    assert_eq!(store.put_count(), 11);
    assert!(store.object(&key(3)).is_none());
}

#[tokio::test]
async fn test_transient_head_failure_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), 4);
    let store = Arc::new(MemoryObjectStore::new());
    store.fail_heads(&key(0), 1);

    let summary = coordinator(&store, options()).sync_directory(dir.path()).await.unwrap();

    assert_eq!(summary.stats.retried, 1);
    assert_eq!(summary.stats.success, 4);
    assert_eq!(store.len(), 4);
}

#[tokio::test]
async fn test_newer_remote_is_not_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), 1);
    let store = Arc::new(MemoryObjectStore::new());
    store.insert(&key(0), Bytes::from_static(b"edited elsewhere"));
    store.set_last_modified(&key(0), Utc::now() + Duration::hours(1));

    let summary = coordinator(&store, options()).sync_directory(dir.path()).await.unwrap();

    assert_eq!(summary.stats.skipped, 1);
    assert_eq!(store.put_count(), 0);
    assert_eq!(store.object(&key(0)).unwrap().body.as_ref(), b"edited elsewhere");
}

#[tokio::test]
async fn test_force_uploads_unchanged_files() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), 3);
    let store = Arc::new(MemoryObjectStore::new());
    coordinator(&store, options()).sync_directory(dir.path()).await.unwrap();

    let forced = SyncOptions {
        force: true,
        ..options()
    };
    let summary = coordinator(&store, forced).sync_directory(dir.path()).await.unwrap();

    assert_eq!(summary.stats.success, 3);
    assert_eq!(summary.stats.skipped, 0);
    assert_eq!(store.put_count(), 6);
    assert_eq!(store.counts().head.load(std::sync::atomic::Ordering::Relaxed), 3);
}

#[tokio::test]
async fn test_dry_run_counts_but_does_not_upload() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), 5);
    let store = Arc::new(MemoryObjectStore::new());
    let dry = SyncOptions {
        dry_run: true,
        ..options()
    };

    let summary = coordinator(&store, dry).sync_directory(dir.path()).await.unwrap();

    assert_eq!(summary.stats.success, 5);
    assert_eq!(store.put_count(), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_extension_filter_limits_walk() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), 2);
    std::fs::write(dir.path().join("notes.md"), b"# notes").unwrap();
    let store = Arc::new(MemoryObjectStore::new());
    let filtered = SyncOptions {
        extensions: vec!["json".into()],
        ..options()
    };

    let summary = coordinator(&store, filtered).sync_directory(dir.path()).await.unwrap();

    assert_eq!(summary.stats.scheduled, 2);
    assert_eq!(store.keys(), vec![key(0), key(1)]);
}

#[tokio::test]
async fn test_file_list_entries_and_overrides() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("sub")).unwrap();
    for name in ["sub/a.json", "sub/c.json", "sub/d.json"] {
        std::fs::write(dir.path().join(name), b"{}").unwrap();
    }
    std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
    let list = dir.path().join("list.txt");
    std::fs::write(
        &list,
        "sub/a.json\n\n   \nb.txt#ACL=private\nmissing.json\nsub/c.json\nsub/d.json\n",
    )
    .unwrap();

    let store = Arc::new(MemoryObjectStore::new());
    let with_prefix = SyncOptions {
        prefix: "out".into(),
        ..options()
    };
    let summary = coordinator(&store, with_prefix)
        .sync_file_list(&list, dir.path())
        .await
        .unwrap();

    assert_eq!(summary.stats.scheduled, 5);
    assert_eq!(summary.stats.success, 4);
    // The missing file is a local error and is not retried
    assert_eq!(summary.stats.error, 1);
    assert_eq!(summary.stats.retried, 0);
    assert_eq!(
        store.keys(),
        vec!["out/b.txt", "out/sub/a.json", "out/sub/c.json", "out/sub/d.json"]
    );
    assert_eq!(store.object("out/b.txt").unwrap().options.acl.as_deref(), Some("private"));
    assert_eq!(
        store.object("out/sub/a.json").unwrap().options.acl.as_deref(),
        Some("public-read")
    );
}

#[tokio::test]
async fn test_malformed_file_argument_schedules_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_files(dir.path(), 1);
    let store = Arc::new(MemoryObjectStore::new());

    let err = coordinator(&store, options())
        .sync_files(["f000.json", "f001.json#ACL"], dir.path())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Domain(_)));
    assert_eq!(store.put_count(), 0);
}
