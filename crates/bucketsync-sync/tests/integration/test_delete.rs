//! Recursive and identifier-addressed deletes

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use bucketsync_core::domain::id_to_path;
use bucketsync_store::MemoryObjectStore;
use bucketsync_sync::lister::{ListOptions, Lister};
use bucketsync_sync::SyncError;

use crate::common::{limiter, lister, CancelAfterWrites};

fn seeded(keys: &[&str]) -> Arc<MemoryObjectStore> {
    let store = Arc::new(MemoryObjectStore::new());
    for key in keys {
        store.insert(key, Bytes::from_static(b"x"));
    }
    store
}

fn paged(max_keys: usize, strict: bool) -> ListOptions {
    ListOptions {
        max_keys,
        strict,
        timings: false,
    }
}

#[tokio::test]
async fn test_children_are_deleted_before_path() {
    let keys = [
        "a/b", "a/b/1", "a/b/2", "a/b/3", "a/b/4", "a/b/5", "a/b/x/1", "a/b/x/2", "a/bc", "a/c",
    ];
    let store = seeded(&keys);

    lister(&store, paged(3, false)).delete_recursive("a/b").await.unwrap();

    assert_eq!(store.keys(), vec!["a/bc", "a/c"]);
    let log = store.delete_log();
    assert_eq!(log.last().map(String::as_str), Some("a/b"));
    assert_eq!(log.iter().filter(|k| k.as_str() == "a/b").count(), 1);
    for child in ["a/b/1", "a/b/2", "a/b/3", "a/b/4", "a/b/5", "a/b/x/1", "a/b/x/2"] {
        assert!(log.iter().any(|k| k == child), "{child} not deleted");
    }
    assert!(!log.iter().any(|k| k == "a/bc" || k == "a/c"));
}

#[tokio::test]
async fn test_trailing_slash_marker_is_not_expanded() {
    let store = seeded(&["d/", "d/1"]);

    lister(&store, paged(10, false)).delete_recursive("d/").await.unwrap();

    assert!(store.is_empty());
    let log = store.delete_log();
    assert_eq!(log.last().map(String::as_str), Some("d/"));
    assert_eq!(log.iter().filter(|k| k.as_str() == "d/").count(), 1);
}

#[tokio::test]
async fn test_delete_by_identifier() {
    let path = id_to_path(1159324849).unwrap();
    assert_eq!(path, "115/932/484/9");
    let store = seeded(&["115/932/484/9/a.json", "115/932/484/9/b/c.json", "115/932/484/90/keep"]);

    lister(&store, paged(500, false)).delete_recursive(&path).await.unwrap();

    assert_eq!(store.keys(), vec!["115/932/484/90/keep"]);
}

#[tokio::test]
async fn test_strict_failure_keeps_parent() {
    let store = seeded(&["a/b", "a/b/1", "a/b/2"]);
    store.fail_deletes("a/b/1", 1);

    let err = lister(&store, paged(10, true)).delete_recursive("a/b").await.unwrap_err();

    assert!(matches!(err, SyncError::Store(_)));
    assert!(store.object("a/b").is_some());
    assert!(!store.delete_log().contains(&"a/b".to_string()));
}

#[tokio::test]
async fn test_best_effort_failure_still_deletes_parent() {
    let store = seeded(&["a/b", "a/b/1", "a/b/2"]);
    store.fail_deletes("a/b/1", 1);

    lister(&store, paged(10, false)).delete_recursive("a/b").await.unwrap();

    assert_eq!(store.keys(), vec!["a/b/1"]);
}

#[tokio::test]
async fn test_cancel_during_children_keeps_parent() {
    let store = seeded(&["a/b", "a/b/1", "a/b/2", "a/b/3", "a/b/4", "a/b/5"]);
    let cancel = CancellationToken::new();
    let lister = Lister::new(
        CancelAfterWrites::new(&store, &cancel, 1),
        limiter(),
        paged(10, false),
        cancel.clone(),
    );

    let err = lister.delete_recursive("a/b").await.unwrap_err();

    assert!(matches!(err, SyncError::Cancelled));
    assert!(store.object("a/b").is_some());
    // Children still queued observe the token and never issue a DELETE
    assert_eq!(store.delete_log(), vec!["a/b/1"]);
    assert_eq!(store.keys(), vec!["a/b", "a/b/2", "a/b/3", "a/b/4", "a/b/5"]);
}
