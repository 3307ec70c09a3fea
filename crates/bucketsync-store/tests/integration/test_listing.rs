//! Paginated ListObjectsV2 against a mocked endpoint

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use bucketsync_core::domain::StoreError;
use bucketsync_core::ports::IObjectStore;

use crate::common::{self, BUCKET};

#[tokio::test]
async fn test_list_follows_continuation_token() {
    let (server, store) = common::setup_store_mock().await;
    let bucket_path = format!("/{BUCKET}");

    // Second page, matched first by priority when the token is present
    Mock::given(method("GET"))
        .and(path(bucket_path.as_str()))
        .and(query_param("continuation-token", "page-2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(common::list_body(&["data/a/3.json"], None)),
        )
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(bucket_path.as_str()))
        .and(query_param("list-type", "2"))
        .and(query_param("prefix", "data/a/"))
        .and(query_param("max-keys", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(common::list_body(
            &["data/a/1.json", "data/a/2.json"],
            Some("page-2"),
        )))
        .with_priority(5)
        .mount(&server)
        .await;

    let first = store.list_page("a/", None, 2).await.expect("first page");
    let keys: Vec<_> = first.entries.iter().map(|e| e.key.as_str()).collect();
    assert_eq!(keys, vec!["a/1.json", "a/2.json"]);
    assert_eq!(first.entries[0].key_raw, "data/a/1.json");
    assert_eq!(first.entries[0].etag, "d41d8cd98f00b204e9800998ecf8427e");

    let token = first.next_continuation.expect("continuation token");
    let second = store
        .list_page("a/", Some(&token), 2)
        .await
        .expect("second page");
    assert_eq!(second.entries.len(), 1);
    assert_eq!(second.entries[0].key, "a/3.json");
    assert!(second.next_continuation.is_none());
}

#[tokio::test]
async fn test_list_error_status() {
    let (server, store) = common::setup_store_mock().await;
    Mock::given(method("GET"))
        .and(path(format!("/{BUCKET}").as_str()))
        .respond_with(ResponseTemplate::new(401).set_body_string("AccessDenied"))
        .mount(&server)
        .await;

    let err = store.list_page("", None, 500).await.unwrap_err();
    assert!(matches!(err, StoreError::Unauthorized(_)));
}

#[tokio::test]
async fn test_list_malformed_body() {
    let (server, store) = common::setup_store_mock().await;
    Mock::given(method("GET"))
        .and(path(format!("/{BUCKET}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "<ListBucketResult><Contents><Key>k</Key></Contents></ListBucketResult>",
        ))
        .mount(&server)
        .await;

    let err = store.list_page("", None, 500).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidResponse(_)));
}
