//! HEAD/GET/PUT/DELETE against a mocked S3-compatible endpoint

use bytes::Bytes;
use wiremock::matchers::{body_bytes, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use bucketsync_core::domain::{PutOptions, StoreError};
use bucketsync_core::ports::IObjectStore;

use crate::common::{self, object_path, TOKEN};

#[tokio::test]
async fn test_head_returns_metadata() {
    let (server, store) = common::setup_store_mock().await;
    common::mount_head(
        &server,
        "a/1.json",
        "900150983cd24fb0d6963f7d28e17f72",
        "Wed, 21 Oct 2015 07:28:00 GMT",
    )
    .await;

    let meta = store
        .head("a/1.json")
        .await
        .expect("head failed")
        .expect("object should exist");

    assert_eq!(meta.key, "a/1.json");
    assert_eq!(meta.content_hash(), "900150983cd24fb0d6963f7d28e17f72");
    assert_eq!(meta.last_modified.to_rfc3339(), "2015-10-21T07:28:00+00:00");
}

#[tokio::test]
async fn test_head_not_found_is_none() {
    let (server, store) = common::setup_store_mock().await;
    Mock::given(method("HEAD"))
        .and(path(object_path("missing.json")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(store.head("missing.json").await.unwrap().is_none());
}

#[tokio::test]
async fn test_head_forbidden_is_error() {
    let (server, store) = common::setup_store_mock().await;
    Mock::given(method("HEAD"))
        .and(path(object_path("secret.json")))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = store.head("secret.json").await.unwrap_err();
    assert!(matches!(err, StoreError::Forbidden(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_put_sends_headers_and_body() {
    let (server, store) = common::setup_store_mock().await;
    Mock::given(method("PUT"))
        .and(path(object_path("a/1.json")))
        .and(header("content-type", "application/json"))
        .and(header("x-amz-acl", "public-read"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .and(body_bytes(b"{\"id\":1}".to_vec()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    store
        .put(
            "a/1.json",
            Bytes::from_static(b"{\"id\":1}"),
            &PutOptions::new(Some("application/json"), Some("public-read")),
        )
        .await
        .expect("put failed");
}

#[tokio::test]
async fn test_put_defaults_content_type() {
    let (server, store) = common::setup_store_mock().await;
    Mock::given(method("PUT"))
        .and(path(object_path("blob")))
        .and(header("content-type", "application/octet-stream"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    store
        .put("blob", Bytes::from_static(b"\x00\x01"), &PutOptions::default())
        .await
        .expect("put failed");
}

#[tokio::test]
async fn test_put_slow_down_is_transient() {
    let (server, store) = common::setup_store_mock().await;
    Mock::given(method("PUT"))
        .and(path(object_path("busy.json")))
        .respond_with(ResponseTemplate::new(503).set_body_string("<Error><Code>SlowDown</Code></Error>"))
        .mount(&server)
        .await;

    let err = store
        .put("busy.json", Bytes::from_static(b"{}"), &PutOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Throttled(_)));
    assert!(err.is_transient());
    assert!(err.to_string().contains("SlowDown"));
}

#[tokio::test]
async fn test_get_returns_body() {
    let (server, store) = common::setup_store_mock().await;
    Mock::given(method("GET"))
        .and(path(object_path("a/1.json")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
        .mount(&server)
        .await;

    let body = store.get("a/1.json").await.expect("get failed");
    assert_eq!(body, Bytes::from_static(b"hello"));
}

#[tokio::test]
async fn test_delete_tolerates_missing_object() {
    let (server, store) = common::setup_store_mock().await;
    Mock::given(method("DELETE"))
        .and(path(object_path("gone.json")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(object_path("here.json")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    store.delete("gone.json").await.expect("404 delete should succeed");
    store.delete("here.json").await.expect("204 delete should succeed");
}

#[tokio::test]
async fn test_delete_server_error() {
    let (server, store) = common::setup_store_mock().await;
    Mock::given(method("DELETE"))
        .and(path(object_path("x")))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = store.delete("x").await.unwrap_err();
    assert!(matches!(err, StoreError::Server { status: 500, .. }));
}
