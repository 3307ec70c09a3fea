//! Shared test helpers for store integration tests
//!
//! Each helper starts a mock server and returns a client pointed at it.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bucketsync_core::domain::Dsn;
use bucketsync_store::HttpObjectStore;

pub const BUCKET: &str = "test-bucket";
pub const TOKEN: &str = "test-token";

/// Starts a mock server and returns a store for `test-bucket` with prefix `data`.
pub async fn setup_store_mock() -> (MockServer, HttpObjectStore) {
    let server = MockServer::start().await;
    let dsn = Dsn::parse(&format!(
        "bucket={BUCKET} prefix=data endpoint={} credentials=bearer:{TOKEN}",
        server.uri()
    ))
    .expect("valid dsn");
    let store = HttpObjectStore::new(&dsn).expect("store");
    (server, store)
}

/// Path of `key` under the test bucket and connection prefix.
pub fn object_path(key: &str) -> String {
    format!("/{BUCKET}/data/{key}")
}

/// Mounts a HEAD endpoint that reports an existing object.
pub async fn mount_head(server: &MockServer, key: &str, etag: &str, last_modified: &str) {
    Mock::given(method("HEAD"))
        .and(path(object_path(key)))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("ETag", format!("\"{etag}\""))
                .insert_header("Last-Modified", last_modified),
        )
        .mount(server)
        .await;
}

/// Builds a ListObjectsV2 XML body for the given full keys.
pub fn list_body(keys: &[&str], next_token: Option<&str>) -> String {
    let contents: String = keys
        .iter()
        .map(|key| {
            format!(
                "<Contents><Key>{key}</Key><LastModified>2024-03-01T12:00:00.000Z</LastModified>\
                 <ETag>&quot;d41d8cd98f00b204e9800998ecf8427e&quot;</ETag><Size>0</Size>\
                 <StorageClass>STANDARD</StorageClass></Contents>"
            )
        })
        .collect();

    let tail = match next_token {
        Some(token) => format!(
            "<IsTruncated>true</IsTruncated>{contents}<NextContinuationToken>{token}</NextContinuationToken>"
        ),
        None => format!("<IsTruncated>false</IsTruncated>{contents}"),
    };

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <ListBucketResult xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
         <Name>{BUCKET}</Name>{tail}</ListBucketResult>"
    )
}
