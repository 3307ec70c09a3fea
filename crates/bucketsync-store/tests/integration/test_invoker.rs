//! Remote invocation over HTTP

use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bucketsync_core::domain::StoreError;
use bucketsync_core::ports::{IRemoteInvoker, InvocationMode};
use bucketsync_store::HttpInvoker;

async fn setup_invoker(dry_run: bool) -> (MockServer, HttpInvoker) {
    let server = MockServer::start().await;
    let invoker = HttpInvoker::new(&format!("{}/invoke", server.uri()), "bucket=b", dry_run)
        .expect("invoker");
    (server, invoker)
}

#[tokio::test]
async fn test_request_response_success() {
    let (server, invoker) = setup_invoker(true).await;
    Mock::given(method("POST"))
        .and(path("/invoke"))
        .and(header("x-invocation-type", "RequestResponse"))
        .and(body_json(serde_json::json!({
            "dsn": "bucket=b",
            "dryrun": true,
            "id": 1159324849_i64
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    invoker
        .invoke(1159324849, InvocationMode::RequestResponse)
        .await
        .expect("invoke failed");
}

#[tokio::test]
async fn test_function_error_header_fails_invocation() {
    let (server, invoker) = setup_invoker(false).await;
    Mock::given(method("POST"))
        .and(path("/invoke"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-Function-Error", "Unhandled")
                .set_body_string("Invalid ID"),
        )
        .mount(&server)
        .await;

    let err = invoker
        .invoke(7, InvocationMode::RequestResponse)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvocationFailed(_)));
    assert!(err.to_string().contains("Invalid ID"));
}

#[tokio::test]
async fn test_event_mode_accepts_202() {
    let (server, invoker) = setup_invoker(false).await;
    Mock::given(method("POST"))
        .and(path("/invoke"))
        .and(header("x-invocation-type", "Event"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    invoker.invoke(42, InvocationMode::Event).await.expect("event invoke");
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let (server, invoker) = setup_invoker(false).await;
    Mock::given(method("POST"))
        .and(path("/invoke"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = invoker.invoke(1, InvocationMode::Event).await.unwrap_err();
    assert!(err.is_transient());
}
