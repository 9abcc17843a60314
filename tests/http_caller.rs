#[path = "common/mod.rs"]
mod common;

use httpmock::{Method::GET, Method::POST, MockServer};
use reqwest::{Method, StatusCode};
use restq::client::{CallError, HttpCaller};

#[tokio::test]
async fn returns_body_on_expected_status() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/consumers/g")
                .header("Content-Type", "application/json")
                .header("Authorization", "Basic c2VjcmV0")
                .body("{}");
            then.status(200).body("created");
        })
        .await;

    let caller = HttpCaller::new(common::pool()).with_authorization(Some("Basic c2VjcmV0"));
    let body = caller
        .call(
            Method::POST,
            &server.url("/consumers/g"),
            Some("{}".to_string()),
            &[("Content-Type", "application/json")],
            StatusCode::OK,
        )
        .await
        .expect("call succeeds");

    mock.assert_async().await;
    assert_eq!(&body[..], b"created");
}

#[tokio::test]
async fn unexpected_status_carries_status_and_url() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/topics");
            then.status(404);
        })
        .await;

    let url = server.url("/topics");
    let err = HttpCaller::new(common::pool())
        .call(Method::GET, &url, None, &[], StatusCode::OK)
        .await
        .expect_err("404 is not 200");

    assert!(matches!(
        err,
        CallError::UnexpectedStatus {
            status: 404,
            expected: 200,
            ..
        }
    ));
    assert_eq!(err.url(), url);
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn server_error_recycles_idle_connections() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/flaky");
            then.status(503);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        })
        .await;

    let pool = common::pool();
    let caller = HttpCaller::new(pool.clone());

    let _ = caller
        .call(Method::GET, &server.url("/missing"), None, &[], StatusCode::OK)
        .await;
    assert_eq!(pool.generation(), 0, "4xx keeps the pool");

    let err = caller
        .call(Method::GET, &server.url("/flaky"), None, &[], StatusCode::OK)
        .await
        .expect_err("503 fails");
    assert_eq!(err.status(), Some(503));
    assert_eq!(pool.generation(), 1);
}

#[tokio::test]
async fn transport_failure_is_typed() {
    let err = HttpCaller::new(common::pool())
        .call(
            Method::GET,
            "http://127.0.0.1:9/unreachable",
            None,
            &[],
            StatusCode::OK,
        )
        .await
        .expect_err("nothing listens on the discard port");

    assert!(matches!(err, CallError::Transport { .. }));
    assert_eq!(err.status(), None);
}
