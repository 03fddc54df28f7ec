//! Integration tests for the reqwest transport using WireMock.

use clientry::resilience::RetryConfig;
use clientry::{
    CallOptions, ClientConfig, ClientError, EmptyRequest, Endpoint, MultipartForm, Request,
    ResilientClient, TransportErrorKind,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_json, body_string_contains, header, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Echo {
    x: i32,
}

#[derive(Debug, Serialize)]
struct Search {
    q: String,
    page: u32,
}

fn client_for(uri: &str) -> ResilientClient {
    let config = ClientConfig::builder()
        .base_url(uri)
        .retry_config(
            RetryConfig::new()
                .with_base_delay(Duration::from_millis(10))
                .with_max_delay(Duration::from_millis(50)),
        )
        .build()
        .expect("valid config");
    ResilientClient::new(config).expect("client builds")
}

#[tokio::test]
async fn test_json_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/echo"))
        .and(body_json(json!({"x": 1})))
        .and(header("content-type", "application/json"))
        .and(header("user-agent", clientry::DEFAULT_USER_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"x": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let endpoint: Endpoint<Echo, Echo> = Endpoint::post("/echo");
    let response = client.send(&endpoint, Echo { x: 1 }).await.unwrap();

    assert_eq!(response, Echo { x: 1 });
}

#[tokio::test]
async fn test_get_payload_sent_as_query() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "rust"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hits": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let endpoint: Endpoint<Search, Value> = Endpoint::get("/search");
    let request = Search {
        q: "rust".to_string(),
        page: 2,
    };
    let response = client.send(&endpoint, request).await.unwrap();

    assert_eq!(response, json!({"hits": []}));
}

#[tokio::test]
async fn test_server_errors_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let endpoint: Endpoint<EmptyRequest, Value> = Endpoint::get("/flaky");
    let response = client.send(&endpoint, EmptyRequest).await.unwrap();

    assert_eq!(response, json!({"ok": true}));
}

#[tokio::test]
async fn test_rate_limited_response_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let endpoint: Endpoint<EmptyRequest, Value> = Endpoint::get("/limited");
    let err = client
        .execute(&endpoint, EmptyRequest, CallOptions::new().max_retry_attempts(2))
        .await
        .unwrap_err();

    match err {
        ClientError::Retryable {
            status,
            retry_after,
            attempts,
            ..
        } => {
            assert_eq!(status, 429);
            assert_eq!(retry_after, Some(Duration::ZERO));
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_client_error_returned_once() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/items/7"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "no such item"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let endpoint: Endpoint<EmptyRequest, ()> = Endpoint::delete("/items/{id}");
    let err = client
        .execute(&endpoint, EmptyRequest, CallOptions::new().path_param("id", 7))
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(404));
    assert_eq!(err.attempts(), 1);
}

#[tokio::test]
async fn test_empty_success_body_decodes_to_unit() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/items/1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let endpoint: Endpoint<Echo, ()> = Endpoint::put("/items/{id}");
    let result = client
        .execute(&endpoint, Echo { x: 3 }, CallOptions::new().path_param("id", 1))
        .await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn test_multipart_upload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(header_regex("content-type", "^multipart/form-data; boundary="))
        .and(body_string_contains("quarterly"))
        .and(body_string_contains("report.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"stored": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let endpoint: Endpoint<EmptyRequest, Value> = Endpoint::post("/upload");
    let form = MultipartForm::new().text("title", "quarterly").file(
        "file",
        "report.txt",
        "numbers",
        mime::TEXT_PLAIN,
    );
    let response = client.send(&endpoint, Request::multipart(form)).await.unwrap();

    assert_eq!(response, json!({"stored": true}));
}

#[tokio::test]
async fn test_raw_body_keeps_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ingest"))
        .and(header("content-type", "text/csv"))
        .and(body_string_contains("a,b,c"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let endpoint: Endpoint<EmptyRequest, Option<Value>> = Endpoint::post("/ingest");
    let response = client
        .send(&endpoint, Request::raw("a,b,c", Some("text/csv")))
        .await
        .unwrap();

    assert_eq!(response, None);
}

#[tokio::test]
async fn test_per_call_timeout_is_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let endpoint: Endpoint<EmptyRequest, Value> = Endpoint::get("/slow");
    let options = CallOptions::new()
        .timeout(Duration::from_millis(50))
        .max_retry_attempts(0);
    let err = client.execute(&endpoint, EmptyRequest, options).await.unwrap_err();

    assert!(matches!(
        err,
        ClientError::Transport {
            kind: TransportErrorKind::Timeout,
            attempts: 1,
            ..
        }
    ));
}

#[tokio::test]
async fn test_connection_refused_is_transport_failure() {
    let client = client_for("http://127.0.0.1:1");
    let endpoint: Endpoint<EmptyRequest, Value> = Endpoint::get("/anything");
    let err = client
        .execute(&endpoint, EmptyRequest, CallOptions::new().max_retry_attempts(0))
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert!(matches!(err, ClientError::Transport { .. }));
}
