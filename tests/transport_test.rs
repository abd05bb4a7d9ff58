//! Integration tests over real HTTP against a mock S3-compatible server.

use bucket_client::mocks::TestFixtures;
use bucket_client::{
    AccessPolicy, BlobOperations, BucketClient, BucketOperations, ClientBuilder, ClientConfig,
};
use bytes::Bytes;
use http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_bytes, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer, timeout: Duration) -> Arc<dyn BucketClient> {
    let config = ClientConfig::builder()
        .credential(TestFixtures::spaces_credential())
        .endpoint(server.uri())
        .unwrap()
        .operation_timeout(timeout)
        .build()
        .unwrap();
    ClientBuilder::new().config(config).build().unwrap()
}

#[tokio::test]
async fn test_requests_carry_signature_headers() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/demo/a.bin"))
        .and(header_exists("authorization"))
        .and(header_exists("x-amz-date"))
        .and(header(
            "x-amz-content-sha256",
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        ))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5)).await;
    let locator = client.blob_locator("demo", "a.bin").unwrap();

    assert!(client.exist_blob(&locator).await.unwrap());
}

#[tokio::test]
async fn test_missing_blob_exists_is_false() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5)).await;
    let locator = client.blob_locator("demo", "missing").unwrap();

    assert!(!client.exist_blob(&locator).await.unwrap());
}

#[tokio::test]
async fn test_put_sends_body_and_digest() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/demo/a.json"))
        .and(body_bytes(b"{}".to_vec()))
        .and(header("content-type", "application/json"))
        .and(header("content-md5", "mZFLkyvTelC5g8XnyQrpOw=="))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/demo"))
        .and(query_param("acl", ""))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(TestFixtures::acl_xml("owner", true)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/demo/a.json"))
        .and(query_param("acl", ""))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(TestFixtures::acl_xml("owner", false)),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/demo/a.json"))
        .and(query_param("acl", ""))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5)).await;
    let locator = client.blob_locator("demo", "a.json").unwrap();

    let result = client.put_blob(Bytes::from_static(b"{}"), &locator).await;
    assert!(result.is_success(), "{}", result);
}

#[tokio::test]
async fn test_other_success_status_is_failure() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/demo"))
        .respond_with(ResponseTemplate::new(201).set_body_string("created"))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5)).await;
    let result = client.create_bucket("demo").await;

    assert!(!result.is_success());
    assert_eq!(result.status(), Some(StatusCode::CREATED));
    assert_eq!(result.message(), "created");
}

#[tokio::test]
async fn test_error_body_is_reported() {
    let server = MockServer::start().await;
    let body = TestFixtures::error_xml("AccessDenied", "Access Denied");
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403).set_body_string(body.clone()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403).set_body_string(body.clone()))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5)).await;
    let result = client.set_read_policy("demo", AccessPolicy::Public).await;

    assert!(!result.is_success());
    assert_eq!(result.status(), Some(StatusCode::FORBIDDEN));
    assert!(result.message().contains("AccessDenied"));
}

#[tokio::test]
async fn test_operation_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_millis(50)).await;
    let locator = client.blob_locator("demo", "slow.bin").unwrap();

    let err = client.get_blob(&locator).await.unwrap_err();
    assert!(err.to_string().contains("timed out"), "{}", err);
}

#[tokio::test]
async fn test_get_blob_returns_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/demo/a.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(5)).await;
    let locator = client.blob_locator("demo", "a.bin").unwrap();

    assert_eq!(client.get_blob(&locator).await.unwrap(), Bytes::from_static(b"payload"));
}
