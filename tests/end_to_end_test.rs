//! End-to-end scenario against an in-memory, signature-verifying endpoint.

use bucket_client::mocks::{MemoryTransport, TestFixtures};
use bucket_client::{
    AccessPolicy, BlobOperations, Bucket, BucketClient, BucketOperations, ClientBuilder,
    ClientConfig, CloudCredential,
};
use bytes::Bytes;
use http::StatusCode;
use std::sync::Arc;
use test_case::test_case;

fn client(credential: CloudCredential, transport: Arc<MemoryTransport>) -> Arc<dyn BucketClient> {
    ClientBuilder::new()
        .config(ClientConfig::new(credential).unwrap())
        .transport(transport)
        .build()
        .unwrap()
}

fn verifying_transport(credential: &CloudCredential) -> Arc<MemoryTransport> {
    Arc::new(MemoryTransport::new().verifying(credential.credential().clone()))
}

#[test_case(TestFixtures::aws_credential() ; "aws")]
#[test_case(TestFixtures::spaces_credential() ; "spaces")]
#[tokio::test]
async fn test_bucket_and_blob_lifecycle(credential: CloudCredential) {
    let transport = verifying_transport(&credential);
    let client = client(credential, transport.clone());
    let payload = Bytes::from_static(b"payload P");
    let update = Bytes::from_static(b"payload Q");

    assert!(!client.exist_bucket("demo").await.unwrap());
    let created = client.create_bucket("demo").await;
    assert!(created.is_success(), "{}", created);
    assert!(client.exist_bucket("demo").await.unwrap());

    let policy = client.set_read_policy("demo", AccessPolicy::Public).await;
    assert!(policy.is_success(), "{}", policy);

    let locator = client.blob_locator("demo", "a.bin").unwrap();
    let first = client.create_blob(payload.clone(), &locator).await;
    assert!(first.is_success(), "{}", first);
    assert_eq!(first.locator(), Some(&locator));

    let second = client.create_blob(update.clone(), &locator).await;
    assert!(!second.is_success());
    assert!(second.message().contains("already exists"));
    assert_eq!(client.get_blob(&locator).await.unwrap(), payload);

    let updated = client.update_blob(update.clone(), &locator).await;
    assert!(updated.is_success(), "{}", updated);
    assert_eq!(client.get_blob(&locator).await.unwrap(), update);

    assert!(client.exist_blob(&locator).await.unwrap());
    assert!(client.delete_blob(&locator).await.is_success());
    assert!(!client.exist_blob(&locator).await.unwrap());
    assert!(client.delete_blob(&locator).await.is_success());

    let deleted = client.delete_bucket("demo").await;
    assert!(deleted.is_success(), "{}", deleted);
    assert!(!transport.bucket_exists("demo"));
}

#[tokio::test]
async fn test_spaces_objects_follow_bucket_policy() {
    let credential = TestFixtures::spaces_credential();
    let transport = verifying_transport(&credential);
    transport.insert_bucket("demo");
    let bucket = Bucket::open(client(credential, transport.clone()), "demo")
        .await
        .unwrap()
        .unwrap();

    assert!(bucket.put_blob("before.txt", "x").await.is_success());
    assert!(!transport.object("demo", "before.txt").unwrap().public);

    assert!(bucket.set_read_policy(AccessPolicy::Public).await.is_success());
    assert!(transport.object("demo", "before.txt").unwrap().public);

    assert!(bucket.create_blob("after.txt", "y").await.is_success());
    let after = transport.object("demo", "after.txt").unwrap();
    assert!(after.public);
    assert_eq!(after.content_type.as_deref(), Some("text/plain"));

    assert!(bucket.set_read_policy(AccessPolicy::Private).await.is_success());
    assert!(!transport.is_bucket_public("demo"));
    assert!(!transport.object("demo", "before.txt").unwrap().public);
    assert!(!transport.object("demo", "after.txt").unwrap().public);
    assert!(transport.cors("demo").is_none());
}

#[test_case(StatusCode::NOT_FOUND ; "not found")]
#[test_case(StatusCode::BAD_REQUEST ; "bad request")]
#[tokio::test]
async fn test_delete_of_absent_blob_succeeds(missing_status: StatusCode) {
    let credential = TestFixtures::aws_credential();
    let transport = Arc::new(MemoryTransport::new().with_missing_delete_status(missing_status));
    transport.insert_bucket("demo");
    let client = client(credential, transport);
    let locator = client.blob_locator("demo", "never-written").unwrap();

    let result = client.delete_blob(&locator).await;
    assert!(result.is_success(), "{}", result);
    assert_eq!(result.status(), Some(StatusCode::NO_CONTENT));
}

#[tokio::test]
async fn test_signature_mismatch_is_rejected() {
    let transport = Arc::new(
        MemoryTransport::new().verifying(TestFixtures::credential("eu-west-1")),
    );
    let client = client(TestFixtures::aws_credential(), transport);

    let result = client.create_bucket("demo").await;
    assert!(!result.is_success());
    assert_eq!(result.status(), Some(StatusCode::FORBIDDEN));
}
