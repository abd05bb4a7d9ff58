//! Key-addressed handle on one bucket.

use crate::client::{BlobOperations, BucketClient, BucketOperations};
use crate::error::BucketClientError;
use crate::types::{AccessPolicy, OperationResult};
use bytes::Bytes;
use std::sync::Arc;
use url::Url;

/// A bucket on a [`BucketClient`], addressing blobs by key.
#[derive(Debug, Clone)]
pub struct Bucket {
    name: String,
    client: Arc<dyn BucketClient>,
}

impl Bucket {
    /// Handle on an existing bucket, or `None` when it does not exist.
    pub async fn open(
        client: Arc<dyn BucketClient>,
        name: impl Into<String>,
    ) -> Result<Option<Self>, BucketClientError> {
        let name = name.into();
        if client.exist_bucket(&name).await? {
            Ok(Some(Self { name, client }))
        } else {
            Ok(None)
        }
    }

    /// Handle without checking that the bucket exists.
    pub fn unchecked(client: Arc<dyn BucketClient>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }

    /// Bucket name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Locator of a key in this bucket.
    pub fn locator(&self, key: &str) -> Result<Url, BucketClientError> {
        self.client.blob_locator(&self.name, key)
    }

    /// Apply a read policy to the bucket and every blob in it.
    pub async fn set_read_policy(&self, policy: AccessPolicy) -> OperationResult {
        self.client.set_read_policy(&self.name, policy).await
    }

    /// Whether `key` exists.
    pub async fn exist_blob(&self, key: &str) -> Result<bool, BucketClientError> {
        self.client.exist_blob(&self.locator(key)?).await
    }

    /// Write `key`, failing if it exists.
    pub async fn create_blob(&self, key: &str, payload: impl Into<Bytes>) -> OperationResult {
        match self.locator(key) {
            Ok(locator) => self.client.create_blob(payload.into(), &locator).await,
            Err(err) => err.into(),
        }
    }

    /// Overwrite `key`, failing if it does not exist.
    pub async fn update_blob(&self, key: &str, payload: impl Into<Bytes>) -> OperationResult {
        match self.locator(key) {
            Ok(locator) => self.client.update_blob(payload.into(), &locator).await,
            Err(err) => err.into(),
        }
    }

    /// Write `key` unconditionally.
    pub async fn put_blob(&self, key: &str, payload: impl Into<Bytes>) -> OperationResult {
        match self.locator(key) {
            Ok(locator) => self.client.put_blob(payload.into(), &locator).await,
            Err(err) => err.into(),
        }
    }

    /// Delete `key`. Deleting an absent key succeeds.
    pub async fn delete_blob(&self, key: &str) -> OperationResult {
        match self.locator(key) {
            Ok(locator) => self.client.delete_blob(&locator).await,
            Err(err) => err.into(),
        }
    }

    /// Download `key`.
    pub async fn get_blob(&self, key: &str) -> Result<Bytes, BucketClientError> {
        self.client.get_blob(&self.locator(key)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientBuilder;
    use crate::config::ClientConfig;
    use crate::mocks::{MemoryTransport, TestFixtures};

    fn client(transport: Arc<MemoryTransport>) -> Arc<dyn BucketClient> {
        ClientBuilder::new()
            .config(ClientConfig::new(TestFixtures::spaces_credential()).unwrap())
            .transport(transport)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_missing_bucket() {
        let transport = Arc::new(MemoryTransport::new());
        assert!(Bucket::open(client(transport), "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_key_operations() {
        let transport = Arc::new(MemoryTransport::new());
        transport.insert_bucket("demo");
        let bucket = Bucket::open(client(transport.clone()), "demo")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(bucket.name(), "demo");

        assert!(bucket.create_blob("dir/a b.txt", "P").await.is_success());
        assert_eq!(transport.keys("demo"), vec!["dir/a b.txt".to_string()]);
        assert_eq!(
            bucket.locator("dir/a b.txt").unwrap().as_str(),
            "https://nyc3.digitaloceanspaces.com/demo/dir/a%20b.txt"
        );
        assert_eq!(bucket.get_blob("dir/a b.txt").await.unwrap(), Bytes::from("P"));
        assert!(bucket.delete_blob("dir/a b.txt").await.is_success());
        assert!(!bucket.exist_blob("dir/a b.txt").await.unwrap());
    }
}
