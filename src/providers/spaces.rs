//! DigitalOcean Spaces backend.

use super::ProviderCore;
use crate::client::BucketOperations;
use crate::config::ClientConfig;
use crate::error::BucketClientError;
use crate::gate::BlobStore;
use crate::transport::HttpTransport;
use crate::types::{AccessPolicy, OperationResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// Client for DigitalOcean Spaces.
///
/// Spaces has no bucket policies. Read access is the bucket ACL plus one ACL
/// per object, and new objects start private whatever the bucket says, so
/// every write is followed by an object ACL matching the bucket.
#[derive(Debug, Clone)]
pub struct SpacesBucketClient {
    core: ProviderCore,
}

impl SpacesBucketClient {
    /// Create a client over `transport`.
    pub fn new(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            core: ProviderCore::new(config, transport),
        }
    }

    /// Abort in-flight requests and retry loops when `token` is cancelled.
    pub fn with_cancellation(self, token: CancellationToken) -> Self {
        Self {
            core: self.core.with_cancellation(token),
        }
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        self.core.config()
    }

    /// Whether the bucket ACL grants everyone read.
    pub async fn is_bucket_public(&self, bucket: &str) -> Result<bool, BucketClientError> {
        let bucket_url = self.core.config().bucket_url(bucket)?;
        self.core.policy().is_public(&bucket_url).await
    }

    async fn sync_object_acl(&self, locator: &Url) -> Result<OperationResult, BucketClientError> {
        let (bucket, bucket_url) = self.core.bucket_of(locator)?;
        let policy = AccessPolicy::from_public(self.core.policy().is_public(&bucket_url).await?);
        debug!(bucket = %bucket, locator = %locator, policy = %policy, "Reapplying object ACL");
        Ok(self.core.policy().set_acl(locator, policy).await)
    }
}

#[async_trait]
impl BucketOperations for SpacesBucketClient {
    async fn exist_bucket(&self, bucket: &str) -> Result<bool, BucketClientError> {
        self.core.exist_bucket(bucket).await
    }

    async fn create_bucket(&self, bucket: &str) -> OperationResult {
        self.core.create_bucket(bucket, None).await
    }

    async fn delete_bucket(&self, bucket: &str) -> OperationResult {
        self.core.delete_bucket(bucket).await
    }

    async fn set_read_policy(&self, bucket: &str, policy: AccessPolicy) -> OperationResult {
        let bucket_url = match self.core.config().bucket_url(bucket) {
            Ok(url) => url,
            Err(err) => return err.into(),
        };
        self.core.policy().propagate_acl(&bucket_url, policy).await
    }

    fn bucket_locator(&self, bucket: &str) -> Result<Url, BucketClientError> {
        self.core.config().bucket_url(bucket)
    }

    fn blob_locator(&self, bucket: &str, key: &str) -> Result<Url, BucketClientError> {
        self.core.config().blob_url(bucket, key)
    }
}

#[async_trait]
impl BlobStore for SpacesBucketClient {
    async fn raw_put(&self, payload: Bytes, locator: &Url) -> OperationResult {
        self.core.raw_put(payload, locator).await
    }

    async fn probe(&self, locator: &Url) -> Result<bool, BucketClientError> {
        self.core.probe(locator).await
    }

    async fn remove(&self, locator: &Url) -> OperationResult {
        self.core.remove(locator).await
    }

    async fn fetch(&self, locator: &Url) -> Result<Bytes, BucketClientError> {
        self.core.fetch(locator).await
    }

    async fn after_write(&self, locator: &Url) -> Option<OperationResult> {
        Some(match self.sync_object_acl(locator).await {
            Ok(result) => result,
            Err(err) => err.into(),
        })
    }
}
