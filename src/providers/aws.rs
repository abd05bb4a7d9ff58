//! Amazon S3 backend.

use super::ProviderCore;
use crate::client::BucketOperations;
use crate::config::ClientConfig;
use crate::error::BucketClientError;
use crate::gate::BlobStore;
use crate::transport::HttpTransport;
use crate::types::{AccessPolicy, OperationResult};
use crate::xml;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Region that rejects an explicit location constraint.
const DEFAULT_REGION: &str = "us-east-1";

/// Client for Amazon S3.
///
/// Read policy is a bucket policy plus CORS. The bucket policy covers every
/// object, so no per-object ACL is written.
#[derive(Debug, Clone)]
pub struct AwsBucketClient {
    core: ProviderCore,
}

impl AwsBucketClient {
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
}

#[async_trait]
impl BucketOperations for AwsBucketClient {
    async fn exist_bucket(&self, bucket: &str) -> Result<bool, BucketClientError> {
        self.core.exist_bucket(bucket).await
    }

    async fn create_bucket(&self, bucket: &str) -> OperationResult {
        let region = self.core.config().signing_credential().region();
        let body = (region != DEFAULT_REGION).then(|| Bytes::from(xml::build_create_bucket_xml(region)));
        self.core.create_bucket(bucket, body).await
    }

    async fn delete_bucket(&self, bucket: &str) -> OperationResult {
        self.core.delete_bucket(bucket).await
    }

    async fn set_read_policy(&self, bucket: &str, policy: AccessPolicy) -> OperationResult {
        let bucket_url = match self.core.config().bucket_url(bucket) {
            Ok(url) => url,
            Err(err) => return err.into(),
        };
        self.core
            .policy()
            .propagate_bucket_policy(&bucket_url, bucket.trim_matches('/'), policy)
            .await
    }

    fn bucket_locator(&self, bucket: &str) -> Result<Url, BucketClientError> {
        self.core.config().bucket_url(bucket)
    }

    fn blob_locator(&self, bucket: &str, key: &str) -> Result<Url, BucketClientError> {
        self.core.config().blob_url(bucket, key)
    }
}

#[async_trait]
impl BlobStore for AwsBucketClient {
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
}
