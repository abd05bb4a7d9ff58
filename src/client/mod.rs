//! Client interfaces and construction.
//!
//! A client is two capability traits: [`BucketOperations`] for bucket
//! lifecycle and read policy, [`BlobOperations`] for the existence-gated
//! blob operations. [`ClientBuilder`] picks the backend from the tagged
//! [`CloudCredential`](crate::credentials::CloudCredential).

pub(crate) mod dispatch;

use crate::config::ClientConfig;
use crate::credentials::CloudCredential;
use crate::error::BucketClientError;
use crate::providers::{AwsBucketClient, SpacesBucketClient};
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::types::{AccessPolicy, OperationResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// Bucket lifecycle and read policy.
#[async_trait]
pub trait BucketOperations: Send + Sync {
    /// Whether the bucket exists.
    async fn exist_bucket(&self, bucket: &str) -> Result<bool, BucketClientError>;

    /// Create a bucket.
    async fn create_bucket(&self, bucket: &str) -> OperationResult;

    /// Delete an empty bucket.
    async fn delete_bucket(&self, bucket: &str) -> OperationResult;

    /// Make the bucket and everything in it publicly readable, or private.
    async fn set_read_policy(&self, bucket: &str, policy: AccessPolicy) -> OperationResult;

    /// Locator of a bucket.
    fn bucket_locator(&self, bucket: &str) -> Result<Url, BucketClientError>;

    /// Locator of a blob in a bucket.
    fn blob_locator(&self, bucket: &str, key: &str) -> Result<Url, BucketClientError>;
}

/// Existence-gated blob operations, addressed by locator.
#[async_trait]
pub trait BlobOperations: Send + Sync {
    /// Whether a blob exists. Absence is `Ok(false)`.
    async fn exist_blob(&self, locator: &Url) -> Result<bool, BucketClientError>;

    /// Write a blob that must not exist yet.
    async fn create_blob(&self, payload: Bytes, locator: &Url) -> OperationResult;

    /// Overwrite a blob that must already exist.
    async fn update_blob(&self, payload: Bytes, locator: &Url) -> OperationResult;

    /// Write a blob unconditionally.
    async fn put_blob(&self, payload: Bytes, locator: &Url) -> OperationResult;

    /// Delete a blob. Deleting an absent blob succeeds.
    async fn delete_blob(&self, locator: &Url) -> OperationResult;

    /// Download a blob.
    async fn get_blob(&self, locator: &Url) -> Result<Bytes, BucketClientError>;
}

/// A complete client for one storage provider.
pub trait BucketClient: BucketOperations + BlobOperations + std::fmt::Debug {}

impl<T> BucketClient for T where T: BucketOperations + BlobOperations + std::fmt::Debug {}

/// Builder for a provider client.
pub struct ClientBuilder {
    config: Option<ClientConfig>,
    from_env: bool,
    transport: Option<Arc<dyn HttpTransport>>,
    cancel: Option<CancellationToken>,
}

impl ClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: None,
            from_env: false,
            transport: None,
            cancel: None,
        }
    }

    /// Use the provided configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env(mut self) -> Self {
        self.from_env = true;
        self
    }

    /// Use a custom HTTP transport.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Abort in-flight requests and retry loops when `token` is cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Build the client for the configured provider.
    pub fn build(self) -> Result<Arc<dyn BucketClient>, BucketClientError> {
        let config = match self.config {
            Some(config) => config,
            None if self.from_env => ClientConfig::builder().from_env()?.build()?,
            None => {
                return Err(crate::error::ConfigurationError::MissingCredentials {
                    field: "credential",
                }
                .into())
            }
        };

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                ReqwestTransport::builder()
                    .connect_timeout(config.connect_timeout)
                    .read_timeout(config.read_timeout)
                    .pool_max_idle_per_host(config.max_connections as usize)
                    .pool_idle_timeout(Some(config.idle_timeout))
                    .verify_ssl(config.verify_ssl)
                    .user_agent(config.user_agent.clone())
                    .build()?,
            ),
        };
        let cancel = self.cancel.unwrap_or_default();

        debug!(
            provider = config.credential.provider_name(),
            base_url = %config.base_url(),
            "Building bucket client"
        );

        let client: Arc<dyn BucketClient> = match &config.credential {
            CloudCredential::Aws(_) => Arc::new(
                AwsBucketClient::new(config.clone(), transport).with_cancellation(cancel),
            ),
            CloudCredential::DigitalOcean(_) => Arc::new(
                SpacesBucketClient::new(config.clone(), transport).with_cancellation(cancel),
            ),
        };
        Ok(client)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
