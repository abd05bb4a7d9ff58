//! Provider backends.
//!
//! Both backends speak the same signed S3 REST dialect and share
//! [`ProviderCore`]; they differ in how a read policy is applied and in
//! whether written objects need their ACL reapplied.

mod aws;
mod spaces;

pub use aws::AwsBucketClient;
pub use spaces::SpacesBucketClient;

use crate::client::dispatch::Dispatcher;
use crate::config::ClientConfig;
use crate::error::{BucketClientError, ParseError};
use crate::policy::PolicyCoordinator;
use crate::signing::SignerV4;
use crate::transport::HttpTransport;
use crate::types::OperationResult;
use bytes::Bytes;
use http::{Method, StatusCode};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Request plumbing shared by every backend.
#[derive(Debug, Clone)]
pub(crate) struct ProviderCore {
    config: Arc<ClientConfig>,
    dispatcher: Dispatcher,
    policy: PolicyCoordinator,
}

impl ProviderCore {
    pub(crate) fn new(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let signer = SignerV4::new(Arc::new(config.signing_credential().clone()));
        let dispatcher = Dispatcher::new(transport, Arc::new(signer), config.operation_timeout);
        let policy = PolicyCoordinator::new(
            dispatcher.clone(),
            config.max_policy_attempts,
            config.policy_retry_backoff,
        );

        Self {
            config: Arc::new(config),
            dispatcher,
            policy,
        }
    }

    pub(crate) fn with_cancellation(self, cancel: CancellationToken) -> Self {
        let dispatcher = self.dispatcher.with_cancellation(cancel);
        let policy = PolicyCoordinator::new(
            dispatcher.clone(),
            self.config.max_policy_attempts,
            self.config.policy_retry_backoff,
        );

        Self {
            config: self.config,
            dispatcher,
            policy,
        }
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn policy(&self) -> &PolicyCoordinator {
        &self.policy
    }

    pub(crate) async fn exist_bucket(&self, bucket: &str) -> Result<bool, BucketClientError> {
        self.dispatcher.probe(&self.config.bucket_url(bucket)?).await
    }

    pub(crate) async fn create_bucket(&self, bucket: &str, body: Option<Bytes>) -> OperationResult {
        let url = match self.config.bucket_url(bucket) {
            Ok(url) => url,
            Err(err) => return err.into(),
        };
        let content_type = body.as_ref().map(|_| "application/xml");

        self.dispatcher
            .execute(Method::PUT, &url, body, content_type, StatusCode::OK)
            .await
            .with_locator(url)
    }

    pub(crate) async fn delete_bucket(&self, bucket: &str) -> OperationResult {
        let url = match self.config.bucket_url(bucket) {
            Ok(url) => url,
            Err(err) => return err.into(),
        };

        self.dispatcher
            .execute(Method::DELETE, &url, None, None, StatusCode::NO_CONTENT)
            .await
    }

    pub(crate) async fn raw_put(&self, payload: Bytes, locator: &Url) -> OperationResult {
        let content_type = content_type_of(locator);
        self.dispatcher
            .execute(
                Method::PUT,
                locator,
                Some(payload),
                Some(&content_type),
                StatusCode::OK,
            )
            .await
    }

    pub(crate) async fn probe(&self, locator: &Url) -> Result<bool, BucketClientError> {
        self.dispatcher.probe(locator).await
    }

    pub(crate) async fn remove(&self, locator: &Url) -> OperationResult {
        self.dispatcher
            .execute(Method::DELETE, locator, None, None, StatusCode::NO_CONTENT)
            .await
    }

    pub(crate) async fn fetch(&self, locator: &Url) -> Result<Bytes, BucketClientError> {
        let response = self
            .dispatcher
            .expect(Method::GET, locator, None, None, StatusCode::OK)
            .await?;
        Ok(response.body)
    }

    /// Bucket name and bucket locator owning a blob locator.
    ///
    /// Path-style locators (`https://host/{bucket}/{key}`) name the bucket in
    /// the first path segment below the base URL; virtual-host locators
    /// (`https://{bucket}.host/{key}`) in the first host label.
    pub(crate) fn bucket_of(&self, locator: &Url) -> Result<(String, Url), BucketClientError> {
        let invalid = || {
            BucketClientError::from(ParseError::InvalidLocator {
                locator: locator.to_string(),
            })
        };
        let base = self.config.base_url();
        let base_host = base.host_str().ok_or_else(invalid)?;
        let host = locator.host_str().ok_or_else(invalid)?;

        let bucket = if host.eq_ignore_ascii_case(base_host) {
            locator
                .path()
                .strip_prefix(base.path())
                .and_then(|rest| rest.split('/').next())
                .filter(|segment| !segment.is_empty())
                .ok_or_else(invalid)?
        } else {
            host.strip_suffix(base_host)
                .and_then(|label| label.strip_suffix('.'))
                .filter(|label| !label.is_empty() && !label.contains('.'))
                .ok_or_else(invalid)?
        };

        let bucket_url = self.config.bucket_url(bucket)?;
        Ok((bucket.to_string(), bucket_url))
    }
}

/// Content type for an upload, guessed from the locator's extension.
fn content_type_of(locator: &Url) -> String {
    let name = locator
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();

    mime_guess::from_path(name)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{MockTransport, TestFixtures};
    use test_case::test_case;

    fn core(endpoint: Option<&str>) -> ProviderCore {
        let mut builder = ClientConfig::builder().credential(TestFixtures::spaces_credential());
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint(endpoint).unwrap();
        }
        ProviderCore::new(builder.build().unwrap(), Arc::new(MockTransport::new()))
    }

    #[test_case("https://nyc3.digitaloceanspaces.com/demo/a.bin", "demo" ; "path style")]
    #[test_case("https://nyc3.digitaloceanspaces.com/demo/dir/a.bin", "demo" ; "nested key")]
    #[test_case("https://demo.nyc3.digitaloceanspaces.com/a.bin", "demo" ; "virtual host")]
    fn test_bucket_of(locator: &str, bucket: &str) {
        let (name, url) = core(None).bucket_of(&Url::parse(locator).unwrap()).unwrap();
        assert_eq!(name, bucket);
        assert_eq!(url.as_str(), "https://nyc3.digitaloceanspaces.com/demo");
    }

    #[test]
    fn test_bucket_of_endpoint_with_path() {
        let core = core(Some("http://localhost:9000/storage"));
        let (name, url) = core
            .bucket_of(&Url::parse("http://localhost:9000/storage/demo/a.bin").unwrap())
            .unwrap();
        assert_eq!(name, "demo");
        assert_eq!(url.as_str(), "http://localhost:9000/storage/demo");
    }

    #[test_case("https://elsewhere.example.com/demo/a.bin" ; "foreign host")]
    #[test_case("https://nyc3.digitaloceanspaces.com/" ; "no bucket")]
    #[test_case("https://a.b.nyc3.digitaloceanspaces.com/a.bin" ; "nested subdomain")]
    fn test_bucket_of_rejects(locator: &str) {
        let err = core(None)
            .bucket_of(&Url::parse(locator).unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            BucketClientError::Parse(ParseError::InvalidLocator { .. })
        ));
    }

    #[test_case("https://h/b/photo.png", "image/png")]
    #[test_case("https://h/b/notes.txt", "text/plain")]
    #[test_case("https://h/b/a.bin", "application/octet-stream")]
    #[test_case("https://h/b/no-extension", "application/octet-stream")]
    fn test_content_type_of(locator: &str, expected: &str) {
        assert_eq!(content_type_of(&Url::parse(locator).unwrap()), expected);
    }
}
