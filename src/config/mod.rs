//! Configuration types for the bucket client.
//!
//! This module provides the `ClientConfig` type for configuring a client,
//! including the provider credential, endpoint, timeouts, and the bound on
//! access-policy conflict retries.

use crate::credentials::{CloudCredential, Credential};
use crate::error::{BucketClientError, ConfigurationError, ParseError};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::time::Duration;
use url::Url;

/// Characters escaped in blob keys before they are joined into a locator.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Environment variable selecting the provider (`aws` or `digitalocean`).
pub const PROVIDER_VAR: &str = "BUCKET_CLIENT_PROVIDER";
/// Environment variable overriding the endpoint.
pub const ENDPOINT_VAR: &str = "BUCKET_CLIENT_ENDPOINT";
/// Environment variable overriding the policy retry bound.
pub const POLICY_MAX_ATTEMPTS_VAR: &str = "BUCKET_CLIENT_POLICY_MAX_ATTEMPTS";
/// Environment variable overriding the operation timeout, in milliseconds.
pub const TIMEOUT_MS_VAR: &str = "BUCKET_CLIENT_TIMEOUT_MS";

/// Default number of attempts for a conflicting policy write.
pub const DEFAULT_MAX_POLICY_ATTEMPTS: u32 = 10;

/// Configuration for a bucket client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Provider-tagged credential.
    pub credential: CloudCredential,

    /// Custom endpoint URL (for S3-compatible services). Locators are
    /// path-style below it: `{endpoint}/{bucket}/{key}`.
    pub endpoint: Option<Url>,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Read timeout for individual requests.
    pub read_timeout: Duration,

    /// Upper bound on a single request, enforced around the transport.
    pub operation_timeout: Duration,

    /// Attempts made for a policy write that keeps reporting conflict.
    pub max_policy_attempts: u32,

    /// Delay between conflict retries. Zero retries immediately.
    pub policy_retry_backoff: Duration,

    /// Maximum idle connections kept per host.
    pub max_connections: u32,

    /// Idle connection timeout.
    pub idle_timeout: Duration,

    /// Verify SSL certificates.
    pub verify_ssl: bool,

    /// User-Agent sent with every request.
    pub user_agent: String,

    base_url: Url,
}

impl ClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Configuration with defaults for the given credential.
    pub fn new(credential: CloudCredential) -> Result<Self, BucketClientError> {
        Self::builder().credential(credential).build()
    }

    /// The credential, regardless of provider.
    pub fn signing_credential(&self) -> &Credential {
        self.credential.credential()
    }

    /// Root URL every bucket locator is built under. Always ends with `/`.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Locator of a bucket.
    pub fn bucket_url(&self, bucket: &str) -> Result<Url, BucketClientError> {
        let bucket = bucket.trim_matches('/');
        if bucket.is_empty() || bucket.contains(['/', '?', '#']) {
            return Err(ParseError::InvalidLocator {
                locator: bucket.to_string(),
            }
            .into());
        }
        join(&self.base_url, bucket)
    }

    /// Locator of a blob within a bucket.
    pub fn blob_url(&self, bucket: &str, key: &str) -> Result<Url, BucketClientError> {
        Ok(blob_url_in(&self.bucket_url(bucket)?, key))
    }
}

/// Locator of `key` below a bucket locator.
pub fn blob_url_in(bucket_url: &Url, key: &str) -> Url {
    let mut url = bucket_url.clone();
    url.set_query(None);
    let path = format!(
        "{}/{}",
        url.path().trim_end_matches('/'),
        utf8_percent_encode(key.trim_start_matches('/'), KEY_ENCODE_SET)
    );
    url.set_path(&path);
    url
}

fn join(base: &Url, path: &str) -> Result<Url, BucketClientError> {
    base.join(path).map_err(|e| {
        BucketClientError::from(ConfigurationError::InvalidEndpoint {
            url: format!("{}{}", base, path),
            details: e.to_string(),
        })
    })
}

/// Provider root URL for a credential.
///
/// Amazon S3 uses the regional dash form `s3-{region}.amazonaws.com`,
/// DigitalOcean Spaces uses `{region}.digitaloceanspaces.com`.
pub fn provider_base_url(credential: &CloudCredential) -> Result<Url, BucketClientError> {
    let region = credential.credential().region();
    let url_str = match credential {
        CloudCredential::Aws(_) => format!("https://s3-{}.amazonaws.com/", region),
        CloudCredential::DigitalOcean(_) => format!("https://{}.digitaloceanspaces.com/", region),
    };

    Url::parse(&url_str).map_err(|e| {
        BucketClientError::from(ConfigurationError::InvalidEndpoint {
            url: url_str,
            details: e.to_string(),
        })
    })
}

fn normalize_endpoint(mut endpoint: Url) -> Url {
    if !endpoint.path().ends_with('/') {
        let path = format!("{}/", endpoint.path());
        endpoint.set_path(&path);
    }
    endpoint.set_query(None);
    endpoint
}

/// Builder for client configuration.
#[derive(Default)]
pub struct ClientConfigBuilder {
    credential: Option<CloudCredential>,
    endpoint: Option<Url>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    operation_timeout: Option<Duration>,
    max_policy_attempts: Option<u32>,
    policy_retry_backoff: Option<Duration>,
    max_connections: Option<u32>,
    idle_timeout: Option<Duration>,
    verify_ssl: Option<bool>,
    user_agent: Option<String>,
}

impl ClientConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider credential.
    pub fn credential(mut self, credential: CloudCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Set a custom endpoint URL.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Result<Self, BucketClientError> {
        let url_str = endpoint.into();
        let url = Url::parse(&url_str).map_err(|e| ConfigurationError::InvalidEndpoint {
            url: url_str,
            details: e.to_string(),
        })?;
        self.endpoint = Some(url);
        Ok(self)
    }

    /// Set a custom endpoint URL (infallible version).
    pub fn endpoint_url(mut self, endpoint: Url) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the per-request timeout.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Set the number of attempts for conflicting policy writes.
    pub fn max_policy_attempts(mut self, attempts: u32) -> Self {
        self.max_policy_attempts = Some(attempts);
        self
    }

    /// Set the delay between conflict retries.
    pub fn policy_retry_backoff(mut self, delay: Duration) -> Self {
        self.policy_retry_backoff = Some(delay);
        self
    }

    /// Set the maximum idle connections per host.
    pub fn max_connections(mut self, connections: u32) -> Self {
        self.max_connections = Some(connections);
        self
    }

    /// Set the idle connection timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Enable or disable SSL verification.
    pub fn verify_ssl(mut self, verify: bool) -> Self {
        self.verify_ssl = Some(verify);
        self
    }

    /// Set the User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Reads the credential from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`
    /// and `AWS_REGION`/`AWS_DEFAULT_REGION`, tagged by `BUCKET_CLIENT_PROVIDER`
    /// (`aws` when unset). Malformed numeric overrides are ignored.
    pub fn from_env(mut self) -> Result<Self, BucketClientError> {
        let credential = Credential::from_env()?;
        let provider = std::env::var(PROVIDER_VAR).unwrap_or_else(|_| "aws".to_string());
        self.credential = Some(match provider.to_lowercase().as_str() {
            "aws" | "s3" => CloudCredential::Aws(credential),
            "digitalocean" | "do" | "spaces" => CloudCredential::DigitalOcean(credential),
            other => {
                return Err(ConfigurationError::InvalidConfiguration {
                    field: PROVIDER_VAR.to_string(),
                    message: format!("unknown provider '{}'", other),
                }
                .into())
            }
        });

        if let Ok(endpoint) = std::env::var(ENDPOINT_VAR) {
            self = self.endpoint(endpoint)?;
        }
        if let Ok(val) = std::env::var(POLICY_MAX_ATTEMPTS_VAR) {
            if let Ok(attempts) = val.parse() {
                self.max_policy_attempts = Some(attempts);
            }
        }
        if let Ok(val) = std::env::var(TIMEOUT_MS_VAR) {
            if let Ok(ms) = val.parse() {
                self.operation_timeout = Some(Duration::from_millis(ms));
            }
        }

        Ok(self)
    }

    /// Build the configuration.
    pub fn build(self) -> Result<ClientConfig, BucketClientError> {
        let credential = self
            .credential
            .ok_or(ConfigurationError::MissingCredentials {
                field: "credential",
            })?;

        let max_policy_attempts = self
            .max_policy_attempts
            .unwrap_or(DEFAULT_MAX_POLICY_ATTEMPTS);
        if max_policy_attempts == 0 {
            return Err(ConfigurationError::InvalidConfiguration {
                field: "max_policy_attempts".to_string(),
                message: "at least one attempt is required".to_string(),
            }
            .into());
        }

        let base_url = match &self.endpoint {
            Some(endpoint) => normalize_endpoint(endpoint.clone()),
            None => provider_base_url(&credential)?,
        };
        if base_url.cannot_be_a_base() || base_url.host_str().is_none() {
            return Err(ConfigurationError::InvalidEndpoint {
                url: base_url.to_string(),
                details: "endpoint must be an absolute URL with a host".to_string(),
            }
            .into());
        }

        Ok(ClientConfig {
            credential,
            endpoint: self.endpoint,
            connect_timeout: self.connect_timeout.unwrap_or(Duration::from_secs(5)),
            read_timeout: self.read_timeout.unwrap_or(Duration::from_secs(30)),
            operation_timeout: self.operation_timeout.unwrap_or(Duration::from_secs(60)),
            max_policy_attempts,
            policy_retry_backoff: self.policy_retry_backoff.unwrap_or(Duration::ZERO),
            max_connections: self.max_connections.unwrap_or(100),
            idle_timeout: self.idle_timeout.unwrap_or(Duration::from_secs(90)),
            verify_ssl: self.verify_ssl.unwrap_or(true),
            user_agent: self
                .user_agent
                .unwrap_or_else(|| format!("bucket-client/{}", env!("CARGO_PKG_VERSION"))),
            base_url,
        })
    }
}
