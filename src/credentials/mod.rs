//! Credentials for signed storage requests.
//!
//! A [`Credential`] is validated once at construction and never mutated
//! afterwards; clients share it read-only behind an `Arc`. The provider a
//! credential belongs to is carried by the [`CloudCredential`] tag, which the
//! client factory matches exhaustively.

use crate::error::ConfigurationError;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Service name used in the credential scope.
pub const S3_SERVICE: &str = "s3";

/// Environment variable names read by [`Credential::from_env`].
pub const ACCESS_KEY_ID_VAR: &str = "AWS_ACCESS_KEY_ID";
/// Environment variable holding the secret key.
pub const SECRET_ACCESS_KEY_VAR: &str = "AWS_SECRET_ACCESS_KEY";
/// Environment variable holding the region.
pub const REGION_VAR: &str = "AWS_REGION";
/// Fallback environment variable holding the region.
pub const DEFAULT_REGION_VAR: &str = "AWS_DEFAULT_REGION";

/// Access key pair plus the scope (region, service) it signs for.
#[derive(Clone)]
pub struct Credential {
    access_key_id: String,
    secret_access_key: SecretString,
    region: String,
    service: String,
}

impl Credential {
    /// Create a credential for the `s3` service.
    ///
    /// Fails if any field is empty.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        Self::with_service(access_key_id, secret_access_key, region, S3_SERVICE)
    }

    /// Create a credential scoped to an explicit service name.
    pub fn with_service(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let access_key_id = access_key_id.into();
        let secret_access_key = secret_access_key.into();
        let region = region.into();
        let service = service.into();

        if access_key_id.trim().is_empty() {
            return Err(ConfigurationError::MissingCredentials {
                field: "access_key_id",
            });
        }
        if secret_access_key.is_empty() {
            return Err(ConfigurationError::MissingCredentials {
                field: "secret_access_key",
            });
        }
        if region.trim().is_empty() {
            return Err(ConfigurationError::MissingRegion);
        }
        if service.trim().is_empty() {
            return Err(ConfigurationError::InvalidConfiguration {
                field: "service".to_string(),
                message: "service name must not be empty".to_string(),
            });
        }

        Ok(Self {
            access_key_id,
            secret_access_key: SecretString::new(secret_access_key),
            region,
            service,
        })
    }

    /// Load a credential from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and
    /// `AWS_REGION` (or `AWS_DEFAULT_REGION`).
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let access_key_id = std::env::var(ACCESS_KEY_ID_VAR).map_err(|_| {
            ConfigurationError::MissingCredentials {
                field: "access_key_id",
            }
        })?;
        let secret_access_key = std::env::var(SECRET_ACCESS_KEY_VAR).map_err(|_| {
            ConfigurationError::MissingCredentials {
                field: "secret_access_key",
            }
        })?;
        let region = std::env::var(REGION_VAR)
            .or_else(|_| std::env::var(DEFAULT_REGION_VAR))
            .map_err(|_| ConfigurationError::MissingRegion)?;

        Self::new(access_key_id, secret_access_key, region)
    }

    /// Get the access key ID.
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Get the secret access key.
    ///
    /// Note: This exposes the secret. Use carefully and avoid logging.
    pub fn secret_access_key(&self) -> &str {
        self.secret_access_key.expose_secret()
    }

    /// Get the region.
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Get the service name.
    pub fn service(&self) -> &str {
        &self.service
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("region", &self.region)
            .field("service", &self.service)
            .finish()
    }
}

/// A credential tagged with the storage provider it authenticates against.
#[derive(Debug, Clone)]
pub enum CloudCredential {
    /// Amazon S3.
    Aws(Credential),
    /// DigitalOcean Spaces.
    DigitalOcean(Credential),
}

impl CloudCredential {
    /// The credential, regardless of provider.
    pub fn credential(&self) -> &Credential {
        match self {
            CloudCredential::Aws(c) | CloudCredential::DigitalOcean(c) => c,
        }
    }

    /// Short provider name for logging.
    pub fn provider_name(&self) -> &'static str {
        match self {
            CloudCredential::Aws(_) => "aws",
            CloudCredential::DigitalOcean(_) => "digitalocean",
        }
    }
}
