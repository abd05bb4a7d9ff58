//! Error types for the bucket client.
//!
//! Errors are grouped by the taxonomy the client exposes to callers:
//! configuration faults raised at construction, transport faults, backend
//! write conflicts, malformed documents, and existence preconditions.
//! Only [`BucketClientError::Conflict`] is ever recovered locally.

use http::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for the bucket client.
#[derive(Debug, Error)]
pub enum BucketClientError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Request signing errors.
    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),

    /// Network and transport errors.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Document or locator parsing errors.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Create-on-existing or update-on-absent.
    #[error("Precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    /// The endpoint answered with a status other than the one the operation expects.
    #[error("Unexpected response status {status}")]
    UnexpectedStatus {
        /// Status received.
        status: StatusCode,
        /// Raw response body.
        body: String,
    },

    /// The backend kept reporting a write conflict until the attempt bound was reached.
    #[error("Failed {attempts} times due to conflict")]
    Conflict {
        /// Number of attempts made before giving up.
        attempts: u32,
    },
}

impl BucketClientError {
    /// Returns true if the error may be resolved by replaying the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BucketClientError::Conflict { .. })
    }

    /// Returns the HTTP status this error is reported with, if any.
    ///
    /// Transport faults have no status: no response was received.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            BucketClientError::Configuration(_) => None,
            BucketClientError::Signing(_) => None,
            BucketClientError::Transport(_) => None,
            BucketClientError::Parse(_) => Some(StatusCode::UNPROCESSABLE_ENTITY),
            BucketClientError::Precondition(PreconditionError::AlreadyExists { .. }) => {
                Some(StatusCode::BAD_REQUEST)
            }
            BucketClientError::Precondition(PreconditionError::NotFound { .. }) => {
                Some(StatusCode::NOT_FOUND)
            }
            BucketClientError::UnexpectedStatus { status, .. } => Some(*status),
            BucketClientError::Conflict { .. } => Some(StatusCode::CONFLICT),
        }
    }

    /// Message reported to callers: the raw body for unexpected statuses,
    /// the error description otherwise.
    pub fn report_message(&self) -> String {
        match self {
            BucketClientError::UnexpectedStatus { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }

    /// Returns true if the error was caused by caller cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BucketClientError::Transport(TransportError::Cancelled))
    }
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A credential field is missing or empty.
    #[error("Missing credentials: '{field}' must be a non-empty value")]
    MissingCredentials {
        /// Name of the missing field.
        field: &'static str,
    },

    /// Missing region.
    #[error("Missing region: region must be specified via config or environment")]
    MissingRegion,

    /// Invalid endpoint URL.
    #[error("Invalid endpoint URL: {url} ({details})")]
    InvalidEndpoint {
        /// The invalid URL.
        url: String,
        /// Details about the validation error.
        details: String,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration: {field} - {message}")]
    InvalidConfiguration {
        /// The configuration field name.
        field: String,
        /// Error message.
        message: String,
    },
}

/// Request signing errors.
#[derive(Debug, Error)]
pub enum SigningError {
    /// Neither a `host` header nor a target host was supplied.
    #[error("Request has no host header and no target host")]
    MissingHost,
}

/// Network and transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection or protocol failure.
    #[error("Connection failed: {message}")]
    Connection {
        /// Details about the failure.
        message: String,
    },

    /// The request did not complete in time.
    #[error("Request timed out after {duration:?}")]
    Timeout {
        /// The timeout that elapsed.
        duration: Duration,
    },

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// The request could not be built.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Details about the problem.
        message: String,
    },
}

/// Document and locator parsing errors.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The XML document is malformed.
    #[error("Malformed XML: {message}")]
    Xml {
        /// Details from the XML reader.
        message: String,
    },

    /// The ACL document carries no owner identity.
    #[error("ACL document has no Owner/ID")]
    MissingOwner,

    /// A locator does not identify a bucket or blob.
    #[error("Invalid locator: {locator}")]
    InvalidLocator {
        /// The locator that could not be interpreted.
        locator: String,
    },
}

/// Existence preconditions of gated blob operations.
#[derive(Debug, Error)]
pub enum PreconditionError {
    /// Create was called on a locator that already holds a blob.
    #[error("Blob {locator} already exists")]
    AlreadyExists {
        /// The blob locator.
        locator: String,
    },

    /// Update was called on a locator that holds no blob.
    #[error("Blob {locator} does not exist")]
    NotFound {
        /// The blob locator.
        locator: String,
    },
}
