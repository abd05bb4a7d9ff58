//! Result and policy types shared by every operation.

use crate::error::BucketClientError;
use http::StatusCode;
use std::fmt;
use url::Url;

/// Outcome of a storage operation.
///
/// Expected failures (a non-matching status, a precondition, an exhausted
/// conflict retry) are reported here rather than as `Err`. `status` is `None`
/// when no response was received at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationResult {
    success: bool,
    message: String,
    status: Option<StatusCode>,
    locator: Option<Url>,
}

impl OperationResult {
    /// A successful result.
    pub fn success(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            status: Some(status),
            locator: None,
        }
    }

    /// A failed result carrying the response status.
    pub fn failure(status: Option<StatusCode>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            status,
            locator: None,
        }
    }

    /// Build a result by comparing a received status to the expected one.
    ///
    /// Only an exact match is a success; other 2xx codes are failures.
    pub fn from_status(status: StatusCode, expected: StatusCode, body: impl Into<String>) -> Self {
        if status == expected {
            Self::success(status, body)
        } else {
            Self::failure(Some(status), body)
        }
    }

    /// Whether the operation succeeded.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Response body on failure, or a short description.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Status the operation completed with.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Locator of the resource the operation produced or failed on.
    pub fn locator(&self) -> Option<&Url> {
        self.locator.as_ref()
    }

    pub(crate) fn with_locator(mut self, locator: Url) -> Self {
        self.locator = Some(locator);
        self
    }
}

impl From<BucketClientError> for OperationResult {
    fn from(err: BucketClientError) -> Self {
        Self::failure(err.status_code(), err.report_message())
    }
}

impl fmt::Display for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = if self.success { "success" } else { "failure" };
        match self.status {
            Some(status) => write!(f, "{} ({})", outcome, status.as_u16())?,
            None => write!(f, "{} (no response)", outcome)?,
        }
        if let Some(locator) = &self.locator {
            write!(f, " {}", locator)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// Read access applied to a bucket and its objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessPolicy {
    /// Anyone may read.
    Public,
    /// Only the owner may read.
    Private,
}

impl AccessPolicy {
    /// Policy matching a public/private classification.
    pub fn from_public(is_public: bool) -> Self {
        if is_public {
            AccessPolicy::Public
        } else {
            AccessPolicy::Private
        }
    }

    /// Whether this policy grants public read.
    pub fn is_public(self) -> bool {
        self == AccessPolicy::Public
    }
}

impl fmt::Display for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessPolicy::Public => f.write_str("public"),
            AccessPolicy::Private => f.write_str("private"),
        }
    }
}
