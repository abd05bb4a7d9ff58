//! Bucket policy document (`?policy=`) for Amazon S3.

use crate::types::AccessPolicy;
use serde::{Deserialize, Serialize};

/// Policy language version.
pub const POLICY_VERSION: &str = "2012-10-17";

/// A bucket policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BucketPolicy {
    /// Policy identifier.
    pub id: String,
    /// Policy language version.
    pub version: String,
    /// Statements.
    pub statement: Vec<PolicyStatement>,
}

/// One statement of a bucket policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    /// Statement identifier.
    pub sid: String,
    /// `Allow` or `Deny`.
    pub effect: String,
    /// Principal the statement applies to.
    pub principal: String,
    /// Actions covered.
    pub action: Vec<String>,
    /// Resource ARN.
    pub resource: String,
}

impl BucketPolicy {
    /// Policy granting anonymous `s3:GetObject` on every object of `bucket`.
    ///
    /// Identifiers derive from the bucket name only, so writing the same
    /// policy twice sends the same document.
    pub fn public_read(bucket: &str) -> Self {
        Self {
            id: format!("ReadPolicy-{}", bucket),
            version: POLICY_VERSION.to_string(),
            statement: vec![PolicyStatement {
                sid: format!("AllowPublicRead-{}", bucket),
                effect: "Allow".to_string(),
                principal: "*".to_string(),
                action: vec!["s3:GetObject".to_string()],
                resource: format!("arn:aws:s3:::{}/*", bucket),
            }],
        }
    }

    /// Policy for `access`, or `None` when the policy should be removed.
    pub fn for_access(bucket: &str, access: AccessPolicy) -> Option<Self> {
        match access {
            AccessPolicy::Public => Some(Self::public_read(bucket)),
            AccessPolicy::Private => None,
        }
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
