//! AWS Signature V4 request signing.
//!
//! Signing is split in three pure steps: the canonical request
//! ([`canonical`]), the scoped signing key ([`derive_signing_key`]) and the
//! signer that attaches the authentication headers ([`SignerV4`]). None of them
//! hold shared mutable state, so a signer can be used from any number of tasks.

mod canonical;
mod request;
mod signer;

pub use canonical::{
    build_canonical_headers, build_canonical_query_string, build_canonical_request,
    build_signed_headers,
};
pub use request::SignableRequest;
pub use signer::{sign_request, RequestSigner, SignerV4};

use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use md5::Md5;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// AWS Signature V4 algorithm identifier.
pub const AWS_ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Terminator of every credential scope.
pub const SCOPE_TERMINATOR: &str = "aws4_request";

/// Header carrying the signing timestamp.
pub const AMZ_DATE_HEADER: &str = "x-amz-date";

/// Header carrying the hex SHA-256 of the payload.
pub const CONTENT_SHA256_HEADER: &str = "x-amz-content-sha256";

/// Header carrying the base64 MD5 of the payload.
pub const CONTENT_MD5_HEADER: &str = "content-md5";

/// Header carrying the computed authorization.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Calculate SHA-256 hash of data.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Calculate the base64 MD5 digest used by the `Content-MD5` header.
pub fn content_md5(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Calculate HMAC-SHA256.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// A derived signing key, bound to one (date, region, service) triple.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey {
    bytes: [u8; 32],
    scope: String,
}

impl SigningKey {
    /// The raw 32 key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// The credential scope this key is valid for.
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Sign a string with this key, returning the lower-case hex signature.
    pub fn sign(&self, string_to_sign: &str) -> String {
        hex::encode(hmac_sha256(&self.bytes, string_to_sign.as_bytes()))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Generate the signing key for AWS Signature V4.
///
/// kDate = HMAC("AWS4" + SecretKey, Date)
/// kRegion = HMAC(kDate, Region)
/// kService = HMAC(kRegion, Service)
/// kSigning = HMAC(kService, "aws4_request")
pub fn derive_signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> SigningKey {
    let k_secret = format!("AWS4{}", secret_key);
    let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    SigningKey {
        bytes: hmac_sha256(&k_service, SCOPE_TERMINATOR.as_bytes()),
        scope: build_credential_scope(date_stamp, region, service),
    }
}

/// Build the credential scope string.
///
/// Format: `{date}/{region}/{service}/aws4_request`
pub fn build_credential_scope(date_stamp: &str, region: &str, service: &str) -> String {
    format!("{}/{}/{}/{}", date_stamp, region, service, SCOPE_TERMINATOR)
}

/// Format a timestamp for AWS signatures.
///
/// Returns the date-time in `YYYYMMDD'T'HHMMSS'Z'` format.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Format a date stamp for AWS signatures.
///
/// Returns the date in `YYYYMMDD` format.
pub fn format_date_stamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%d").to_string()
}

/// Time-derived values shared by every step of one signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningContext {
    /// `yyyyMMddTHHmmssZ` timestamp.
    pub amz_date: String,
    /// `yyyyMMdd` date stamp.
    pub date_stamp: String,
    /// `date/region/service/aws4_request`.
    pub credential_scope: String,
}

impl SigningContext {
    /// Build the context for a signature made at `now`.
    pub fn new(now: &DateTime<Utc>, region: &str, service: &str) -> Self {
        let date_stamp = format_date_stamp(now);
        Self {
            amz_date: format_datetime(now),
            credential_scope: build_credential_scope(&date_stamp, region, service),
            date_stamp,
        }
    }

    /// Build the string to sign for a canonical request.
    pub fn string_to_sign(&self, canonical_request: &str) -> String {
        format!(
            "{}\n{}\n{}\n{}",
            AWS_ALGORITHM,
            self.amz_date,
            self.credential_scope,
            sha256_hex(canonical_request.as_bytes())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            sha256_hex(b"test"),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn test_content_md5() {
        // MD5("") = d41d8cd98f00b204e9800998ecf8427e
        assert_eq!(content_md5(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
    }

    #[test]
    fn test_derive_signing_key_known_vector() {
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key.as_bytes()),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
        assert_eq!(key.scope(), "20120215/us-east-1/iam/aws4_request");
    }

    #[test]
    fn test_signing_key_differs_across_days() {
        let monday = derive_signing_key("secret", "20240101", "nyc3", "s3");
        let tuesday = derive_signing_key("secret", "20240102", "nyc3", "s3");
        assert_ne!(monday.as_bytes(), tuesday.as_bytes());
    }

    #[test]
    fn test_signing_key_debug_hides_bytes() {
        let key = derive_signing_key("secret", "20240101", "nyc3", "s3");
        let debug = format!("{:?}", key);
        assert!(debug.contains("20240101/nyc3/s3/aws4_request"));
        assert!(!debug.contains(&hex::encode(key.as_bytes())));
    }

    #[test]
    fn test_build_credential_scope() {
        let scope = build_credential_scope("20231215", "us-east-1", "s3");
        assert_eq!(scope, "20231215/us-east-1/s3/aws4_request");
    }

    #[test]
    fn test_format_datetime() {
        let dt = Utc.with_ymd_and_hms(2023, 12, 15, 10, 30, 45).unwrap();
        assert_eq!(format_datetime(&dt), "20231215T103045Z");
        assert_eq!(format_date_stamp(&dt), "20231215");
    }

    #[test]
    fn test_signing_context() {
        let dt = Utc.with_ymd_and_hms(2013, 5, 24, 0, 0, 0).unwrap();
        let ctx = SigningContext::new(&dt, "us-east-1", "s3");
        assert_eq!(ctx.amz_date, "20130524T000000Z");
        assert_eq!(ctx.date_stamp, "20130524");
        assert_eq!(ctx.credential_scope, "20130524/us-east-1/s3/aws4_request");

        let sts = ctx.string_to_sign("");
        assert!(sts.starts_with("AWS4-HMAC-SHA256\n20130524T000000Z\n"));
        assert!(sts.ends_with(&sha256_hex(b"")));
    }
}
