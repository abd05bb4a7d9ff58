//! Canonical request building for AWS Signature V4.

use super::{sha256_hex, SignableRequest};
use crate::error::SigningError;
use std::collections::BTreeMap;

/// Build the canonical query string.
///
/// Parameters are sorted by name, then by value, and joined with `&`.
/// Keys and values are used exactly as supplied.
pub fn build_canonical_query_string(params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn group_headers(headers: &[(String, String)]) -> BTreeMap<String, Vec<&str>> {
    let mut header_map: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for (name, value) in headers {
        header_map
            .entry(name.to_lowercase())
            .or_default()
            .push(value.trim());
    }
    header_map
}

/// Build the canonical headers block.
///
/// Every header is lowercased and sorted by name; repeated values are trimmed
/// and joined with `,`. Each row ends with a newline.
pub fn build_canonical_headers(headers: &[(String, String)]) -> String {
    group_headers(headers)
        .iter()
        .map(|(name, values)| format!("{}:{}\n", name, values.join(",")))
        .collect()
}

/// Build the signed headers string.
///
/// Returns a semicolon-separated list of lowercase header names.
pub fn build_signed_headers(headers: &[(String, String)]) -> String {
    group_headers(headers)
        .into_keys()
        .collect::<Vec<_>>()
        .join(";")
}

/// Build the canonical request string.
///
/// Format:
/// ```text
/// HTTPMethod\n
/// AbsolutePath\n
/// CanonicalQueryString\n
/// CanonicalHeaders\n
/// SignedHeaders\n
/// HashedPayload
/// ```
///
/// An absent body hashes as the empty byte sequence.
pub fn build_canonical_request(request: &SignableRequest) -> Result<String, SigningError> {
    if !request.has_header("host") {
        return Err(SigningError::MissingHost);
    }

    let body: &[u8] = request.body().map(|b| b.as_ref()).unwrap_or_default();

    Ok(format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method().as_str(),
        request.path(),
        build_canonical_query_string(request.query()),
        build_canonical_headers(request.headers()),
        build_signed_headers(request.headers()),
        sha256_hex(body)
    ))
}
