//! AWS Signature V4 signer implementation.

use super::*;
use crate::credentials::Credential;
use crate::error::SigningError;
use std::sync::Arc;

/// Trait for request signers.
pub trait RequestSigner: Send + Sync + std::fmt::Debug {
    /// Sign a request, returning it with authentication headers attached.
    fn sign(&self, request: SignableRequest) -> Result<SignableRequest, SigningError>;
}

/// Sign `request` with `credential` as of `now`.
///
/// The request gains `host` (when missing), `x-amz-date`,
/// `x-amz-content-sha256`, `content-md5` (when a body is present) and
/// `authorization`. Every header present after that augmentation, including
/// the ones added here, is part of the signature.
pub fn sign_request(
    mut request: SignableRequest,
    credential: &Credential,
    now: &DateTime<Utc>,
) -> Result<SignableRequest, SigningError> {
    if !request.has_header("host") {
        let host = request
            .target_host()
            .filter(|h| !h.is_empty())
            .ok_or(SigningError::MissingHost)?
            .to_string();
        request.set_header("host", host);
    }

    let context = SigningContext::new(now, credential.region(), credential.service());

    let body = request.body().cloned();
    let payload_hash = sha256_hex(body.as_deref().unwrap_or_default());

    request.remove_header(AUTHORIZATION_HEADER);
    request.set_header(AMZ_DATE_HEADER, context.amz_date.clone());
    if let Some(body) = &body {
        request.set_header(CONTENT_MD5_HEADER, content_md5(body));
    }
    request.set_header(CONTENT_SHA256_HEADER, payload_hash);

    let canonical_request = build_canonical_request(&request)?;
    let signed_headers = build_signed_headers(request.headers());
    let string_to_sign = context.string_to_sign(&canonical_request);

    let signing_key = derive_signing_key(
        credential.secret_access_key(),
        &context.date_stamp,
        credential.region(),
        credential.service(),
    );
    let signature = signing_key.sign(&string_to_sign);

    let authorization = format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        AWS_ALGORITHM,
        credential.access_key_id(),
        context.credential_scope,
        signed_headers,
        signature
    );
    request.set_header(AUTHORIZATION_HEADER, authorization);

    Ok(request)
}

/// AWS Signature V4 signer bound to one credential.
#[derive(Clone)]
pub struct SignerV4 {
    credential: Arc<Credential>,
}

impl SignerV4 {
    /// Create a new signer.
    pub fn new(credential: Arc<Credential>) -> Self {
        Self { credential }
    }

    /// Sign as of an explicit instant.
    pub fn sign_at(
        &self,
        request: SignableRequest,
        now: &DateTime<Utc>,
    ) -> Result<SignableRequest, SigningError> {
        sign_request(request, &self.credential, now)
    }
}

impl RequestSigner for SignerV4 {
    fn sign(&self, request: SignableRequest) -> Result<SignableRequest, SigningError> {
        self.sign_at(request, &Utc::now())
    }
}

impl std::fmt::Debug for SignerV4 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerV4")
            .field("region", &self.credential.region())
            .field("service", &self.credential.service())
            .finish_non_exhaustive()
    }
}
