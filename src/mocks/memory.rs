//! In-memory S3-compatible endpoint.
//!
//! [`MemoryTransport`] answers signed requests the way an S3-compatible
//! service does for the subset of the API the clients use: bucket and object
//! CRUD, `?acl=`, `?cors=` and `?policy=` sub-resources, and paginated
//! ListObjects (v1). Write conflicts can be injected per sub-resource to
//! exercise the policy retry loop.

use crate::credentials::Credential;
use crate::error::{BucketClientError, TransportError};
use crate::signing::{content_md5, sha256_hex, sign_request, SignableRequest};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::types::AccessPolicy;
use crate::xml;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{NaiveDateTime, TimeZone, Utc};
use http::{Method, StatusCode};
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use std::collections::{BTreeMap, HashMap};
use url::Url;

/// Owner ID reported in every ACL document.
pub const MEMORY_OWNER_ID: &str = "memory-owner";

/// Sub-resources that accept conflict injection.
const SUB_RESOURCES: [&str; 3] = ["acl", "cors", "policy"];

/// An object held by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object content.
    pub body: Bytes,
    /// Content type sent with the upload.
    pub content_type: Option<String>,
    /// Whether the object ACL grants AllUsers read.
    pub public: bool,
}

#[derive(Debug, Default)]
struct StoredBucket {
    objects: BTreeMap<String, StoredObject>,
    public: bool,
    cors: Option<String>,
    policy: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    buckets: BTreeMap<String, StoredBucket>,
    conflicts: HashMap<&'static str, usize>,
    requests: Vec<HttpRequest>,
}

/// In-memory S3-compatible endpoint usable as an [`HttpTransport`].
pub struct MemoryTransport {
    state: Mutex<State>,
    page_size: usize,
    verifier: Option<Credential>,
    missing_delete_status: StatusCode,
}

impl MemoryTransport {
    /// Create an empty endpoint.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: 1000,
            verifier: None,
            missing_delete_status: StatusCode::NO_CONTENT,
        }
    }

    /// Limit listing pages to `page_size` keys.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Recompute every request's signature with `credential` and reject
    /// mismatches with 403.
    pub fn verifying(mut self, credential: Credential) -> Self {
        self.verifier = Some(credential);
        self
    }

    /// Status returned when deleting an object that does not exist.
    pub fn with_missing_delete_status(mut self, status: StatusCode) -> Self {
        self.missing_delete_status = status;
        self
    }

    /// Answer the next `times` writes to `sub_resource` (`acl`, `cors` or
    /// `policy`) with 409 Conflict. `usize::MAX` conflicts forever.
    pub fn inject_conflicts(&self, sub_resource: &str, times: usize) {
        if let Some(name) = SUB_RESOURCES.iter().find(|s| **s == sub_resource) {
            self.state.lock().conflicts.insert(name, times);
        }
    }

    /// Create a bucket directly.
    pub fn insert_bucket(&self, bucket: &str) {
        self.state
            .lock()
            .buckets
            .entry(bucket.to_string())
            .or_default();
    }

    /// Store an object directly, creating the bucket if needed.
    pub fn insert_object(&self, bucket: &str, key: &str, body: impl Into<Bytes>) {
        self.state
            .lock()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .objects
            .insert(
                key.to_string(),
                StoredObject {
                    body: body.into(),
                    content_type: None,
                    public: false,
                },
            );
    }

    /// Whether a bucket exists.
    pub fn bucket_exists(&self, bucket: &str) -> bool {
        self.state.lock().buckets.contains_key(bucket)
    }

    /// A stored object.
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.state
            .lock()
            .buckets
            .get(bucket)
            .and_then(|b| b.objects.get(key).cloned())
    }

    /// Keys stored in a bucket, in order.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.state
            .lock()
            .buckets
            .get(bucket)
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether the bucket ACL grants AllUsers read.
    pub fn is_bucket_public(&self, bucket: &str) -> bool {
        self.state
            .lock()
            .buckets
            .get(bucket)
            .map(|b| b.public)
            .unwrap_or(false)
    }

    /// Stored CORS document of a bucket.
    pub fn cors(&self, bucket: &str) -> Option<String> {
        self.state
            .lock()
            .buckets
            .get(bucket)
            .and_then(|b| b.cors.clone())
    }

    /// Stored bucket policy of a bucket.
    pub fn policy(&self, bucket: &str) -> Option<String> {
        self.state
            .lock()
            .buckets
            .get(bucket)
            .and_then(|b| b.policy.clone())
    }

    /// All requests received, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state.lock().requests.clone()
    }

    /// Number of requests received.
    pub fn request_count(&self) -> usize {
        self.state.lock().requests.len()
    }

    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        if let Some(rejection) = self.check_authentication(request) {
            return rejection;
        }

        let url = match Url::parse(&request.url) {
            Ok(url) => url,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, "InvalidURI", &e.to_string()),
        };

        let path = url.path().trim_start_matches('/');
        let (bucket, key) = match path.split_once('/') {
            Some((bucket, key)) => (decode(bucket), decode(key)),
            None => (decode(path), String::new()),
        };
        if bucket.is_empty() {
            return error_response(StatusCode::BAD_REQUEST, "InvalidBucketName", "no bucket");
        }

        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let sub_resource = SUB_RESOURCES
            .iter()
            .copied()
            .find(|name| query.contains_key(*name));

        let mut state = self.state.lock();

        if let Some(name) = sub_resource {
            if request.method == Method::PUT || request.method == Method::DELETE {
                if let Some(remaining) = state.conflicts.get_mut(name) {
                    if *remaining > 0 {
                        if *remaining != usize::MAX {
                            *remaining -= 1;
                        }
                        return error_response(
                            StatusCode::CONFLICT,
                            "OperationAborted",
                            "A conflicting conditional operation is currently in progress",
                        );
                    }
                }
            }
        }

        if key.is_empty() {
            self.handle_bucket(&mut state, request, &bucket, sub_resource, &query)
        } else {
            self.handle_object(&mut state, request, &bucket, &key, sub_resource)
        }
    }

    fn handle_bucket(
        &self,
        state: &mut State,
        request: &HttpRequest,
        bucket: &str,
        sub_resource: Option<&str>,
        query: &HashMap<String, String>,
    ) -> HttpResponse {
        if sub_resource.is_none() && request.method == Method::PUT {
            if state.buckets.contains_key(bucket) {
                return error_response(
                    StatusCode::CONFLICT,
                    "BucketAlreadyOwnedByYou",
                    "Your previous request to create the named bucket succeeded",
                );
            }
            state.buckets.insert(bucket.to_string(), StoredBucket::default());
            return HttpResponse::new(StatusCode::OK, Bytes::new());
        }

        let Some(stored) = state.buckets.get_mut(bucket) else {
            return error_response(
                StatusCode::NOT_FOUND,
                "NoSuchBucket",
                "The specified bucket does not exist",
            );
        };

        match (sub_resource, &request.method) {
            (None, &Method::HEAD) => HttpResponse::new(StatusCode::OK, Bytes::new()),
            (None, &Method::GET) => self.list_page(bucket, stored, query),
            (None, &Method::DELETE) => {
                if !stored.objects.is_empty() {
                    return error_response(
                        StatusCode::CONFLICT,
                        "BucketNotEmpty",
                        "The bucket you tried to delete is not empty",
                    );
                }
                state.buckets.remove(bucket);
                HttpResponse::new(StatusCode::NO_CONTENT, Bytes::new())
            }
            (Some("acl"), &Method::GET) => acl_response(stored.public),
            (Some("acl"), &Method::PUT) => match parse_acl_body(request) {
                Ok(public) => {
                    stored.public = public;
                    HttpResponse::new(StatusCode::OK, Bytes::new())
                }
                Err(rejection) => rejection,
            },
            (Some("cors"), &Method::GET) => match &stored.cors {
                Some(cors) => HttpResponse::new(StatusCode::OK, cors.clone()),
                None => error_response(
                    StatusCode::NOT_FOUND,
                    "NoSuchCORSConfiguration",
                    "The CORS configuration does not exist",
                ),
            },
            (Some("cors"), &Method::PUT) => {
                let body = body_text(request);
                if xml::parse_cors_configuration(&body).is_err() {
                    return error_response(StatusCode::BAD_REQUEST, "MalformedXML", "bad CORS");
                }
                stored.cors = Some(body);
                HttpResponse::new(StatusCode::OK, Bytes::new())
            }
            (Some("cors"), &Method::DELETE) => {
                stored.cors = None;
                HttpResponse::new(StatusCode::NO_CONTENT, Bytes::new())
            }
            (Some("policy"), &Method::GET) => match &stored.policy {
                Some(policy) => HttpResponse::new(StatusCode::OK, policy.clone()),
                None => error_response(
                    StatusCode::NOT_FOUND,
                    "NoSuchBucketPolicy",
                    "The bucket policy does not exist",
                ),
            },
            (Some("policy"), &Method::PUT) => {
                let body = body_text(request);
                if serde_json::from_str::<serde_json::Value>(&body).is_err() {
                    return error_response(
                        StatusCode::BAD_REQUEST,
                        "MalformedPolicy",
                        "Policies must be valid JSON",
                    );
                }
                stored.policy = Some(body);
                HttpResponse::new(StatusCode::NO_CONTENT, Bytes::new())
            }
            (Some("policy"), &Method::DELETE) => {
                stored.policy = None;
                HttpResponse::new(StatusCode::NO_CONTENT, Bytes::new())
            }
            _ => method_not_allowed(),
        }
    }

    fn handle_object(
        &self,
        state: &mut State,
        request: &HttpRequest,
        bucket: &str,
        key: &str,
        sub_resource: Option<&str>,
    ) -> HttpResponse {
        let Some(stored) = state.buckets.get_mut(bucket) else {
            return error_response(
                StatusCode::NOT_FOUND,
                "NoSuchBucket",
                "The specified bucket does not exist",
            );
        };

        match (sub_resource, &request.method) {
            (None, &Method::PUT) => {
                stored.objects.insert(
                    key.to_string(),
                    StoredObject {
                        body: request.body.clone().unwrap_or_default(),
                        content_type: request.get_header("content-type").map(String::from),
                        public: false,
                    },
                );
                let mut response = HttpResponse::new(StatusCode::OK, Bytes::new());
                response.headers.insert(
                    "etag".to_string(),
                    format!("\"{}\"", etag(request.body.as_deref().unwrap_or_default())),
                );
                response
            }
            (None, &Method::HEAD) => match stored.objects.get(key) {
                Some(object) => {
                    let mut response = HttpResponse::new(StatusCode::OK, Bytes::new());
                    response
                        .headers
                        .insert("content-length".to_string(), object.body.len().to_string());
                    response
                }
                None => HttpResponse::new(StatusCode::NOT_FOUND, Bytes::new()),
            },
            (None, &Method::GET) => match stored.objects.get(key) {
                Some(object) => {
                    let mut response = HttpResponse::new(StatusCode::OK, object.body.clone());
                    if let Some(content_type) = &object.content_type {
                        response
                            .headers
                            .insert("content-type".to_string(), content_type.clone());
                    }
                    response
                }
                None => no_such_key(),
            },
            (None, &Method::DELETE) => match stored.objects.remove(key) {
                Some(_) => HttpResponse::new(StatusCode::NO_CONTENT, Bytes::new()),
                None if self.missing_delete_status == StatusCode::NO_CONTENT => {
                    HttpResponse::new(StatusCode::NO_CONTENT, Bytes::new())
                }
                None => error_response(
                    self.missing_delete_status,
                    "NoSuchKey",
                    "The specified key does not exist.",
                ),
            },
            (Some("acl"), &Method::GET) => match stored.objects.get(key) {
                Some(object) => acl_response(object.public),
                None => no_such_key(),
            },
            (Some("acl"), &Method::PUT) => {
                let public = match parse_acl_body(request) {
                    Ok(public) => public,
                    Err(rejection) => return rejection,
                };
                match stored.objects.get_mut(key) {
                    Some(object) => {
                        object.public = public;
                        HttpResponse::new(StatusCode::OK, Bytes::new())
                    }
                    None => no_such_key(),
                }
            }
            _ => method_not_allowed(),
        }
    }

    fn list_page(
        &self,
        bucket: &str,
        stored: &StoredBucket,
        query: &HashMap<String, String>,
    ) -> HttpResponse {
        let marker = query.get("marker").map(String::as_str).unwrap_or("");
        let mut remaining = stored
            .objects
            .iter()
            .filter(|(key, _)| key.as_str() > marker);
        let page: Vec<_> = remaining.by_ref().take(self.page_size).collect();
        let truncated = remaining.next().is_some();

        let mut body = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        body.push_str(&format!("<ListBucketResult xmlns=\"{}\">", xml::S3_NAMESPACE));
        body.push_str(&format!("<Name>{}</Name>", escape(bucket)));
        body.push_str(&format!("<Marker>{}</Marker>", escape(marker)));
        body.push_str(&format!("<MaxKeys>{}</MaxKeys>", self.page_size));
        body.push_str(&format!("<IsTruncated>{}</IsTruncated>", truncated));
        for (key, object) in page {
            body.push_str("<Contents>");
            body.push_str(&format!("<Key>{}</Key>", escape(key)));
            body.push_str("<LastModified>2024-01-01T00:00:00.000Z</LastModified>");
            body.push_str(&format!("<ETag>\"{}\"</ETag>", etag(&object.body)));
            body.push_str(&format!("<Size>{}</Size>", object.body.len()));
            body.push_str("</Contents>");
        }
        body.push_str("</ListBucketResult>");

        HttpResponse::new(StatusCode::OK, body)
    }

    fn check_authentication(&self, request: &HttpRequest) -> Option<HttpResponse> {
        let authorization = request.get_header("authorization")?;
        let amz_date = request.get_header("x-amz-date")?;
        let body = request.body.as_deref().unwrap_or_default();

        if request.get_header("x-amz-content-sha256") != Some(sha256_hex(body).as_str()) {
            return Some(error_response(
                StatusCode::BAD_REQUEST,
                "XAmzContentSHA256Mismatch",
                "The provided 'x-amz-content-sha256' header does not match what was computed.",
            ));
        }
        if request.body.is_some()
            && request.get_header("content-md5") != Some(content_md5(body).as_str())
        {
            return Some(error_response(
                StatusCode::BAD_REQUEST,
                "BadDigest",
                "The Content-MD5 you specified did not match what we received.",
            ));
        }

        let credential = self.verifier.as_ref()?;
        let expected = expected_authorization(request, credential, amz_date);
        if expected.as_deref() != Some(authorization) {
            return Some(error_response(
                StatusCode::FORBIDDEN,
                "SignatureDoesNotMatch",
                "The request signature we calculated does not match the signature you provided.",
            ));
        }
        None
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for MemoryTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, BucketClientError> {
        if request.get_header("authorization").is_none() {
            return Err(TransportError::InvalidRequest {
                message: "unsigned request".to_string(),
            }
            .into());
        }

        let response = self.handle(&request);
        self.state.lock().requests.push(request);
        Ok(response)
    }
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryTransport")
            .field("buckets", &state.buckets.len())
            .field("requests", &state.requests.len())
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

fn expected_authorization(
    request: &HttpRequest,
    credential: &Credential,
    amz_date: &str,
) -> Option<String> {
    let url = Url::parse(&request.url).ok()?;
    let naive = NaiveDateTime::parse_from_str(amz_date, "%Y%m%dT%H%M%SZ").ok()?;
    let now = Utc.from_utc_datetime(&naive);

    let mut signable = SignableRequest::new(request.method.clone(), &url);
    for (name, value) in &request.headers {
        if !name.eq_ignore_ascii_case("authorization") {
            signable = signable.with_header(name.as_str(), value.as_str());
        }
    }
    if let Some(body) = &request.body {
        signable = signable.with_body(body.clone());
    }

    let signed = sign_request(signable, credential, &now).ok()?;
    signed.header("authorization").map(String::from)
}

fn parse_acl_body(request: &HttpRequest) -> Result<bool, HttpResponse> {
    let malformed = || {
        error_response(
            StatusCode::BAD_REQUEST,
            "MalformedACLError",
            "The XML you provided was not well-formed or did not validate against our published schema.",
        )
    };
    let acl = xml::parse_access_control_policy(&body_text(request)).map_err(|_| malformed())?;
    acl.require_owner().map_err(|_| malformed())?;
    Ok(acl.is_public())
}

fn acl_response(public: bool) -> HttpResponse {
    HttpResponse::new(
        StatusCode::OK,
        xml::build_access_control_policy_xml(MEMORY_OWNER_ID, AccessPolicy::from_public(public)),
    )
}

fn no_such_key() -> HttpResponse {
    error_response(
        StatusCode::NOT_FOUND,
        "NoSuchKey",
        "The specified key does not exist.",
    )
}

fn method_not_allowed() -> HttpResponse {
    error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        "MethodNotAllowed",
        "The specified method is not allowed against this resource.",
    )
}

fn error_response(status: StatusCode, code: &str, message: &str) -> HttpResponse {
    HttpResponse::new(
        status,
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Error><Code>{}</Code><Message>{}</Message></Error>",
            code,
            escape(message)
        ),
    )
}

fn body_text(request: &HttpRequest) -> String {
    String::from_utf8_lossy(request.body.as_deref().unwrap_or_default()).into_owned()
}

fn decode(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

fn etag(body: &[u8]) -> String {
    sha256_hex(body)[..32].to_string()
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
