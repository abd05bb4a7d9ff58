//! Access-policy propagation under eventual consistency.
//!
//! Every ACL, CORS and bucket-policy write goes through [`ConflictRetry`]:
//! the backend answers 409 while a previous write to the same resource is
//! still propagating, and the write is replayed from a fresh read until it
//! settles or the attempt bound is reached. Documents are full-replace, so
//! replaying never compounds grants.
//!
//! Bucket-level propagation runs the two bucket facets concurrently, then
//! walks every listed object sequentially and stops at the first failure.

mod document;
mod retry;

pub use document::{BucketPolicy, PolicyStatement, POLICY_VERSION};
pub use retry::{ConflictRetry, RetryState};

use crate::client::dispatch::Dispatcher;
use crate::config::blob_url_in;
use crate::error::{BucketClientError, ParseError};
use crate::types::{AccessPolicy, OperationResult};
use crate::xml::{self, ListedObject};
use bytes::Bytes;
use http::{Method, StatusCode};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

/// Characters left unescaped in query values: the SigV4 unreserved set.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Locator of a sub-resource (`acl`, `cors`, `policy`) of a bucket or object.
pub fn sub_resource_url(target: &Url, name: &str) -> Url {
    let mut url = target.clone();
    url.set_query(Some(&format!("{}=", name)));
    url
}

/// Join bucket-level facet results.
///
/// Success iff every facet succeeded; messages are joined by a blank line;
/// the status is the first failing facet's status, or 200.
pub fn combine_results(results: &[OperationResult]) -> OperationResult {
    let message = results
        .iter()
        .map(OperationResult::message)
        .filter(|m| !m.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    match results.iter().find(|r| !r.is_success()) {
        Some(failed) => OperationResult::failure(failed.status(), message),
        None => OperationResult::success(StatusCode::OK, message),
    }
}

/// Applies ACL, CORS and bucket-policy documents with conflict retry.
#[derive(Debug, Clone)]
pub(crate) struct PolicyCoordinator {
    dispatcher: Dispatcher,
    retry: ConflictRetry,
}

impl PolicyCoordinator {
    pub(crate) fn new(dispatcher: Dispatcher, max_attempts: u32, backoff: Duration) -> Self {
        let retry = ConflictRetry::new(max_attempts, backoff, dispatcher.cancellation().clone());
        Self { dispatcher, retry }
    }

    /// Replace the ACL of a bucket or object with the one for `policy`.
    ///
    /// Each attempt reads the current ACL for its owner, then writes the
    /// full document. A document without an owner fails without retry.
    pub(crate) async fn set_acl(&self, target: &Url, policy: AccessPolicy) -> OperationResult {
        let acl_url = &sub_resource_url(target, "acl");
        let dispatcher = &self.dispatcher;

        self.retry
            .run(acl_url.as_str(), move || async move {
                let current = match dispatcher
                    .expect(Method::GET, acl_url, None, None, StatusCode::OK)
                    .await
                {
                    Ok(response) => response,
                    Err(err) => return OperationResult::from(err),
                };

                let owner = match xml::parse_access_control_policy(&current.body_text())
                    .and_then(|acl| acl.require_owner().map(str::to_owned))
                {
                    Ok(owner) => owner,
                    Err(err) => return OperationResult::from(BucketClientError::from(err)),
                };

                let document = xml::build_access_control_policy_xml(&owner, policy);
                dispatcher
                    .execute(
                        Method::PUT,
                        acl_url,
                        Some(Bytes::from(document)),
                        Some("application/xml"),
                        StatusCode::OK,
                    )
                    .await
            })
            .await
    }

    /// Apply the CORS configuration for `policy` to a bucket: the public GET
    /// rule when public, no configuration when private.
    pub(crate) async fn set_cors(&self, bucket_url: &Url, policy: AccessPolicy) -> OperationResult {
        let cors_url = &sub_resource_url(bucket_url, "cors");
        let dispatcher = &self.dispatcher;

        self.retry
            .run(cors_url.as_str(), move || async move {
                match policy {
                    AccessPolicy::Public => {
                        dispatcher
                            .execute(
                                Method::PUT,
                                cors_url,
                                Some(Bytes::from(xml::build_public_cors_xml())),
                                Some("application/xml"),
                                StatusCode::OK,
                            )
                            .await
                    }
                    AccessPolicy::Private => {
                        dispatcher
                            .execute(
                                Method::DELETE,
                                cors_url,
                                None,
                                None,
                                StatusCode::NO_CONTENT,
                            )
                            .await
                    }
                }
            })
            .await
    }

    /// Apply the bucket policy for `policy`: anonymous object read when
    /// public, no policy when private.
    pub(crate) async fn set_bucket_policy(
        &self,
        bucket_url: &Url,
        bucket: &str,
        policy: AccessPolicy,
    ) -> OperationResult {
        let policy_url = &sub_resource_url(bucket_url, "policy");
        let document = match BucketPolicy::for_access(bucket, policy).map(|p| p.to_json()) {
            Some(Ok(json)) => Some(Bytes::from(json)),
            Some(Err(err)) => {
                return BucketClientError::from(ParseError::Xml {
                    message: err.to_string(),
                })
                .into()
            }
            None => None,
        };
        let document = &document;
        let dispatcher = &self.dispatcher;

        self.retry
            .run(policy_url.as_str(), move || async move {
                match document {
                    Some(json) => {
                        dispatcher
                            .execute(
                                Method::PUT,
                                policy_url,
                                Some(json.clone()),
                                Some("application/json"),
                                StatusCode::NO_CONTENT,
                            )
                            .await
                    }
                    None => {
                        dispatcher
                            .execute(
                                Method::DELETE,
                                policy_url,
                                None,
                                None,
                                StatusCode::NO_CONTENT,
                            )
                            .await
                    }
                }
            })
            .await
    }

    /// Bucket ACL and CORS concurrently, then the per-object ACL fan-out.
    pub(crate) async fn propagate_acl(
        &self,
        bucket_url: &Url,
        policy: AccessPolicy,
    ) -> OperationResult {
        let (acl, cors) = tokio::join!(
            self.set_acl(bucket_url, policy),
            self.set_cors(bucket_url, policy)
        );
        let bucket_level = combine_results(&[acl, cors]);
        if !bucket_level.is_success() {
            warn!(
                bucket = %bucket_url,
                status = ?bucket_level.status(),
                "Bucket-level policy failed, skipping objects"
            );
            return bucket_level;
        }

        let objects = match self.list_objects(bucket_url).await {
            Ok(objects) => objects,
            Err(err) => return err.into(),
        };

        for object in &objects {
            let object_url = blob_url_in(bucket_url, &object.key);
            let result = self.set_acl(&object_url, policy).await;
            if !result.is_success() {
                warn!(
                    object = %object_url,
                    status = ?result.status(),
                    "Object ACL update failed"
                );
                return result.with_locator(object_url);
            }
        }

        info!(
            bucket = %bucket_url,
            policy = %policy,
            objects = objects.len(),
            "Read policy applied"
        );
        bucket_level
    }

    /// Bucket policy and CORS concurrently; the policy covers every object.
    pub(crate) async fn propagate_bucket_policy(
        &self,
        bucket_url: &Url,
        bucket: &str,
        policy: AccessPolicy,
    ) -> OperationResult {
        let (bucket_policy, cors) = tokio::join!(
            self.set_bucket_policy(bucket_url, bucket, policy),
            self.set_cors(bucket_url, policy)
        );
        let result = combine_results(&[bucket_policy, cors]);
        if result.is_success() {
            info!(bucket = %bucket_url, policy = %policy, "Read policy applied");
        } else {
            warn!(bucket = %bucket_url, status = ?result.status(), "Read policy failed");
        }
        result
    }

    /// Whether a bucket's ACL grants AllUsers read.
    pub(crate) async fn is_public(&self, bucket_url: &Url) -> Result<bool, BucketClientError> {
        let response = self
            .dispatcher
            .expect(
                Method::GET,
                &sub_resource_url(bucket_url, "acl"),
                None,
                None,
                StatusCode::OK,
            )
            .await?;
        Ok(xml::parse_access_control_policy(&response.body_text())?.is_public())
    }

    /// Every object in a bucket, following ListObjects pagination.
    pub(crate) async fn list_objects(
        &self,
        bucket_url: &Url,
    ) -> Result<Vec<ListedObject>, BucketClientError> {
        let mut objects = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut page_url = bucket_url.clone();
            match &marker {
                Some(marker) => page_url.set_query(Some(&format!(
                    "marker={}",
                    utf8_percent_encode(marker, QUERY_ENCODE_SET)
                ))),
                None => page_url.set_query(None),
            }

            let response = self
                .dispatcher
                .expect(Method::GET, &page_url, None, None, StatusCode::OK)
                .await?;
            let page = xml::parse_list_bucket_result(&response.body_text())?;

            let next = page
                .continuation_marker()
                .filter(|next| marker.as_deref() != Some(*next))
                .map(str::to_owned);
            objects.extend(page.contents);

            match next {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        Ok(objects)
    }
}
