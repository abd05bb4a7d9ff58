//! Signs and sends single requests.

use crate::error::{BucketClientError, TransportError};
use crate::signing::{RequestSigner, SignableRequest};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::types::OperationResult;
use bytes::Bytes;
use http::{Method, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// Shared request path of every client: sign, send, bound by a timeout and
/// the caller's cancellation token.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    transport: Arc<dyn HttpTransport>,
    signer: Arc<dyn RequestSigner>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub(crate) fn new(
        transport: Arc<dyn HttpTransport>,
        signer: Arc<dyn RequestSigner>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            signer,
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub(crate) fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Sign and send a request. Any response status is `Ok`.
    pub(crate) async fn send(
        &self,
        method: Method,
        url: &Url,
        body: Option<Bytes>,
        content_type: Option<&str>,
    ) -> Result<HttpResponse, BucketClientError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Cancelled.into());
        }

        let mut request = SignableRequest::new(method, url).with_header("accept", "*/*");
        if let Some(body) = body {
            request = request
                .with_header("content-type", content_type.unwrap_or("application/octet-stream"))
                .with_body(body);
        }

        let (method, headers, body) = self.signer.sign(request)?.into_parts();
        let http_request = HttpRequest {
            method: method.clone(),
            url: url.to_string(),
            headers,
            body,
        };

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!(method = %method, url = %url, "Request cancelled");
                return Err(TransportError::Cancelled.into());
            }
            result = tokio::time::timeout(self.timeout, self.transport.send(http_request)) => {
                result.map_err(|_| TransportError::Timeout { duration: self.timeout })??
            }
        };

        debug!(
            method = %method,
            url = %url,
            status = response.status.as_u16(),
            request_id = response.request_id().unwrap_or_default(),
            "Request completed"
        );

        Ok(response)
    }

    /// Send a request and require `expected` as the response status.
    pub(crate) async fn expect(
        &self,
        method: Method,
        url: &Url,
        body: Option<Bytes>,
        content_type: Option<&str>,
        expected: StatusCode,
    ) -> Result<HttpResponse, BucketClientError> {
        let response = self.send(method, url, body, content_type).await?;
        if response.status != expected {
            return Err(BucketClientError::UnexpectedStatus {
                status: response.status,
                body: response.body_text(),
            });
        }
        Ok(response)
    }

    /// Send a request and report the outcome as an [`OperationResult`].
    pub(crate) async fn execute(
        &self,
        method: Method,
        url: &Url,
        body: Option<Bytes>,
        content_type: Option<&str>,
        expected: StatusCode,
    ) -> OperationResult {
        match self.send(method, url, body, content_type).await {
            Ok(response) => {
                OperationResult::from_status(response.status, expected, response.body_text())
            }
            Err(err) => err.into(),
        }
    }

    /// HEAD probe: `true` on 200, `false` on any other status.
    pub(crate) async fn probe(&self, url: &Url) -> Result<bool, BucketClientError> {
        let response = self.send(Method::HEAD, url, None, None).await?;
        Ok(response.status == StatusCode::OK)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("transport", &self.transport)
            .field("signer", &self.signer)
            .field("timeout", &self.timeout)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
