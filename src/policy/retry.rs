//! Bounded retry of access-policy writes that hit a write conflict.

use crate::error::{BucketClientError, TransportError};
use crate::types::OperationResult;
use http::StatusCode;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Attempt counter for one policy mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
    max_attempts: u32,
}

impl RetryState {
    /// A fresh counter allowing `max_attempts` attempts.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts,
        }
    }

    /// Record the start of an attempt. Returns `false` once the bound is reached.
    pub fn begin_attempt(&mut self) -> bool {
        if self.attempts >= self.max_attempts {
            return false;
        }
        self.attempts += 1;
        true
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Configured bound.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Replays a mutation while it reports 409 Conflict, up to a bound.
#[derive(Debug, Clone)]
pub struct ConflictRetry {
    max_attempts: u32,
    backoff: Duration,
    cancel: CancellationToken,
}

impl ConflictRetry {
    /// Create a retry loop. `backoff` of zero retries immediately.
    pub fn new(max_attempts: u32, backoff: Duration, cancel: CancellationToken) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            cancel,
        }
    }

    /// Configured bound.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `attempt` until it returns something other than a conflict.
    ///
    /// Any non-conflict result, success or failure, ends the loop unchanged.
    /// After `max_attempts` conflicts the result is a 409 failure naming the
    /// attempt count. Cancellation is checked before every attempt.
    pub async fn run<F, Fut>(&self, target: &str, attempt: F) -> OperationResult
    where
        F: Fn() -> Fut,
        Fut: Future<Output = OperationResult>,
    {
        let mut state = RetryState::new(self.max_attempts);

        loop {
            if self.cancel.is_cancelled() {
                return BucketClientError::from(TransportError::Cancelled).into();
            }

            if !state.begin_attempt() {
                warn!(
                    target_url = target,
                    attempts = state.attempts(),
                    "Policy write still conflicting after all attempts"
                );
                return BucketClientError::Conflict {
                    attempts: state.attempts(),
                }
                .into();
            }

            let result = attempt().await;
            if result.status() != Some(StatusCode::CONFLICT) {
                if state.attempts() > 1 {
                    debug!(
                        target_url = target,
                        attempts = state.attempts(),
                        success = result.is_success(),
                        "Policy write settled after conflict"
                    );
                }
                return result;
            }

            debug!(
                target_url = target,
                attempt = state.attempts(),
                max_attempts = state.max_attempts(),
                "Policy write conflicted, retrying"
            );

            if !self.backoff.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.backoff) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn conflict() -> OperationResult {
        OperationResult::failure(Some(StatusCode::CONFLICT), "conflict")
    }

    #[test]
    fn test_retry_state_bound() {
        let mut state = RetryState::new(2);
        assert!(state.begin_attempt());
        assert!(state.begin_attempt());
        assert!(!state.begin_attempt());
        assert_eq!(state.attempts(), 2);
    }

    #[tokio::test]
    async fn test_always_conflicting_stops_at_bound() {
        let calls = &AtomicU32::new(0);
        let retry = ConflictRetry::new(10, Duration::ZERO, CancellationToken::new());

        let result = retry
            .run("https://host/demo?acl=", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                conflict()
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert!(!result.is_success());
        assert_eq!(result.status(), Some(StatusCode::CONFLICT));
        assert_eq!(result.message(), "Failed 10 times due to conflict");
    }

    #[tokio::test]
    async fn test_settles_after_conflicts() {
        let calls = &AtomicU32::new(0);
        let retry = ConflictRetry::new(10, Duration::ZERO, CancellationToken::new());

        let result = retry
            .run("target", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                    conflict()
                } else {
                    OperationResult::success(StatusCode::OK, "")
                }
            })
            .await;

        assert!(result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let retry = ConflictRetry::new(10, Duration::ZERO, CancellationToken::new());

        let result = retry
            .run("target", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                OperationResult::failure(Some(StatusCode::UNPROCESSABLE_ENTITY), "bad acl")
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.message(), "bad acl");
    }

    #[tokio::test]
    async fn test_cancellation_stops_loop() {
        let calls = &AtomicU32::new(0);
        let token = CancellationToken::new();
        let retry = ConflictRetry::new(10, Duration::ZERO, token.clone());
        let token = &token;

        let result = retry
            .run("target", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 1 {
                    token.cancel();
                }
                conflict()
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!result.is_success());
        assert_eq!(result.status(), None);
    }
}
