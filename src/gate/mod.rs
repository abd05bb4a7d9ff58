//! Existence-gated blob operations over an unconditional write.
//!
//! A backend implements [`BlobStore`]; every `BlobStore` is a
//! [`BlobOperations`] with create/update gated on an existence probe and
//! idempotent delete.

use crate::client::BlobOperations;
use crate::error::{BucketClientError, PreconditionError};
use crate::types::OperationResult;
use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use tracing::debug;
use url::Url;

/// Storage primitives the gate is layered over.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `payload` to `locator`, replacing any existing content.
    async fn raw_put(&self, payload: Bytes, locator: &Url) -> OperationResult;

    /// Metadata-only existence probe. `Err` only on transport failure.
    async fn probe(&self, locator: &Url) -> Result<bool, BucketClientError>;

    /// Remove the blob at `locator`.
    async fn remove(&self, locator: &Url) -> OperationResult;

    /// Read the blob at `locator`.
    async fn fetch(&self, locator: &Url) -> Result<Bytes, BucketClientError>;

    /// Runs after every successful write. A failure result here fails the
    /// write.
    async fn after_write(&self, _locator: &Url) -> Option<OperationResult> {
        None
    }
}

async fn write<S>(store: &S, payload: Bytes, locator: &Url) -> OperationResult
where
    S: BlobStore + ?Sized,
{
    let result = store.raw_put(payload, locator).await;
    if !result.is_success() {
        return result.with_locator(locator.clone());
    }

    match store.after_write(locator).await {
        Some(follow_up) if !follow_up.is_success() => follow_up.with_locator(locator.clone()),
        _ => result.with_locator(locator.clone()),
    }
}

#[async_trait]
impl<S> BlobOperations for S
where
    S: BlobStore + ?Sized,
{
    async fn exist_blob(&self, locator: &Url) -> Result<bool, BucketClientError> {
        self.probe(locator).await
    }

    async fn create_blob(&self, payload: Bytes, locator: &Url) -> OperationResult {
        match self.probe(locator).await {
            Ok(false) => write(self, payload, locator).await,
            Ok(true) => BucketClientError::from(PreconditionError::AlreadyExists {
                locator: locator.to_string(),
            })
            .into(),
            Err(err) => err.into(),
        }
    }

    async fn update_blob(&self, payload: Bytes, locator: &Url) -> OperationResult {
        match self.probe(locator).await {
            Ok(true) => write(self, payload, locator).await,
            Ok(false) => BucketClientError::from(PreconditionError::NotFound {
                locator: locator.to_string(),
            })
            .into(),
            Err(err) => err.into(),
        }
    }

    async fn put_blob(&self, payload: Bytes, locator: &Url) -> OperationResult {
        write(self, payload, locator).await
    }

    async fn delete_blob(&self, locator: &Url) -> OperationResult {
        let result = self.remove(locator).await;
        if result.is_success() {
            return result;
        }

        let absent = match result.status() {
            Some(StatusCode::NOT_FOUND) => true,
            _ => matches!(self.probe(locator).await, Ok(false)),
        };
        if absent {
            debug!(locator = %locator, status = ?result.status(), "Delete of absent blob");
            return OperationResult::success(StatusCode::NO_CONTENT, "");
        }
        result
    }

    async fn get_blob(&self, locator: &Url) -> Result<Bytes, BucketClientError> {
        self.fetch(locator).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Blob store over a map. Deleting a missing key answers `missing_delete`.
    struct MapStore {
        blobs: Mutex<HashMap<String, Bytes>>,
        missing_delete: StatusCode,
        puts: AtomicUsize,
        follow_up: Option<OperationResult>,
    }

    impl MapStore {
        fn new() -> Self {
            Self {
                blobs: Mutex::new(HashMap::new()),
                missing_delete: StatusCode::NO_CONTENT,
                puts: AtomicUsize::new(0),
                follow_up: None,
            }
        }

        fn stored(&self, locator: &Url) -> Option<Bytes> {
            self.blobs.lock().get(locator.as_str()).cloned()
        }
    }

    #[async_trait]
    impl BlobStore for MapStore {
        async fn raw_put(&self, payload: Bytes, locator: &Url) -> OperationResult {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.blobs.lock().insert(locator.to_string(), payload);
            OperationResult::success(StatusCode::OK, "")
        }

        async fn probe(&self, locator: &Url) -> Result<bool, BucketClientError> {
            Ok(self.blobs.lock().contains_key(locator.as_str()))
        }

        async fn remove(&self, locator: &Url) -> OperationResult {
            match self.blobs.lock().remove(locator.as_str()) {
                Some(_) => OperationResult::success(StatusCode::NO_CONTENT, ""),
                None => OperationResult::from_status(
                    self.missing_delete,
                    StatusCode::NO_CONTENT,
                    "NoSuchKey",
                ),
            }
        }

        async fn fetch(&self, locator: &Url) -> Result<Bytes, BucketClientError> {
            self.stored(locator).ok_or_else(|| {
                PreconditionError::NotFound {
                    locator: locator.to_string(),
                }
                .into()
            })
        }

        async fn after_write(&self, _locator: &Url) -> Option<OperationResult> {
            self.follow_up.clone()
        }
    }

    fn locator() -> Url {
        Url::parse("https://storage.test/demo/a.bin").unwrap()
    }

    #[tokio::test]
    async fn test_create_twice_fails_without_write() {
        let store = MapStore::new();
        let url = locator();

        let first = store.create_blob(Bytes::from_static(b"P"), &url).await;
        assert!(first.is_success());
        assert_eq!(first.locator(), Some(&url));

        let second = store.create_blob(Bytes::from_static(b"Q"), &url).await;
        assert!(!second.is_success());
        assert_eq!(second.status(), Some(StatusCode::BAD_REQUEST));
        assert!(second.message().contains("already exists"));
        assert_eq!(store.stored(&url).unwrap(), Bytes::from_static(b"P"));
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_update_absent_fails() {
        let store = MapStore::new();

        let result = store.update_blob(Bytes::from_static(b"Q"), &locator()).await;
        assert!(!result.is_success());
        assert_eq!(result.status(), Some(StatusCode::NOT_FOUND));
        assert!(result.message().contains("does not exist"));
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_update_existing_overwrites() {
        let store = MapStore::new();
        let url = locator();
        store.put_blob(Bytes::from_static(b"P"), &url).await;

        assert!(store.update_blob(Bytes::from_static(b"Q"), &url).await.is_success());
        assert_eq!(store.get_blob(&url).await.unwrap(), Bytes::from_static(b"Q"));
    }

    #[tokio::test]
    async fn test_put_last_write_wins() {
        let store = MapStore::new();
        let url = locator();

        assert!(store.put_blob(Bytes::from_static(b"A"), &url).await.is_success());
        assert!(store.put_blob(Bytes::from_static(b"B"), &url).await.is_success());
        assert!(store.put_blob(Bytes::from_static(b"B"), &url).await.is_success());
        assert_eq!(store.stored(&url).unwrap(), Bytes::from_static(b"B"));
    }

    #[tokio::test]
    async fn test_failed_follow_up_fails_put() {
        let mut store = MapStore::new();
        store.follow_up = Some(OperationResult::failure(Some(StatusCode::FORBIDDEN), "denied"));
        let url = locator();

        let result = store.put_blob(Bytes::from_static(b"A"), &url).await;
        assert!(!result.is_success());
        assert_eq!(result.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(result.locator(), Some(&url));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MapStore::new();
        let url = locator();
        store.put_blob(Bytes::from_static(b"A"), &url).await;

        assert!(store.delete_blob(&url).await.is_success());
        assert!(!store.exist_blob(&url).await.unwrap());

        let again = store.delete_blob(&url).await;
        assert!(again.is_success());
        assert_eq!(again.status(), Some(StatusCode::NO_CONTENT));
    }

    #[tokio::test]
    async fn test_delete_absent_normalizes_backend_errors() {
        for status in [StatusCode::NOT_FOUND, StatusCode::BAD_REQUEST, StatusCode::OK] {
            let mut store = MapStore::new();
            store.missing_delete = status;

            let result = store.delete_blob(&locator()).await;
            assert!(result.is_success(), "status {}", status);
            assert_eq!(result.status(), Some(StatusCode::NO_CONTENT));
        }
    }

    #[tokio::test]
    async fn test_delete_failure_of_present_blob_is_reported() {
        struct StuckStore(MapStore);

        #[async_trait]
        impl BlobStore for StuckStore {
            async fn raw_put(&self, payload: Bytes, locator: &Url) -> OperationResult {
                self.0.raw_put(payload, locator).await
            }
            async fn probe(&self, locator: &Url) -> Result<bool, BucketClientError> {
                self.0.probe(locator).await
            }
            async fn remove(&self, _locator: &Url) -> OperationResult {
                OperationResult::failure(Some(StatusCode::FORBIDDEN), "AccessDenied")
            }
            async fn fetch(&self, locator: &Url) -> Result<Bytes, BucketClientError> {
                self.0.fetch(locator).await
            }
        }

        let store = StuckStore(MapStore::new());
        let url = locator();
        store.put_blob(Bytes::from_static(b"A"), &url).await;

        let result = store.delete_blob(&url).await;
        assert!(!result.is_success());
        assert_eq!(result.status(), Some(StatusCode::FORBIDDEN));
        assert!(store.exist_blob(&url).await.unwrap());
    }
}
