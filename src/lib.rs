//! Bucket Client
//!
//! Signed client for S3-compatible object storage (Amazon S3 and
//! DigitalOcean Spaces) with access-policy propagation that tolerates
//! eventual consistency.
//!
//! # Features
//!
//! - **Signature V4**: canonical request, scoped signing key, authorization header
//! - **Read policy propagation**: bucket ACL/policy and CORS applied concurrently,
//!   then a sequential per-object ACL fan-out, with bounded retry on 409 Conflict
//! - **Existence-gated blob operations**: create, update, put and idempotent delete
//!   over a single unconditional write
//! - **Cancellation**: a caller token aborts in-flight requests and retry loops
//! - **S3-Compatible**: any path-style endpoint via an endpoint override
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use bucket_client::{AccessPolicy, Bucket, BucketOperations};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), bucket_client::BucketClientError> {
//!     let client = bucket_client::create_client_from_env()?;
//!
//!     client.create_bucket("demo").await;
//!     client.set_read_policy("demo", AccessPolicy::Public).await;
//!
//!     let bucket = Bucket::unchecked(client, "demo");
//!     let result = bucket.create_blob("a.bin", b"hello".to_vec()).await;
//!     println!("{} -> {:?}", result, result.locator());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod bucket;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod mocks;
pub mod policy;
pub mod providers;
pub mod signing;
pub mod transport;
pub mod types;
pub mod xml;

// Re-export main types at crate root
pub use bucket::Bucket;
pub use client::{BlobOperations, BucketClient, BucketOperations, ClientBuilder};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use credentials::{CloudCredential, Credential};
pub use error::{
    BucketClientError, ConfigurationError, ParseError, PreconditionError, SigningError,
    TransportError,
};
pub use gate::BlobStore;
pub use providers::{AwsBucketClient, SpacesBucketClient};
pub use signing::{RequestSigner, SignableRequest, SignerV4};
pub use tokio_util::sync::CancellationToken;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use types::{AccessPolicy, OperationResult};

/// Create a client from environment variables.
///
/// This reads:
/// - `BUCKET_CLIENT_PROVIDER` (`aws` or `digitalocean`) for the backend
/// - `AWS_ACCESS_KEY_ID` and `AWS_SECRET_ACCESS_KEY` for credentials
/// - `AWS_REGION` / `AWS_DEFAULT_REGION` for region
/// - `BUCKET_CLIENT_ENDPOINT` for an S3-compatible endpoint override
///
/// # Example
///
/// ```rust,no_run
/// let client = bucket_client::create_client_from_env()?;
/// # Ok::<(), bucket_client::BucketClientError>(())
/// ```
pub fn create_client_from_env() -> Result<std::sync::Arc<dyn BucketClient>> {
    ClientBuilder::new().from_env().build()
}

/// Create a client with explicit configuration.
///
/// # Example
///
/// ```rust,no_run
/// use bucket_client::{ClientConfig, CloudCredential, Credential};
///
/// let credential = Credential::new("AKID", "SECRET", "nyc3")?;
/// let config = ClientConfig::builder()
///     .credential(CloudCredential::DigitalOcean(credential))
///     .build()?;
///
/// let client = bucket_client::create_client(config)?;
/// # Ok::<(), bucket_client::BucketClientError>(())
/// ```
pub fn create_client(config: ClientConfig) -> Result<std::sync::Arc<dyn BucketClient>> {
    ClientBuilder::new().config(config).build()
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, BucketClientError>;
