//! Storage endpoint trait

use crate::model::Fingerprint;
use crate::Result;
use bytes::Bytes;

/// Trait for the key-value backend that holds node encodings
///
/// All implementations must be `Send + Sync` for use across async tasks. The
/// store never inspects backend internals; any backend honoring these two
/// operations is interchangeable.
#[async_trait::async_trait]
pub trait StorageEndpoint: Send + Sync {
    /// Store a payload under its fingerprint
    ///
    /// Content-addressed writes are idempotent: writing the same fingerprint
    /// twice must leave the same payload.
    async fn put(&self, fingerprint: Fingerprint, data: Bytes) -> Result<()>;

    /// Retrieve a payload by fingerprint. Returns `None` if not found.
    async fn get(&self, fingerprint: Fingerprint) -> Result<Option<Bytes>>;
}
