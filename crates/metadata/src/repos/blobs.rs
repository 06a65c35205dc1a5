//! Blob registry.

use crate::error::MetadataResult;
use crate::models::{BlobId, ManagedBlobRow};
use async_trait::async_trait;
use larder_core::BlobHash;

/// Repository for content-addressed blob identities.
#[async_trait]
pub trait BlobRepo: Send + Sync {
    /// Get the identity of `hash`, registering it first if unseen.
    ///
    /// Registration inserts the blob row and an empty managed-blob row. Repeated
    /// and concurrent calls for the same hash return the same identity.
    async fn register_blob(&self, hash: &BlobHash) -> MetadataResult<BlobId>;

    /// Look up the identity of a registered hash without registering it.
    async fn blob_id(&self, hash: &BlobHash) -> MetadataResult<Option<BlobId>>;

    /// Check if a hash is registered.
    async fn blob_exists(&self, hash: &BlobHash) -> MetadataResult<bool>;

    /// Get a blob with its stream placement, verification and announce state.
    async fn get_blob(&self, hash: &BlobHash) -> MetadataResult<Option<ManagedBlobRow>>;

    /// Number of registered blobs.
    async fn blob_count(&self) -> MetadataResult<u64>;
}
