//! Announce scheduling and blob verification.

use crate::error::MetadataResult;
use crate::models::TransferRow;
use async_trait::async_trait;
use larder_core::{BlobHash, TransferDirection};
use std::path::Path;
use time::OffsetDateTime;

/// Repository for blob completion, announce deadlines and transfer history.
///
/// The store owns no timer: the announcer polls `due_for_announce` on its own
/// schedule and calls `reschedule` after each round.
#[async_trait]
pub trait AnnounceRepo: Send + Sync {
    /// Record a fully received blob: set its length and next announce
    /// deadline, then stamp it verified now.
    async fn mark_completed(
        &self,
        hash: &BlobHash,
        length: u64,
        next_announce_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Hashes whose announce deadline is strictly before `now`.
    async fn due_for_announce(&self, now: OffsetDateTime) -> MetadataResult<Vec<BlobHash>>;

    /// Set the next announce deadline of each hash and stamp it announced now.
    ///
    /// Unknown hashes are skipped.
    async fn reschedule(
        &self,
        hashes: &[BlobHash],
        next_announce_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Re-verify every known blob and return the verified hashes.
    ///
    /// With a blob directory, a blob counts as verified only when a file named
    /// after its hash exists there. Without one every known blob is verified.
    async fn verify_on_disk(&self, blob_dir: Option<&Path>) -> MetadataResult<Vec<BlobHash>>;

    /// Append a transfer record stamped now.
    async fn log_transfer(
        &self,
        hash: &BlobHash,
        peer: &str,
        rate: f64,
        direction: TransferDirection,
    ) -> MetadataResult<()>;

    /// Transfer records of a blob, newest first.
    async fn transfer_history(&self, hash: &BlobHash) -> MetadataResult<Vec<TransferRow>>;

    /// Delete a blob with its managed state, history and any metadata that
    /// names it as descriptor.
    async fn delete_blob(&self, hash: &BlobHash) -> MetadataResult<()>;
}
