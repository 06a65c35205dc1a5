//! Stream index.

use crate::error::MetadataResult;
use crate::models::{StreamId, StreamInfo};
use async_trait::async_trait;
use larder_core::{BlobHash, BlobInfo, ClaimId, StreamHash};

/// Repository mapping streams to their ordered blob pieces.
#[async_trait]
pub trait StreamRepo: Send + Sync {
    /// Create a stream in `pending` status.
    ///
    /// Fails with `AlreadyExists` if the stream hash is taken; the existing
    /// row is left untouched.
    async fn create_stream(
        &self,
        stream_hash: &StreamHash,
        file_name: &str,
        decryption_key: &str,
        suggested_file_name: &str,
    ) -> MetadataResult<StreamId>;

    /// Attach pieces to a stream.
    ///
    /// Data pieces are registered and placed at their position. The terminator
    /// piece is stored once per stream; later terminators are ignored. Each
    /// piece is written independently, so re-running after a partial failure
    /// completes the stream.
    async fn append_pieces(&self, stream_hash: &StreamHash, pieces: &[BlobInfo])
    -> MetadataResult<()>;

    /// Rebuild the ordered piece list, terminator last.
    ///
    /// Pieces are read from position 0 upward and the walk stops at the first
    /// missing position, so a gap truncates the result.
    async fn reconstruct(&self, stream_hash: &StreamHash) -> MetadataResult<Vec<BlobInfo>>;

    /// Number of positioned pieces owned by the stream (terminator excluded).
    async fn piece_count(&self, stream_hash: &StreamHash) -> MetadataResult<u64>;

    /// Check if a stream exists.
    async fn stream_exists(&self, stream_hash: &StreamHash) -> MetadataResult<bool>;

    /// Look up the identity of a stream.
    async fn stream_id(&self, stream_hash: &StreamHash) -> MetadataResult<Option<StreamId>>;

    /// Get the key and file names of a stream. Fails with `NotFound` if unknown.
    async fn stream_info(&self, stream_hash: &StreamHash) -> MetadataResult<StreamInfo>;

    /// List all known stream hashes.
    async fn list_streams(&self) -> MetadataResult<Vec<StreamHash>>;

    /// Delete a stream. Its pieces stay registered but become unowned.
    async fn delete_stream(&self, stream_hash: &StreamHash) -> MetadataResult<()>;

    /// Find the stream that owns a blob.
    async fn stream_of_blob(&self, blob_hash: &BlobHash) -> MetadataResult<Option<StreamHash>>;

    /// Position of a blob within a stream.
    async fn blob_position(
        &self,
        stream_hash: &StreamHash,
        blob_hash: &BlobHash,
    ) -> MetadataResult<Option<u32>>;

    /// Link the stream descriptor blob to a stream.
    async fn set_descriptor(
        &self,
        stream_hash: &StreamHash,
        sd_hash: &BlobHash,
    ) -> MetadataResult<()>;

    /// Get the descriptor blob hash of a stream.
    async fn descriptor_for_stream(
        &self,
        stream_hash: &StreamHash,
    ) -> MetadataResult<Option<BlobHash>>;

    /// Find the stream described by a descriptor blob.
    async fn stream_for_descriptor(&self, sd_hash: &BlobHash)
    -> MetadataResult<Option<StreamHash>>;

    /// Link a stream to the claim it was published or downloaded under.
    async fn link_claim(&self, stream_hash: &StreamHash, claim_id: &ClaimId)
    -> MetadataResult<()>;
}
