//! Claim lifecycle.

use crate::error::MetadataResult;
use crate::models::{ClaimRow, StreamId};
use async_trait::async_trait;
use larder_core::{BlobHash, ClaimId, ClaimMetadata, ClaimStatus, Outpoint};
use time::OffsetDateTime;

/// Repository for on-chain claims, winning claims and claim metadata.
#[async_trait]
pub trait ClaimRepo: Send + Sync {
    /// Record a claim seen on-chain in `INIT` status. No-op for a known claim.
    async fn observe_claim(
        &self,
        name: &str,
        outpoint: &Outpoint,
        is_local: bool,
    ) -> MetadataResult<ClaimId>;

    /// Attach metadata to a claim in `INIT` status and return the new status.
    ///
    /// On success the descriptor blob is registered and linked, the payload is
    /// stored and the claim moves to `PENDING`. A payload that cannot be
    /// processed moves the claim to `INVALID_METADATA` instead; that failure is
    /// logged, not returned. A claim that already left `INIT` is returned
    /// unchanged. Fails only with `UnknownClaim` or a database error.
    async fn attach_metadata(
        &self,
        claim_id: &ClaimId,
        metadata: &ClaimMetadata,
    ) -> MetadataResult<ClaimStatus>;

    /// Observe a claim, then attach metadata while it is still `INIT`.
    async fn save_name_metadata(
        &self,
        name: &str,
        outpoint: &Outpoint,
        metadata: &ClaimMetadata,
        is_local: bool,
    ) -> MetadataResult<ClaimStatus>;

    /// Make the claim at `outpoint` the winner for `name`.
    ///
    /// Runs three independently committed steps: point the winning record at
    /// the claim, demote every other `ACTIVE` claim for the name to
    /// `INACTIVE`, promote the claim to `ACTIVE`. The sequence is not atomic;
    /// every step is idempotent, so re-running it after a failure converges.
    async fn elect_winner(&self, name: &str, outpoint: &Outpoint) -> MetadataResult<()>;

    /// Set a claim's status, enforcing the lifecycle.
    async fn update_claim_status(
        &self,
        claim_id: &ClaimId,
        status: ClaimStatus,
    ) -> MetadataResult<()>;

    async fn get_claim(&self, claim_id: &ClaimId) -> MetadataResult<Option<ClaimRow>>;

    async fn claim_status(&self, claim_id: &ClaimId) -> MetadataResult<Option<ClaimStatus>>;

    async fn claim_metadata(&self, claim_id: &ClaimId) -> MetadataResult<Option<ClaimMetadata>>;

    async fn claim_name(&self, claim_id: &ClaimId) -> MetadataResult<Option<String>>;

    /// Claim currently winning `name`.
    async fn winning_claim(&self, name: &str) -> MetadataResult<Option<ClaimId>>;

    /// Metadata of the claim currently winning `name`.
    async fn winning_metadata(&self, name: &str) -> MetadataResult<Option<ClaimMetadata>>;

    /// When the winner for `name` was last elected.
    async fn last_checked(&self, name: &str) -> MetadataResult<Option<OffsetDateTime>>;

    /// Status of the claim a stream is linked to.
    async fn stream_claim_status(&self, id: StreamId) -> MetadataResult<Option<ClaimStatus>>;

    /// Identity of the claim a stream is linked to.
    async fn stream_claim_id(&self, id: StreamId) -> MetadataResult<Option<ClaimId>>;

    /// Name of the claim a stream is linked to.
    async fn stream_claim_name(&self, id: StreamId) -> MetadataResult<Option<String>>;

    /// Record the claim transaction id for the claim at `outpoint`.
    async fn set_claim_tx_id(&self, outpoint: &Outpoint, claim_tx_id: &str) -> MetadataResult<()>;

    async fn claim_tx_id(&self, outpoint: &Outpoint) -> MetadataResult<Option<String>>;

    /// Metadata of the first claim whose descriptor is `sd_hash`.
    async fn claim_metadata_for_descriptor(
        &self,
        sd_hash: &BlobHash,
    ) -> MetadataResult<Option<ClaimMetadata>>;

    /// Delete claims with an empty or over-long txid. Returns the number deleted.
    async fn clean_bad_records(&self) -> MetadataResult<u64>;
}
