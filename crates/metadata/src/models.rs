//! Database models mapping to the metadata schema.
//!
//! Timestamps are persisted as UTC unix seconds.

use crate::error::{MetadataError, MetadataResult};
use larder_core::{BlobHash, ClaimId, ClaimStatus, StreamHash, StreamStatus, TransferDirection};
use sqlx::FromRow;
use std::fmt;
use time::OffsetDateTime;

/// Surrogate identity of a registered blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobId(pub i64);

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Surrogate identity of a stream (file) row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub i64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) fn to_unix(ts: OffsetDateTime) -> i64 {
    ts.unix_timestamp()
}

pub(crate) fn from_unix(secs: i64) -> MetadataResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| MetadataError::Corrupt(format!("timestamp {secs}: {e}")))
}

fn opt_from_unix(secs: Option<i64>) -> MetadataResult<Option<OffsetDateTime>> {
    secs.map(from_unix).transpose()
}

fn corrupt(e: larder_core::Error) -> MetadataError {
    MetadataError::Corrupt(e.to_string())
}

// =============================================================================
// Blobs
// =============================================================================

/// A blob joined with its managed state.
#[derive(Debug, Clone, FromRow)]
pub struct ManagedBlobRow {
    pub blob_id: i64,
    pub blob_hash: String,
    pub file_id: Option<i64>,
    pub stream_position: Option<i64>,
    pub iv: Option<String>,
    pub blob_length: Option<i64>,
    pub verified_at: Option<i64>,
    pub announced_at: Option<i64>,
    pub next_announce_at: Option<i64>,
}

impl ManagedBlobRow {
    pub fn id(&self) -> BlobId {
        BlobId(self.blob_id)
    }

    pub fn hash(&self) -> MetadataResult<BlobHash> {
        BlobHash::from_hex(&self.blob_hash).map_err(corrupt)
    }

    pub fn verified_at(&self) -> MetadataResult<Option<OffsetDateTime>> {
        opt_from_unix(self.verified_at)
    }

    pub fn announced_at(&self) -> MetadataResult<Option<OffsetDateTime>> {
        opt_from_unix(self.announced_at)
    }

    pub fn next_announce_at(&self) -> MetadataResult<Option<OffsetDateTime>> {
        opt_from_unix(self.next_announce_at)
    }
}

/// Append-only record of a blob exchanged with a peer.
#[derive(Debug, Clone, FromRow)]
pub struct TransferRow {
    pub id: i64,
    pub blob_id: i64,
    pub peer: String,
    pub downloaded: bool,
    pub rate: f64,
    pub transferred_at: i64,
}

impl TransferRow {
    pub fn direction(&self) -> TransferDirection {
        TransferDirection::from_downloaded(self.downloaded)
    }

    pub fn transferred_at(&self) -> MetadataResult<OffsetDateTime> {
        from_unix(self.transferred_at)
    }
}

// =============================================================================
// Streams
// =============================================================================

/// Stream (file) record.
#[derive(Debug, Clone, FromRow)]
pub struct FileRow {
    pub id: i64,
    pub status: String,
    pub blob_data_rate: Option<f64>,
    pub stream_hash: Option<String>,
    pub sd_blob_id: Option<i64>,
    pub decryption_key: Option<String>,
    pub file_name: Option<String>,
    pub suggested_file_name: Option<String>,
    pub claim_row_id: Option<i64>,
}

impl FileRow {
    pub fn id(&self) -> StreamId {
        StreamId(self.id)
    }

    pub fn status(&self) -> MetadataResult<StreamStatus> {
        self.status.parse().map_err(corrupt)
    }

    pub fn stream_hash(&self) -> MetadataResult<Option<StreamHash>> {
        self.stream_hash
            .as_deref()
            .map(StreamHash::from_hex)
            .transpose()
            .map_err(corrupt)
    }

    /// Payment rate, 0.0 when never set.
    pub fn rate(&self) -> f64 {
        self.blob_data_rate.unwrap_or(0.0)
    }
}

/// Descriptive fields recorded when a stream is created.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct StreamInfo {
    pub decryption_key: Option<String>,
    pub file_name: Option<String>,
    pub suggested_file_name: Option<String>,
}

/// End-of-stream marker.
#[derive(Debug, Clone, FromRow)]
pub struct StreamTerminatorRow {
    pub id: i64,
    pub blob_count: i64,
    pub iv: Option<String>,
}

// =============================================================================
// Claims
// =============================================================================

/// On-chain claim record.
#[derive(Debug, Clone, FromRow)]
pub struct ClaimRow {
    pub id: i64,
    pub name: String,
    pub status: String,
    pub txid: String,
    pub nout: i64,
    pub claim_transaction_id: Option<String>,
    pub claim_hash: String,
    pub sd_blob_id: Option<i64>,
    pub is_mine: bool,
}

impl ClaimRow {
    pub fn claim_id(&self) -> MetadataResult<ClaimId> {
        ClaimId::parse(&self.claim_hash).map_err(corrupt)
    }

    pub fn status(&self) -> MetadataResult<ClaimStatus> {
        self.status.parse().map_err(corrupt)
    }
}

/// Currently accepted claim for a name.
#[derive(Debug, Clone, FromRow)]
pub struct WinningClaimRow {
    pub id: i64,
    pub name: String,
    pub claim_row_id: i64,
    pub last_checked: Option<i64>,
}

impl WinningClaimRow {
    pub fn last_checked(&self) -> MetadataResult<Option<OffsetDateTime>> {
        opt_from_unix(self.last_checked)
    }
}
