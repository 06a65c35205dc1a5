//! Blob pieces and transfer direction.

use crate::hash::BlobHash;
use serde::{Deserialize, Serialize};

/// One entry of a stream's ordered piece list.
///
/// A piece with no hash and zero length is the stream terminator: it carries
/// the total piece count in `position` and the final IV.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    /// Blob hash, `None` only for the terminator.
    pub hash: Option<BlobHash>,
    /// Position in the stream (0-indexed).
    pub position: u32,
    /// Initialization vector used to encrypt this piece.
    pub iv: String,
    /// Length of the encrypted piece in bytes.
    pub length: u64,
}

impl BlobInfo {
    /// Create a regular data piece.
    pub fn new(hash: BlobHash, position: u32, iv: impl Into<String>, length: u64) -> Self {
        Self {
            hash: Some(hash),
            position,
            iv: iv.into(),
            length,
        }
    }

    /// Create the end-of-stream terminator.
    pub fn terminator(piece_count: u32, iv: impl Into<String>) -> Self {
        Self {
            hash: None,
            position: piece_count,
            iv: iv.into(),
            length: 0,
        }
    }

    /// Check if this piece is the end-of-stream terminator.
    pub fn is_terminator(&self) -> bool {
        self.hash.is_none() && self.length == 0
    }
}

/// Direction of a recorded blob transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferDirection {
    /// Blob was received from the peer.
    Download,
    /// Blob was served to the peer.
    Upload,
}

impl TransferDirection {
    /// Whether the transfer was a download, as persisted.
    pub fn is_download(&self) -> bool {
        matches!(self, Self::Download)
    }

    /// Rebuild from the persisted flag.
    pub fn from_downloaded(downloaded: bool) -> Self {
        if downloaded {
            Self::Download
        } else {
            Self::Upload
        }
    }
}
