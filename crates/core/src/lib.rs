//! Core domain types for the larder metadata store.
//!
//! This crate defines the canonical data model shared by the store and its
//! callers:
//! - Blob and stream hashes
//! - Stream pieces and the end-of-stream terminator
//! - Stream download status
//! - Claim identity, outpoints and the claim lifecycle
//! - Claim metadata payloads
//! - Store configuration

pub mod blob;
pub mod claim;
pub mod config;
pub mod error;
pub mod hash;
pub mod metadata;
pub mod stream;

pub use blob::{BlobInfo, TransferDirection};
pub use claim::{ClaimId, ClaimStatus, Outpoint};
pub use config::{LarderConfig, RetryConfig, StoreConfig};
pub use error::{Error, Result};
pub use hash::{BlobHash, StreamHash};
pub use metadata::ClaimMetadata;
pub use stream::StreamStatus;
