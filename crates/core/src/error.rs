//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid outpoint: {0}")]
    InvalidOutpoint(String),

    #[error("unknown stream status: {0}")]
    UnknownStreamStatus(String),

    #[error("unknown claim status: {0}")]
    UnknownClaimStatus(String),

    #[error("malformed claim metadata: {0}")]
    MalformedMetadata(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
