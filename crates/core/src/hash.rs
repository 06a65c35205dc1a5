//! Content hash types for blobs and streams.
//!
//! Hashes are carried as lowercase hex strings. The store never interprets the
//! digest bytes, it only needs a stable textual key, so any non-empty even-length
//! hex string is accepted. Uppercase input is normalized on parse.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha384};
use std::fmt;
use std::str::FromStr;

fn normalize_hex(s: &str) -> crate::Result<String> {
    if s.is_empty() {
        return Err(crate::Error::InvalidHash("hash is empty".to_string()));
    }
    if s.len() % 2 != 0 {
        return Err(crate::Error::InvalidHash(format!(
            "odd number of hex chars: {}",
            s.len()
        )));
    }
    if let Some(bad) = s.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(crate::Error::InvalidHash(format!(
            "invalid hex character {bad:?} in {s}"
        )));
    }
    Ok(s.to_ascii_lowercase())
}

/// Hash of a single blob (content-addressed chunk).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobHash(String);

impl BlobHash {
    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        normalize_hex(s).map(Self)
    }

    /// Compute the SHA-384 hash of blob data.
    pub fn compute(data: &[u8]) -> Self {
        let digest = Sha384::digest(data);
        Self(digest.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Borrow as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.len().min(16);
        write!(f, "BlobHash({})", &self.0[..end])
    }
}

impl fmt::Display for BlobHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BlobHash {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for BlobHash {
    type Error = crate::Error;

    fn try_from(s: String) -> crate::Result<Self> {
        Self::from_hex(&s)
    }
}

impl From<BlobHash> for String {
    fn from(hash: BlobHash) -> Self {
        hash.0
    }
}

impl AsRef<str> for BlobHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Hash identifying a stream (one published file).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamHash(String);

impl StreamHash {
    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        normalize_hex(s).map(Self)
    }

    /// Borrow as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StreamHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.len().min(16);
        write!(f, "StreamHash({})", &self.0[..end])
    }
}

impl fmt::Display for StreamHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StreamHash {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for StreamHash {
    type Error = crate::Error;

    fn try_from(s: String) -> crate::Result<Self> {
        Self::from_hex(&s)
    }
}

impl From<StreamHash> for String {
    fn from(hash: StreamHash) -> Self {
        hash.0
    }
}

impl AsRef<str> for StreamHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_hash_compute_is_sha384_hex() {
        let hash = BlobHash::compute(b"hello world");
        assert_eq!(hash.as_str().len(), 96);
        assert_eq!(hash, BlobHash::from_hex(hash.as_str()).unwrap());
    }

    #[test]
    fn test_hash_rejects_empty_and_non_hex() {
        assert!(BlobHash::from_hex("").is_err());
        assert!(BlobHash::from_hex("abc").is_err());
        assert!(StreamHash::from_hex("zz").is_err());
    }

    #[test]
    fn test_hash_normalizes_case() {
        let hash = StreamHash::from_hex("ABCD").unwrap();
        assert_eq!(hash.as_str(), "abcd");
    }

    #[test]
    fn test_hash_serde_validates() {
        let hash: BlobHash = serde_json::from_str("\"aabb\"").unwrap();
        assert_eq!(hash.as_str(), "aabb");
        assert!(serde_json::from_str::<BlobHash>("\"\"").is_err());
    }
}
