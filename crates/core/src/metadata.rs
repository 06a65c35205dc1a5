//! Claim metadata payloads.

use crate::hash::BlobHash;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata published with a claim.
///
/// The payload is schemaless JSON; the only field the store depends on is the
/// stream descriptor hash at `sources.lbry_sd_hash`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimMetadata(Value);

impl ClaimMetadata {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Parse from JSON text.
    pub fn from_json(s: &str) -> crate::Result<Self> {
        serde_json::from_str(s)
            .map(Self)
            .map_err(|e| crate::Error::MalformedMetadata(e.to_string()))
    }

    /// Extract the stream descriptor hash.
    pub fn descriptor_hash(&self) -> crate::Result<BlobHash> {
        let raw = self
            .0
            .get("sources")
            .and_then(|sources| sources.get("lbry_sd_hash"))
            .ok_or_else(|| {
                crate::Error::MalformedMetadata("missing sources.lbry_sd_hash".to_string())
            })?;
        let hex = raw.as_str().ok_or_else(|| {
            crate::Error::MalformedMetadata("sources.lbry_sd_hash is not a string".to_string())
        })?;
        BlobHash::from_hex(hex).map_err(|e| crate::Error::MalformedMetadata(e.to_string()))
    }

    /// Encode for storage.
    pub fn encode(&self) -> crate::Result<String> {
        serde_json::to_string(&self.0).map_err(|e| crate::Error::MalformedMetadata(e.to_string()))
    }

    /// Decode a stored payload.
    pub fn decode(encoded: &str) -> crate::Result<Self> {
        Self::from_json(encoded)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for ClaimMetadata {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
