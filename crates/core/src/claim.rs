//! Claim identity and lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transaction output that carries a claim.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Outpoint {
    txid: String,
    nout: u32,
}

impl Outpoint {
    /// Create an outpoint, rejecting an empty txid.
    pub fn new(txid: impl Into<String>, nout: u32) -> crate::Result<Self> {
        let txid = txid.into();
        if txid.is_empty() {
            return Err(crate::Error::InvalidOutpoint("txid is empty".to_string()));
        }
        Ok(Self { txid, nout })
    }

    /// Parse the `txid:nout` form.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let (txid, nout) = s
            .rsplit_once(':')
            .ok_or_else(|| crate::Error::InvalidOutpoint(format!("missing ':' in {s}")))?;
        let nout = nout
            .parse::<u32>()
            .map_err(|e| crate::Error::InvalidOutpoint(format!("bad nout in {s}: {e}")))?;
        Self::new(txid, nout)
    }

    pub fn txid(&self) -> &str {
        &self.txid
    }

    pub fn nout(&self) -> u32 {
        self.nout
    }

    /// Derive the claim identity for this outpoint.
    pub fn claim_id(&self) -> ClaimId {
        ClaimId::derive(self)
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.nout)
    }
}

impl TryFrom<String> for Outpoint {
    type Error = crate::Error;

    fn try_from(s: String) -> crate::Result<Self> {
        Self::parse(&s)
    }
}

impl From<Outpoint> for String {
    fn from(outpoint: Outpoint) -> Self {
        outpoint.to_string()
    }
}

/// Identity of a claim, derived from its outpoint as `txid:nout`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClaimId {
    id: String,
    outpoint: Outpoint,
}

impl ClaimId {
    /// Derive the identity of the claim at `outpoint`.
    pub fn derive(outpoint: &Outpoint) -> Self {
        Self {
            id: outpoint.to_string(),
            outpoint: outpoint.clone(),
        }
    }

    /// Parse a previously derived identity.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Ok(Self::derive(&Outpoint::parse(s)?))
    }

    /// The outpoint this identity was derived from.
    pub fn outpoint(&self) -> &Outpoint {
        &self.outpoint
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClaimId({})", self.id)
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl TryFrom<String> for ClaimId {
    type Error = crate::Error;

    fn try_from(s: String) -> crate::Result<Self> {
        Self::parse(&s)
    }
}

impl From<ClaimId> for String {
    fn from(id: ClaimId) -> Self {
        id.id
    }
}

/// Claim lifecycle state.
///
/// ```text
/// INIT ──► PENDING ──► ACTIVE ◄──► INACTIVE
///   │                    ▲            ▲
///   ├────────────────────┴────────────┘
///   ├──► INVALID_METADATA
///   └──► MISSING_METADATA
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStatus {
    /// Seen on-chain, no metadata yet.
    Init,
    /// Metadata attached.
    Pending,
    /// Currently winning for its name.
    Active,
    /// Superseded by another claim for the same name.
    Inactive,
    /// Metadata could not be processed.
    InvalidMetadata,
    /// Metadata could not be obtained.
    MissingMetadata,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::InvalidMetadata => "INVALID_METADATA",
            Self::MissingMetadata => "MISSING_METADATA",
        }
    }

    /// Check if no transition leaves this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::InvalidMetadata | Self::MissingMetadata)
    }

    /// Check if the lifecycle permits moving from `self` to `next`.
    ///
    /// Staying in the same state is always permitted.
    pub fn can_transition_to(&self, next: ClaimStatus) -> bool {
        use ClaimStatus::*;
        if *self == next {
            return true;
        }
        match self {
            Init => matches!(
                next,
                Pending | InvalidMetadata | MissingMetadata | Active | Inactive
            ),
            Pending => matches!(next, Active | Inactive),
            Active => matches!(next, Inactive),
            Inactive => matches!(next, Active),
            InvalidMetadata | MissingMetadata => false,
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "INIT" => Ok(Self::Init),
            "PENDING" => Ok(Self::Pending),
            "ACTIVE" => Ok(Self::Active),
            "INACTIVE" => Ok(Self::Inactive),
            "INVALID_METADATA" => Ok(Self::InvalidMetadata),
            "MISSING_METADATA" => Ok(Self::MissingMetadata),
            other => Err(crate::Error::UnknownClaimStatus(other.to_string())),
        }
    }
}
