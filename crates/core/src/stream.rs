//! Stream (file) download status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Download status of a stream.
///
/// Advisory only: the store accepts any change between these values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    /// Known but not started.
    Pending,
    /// Download in progress.
    Running,
    /// Download stopped by the user.
    Stopped,
    /// All pieces are present.
    Finished,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "finished" => Ok(Self::Finished),
            other => Err(crate::Error::UnknownStreamStatus(other.to_string())),
        }
    }
}
