//! Store configuration.

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "LARDER_";

/// Backing store configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// SQLite database file.
    Sqlite {
        /// Database file path. Parent directories are created on open.
        path: PathBuf,
        /// Maximum pooled connections. Writes are serialized regardless.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// How long SQLite itself waits on a locked database before reporting busy.
        #[serde(default = "default_busy_timeout_ms")]
        busy_timeout_ms: u64,
    },
    /// Ephemeral in-memory database, discarded when the store is dropped.
    Memory,
}

fn default_max_connections() -> u32 {
    4
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/larder.sqlite"),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StoreConfig {
    /// Configuration for a SQLite file at `path` with default tuning.
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self::Sqlite {
            path: path.into(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match self {
            StoreConfig::Sqlite {
                path,
                max_connections,
                ..
            } => {
                if path.as_os_str().is_empty() {
                    return Err("store.path must not be empty".to_string());
                }
                if *max_connections == 0 {
                    return Err("store.max_connections must be at least 1".to_string());
                }
                Ok(())
            }
            StoreConfig::Memory => Ok(()),
        }
    }
}

/// Retry policy for writes that hit a locked database.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Upper bound on a single backoff delay.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    50
}

fn default_max_backoff_ms() -> u64 {
    2000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RetryConfig {
    /// Backoff to wait after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let delay = self.initial_backoff_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(format!(
                "retry.initial_backoff_ms {} exceeds retry.max_backoff_ms {}",
                self.initial_backoff_ms, self.max_backoff_ms
            ));
        }
        Ok(())
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct LarderConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl LarderConfig {
    /// In-memory store with the default retry policy.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            store: StoreConfig::Memory,
            retry: RetryConfig::default(),
        }
    }

    /// Load from an optional TOML file, overridden by `LARDER_*` environment
    /// variables (`LARDER_STORE__PATH=/var/lib/larder.sqlite`).
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate().map_err(crate::Error::Config)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.store.validate()?;
        self.retry.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_backoff_doubles_and_caps() {
        let retry = RetryConfig {
            max_attempts: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 500,
        };
        assert_eq!(retry.backoff(1), Duration::from_millis(100));
        assert_eq!(retry.backoff(2), Duration::from_millis(200));
        assert_eq!(retry.backoff(3), Duration::from_millis(400));
        assert_eq!(retry.backoff(4), Duration::from_millis(500));
        assert_eq!(retry.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let retry = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert!(retry.validate().is_err());
        assert!(RetryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_store_config_deserialize_defaults() {
        let json = r#"{"type": "sqlite", "path": "/tmp/larder.sqlite"}"#;
        let config: StoreConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config, StoreConfig::sqlite("/tmp/larder.sqlite"));

        let memory: StoreConfig = serde_json::from_str(r#"{"type": "memory"}"#).unwrap();
        assert_eq!(memory, StoreConfig::Memory);
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("larder.toml");
        std::fs::write(
            &path,
            r#"
[store]
type = "sqlite"
path = "/var/lib/larder/larder.sqlite"
busy_timeout_ms = 250

[retry]
max_attempts = 3
"#,
        )
        .unwrap();

        let config = LarderConfig::load(Some(&path)).unwrap();
        assert_eq!(
            config.store,
            StoreConfig::Sqlite {
                path: PathBuf::from("/var/lib/larder/larder.sqlite"),
                max_connections: 4,
                busy_timeout_ms: 250,
            }
        );
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff_ms, 50);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("larder.toml");
        std::fs::write(&path, "[retry]\nmax_attempts = 0\n").unwrap();

        assert!(matches!(
            LarderConfig::load(Some(&path)),
            Err(crate::Error::Config(_))
        ));
    }
}
