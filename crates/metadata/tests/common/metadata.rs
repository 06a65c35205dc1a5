//! Metadata store test utilities.

use larder_core::{RetryConfig, StoreConfig};
use larder_metadata::{MetadataResult, MetadataStore, SqliteStore};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A test metadata store wrapper that cleans up on drop.
#[allow(dead_code)]
pub struct TestMetadata {
    pub store: Arc<dyn MetadataStore>,
    pub(crate) sqlite_store: Arc<SqliteStore>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestMetadata {
    /// Create a new test metadata store backed by a file in a temp directory.
    pub async fn new() -> MetadataResult<Self> {
        Self::with_retry(&RetryConfig::default()).await
    }

    /// File-backed store with the given retry policy and no driver busy wait.
    pub async fn with_retry(retry: &RetryConfig) -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let config = StoreConfig::Sqlite {
            path: temp_dir.path().join("nested").join("test.db"),
            max_connections: 4,
            busy_timeout_ms: 0,
        };
        let store = Arc::new(SqliteStore::open(&config, retry).await?);

        Ok(Self {
            store: store.clone(),
            sqlite_store: store,
            _temp_dir: temp_dir,
        })
    }

    /// Create a new in-memory SQLite store (faster for tests).
    pub async fn in_memory() -> MetadataResult<Self> {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let store = Arc::new(SqliteStore::in_memory().await?);

        Ok(Self {
            store: store.clone(),
            sqlite_store: store,
            _temp_dir: temp_dir,
        })
    }

    /// Get a reference to the metadata store.
    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }

    /// Get a reference to the SQLite connection pool for raw queries.
    pub fn pool(&self) -> &Pool<Sqlite> {
        self.sqlite_store.pool()
    }

    /// Scratch directory that lives as long as the store.
    pub fn dir(&self) -> PathBuf {
        self._temp_dir.path().to_path_buf()
    }

    /// Path of the database file for file-backed stores.
    pub fn db_path(&self) -> PathBuf {
        self._temp_dir.path().join("nested").join("test.db")
    }

    /// Count rows of a table.
    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(self.pool())
            .await
            .expect("count query")
    }
}
