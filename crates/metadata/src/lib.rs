//! Persistent metadata store for larder.
//!
//! This crate provides the durable index behind a content-addressed blob
//! exchange:
//! - Blob registry and per-blob managed state
//! - Stream index (ordered pieces and terminators)
//! - File tracking (payment rate and download status)
//! - Announce scheduling, verification and transfer history
//! - Claim lifecycle, metadata and winning-claim election

pub mod error;
pub mod models;
pub mod repos;
pub mod retry;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::{BlobId, StreamId};
pub use store::{MetadataStore, SqliteStore};

use larder_core::LarderConfig;
use std::sync::Arc;

/// Create a metadata store from configuration.
pub async fn from_config(config: &LarderConfig) -> MetadataResult<Arc<dyn MetadataStore>> {
    let store = SqliteStore::open(&config.store, &config.retry).await?;
    Ok(Arc::new(store) as Arc<dyn MetadataStore>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::BlobRepo;
    use larder_core::BlobHash;

    #[tokio::test]
    async fn test_from_config_in_memory() {
        let store = from_config(&LarderConfig::for_testing()).await.unwrap();
        store.health_check().await.unwrap();

        let hash = BlobHash::compute(b"hello");
        store.register_blob(&hash).await.unwrap();
        assert!(store.blob_exists(&hash).await.unwrap());

        store.close().await;
        assert!(store.is_closed());
        // Second close is a no-op.
        store.close().await;
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();
        assert_eq!(store.blob_count().await.unwrap(), 0);
    }
}
