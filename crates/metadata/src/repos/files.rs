//! File download tracker.

use crate::error::MetadataResult;
use crate::models::{FileRow, StreamId};
use async_trait::async_trait;
use larder_core::{StreamHash, StreamStatus};

/// Repository for per-stream download status and payment rate.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Upsert a file row for `stream_hash` in `pending` status.
    ///
    /// An existing row has its status reset to `pending` and its rate replaced.
    /// The rate defaults to 0.0.
    async fn save_file(&self, stream_hash: &StreamHash, rate: Option<f64>)
    -> MetadataResult<StreamId>;

    /// Set the payment rate.
    async fn set_rate(&self, id: StreamId, rate: f64) -> MetadataResult<()>;

    /// Set the download status. Any status may follow any other.
    async fn change_status(&self, id: StreamId, status: StreamStatus) -> MetadataResult<()>;

    /// Delete a file row.
    async fn delete_file(&self, id: StreamId) -> MetadataResult<()>;

    /// Get the download status.
    async fn file_status(&self, id: StreamId) -> MetadataResult<Option<StreamStatus>>;

    /// Get a file row.
    async fn get_file(&self, id: StreamId) -> MetadataResult<Option<FileRow>>;

    /// List all file rows.
    async fn list_files(&self) -> MetadataResult<Vec<FileRow>>;
}
