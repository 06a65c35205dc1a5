//! Metadata store trait and SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{AnnounceRepo, BlobRepo, ClaimRepo, FileRepo, StreamRepo};
use crate::retry::retry_if_locked;
use async_trait::async_trait;
use larder_core::{RetryConfig, StoreConfig};
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions,
    SqliteQueryResult, SqliteSynchronous,
};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    BlobRepo + StreamRepo + FileRepo + AnnounceRepo + ClaimRepo + Send + Sync
{
    /// Create all relations if they do not exist yet.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> MetadataResult<()>;

    /// Close the store. Closing twice is a no-op.
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// SQLite-based metadata store.
///
/// All writes go through [`SqliteStore::execute`], which serializes writers and
/// retries statements that hit a locked database. Reads use the pool directly.
/// No statement sequence runs inside an explicit transaction.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    retry: RetryConfig,
    write_gate: Mutex<()>,
}

impl SqliteStore {
    /// Open the store described by `config`, creating the schema on first open.
    pub async fn open(config: &StoreConfig, retry: &RetryConfig) -> MetadataResult<Self> {
        config.validate().map_err(MetadataError::Config)?;
        retry.validate().map_err(MetadataError::Config)?;

        let pool = match config {
            StoreConfig::Sqlite {
                path,
                max_connections,
                busy_timeout_ms,
            } => {
                if let Some(parent) = path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    std::fs::create_dir_all(parent)?;
                }
                tracing::info!(path = %path.display(), "Opening metadata database");

                let opts = SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
                    .synchronous(SqliteSynchronous::Normal)
                    .foreign_keys(true)
                    .busy_timeout(Duration::from_millis(*busy_timeout_ms));

                SqlitePoolOptions::new()
                    .max_connections(*max_connections)
                    .connect_with(opts)
                    .await?
            }
            StoreConfig::Memory => {
                tracing::info!("Opening in-memory metadata database");
                let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

                // The database lives as long as its only connection.
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect_with(opts)
                    .await?
            }
        };

        let store = Self {
            pool,
            retry: retry.clone(),
            write_gate: Mutex::new(()),
        };
        store.migrate().await?;
        Ok(store)
    }

    /// Open an ephemeral in-memory store with the default retry policy.
    pub async fn in_memory() -> MetadataResult<Self> {
        Self::open(&StoreConfig::Memory, &RetryConfig::default()).await
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Run a write statement.
    ///
    /// `build` is called once per attempt and must yield the same statement
    /// with the same parameters. Writers are serialized; an attempt that hits a
    /// locked database is retried with backoff per the store's retry policy.
    pub async fn execute<'q, F>(&self, build: F) -> MetadataResult<SqliteQueryResult>
    where
        F: Fn() -> Query<'q, Sqlite, SqliteArguments<'q>>,
    {
        let _writer = self.write_gate.lock().await;
        retry_if_locked(&self.retry, || build().execute(&self.pool)).await
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        self.execute(|| sqlx::query(SCHEMA_SQL)).await?;
        tracing::info!("Metadata schema ready");
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            tracing::info!("Closing metadata database");
            self.pool.close().await;
        }
    }

    fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::error::is_unique_violation;
    use crate::models::*;
    use larder_core::{
        BlobHash, BlobInfo, ClaimId, ClaimMetadata, ClaimStatus, Outpoint, StreamHash,
        StreamStatus, TransferDirection,
    };
    use std::path::Path;
    use time::OffsetDateTime;

    fn to_i64<T: TryInto<i64> + Copy + std::fmt::Display>(
        value: T,
        field: &str,
    ) -> MetadataResult<i64> {
        value
            .try_into()
            .map_err(|_| MetadataError::InvalidInput(format!("{field} {value} out of range")))
    }

    fn stored_u32(value: i64, field: &str) -> MetadataResult<u32> {
        u32::try_from(value).map_err(|_| MetadataError::Corrupt(format!("{field} {value}")))
    }

    fn stored_u64(value: i64, field: &str) -> MetadataResult<u64> {
        u64::try_from(value).map_err(|_| MetadataError::Corrupt(format!("{field} {value}")))
    }

    fn stored_blob_hash(hash: &str) -> MetadataResult<BlobHash> {
        BlobHash::from_hex(hash).map_err(|e| MetadataError::Corrupt(e.to_string()))
    }

    fn stored_stream_hash(hash: &str) -> MetadataResult<StreamHash> {
        StreamHash::from_hex(hash).map_err(|e| MetadataError::Corrupt(e.to_string()))
    }

    fn stored_claim_id(claim_hash: &str) -> MetadataResult<ClaimId> {
        ClaimId::parse(claim_hash).map_err(|e| MetadataError::Corrupt(e.to_string()))
    }

    fn stored_metadata(value: &str) -> MetadataResult<ClaimMetadata> {
        ClaimMetadata::decode(value).map_err(|e| MetadataError::Corrupt(e.to_string()))
    }

    const BLOB_COLUMNS: &str = "b.id AS blob_id, b.blob_hash, mb.file_id, mb.stream_position, \
         mb.iv, mb.blob_length, mb.verified_at, mb.announced_at, mb.next_announce_at";

    impl SqliteStore {
        async fn require_stream(&self, stream_hash: &StreamHash) -> MetadataResult<StreamId> {
            self.stream_id(stream_hash).await?.ok_or_else(|| {
                MetadataError::NotFound(format!("stream {stream_hash} not found"))
            })
        }

        async fn require_claim(&self, claim_id: &ClaimId) -> MetadataResult<ClaimRow> {
            self.get_claim(claim_id)
                .await?
                .ok_or_else(|| MetadataError::UnknownClaim(claim_id.to_string()))
        }

        async fn write_claim_status(&self, row_id: i64, status: ClaimStatus) -> MetadataResult<()> {
            self.execute(move || {
                sqlx::query("UPDATE claims SET status = ? WHERE id = ?")
                    .bind(status.as_str())
                    .bind(row_id)
            })
            .await?;
            Ok(())
        }

        /// Register the descriptor, link it to the claim and store the payload.
        async fn store_metadata(
            &self,
            claim_row_id: i64,
            sd_hash: &BlobHash,
            encoded: &str,
        ) -> MetadataResult<()> {
            let sd_blob_id = self.register_blob(sd_hash).await?.0;

            self.execute(move || {
                sqlx::query("UPDATE claims SET sd_blob_id = ? WHERE id = ?")
                    .bind(sd_blob_id)
                    .bind(claim_row_id)
            })
            .await?;

            self.execute(move || {
                sqlx::query(
                    r#"
                    INSERT INTO metadata (claim_row_id, sd_blob_id, value) VALUES (?, ?, ?)
                    ON CONFLICT(claim_row_id) DO UPDATE SET
                        sd_blob_id = excluded.sd_blob_id,
                        value = excluded.value
                    "#,
                )
                .bind(claim_row_id)
                .bind(sd_blob_id)
                .bind(encoded)
            })
            .await?;
            Ok(())
        }

        async fn stamp_verified(&self, hash: &BlobHash, at: OffsetDateTime) -> MetadataResult<()> {
            let at = to_unix(at);
            let hash = hash.as_str();
            self.execute(move || {
                sqlx::query(
                    "UPDATE managed_blobs SET verified_at = ? WHERE id = (SELECT id FROM blobs WHERE blob_hash = ?)",
                )
                .bind(at)
                .bind(hash)
            })
            .await?;
            Ok(())
        }

        async fn stream_claim_row(&self, id: StreamId) -> MetadataResult<Option<ClaimRow>> {
            let row = sqlx::query_as::<_, ClaimRow>(
                "SELECT c.* FROM files f JOIN claims c ON c.id = f.claim_row_id WHERE f.id = ?",
            )
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }
    }

    #[async_trait]
    impl BlobRepo for SqliteStore {
        async fn register_blob(&self, hash: &BlobHash) -> MetadataResult<BlobId> {
            let row: Option<(i64,)> = sqlx::query_as(
                "SELECT b.id FROM blobs b JOIN managed_blobs mb ON mb.id = b.id WHERE b.blob_hash = ?",
            )
            .bind(hash.as_str())
            .fetch_optional(&self.pool)
            .await?;
            if let Some((id,)) = row {
                return Ok(BlobId(id));
            }

            // Insert-or-ignore keyed on the unique hash, so racing registrations
            // of the same hash settle on one row.
            let hash_str = hash.as_str();
            let inserted = self
                .execute(move || {
                    sqlx::query("INSERT INTO blobs (blob_hash) VALUES (?) ON CONFLICT(blob_hash) DO NOTHING")
                        .bind(hash_str)
                })
                .await?;

            let (id,): (i64,) = sqlx::query_as("SELECT id FROM blobs WHERE blob_hash = ?")
                .bind(hash_str)
                .fetch_one(&self.pool)
                .await?;

            self.execute(move || {
                sqlx::query("INSERT OR IGNORE INTO managed_blobs (id) VALUES (?)").bind(id)
            })
            .await?;

            if inserted.rows_affected() > 0 {
                tracing::debug!(blob_hash = %hash, blob_id = id, "Registered blob");
            }
            Ok(BlobId(id))
        }

        async fn blob_id(&self, hash: &BlobHash) -> MetadataResult<Option<BlobId>> {
            let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM blobs WHERE blob_hash = ?")
                .bind(hash.as_str())
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.map(|(id,)| BlobId(id)))
        }

        async fn blob_exists(&self, hash: &BlobHash) -> MetadataResult<bool> {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM blobs WHERE blob_hash = ?)")
                    .bind(hash.as_str())
                    .fetch_one(&self.pool)
                    .await?;
            Ok(exists)
        }

        async fn get_blob(&self, hash: &BlobHash) -> MetadataResult<Option<ManagedBlobRow>> {
            let row = sqlx::query_as::<_, ManagedBlobRow>(&format!(
                "SELECT {BLOB_COLUMNS} FROM blobs b JOIN managed_blobs mb ON mb.id = b.id WHERE b.blob_hash = ?"
            ))
            .bind(hash.as_str())
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn blob_count(&self) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blobs")
                .fetch_one(&self.pool)
                .await?;
            stored_u64(count, "blob count")
        }
    }

    #[async_trait]
    impl StreamRepo for SqliteStore {
        async fn create_stream(
            &self,
            stream_hash: &StreamHash,
            file_name: &str,
            decryption_key: &str,
            suggested_file_name: &str,
        ) -> MetadataResult<StreamId> {
            let hash = stream_hash.as_str();
            let result = self
                .execute(move || {
                    sqlx::query(
                        r#"
                        INSERT INTO files (
                            status, stream_hash, decryption_key, file_name, suggested_file_name
                        ) VALUES (?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(StreamStatus::Pending.as_str())
                    .bind(hash)
                    .bind(decryption_key)
                    .bind(file_name)
                    .bind(suggested_file_name)
                })
                .await;

            match result {
                Ok(done) => {
                    let id = StreamId(done.last_insert_rowid());
                    tracing::debug!(stream_hash = %stream_hash, stream_id = %id, "Created stream");
                    Ok(id)
                }
                Err(MetadataError::Database(e)) if is_unique_violation(&e) => Err(
                    MetadataError::AlreadyExists(format!("stream {stream_hash} already exists")),
                ),
                Err(e) => Err(e),
            }
        }

        async fn append_pieces(
            &self,
            stream_hash: &StreamHash,
            pieces: &[BlobInfo],
        ) -> MetadataResult<()> {
            // Validate the whole batch before writing any of it.
            if let Some(bad) = pieces.iter().find(|p| p.hash.is_none() && !p.is_terminator()) {
                return Err(MetadataError::InvalidInput(format!(
                    "piece at position {} has no hash but length {}",
                    bad.position, bad.length
                )));
            }
            let file_id = self.require_stream(stream_hash).await?.0;

            for piece in pieces {
                let position = i64::from(piece.position);
                let iv = piece.iv.as_str();
                match &piece.hash {
                    None => {
                        let stored = self
                            .execute(move || {
                                sqlx::query(
                                    "INSERT OR IGNORE INTO stream_terminators (id, blob_count, iv) VALUES (?, ?, ?)",
                                )
                                .bind(file_id)
                                .bind(position)
                                .bind(iv)
                            })
                            .await?;
                        if stored.rows_affected() == 0 {
                            tracing::debug!(stream_hash = %stream_hash, "Stream already terminated");
                        }
                    }
                    Some(hash) => {
                        let length = to_i64(piece.length, "blob length")?;
                        let blob_id = self.register_blob(hash).await?.0;
                        self.execute(move || {
                            sqlx::query(
                                r#"
                                UPDATE managed_blobs
                                SET file_id = ?, stream_position = ?, iv = ?, blob_length = ?
                                WHERE id = ?
                                "#,
                            )
                            .bind(file_id)
                            .bind(position)
                            .bind(iv)
                            .bind(length)
                            .bind(blob_id)
                        })
                        .await?;
                    }
                }
            }

            tracing::debug!(stream_hash = %stream_hash, pieces = pieces.len(), "Appended pieces");
            Ok(())
        }

        async fn reconstruct(&self, stream_hash: &StreamHash) -> MetadataResult<Vec<BlobInfo>> {
            let file_id = self.require_stream(stream_hash).await?.0;

            let rows: Vec<(String, i64, Option<String>, Option<i64>)> = sqlx::query_as(
                r#"
                SELECT b.blob_hash, mb.stream_position, mb.iv, mb.blob_length
                FROM managed_blobs mb
                JOIN blobs b ON b.id = mb.id
                WHERE mb.file_id = ? AND mb.stream_position IS NOT NULL
                ORDER BY mb.stream_position, mb.id
                "#,
            )
            .bind(file_id)
            .fetch_all(&self.pool)
            .await?;

            let mut pieces = Vec::with_capacity(rows.len() + 1);
            let mut expected: i64 = 0;
            for (hash, position, iv, length) in rows {
                if position < expected {
                    // Two blobs claim the same slot; the first one wins.
                    continue;
                }
                if position > expected {
                    tracing::warn!(
                        stream_hash = %stream_hash,
                        missing_position = expected,
                        "Gap in stream pieces, truncating reconstruction"
                    );
                    break;
                }
                pieces.push(BlobInfo {
                    hash: Some(stored_blob_hash(&hash)?),
                    position: stored_u32(position, "stream position")?,
                    iv: iv.unwrap_or_default(),
                    length: stored_u64(length.unwrap_or(0), "blob length")?,
                });
                expected += 1;
            }

            let terminator = sqlx::query_as::<_, StreamTerminatorRow>(
                "SELECT id, blob_count, iv FROM stream_terminators WHERE id = ?",
            )
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?;
            if let Some(term) = terminator {
                pieces.push(BlobInfo::terminator(
                    stored_u32(term.blob_count, "terminator blob count")?,
                    term.iv.unwrap_or_default(),
                ));
            }

            Ok(pieces)
        }

        async fn piece_count(&self, stream_hash: &StreamHash) -> MetadataResult<u64> {
            let count: i64 = sqlx::query_scalar(
                r#"
                SELECT COUNT(*) FROM managed_blobs mb
                JOIN files f ON f.id = mb.file_id
                WHERE f.stream_hash = ? AND mb.stream_position IS NOT NULL
                "#,
            )
            .bind(stream_hash.as_str())
            .fetch_one(&self.pool)
            .await?;
            stored_u64(count, "piece count")
        }

        async fn stream_exists(&self, stream_hash: &StreamHash) -> MetadataResult<bool> {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM files WHERE stream_hash = ?)")
                    .bind(stream_hash.as_str())
                    .fetch_one(&self.pool)
                    .await?;
            Ok(exists)
        }

        async fn stream_id(&self, stream_hash: &StreamHash) -> MetadataResult<Option<StreamId>> {
            let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM files WHERE stream_hash = ?")
                .bind(stream_hash.as_str())
                .fetch_optional(&self.pool)
                .await?;
            Ok(row.map(|(id,)| StreamId(id)))
        }

        async fn stream_info(&self, stream_hash: &StreamHash) -> MetadataResult<StreamInfo> {
            sqlx::query_as::<_, StreamInfo>(
                "SELECT decryption_key, file_name, suggested_file_name FROM files WHERE stream_hash = ?",
            )
            .bind(stream_hash.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("stream {stream_hash} not found")))
        }

        async fn list_streams(&self) -> MetadataResult<Vec<StreamHash>> {
            let rows: Vec<(String,)> = sqlx::query_as(
                "SELECT stream_hash FROM files WHERE stream_hash IS NOT NULL ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await?;
            rows.iter().map(|(h,)| stored_stream_hash(h)).collect()
        }

        async fn delete_stream(&self, stream_hash: &StreamHash) -> MetadataResult<()> {
            let hash = stream_hash.as_str();
            let result = self
                .execute(move || sqlx::query("DELETE FROM files WHERE stream_hash = ?").bind(hash))
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!(
                    "stream {stream_hash} not found"
                )));
            }
            tracing::debug!(stream_hash = %stream_hash, "Deleted stream");
            Ok(())
        }

        async fn stream_of_blob(&self, blob_hash: &BlobHash) -> MetadataResult<Option<StreamHash>> {
            let row: Option<(Option<String>,)> = sqlx::query_as(
                r#"
                SELECT f.stream_hash FROM files f
                JOIN managed_blobs mb ON mb.file_id = f.id
                JOIN blobs b ON b.id = mb.id
                WHERE b.blob_hash = ?
                "#,
            )
            .bind(blob_hash.as_str())
            .fetch_optional(&self.pool)
            .await?;
            row.and_then(|(h,)| h)
                .map(|h| stored_stream_hash(&h))
                .transpose()
        }

        async fn blob_position(
            &self,
            stream_hash: &StreamHash,
            blob_hash: &BlobHash,
        ) -> MetadataResult<Option<u32>> {
            let row: Option<(Option<i64>,)> = sqlx::query_as(
                r#"
                SELECT mb.stream_position FROM managed_blobs mb
                JOIN blobs b ON b.id = mb.id
                JOIN files f ON f.id = mb.file_id
                WHERE f.stream_hash = ? AND b.blob_hash = ?
                "#,
            )
            .bind(stream_hash.as_str())
            .bind(blob_hash.as_str())
            .fetch_optional(&self.pool)
            .await?;
            row.and_then(|(p,)| p)
                .map(|p| stored_u32(p, "stream position"))
                .transpose()
        }

        async fn set_descriptor(
            &self,
            stream_hash: &StreamHash,
            sd_hash: &BlobHash,
        ) -> MetadataResult<()> {
            let file_id = self.require_stream(stream_hash).await?.0;
            let sd_blob_id = self.register_blob(sd_hash).await?.0;

            self.execute(move || {
                sqlx::query("UPDATE files SET sd_blob_id = ? WHERE id = ?")
                    .bind(sd_blob_id)
                    .bind(file_id)
            })
            .await?;
            self.execute(move || {
                sqlx::query("UPDATE managed_blobs SET file_id = ? WHERE id = ?")
                    .bind(file_id)
                    .bind(sd_blob_id)
            })
            .await?;

            tracing::debug!(stream_hash = %stream_hash, sd_hash = %sd_hash, "Linked stream descriptor");
            Ok(())
        }

        async fn descriptor_for_stream(
            &self,
            stream_hash: &StreamHash,
        ) -> MetadataResult<Option<BlobHash>> {
            let row: Option<(String,)> = sqlx::query_as(
                "SELECT b.blob_hash FROM files f JOIN blobs b ON b.id = f.sd_blob_id WHERE f.stream_hash = ?",
            )
            .bind(stream_hash.as_str())
            .fetch_optional(&self.pool)
            .await?;
            row.map(|(h,)| stored_blob_hash(&h)).transpose()
        }

        async fn stream_for_descriptor(
            &self,
            sd_hash: &BlobHash,
        ) -> MetadataResult<Option<StreamHash>> {
            let row: Option<(Option<String>,)> = sqlx::query_as(
                "SELECT f.stream_hash FROM files f JOIN blobs b ON b.id = f.sd_blob_id WHERE b.blob_hash = ? ORDER BY f.id",
            )
            .bind(sd_hash.as_str())
            .fetch_optional(&self.pool)
            .await?;
            row.and_then(|(h,)| h)
                .map(|h| stored_stream_hash(&h))
                .transpose()
        }

        async fn link_claim(
            &self,
            stream_hash: &StreamHash,
            claim_id: &ClaimId,
        ) -> MetadataResult<()> {
            let file_id = self.require_stream(stream_hash).await?.0;
            let claim_row_id = self.require_claim(claim_id).await?.id;
            self.execute(move || {
                sqlx::query("UPDATE files SET claim_row_id = ? WHERE id = ?")
                    .bind(claim_row_id)
                    .bind(file_id)
            })
            .await?;
            Ok(())
        }
    }

    #[async_trait]
    impl FileRepo for SqliteStore {
        async fn save_file(
            &self,
            stream_hash: &StreamHash,
            rate: Option<f64>,
        ) -> MetadataResult<StreamId> {
            let rate = rate.unwrap_or(0.0);
            let hash = stream_hash.as_str();
            self.execute(move || {
                sqlx::query(
                    r#"
                    INSERT INTO files (status, blob_data_rate, stream_hash) VALUES (?, ?, ?)
                    ON CONFLICT(stream_hash) DO UPDATE SET
                        status = excluded.status,
                        blob_data_rate = excluded.blob_data_rate
                    "#,
                )
                .bind(StreamStatus::Pending.as_str())
                .bind(rate)
                .bind(hash)
            })
            .await?;

            let id = self.require_stream(stream_hash).await?;
            tracing::info!(stream_hash = %stream_hash, stream_id = %id, rate, "Saved file");
            Ok(id)
        }

        async fn set_rate(&self, id: StreamId, rate: f64) -> MetadataResult<()> {
            let result = self
                .execute(move || {
                    sqlx::query("UPDATE files SET blob_data_rate = ? WHERE id = ?")
                        .bind(rate)
                        .bind(id.0)
                })
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("file {id} not found")));
            }
            Ok(())
        }

        async fn change_status(&self, id: StreamId, status: StreamStatus) -> MetadataResult<()> {
            let result = self
                .execute(move || {
                    sqlx::query("UPDATE files SET status = ? WHERE id = ?")
                        .bind(status.as_str())
                        .bind(id.0)
                })
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("file {id} not found")));
            }
            tracing::debug!(stream_id = %id, status = %status, "Changed file status");
            Ok(())
        }

        async fn delete_file(&self, id: StreamId) -> MetadataResult<()> {
            let result = self
                .execute(move || sqlx::query("DELETE FROM files WHERE id = ?").bind(id.0))
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("file {id} not found")));
            }
            Ok(())
        }

        async fn file_status(&self, id: StreamId) -> MetadataResult<Option<StreamStatus>> {
            self.get_file(id).await?.map(|f| f.status()).transpose()
        }

        async fn get_file(&self, id: StreamId) -> MetadataResult<Option<FileRow>> {
            let row = sqlx::query_as::<_, FileRow>("SELECT * FROM files WHERE id = ?")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn list_files(&self) -> MetadataResult<Vec<FileRow>> {
            let rows = sqlx::query_as::<_, FileRow>("SELECT * FROM files ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl AnnounceRepo for SqliteStore {
        async fn mark_completed(
            &self,
            hash: &BlobHash,
            length: u64,
            next_announce_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let length = to_i64(length, "blob length")?;
            let next = to_unix(next_announce_at);
            let blob_id = self.register_blob(hash).await?.0;

            self.execute(move || {
                sqlx::query(
                    "UPDATE managed_blobs SET blob_length = ?, next_announce_at = ? WHERE id = ?",
                )
                .bind(length)
                .bind(next)
                .bind(blob_id)
            })
            .await?;
            self.stamp_verified(hash, OffsetDateTime::now_utc()).await?;

            tracing::debug!(blob_hash = %hash, length, "Blob completed");
            Ok(())
        }

        async fn due_for_announce(&self, now: OffsetDateTime) -> MetadataResult<Vec<BlobHash>> {
            let rows: Vec<(String,)> = sqlx::query_as(
                r#"
                SELECT b.blob_hash FROM blobs b
                JOIN managed_blobs mb ON mb.id = b.id
                WHERE mb.next_announce_at < ? AND b.blob_hash IS NOT NULL
                ORDER BY mb.next_announce_at, b.id
                "#,
            )
            .bind(to_unix(now))
            .fetch_all(&self.pool)
            .await?;
            rows.iter().map(|(h,)| stored_blob_hash(h)).collect()
        }

        async fn reschedule(
            &self,
            hashes: &[BlobHash],
            next_announce_at: OffsetDateTime,
        ) -> MetadataResult<()> {
            let next = to_unix(next_announce_at);
            let announced = to_unix(OffsetDateTime::now_utc());
            for hash in hashes {
                let hash = hash.as_str();
                self.execute(move || {
                    sqlx::query(
                        r#"
                        UPDATE managed_blobs SET next_announce_at = ?, announced_at = ?
                        WHERE id = (SELECT id FROM blobs WHERE blob_hash = ?)
                        "#,
                    )
                    .bind(next)
                    .bind(announced)
                    .bind(hash)
                })
                .await?;
            }
            tracing::debug!(count = hashes.len(), "Rescheduled blob announcements");
            Ok(())
        }

        async fn verify_on_disk(&self, blob_dir: Option<&Path>) -> MetadataResult<Vec<BlobHash>> {
            let rows: Vec<(String,)> = sqlx::query_as("SELECT blob_hash FROM blobs ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
            let total = rows.len();

            let mut verified = Vec::new();
            for (hash,) in rows {
                let hash = stored_blob_hash(&hash)?;
                let present = match blob_dir {
                    Some(dir) => tokio::fs::metadata(dir.join(hash.as_str()))
                        .await
                        .map(|m| m.is_file())
                        .unwrap_or(false),
                    None => true,
                };
                if present {
                    self.stamp_verified(&hash, OffsetDateTime::now_utc()).await?;
                    verified.push(hash);
                }
            }

            tracing::info!(
                total,
                verified = verified.len(),
                blob_dir = ?blob_dir,
                "Verified blobs"
            );
            Ok(verified)
        }

        async fn log_transfer(
            &self,
            hash: &BlobHash,
            peer: &str,
            rate: f64,
            direction: TransferDirection,
        ) -> MetadataResult<()> {
            let blob_id = self.register_blob(hash).await?.0;
            let at = to_unix(OffsetDateTime::now_utc());
            self.execute(move || {
                sqlx::query(
                    r#"
                    INSERT INTO blob_transfer_history (blob_id, peer, downloaded, rate, transferred_at)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .bind(blob_id)
                .bind(peer)
                .bind(direction.is_download())
                .bind(rate)
                .bind(at)
            })
            .await?;
            Ok(())
        }

        async fn transfer_history(&self, hash: &BlobHash) -> MetadataResult<Vec<TransferRow>> {
            let rows = sqlx::query_as::<_, TransferRow>(
                r#"
                SELECT h.* FROM blob_transfer_history h
                JOIN blobs b ON b.id = h.blob_id
                WHERE b.blob_hash = ?
                ORDER BY h.transferred_at DESC, h.id DESC
                "#,
            )
            .bind(hash.as_str())
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn delete_blob(&self, hash: &BlobHash) -> MetadataResult<()> {
            let hash_str = hash.as_str();
            let result = self
                .execute(move || sqlx::query("DELETE FROM blobs WHERE blob_hash = ?").bind(hash_str))
                .await?;
            if result.rows_affected() > 0 {
                tracing::debug!(blob_hash = %hash, "Deleted blob");
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ClaimRepo for SqliteStore {
        async fn observe_claim(
            &self,
            name: &str,
            outpoint: &Outpoint,
            is_local: bool,
        ) -> MetadataResult<ClaimId> {
            let claim_id = outpoint.claim_id();
            let claim_hash = claim_id.as_str();
            let txid = outpoint.txid();
            let nout = i64::from(outpoint.nout());

            let result = self
                .execute(move || {
                    sqlx::query(
                        r#"
                        INSERT INTO claims (name, status, txid, nout, claim_hash, is_mine)
                        VALUES (?, ?, ?, ?, ?, ?)
                        ON CONFLICT(claim_hash) DO NOTHING
                        "#,
                    )
                    .bind(name)
                    .bind(ClaimStatus::Init.as_str())
                    .bind(txid)
                    .bind(nout)
                    .bind(claim_hash)
                    .bind(is_local)
                })
                .await?;

            if result.rows_affected() > 0 {
                tracing::debug!(name, claim_id = %claim_id, is_local, "Observed new claim");
            }
            Ok(claim_id)
        }

        async fn attach_metadata(
            &self,
            claim_id: &ClaimId,
            metadata: &ClaimMetadata,
        ) -> MetadataResult<ClaimStatus> {
            let claim = self.require_claim(claim_id).await?;
            let current = claim.status()?;
            if current != ClaimStatus::Init {
                tracing::debug!(claim_id = %claim_id, status = %current, "Claim metadata already processed");
                return Ok(current);
            }

            let payload = metadata
                .descriptor_hash()
                .and_then(|sd_hash| Ok((sd_hash, metadata.encode()?)))
                .map_err(|e| MetadataError::InvalidInput(e.to_string()));
            let stored = match payload {
                Ok((sd_hash, encoded)) => self.store_metadata(claim.id, &sd_hash, &encoded).await,
                Err(e) => Err(e),
            };
            // Extraction and storage failures are recorded on the claim, not raised.
            let next = match stored {
                Ok(()) => ClaimStatus::Pending,
                Err(e) => {
                    tracing::warn!(claim_id = %claim_id, error = %e, "Rejected claim metadata");
                    ClaimStatus::InvalidMetadata
                }
            };
            self.write_claim_status(claim.id, next).await?;
            Ok(next)
        }

        async fn save_name_metadata(
            &self,
            name: &str,
            outpoint: &Outpoint,
            metadata: &ClaimMetadata,
            is_local: bool,
        ) -> MetadataResult<ClaimStatus> {
            let claim_id = self.observe_claim(name, outpoint, is_local).await?;
            self.attach_metadata(&claim_id, metadata).await
        }

        async fn elect_winner(&self, name: &str, outpoint: &Outpoint) -> MetadataResult<()> {
            let claim_id = outpoint.claim_id();
            let claim = self.require_claim(&claim_id).await?;
            if claim.name != name {
                return Err(MetadataError::InvalidInput(format!(
                    "claim {claim_id} is for name '{}', not '{name}'",
                    claim.name
                )));
            }
            let current = claim.status()?;
            if !current.can_transition_to(ClaimStatus::Active) {
                return Err(MetadataError::InvalidStateTransition {
                    from: current,
                    to: ClaimStatus::Active,
                });
            }
            let claim_row_id = claim.id;
            let now = to_unix(OffsetDateTime::now_utc());

            // These three steps commit separately. Each is idempotent, so a
            // failure part way is repaired by running the election again.
            self.execute(move || {
                sqlx::query(
                    r#"
                    INSERT INTO winning_claims (name, claim_row_id, last_checked) VALUES (?, ?, ?)
                    ON CONFLICT(name) DO UPDATE SET
                        claim_row_id = excluded.claim_row_id,
                        last_checked = excluded.last_checked
                    "#,
                )
                .bind(name)
                .bind(claim_row_id)
                .bind(now)
            })
            .await?;

            let demoted = self
                .execute(move || {
                    sqlx::query(
                        "UPDATE claims SET status = ? WHERE name = ? AND status = ? AND id != ?",
                    )
                    .bind(ClaimStatus::Inactive.as_str())
                    .bind(name)
                    .bind(ClaimStatus::Active.as_str())
                    .bind(claim_row_id)
                })
                .await?;

            self.write_claim_status(claim_row_id, ClaimStatus::Active)
                .await?;

            tracing::debug!(
                name,
                claim_id = %claim_id,
                demoted = demoted.rows_affected(),
                "Elected winning claim"
            );
            Ok(())
        }

        async fn update_claim_status(
            &self,
            claim_id: &ClaimId,
            status: ClaimStatus,
        ) -> MetadataResult<()> {
            let claim = self.require_claim(claim_id).await?;
            let current = claim.status()?;
            if !current.can_transition_to(status) {
                return Err(MetadataError::InvalidStateTransition {
                    from: current,
                    to: status,
                });
            }
            self.write_claim_status(claim.id, status).await
        }

        async fn get_claim(&self, claim_id: &ClaimId) -> MetadataResult<Option<ClaimRow>> {
            let row = sqlx::query_as::<_, ClaimRow>("SELECT * FROM claims WHERE claim_hash = ?")
                .bind(claim_id.as_str())
                .fetch_optional(&self.pool)
                .await?;
            Ok(row)
        }

        async fn claim_status(&self, claim_id: &ClaimId) -> MetadataResult<Option<ClaimStatus>> {
            self.get_claim(claim_id)
                .await?
                .map(|c| c.status())
                .transpose()
        }

        async fn claim_metadata(
            &self,
            claim_id: &ClaimId,
        ) -> MetadataResult<Option<ClaimMetadata>> {
            let row: Option<(String,)> = sqlx::query_as(
                "SELECT m.value FROM metadata m JOIN claims c ON c.id = m.claim_row_id WHERE c.claim_hash = ?",
            )
            .bind(claim_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
            row.map(|(v,)| stored_metadata(&v)).transpose()
        }

        async fn claim_name(&self, claim_id: &ClaimId) -> MetadataResult<Option<String>> {
            Ok(self.get_claim(claim_id).await?.map(|c| c.name))
        }

        async fn winning_claim(&self, name: &str) -> MetadataResult<Option<ClaimId>> {
            let row: Option<(String,)> = sqlx::query_as(
                "SELECT c.claim_hash FROM winning_claims w JOIN claims c ON c.id = w.claim_row_id WHERE w.name = ?",
            )
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
            row.map(|(h,)| stored_claim_id(&h)).transpose()
        }

        async fn winning_metadata(&self, name: &str) -> MetadataResult<Option<ClaimMetadata>> {
            let row: Option<(String,)> = sqlx::query_as(
                "SELECT m.value FROM winning_claims w JOIN metadata m ON m.claim_row_id = w.claim_row_id WHERE w.name = ?",
            )
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
            row.map(|(v,)| stored_metadata(&v)).transpose()
        }

        async fn last_checked(&self, name: &str) -> MetadataResult<Option<OffsetDateTime>> {
            let row = sqlx::query_as::<_, WinningClaimRow>(
                "SELECT * FROM winning_claims WHERE name = ?",
            )
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
            match row {
                Some(w) => w.last_checked(),
                None => Ok(None),
            }
        }

        async fn stream_claim_status(&self, id: StreamId) -> MetadataResult<Option<ClaimStatus>> {
            self.stream_claim_row(id)
                .await?
                .map(|c| c.status())
                .transpose()
        }

        async fn stream_claim_id(&self, id: StreamId) -> MetadataResult<Option<ClaimId>> {
            self.stream_claim_row(id)
                .await?
                .map(|c| c.claim_id())
                .transpose()
        }

        async fn stream_claim_name(&self, id: StreamId) -> MetadataResult<Option<String>> {
            Ok(self.stream_claim_row(id).await?.map(|c| c.name))
        }

        async fn set_claim_tx_id(
            &self,
            outpoint: &Outpoint,
            claim_tx_id: &str,
        ) -> MetadataResult<()> {
            let txid = outpoint.txid();
            let nout = i64::from(outpoint.nout());
            let result = self
                .execute(move || {
                    sqlx::query(
                        "UPDATE claims SET claim_transaction_id = ? WHERE txid = ? AND nout = ?",
                    )
                    .bind(claim_tx_id)
                    .bind(txid)
                    .bind(nout)
                })
                .await?;
            if result.rows_affected() == 0 {
                return Err(MetadataError::UnknownClaim(outpoint.claim_id().to_string()));
            }
            Ok(())
        }

        async fn claim_tx_id(&self, outpoint: &Outpoint) -> MetadataResult<Option<String>> {
            let row: Option<(Option<String>,)> = sqlx::query_as(
                "SELECT claim_transaction_id FROM claims WHERE txid = ? AND nout = ?",
            )
            .bind(outpoint.txid())
            .bind(i64::from(outpoint.nout()))
            .fetch_optional(&self.pool)
            .await?;
            Ok(row.and_then(|(id,)| id))
        }

        async fn claim_metadata_for_descriptor(
            &self,
            sd_hash: &BlobHash,
        ) -> MetadataResult<Option<ClaimMetadata>> {
            let row: Option<(String,)> = sqlx::query_as(
                r#"
                SELECT m.value FROM metadata m
                JOIN claims c ON c.id = m.claim_row_id
                JOIN blobs b ON b.id = c.sd_blob_id
                WHERE b.blob_hash = ?
                ORDER BY c.id
                LIMIT 1
                "#,
            )
            .bind(sd_hash.as_str())
            .fetch_optional(&self.pool)
            .await?;
            row.map(|(v,)| stored_metadata(&v)).transpose()
        }

        async fn clean_bad_records(&self) -> MetadataResult<u64> {
            let result = self
                .execute(|| {
                    sqlx::query(
                        "DELETE FROM claims WHERE txid IS NULL OR LENGTH(txid) = 0 OR LENGTH(txid) > 64",
                    )
                })
                .await?;
            let deleted = result.rows_affected();
            if deleted > 0 {
                tracing::info!(deleted, "Removed malformed claim records");
            }
            Ok(deleted)
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- Content-addressed blob identities
CREATE TABLE IF NOT EXISTS blobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    blob_hash TEXT NOT NULL UNIQUE
);

-- On-chain claims
CREATE TABLE IF NOT EXISTS claims (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN (
        'INIT', 'PENDING', 'ACTIVE', 'INACTIVE', 'INVALID_METADATA', 'MISSING_METADATA'
    )),
    txid TEXT NOT NULL,
    nout INTEGER NOT NULL,
    claim_transaction_id TEXT,
    claim_hash TEXT NOT NULL UNIQUE,
    sd_blob_id INTEGER REFERENCES blobs(id) ON DELETE SET NULL ON UPDATE CASCADE,
    is_mine INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_claims_name_status ON claims(name, status);
CREATE INDEX IF NOT EXISTS idx_claims_outpoint ON claims(txid, nout);
CREATE INDEX IF NOT EXISTS idx_claims_sd_blob ON claims(sd_blob_id);

-- Streams and their download state
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    status TEXT NOT NULL CHECK (status IN ('pending', 'running', 'stopped', 'finished')),
    blob_data_rate REAL,
    stream_hash TEXT UNIQUE,
    sd_blob_id INTEGER REFERENCES blobs(id) ON DELETE CASCADE ON UPDATE CASCADE,
    decryption_key TEXT,
    file_name TEXT,
    suggested_file_name TEXT,
    claim_row_id INTEGER REFERENCES claims(id) ON DELETE SET NULL ON UPDATE CASCADE
);
CREATE INDEX IF NOT EXISTS idx_files_sd_blob ON files(sd_blob_id);

-- End-of-stream markers, one per stream
CREATE TABLE IF NOT EXISTS stream_terminators (
    id INTEGER PRIMARY KEY REFERENCES files(id) ON DELETE CASCADE ON UPDATE CASCADE,
    blob_count INTEGER NOT NULL,
    iv TEXT
);

-- Per-blob placement, verification and announce state
CREATE TABLE IF NOT EXISTS managed_blobs (
    id INTEGER PRIMARY KEY REFERENCES blobs(id) ON DELETE CASCADE ON UPDATE CASCADE,
    file_id INTEGER REFERENCES files(id) ON DELETE SET NULL ON UPDATE CASCADE,
    stream_position INTEGER,
    iv TEXT,
    blob_length INTEGER,
    verified_at INTEGER,
    announced_at INTEGER,
    next_announce_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_managed_blobs_stream ON managed_blobs(file_id, stream_position);
CREATE INDEX IF NOT EXISTS idx_managed_blobs_announce ON managed_blobs(next_announce_at);

-- Winning claim per name
CREATE TABLE IF NOT EXISTS winning_claims (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    claim_row_id INTEGER NOT NULL UNIQUE REFERENCES claims(id) ON DELETE CASCADE ON UPDATE CASCADE,
    last_checked INTEGER
);

-- Claim metadata, attached once the descriptor is known
CREATE TABLE IF NOT EXISTS metadata (
    claim_row_id INTEGER PRIMARY KEY REFERENCES claims(id) ON DELETE CASCADE ON UPDATE CASCADE,
    sd_blob_id INTEGER REFERENCES blobs(id) ON DELETE CASCADE ON UPDATE CASCADE,
    value TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_metadata_sd_blob ON metadata(sd_blob_id);

-- Append-only transfer log
CREATE TABLE IF NOT EXISTS blob_transfer_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    blob_id INTEGER NOT NULL REFERENCES blobs(id) ON DELETE CASCADE ON UPDATE CASCADE,
    peer TEXT NOT NULL,
    downloaded INTEGER NOT NULL,
    rate REAL NOT NULL,
    transferred_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_transfer_history_blob ON blob_transfer_history(blob_id, transferred_at);
"#;
