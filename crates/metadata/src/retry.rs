//! Retry of writes that hit a locked database.
//!
//! SQLite admits one writer at a time. A competing writer (another process, or
//! a checkpoint) surfaces as `SQLITE_BUSY`/`SQLITE_LOCKED`; those attempts are
//! re-run unchanged after a backoff. Every other error is returned as is.

use crate::error::{MetadataError, MetadataResult};
use larder_core::RetryConfig;
use std::future::Future;

/// Primary and extended SQLite result codes that mean "try again later".
const TRANSIENT_CODES: &[&str] = &[
    "5",   // SQLITE_BUSY
    "6",   // SQLITE_LOCKED
    "261", // SQLITE_BUSY_RECOVERY
    "262", // SQLITE_LOCKED_SHAREDCACHE
    "517", // SQLITE_BUSY_SNAPSHOT
    "773", // SQLITE_BUSY_TIMEOUT
];

/// Check whether `err` is a transient lock conflict.
pub fn is_transient_lock(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db_err) = err else {
        return false;
    };
    if let Some(code) = db_err.code()
        && TRANSIENT_CODES.iter().any(|c| code == *c)
    {
        return true;
    }
    let message = db_err.message();
    message.contains("database is locked") || message.contains("database table is locked")
}

/// Run `op` until it succeeds, fails with a non-transient error, or
/// `policy.max_attempts` attempts have hit a lock conflict.
pub async fn retry_if_locked<T, F, Fut>(policy: &RetryConfig, mut op: F) -> MetadataResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient_lock(&e) => {
                if attempt >= max_attempts {
                    tracing::error!(attempts = attempt, error = %e, "database still locked, giving up");
                    return Err(MetadataError::Busy {
                        attempts: attempt,
                        source: e,
                    });
                }
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "database locked, retrying write"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
