//! Backoff for transient store errors.

use std::time::Duration;

use tracing::warn;

use crate::db::DatabaseError;

/// Base delay for store retries; doubles per attempt.
pub const STORE_RETRY_BASE_DELAY_MS: u64 = 50;

/// Runs `op`, retrying retryable store errors up to `retries` extra times
/// with exponential backoff.
pub async fn with_store_retries<T, F>(retries: u32, mut op: F) -> Result<T, DatabaseError>
where
    F: FnMut() -> Result<T, DatabaseError>,
{
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < retries => {
                let delay = STORE_RETRY_BASE_DELAY_MS * (1 << attempt);
                attempt += 1;
                warn!(
                    "Store error (attempt {}/{}), retrying in {}ms: {}",
                    attempt,
                    retries + 1,
                    delay,
                    e
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn busy() -> DatabaseError {
        DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        ))
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let mut calls = 0;
        let value = with_store_retries(3, || {
            calls += 1;
            if calls < 3 {
                Err(busy())
            } else {
                Ok(calls)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let mut calls = 0;
        let result: Result<(), _> = with_store_retries(1, || {
            calls += 1;
            Err(busy())
        })
        .await;
        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = with_store_retries(3, || {
            calls += 1;
            Err(DatabaseError::LockPoisoned)
        })
        .await;
        assert!(matches!(result, Err(DatabaseError::LockPoisoned)));
        assert_eq!(calls, 1);
    }
}
