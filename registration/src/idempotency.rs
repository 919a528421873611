//! Redis-backed idempotency keys.
//!
//! A key is marked with `SET key 1 NX EX ttl`, so marking is atomic across
//! service replicas and expiry is left to Redis.

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use seatline_core::error::{RegistrationError, Result};
use seatline_core::store::IdempotencyStore;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// `Redis` [`IdempotencyStore`].
///
/// # Example
///
/// ```no_run
/// use registration::idempotency::RedisIdempotencyStore;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = RedisIdempotencyStore::new("redis://127.0.0.1:6379", Duration::from_secs(86_400)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisIdempotencyStore {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
    ttl: Duration,
}

impl RedisIdempotencyStore {
    /// Connect to `Redis`.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the connection fails.
    pub async fn new(redis_url: &str, ttl: Duration) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            RegistrationError::Internal(format!("Failed to create Redis client: {e}"))
        })?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            RegistrationError::Internal(format!("Failed to create Redis connection manager: {e}"))
        })?;

        Ok(Self { conn_manager, ttl })
    }

    fn redis_key(key: &str) -> String {
        format!("idempotency:{key}")
    }
}

impl IdempotencyStore for RedisIdempotencyStore {
    fn seen<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let exists: bool = conn.exists(Self::redis_key(key)).await.map_err(|e| {
                RegistrationError::Internal(format!("Failed to read idempotency key: {e}"))
            })?;
            Ok(exists)
        })
    }

    fn mark_seen<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            // Reply is "OK" when set, nil when the key already exists
            let reply: Option<String> = redis::cmd("SET")
                .arg(Self::redis_key(key))
                .arg(1)
                .arg("NX")
                .arg("EX")
                .arg(self.ttl.as_secs().max(1))
                .query_async(&mut conn)
                .await
                .map_err(|e| {
                    RegistrationError::Internal(format!("Failed to mark idempotency key: {e}"))
                })?;

            let marked = reply.is_some();
            tracing::debug!(key = %key, marked, "Idempotency key checked");
            Ok(marked)
        })
    }

    fn forget<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let _: () = conn.del(Self::redis_key(key)).await.map_err(|e| {
                RegistrationError::Internal(format!("Failed to clear idempotency key: {e}"))
            })?;
            Ok(())
        })
    }
}
