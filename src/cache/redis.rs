//! Redis storage backend.
//!
//! Entries are stored as the JSON form of [`CacheEntry`] under the cache key,
//! written with `SETEX key ttl value` so Redis drops them on its own after
//! the backend TTL.

use std::time::Duration;

use ::redis::AsyncCommands;
use ::redis::aio::{ConnectionLike, ConnectionManager};
use async_trait::async_trait;

use super::entry::CacheEntry;
use super::key::CacheKey;
use super::storage::{Storage, StorageError};

/// [`Storage`] backed by a Redis server.
///
/// Generic over the connection so any multiplexed async connection works;
/// the default is a reconnecting [`ConnectionManager`].
#[derive(Clone)]
pub struct RedisStorage<C = ConnectionManager> {
    conn: C,
    ttl: Duration,
}

impl RedisStorage<ConnectionManager> {
    /// Connects to `url` (e.g. `redis://127.0.0.1:6379/0`). Entries expire
    /// after `ttl`; `Duration::ZERO` stores them without expiry.
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, StorageError> {
        let client = ::redis::Client::open(url).map_err(StorageError::internal)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(StorageError::internal)?;
        Ok(Self::with_connection(conn, ttl))
    }
}

impl<C> RedisStorage<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    pub fn with_connection(conn: C, ttl: Duration) -> Self {
        Self { conn, ttl }
    }
}

#[async_trait]
impl<C> Storage for RedisStorage<C>
where
    C: ConnectionLike + Clone + Send + Sync + 'static,
{
    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> Result<(), StorageError> {
        let payload = entry.to_json().map_err(StorageError::internal)?;
        let mut conn = self.conn.clone();
        let ttl_secs = self.ttl.as_secs();
        if ttl_secs == 0 {
            conn.set::<_, _, ()>(key.as_str(), payload)
                .await
                .map_err(StorageError::internal)
        } else {
            conn.set_ex::<_, _, ()>(key.as_str(), payload, ttl_secs)
                .await
                .map_err(StorageError::internal)
        }
    }

    async fn get(&self, key: &CacheKey) -> Result<CacheEntry, StorageError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(key.as_str()).await.map_err(StorageError::internal)?;
        match payload {
            Some(raw) => CacheEntry::from_json(&raw).map_err(StorageError::internal),
            None => Err(StorageError::NotFound),
        }
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key.as_str())
            .await
            .map_err(StorageError::internal)
    }

    async fn flush(&self) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let _: () = ::redis::cmd("FLUSHDB")
            .query_async(&mut conn)
            .await
            .map_err(StorageError::internal)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use std::time::UNIX_EPOCH;

    use ::redis::{Value, cmd};
    use redis_test::{MockCmd, MockRedisConnection};

    use super::*;
    use crate::http::{Request, Response, StatusCode};

    const KEY: &str = "GET http://example.com/x";

    fn entry() -> CacheEntry {
        CacheEntry::capture(
            &Request::get("http://example.com/x"),
            &Response::new(StatusCode::OK)
                .header("Content-Length", "5")
                .body("hello"),
            UNIX_EPOCH + Duration::from_secs(1_704_110_400),
        )
    }

    fn storage(commands: Vec<MockCmd>, ttl: Duration) -> RedisStorage<MockRedisConnection> {
        RedisStorage::with_connection(MockRedisConnection::new(commands), ttl)
    }

    #[tokio::test]
    async fn set_writes_json_with_expiry() {
        let payload = entry().to_json().unwrap();
        let redis = storage(
            vec![MockCmd::new(
                cmd("SETEX").arg(KEY).arg(60u64).arg(payload.as_str()),
                Ok(Value::Okay),
            )],
            Duration::from_secs(60),
        );
        redis.set(&CacheKey::from(KEY), entry()).await.unwrap();
    }

    #[tokio::test]
    async fn zero_ttl_writes_without_expiry() {
        let payload = entry().to_json().unwrap();
        let redis = storage(
            vec![MockCmd::new(
                cmd("SET").arg(KEY).arg(payload.as_str()),
                Ok(Value::Okay),
            )],
            Duration::ZERO,
        );
        redis.set(&CacheKey::from(KEY), entry()).await.unwrap();
    }

    #[tokio::test]
    async fn get_restores_the_stored_entry() {
        let payload = entry().to_json().unwrap();
        let redis = storage(
            vec![MockCmd::new(cmd("GET").arg(KEY), Ok(Value::BulkString(payload.into_bytes())))],
            Duration::from_secs(60),
        );

        let stored = redis.get(&CacheKey::from(KEY)).await.unwrap();
        assert_eq!(stored, entry());
        let response = stored.restore(&Request::get("http://example.com/x")).unwrap();
        assert_eq!(response.body_bytes().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn nil_is_not_found() {
        let redis = storage(
            vec![MockCmd::new(cmd("GET").arg(KEY), Ok(Value::Nil))],
            Duration::from_secs(60),
        );
        assert!(matches!(
            redis.get(&CacheKey::from(KEY)).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn unreadable_payload_is_internal() {
        let redis = storage(
            vec![MockCmd::new(
                cmd("GET").arg(KEY),
                Ok(Value::BulkString(b"{not json".to_vec())),
            )],
            Duration::from_secs(60),
        );
        assert!(matches!(
            redis.get(&CacheKey::from(KEY)).await,
            Err(StorageError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn delete_and_flush() {
        let redis = storage(
            vec![
                MockCmd::new(cmd("DEL").arg(KEY), Ok(Value::Int(1))),
                MockCmd::new(cmd("FLUSHDB"), Ok(Value::Okay)),
            ],
            Duration::from_secs(60),
        );
        redis.delete(&CacheKey::from(KEY)).await.unwrap();
        redis.flush().await.unwrap();
        assert_eq!(redis.name(), "redis");
    }

    #[tokio::test]
    async fn unexpected_commands_surface_as_internal() {
        let redis = storage(Vec::new(), Duration::from_secs(60));
        assert!(matches!(
            redis.flush().await,
            Err(StorageError::Internal(_))
        ));
    }
}
