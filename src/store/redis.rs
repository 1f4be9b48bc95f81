//! Redis-backed implementation of the shared store.
//!
//! Counter increments run as a Lua script so that the increment, the
//! one-time expiry and the TTL read happen atomically on the server, no
//! matter how many instances race on the same key.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use super::{CounterSnapshot, SharedStore, StoreError};

const INCR_WITH_EXPIRY: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return {count, redis.call('PTTL', KEYS[1])}
";

const DEL_IF_EQ: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// Shared store backed by a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    key_prefix: String,
    incr_script: Script,
    del_if_eq_script: Script,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("key_prefix", &self.key_prefix)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1/")
    /// * `key_prefix` - Prepended to every key this store touches
    pub async fn connect(url: &str, key_prefix: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        info!(key_prefix = %key_prefix, "Connected to Redis");

        Ok(Self {
            connection,
            key_prefix: key_prefix.to_string(),
            incr_script: Script::new(INCR_WITH_EXPIRY),
            del_if_eq_script: Script::new(DEL_IF_EQ),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn incr_with_expiry(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<CounterSnapshot, StoreError> {
        let full_key = self.key(key);
        let mut conn = self.connection.clone();

        let (count, pttl): (i64, i64) = self
            .incr_script
            .key(&full_key)
            .arg(millis(ttl))
            .invoke_async(&mut conn)
            .await?;

        let count = u64::try_from(count)
            .map_err(|_| StoreError::Codec(format!("negative counter at {}", full_key)))?;
        // PTTL is negative when the key has no expiry or vanished meanwhile
        let ttl = Duration::from_millis(u64::try_from(pttl).unwrap_or(0));

        debug!(key = %full_key, count = count, ttl_ms = ttl.as_millis() as u64, "Incremented counter");
        Ok(CounterSnapshot { count, ttl })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(self.key(key)).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: () = conn.pset_ex(self.key(key), value, millis(ttl)).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let removed: i64 = conn.del(self.key(key)).await?;
        Ok(removed > 0)
    }

    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let removed: i64 = self
            .del_if_eq_script
            .key(self.key(key))
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    //! These tests require a Redis instance at `redis://127.0.0.1/` and are
    //! ignored by default. Run with `cargo test -- --ignored`.

    use super::*;

    async fn test_store(name: &str) -> RedisStore {
        RedisStore::connect("redis://127.0.0.1/", &format!("bulwark-test:{}:", name))
            .await
            .expect("Failed to connect to Redis")
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_redis_incr_with_expiry() {
        let store = test_store("incr").await;
        store.del("counter").await.unwrap();

        let ttl = Duration::from_secs(30);
        let first = store.incr_with_expiry("counter", ttl).await.unwrap();
        assert_eq!(first.count, 1);
        assert!(first.ttl <= ttl && first.ttl > Duration::from_secs(25));

        let second = store.incr_with_expiry("counter", ttl).await.unwrap();
        assert_eq!(second.count, 2);
        assert!(second.ttl <= first.ttl);

        store.del("counter").await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_redis_set_get_del() {
        let store = test_store("kv").await;

        store.set_ex("challenge", "abc", Duration::from_secs(30)).await.unwrap();
        assert_eq!(store.get("challenge").await.unwrap().as_deref(), Some("abc"));

        assert!(store.del("challenge").await.unwrap());
        assert!(!store.del("challenge").await.unwrap());
        assert_eq!(store.get("challenge").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_redis_del_if_eq() {
        let store = test_store("cas").await;

        store.set_ex("challenge", "new", Duration::from_secs(30)).await.unwrap();
        assert!(!store.del_if_eq("challenge", "old").await.unwrap());
        assert_eq!(store.get("challenge").await.unwrap().as_deref(), Some("new"));

        assert!(store.del_if_eq("challenge", "new").await.unwrap());
        assert_eq!(store.get("challenge").await.unwrap(), None);
    }

    #[test]
    fn test_millis_is_positive() {
        assert_eq!(millis(Duration::from_secs(2)), 2_000);
        assert_eq!(millis(Duration::ZERO), 1);
    }
}
