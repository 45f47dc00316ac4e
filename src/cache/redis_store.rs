// src/cache/redis_store.rs
//! Redis-backed [`CacheStore`].

use super::CacheStore;
use crate::error::{DividendError, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use redis::{aio::ConnectionManager, AsyncCommands, Script};
use std::fmt;
use std::time::Duration;

/// Writes `ARGV[2]` with TTL `ARGV[3]` unless the key currently holds `ARGV[1]`.
const SET_EX_UNLESS_LUA: &str = r#"
local current = redis.call('GET', KEYS[1])
if current == ARGV[1] then
    return 0
end
redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
return 1
"#;

/// A shared Redis cache client.
/// Uses a `ConnectionManager` for automatic reconnection and resilience.
#[derive(Clone)]
pub struct RedisCache {
    conn_manager: ConnectionManager,
    set_ex_unless: Script,
    redis_url: String,
}

impl fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCache")
            .field("redis_url", &self.redis_url)
            .field("conn_manager", &"<ConnectionManager instance>")
            .finish()
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    // Redis rejects EX 0.
    ttl.as_secs().max(1)
}

impl RedisCache {
    /// Connects and pings. Failure here is fatal for the service.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!("Initializing Redis connection manager for URL: {}", redis_url);
        let client = redis::Client::open(redis_url).map_err(|e| {
            DividendError::ConfigError(format!("Invalid Redis URL {}: {}", redis_url, e))
        })?;
        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to create Redis ConnectionManager: {}", e);
            DividendError::CacheError(format!("Failed to create Redis ConnectionManager: {}", e))
        })?;
        let cache = Self {
            conn_manager,
            set_ex_unless: Script::new(SET_EX_UNLESS_LUA),
            redis_url: redis_url.to_string(),
        };
        cache.ping().await?;
        info!("Successfully connected to Redis");
        Ok(cache)
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn_manager.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => {
                debug!("Cache {} for key: {}", if value.is_some() { "HIT" } else { "MISS" }, key);
                Ok(value)
            }
            Err(e) => {
                error!("Redis GET error for key {}: {}", key, e);
                Err(DividendError::CacheError(format!("Redis GET error for key {}: {}", key, e)))
            }
        }
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn_manager.clone();
        // Explicit MGET: the typed helper degrades to GET for single-key slices.
        redis::cmd("MGET")
            .arg(keys)
            .query_async::<_, Vec<Option<String>>>(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis MGET error for {} keys: {}", keys.len(), e);
                DividendError::CacheError(format!("Redis MGET error: {}", e))
            })
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let ttl = ttl_secs(ttl);
        match conn.set_ex::<_, _, ()>(key, value, ttl).await {
            Ok(()) => {
                debug!("Cache SETEX success for key: {} with TTL: {}s", key, ttl);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to SETEX key '{}' in Redis: {}", key, e);
                Err(DividendError::CacheError(format!("Redis SETEX error for key {}: {}", key, e)))
            }
        }
    }

    async fn set_ex_unless(
        &self,
        key: &str,
        unless: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let mut conn = self.conn_manager.clone();
        let written: i64 = self
            .set_ex_unless
            .key(key)
            .arg(unless)
            .arg(value)
            .arg(ttl_secs(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                error!("Redis conditional SET error for key {}: {}", key, e);
                DividendError::CacheError(format!("Redis conditional SET error: {}", e))
            })?;
        Ok(written == 1)
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn_manager.clone();
        let mut keys = Vec::new();
        let mut iter = conn.scan_match::<_, String>(pattern).await.map_err(|e| {
            error!("Redis SCAN error for pattern {}: {}", pattern, e);
            DividendError::CacheError(format!("Redis SCAN error: {}", e))
        })?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        debug!("SCAN {} matched {} keys", pattern, keys.len());
        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.conn_manager.clone();
        let secs: i64 = conn.ttl(key).await?;
        // -2: missing, -1: no expiry
        Ok((secs >= 0).then(|| Duration::from_secs(secs as u64)))
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!("Redis PING -> {}", pong);
        Ok(())
    }
}
