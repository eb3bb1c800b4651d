//! Redis counter store - shares rate-limit windows across replicas.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use quill_core::ports::{CounterStore, RateLimitError, WindowEntry};

use super::RedisConfig;

/// Fixed-window counters kept in Redis.
///
/// The increment and the expiry are applied in one Lua script so concurrent
/// hits from any replica see a single count. Redis drops a key when its
/// window closes, which is what opens the next window.
pub struct RedisCounterStore {
    conn: ConnectionManager,
    config: RedisConfig,
    /// Returns: [current_count, ttl_ms]
    script: Script,
}

impl RedisCounterStore {
    pub async fn new(config: RedisConfig) -> Result<Self, RateLimitError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn = tokio::time::timeout(config.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| RateLimitError::Backend("Connection timed out".to_string()))?
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        let script = Script::new(
            r#"
            local key = KEYS[1]
            local window_ms = tonumber(ARGV[1])

            local current = redis.call('INCR', key)
            local ttl = redis.call('PTTL', key)
            if current == 1 or ttl < 0 then
                redis.call('PEXPIRE', key, window_ms)
                ttl = window_ms
            end

            return {current, ttl}
            "#,
        );

        tracing::info!(url = %config.url, "Connected to Redis rate-limit store");

        Ok(Self {
            conn,
            config,
            script,
        })
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn hit(
        &self,
        key: &str,
        now_ms: u64,
        window: Duration,
    ) -> Result<WindowEntry, RateLimitError> {
        let mut conn = self.conn.clone();
        let window_ms = window.as_millis().max(1) as u64;

        let result: Vec<i64> = self
            .script
            .key(self.make_key(key))
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        let count = result.first().copied().unwrap_or(1).max(1) as u32;
        let ttl_ms = result.get(1).copied().unwrap_or(window_ms as i64).max(0) as u64;

        Ok(WindowEntry {
            count,
            reset_at_ms: now_ms.saturating_add(ttl_ms),
        })
    }

    async fn purge_expired(&self, _now_ms: u64) -> Result<usize, RateLimitError> {
        // Keys carry their own expiry.
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn get_test_store() -> Option<RedisCounterStore> {
        let config = RedisConfig {
            url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(1),
            key_prefix: format!("quill_test:{}", std::process::id()),
        };

        RedisCounterStore::new(config).await.ok()
    }

    #[tokio::test]
    async fn test_redis_fixed_window() {
        let store = match get_test_store().await {
            Some(s) => s,
            None => return,
        };
        let window = Duration::from_millis(800);

        let first = store.hit("k", 0, window).await.unwrap();
        assert_eq!(first.count, 1);
        assert!(first.reset_at_ms <= 800);

        let second = store.hit("k", 10, window).await.unwrap();
        assert_eq!(second.count, 2);

        let other = store.hit("other", 10, window).await.unwrap();
        assert_eq!(other.count, 1);

        // Wait for the window to close
        tokio::time::sleep(Duration::from_millis(1000)).await;

        let fresh = store.hit("k", 1000, window).await.unwrap();
        assert_eq!(fresh.count, 1);
        assert_eq!(store.purge_expired(2000).await.unwrap(), 0);
    }
}
