//! KV/counter store
//!
//! All hot counters, the task list and cached lookups live in an external
//! key-value store. Access goes through the [`KvStore`] trait so the send
//! pipeline can be exercised against [`MemoryStore`] in tests; production
//! uses [`RedisStore`] over a pooled connection.

use async_trait::async_trait;
use redis::AsyncCommands;
use relayflow_common::config::RedisConfig;
use relayflow_common::{Error, Result};
use std::time::Duration;
use tracing::info;

/// Abstract key-value store interface
#[async_trait]
pub trait KvStore: Send + Sync {
    /// GET a counter value; missing keys read as `None`
    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    /// GET a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// SET a string value, optionally with a TTL
    async fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// INCR a counter. When the post-increment value is 1 and a TTL is
    /// given, the TTL is applied. Returns the post-increment value.
    async fn incr(&self, key: &str, ttl_on_first: Option<Duration>) -> Result<i64>;

    /// Remaining TTL of a key, `None` when the key is missing or has no
    /// expiry
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// DEL a single key
    async fn delete(&self, key: &str) -> Result<()>;

    /// DEL several keys in one pipelined call
    async fn delete_many(&self, keys: &[String]) -> Result<()>;

    /// SCAN for keys matching a glob pattern
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// LPUSH onto a list
    async fn lpush(&self, key: &str, value: &str) -> Result<()>;

    /// BRPOP from a list, returning `None` on timeout
    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>>;

    /// Round-trip connectivity check
    async fn ping(&self) -> Result<()>;
}

/// Redis-backed store
pub struct RedisStore {
    pool: deadpool_redis::Pool,
}

impl RedisStore {
    /// Connect and verify the connection with a PING
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let pool = deadpool_redis::Config::from_url(config.url())
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| Error::Kv(format!("Failed to build redis pool: {}", e)))?;

        let store = Self { pool };
        store.ping().await?;
        info!(addr = %config.addr, "Redis connection established");

        Ok(store)
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::Kv(format!("Redis pool error: {}", e)))
    }
}

fn kv_err(e: redis::RedisError) -> Error {
    Error::Kv(format!("Redis error: {}", e))
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        let mut conn = self.conn().await?;
        conn.get(key).await.map_err(kv_err)
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        conn.get(key).await.map_err(kv_err)
    }

    async fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn().await?;
        match ttl {
            Some(ttl) => conn.set_ex(key, value, ttl.as_secs()).await.map_err(kv_err),
            None => conn.set(key, value).await.map_err(kv_err),
        }
    }

    async fn incr(&self, key: &str, ttl_on_first: Option<Duration>) -> Result<i64> {
        let mut conn = self.conn().await?;
        let value: i64 = conn.incr(key, 1).await.map_err(kv_err)?;
        if value == 1 {
            if let Some(ttl) = ttl_on_first {
                conn.expire::<_, ()>(key, ttl.as_secs() as i64)
                    .await
                    .map_err(kv_err)?;
            }
        }
        Ok(value)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.conn().await?;
        let secs: i64 = conn.ttl(key).await.map_err(kv_err)?;
        // -2 means the key is missing, -1 means no expiry
        if secs >= 0 {
            Ok(Some(Duration::from_secs(secs as u64)))
        } else {
            Ok(None)
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.del(key).await.map_err(kv_err)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.del(key).ignore();
        }
        pipe.query_async::<()>(&mut conn).await.map_err(kv_err)
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(kv_err)?;

            keys.extend(batch);

            if next == 0 {
                return Ok(keys);
            }
            cursor = next;
        }
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.lpush(key, value).await.map_err(kv_err)
    }

    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        let reply: Option<(String, String)> = conn
            .brpop(key, timeout.as_secs_f64())
            .await
            .map_err(kv_err)?;
        Ok(reply.map(|(_, value)| value))
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(kv_err)?;
        Ok(())
    }
}

/// In-memory store used by tests
///
/// Implements the same contract as [`RedisStore`], including lazy key
/// expiry and the blocking list pop.
#[derive(Default)]
pub struct MemoryStore {
    inner: tokio::sync::Mutex<std::collections::HashMap<String, MemoryEntry>>,
    notify: tokio::sync::Notify,
}

struct MemoryEntry {
    value: MemoryValue,
    expires_at: Option<tokio::time::Instant>,
}

enum MemoryValue {
    Text(String),
    List(std::collections::VecDeque<String>),
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn purge(map: &mut std::collections::HashMap<String, MemoryEntry>) {
        let now = tokio::time::Instant::now();
        map.retain(|_, entry| entry.expires_at.map(|at| at > now).unwrap_or(true));
    }
}

/// Match a redis-style glob pattern (only `*` wildcards)
fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let mut pos = 0;
    let last = parts.len() - 1;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            if !key.starts_with(part) {
                return false;
            }
            pos = part.len();
        } else if i == last {
            return key.len() >= pos + part.len() && key[pos..].ends_with(part);
        } else {
            match key[pos..].find(part) {
                Some(idx) => pos += idx + part.len(),
                None => return false,
            }
        }
    }
    true
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        Ok(self
            .get_string(key)
            .await?
            .and_then(|v| v.parse::<i64>().ok()))
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let mut map = self.inner.lock().await;
        Self::purge(&mut map);
        match map.get(key) {
            Some(MemoryEntry {
                value: MemoryValue::Text(v),
                ..
            }) => Ok(Some(v.clone())),
            _ => Ok(None),
        }
    }

    async fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut map = self.inner.lock().await;
        map.insert(
            key.to_string(),
            MemoryEntry {
                value: MemoryValue::Text(value.to_string()),
                expires_at: ttl.map(|ttl| tokio::time::Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str, ttl_on_first: Option<Duration>) -> Result<i64> {
        let mut map = self.inner.lock().await;
        Self::purge(&mut map);

        let current = match map.get(key) {
            Some(MemoryEntry {
                value: MemoryValue::Text(v),
                ..
            }) => v.parse::<i64>().unwrap_or(0),
            _ => 0,
        };
        let next = current + 1;

        let expires_at = if next == 1 {
            ttl_on_first.map(|ttl| tokio::time::Instant::now() + ttl)
        } else {
            map.get(key).and_then(|e| e.expires_at)
        };

        map.insert(
            key.to_string(),
            MemoryEntry {
                value: MemoryValue::Text(next.to_string()),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut map = self.inner.lock().await;
        Self::purge(&mut map);
        Ok(map.get(key).and_then(|entry| {
            entry
                .expires_at
                .map(|at| at.saturating_duration_since(tokio::time::Instant::now()))
        }))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut map = self.inner.lock().await;
        map.remove(key);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<()> {
        let mut map = self.inner.lock().await;
        for key in keys {
            map.remove(key);
        }
        Ok(())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut map = self.inner.lock().await;
        Self::purge(&mut map);
        Ok(map
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.inner.lock().await;
        let entry = map.entry(key.to_string()).or_insert_with(|| MemoryEntry {
            value: MemoryValue::List(std::collections::VecDeque::new()),
            expires_at: None,
        });
        if let MemoryValue::List(list) = &mut entry.value {
            list.push_front(value.to_string());
        }
        drop(map);
        self.notify.notify_one();
        Ok(())
    }

    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut map = self.inner.lock().await;
                if let Some(MemoryEntry {
                    value: MemoryValue::List(list),
                    ..
                }) = map.get_mut(key)
                {
                    if let Some(value) = list.pop_back() {
                        return Ok(Some(value));
                    }
                }
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let _ = tokio::time::timeout_at(deadline, self.notify.notified()).await;
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_sets_ttl_only_on_first() {
        let store = MemoryStore::new();

        let first = store
            .incr("minute:1", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(first, 1);
        assert!(store.ttl("minute:1").await.unwrap().is_some());

        let second = store
            .incr("minute:1", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(second, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn counters_expire() {
        let store = MemoryStore::new();
        store
            .incr("minute:1", Some(Duration::from_secs(60)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(store.get_i64("minute:1").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn brpop_times_out_on_empty_list() {
        let store = MemoryStore::new();
        let popped = store
            .brpop("email_queue", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(popped, None);
    }

    #[tokio::test]
    async fn lpush_brpop_is_fifo() {
        let store = MemoryStore::new();
        store.lpush("email_queue", "first").await.unwrap();
        store.lpush("email_queue", "second").await.unwrap();

        let popped = store
            .brpop("email_queue", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(popped.as_deref(), Some("first"));

        let popped = store
            .brpop("email_queue", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(popped.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn scan_matches_glob_patterns() {
        let store = MemoryStore::new();
        store.incr("stats:sent:1:2030-01-02", None).await.unwrap();
        store.incr("stats:failed:1:2030-01-02", None).await.unwrap();
        store.incr("stats:sent:1:2030-01-01", None).await.unwrap();
        store.incr("daily:1:2030-01-02", None).await.unwrap();

        let mut keys = store.scan_keys("stats:*:*:2030-01-02").await.unwrap();
        keys.sort();
        assert_eq!(
            keys,
            vec!["stats:failed:1:2030-01-02", "stats:sent:1:2030-01-02"]
        );
    }

    #[tokio::test]
    async fn delete_many_removes_all_keys() {
        let store = MemoryStore::new();
        store.incr("minute:7", None).await.unwrap();
        store.incr("total:7", None).await.unwrap();

        store
            .delete_many(&["minute:7".to_string(), "total:7".to_string()])
            .await
            .unwrap();

        assert_eq!(store.get_i64("minute:7").await.unwrap(), None);
        assert_eq!(store.get_i64("total:7").await.unwrap(), None);
    }

    #[test]
    fn glob_matching() {
        assert!(glob_match("stats:*:*:2030-01-02", "stats:sent:9:2030-01-02"));
        assert!(!glob_match("stats:*:*:2030-01-02", "stats:sent:9:2030-01-03"));
        assert!(glob_match("apikey:*", "apikey:rf_abc123"));
        assert!(glob_match("minute:1", "minute:1"));
        assert!(!glob_match("minute:1", "minute:12"));
    }
}
