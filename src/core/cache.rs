//! Shared TTL cache used for rate counters and block flags.
//!
//! Counters are incremented atomically by the backend, so concurrent
//! requests for the same identity cannot race past the limit on a
//! read-modify-write.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use redis::{Client, Commands, Connection};
use tokio::sync::Mutex;

use crate::utils::GuardResult;

/// Trait for TTL key-value cache backends
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Cache: Send + Sync {
    /// Atomically increment a counter, creating it at 1 if absent.
    /// Returns the new value.
    async fn incr(&self, key: &str) -> GuardResult<u64>;

    /// Read a counter without modifying it
    async fn get(&self, key: &str) -> GuardResult<Option<u64>>;

    /// Set the remaining lifetime of a key in seconds
    async fn expire(&self, key: &str, ttl_seconds: u64) -> GuardResult<()>;

    /// Remaining lifetime of a key in seconds, None if the key is absent
    /// or has no expiry
    async fn ttl(&self, key: &str) -> GuardResult<Option<u64>>;

    /// Set a presence flag that expires after the given TTL
    async fn set_flag(&self, key: &str, ttl_seconds: u64) -> GuardResult<()>;

    /// Check whether a presence flag is currently set
    async fn flag_exists(&self, key: &str) -> GuardResult<bool>;

    /// Remove a key
    async fn delete(&self, key: &str) -> GuardResult<()>;
}

/// Redis-backed cache for distributed deployments
pub struct RedisCache {
    /// Redis connection
    redis_conn: Mutex<Connection>,
}

impl RedisCache {
    /// Create a new Redis cache instance
    pub fn new(redis_url: &str) -> GuardResult<Self> {
        let redis_client = Client::open(redis_url)?;
        let redis_conn = redis_client.get_connection()?;

        Ok(Self {
            redis_conn: Mutex::new(redis_conn),
        })
    }
}

#[async_trait::async_trait]
impl Cache for RedisCache {
    async fn incr(&self, key: &str) -> GuardResult<u64> {
        let mut conn = self.redis_conn.lock().await;
        let count: u64 = conn.incr(key, 1)?;
        Ok(count)
    }

    async fn get(&self, key: &str) -> GuardResult<Option<u64>> {
        let mut conn = self.redis_conn.lock().await;
        let value: Option<u64> = conn.get(key)?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> GuardResult<()> {
        let mut conn = self.redis_conn.lock().await;
        let _: () = conn.expire(key, ttl_seconds as usize)?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> GuardResult<Option<u64>> {
        let mut conn = self.redis_conn.lock().await;
        let ttl: i64 = conn.ttl(key)?;
        // Redis returns -1 for no expiry and -2 for a missing key
        Ok(if ttl > 0 { Some(ttl as u64) } else { None })
    }

    async fn set_flag(&self, key: &str, ttl_seconds: u64) -> GuardResult<()> {
        let mut conn = self.redis_conn.lock().await;
        let _: () = conn.set_ex(key, 1_u8, ttl_seconds as usize)?;
        Ok(())
    }

    async fn flag_exists(&self, key: &str) -> GuardResult<bool> {
        let mut conn = self.redis_conn.lock().await;
        let exists: bool = conn.exists(key)?;
        Ok(exists)
    }

    async fn delete(&self, key: &str) -> GuardResult<()> {
        let mut conn = self.redis_conn.lock().await;
        let _: () = conn.del(key)?;
        Ok(())
    }
}

#[derive(Debug)]
struct MemoryEntry {
    value: u64,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }
}

/// In-memory cache for single-node deployments and tests
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    /// Create a new in-memory cache instance
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Cache for MemoryCache {
    async fn incr(&self, key: &str) -> GuardResult<u64> {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_insert(MemoryEntry {
            value: 0,
            expires_at: None,
        });
        if entry.is_expired() {
            entry.value = 0;
            entry.expires_at = None;
        }
        entry.value += 1;
        Ok(entry.value)
    }

    async fn get(&self, key: &str) -> GuardResult<Option<u64>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value))
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> GuardResult<()> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            if !entry.is_expired() {
                entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_seconds));
            }
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> GuardResult<Option<u64>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .and_then(|entry| entry.expires_at)
            .map(|deadline| deadline.saturating_duration_since(Instant::now()).as_secs()))
    }

    async fn set_flag(&self, key: &str, ttl_seconds: u64) -> GuardResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: 1,
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_seconds)),
            },
        );
        Ok(())
    }

    async fn flag_exists(&self, key: &str) -> GuardResult<bool> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false))
    }

    async fn delete(&self, key: &str) -> GuardResult<()> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_incr_creates_and_increments() {
        let cache = MemoryCache::new();
        assert_eq!(cache.incr("counter").await.unwrap(), 1);
        assert_eq!(cache.incr("counter").await.unwrap(), 2);
        assert_eq!(cache.get("counter").await.unwrap(), Some(2));
        assert_eq!(cache.get("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_counter_restarts() {
        let cache = MemoryCache::new();
        cache.incr("counter").await.unwrap();
        cache.expire("counter", 1).await.unwrap();
        assert!(cache.ttl("counter").await.unwrap().is_some());

        sleep(Duration::from_millis(1100)).await;

        assert_eq!(cache.get("counter").await.unwrap(), None);
        assert_eq!(cache.incr("counter").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_flag_lifecycle() {
        let cache = MemoryCache::new();
        assert!(!cache.flag_exists("blocked").await.unwrap());

        cache.set_flag("blocked", 60).await.unwrap();
        assert!(cache.flag_exists("blocked").await.unwrap());
        let ttl = cache.ttl("blocked").await.unwrap().unwrap();
        assert!(ttl <= 60);

        cache.delete("blocked").await.unwrap();
        assert!(!cache.flag_exists("blocked").await.unwrap());
    }

    #[tokio::test]
    async fn test_flag_expires() {
        let cache = MemoryCache::new();
        cache.set_flag("blocked", 1).await.unwrap();
        sleep(Duration::from_millis(1100)).await;
        assert!(!cache.flag_exists("blocked").await.unwrap());
    }
}
