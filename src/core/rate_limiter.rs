use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::core::cache::Cache;
use crate::utils::{log_rate_limit, GuardError, GuardResult};

/// A parsed rate specification: maximum request count per window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSpec {
    /// Maximum number of requests allowed within one window
    pub limit: u32,
    /// Window length in seconds
    pub window_seconds: u64,
}

impl FromStr for RateSpec {
    type Err = GuardError;

    /// Parse a rate string like "5/m" or "100/hour" into a RateSpec
    fn from_str(rate: &str) -> Result<Self, Self::Err> {
        let (count, unit) = rate
            .split_once('/')
            .ok_or_else(|| GuardError::InvalidRate(format!("expected <count>/<unit>: {}", rate)))?;

        let limit: u32 = count
            .trim()
            .parse()
            .map_err(|_| GuardError::InvalidRate(format!("invalid count: {}", rate)))?;
        if limit == 0 {
            return Err(GuardError::InvalidRate(format!(
                "count must be positive: {}",
                rate
            )));
        }

        let window_seconds = match unit.trim() {
            "s" | "second" | "seconds" => 1,
            "m" | "minute" | "minutes" => 60,
            "h" | "hour" | "hours" => 3600,
            "d" | "day" | "days" => 86400,
            other => {
                return Err(GuardError::InvalidRate(format!(
                    "unknown unit '{}' (expected s, m, h or d)",
                    other
                )))
            }
        };

        Ok(Self {
            limit,
            window_seconds,
        })
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Requests remaining in the current window
    pub remaining: u32,
    /// Seconds until the window resets, or until the block expires when denied
    pub reset_seconds: u64,
}

/// Read-only rate limit state for an identity
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    /// Client identity the status refers to
    pub identity: String,
    /// Current request count in the window
    pub count: u64,
    /// Maximum allowed requests per window
    pub limit: u32,
    /// Remaining requests in the window
    pub remaining: u32,
    /// Seconds until the counter resets, if a window is active
    pub reset_seconds: Option<u64>,
    /// Whether the identity is currently blocked
    pub blocked: bool,
}

/// Cache-backed rate limiter with temporary block-on-exceed.
///
/// One instance covers one named limit; construct the instances at startup
/// and share them by reference with the request handlers.
pub struct RateLimiter {
    /// Name of this limit, used in cache keys and logs
    name: String,
    /// Parsed rate specification
    spec: RateSpec,
    /// Block duration applied once the limit is exceeded, in seconds
    block_seconds: u64,
    /// Shared cache holding counters and block flags
    cache: Arc<dyn Cache>,
}

impl RateLimiter {
    /// Create a new rate limiter for a named limit
    pub fn new(name: &str, spec: RateSpec, block_seconds: u64, cache: Arc<dyn Cache>) -> Self {
        Self {
            name: name.to_string(),
            spec,
            block_seconds,
            cache,
        }
    }

    /// Name of this limit
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum requests allowed per window
    pub fn limit(&self) -> u32 {
        self.spec.limit
    }

    fn counter_key(&self, identity: &str) -> String {
        format!("ratelimit:{}:{}", self.name, identity)
    }

    fn block_key(&self, identity: &str) -> String {
        format!("ratelimit:blocked:{}:{}", self.name, identity)
    }

    /// Check whether a request from this identity is within the rate limit.
    ///
    /// Never fails: if the cache is unreachable the limiter logs a warning
    /// and allows the request. Rate limiting is a defense-in-depth control,
    /// so availability wins over strict quota enforcement here.
    pub async fn check(&self, identity: &str) -> RateLimitDecision {
        match self.try_check(identity).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(
                    limit = %self.name,
                    identity = %identity,
                    error = %e,
                    "Cache unavailable, allowing request"
                );
                RateLimitDecision {
                    allowed: true,
                    remaining: self.spec.limit,
                    reset_seconds: self.spec.window_seconds,
                }
            }
        }
    }

    async fn try_check(&self, identity: &str) -> GuardResult<RateLimitDecision> {
        // A block flag short-circuits everything: the counter is not touched
        // until the flag's TTL expires, so intermediate window resets cannot
        // lift the block early.
        if self.cache.flag_exists(&self.block_key(identity)).await? {
            let reset = self
                .cache
                .ttl(&self.block_key(identity))
                .await?
                .unwrap_or(self.block_seconds);
            log_rate_limit(&self.name, identity, false);
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_seconds: reset,
            });
        }

        let counter_key = self.counter_key(identity);
        let count = self.cache.incr(&counter_key).await?;

        // First request in a window: the key's TTL is the window reset.
        // Expiry is handled by the cache itself, not by explicit reset code.
        if count == 1 {
            self.cache
                .expire(&counter_key, self.spec.window_seconds)
                .await?;
        }

        if count > self.spec.limit as u64 {
            self.cache
                .set_flag(&self.block_key(identity), self.block_seconds)
                .await?;
            log_rate_limit(&self.name, identity, false);
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_seconds: self.block_seconds,
            });
        }

        let reset = self
            .cache
            .ttl(&counter_key)
            .await?
            .unwrap_or(self.spec.window_seconds);
        log_rate_limit(&self.name, identity, true);
        Ok(RateLimitDecision {
            allowed: true,
            remaining: self.spec.limit - count as u32,
            reset_seconds: reset,
        })
    }

    /// Reset counter and block flag for an identity
    /// (useful for tests or manual intervention)
    pub async fn reset(&self, identity: &str) -> GuardResult<()> {
        self.cache.delete(&self.counter_key(identity)).await?;
        self.cache.delete(&self.block_key(identity)).await?;
        Ok(())
    }

    /// Get the current rate limit state for an identity without counting
    /// a request
    pub async fn status(&self, identity: &str) -> GuardResult<RateLimitStatus> {
        let blocked = self.cache.flag_exists(&self.block_key(identity)).await?;
        let count = self
            .cache
            .get(&self.counter_key(identity))
            .await?
            .unwrap_or(0);
        let reset_seconds = if blocked {
            self.cache.ttl(&self.block_key(identity)).await?
        } else {
            self.cache.ttl(&self.counter_key(identity)).await?
        };

        let remaining = if blocked || count >= self.spec.limit as u64 {
            0
        } else {
            self.spec.limit - count as u32
        };

        Ok(RateLimitStatus {
            identity: identity.to_string(),
            count,
            limit: self.spec.limit,
            remaining,
            reset_seconds,
            blocked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::{MemoryCache, MockCache};

    #[test]
    fn test_rate_spec_short_units() {
        assert_eq!(
            "5/m".parse::<RateSpec>().unwrap(),
            RateSpec {
                limit: 5,
                window_seconds: 60
            }
        );
        assert_eq!("1/s".parse::<RateSpec>().unwrap().window_seconds, 1);
        assert_eq!("100/h".parse::<RateSpec>().unwrap().window_seconds, 3600);
        assert_eq!("1000/d".parse::<RateSpec>().unwrap().window_seconds, 86400);
    }

    #[test]
    fn test_rate_spec_full_units() {
        assert_eq!("5/minute".parse::<RateSpec>().unwrap().window_seconds, 60);
        assert_eq!("2/hours".parse::<RateSpec>().unwrap().window_seconds, 3600);
        assert_eq!(" 10 / day ".parse::<RateSpec>().unwrap().limit, 10);
    }

    #[test]
    fn test_rate_spec_rejects_garbage() {
        assert!("".parse::<RateSpec>().is_err());
        assert!("5".parse::<RateSpec>().is_err());
        assert!("x/m".parse::<RateSpec>().is_err());
        assert!("0/m".parse::<RateSpec>().is_err());
        assert!("5/w".parse::<RateSpec>().is_err());
    }

    #[tokio::test]
    async fn test_counts_down_and_blocks() {
        let cache = Arc::new(MemoryCache::new());
        let limiter = RateLimiter::new("login", "3/m".parse().unwrap(), 300, cache);

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check("203.0.113.7").await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let decision = limiter.check("203.0.113.7").await;
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_seconds, 300);

        // A different identity is unaffected
        assert!(limiter.check("203.0.113.8").await.allowed);
    }

    #[tokio::test]
    async fn test_status_does_not_count() {
        let cache = Arc::new(MemoryCache::new());
        let limiter = RateLimiter::new("api", "5/m".parse().unwrap(), 60, cache);

        limiter.check("198.51.100.1").await;
        let status = limiter.status("198.51.100.1").await.unwrap();
        assert_eq!(status.count, 1);
        assert_eq!(status.remaining, 4);
        assert!(!status.blocked);

        // status() itself did not consume a request
        let status = limiter.status("198.51.100.1").await.unwrap();
        assert_eq!(status.count, 1);
    }

    #[tokio::test]
    async fn test_fails_open_when_cache_is_down() {
        let mut cache = MockCache::new();
        cache.expect_flag_exists().returning(|_| {
            Err(GuardError::Internal("connection refused".to_string()))
        });

        let limiter = RateLimiter::new("api", "5/m".parse().unwrap(), 60, Arc::new(cache));
        let decision = limiter.check("203.0.113.9").await;
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_reset_clears_block() {
        let cache = Arc::new(MemoryCache::new());
        let limiter = RateLimiter::new("login", "1/m".parse().unwrap(), 300, cache);

        assert!(limiter.check("192.0.2.1").await.allowed);
        assert!(!limiter.check("192.0.2.1").await.allowed);

        limiter.reset("192.0.2.1").await.unwrap();
        assert!(limiter.check("192.0.2.1").await.allowed);
    }
}
