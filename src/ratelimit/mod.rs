// Fixed-window rate limiting behind an injected store so the limit can be
// backed by an atomic shared counter when running more than one instance.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::error::{AppError, Result};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied { retry_after_secs: u64 },
}

impl Decision {
    pub fn into_result(self) -> Result<()> {
        match self {
            Decision::Allowed => Ok(()),
            Decision::Denied { retry_after_secs } => {
                Err(AppError::RateLimited { retry_after_secs })
            }
        }
    }
}

/// A fixed-window request counter keyed by client identifier.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn check(&self, key: &str) -> Result<Decision>;
}

/// Entries beyond this trigger an opportunistic sweep of expired windows.
const CLEANUP_THRESHOLD: usize = 10_000;

struct WindowEntry {
    count: u64,
    window_reset: Instant,
}

/// In-memory store. Counters are process-local, which is fine for a single
/// instance and for tests; multi-instance deployments use the Redis store.
pub struct MemoryRateLimitStore {
    entries: Mutex<HashMap<String, WindowEntry>>,
    window: Duration,
    max_requests: u64,
}

impl MemoryRateLimitStore {
    pub fn new(window: Duration, max_requests: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            window,
            max_requests,
        }
    }

    fn check_at(&self, key: &str, now: Instant) -> Decision {
        let mut entries = self.entries.lock().unwrap();

        if entries.len() > CLEANUP_THRESHOLD {
            entries.retain(|_, e| e.window_reset > now);
        }

        match entries.get_mut(key) {
            Some(entry) if entry.window_reset > now => {
                if entry.count >= self.max_requests {
                    let retry_after_secs = entry
                        .window_reset
                        .saturating_duration_since(now)
                        .as_secs()
                        .max(1);
                    Decision::Denied { retry_after_secs }
                } else {
                    entry.count += 1;
                    Decision::Allowed
                }
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    WindowEntry {
                        count: 1,
                        window_reset: now + self.window,
                    },
                );
                Decision::Allowed
            }
        }
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn check(&self, key: &str) -> Result<Decision> {
        Ok(self.check_at(key, Instant::now()))
    }
}

/// Redis-backed store. INCR + EXPIRE keeps the counter atomic across
/// server instances.
pub struct RedisRateLimitStore {
    client: redis::Client,
    window_secs: u64,
    max_requests: u64,
}

impl RedisRateLimitStore {
    pub fn new(client: redis::Client, window_secs: u64, max_requests: u64) -> Self {
        Self {
            client,
            window_secs,
            max_requests,
        }
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn check(&self, key: &str) -> Result<Decision> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Redis connection failed: {}", e)))?;

        let redis_key = format!("ratelimit:{}", key);
        let count: u64 = conn
            .incr(&redis_key, 1u64)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Rate limit INCR failed: {}", e)))?;

        if count == 1 {
            conn.expire::<_, ()>(&redis_key, self.window_secs as i64)
                .await
                .map_err(|e| AppError::Internal(anyhow::anyhow!("Rate limit EXPIRE failed: {}", e)))?;
        }

        if count > self.max_requests {
            let ttl: i64 = conn
                .ttl(&redis_key)
                .await
                .map_err(|e| AppError::Internal(anyhow::anyhow!("Rate limit TTL failed: {}", e)))?;
            Ok(Decision::Denied {
                retry_after_secs: ttl.max(1) as u64,
            })
        } else {
            Ok(Decision::Allowed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_the_61st_request_in_the_window() {
        let store = MemoryRateLimitStore::new(Duration::from_millis(60_000), 60);
        let now = Instant::now();

        for _ in 0..60 {
            assert_eq!(store.check_at("1.2.3.4", now), Decision::Allowed);
        }
        assert!(matches!(
            store.check_at("1.2.3.4", now),
            Decision::Denied { .. }
        ));
    }

    #[test]
    fn resets_after_the_window_elapses() {
        let store = MemoryRateLimitStore::new(Duration::from_millis(60_000), 60);
        let now = Instant::now();

        for _ in 0..60 {
            store.check_at("key", now);
        }
        assert!(matches!(store.check_at("key", now), Decision::Denied { .. }));

        let later = now + Duration::from_millis(60_001);
        assert_eq!(store.check_at("key", later), Decision::Allowed);
    }

    #[test]
    fn keys_are_counted_independently() {
        let store = MemoryRateLimitStore::new(Duration::from_secs(60), 1);
        let now = Instant::now();

        assert_eq!(store.check_at("a", now), Decision::Allowed);
        assert_eq!(store.check_at("b", now), Decision::Allowed);
        assert!(matches!(store.check_at("a", now), Decision::Denied { .. }));
    }

    #[test]
    fn sweeps_expired_entries_past_the_threshold() {
        let store = MemoryRateLimitStore::new(Duration::from_millis(10), 5);
        let now = Instant::now();

        for i in 0..=CLEANUP_THRESHOLD {
            store.check_at(&format!("key-{}", i), now);
        }

        let later = now + Duration::from_millis(11);
        store.check_at("fresh", later);

        let entries = store.entries.lock().unwrap();
        assert!(entries.len() < CLEANUP_THRESHOLD);
    }
}
