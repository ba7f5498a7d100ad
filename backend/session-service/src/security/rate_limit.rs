/// Distributed fixed-window rate limiting
///
/// Each `(client, route)` pair gets a counter that is incremented atomically
/// and expires one window after its first hit. Counters live in a shared store
/// (Redis in production) so every instance enforces the same limit.
///
/// ## Failure policy
///
/// The limiter fails open: if the store errors or misses its deadline the
/// request is allowed and the decision is flagged `degraded`.
use crate::error::{Result, SessionError};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use redis_utils::SharedConnectionManager;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const RATE_LIMIT_KEY_PREFIX: &str = "ratelimit";

/// INCR, set the window on the first hit, and repair a key that lost its TTL.
/// Returns `{count, pttl_ms}`.
const INCREMENT_SCRIPT: &str = r#"
local current = redis.call('INCR', KEYS[1])
if current == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('PTTL', KEYS[1])
if ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {current, ttl}
"#;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u64,
    pub window: Duration,
    /// Deadline for one store round-trip
    pub store_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            store_timeout: Duration::from_millis(100),
        }
    }
}

/// Outcome of one rate-limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Time until the current window closes
    pub reset_after: Duration,
    /// Set only when rejected
    pub retry_after: Option<Duration>,
    /// The store could not be consulted and the request was let through
    pub degraded: bool,
}

impl RateLimitDecision {
    /// Window end as Unix seconds (for `X-RateLimit-Reset`)
    pub fn reset_at(&self) -> i64 {
        Utc::now().timestamp() + self.reset_after.as_secs_f64().ceil() as i64
    }

    /// `Retry-After` seconds, never zero for a rejection
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after
            .map(|d| d.as_secs_f64().ceil().max(1.0) as u64)
            .unwrap_or(0)
    }

    pub fn to_error(&self) -> SessionError {
        SessionError::RateLimited {
            retry_after_secs: self.retry_after_secs(),
            limit: self.limit,
            reset_at: self.reset_at(),
        }
    }
}

/// Atomic counter with window expiry
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key`, starting a `window` expiry on the first increment.
    /// Returns the new count and the time left in the window.
    async fn increment(&self, key: &str, window: Duration) -> Result<(u64, Duration)>;
}

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count one request from `client` against `route`
    pub async fn check(&self, client: &str, route: &str) -> RateLimitDecision {
        let key = format!("{}:{}:{}", RATE_LIMIT_KEY_PREFIX, client, route);
        self.check_key(&key).await
    }

    /// Count one hit against an arbitrary counter key
    pub async fn check_key(&self, key: &str) -> RateLimitDecision {
        let limit = self.config.max_requests;
        let outcome = tokio::time::timeout(
            self.config.store_timeout,
            self.store.increment(key, self.config.window),
        )
        .await;

        let (count, ttl) = match outcome {
            Ok(Ok(counted)) => counted,
            Ok(Err(e)) => {
                warn!(error = %e, "rate limiter degraded, allowing request");
                return self.degraded();
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.store_timeout.as_millis() as u64,
                    "rate limiter degraded, store timed out"
                );
                return self.degraded();
            }
        };

        let reset_after = ttl.min(self.config.window);
        if count > limit {
            debug!(count, limit, "rate limit exceeded");
            RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_after,
                retry_after: Some(reset_after),
                degraded: false,
            }
        } else {
            RateLimitDecision {
                allowed: true,
                limit,
                remaining: limit - count,
                reset_after,
                retry_after: None,
                degraded: false,
            }
        }
    }

    fn degraded(&self) -> RateLimitDecision {
        RateLimitDecision {
            allowed: true,
            limit: self.config.max_requests,
            remaining: self.config.max_requests,
            reset_after: self.config.window,
            retry_after: None,
            degraded: true,
        }
    }
}

/// Redis-backed counters; one Lua script call per check
pub struct RedisCounterStore {
    redis: SharedConnectionManager,
    script: redis::Script,
    command_timeout: Duration,
}

impl RedisCounterStore {
    pub fn new(redis: SharedConnectionManager, command_timeout: Duration) -> Self {
        Self {
            redis,
            script: redis::Script::new(INCREMENT_SCRIPT),
            command_timeout,
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<(u64, Duration)> {
        let window_ms = window.as_millis().max(1) as u64;
        let mut redis_conn = self.redis.lock().await.clone();

        let (count, ttl_ms): (i64, i64) = redis_utils::with_timeout(
            self.command_timeout,
            self.script
                .key(key)
                .arg(window_ms)
                .invoke_async::<_, (i64, i64)>(&mut redis_conn),
        )
        .await?;

        Ok((count.max(0) as u64, Duration::from_millis(ttl_ms.max(0) as u64)))
    }
}

/// Sweep the memory store for closed windows once per this many increments
const MEMORY_SWEEP_INTERVAL: u64 = 1_024;

/// Process-local counters for tests and single-node development
#[derive(Default)]
pub struct MemoryCounterStore {
    windows: DashMap<String, (u64, Instant)>,
    increments: AtomicU64,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every counter whose window has closed; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, (_, expires_at)| *expires_at > now);
        before.saturating_sub(self.windows.len())
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window: Duration) -> Result<(u64, Duration)> {
        // Runs before the entry guard below is taken; `retain` locks every shard.
        if self.increments.fetch_add(1, Ordering::Relaxed) % MEMORY_SWEEP_INTERVAL
            == MEMORY_SWEEP_INTERVAL - 1
        {
            let purged = self.purge_expired();
            if purged > 0 {
                debug!(purged, "Evicted closed rate-limit windows");
            }
        }

        let now = Instant::now();
        // The entry guard holds the shard lock, so check-and-increment is atomic.
        let mut entry = self.windows.entry(key.to_string()).or_insert((0, now + window));
        if entry.1 <= now {
            *entry = (0, now + window);
        }
        entry.0 += 1;
        Ok((entry.0, entry.1.saturating_duration_since(now)))
    }
}
