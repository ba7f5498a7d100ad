/// Access token revocation (blacklist)
///
/// Handles immediate invalidation of access tokens before their `exp`, e.g. on
/// logout. Entries expire with the token they revoke, so the list never grows
/// past the set of still-valid revoked tokens.
///
/// ## Security
///
/// - Keys hold the SHA-256 of the token; a Redis dump leaks no usable token
/// - `check` fails open: during a store outage a revoked token keeps working
///   until it expires on its own. The exposure is bounded by the access token TTL.
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use crypto_core::sha256_hex;
use dashmap::DashMap;
use redis_utils::SharedConnectionManager;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const REVOKED_TOKEN_KEY_PREFIX: &str = "session:revoked:token";

fn revocation_key(token: &str) -> String {
    format!("{}:{}", REVOKED_TOKEN_KEY_PREFIX, sha256_hex(token))
}

/// Expiring key/flag storage for revocation markers
#[async_trait]
pub trait RevocationStore: Send + Sync {
    async fn set(&self, key: &str, ttl: Duration) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn delete(&self, key: &str) -> Result<()>;
}

pub struct Blacklist {
    store: Arc<dyn RevocationStore>,
}

impl Blacklist {
    pub fn new(store: Arc<dyn RevocationStore>) -> Self {
        Self { store }
    }

    /// Revoke `token` for `ttl`. A zero TTL is a no-op: the token is already past expiry.
    pub async fn add(&self, token: &str, ttl: Duration) -> Result<()> {
        if ttl.is_zero() {
            debug!("Skipping revocation of an already expired token");
            return Ok(());
        }

        self.store.set(&revocation_key(token), ttl).await?;
        info!(
            ttl_secs = ttl.as_secs(),
            "Token revoked, blacklist entry will expire with the token"
        );
        Ok(())
    }

    /// Revoke `token` until its `exp` (Unix seconds)
    ///
    /// A token still verifies during the second `exp` names, so the marker
    /// outlives `exp` by one second.
    pub async fn add_until(&self, token: &str, expires_at_secs: i64) -> Result<()> {
        let remaining = (expires_at_secs - Utc::now().timestamp() + 1).max(0) as u64;
        self.add(token, Duration::from_secs(remaining)).await
    }

    /// True if `token` is revoked. Store failures are logged and read as "not revoked".
    pub async fn check(&self, token: &str) -> bool {
        match self.store.exists(&revocation_key(token)).await {
            Ok(revoked) => revoked,
            Err(e) => {
                warn!(error = %e, "Revocation check degraded, treating token as not revoked");
                false
            }
        }
    }

    /// Lift a revocation
    pub async fn remove(&self, token: &str) -> Result<()> {
        self.store.delete(&revocation_key(token)).await
    }
}

pub struct RedisRevocationStore {
    redis: SharedConnectionManager,
    command_timeout: Duration,
}

impl RedisRevocationStore {
    pub fn new(redis: SharedConnectionManager, command_timeout: Duration) -> Self {
        Self {
            redis,
            command_timeout,
        }
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn set(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut redis_conn = self.redis.lock().await.clone();
        redis_utils::with_timeout(
            self.command_timeout,
            redis::cmd("SET")
                .arg(key)
                .arg("1")
                .arg("EX")
                .arg(ttl.as_secs().max(1))
                .query_async::<_, ()>(&mut redis_conn),
        )
        .await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut redis_conn = self.redis.lock().await.clone();
        let exists: bool = redis_utils::with_timeout(
            self.command_timeout,
            redis::cmd("EXISTS").arg(key).query_async(&mut redis_conn),
        )
        .await?;
        Ok(exists)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut redis_conn = self.redis.lock().await.clone();
        redis_utils::with_timeout(
            self.command_timeout,
            redis::cmd("DEL").arg(key).query_async::<_, ()>(&mut redis_conn),
        )
        .await?;
        Ok(())
    }
}

/// Process-local revocation markers for tests and single-node development
#[derive(Default)]
pub struct MemoryRevocationStore {
    entries: DashMap<String, Instant>,
}

impl MemoryRevocationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevocationStore for MemoryRevocationStore {
    async fn set(&self, key: &str, ttl: Duration) -> Result<()> {
        self.entries.insert(key.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let live = self
            .entries
            .get(key)
            .map(|expires_at| *expires_at > now)
            .unwrap_or(false);
        if !live {
            self.entries.remove_if(key, |_, expires_at| *expires_at <= now);
        }
        Ok(live)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}
