use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{Client, ConnectionInfo, IntoConnectionInfo, RedisError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// Shared Redis connection manager guarded by a Tokio mutex.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

/// Default per-command deadline.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(500);

const TIMEOUT_MESSAGE: &str = "redis command timed out";

/// Redis connection pool.
///
/// `ConnectionManager` multiplexes and reconnects on its own; callers clone it
/// out of the mutex and issue commands on the clone.
pub struct RedisPool {
    manager: SharedConnectionManager,
    command_timeout: Duration,
}

impl RedisPool {
    pub async fn connect(redis_url: &str, command_timeout: Duration) -> Result<Self> {
        let info: ConnectionInfo = redis_url
            .into_connection_info()
            .context("failed to parse REDIS_URL connection string")?;
        let client = Client::open(info).context("failed to construct Redis client")?;
        let connection_manager = ConnectionManager::new(client)
            .await
            .context("failed to initialize Redis connection manager")?;

        info!(timeout_ms = command_timeout.as_millis() as u64, "Redis connection manager ready");

        Ok(Self {
            manager: Arc::new(Mutex::new(connection_manager)),
            command_timeout,
        })
    }

    pub fn manager(&self) -> SharedConnectionManager {
        self.manager.clone()
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Round-trip a PING within the command deadline.
    pub async fn ping(&self) -> Result<(), RedisError> {
        let mut conn = self.manager.lock().await.clone();
        let reply: String = with_timeout(
            self.command_timeout,
            redis::cmd("PING").query_async(&mut conn),
        )
        .await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(RedisError::from((
                redis::ErrorKind::ResponseError,
                "unexpected PING reply",
            )))
        }
    }
}

/// Run a Redis future under a deadline.
///
/// An elapsed deadline becomes an `IoError`, the same kind a dropped
/// connection produces, so callers treat both as "store unavailable".
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, RedisError>
where
    F: Future<Output = Result<T, RedisError>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(res) => res,
        Err(_) => Err(RedisError::from((redis::ErrorKind::IoError, TIMEOUT_MESSAGE))),
    }
}

/// True when the error came from an elapsed `with_timeout` deadline.
pub fn is_timeout(err: &RedisError) -> bool {
    err.kind() == redis::ErrorKind::IoError && err.to_string().contains(TIMEOUT_MESSAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let ok: Result<i64, RedisError> =
            with_timeout(Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err: Result<i64, RedisError> = with_timeout(Duration::from_secs(1), async {
            Err(RedisError::from((redis::ErrorKind::TypeError, "bad type")))
        })
        .await;
        let err = err.unwrap_err();
        assert_eq!(err.kind(), redis::ErrorKind::TypeError);
        assert!(!is_timeout(&err));
    }

    #[tokio::test]
    async fn test_with_timeout_elapsed_is_io_error() {
        let result: Result<(), RedisError> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), redis::ErrorKind::IoError);
        assert!(is_timeout(&err));
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let result = RedisPool::connect("definitely not a url", DEFAULT_COMMAND_TIMEOUT).await;
        assert!(result.is_err());
    }
}
