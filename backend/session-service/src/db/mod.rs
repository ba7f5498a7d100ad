/// Database access for the session service
///
/// Each table sits behind an `async_trait` repository so the services can run
/// against PostgreSQL in production and `memory::MemoryDatabase` in tests.
pub mod memory;
pub mod otp_codes;
pub mod refresh_tokens;
pub mod two_fa;
pub mod users;

pub use otp_codes::{OtpRepository, PgOtpRepository};
pub use refresh_tokens::{PgRefreshTokenRepository, RefreshTokenRepository};
pub use two_fa::{PgTwoFactorRepository, TwoFactorRepository};
pub use users::{PgUserRepository, UserRepository};

use crate::config::DatabaseSettings;
use crate::error::{Result, SessionError};
use anyhow::Context;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Create the connection pool. `acquire_timeout` bounds how long a request
/// waits for a connection before the store is reported unavailable.
pub async fn create_pool(settings: &DatabaseSettings) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout))
        .idle_timeout(Duration::from_secs(600))
        .connect(&settings.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    info!(
        max_connections = settings.max_connections,
        "Database pool created"
    );
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    Ok(())
}

/// Run a database future under a deadline.
///
/// An elapsed deadline is `StoreUnavailable`; dropping the future rolls back
/// any open transaction inside it.
pub async fn with_deadline<F, T>(deadline: Duration, future: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(deadline, future).await {
        Ok(result) => result.map_err(SessionError::from),
        Err(_) => {
            warn!(
                deadline_ms = deadline.as_millis() as u64,
                "Database deadline exceeded"
            );
            Err(SessionError::StoreUnavailable(
                "database deadline exceeded".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_deadline_elapsed_is_store_unavailable() {
        let result: Result<()> = with_deadline(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(SessionError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_with_deadline_maps_pool_timeout() {
        let result: Result<()> = with_deadline(Duration::from_secs(1), async {
            Err(sqlx::Error::PoolTimedOut)
        })
        .await;

        assert!(matches!(result, Err(SessionError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_with_deadline_passes_value_through() {
        let result = with_deadline(Duration::from_secs(1), async { Ok(5u64) }).await;
        assert_eq!(result.unwrap(), 5);
    }
}
