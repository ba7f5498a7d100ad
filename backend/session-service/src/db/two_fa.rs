use super::with_deadline;
use crate::error::Result;
use crate::models::TwoFactorConfig;
use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

/// Email is the only second factor
pub const EMAIL_METHOD: &str = "email";

#[async_trait]
pub trait TwoFactorRepository: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<TwoFactorConfig>>;

    /// Upsert the enabled flag
    async fn set_enabled(&self, user_id: Uuid, enabled: bool) -> Result<TwoFactorConfig>;
}

#[derive(Clone)]
pub struct PgTwoFactorRepository {
    pool: PgPool,
    deadline: Duration,
}

impl PgTwoFactorRepository {
    pub fn new(pool: PgPool, deadline: Duration) -> Self {
        Self { pool, deadline }
    }
}

#[async_trait]
impl TwoFactorRepository for PgTwoFactorRepository {
    async fn get(&self, user_id: Uuid) -> Result<Option<TwoFactorConfig>> {
        with_deadline(
            self.deadline,
            sqlx::query_as::<_, TwoFactorConfig>(
                "SELECT user_id, method, enabled, updated_at FROM two_fa_configs WHERE user_id = $1",
            )
            .bind(user_id)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn set_enabled(&self, user_id: Uuid, enabled: bool) -> Result<TwoFactorConfig> {
        with_deadline(
            self.deadline,
            sqlx::query_as::<_, TwoFactorConfig>(
                r#"
                INSERT INTO two_fa_configs (user_id, method, enabled, updated_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (user_id)
                DO UPDATE SET enabled = EXCLUDED.enabled, updated_at = NOW()
                RETURNING user_id, method, enabled, updated_at
                "#,
            )
            .bind(user_id)
            .bind(EMAIL_METHOD)
            .bind(enabled)
            .fetch_one(&self.pool),
        )
        .await
    }
}
