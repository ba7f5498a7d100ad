/// Refresh token persistence
///
/// Rows are keyed by `token_hash` (SHA-256 of the opaque value). Rotation is a
/// single transaction that deletes the presented row and inserts its successor;
/// the `DELETE ... RETURNING` is the serialization point, so of two concurrent
/// rotations exactly one observes the row.
use super::with_deadline;
use crate::error::Result;
use crate::models::RefreshToken;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn insert(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken>;

    /// Live row only: not revoked and not expired
    async fn find_live(&self, token_hash: &str) -> Result<Option<RefreshToken>>;

    /// Returns false when no row matched
    async fn delete(&self, token_hash: &str) -> Result<bool>;

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64>;

    /// Atomically consume `old_hash` and store `new_hash` for the same user.
    /// `None` means the old value was unknown, expired, revoked or already consumed.
    async fn rotate(
        &self,
        old_hash: &str,
        new_hash: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>>;

    async fn delete_expired(&self) -> Result<u64>;
}

#[derive(Clone)]
pub struct PgRefreshTokenRepository {
    pool: PgPool,
    deadline: Duration,
}

impl PgRefreshTokenRepository {
    pub fn new(pool: PgPool, deadline: Duration) -> Self {
        Self { pool, deadline }
    }
}

#[async_trait]
impl RefreshTokenRepository for PgRefreshTokenRepository {
    async fn insert(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken> {
        with_deadline(
            self.deadline,
            sqlx::query_as::<_, RefreshToken>(
                r#"
                INSERT INTO refresh_tokens (id, user_id, token_hash, created_at, expires_at, revoked)
                VALUES ($1, $2, $3, NOW(), $4, FALSE)
                RETURNING id, user_id, token_hash, created_at, expires_at, revoked
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(token_hash)
            .bind(expires_at)
            .fetch_one(&self.pool),
        )
        .await
    }

    async fn find_live(&self, token_hash: &str) -> Result<Option<RefreshToken>> {
        with_deadline(
            self.deadline,
            sqlx::query_as::<_, RefreshToken>(
                r#"
                SELECT id, user_id, token_hash, created_at, expires_at, revoked
                FROM refresh_tokens
                WHERE token_hash = $1 AND expires_at > NOW() AND revoked = FALSE
                "#,
            )
            .bind(token_hash)
            .fetch_optional(&self.pool),
        )
        .await
    }

    async fn delete(&self, token_hash: &str) -> Result<bool> {
        let result = with_deadline(
            self.deadline,
            sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
                .bind(token_hash)
                .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let result = with_deadline(
            self.deadline,
            sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
                .bind(user_id)
                .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected())
    }

    async fn rotate(
        &self,
        old_hash: &str,
        new_hash: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>> {
        let pool = self.pool.clone();

        with_deadline(self.deadline, async move {
            let mut tx = pool.begin().await?;

            let consumed: Option<(Uuid,)> = sqlx::query_as(
                r#"
                DELETE FROM refresh_tokens
                WHERE token_hash = $1 AND expires_at > NOW() AND revoked = FALSE
                RETURNING user_id
                "#,
            )
            .bind(old_hash)
            .fetch_optional(&mut *tx)
            .await?;

            let Some((user_id,)) = consumed else {
                tx.rollback().await?;
                return Ok(None);
            };

            let successor = sqlx::query_as::<_, RefreshToken>(
                r#"
                INSERT INTO refresh_tokens (id, user_id, token_hash, created_at, expires_at, revoked)
                VALUES ($1, $2, $3, NOW(), $4, FALSE)
                RETURNING id, user_id, token_hash, created_at, expires_at, revoked
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(new_hash)
            .bind(new_expires_at)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(Some(successor))
        })
        .await
    }

    async fn delete_expired(&self) -> Result<u64> {
        let result = with_deadline(
            self.deadline,
            sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= NOW() OR revoked = TRUE")
                .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected())
    }
}
