/// One-time code persistence
use super::with_deadline;
use crate::error::Result;
use crate::models::{NewOtp, OtpCode, OtpPurpose};
use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

#[async_trait]
pub trait OtpRepository: Send + Sync {
    /// Store a code. With `invalidate_previous`, unused codes of the same
    /// email and purpose are marked used in the same transaction.
    async fn insert(&self, otp: NewOtp, invalidate_previous: bool) -> Result<OtpCode>;

    /// Mark the newest matching unused, unexpired code as used.
    ///
    /// Returns true for exactly one caller per code, however many race.
    async fn consume(&self, email: &str, code_hash: &str, purpose: OtpPurpose) -> Result<bool>;

    async fn delete_expired(&self) -> Result<u64>;
}

#[derive(Clone)]
pub struct PgOtpRepository {
    pool: PgPool,
    deadline: Duration,
}

impl PgOtpRepository {
    pub fn new(pool: PgPool, deadline: Duration) -> Self {
        Self { pool, deadline }
    }
}

#[async_trait]
impl OtpRepository for PgOtpRepository {
    async fn insert(&self, otp: NewOtp, invalidate_previous: bool) -> Result<OtpCode> {
        let pool = self.pool.clone();

        with_deadline(self.deadline, async move {
            let mut tx = pool.begin().await?;

            if invalidate_previous {
                sqlx::query(
                    r#"
                    UPDATE otp_codes
                    SET used = TRUE, used_at = NOW()
                    WHERE email = $1 AND purpose = $2 AND used = FALSE
                    "#,
                )
                .bind(&otp.email)
                .bind(otp.purpose.as_str())
                .execute(&mut *tx)
                .await?;
            }

            let stored = sqlx::query_as::<_, OtpCode>(
                r#"
                INSERT INTO otp_codes (id, user_id, email, code_hash, purpose, expires_at, used, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, FALSE, NOW())
                RETURNING id, user_id, email, code_hash, purpose, expires_at, used, used_at, created_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(otp.user_id)
            .bind(&otp.email)
            .bind(&otp.code_hash)
            .bind(otp.purpose.as_str())
            .bind(otp.expires_at)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(stored)
        })
        .await
    }

    async fn consume(&self, email: &str, code_hash: &str, purpose: OtpPurpose) -> Result<bool> {
        // The outer `used = FALSE` is re-checked after any row lock wait, so a
        // code can flip to used at most once.
        let consumed: Option<(Uuid,)> = with_deadline(
            self.deadline,
            sqlx::query_as(
                r#"
                UPDATE otp_codes
                SET used = TRUE, used_at = NOW()
                WHERE id = (
                    SELECT id FROM otp_codes
                    WHERE email = $1
                      AND purpose = $2
                      AND code_hash = $3
                      AND used = FALSE
                      AND expires_at > NOW()
                    ORDER BY created_at DESC
                    LIMIT 1
                    FOR UPDATE SKIP LOCKED
                )
                AND used = FALSE
                RETURNING id
                "#,
            )
            .bind(email)
            .bind(purpose.as_str())
            .bind(code_hash)
            .fetch_optional(&self.pool),
        )
        .await?;

        Ok(consumed.is_some())
    }

    async fn delete_expired(&self) -> Result<u64> {
        let result = with_deadline(
            self.deadline,
            sqlx::query("DELETE FROM otp_codes WHERE expires_at <= NOW()").execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected())
    }
}
