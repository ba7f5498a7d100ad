/// User database operations
use super::with_deadline;
use crate::error::Result;
use crate::models::{NewUser, User};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Case-insensitive lookup; callers pass normalized email
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Fails with `EmailAlreadyExists` on a duplicate email
    async fn create(&self, new_user: NewUser) -> Result<User>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()>;

    async fn mark_email_verified(&self, user_id: Uuid) -> Result<()>;
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
    deadline: Duration,
}

impl PgUserRepository {
    pub fn new(pool: PgPool, deadline: Duration) -> Self {
        Self { pool, deadline }
    }
}

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, email_verified, \
                            is_active, created_at, updated_at";

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = format!(
            "SELECT {} FROM users WHERE LOWER(email) = LOWER($1)",
            USER_COLUMNS
        );
        with_deadline(
            self.deadline,
            sqlx::query_as::<_, User>(&query)
                .bind(email)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        with_deadline(
            self.deadline,
            sqlx::query_as::<_, User>(&query)
                .bind(user_id)
                .fetch_optional(&self.pool),
        )
        .await
    }

    async fn create(&self, new_user: NewUser) -> Result<User> {
        let now = Utc::now();
        let query = format!(
            r#"
            INSERT INTO users (id, email, password_hash, first_name, last_name,
                               email_verified, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7, $7)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        with_deadline(
            self.deadline,
            sqlx::query_as::<_, User>(&query)
                .bind(Uuid::new_v4())
                .bind(&new_user.email)
                .bind(&new_user.password_hash)
                .bind(&new_user.first_name)
                .bind(&new_user.last_name)
                .bind(new_user.email_verified)
                .bind(now)
                .fetch_one(&self.pool),
        )
        .await
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        with_deadline(
            self.deadline,
            sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
                .bind(password_hash)
                .bind(user_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> Result<()> {
        with_deadline(
            self.deadline,
            sqlx::query(
                "UPDATE users SET email_verified = TRUE, updated_at = NOW() WHERE id = $1",
            )
            .bind(user_id)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}
