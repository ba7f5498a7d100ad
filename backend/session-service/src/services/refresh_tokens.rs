/// Opaque refresh tokens with atomic rotation
///
/// A refresh token is 32 random bytes, base64url encoded. Only its SHA-256 is
/// persisted. Rotation consumes the presented value and stores its successor
/// in one store operation; a consumed value never resolves again.
use crate::db::RefreshTokenRepository;
use crate::error::{Result, SessionError};
use crate::models::{IssuedRefreshToken, RefreshToken};
use chrono::Utc;
use crypto_core::{generate_opaque_token, sha256_hex};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const DEFAULT_REFRESH_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 3600);

pub struct RefreshTokenStore {
    repo: Arc<dyn RefreshTokenRepository>,
    ttl: Duration,
}

impl RefreshTokenStore {
    pub fn new(repo: Arc<dyn RefreshTokenRepository>, ttl: Duration) -> Self {
        Self { repo, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn expires_at(&self) -> chrono::DateTime<Utc> {
        Utc::now()
            + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::days(30))
    }

    /// Mint and persist a refresh token for `user_id`
    pub async fn save_refresh_token(&self, user_id: Uuid) -> Result<IssuedRefreshToken> {
        let value = generate_opaque_token();
        let record = self
            .repo
            .insert(user_id, &sha256_hex(&value), self.expires_at())
            .await?;

        debug!(user_id = %user_id, "Refresh token issued");
        Ok(IssuedRefreshToken { value, record })
    }

    /// Resolve a live token; unknown and expired values are both `NotFound`
    pub async fn get_refresh_token(&self, value: &str) -> Result<RefreshToken> {
        self.repo
            .find_live(&sha256_hex(value))
            .await?
            .ok_or(SessionError::NotFound)
    }

    /// Delete one token. Returns false if nothing matched.
    pub async fn delete_refresh_token(&self, value: &str) -> Result<bool> {
        let deleted = self.repo.delete(&sha256_hex(value)).await?;
        if !deleted {
            debug!("Refresh token delete matched no row");
        }
        Ok(deleted)
    }

    /// Sign a user out everywhere
    pub async fn delete_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let deleted = self.repo.delete_all_for_user(user_id).await?;
        info!(user_id = %user_id, deleted, "All refresh tokens deleted for user");
        Ok(deleted)
    }

    /// Consume `value` and issue its successor in one atomic step.
    ///
    /// Of two concurrent rotations of the same value exactly one succeeds; the
    /// other gets `NotFound` and nothing is inserted for it.
    pub async fn rotate(&self, value: &str) -> Result<(Uuid, IssuedRefreshToken)> {
        let successor = generate_opaque_token();
        let record = self
            .repo
            .rotate(
                &sha256_hex(value),
                &sha256_hex(&successor),
                self.expires_at(),
            )
            .await?;

        match record {
            Some(record) => {
                debug!(user_id = %record.user_id, "Refresh token rotated");
                Ok((
                    record.user_id,
                    IssuedRefreshToken {
                        value: successor,
                        record,
                    },
                ))
            }
            None => {
                warn!("Refresh token rotation rejected: unknown, expired or already used");
                Err(SessionError::NotFound)
            }
        }
    }

    pub async fn cleanup_expired_tokens(&self) -> Result<u64> {
        self.repo.delete_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryDatabase;

    fn store(db: Arc<MemoryDatabase>) -> RefreshTokenStore {
        RefreshTokenStore::new(db, DEFAULT_REFRESH_TOKEN_TTL)
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let db = Arc::new(MemoryDatabase::new());
        let store = store(db);
        let user_id = Uuid::new_v4();

        let issued = store.save_refresh_token(user_id).await.unwrap();
        assert_eq!(issued.value.len(), 43);
        assert!(!issued.value.contains('.'));
        assert_ne!(issued.record.token_hash, issued.value);

        let found = store.get_refresh_token(&issued.value).await.unwrap();
        assert_eq!(found.user_id, user_id);
    }

    #[tokio::test]
    async fn test_rotation_invalidates_old_value() {
        let db = Arc::new(MemoryDatabase::new());
        let store = store(db);
        let user_id = Uuid::new_v4();
        let issued = store.save_refresh_token(user_id).await.unwrap();

        let (owner, next) = store.rotate(&issued.value).await.unwrap();
        assert_eq!(owner, user_id);
        assert_ne!(next.value, issued.value);

        assert!(matches!(
            store.rotate(&issued.value).await,
            Err(SessionError::NotFound)
        ));
        assert!(matches!(
            store.get_refresh_token(&issued.value).await,
            Err(SessionError::NotFound)
        ));
        assert!(store.get_refresh_token(&next.value).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_rotation_single_winner() {
        let db = Arc::new(MemoryDatabase::new());
        let store = Arc::new(store(db.clone()));
        let user_id = Uuid::new_v4();
        let issued = store.save_refresh_token(user_id).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let value = issued.value.clone();
            handles.push(tokio::spawn(async move { store.rotate(&value).await.is_ok() }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(db.refresh_token_count(user_id).await, 1);
    }

    #[tokio::test]
    async fn test_expired_token_not_found() {
        let db = Arc::new(MemoryDatabase::new());
        let store = store(db.clone());
        let issued = store.save_refresh_token(Uuid::new_v4()).await.unwrap();

        db.set_refresh_token_expiry(
            &issued.record.token_hash,
            Utc::now() - chrono::Duration::seconds(1),
        )
        .await;

        assert!(matches!(
            store.get_refresh_token(&issued.value).await,
            Err(SessionError::NotFound)
        ));
        assert!(matches!(
            store.rotate(&issued.value).await,
            Err(SessionError::NotFound)
        ));
        assert_eq!(store.cleanup_expired_tokens().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_reports_missing() {
        let db = Arc::new(MemoryDatabase::new());
        let store = store(db);
        let issued = store.save_refresh_token(Uuid::new_v4()).await.unwrap();

        assert!(store.delete_refresh_token(&issued.value).await.unwrap());
        assert!(!store.delete_refresh_token(&issued.value).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_all_for_user() {
        let db = Arc::new(MemoryDatabase::new());
        let store = store(db);
        let user_id = Uuid::new_v4();
        let other = store.save_refresh_token(Uuid::new_v4()).await.unwrap();
        for _ in 0..3 {
            store.save_refresh_token(user_id).await.unwrap();
        }

        assert_eq!(store.delete_all_for_user(user_id).await.unwrap(), 3);
        assert!(store.get_refresh_token(&other.value).await.is_ok());
    }
}
